//! Set difference between the remote listing and the consumed set.

use std::collections::HashSet;

use crate::models::object::ObjectKey;

/// Keys whose base name has not been consumed yet, sorted by full key.
///
/// Identity is the base name only: two keys with the same base name under
/// different directories are one object, and the first in sorted order is
/// kept. Keys ending in `/` (folder markers) have no base name and are
/// dropped. Sorting makes batch order reproducible across runs.
pub fn uncached_keys(mut remote: Vec<ObjectKey>, consumed: &HashSet<String>) -> Vec<ObjectKey> {
    remote.sort_unstable();

    let mut seen: HashSet<String> = HashSet::with_capacity(remote.len());
    remote.retain(|key| {
        let name = key.base_name();
        !name.is_empty() && !consumed.contains(name) && seen.insert(name.to_string())
    });
    remote
}
