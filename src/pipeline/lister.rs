//! Enumerates log object keys under a prefix, following continuation tokens.

use std::time::Instant;
use tracing::{debug, info};

use crate::{errors::IngestResult, models::object::ObjectKey, services::object_source::ObjectSource};

/// List every key under `prefix`.
///
/// Stops when the store reports no further page, or after `page_cap` pages
/// when a cap is given (a cap of zero means no cap). Listing errors propagate
/// unchanged.
pub async fn list_keys(
    source: &dyn ObjectSource,
    prefix: &str,
    page_cap: Option<usize>,
) -> IngestResult<Vec<ObjectKey>> {
    let start = Instant::now();
    let page_cap = page_cap.filter(|cap| *cap > 0);

    let mut keys = Vec::new();
    let mut token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        pages += 1;
        let page = source.list_page(prefix, token.as_deref()).await?;
        debug!("listing page {} returned {} keys", pages, page.keys.len());
        keys.extend(page.keys.into_iter().map(ObjectKey::from));

        match page.next_token {
            Some(next) => token = Some(next),
            None => break,
        }

        if page_cap.is_some_and(|cap| pages >= cap) {
            info!("stopping listing at page cap of {}", pages);
            break;
        }
    }

    info!(
        "listed {} pages in {} seconds",
        pages,
        start.elapsed().as_secs()
    );
    Ok(keys)
}
