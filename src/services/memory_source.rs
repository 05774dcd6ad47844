//! In-memory [`ObjectSource`] for tests.

use async_trait::async_trait;
use bytes::Bytes;
use std::{
    collections::{BTreeMap, HashSet},
    path::Path,
    sync::RwLock,
};

use super::object_source::{ListPage, ObjectSource};
use crate::errors::{IngestError, IngestResult};

/// Stores objects in a sorted map and pages through them like S3 does.
pub struct MemorySource {
    bucket: String,
    objects: RwLock<BTreeMap<String, Bytes>>,
    page_size: usize,
    /// Keys that are listed but gone by the time they are downloaded.
    vanished: RwLock<HashSet<String>>,
    /// Keys whose download fails with a transport error.
    broken: RwLock<HashSet<String>>,
    list_calls: RwLock<usize>,
}

impl MemorySource {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: RwLock::new(BTreeMap::new()),
            page_size: 1000,
            vanished: RwLock::new(HashSet::new()),
            broken: RwLock::new(HashSet::new()),
            list_calls: RwLock::new(0),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_object(self, key: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.put(key, data);
        self
    }

    pub fn put(&self, key: impl Into<String>, data: impl Into<Bytes>) {
        self.objects.write().unwrap().insert(key.into(), data.into());
    }

    /// Keep `key` in listings but fail its download with not-found.
    pub fn vanish(&self, key: &str) {
        self.vanished.write().unwrap().insert(key.to_string());
    }

    /// Fail downloads of `key` with a transport error.
    pub fn break_key(&self, key: &str) {
        self.broken.write().unwrap().insert(key.to_string());
    }

    pub fn repair_key(&self, key: &str) {
        self.broken.write().unwrap().remove(key);
    }

    /// Number of `list_page` calls served so far.
    pub fn list_calls(&self) -> usize {
        *self.list_calls.read().unwrap()
    }
}

#[async_trait]
impl ObjectSource for MemorySource {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_page(&self, prefix: &str, token: Option<&str>) -> IngestResult<ListPage> {
        *self.list_calls.write().unwrap() += 1;

        let objects = self.objects.read().unwrap();
        let mut keys: Vec<String> = objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .filter(|k| token.is_none_or(|t| k.as_str() > t))
            .take(self.page_size + 1)
            .cloned()
            .collect();

        let next_token = if keys.len() > self.page_size {
            keys.pop();
            keys.last().cloned()
        } else {
            None
        };

        Ok(ListPage { keys, next_token })
    }

    async fn download(&self, key: &str, dest: &Path) -> IngestResult<u64> {
        if self.broken.read().unwrap().contains(key) {
            return Err(IngestError::Transport {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                message: "connection reset".into(),
            });
        }

        let data = {
            let objects = self.objects.read().unwrap();
            match objects.get(key) {
                Some(data) if !self.vanished.read().unwrap().contains(key) => data.clone(),
                _ => {
                    return Err(IngestError::ObjectNotFound {
                        bucket: self.bucket.clone(),
                        key: key.to_string(),
                    });
                }
            }
        };

        tokio::fs::write(dest, &data).await?;
        Ok(data.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pages_follow_tokens() {
        let source = MemorySource::new("b")
            .with_page_size(2)
            .with_object("logs/a", "1")
            .with_object("logs/b", "2")
            .with_object("logs/c", "3");

        let first = source.list_page("logs/", None).await.unwrap();
        assert_eq!(first.keys, vec!["logs/a", "logs/b"]);
        assert_eq!(first.next_token.as_deref(), Some("logs/b"));

        let second = source.list_page("logs/", first.next_token.as_deref()).await.unwrap();
        assert_eq!(second.keys, vec!["logs/c"]);
        assert!(second.next_token.is_none());
    }

    #[tokio::test]
    async fn vanished_key_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let source = MemorySource::new("b").with_object("logs/a", "1");
        source.vanish("logs/a");

        let err = source.download("logs/a", &dir.path().join("a")).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(matches!(
            err,
            IngestError::ObjectNotFound { ref bucket, .. } if bucket == source.bucket()
        ));
        assert!(!dir.path().join("a").exists());
    }
}
