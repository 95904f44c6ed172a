//! Transient object URLs for in-memory blobs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::trace;

use crate::error::TransportError;
use crate::{ResourceFetcher, TransportResult};

/// Scheme prefix of object URLs.
pub const BLOB_SCHEME: &str = "blob:";

/// Registry of in-memory blobs addressable by `blob:` URL.
///
/// URLs stay valid until revoked.
#[derive(Debug, Default)]
pub struct BlobStore {
    blobs: Mutex<HashMap<String, Bytes>>,
    next_id: AtomicU64,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register bytes and return a fresh object URL for them.
    pub fn create_object_url(&self, data: Bytes) -> String {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let url = format!("{BLOB_SCHEME}cvbridge/{id}");
        trace!(%url, bytes = data.len(), "Object URL created");
        self.blobs.lock().insert(url.clone(), data);
        url
    }

    /// Drop an object URL. Returns false if it was unknown.
    pub fn revoke_object_url(&self, url: &str) -> bool {
        self.blobs.lock().remove(url).is_some()
    }

    /// Number of live object URLs.
    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResourceFetcher for BlobStore {
    fn fetch(&self, url: &str) -> TransportResult<Bytes> {
        self.blobs
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(url.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_url_lifecycle() {
        let store = BlobStore::new();
        let url = store.create_object_url(Bytes::from_static(b"img"));
        assert!(url.starts_with(BLOB_SCHEME));
        assert_eq!(store.fetch(&url).unwrap().as_ref(), b"img");

        assert!(store.revoke_object_url(&url));
        assert!(!store.revoke_object_url(&url));
        assert!(matches!(store.fetch(&url), Err(TransportError::NotFound(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_urls_are_unique() {
        let store = BlobStore::new();
        let a = store.create_object_url(Bytes::new());
        let b = store.create_object_url(Bytes::new());
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }
}
