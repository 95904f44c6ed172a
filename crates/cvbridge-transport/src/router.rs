//! Scheme-based dispatch across fetchers.

use std::sync::Arc;

use bytes::Bytes;
use tracing::trace;

use crate::blob::{BlobStore, BLOB_SCHEME};
use crate::error::TransportError;
use crate::local::FileFetcher;
use crate::{ResourceFetcher, TransportResult};

/// Routes `blob:` URLs to a [`BlobStore`], `http(s)://` to a remote
/// fetcher and everything else to local files.
pub struct ResourceRouter {
    blobs: Arc<BlobStore>,
    files: FileFetcher,
    remote: Option<Arc<dyn ResourceFetcher>>,
}

impl ResourceRouter {
    /// Router without remote access.
    pub fn new(blobs: Arc<BlobStore>, files: FileFetcher) -> Self {
        Self {
            blobs,
            files,
            remote: None,
        }
    }

    /// Enable `http://` and `https://` URLs.
    pub fn with_remote(mut self, remote: Arc<dyn ResourceFetcher>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn blobs(&self) -> &Arc<BlobStore> {
        &self.blobs
    }
}

fn is_remote(url: &str) -> bool {
    let lower = url.get(..8).unwrap_or(url).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

impl ResourceFetcher for ResourceRouter {
    fn fetch(&self, url: &str) -> TransportResult<Bytes> {
        if url.starts_with(BLOB_SCHEME) {
            trace!(%url, "Routing to blob store");
            return self.blobs.fetch(url);
        }
        if is_remote(url) {
            trace!(%url, "Routing to remote fetcher");
            return match &self.remote {
                Some(remote) => remote.fetch(url),
                None => Err(TransportError::UnsupportedScheme(
                    url.split(':').next().unwrap_or_default().to_string(),
                )),
            };
        }
        self.files.fetch(url)
    }
}
