//! Binary resource fetching.
//!
//! This crate pulls host-side binary resources (remote files, local files
//! and transient object URLs) into memory, and decodes images into RGBA
//! pixels ready to be drawn.

mod blob;
mod decode;
mod error;
mod http;
mod local;
mod router;

pub use blob::{BlobStore, BLOB_SCHEME};
pub use decode::{decode_image, DecodedImage};
pub use error::TransportError;
pub use http::HttpFetcher;
pub use local::FileFetcher;
pub use router::ResourceRouter;

use bytes::Bytes;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Something that can turn a URL into bytes.
///
/// Fetches block the calling thread; callers that must not block run them
/// on a worker.
pub trait ResourceFetcher: Send + Sync {
    /// Fetch the full body behind `url`.
    fn fetch(&self, url: &str) -> TransportResult<Bytes>;
}
