//! Local file fetcher.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::debug;
use url::Url;

use crate::error::TransportError;
use crate::{ResourceFetcher, TransportResult};

/// Serves `file://` URLs and plain paths, relative ones against a base
/// directory.
#[derive(Debug, Clone)]
pub struct FileFetcher {
    base_dir: PathBuf,
}

impl FileFetcher {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Map a URL or path to a filesystem path.
    pub fn resolve(&self, url: &str) -> TransportResult<PathBuf> {
        if url.starts_with("file:") {
            let parsed =
                Url::parse(url).map_err(|e| TransportError::InvalidUrl(format!("{url}: {e}")))?;
            return parsed
                .to_file_path()
                .map_err(|_| TransportError::InvalidUrl(url.to_string()));
        }

        let path = Path::new(url);
        Ok(if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        })
    }
}

impl ResourceFetcher for FileFetcher {
    fn fetch(&self, url: &str) -> TransportResult<Bytes> {
        let path = self.resolve(url)?;
        match std::fs::read(&path) {
            Ok(data) => {
                debug!(path = %path.display(), bytes = data.len(), "Read local resource");
                Ok(Bytes::from(data))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(TransportError::NotFound(url.to_string())),
            Err(e) => Err(TransportError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_paths_resolve_against_base() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("assets")).unwrap();
        std::fs::write(dir.path().join("assets/opencv.js"), b"script").unwrap();

        let fetcher = FileFetcher::new(dir.path());
        assert_eq!(fetcher.fetch("assets/opencv.js").unwrap().as_ref(), b"script");
    }

    #[test]
    fn test_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.bin");
        std::fs::write(&file, [1u8, 2, 3]).unwrap();
        let url = Url::from_file_path(&file).unwrap();

        let fetcher = FileFetcher::new("/nonexistent");
        assert_eq!(fetcher.fetch(url.as_str()).unwrap().as_ref(), &[1, 2, 3]);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FileFetcher::new(dir.path());
        assert!(matches!(
            fetcher.fetch("missing/opencv.js"),
            Err(TransportError::NotFound(_))
        ));
    }
}
