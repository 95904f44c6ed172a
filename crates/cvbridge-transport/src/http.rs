//! HTTP(S) fetcher.

use std::time::Duration;

use bytes::Bytes;
use tokio::runtime::Runtime;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::TransportError;
use crate::{ResourceFetcher, TransportResult};

/// Fetches `http://` and `https://` resources on a private runtime.
pub struct HttpFetcher {
    runtime: Runtime,
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher whose requests never time out.
    ///
    /// A server that accepts and never answers keeps the fetch pending.
    pub fn new() -> TransportResult<Self> {
        Self::build(None)
    }

    /// Create a fetcher that fails requests running longer than `timeout`.
    pub fn with_timeout(timeout: Duration) -> TransportResult<Self> {
        Self::build(Some(timeout))
    }

    fn build(timeout: Option<Duration>) -> TransportResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("http-fetch")
            .enable_all()
            .build()?;

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::Request {
                url: String::new(),
                reason: e.to_string(),
            })?;

        Ok(Self { runtime, client })
    }
}

impl ResourceFetcher for HttpFetcher {
    #[instrument(name = "http_fetch", skip(self))]
    fn fetch(&self, url: &str) -> TransportResult<Bytes> {
        let parsed = Url::parse(url).map_err(|e| TransportError::InvalidUrl(format!("{url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(TransportError::UnsupportedScheme(parsed.scheme().to_string()));
        }

        let request_error = |e: reqwest::Error| TransportError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        };

        self.runtime.block_on(async {
            let response = self
                .client
                .get(parsed)
                .send()
                .await
                .map_err(request_error)?;

            let status = response.status();
            if !status.is_success() {
                warn!(status = status.as_u16(), "Fetch returned non-success status");
                return Err(TransportError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            let body = response.bytes().await.map_err(request_error)?;
            debug!(bytes = body.len(), "Fetched");
            Ok(body)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serve one canned response on a local port.
    fn serve_once(response: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 4096];
                let mut request = Vec::new();
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let _ = stream.write_all(response);
            }
        });
        format!("http://{addr}/resource.bin")
    }

    #[test]
    fn test_fetch_success_body() {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
        );
        let fetcher = HttpFetcher::new().unwrap();
        assert_eq!(fetcher.fetch(&url).unwrap().as_ref(), b"hello");
    }

    #[test]
    fn test_fetch_404_is_status_error() {
        let url = serve_once(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        let fetcher = HttpFetcher::new().unwrap();
        let err = fetcher.fetch(&url).unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert!(err.to_string().contains("status: 404"));
    }

    /// Accept connections on a local port and never answer them.
    fn silent_server() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/opencv.js", listener.local_addr().unwrap());
        (listener, url)
    }

    #[test]
    fn test_opt_in_timeout_fails_silent_server() {
        let (_listener, url) = silent_server();
        let fetcher = HttpFetcher::with_timeout(Duration::from_millis(200)).unwrap();
        assert!(matches!(
            fetcher.fetch(&url),
            Err(TransportError::Request { .. })
        ));
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        let fetcher = HttpFetcher::new().unwrap();
        assert!(matches!(
            fetcher.fetch("ftp://example.com/x"),
            Err(TransportError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            fetcher.fetch("not a url"),
            Err(TransportError::InvalidUrl(_))
        ));
    }
}
