//! Load-time engine options.

use std::fmt;
use std::sync::Arc;

use cvbridge_ipc::EngineConfig;

/// File name the engine bootstrap asks for when it needs its binary payload.
pub const WASM_BINARY_NAME: &str = "opencv_js.wasm";

/// Maps a logical resource name and the script directory to a concrete path.
pub type LocateFileFn = Arc<dyn Fn(&str, &str) -> String + Send + Sync>;

/// Invoked once the engine reports its own initialization finished.
pub type RuntimeInitializedFn = Box<dyn FnOnce() + Send>;

/// Default resource locator.
///
/// The binary payload lives in a `wasm/` subdirectory of the script
/// directory; everything else resolves directly against it.
pub fn default_locate_file(path: &str, script_directory: &str) -> String {
    if path == WASM_BINARY_NAME {
        format!("{}/wasm/{}", script_directory.trim_end_matches('/'), path)
    } else {
        format!("{script_directory}{path}")
    }
}

/// Directory part of a script URL, including the trailing slash.
pub fn script_directory(script_url: &str) -> &str {
    match script_url.rfind('/') {
        Some(idx) => &script_url[..=idx],
        None => "",
    }
}

/// Options consumed by a single load. Moved into the loader, so they
/// cannot be changed once a load has started.
pub struct EngineOptions {
    pub config: EngineConfig,
    pub locate_file: Option<LocateFileFn>,
    pub on_runtime_initialized: Option<RuntimeInitializedFn>,
}

impl EngineOptions {
    /// Options with no callbacks.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            locate_file: None,
            on_runtime_initialized: None,
        }
    }

    /// Override the resource locator.
    pub fn with_locate_file<F>(mut self, locate: F) -> Self
    where
        F: Fn(&str, &str) -> String + Send + Sync + 'static,
    {
        self.locate_file = Some(Arc::new(locate));
        self
    }

    /// Run `hook` right before readiness is published.
    pub fn on_runtime_initialized<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_runtime_initialized = Some(Box::new(hook));
        self
    }

    /// The configured locator, or [`default_locate_file`].
    pub fn locator(&self) -> LocateFileFn {
        self.locate_file
            .clone()
            .unwrap_or_else(|| Arc::new(default_locate_file))
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl From<EngineConfig> for EngineOptions {
    fn from(config: EngineConfig) -> Self {
        Self::new(config)
    }
}

impl fmt::Debug for EngineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineOptions")
            .field("config", &self.config)
            .field("locate_file", &self.locate_file.is_some())
            .field("on_runtime_initialized", &self.on_runtime_initialized.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_locate_file() {
        assert_eq!(
            default_locate_file("opencv_js.wasm", "assets/opencv/"),
            "assets/opencv/wasm/opencv_js.wasm"
        );
        assert_eq!(
            default_locate_file("haarcascade.xml", "assets/opencv/"),
            "assets/opencv/haarcascade.xml"
        );
    }

    #[test]
    fn test_script_directory() {
        assert_eq!(script_directory("assets/opencv/opencv.js"), "assets/opencv/");
        assert_eq!(
            script_directory("http://host/a/opencv.js"),
            "http://host/a/"
        );
        assert_eq!(script_directory("opencv.js"), "");
    }

    #[test]
    fn test_custom_locator_overrides_default() {
        let options = EngineOptions::default().with_locate_file(|path, _| format!("/cdn/{path}"));
        assert_eq!((options.locator())("x.bin", "ignored/"), "/cdn/x.bin");
        assert_eq!(
            (EngineOptions::default().locator())("x.bin", "dir/"),
            "dir/x.bin"
        );
    }
}
