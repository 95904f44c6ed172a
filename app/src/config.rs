//! Host configuration.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use cvbridge_ipc::{EngineConfig, ResolutionPreset};

/// Environment variable naming an optional JSON config file.
pub const CONFIG_ENV: &str = "CVBRIDGE_CONFIG";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HostConfig {
    /// Root for relative resource URLs. Defaults to the working directory.
    pub base_dir: Option<PathBuf>,
    pub engine: EngineConfig,
    pub preset: ResolutionPreset,
    /// Camera frames to run through the pipeline before shutting down.
    pub frames: u32,
    pub sink_id: String,
    pub output_canvas_id: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            engine: EngineConfig::default(),
            preset: ResolutionPreset::Qvga,
            frames: 5,
            sink_id: "videoInput".to_string(),
            output_canvas_id: "canvasOutput".to_string(),
        }
    }
}

impl HostConfig {
    /// Read the file named by [`CONFIG_ENV`], or fall back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn base_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.base_dir {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir().context("resolving working directory"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.json");
        std::fs::write(
            &path,
            r#"{"frames": 2, "preset": "vga", "engine": {"scriptUrl": "cv/opencv.js"}}"#,
        )
        .unwrap();

        let config = HostConfig::from_file(&path).unwrap();
        assert_eq!(config.frames, 2);
        assert_eq!(config.preset, ResolutionPreset::Vga);
        assert_eq!(config.engine.script_url, "cv/opencv.js");
        assert!(!config.engine.using_wasm);
        assert_eq!(config.sink_id, "videoInput");
        assert!(config.base_dir.is_none());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.json");
        std::fs::write(&path, "{frames:").unwrap();
        let err = HostConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("parsing config"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(HostConfig::from_file(Path::new("/nonexistent/host.json")).is_err());
    }
}
