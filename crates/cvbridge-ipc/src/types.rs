//! Common types used across client messages.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Bundled asm.js build of the engine.
pub const DEFAULT_SCRIPT_URL: &str = "assets/opencv/asm/3.4/opencv.js";

/// Binary payload used when `using_wasm` is set.
pub const DEFAULT_WASM_BINARY_FILE: &str = "wasm/3.4/opencv_js.wasm";

/// Serializable part of the engine options, consumed once per load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Location of the engine bootstrap script.
    pub script_url: String,

    /// Location of the binary payload, relative to the script directory.
    pub wasm_binary_file: Option<String>,

    /// Whether the bootstrap should pull the binary payload.
    pub using_wasm: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            script_url: DEFAULT_SCRIPT_URL.to_string(),
            wasm_binary_file: Some(DEFAULT_WASM_BINARY_FILE.to_string()),
            using_wasm: false,
        }
    }
}

impl EngineConfig {
    /// Config pointing at a specific script, everything else default.
    pub fn with_script_url(script_url: impl Into<String>) -> Self {
        Self {
            script_url: script_url.into(),
            ..Default::default()
        }
    }
}

/// Camera resolution presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionPreset {
    /// 320×240.
    Qvga,

    /// 640×480.
    Vga,

    /// No constraint, the device picks.
    Any,
}

impl ResolutionPreset {
    /// Exact pixel size for the preset, `None` when unconstrained.
    pub fn dimensions(self) -> Option<(u32, u32)> {
        match self {
            Self::Qvga => Some((320, 240)),
            Self::Vga => Some((640, 480)),
            Self::Any => None,
        }
    }

    /// Resolve a preset name. Unknown names fall back to [`ResolutionPreset::Any`].
    pub fn from_name(name: &str) -> Self {
        name.parse().unwrap_or(Self::Any)
    }
}

impl FromStr for ResolutionPreset {
    type Err = UnknownPreset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "qvga" => Ok(Self::Qvga),
            "vga" => Ok(Self::Vga),
            "any" => Ok(Self::Any),
            _ => Err(UnknownPreset(s.to_string())),
        }
    }
}

impl fmt::Display for ResolutionPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Qvga => "qvga",
            Self::Vga => "vga",
            Self::Any => "any",
        };
        f.write_str(name)
    }
}

/// Unrecognized resolution preset name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown resolution preset: {0}")]
pub struct UnknownPreset(pub String);

/// Where the reference pipeline reads its input frame from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameSource {
    /// Pixels currently drawn on a canvas.
    Canvas(String),

    /// The latest frame of the active camera session.
    Camera,
}
