//! Vision engine runtime.
//!
//! This crate defines the capability contract of an in-process vision
//! engine ([`VisionEngine`]), the RAII wrappers the rest of the workspace
//! uses to own engine buffers, the bootstrap contract that turns a fetched
//! script into a live engine ([`EngineRuntime`]), and a bundled software
//! implementation of both.

mod bootstrap;
mod engine;
mod error;
mod mat;
mod options;
mod software;

pub use bootstrap::{
    BinaryFetchFn, BootstrapManifest, EngineRuntime, InitHook, ModuleBinding, SoftwareRuntime,
};
pub use engine::{
    ColorConversion, ContourApproximation, MatHandle, MatInfo, MatType, Point, Scalar,
    VectorHandle, VisionEngine,
};
pub use error::{EngineFault, RuntimeError};
pub use mat::{EngineHandle, HierarchyEntry, Mat, MatVector};
pub use options::{
    default_locate_file, script_directory, EngineOptions, LocateFileFn, RuntimeInitializedFn,
    WASM_BINARY_NAME,
};
pub use software::SoftwareEngine;

use std::sync::Arc;

/// Result type for engine calls.
pub type EngineResult<T> = Result<T, EngineFault>;

/// Result type for bootstrap operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Create the bundled software runtime.
pub fn create_runtime() -> Arc<dyn EngineRuntime> {
    Arc::new(SoftwareRuntime::new())
}
