//! Engine bootstrap contract.

use std::fmt;
use std::sync::Arc;
use std::thread;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::RuntimeError;
use crate::mat::EngineHandle;
use crate::options::{script_directory, LocateFileFn, WASM_BINARY_NAME};
use crate::software::SoftwareEngine;
use crate::RuntimeResult;

/// Fires once with the initialized engine.
pub type InitHook = Box<dyn FnOnce(EngineHandle) + Send>;

/// Fetches an auxiliary binary resource by resolved location.
pub type BinaryFetchFn = Arc<dyn Fn(&str) -> Result<Vec<u8>, String> + Send + Sync>;

/// Binding handed to the engine script when it executes: where it was
/// loaded from, how to locate auxiliary resources and how to fetch them.
pub struct ModuleBinding {
    pub script_url: String,
    pub wasm_binary_file: Option<String>,
    pub using_wasm: bool,
    locate_file: LocateFileFn,
    fetch: BinaryFetchFn,
}

impl ModuleBinding {
    pub fn new(
        script_url: impl Into<String>,
        wasm_binary_file: Option<String>,
        using_wasm: bool,
        locate_file: LocateFileFn,
        fetch: BinaryFetchFn,
    ) -> Self {
        Self {
            script_url: script_url.into(),
            wasm_binary_file,
            using_wasm,
            locate_file,
            fetch,
        }
    }

    /// Directory of the bootstrap script.
    pub fn script_directory(&self) -> &str {
        script_directory(&self.script_url)
    }

    /// Resolve a logical resource name through the installed locator.
    pub fn locate(&self, path: &str) -> String {
        (self.locate_file)(path, self.script_directory())
    }

    /// Fetch a resolved resource.
    pub fn fetch(&self, location: &str) -> Result<Vec<u8>, String> {
        (self.fetch)(location)
    }
}

impl fmt::Debug for ModuleBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleBinding")
            .field("script_url", &self.script_url)
            .field("wasm_binary_file", &self.wasm_binary_file)
            .field("using_wasm", &self.using_wasm)
            .finish()
    }
}

/// Turns a fetched bootstrap script into a live engine.
pub trait EngineRuntime: Send + Sync {
    /// Runtime name for diagnostics.
    fn name(&self) -> &'static str;

    /// Execute a bootstrap script.
    ///
    /// `Err` means the script could not be executed. `Ok` only means it
    /// ran: the engine is usable once `on_initialized` fires, which may
    /// happen later and on another thread.
    fn execute(
        &self,
        script: &[u8],
        module: ModuleBinding,
        on_initialized: InitHook,
    ) -> RuntimeResult<()>;
}

/// Bootstrap script understood by [`SoftwareRuntime`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapManifest {
    /// Target runtime, must be `"software"`.
    pub engine: String,

    /// Engine build version.
    pub version: String,

    /// Binary payload name requested through the locator.
    #[serde(default)]
    pub binary: Option<String>,
}

impl BootstrapManifest {
    pub const ENGINE: &'static str = "software";

    pub fn new(version: impl Into<String>) -> Self {
        Self {
            engine: Self::ENGINE.to_string(),
            version: version.into(),
            binary: None,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// Runtime for the bundled [`SoftwareEngine`].
///
/// Initialization completes on a separate thread after the optional
/// binary payload was fetched, so readiness is never signaled from inside
/// [`EngineRuntime::execute`].
#[derive(Debug, Default)]
pub struct SoftwareRuntime;

impl SoftwareRuntime {
    pub fn new() -> Self {
        Self
    }
}

impl EngineRuntime for SoftwareRuntime {
    fn name(&self) -> &'static str {
        "software"
    }

    #[instrument(name = "runtime_execute", skip_all, fields(script_url = %module.script_url))]
    fn execute(
        &self,
        script: &[u8],
        module: ModuleBinding,
        on_initialized: InitHook,
    ) -> RuntimeResult<()> {
        let manifest: BootstrapManifest = serde_json::from_slice(script)
            .map_err(|e| RuntimeError::InvalidScript(e.to_string()))?;

        if manifest.engine != BootstrapManifest::ENGINE {
            return Err(RuntimeError::UnsupportedEngine(manifest.engine));
        }

        debug!(version = %manifest.version, "Bootstrap script executed");

        thread::Builder::new()
            .name("engine-init".into())
            .spawn(move || {
                if module.using_wasm {
                    let name = module
                        .wasm_binary_file
                        .clone()
                        .or_else(|| manifest.binary.clone())
                        .unwrap_or_else(|| WASM_BINARY_NAME.to_string());
                    let location = module.locate(&name);
                    match module.fetch(&location) {
                        Ok(payload) => {
                            debug!(%location, bytes = payload.len(), "Binary payload compiled")
                        }
                        Err(reason) => {
                            // The script already ran; a missing payload leaves the
                            // runtime uninitialized, exactly like an aborted compile.
                            tracing::error!(
                                "{}",
                                RuntimeError::BinaryUnavailable {
                                    url: location,
                                    reason
                                }
                            );
                            return;
                        }
                    }
                }

                let engine: EngineHandle = Arc::new(SoftwareEngine::with_version(manifest.version));
                info!(engine = engine.name(), version = engine.version(), "Runtime initialized");
                on_initialized(engine);
            })?;

        Ok(())
    }
}
