//! Host-readable engine errors.

use cvbridge_capture::MediaError;
use cvbridge_runtime::{EngineFault, VisionEngine};
use parking_lot::Mutex;
use tracing::error;

use crate::error::EngineError;

/// Turns engine faults into readable messages and keeps the last one
/// reported, for display by the host.
#[derive(Debug, Default)]
pub struct Diagnostics {
    last_error: Mutex<Option<String>>,
}

fn resolve(ptr: u64, engine: Option<&dyn VisionEngine>) -> Option<String> {
    let message = engine?.exception_from_ptr(ptr)?;
    Some(format!("Exception: {message}"))
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Describe a fault without recording it.
    ///
    /// Numeric handles, and text whose first word is a handle, are
    /// resolved through the engine when one is available. Anything else
    /// passes through unchanged.
    pub fn describe(fault: &EngineFault, engine: Option<&dyn VisionEngine>) -> EngineError {
        let message = match fault {
            EngineFault::Code(ptr) => resolve(*ptr, engine).unwrap_or_else(|| ptr.to_string()),
            EngineFault::Message(text) => text
                .split(' ')
                .next()
                .and_then(|word| word.parse::<u64>().ok())
                .and_then(|ptr| resolve(ptr, engine))
                .unwrap_or_else(|| text.clone()),
        };
        EngineError { message }
    }

    /// Describe and record a fault.
    pub fn report(&self, fault: &EngineFault, engine: Option<&dyn VisionEngine>) -> EngineError {
        let described = Self::describe(fault, engine);
        self.record(&described.message);
        described
    }

    /// Record a message that is already readable.
    pub fn record(&self, message: &str) {
        error!("{message}");
        *self.last_error.lock() = Some(message.to_string());
    }

    /// Describe and record a camera failure.
    pub fn camera_error(&self, err: &MediaError) -> String {
        let message = format!("Camera Error: {} {}", err.name, err.message);
        self.record(&message);
        message
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    pub fn clear_error(&self) {
        *self.last_error.lock() = None;
    }
}
