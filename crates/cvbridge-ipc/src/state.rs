//! Engine readiness state machine types.

use serde::{Deserialize, Serialize};

/// Load phase of the engine. Exactly one phase is current at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadPhase {
    /// The bootstrap is in flight.
    Loading,

    /// The engine finished its own runtime initialization.
    Ready,

    /// The bootstrap script failed to fetch or execute.
    Error,
}

impl LoadPhase {
    /// Returns true for `Ready` and `Error`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Error)
    }

    /// Returns the display name for this phase.
    pub fn name(self) -> &'static str {
        match self {
            Self::Loading => "Loading",
            Self::Ready => "Ready",
            Self::Error => "Error",
        }
    }
}

/// Readiness record published to every observer of the engine.
///
/// The three flags are never set independently: they are always derived
/// from a single [`LoadPhase`], so exactly one of them is true.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineReadiness {
    pub ready: bool,
    pub error: bool,
    pub loading: bool,
}

impl EngineReadiness {
    /// `{loading: true}`.
    pub const fn loading() -> Self {
        Self::from_phase(LoadPhase::Loading)
    }

    /// `{ready: true}`.
    pub const fn ready() -> Self {
        Self::from_phase(LoadPhase::Ready)
    }

    /// `{error: true}`.
    pub const fn failed() -> Self {
        Self::from_phase(LoadPhase::Error)
    }

    /// Build the record for a phase.
    pub const fn from_phase(phase: LoadPhase) -> Self {
        Self {
            ready: matches!(phase, LoadPhase::Ready),
            error: matches!(phase, LoadPhase::Error),
            loading: matches!(phase, LoadPhase::Loading),
        }
    }

    /// The phase this record describes.
    pub fn phase(&self) -> LoadPhase {
        if self.ready {
            LoadPhase::Ready
        } else if self.error {
            LoadPhase::Error
        } else {
            LoadPhase::Loading
        }
    }

    /// Returns true once the engine can be used.
    pub fn is_ready(&self) -> bool {
        self.phase() == LoadPhase::Ready
    }

    /// Returns true if the last load failed.
    pub fn is_error(&self) -> bool {
        self.phase() == LoadPhase::Error
    }

    /// Returns true while a load is in flight.
    pub fn is_loading(&self) -> bool {
        self.phase() == LoadPhase::Loading
    }
}

impl Default for EngineReadiness {
    fn default() -> Self {
        Self::loading()
    }
}

/// A readiness transition tagged with the load attempt that produced it.
///
/// Generation 0 is the construction-time `loading` state; every call to
/// `load` starts a new generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessUpdate {
    pub generation: u64,
    pub readiness: EngineReadiness,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exactly_one_flag_per_phase() {
        for phase in [LoadPhase::Loading, LoadPhase::Ready, LoadPhase::Error] {
            let r = EngineReadiness::from_phase(phase);
            let set = [r.ready, r.error, r.loading].iter().filter(|f| **f).count();
            assert_eq!(set, 1);
            assert_eq!(r.phase(), phase);
        }
    }

    #[test]
    fn test_default_is_loading() {
        let r = EngineReadiness::default();
        assert!(r.is_loading());
        assert!(!LoadPhase::Loading.is_terminal());
        assert!(LoadPhase::Ready.is_terminal());
        assert!(LoadPhase::Error.is_terminal());
    }

    #[test]
    fn test_serializes_as_flag_record() {
        let json = serde_json::to_string(&EngineReadiness::failed()).unwrap();
        assert_eq!(json, r#"{"ready":false,"error":true,"loading":false}"#);
    }
}
