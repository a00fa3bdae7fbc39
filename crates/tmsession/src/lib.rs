//! Telemetry session control.
//!
//! Brings up the processing features of one downlink session in order,
//! supervises the recorded engineering watcher process, and tears it all down
//! at session end.

pub mod factory;
pub mod feature;
pub mod logging;
mod orchestrator;
pub mod supervisor;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use factory::PlatformLauncherFactory;
pub use feature::{Feature, FeatureError, FeatureKind, FeatureManager, FeatureSetup, InitOutcome};
pub use orchestrator::{SessionOrchestrator, SessionValidity};
pub use supervisor::{
    ExternalProcessSupervisor, HandshakeState, StartOutcome, StopOutcome, SupervisorError,
};

// Re-export core functionality
pub use tmsession_core::*;
