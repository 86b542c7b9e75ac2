//! Sync loop runtime: process probe, single-instance guard, detached-process
//! lifecycle and the credential → fetch → merge orchestrator.

mod error;
pub mod guard;
pub mod lifecycle;
pub mod log_rotation;
pub mod orchestrator;
pub mod probe;
pub mod shutdown;
pub mod sink;

pub use error::DaemonError;
pub use guard::{InstanceClaim, InstanceGuard, InstanceStatus};
pub use lifecycle::{LifecycleManager, StartOutcome, StopOutcome};
pub use orchestrator::{next_sleep, CycleOutcome, SyncOrchestrator, SyncReport, MIN_SLEEP_SECS};
pub use probe::{ProcessControl, SystemProcesses};
pub use shutdown::{Shutdown, Wait};
pub use sink::{OutputSink, TracingSink};
