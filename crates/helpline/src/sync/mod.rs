//! Scheduled delta synchronization

pub mod orchestrator;
pub mod report;
pub mod scheduler;
pub mod state;

pub use orchestrator::SyncOrchestrator;
pub use report::{ActiveRun, Outcome, SyncReport, SyncStatus, Trigger};
pub use scheduler::Scheduler;
pub use state::{StateStore, SyncState};
