use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Queue rows by status. `terminated` / `failed` count rows the store has retired.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub assigned: usize,
    pub sent: usize,
    pub in_progress: usize,
    pub terminated: usize,
    pub failed: usize,
}

impl QueueCounts {
    /// Rows still waiting for or undergoing execution.
    pub fn live(&self) -> usize {
        self.pending + self.assigned + self.sent + self.in_progress
    }

    pub fn retired(&self) -> usize {
        self.terminated + self.failed
    }
}

/// Initialize the tracing subscriber.
///
/// - Debug builds: human-readable output
/// - Release builds: JSON output
///
/// Level comes from `RUST_LOG`, defaulting to `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if cfg!(debug_assertions) {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    }
}
