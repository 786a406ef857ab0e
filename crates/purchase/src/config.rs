//! Orchestrator tuning.

use std::time::Duration;

/// Default bound on a single record store or notification call.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for a [`PurchaseOrchestrator`](crate::PurchaseOrchestrator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurchaseConfig {
    /// Maximum time a single call may take. An elapsed timeout counts as that
    /// step's failure, compensations included.
    pub step_timeout: Duration,
}

impl PurchaseConfig {
    pub fn with_step_timeout(mut self, step_timeout: Duration) -> Self {
        self.step_timeout = step_timeout;
        self
    }
}

impl Default for PurchaseConfig {
    fn default() -> Self {
        Self {
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }
}
