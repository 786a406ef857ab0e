//! Purchase saga state machine.

use serde::{Deserialize, Serialize};

/// The state of a purchase in its lifecycle.
///
/// State transitions:
/// ```text
/// NotStarted ──► Running ──┬──► Committed
///                          └──► Compensating ──┬──► RolledBack
///                                              └──► Inconsistent
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PurchaseState {
    /// Preconditions have not passed yet; nothing has been written.
    #[default]
    NotStarted,

    /// Mutation steps are being executed.
    Running,

    /// A step failed and compensating writes are in progress.
    Compensating,

    /// The ledger entry exists; the sale is final (terminal state).
    Committed,

    /// Every completed step was compensated (terminal state).
    RolledBack,

    /// At least one compensation failed; persisted state needs manual
    /// reconciliation (terminal state).
    Inconsistent,
}

impl PurchaseState {
    /// Returns true if the purchase can begin its mutation phase.
    pub fn can_run(&self) -> bool {
        matches!(self, PurchaseState::NotStarted)
    }

    /// Returns true if the purchase can begin compensation.
    pub fn can_compensate(&self) -> bool {
        matches!(self, PurchaseState::Running)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PurchaseState::Committed | PurchaseState::RolledBack | PurchaseState::Inconsistent
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseState::NotStarted => "NotStarted",
            PurchaseState::Running => "Running",
            PurchaseState::Compensating => "Compensating",
            PurchaseState::Committed => "Committed",
            PurchaseState::RolledBack => "RolledBack",
            PurchaseState::Inconsistent => "Inconsistent",
        }
    }
}

impl std::fmt::Display for PurchaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
