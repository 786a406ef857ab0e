//! Purchase step identifiers.

use serde::{Deserialize, Serialize};

/// A step of the purchase, in execution order.
///
/// The first two steps are read-only precondition checks. `LoadSeller` is a
/// read inside the mutation phase: it has no compensation of its own, but a
/// failure there still rolls back the debit before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStep {
    LoadCoupon,
    LoadBuyer,
    DebitBuyer,
    LoadSeller,
    CreditSeller,
    MarkSold,
    RecordLedger,
}

impl PurchaseStep {
    /// Returns true if the step writes to the record store.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            PurchaseStep::DebitBuyer
                | PurchaseStep::CreditSeller
                | PurchaseStep::MarkSold
                | PurchaseStep::RecordLedger
        )
    }

    /// Returns the step name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStep::LoadCoupon => "load_coupon",
            PurchaseStep::LoadBuyer => "load_buyer",
            PurchaseStep::DebitBuyer => "debit_buyer",
            PurchaseStep::LoadSeller => "load_seller",
            PurchaseStep::CreditSeller => "credit_seller",
            PurchaseStep::MarkSold => "mark_sold",
            PurchaseStep::RecordLedger => "record_ledger",
        }
    }
}

impl std::fmt::Display for PurchaseStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Formats a list of steps as `a, b, c`.
pub(crate) fn join_steps(steps: &[PurchaseStep]) -> String {
    steps
        .iter()
        .map(PurchaseStep::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_writes_are_mutations() {
        assert!(!PurchaseStep::LoadCoupon.is_mutation());
        assert!(!PurchaseStep::LoadBuyer.is_mutation());
        assert!(!PurchaseStep::LoadSeller.is_mutation());
        assert!(PurchaseStep::DebitBuyer.is_mutation());
        assert!(PurchaseStep::CreditSeller.is_mutation());
        assert!(PurchaseStep::MarkSold.is_mutation());
        assert!(PurchaseStep::RecordLedger.is_mutation());
    }

    #[test]
    fn steps_order_by_execution() {
        assert!(PurchaseStep::DebitBuyer < PurchaseStep::LoadSeller);
        assert!(PurchaseStep::MarkSold < PurchaseStep::RecordLedger);
    }

    #[test]
    fn join_formats_names() {
        assert_eq!(
            join_steps(&[PurchaseStep::MarkSold, PurchaseStep::DebitBuyer]),
            "mark_sold, debit_buyer"
        );
        assert_eq!(join_steps(&[]), "");
    }
}
