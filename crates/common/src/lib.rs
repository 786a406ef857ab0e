//! Shared identifiers and value objects for the coupon marketplace.

pub mod credits;
pub mod types;

pub use credits::Credits;
pub use types::{AccountId, CouponId, IncidentId, LedgerEntryId};
