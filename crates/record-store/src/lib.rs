//! Row-level record store for the coupon marketplace.
//!
//! The store exposes single-row reads and writes over three logical tables
//! (coupons, account balances, ledger entries). It deliberately offers no
//! multi-row transaction: callers that need atomicity across rows build it
//! from the conditional writes provided here.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod store;

pub use common::{AccountId, CouponId, Credits, LedgerEntryId};
pub use error::{RecordStoreError, Result};
pub use memory::InMemoryRecordStore;
pub use postgres::PostgresRecordStore;
pub use records::{Account, Coupon, LedgerEntry, NewAccount, NewCoupon, NewLedgerEntry};
pub use store::{RecordStore, RecordStoreExt, StoreOperation};
