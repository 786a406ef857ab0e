use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AccountId, CouponId, Credits, LedgerEntryId};
use serde::{Deserialize, Serialize};

use crate::{Account, Coupon, LedgerEntry, NewAccount, NewCoupon, NewLedgerEntry, Result};

/// The individual operations a record store performs.
///
/// Used to label failures and, in the in-memory store, to inject faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreOperation {
    GetCoupon,
    GetAccount,
    DebitAccount,
    CreditAccount,
    MarkCouponSold,
    UnmarkCouponSold,
    InsertLedgerEntry,
    DeleteLedgerEntry,
    LedgerEntriesForCoupon,
    InsertAccount,
    InsertCoupon,
    SoldCouponsExpiring,
}

impl StoreOperation {
    /// Returns true if the operation writes to the store.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            StoreOperation::DebitAccount
                | StoreOperation::CreditAccount
                | StoreOperation::MarkCouponSold
                | StoreOperation::UnmarkCouponSold
                | StoreOperation::InsertLedgerEntry
                | StoreOperation::DeleteLedgerEntry
                | StoreOperation::InsertAccount
                | StoreOperation::InsertCoupon
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreOperation::GetCoupon => "get_coupon",
            StoreOperation::GetAccount => "get_account",
            StoreOperation::DebitAccount => "debit_account",
            StoreOperation::CreditAccount => "credit_account",
            StoreOperation::MarkCouponSold => "mark_coupon_sold",
            StoreOperation::UnmarkCouponSold => "unmark_coupon_sold",
            StoreOperation::InsertLedgerEntry => "insert_ledger_entry",
            StoreOperation::DeleteLedgerEntry => "delete_ledger_entry",
            StoreOperation::LedgerEntriesForCoupon => "ledger_entries_for_coupon",
            StoreOperation::InsertAccount => "insert_account",
            StoreOperation::InsertCoupon => "insert_coupon",
            StoreOperation::SoldCouponsExpiring => "sold_coupons_expiring_between",
        }
    }
}

impl std::fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Row-level access to coupons, balances and the ledger.
///
/// Every method is a single independent round trip. Nothing spans rows
/// atomically; the conditional writes (`debit_account`, `mark_coupon_sold`,
/// `unmark_coupon_sold`) are atomic per row and report whether they applied.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Loads a coupon by id.
    async fn get_coupon(&self, id: CouponId) -> Result<Option<Coupon>>;

    /// Loads an account by id.
    async fn get_account(&self, id: AccountId) -> Result<Option<Account>>;

    /// Atomically subtracts `amount` if the balance covers it.
    ///
    /// Returns the new balance, or `None` if the account is missing or the
    /// balance is too low (no change is made in either case).
    async fn debit_account(&self, id: AccountId, amount: Credits) -> Result<Option<Credits>>;

    /// Atomically adds `amount`.
    ///
    /// Returns the new balance, or `None` if the account is missing.
    async fn credit_account(&self, id: AccountId, amount: Credits) -> Result<Option<Credits>>;

    /// Marks an unsold coupon as sold to `buyer_id`.
    ///
    /// Compare-and-set on the coupon being unsold: returns `false` if the
    /// coupon is missing or was already sold.
    async fn mark_coupon_sold(&self, id: CouponId, buyer_id: AccountId) -> Result<bool>;

    /// Reverts a sale, but only if the coupon is currently sold to `buyer_id`.
    async fn unmark_coupon_sold(&self, id: CouponId, buyer_id: AccountId) -> Result<bool>;

    /// Appends a ledger entry. At most one entry may exist per coupon.
    async fn insert_ledger_entry(&self, entry: NewLedgerEntry) -> Result<LedgerEntry>;

    /// Deletes a ledger entry by id, returning whether it existed.
    async fn delete_ledger_entry(&self, id: LedgerEntryId) -> Result<bool>;

    /// Lists ledger entries referencing a coupon, oldest first.
    async fn ledger_entries_for_coupon(&self, coupon_id: CouponId) -> Result<Vec<LedgerEntry>>;

    /// Creates an account.
    async fn insert_account(&self, account: NewAccount) -> Result<Account>;

    /// Lists a new coupon. The seller account must exist.
    async fn insert_coupon(&self, coupon: NewCoupon) -> Result<Coupon>;

    /// Lists sold coupons whose expiry lies in `[from, to)`, soonest first.
    async fn sold_coupons_expiring_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Coupon>>;
}

/// Extension trait providing convenience methods for record stores.
#[async_trait]
pub trait RecordStoreExt: RecordStore {
    /// Returns an account's balance, or `None` if the account is missing.
    async fn account_balance(&self, id: AccountId) -> Result<Option<Credits>> {
        Ok(self.get_account(id).await?.map(|account| account.credits))
    }

    /// Returns true if a ledger entry proves the coupon's sale.
    async fn has_committed_sale(&self, coupon_id: CouponId) -> Result<bool> {
        Ok(!self.ledger_entries_for_coupon(coupon_id).await?.is_empty())
    }
}

// Blanket implementation for all RecordStore implementations
impl<T: RecordStore + ?Sized> RecordStoreExt for T {}
