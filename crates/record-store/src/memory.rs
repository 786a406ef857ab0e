use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    Account, AccountId, Coupon, CouponId, Credits, LedgerEntry, LedgerEntryId, NewAccount,
    NewCoupon, NewLedgerEntry, RecordStoreError, Result,
    store::{RecordStore, StoreOperation},
};

#[derive(Debug, Default)]
struct Tables {
    accounts: HashMap<AccountId, Account>,
    coupons: HashMap<CouponId, Coupon>,
    ledger: Vec<LedgerEntry>,
}

/// Faults and call counters used by tests to simulate an unreliable store.
#[derive(Debug, Default)]
struct FaultPlan {
    failing: HashSet<StoreOperation>,
    failing_for_account: HashSet<(StoreOperation, AccountId)>,
    response_delays: HashMap<StoreOperation, Duration>,
    response_delays_for_account: HashMap<(StoreOperation, AccountId), Duration>,
    calls: HashMap<StoreOperation, usize>,
}

/// In-memory record store implementation for testing and local runs.
///
/// All tables live behind one lock, so every conditional write is atomic with
/// respect to concurrent callers, like a single-statement `UPDATE ... WHERE`
/// against a database. Faults can be injected per operation (optionally per
/// account) and responses can be delayed after a write has been applied, which
/// reproduces "the write landed but the caller timed out".
#[derive(Clone, Default)]
pub struct InMemoryRecordStore {
    tables: Arc<RwLock<Tables>>,
    faults: Arc<Mutex<FaultPlan>>,
}

impl InMemoryRecordStore {
    /// Creates a new empty in-memory record store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call of `operation` fail with `Unavailable`.
    pub fn fail_on(&self, operation: StoreOperation) {
        self.faults().failing.insert(operation);
    }

    /// Makes calls of `operation` that target `account` fail with `Unavailable`.
    pub fn fail_on_account(&self, operation: StoreOperation, account: AccountId) {
        self.faults()
            .failing_for_account
            .insert((operation, account));
    }

    /// Delays the response of `operation` after its effect has been applied.
    pub fn delay_response_on(&self, operation: StoreOperation, delay: Duration) {
        self.faults().response_delays.insert(operation, delay);
    }

    /// Delays the response of `operation` on `account` after its effect has
    /// been applied.
    pub fn delay_response_on_account(
        &self,
        operation: StoreOperation,
        account: AccountId,
        delay: Duration,
    ) {
        self.faults()
            .response_delays_for_account
            .insert((operation, account), delay);
    }

    /// Removes every injected fault and delay.
    pub fn clear_faults(&self) {
        let mut faults = self.faults();
        faults.failing.clear();
        faults.failing_for_account.clear();
        faults.response_delays.clear();
        faults.response_delays_for_account.clear();
    }

    /// Returns how many times `operation` has been called, failed calls included.
    pub fn call_count(&self, operation: StoreOperation) -> usize {
        self.faults().calls.get(&operation).copied().unwrap_or(0)
    }

    /// Returns the number of write calls made so far.
    pub fn mutation_count(&self) -> usize {
        self.faults()
            .calls
            .iter()
            .filter(|(op, _)| op.is_mutation())
            .map(|(_, count)| count)
            .sum()
    }

    /// Resets all call counters.
    pub fn reset_call_counts(&self) {
        self.faults().calls.clear();
    }

    /// Returns the total number of ledger entries.
    pub async fn ledger_len(&self) -> usize {
        self.tables.read().await.ledger.len()
    }

    /// Returns every ledger entry in insertion order.
    pub async fn ledger_entries(&self) -> Vec<LedgerEntry> {
        self.tables.read().await.ledger.clone()
    }

    /// Deletes an account row outright.
    pub async fn remove_account(&self, id: AccountId) -> Option<Account> {
        self.tables.write().await.accounts.remove(&id)
    }

    fn faults(&self) -> std::sync::MutexGuard<'_, FaultPlan> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the call and fails it if a fault is injected for it.
    fn enter(&self, operation: StoreOperation, account: Option<AccountId>) -> Result<()> {
        let mut faults = self.faults();
        *faults.calls.entry(operation).or_insert(0) += 1;

        let targeted = account
            .map(|id| faults.failing_for_account.contains(&(operation, id)))
            .unwrap_or(false);
        if faults.failing.contains(&operation) || targeted {
            tracing::debug!(%operation, "injected record store fault");
            return Err(RecordStoreError::Unavailable { operation });
        }
        Ok(())
    }

    /// Waits out any response delay configured for `operation`.
    async fn respond(&self, operation: StoreOperation, account: Option<AccountId>) {
        let delay = {
            let faults = self.faults();
            account
                .and_then(|id| faults.response_delays_for_account.get(&(operation, id)))
                .or_else(|| faults.response_delays.get(&operation))
                .copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get_coupon(&self, id: CouponId) -> Result<Option<Coupon>> {
        self.enter(StoreOperation::GetCoupon, None)?;
        let coupon = self.tables.read().await.coupons.get(&id).cloned();
        self.respond(StoreOperation::GetCoupon, None).await;
        Ok(coupon)
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        self.enter(StoreOperation::GetAccount, Some(id))?;
        let account = self.tables.read().await.accounts.get(&id).cloned();
        self.respond(StoreOperation::GetAccount, Some(id)).await;
        Ok(account)
    }

    async fn debit_account(&self, id: AccountId, amount: Credits) -> Result<Option<Credits>> {
        self.enter(StoreOperation::DebitAccount, Some(id))?;
        let balance = {
            let mut tables = self.tables.write().await;
            tables.accounts.get_mut(&id).and_then(|account| {
                let remaining = account.credits.checked_sub(amount)?;
                account.credits = remaining;
                Some(remaining)
            })
        };
        self.respond(StoreOperation::DebitAccount, Some(id)).await;
        Ok(balance)
    }

    async fn credit_account(&self, id: AccountId, amount: Credits) -> Result<Option<Credits>> {
        self.enter(StoreOperation::CreditAccount, Some(id))?;
        let balance = {
            let mut tables = self.tables.write().await;
            match tables.accounts.get_mut(&id) {
                Some(account) => {
                    let total = account.credits.checked_add(amount).ok_or_else(|| {
                        RecordStoreError::Constraint(format!("balance overflow for account {id}"))
                    })?;
                    account.credits = total;
                    Some(total)
                }
                None => None,
            }
        };
        self.respond(StoreOperation::CreditAccount, Some(id)).await;
        Ok(balance)
    }

    async fn mark_coupon_sold(&self, id: CouponId, buyer_id: AccountId) -> Result<bool> {
        self.enter(StoreOperation::MarkCouponSold, None)?;
        let applied = {
            let mut tables = self.tables.write().await;
            match tables.coupons.get_mut(&id) {
                Some(coupon) if !coupon.is_sold() => {
                    coupon.buyer_id = Some(buyer_id);
                    true
                }
                _ => false,
            }
        };
        self.respond(StoreOperation::MarkCouponSold, None).await;
        Ok(applied)
    }

    async fn unmark_coupon_sold(&self, id: CouponId, buyer_id: AccountId) -> Result<bool> {
        self.enter(StoreOperation::UnmarkCouponSold, None)?;
        let applied = {
            let mut tables = self.tables.write().await;
            match tables.coupons.get_mut(&id) {
                Some(coupon) if coupon.buyer_id == Some(buyer_id) => {
                    coupon.buyer_id = None;
                    true
                }
                _ => false,
            }
        };
        self.respond(StoreOperation::UnmarkCouponSold, None).await;
        Ok(applied)
    }

    async fn insert_ledger_entry(&self, entry: NewLedgerEntry) -> Result<LedgerEntry> {
        self.enter(StoreOperation::InsertLedgerEntry, None)?;
        let inserted = {
            let mut tables = self.tables.write().await;
            if tables
                .ledger
                .iter()
                .any(|e| e.id == entry.id || e.coupon_id == entry.coupon_id)
            {
                return Err(RecordStoreError::Constraint(format!(
                    "ledger entry already recorded for coupon {}",
                    entry.coupon_id
                )));
            }
            let inserted = entry.into_entry(Utc::now());
            tables.ledger.push(inserted.clone());
            inserted
        };
        self.respond(StoreOperation::InsertLedgerEntry, None).await;
        Ok(inserted)
    }

    async fn delete_ledger_entry(&self, id: LedgerEntryId) -> Result<bool> {
        self.enter(StoreOperation::DeleteLedgerEntry, None)?;
        let existed = {
            let mut tables = self.tables.write().await;
            let before = tables.ledger.len();
            tables.ledger.retain(|e| e.id != id);
            tables.ledger.len() != before
        };
        self.respond(StoreOperation::DeleteLedgerEntry, None).await;
        Ok(existed)
    }

    async fn ledger_entries_for_coupon(&self, coupon_id: CouponId) -> Result<Vec<LedgerEntry>> {
        self.enter(StoreOperation::LedgerEntriesForCoupon, None)?;
        let entries = self
            .tables
            .read()
            .await
            .ledger
            .iter()
            .filter(|e| e.coupon_id == coupon_id)
            .cloned()
            .collect();
        self.respond(StoreOperation::LedgerEntriesForCoupon, None).await;
        Ok(entries)
    }

    async fn insert_account(&self, account: NewAccount) -> Result<Account> {
        self.enter(StoreOperation::InsertAccount, Some(account.id))?;
        let mut tables = self.tables.write().await;
        if tables.accounts.contains_key(&account.id) {
            return Err(RecordStoreError::Constraint(format!(
                "account {} already exists",
                account.id
            )));
        }
        let stored = Account {
            id: account.id,
            email: account.email,
            credits: account.credits,
            created_at: Utc::now(),
        };
        tables.accounts.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn insert_coupon(&self, coupon: NewCoupon) -> Result<Coupon> {
        self.enter(StoreOperation::InsertCoupon, Some(coupon.seller_id))?;
        let mut tables = self.tables.write().await;
        if !tables.accounts.contains_key(&coupon.seller_id) {
            return Err(RecordStoreError::Constraint(format!(
                "seller account {} does not exist",
                coupon.seller_id
            )));
        }
        if tables.coupons.contains_key(&coupon.id) {
            return Err(RecordStoreError::Constraint(format!(
                "coupon {} already exists",
                coupon.id
            )));
        }
        let stored = coupon.into_coupon(Utc::now());
        tables.coupons.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn sold_coupons_expiring_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Coupon>> {
        self.enter(StoreOperation::SoldCouponsExpiring, None)?;
        let tables = self.tables.read().await;
        let mut coupons: Vec<Coupon> = tables
            .coupons
            .values()
            .filter(|c| c.is_sold())
            .filter(|c| c.expiry_date.is_some_and(|expiry| expiry >= from && expiry < to))
            .cloned()
            .collect();
        coupons.sort_by_key(|c| c.expiry_date);
        Ok(coupons)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RecordStoreExt;

    fn credits(amount: i64) -> Credits {
        Credits::new(amount).unwrap()
    }

    async fn seed(store: &InMemoryRecordStore) -> (Account, Account, Coupon) {
        let seller = store
            .insert_account(NewAccount::new(credits(5)).with_email("seller@example.com"))
            .await
            .unwrap();
        let buyer = store
            .insert_account(NewAccount::new(credits(50)))
            .await
            .unwrap();
        let coupon = store
            .insert_coupon(NewCoupon::new(seller.id, "Spa day", "SPA-20", credits(20)))
            .await
            .unwrap();
        (seller, buyer, coupon)
    }

    #[tokio::test]
    async fn debit_applies_only_when_covered() {
        let store = InMemoryRecordStore::new();
        let (_, buyer, _) = seed(&store).await;

        let balance = store.debit_account(buyer.id, credits(20)).await.unwrap();
        assert_eq!(balance, Some(credits(30)));

        let rejected = store.debit_account(buyer.id, credits(31)).await.unwrap();
        assert_eq!(rejected, None);
        assert_eq!(
            store.account_balance(buyer.id).await.unwrap(),
            Some(credits(30))
        );
    }

    #[tokio::test]
    async fn debit_and_credit_missing_account() {
        let store = InMemoryRecordStore::new();
        let missing = AccountId::new();
        assert_eq!(store.debit_account(missing, credits(1)).await.unwrap(), None);
        assert_eq!(store.credit_account(missing, credits(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn credit_adds_to_balance() {
        let store = InMemoryRecordStore::new();
        let (seller, _, _) = seed(&store).await;
        let balance = store.credit_account(seller.id, credits(20)).await.unwrap();
        assert_eq!(balance, Some(credits(25)));
    }

    #[tokio::test]
    async fn mark_sold_is_compare_and_set() {
        let store = InMemoryRecordStore::new();
        let (_, buyer, coupon) = seed(&store).await;
        let other = AccountId::new();

        assert!(store.mark_coupon_sold(coupon.id, buyer.id).await.unwrap());
        assert!(!store.mark_coupon_sold(coupon.id, other).await.unwrap());

        let stored = store.get_coupon(coupon.id).await.unwrap().unwrap();
        assert_eq!(stored.buyer_id, Some(buyer.id));
    }

    #[tokio::test]
    async fn unmark_requires_matching_buyer() {
        let store = InMemoryRecordStore::new();
        let (_, buyer, coupon) = seed(&store).await;
        store.mark_coupon_sold(coupon.id, buyer.id).await.unwrap();

        assert!(!store.unmark_coupon_sold(coupon.id, AccountId::new()).await.unwrap());
        assert!(store.unmark_coupon_sold(coupon.id, buyer.id).await.unwrap());

        let stored = store.get_coupon(coupon.id).await.unwrap().unwrap();
        assert!(!stored.is_sold());
        assert!(stored.buyer_id.is_none());
    }

    #[tokio::test]
    async fn one_ledger_entry_per_coupon() {
        let store = InMemoryRecordStore::new();
        let (seller, buyer, coupon) = seed(&store).await;

        let first = NewLedgerEntry::new(coupon.id, buyer.id, seller.id, coupon.price);
        store.insert_ledger_entry(first).await.unwrap();

        let second = NewLedgerEntry::new(coupon.id, buyer.id, seller.id, coupon.price);
        let result = store.insert_ledger_entry(second).await;
        assert!(matches!(result, Err(RecordStoreError::Constraint(_))));
        assert_eq!(store.ledger_len().await, 1);
        assert!(store.has_committed_sale(coupon.id).await.unwrap());
    }

    #[tokio::test]
    async fn delete_ledger_entry_reports_existence() {
        let store = InMemoryRecordStore::new();
        let (seller, buyer, coupon) = seed(&store).await;
        let entry = NewLedgerEntry::new(coupon.id, buyer.id, seller.id, coupon.price);
        let id = entry.id;
        store.insert_ledger_entry(entry).await.unwrap();

        assert!(store.delete_ledger_entry(id).await.unwrap());
        assert!(!store.delete_ledger_entry(id).await.unwrap());
        assert_eq!(store.ledger_len().await, 0);
    }

    #[tokio::test]
    async fn coupon_requires_existing_seller() {
        let store = InMemoryRecordStore::new();
        let result = store
            .insert_coupon(NewCoupon::new(AccountId::new(), "Ghost", "G-1", credits(1)))
            .await;
        assert!(matches!(result, Err(RecordStoreError::Constraint(_))));
    }

    #[tokio::test]
    async fn injected_fault_fails_without_applying() {
        let store = InMemoryRecordStore::new();
        let (_, buyer, _) = seed(&store).await;

        store.fail_on(StoreOperation::DebitAccount);
        let result = store.debit_account(buyer.id, credits(10)).await;
        assert!(matches!(
            result,
            Err(RecordStoreError::Unavailable {
                operation: StoreOperation::DebitAccount
            })
        ));
        assert_eq!(
            store.account_balance(buyer.id).await.unwrap(),
            Some(credits(50))
        );

        store.clear_faults();
        assert!(store.debit_account(buyer.id, credits(10)).await.is_ok());
    }

    #[tokio::test]
    async fn account_targeted_fault_spares_other_accounts() {
        let store = InMemoryRecordStore::new();
        let (seller, buyer, _) = seed(&store).await;

        store.fail_on_account(StoreOperation::CreditAccount, seller.id);
        assert!(store.credit_account(seller.id, credits(1)).await.is_err());
        assert!(store.credit_account(buyer.id, credits(1)).await.is_ok());
    }

    #[tokio::test]
    async fn counts_calls_and_mutations() {
        let store = InMemoryRecordStore::new();
        let (_, buyer, coupon) = seed(&store).await;
        store.reset_call_counts();

        store.get_coupon(coupon.id).await.unwrap();
        store.get_account(buyer.id).await.unwrap();
        assert_eq!(store.mutation_count(), 0);

        store.debit_account(buyer.id, credits(1)).await.unwrap();
        assert_eq!(store.mutation_count(), 1);
        assert_eq!(store.call_count(StoreOperation::GetCoupon), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_response_still_applies_write() {
        let store = InMemoryRecordStore::new();
        let (seller, buyer, coupon) = seed(&store).await;
        store.delay_response_on(StoreOperation::InsertLedgerEntry, Duration::from_secs(5));

        let entry = NewLedgerEntry::new(coupon.id, buyer.id, seller.id, coupon.price);
        let result = tokio::time::timeout(
            Duration::from_millis(100),
            store.insert_ledger_entry(entry),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(store.ledger_len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn account_delay_targets_one_account() {
        let store = InMemoryRecordStore::new();
        let (seller, buyer, _) = seed(&store).await;
        store.delay_response_on_account(
            StoreOperation::CreditAccount,
            seller.id,
            Duration::from_secs(5),
        );

        let delayed = tokio::time::timeout(
            Duration::from_millis(100),
            store.credit_account(seller.id, credits(3)),
        )
        .await;
        let prompt = tokio::time::timeout(
            Duration::from_millis(100),
            store.credit_account(buyer.id, credits(3)),
        )
        .await;

        assert!(delayed.is_err());
        assert!(prompt.is_ok());
        assert_eq!(
            store.account_balance(seller.id).await.unwrap(),
            Some(credits(8))
        );
    }

    #[tokio::test]
    async fn expiring_window_lists_only_sold_coupons() {
        let store = InMemoryRecordStore::new();
        let (seller, buyer, _) = seed(&store).await;
        let now = Utc::now();

        let inside = store
            .insert_coupon(
                NewCoupon::new(seller.id, "Inside", "IN-1", credits(1))
                    .with_expiry_date(now + chrono::Duration::hours(30)),
            )
            .await
            .unwrap();
        let unsold = store
            .insert_coupon(
                NewCoupon::new(seller.id, "Unsold", "UN-1", credits(1))
                    .with_expiry_date(now + chrono::Duration::hours(30)),
            )
            .await
            .unwrap();
        let outside = store
            .insert_coupon(
                NewCoupon::new(seller.id, "Outside", "OUT-1", credits(1))
                    .with_expiry_date(now + chrono::Duration::hours(72)),
            )
            .await
            .unwrap();
        store.mark_coupon_sold(inside.id, buyer.id).await.unwrap();
        store.mark_coupon_sold(outside.id, buyer.id).await.unwrap();

        let found = store
            .sold_coupons_expiring_between(
                now + chrono::Duration::days(1),
                now + chrono::Duration::days(2),
            )
            .await
            .unwrap();
        let ids: Vec<_> = found.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![inside.id]);
        assert!(!ids.contains(&unsold.id));
    }
}
