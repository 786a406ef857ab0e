//! Rows stored in the record store.

use chrono::{DateTime, Utc};
use common::{AccountId, CouponId, Credits, LedgerEntryId};
use serde::{Deserialize, Serialize};

/// A marketplace account and its credit balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Contact address used for purchase and sale notifications.
    pub email: Option<String>,
    pub credits: Credits,
    pub created_at: DateTime<Utc>,
}

/// A coupon listing.
///
/// The coupon is sold exactly when `buyer_id` is set; there is no separate
/// flag that could disagree with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: CouponId,
    pub seller_id: AccountId,
    pub buyer_id: Option<AccountId>,
    pub title: String,
    pub description: Option<String>,
    /// The redeemable code. Revealed to the buyer once the sale commits.
    pub code: String,
    pub price: Credits,
    pub category: Option<String>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    /// Returns true once the coupon has been sold.
    pub fn is_sold(&self) -> bool {
        self.buyer_id.is_some()
    }
}

/// An immutable record of a completed purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub buyer_id: AccountId,
    pub seller_id: AccountId,
    pub amount: Credits,
    pub coupon_id: CouponId,
    pub created_at: DateTime<Utc>,
}

/// Input for creating an account.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub id: AccountId,
    pub email: Option<String>,
    pub credits: Credits,
}

impl NewAccount {
    /// Creates an account input with a fresh id and no contact address.
    pub fn new(credits: Credits) -> Self {
        Self {
            id: AccountId::new(),
            email: None,
            credits,
        }
    }

    /// Sets the contact address.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Overrides the generated id.
    pub fn with_id(mut self, id: AccountId) -> Self {
        self.id = id;
        self
    }
}

/// Input for listing a new, unsold coupon.
#[derive(Debug, Clone)]
pub struct NewCoupon {
    pub id: CouponId,
    pub seller_id: AccountId,
    pub title: String,
    pub description: Option<String>,
    pub code: String,
    pub price: Credits,
    pub category: Option<String>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub image_url: Option<String>,
}

impl NewCoupon {
    /// Creates a listing input with a fresh id and no optional display fields.
    pub fn new(
        seller_id: AccountId,
        title: impl Into<String>,
        code: impl Into<String>,
        price: Credits,
    ) -> Self {
        Self {
            id: CouponId::new(),
            seller_id,
            title: title.into(),
            description: None,
            code: code.into(),
            price,
            category: None,
            expiry_date: None,
            image_url: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_expiry_date(mut self, expiry_date: DateTime<Utc>) -> Self {
        self.expiry_date = Some(expiry_date);
        self
    }

    pub fn with_image_url(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }

    /// Materializes the row as it is stored, unsold.
    pub(crate) fn into_coupon(self, created_at: DateTime<Utc>) -> Coupon {
        Coupon {
            id: self.id,
            seller_id: self.seller_id,
            buyer_id: None,
            title: self.title,
            description: self.description,
            code: self.code,
            price: self.price,
            category: self.category,
            expiry_date: self.expiry_date,
            image_url: self.image_url,
            created_at,
        }
    }
}

/// Input for appending a ledger entry.
///
/// The id is chosen by the caller so that an insert whose outcome is unknown
/// (for example after a timeout) can still be located and removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerEntry {
    pub id: LedgerEntryId,
    pub buyer_id: AccountId,
    pub seller_id: AccountId,
    pub amount: Credits,
    pub coupon_id: CouponId,
}

impl NewLedgerEntry {
    /// Creates a ledger entry input with a fresh id.
    pub fn new(
        coupon_id: CouponId,
        buyer_id: AccountId,
        seller_id: AccountId,
        amount: Credits,
    ) -> Self {
        Self {
            id: LedgerEntryId::new(),
            buyer_id,
            seller_id,
            amount,
            coupon_id,
        }
    }

    pub(crate) fn into_entry(self, created_at: DateTime<Utc>) -> LedgerEntry {
        LedgerEntry {
            id: self.id,
            buyer_id: self.buyer_id,
            seller_id: self.seller_id,
            amount: self.amount,
            coupon_id: self.coupon_id,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_coupon_is_unsold() {
        let seller = AccountId::new();
        let coupon = NewCoupon::new(seller, "Pizza 2-for-1", "PIZZA-42", Credits::new(20).unwrap())
            .with_category("Food")
            .into_coupon(Utc::now());

        assert!(!coupon.is_sold());
        assert_eq!(coupon.seller_id, seller);
        assert_eq!(coupon.category.as_deref(), Some("Food"));
    }

    #[test]
    fn coupon_is_sold_once_buyer_is_set() {
        let mut coupon = NewCoupon::new(AccountId::new(), "Tee", "TEE-1", Credits::zero())
            .into_coupon(Utc::now());
        coupon.buyer_id = Some(AccountId::new());
        assert!(coupon.is_sold());
    }

    #[test]
    fn ledger_entry_keeps_caller_chosen_id() {
        let input = NewLedgerEntry::new(
            CouponId::new(),
            AccountId::new(),
            AccountId::new(),
            Credits::new(7).unwrap(),
        );
        let id = input.id;
        let entry = input.into_entry(Utc::now());
        assert_eq!(entry.id, id);
        assert_eq!(entry.amount.amount(), 7);
    }
}
