//! Notification sink trait and implementations.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::Credits;

use crate::error::NotificationError;

/// Confirmation sent to the buyer after a committed purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseNotice {
    pub buyer_contact: String,
    pub coupon_title: String,
    pub code: String,
    pub price: Credits,
    pub expiry_date: Option<DateTime<Utc>>,
}

/// Notice sent to the seller after a committed sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleNotice {
    pub seller_contact: String,
    pub coupon_title: String,
    pub price: Credits,
    /// Buyer contact, masked with [`mask_contact`].
    pub buyer_contact: String,
}

/// Reminder sent to a buyer whose coupon is about to expire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryNotice {
    pub buyer_contact: String,
    pub coupon_title: String,
    pub code: String,
    pub expiry_date: DateTime<Utc>,
}

/// Best-effort outbound notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Sends the buyer their purchase confirmation and coupon code.
    async fn notify_purchase(&self, notice: &PurchaseNotice) -> Result<(), NotificationError>;

    /// Tells the seller their coupon was sold.
    async fn notify_sale(&self, notice: &SaleNotice) -> Result<(), NotificationError>;

    /// Reminds a buyer that a purchased coupon expires soon.
    async fn notify_expiry(&self, notice: &ExpiryNotice) -> Result<(), NotificationError>;
}

/// Hides most of an email's local part: `alice@example.com` becomes
/// `a***@example.com`.
///
/// Contacts without an `@`, or with fewer than two characters before it, are
/// returned unchanged.
pub fn mask_contact(contact: &str) -> String {
    let Some(at) = contact.rfind('@') else {
        return contact.to_string();
    };
    let (local, domain) = contact.split_at(at);
    let mut chars = local.chars();
    match (chars.next(), chars.next()) {
        (Some(first), Some(_)) if domain.len() > 1 => format!("{first}***{domain}"),
        _ => contact.to_string(),
    }
}

#[async_trait]
impl<T: NotificationSink + ?Sized> NotificationSink for Arc<T> {
    async fn notify_purchase(&self, notice: &PurchaseNotice) -> Result<(), NotificationError> {
        (**self).notify_purchase(notice).await
    }

    async fn notify_sale(&self, notice: &SaleNotice) -> Result<(), NotificationError> {
        (**self).notify_sale(notice).await
    }

    async fn notify_expiry(&self, notice: &ExpiryNotice) -> Result<(), NotificationError> {
        (**self).notify_expiry(notice).await
    }
}

#[derive(Debug, Default)]
struct InMemoryNotificationState {
    purchases: Vec<PurchaseNotice>,
    sales: Vec<SaleNotice>,
    expiries: Vec<ExpiryNotice>,
    fail_on_purchase: bool,
    fail_on_sale: bool,
    fail_on_expiry: bool,
}

/// In-memory notification sink for testing.
///
/// Records every delivered notice; failures can be toggled per kind.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationSink {
    state: Arc<Mutex<InMemoryNotificationState>>,
}

impl InMemoryNotificationSink {
    /// Creates a new in-memory notification sink.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, InMemoryNotificationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configures the sink to fail buyer confirmations.
    pub fn set_fail_on_purchase(&self, fail: bool) {
        self.state().fail_on_purchase = fail;
    }

    /// Configures the sink to fail seller notices.
    pub fn set_fail_on_sale(&self, fail: bool) {
        self.state().fail_on_sale = fail;
    }

    /// Configures the sink to fail expiry reminders.
    pub fn set_fail_on_expiry(&self, fail: bool) {
        self.state().fail_on_expiry = fail;
    }

    pub fn purchase_notices(&self) -> Vec<PurchaseNotice> {
        self.state().purchases.clone()
    }

    pub fn sale_notices(&self) -> Vec<SaleNotice> {
        self.state().sales.clone()
    }

    pub fn expiry_notices(&self) -> Vec<ExpiryNotice> {
        self.state().expiries.clone()
    }
}

#[async_trait]
impl NotificationSink for InMemoryNotificationSink {
    async fn notify_purchase(&self, notice: &PurchaseNotice) -> Result<(), NotificationError> {
        let mut state = self.state();
        if state.fail_on_purchase {
            return Err(NotificationError::Delivery(
                "purchase confirmation rejected".to_string(),
            ));
        }
        state.purchases.push(notice.clone());
        Ok(())
    }

    async fn notify_sale(&self, notice: &SaleNotice) -> Result<(), NotificationError> {
        let mut state = self.state();
        if state.fail_on_sale {
            return Err(NotificationError::Delivery(
                "sale notification rejected".to_string(),
            ));
        }
        state.sales.push(notice.clone());
        Ok(())
    }

    async fn notify_expiry(&self, notice: &ExpiryNotice) -> Result<(), NotificationError> {
        let mut state = self.state();
        if state.fail_on_expiry {
            return Err(NotificationError::Delivery(
                "expiry reminder rejected".to_string(),
            ));
        }
        state.expiries.push(notice.clone());
        Ok(())
    }
}

/// Sink that only writes structured log lines.
///
/// Used by the server when no mail transport is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotificationSink;

#[async_trait]
impl NotificationSink for LoggingNotificationSink {
    async fn notify_purchase(&self, notice: &PurchaseNotice) -> Result<(), NotificationError> {
        tracing::info!(
            to = %mask_contact(&notice.buyer_contact),
            coupon = %notice.coupon_title,
            price = %notice.price,
            "purchase confirmation"
        );
        Ok(())
    }

    async fn notify_sale(&self, notice: &SaleNotice) -> Result<(), NotificationError> {
        tracing::info!(
            to = %mask_contact(&notice.seller_contact),
            coupon = %notice.coupon_title,
            price = %notice.price,
            buyer = %notice.buyer_contact,
            "sale notification"
        );
        Ok(())
    }

    async fn notify_expiry(&self, notice: &ExpiryNotice) -> Result<(), NotificationError> {
        tracing::info!(
            to = %mask_contact(&notice.buyer_contact),
            coupon = %notice.coupon_title,
            expiry = %notice.expiry_date,
            "expiry reminder"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_local_part() {
        assert_eq!(mask_contact("alice@example.com"), "a***@example.com");
        assert_eq!(mask_contact("bo@x.io"), "b***@x.io");
    }

    #[test]
    fn leaves_short_or_malformed_contacts() {
        assert_eq!(mask_contact("a@example.com"), "a@example.com");
        assert_eq!(mask_contact("no-at-sign"), "no-at-sign");
        assert_eq!(mask_contact("alice@"), "alice@");
    }

    #[tokio::test]
    async fn records_delivered_notices() {
        let sink = InMemoryNotificationSink::new();
        let notice = SaleNotice {
            seller_contact: "seller@example.com".to_string(),
            coupon_title: "Tea set".to_string(),
            price: Credits::new(4).unwrap(),
            buyer_contact: "b***@example.com".to_string(),
        };

        sink.notify_sale(&notice).await.unwrap();
        assert_eq!(sink.sale_notices(), vec![notice]);
        assert!(sink.purchase_notices().is_empty());
    }

    #[tokio::test]
    async fn toggled_failure_does_not_record() {
        let sink = InMemoryNotificationSink::new();
        sink.set_fail_on_purchase(true);
        let notice = PurchaseNotice {
            buyer_contact: "buyer@example.com".to_string(),
            coupon_title: "Tea set".to_string(),
            code: "TEA-1".to_string(),
            price: Credits::new(4).unwrap(),
            expiry_date: None,
        };

        assert!(sink.notify_purchase(&notice).await.is_err());
        assert!(sink.purchase_notices().is_empty());
    }
}
