//! Expiry reminders for purchased coupons.

use chrono::{DateTime, Duration, Utc};
use futures_util::future::join_all;
use record_store::{Coupon, RecordStore, RecordStoreError};
use serde::{Deserialize, Serialize};

use crate::config::PurchaseConfig;
use crate::error::NotificationError;
use crate::services::notifications::{ExpiryNotice, NotificationSink};

/// Outcome of one reminder run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderReport {
    /// Reminders actually delivered.
    pub reminders_sent: usize,
    /// Sold coupons expiring in the reminder window.
    pub total_expiring: usize,
}

/// Reminds buyers of coupons that expire tomorrow.
pub struct ExpiryReminderJob<S, N>
where
    S: RecordStore,
    N: NotificationSink,
{
    store: S,
    notifier: N,
    config: PurchaseConfig,
}

impl<S, N> ExpiryReminderJob<S, N>
where
    S: RecordStore,
    N: NotificationSink,
{
    pub fn new(store: S, notifier: N) -> Self {
        Self::with_config(store, notifier, PurchaseConfig::default())
    }

    pub fn with_config(store: S, notifier: N, config: PurchaseConfig) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    /// Sends a reminder for every sold coupon expiring in
    /// `[now + 1 day, now + 2 days)`.
    ///
    /// Reminders are sent concurrently. Buyers without an email and failed
    /// deliveries are skipped and excluded from `reminders_sent`; only the
    /// initial listing can fail the run.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self, now: DateTime<Utc>) -> Result<ReminderReport, RecordStoreError> {
        let from = now + Duration::days(1);
        let to = now + Duration::days(2);
        let expiring = self.store.sold_coupons_expiring_between(from, to).await?;

        let results = join_all(expiring.iter().map(|coupon| self.remind(coupon))).await;
        let report = ReminderReport {
            reminders_sent: results.into_iter().filter(|sent| *sent).count(),
            total_expiring: expiring.len(),
        };

        metrics::counter!("expiry_reminders_sent_total").increment(report.reminders_sent as u64);
        tracing::info!(
            reminders_sent = report.reminders_sent,
            total_expiring = report.total_expiring,
            "expiry reminders processed"
        );
        Ok(report)
    }

    async fn remind(&self, coupon: &Coupon) -> bool {
        let (Some(buyer_id), Some(expiry_date)) = (coupon.buyer_id, coupon.expiry_date) else {
            return false;
        };

        let buyer = match self.store.get_account(buyer_id).await {
            Ok(Some(buyer)) => buyer,
            Ok(None) => {
                tracing::warn!(coupon_id = %coupon.id, %buyer_id, "buyer of expiring coupon not found");
                return false;
            }
            Err(err) => {
                tracing::warn!(coupon_id = %coupon.id, error = %err, "failed to load buyer");
                return false;
            }
        };
        let Some(buyer_contact) = buyer.email else {
            return false;
        };

        let notice = ExpiryNotice {
            buyer_contact,
            coupon_title: coupon.title.clone(),
            code: coupon.code.clone(),
            expiry_date,
        };
        let sent = tokio::time::timeout(self.config.step_timeout, self.notifier.notify_expiry(&notice))
            .await
            .unwrap_or(Err(NotificationError::Timeout));

        match sent {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(coupon_id = %coupon.id, error = %err, "expiry reminder failed");
                false
            }
        }
    }
}
