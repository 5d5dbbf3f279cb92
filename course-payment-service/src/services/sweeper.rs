//! Background expiry of abandoned checkouts.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::config::{SweeperConfig, MAX_PENDING_TTL_MINUTES};
use crate::services::metrics::record_expired;
use crate::services::store::{PaymentStore, StoreResult};

pub struct PendingPaymentSweeper {
    store: Arc<dyn PaymentStore>,
    ttl: chrono::Duration,
    interval: Duration,
}

impl PendingPaymentSweeper {
    pub fn new(store: Arc<dyn PaymentStore>, config: &SweeperConfig) -> Self {
        let minutes = config.pending_ttl_minutes.min(MAX_PENDING_TTL_MINUTES) as i64;
        Self {
            store,
            ttl: chrono::Duration::minutes(minutes),
            // `tokio::time::interval` panics on a zero period.
            interval: config.interval.max(Duration::from_millis(1)),
        }
    }

    /// Fails pending payments older than the TTL. Enrollments stay pending
    /// so the learner can start a new checkout.
    #[tracing::instrument(skip(self), name = "pending_payment_sweep")]
    pub async fn run_cycle(&self) -> StoreResult<u64> {
        let cutoff = Utc::now() - self.ttl;
        let expired = self.store.expire_pending_payments(cutoff).await?;
        if expired > 0 {
            tracing::info!(expired, cutoff = %cutoff, "Expired pending payments");
            record_expired(expired);
        }
        Ok(expired)
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Starting pending payment sweeper");

        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        tracing::error!(error = %e, "Pending payment sweep failed");
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        tracing::info!("Pending payment sweeper received shutdown signal");
                        break;
                    }
                }
            }
        }

        tracing::info!("Pending payment sweeper stopped");
    }
}
