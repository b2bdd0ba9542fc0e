//! # Price Feed
//!
//! Best-effort USD price. A failed fetch keeps the previous price.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::deadline::with_deadline;
use super::snapshot::SharedSnapshot;
use crate::domain::{invariant_fresher, Address, PriceSnapshot, SyncError, SyncResult};
use crate::ports::{PriceOracle, TimeSource};

/// Polls the price oracle. Not scoped to any session.
pub struct PriceFeed {
    oracle: Arc<dyn PriceOracle>,
    snapshot: Arc<SharedSnapshot>,
    clock: Arc<dyn TimeSource>,
    token: Address,
    timeout: Duration,
    in_flight: Mutex<()>,
}

impl PriceFeed {
    /// Create a price feed for `token`.
    pub fn new(
        oracle: Arc<dyn PriceOracle>,
        snapshot: Arc<SharedSnapshot>,
        clock: Arc<dyn TimeSource>,
        token: Address,
        timeout: Duration,
    ) -> Self {
        Self {
            oracle,
            snapshot,
            clock,
            token,
            timeout,
            in_flight: Mutex::new(()),
        }
    }

    /// Scheduled tick. Failures are logged and the old price kept.
    pub async fn tick(&self) {
        let Ok(_guard) = self.in_flight.try_lock() else {
            return;
        };
        if let Err(e) = self.fetch_and_commit().await {
            warn!(error = %e, "[chat-sync] Price fetch failed, keeping previous price");
        }
    }

    /// Fetch now, waiting for any running fetch first.
    pub async fn refresh(&self) -> SyncResult<f64> {
        let _guard = self.in_flight.lock().await;
        self.fetch_and_commit().await
    }

    async fn fetch_and_commit(&self) -> SyncResult<f64> {
        let issued_at = self.clock.now();
        let price = with_deadline(self.timeout, self.oracle.usd_price(self.token)).await?;
        if !price.is_finite() || price < 0.0 {
            return Err(SyncError::PriceUnavailable(format!("invalid price {price}")));
        }

        self.snapshot.update_global(|s| {
            if invariant_fresher(issued_at, s.price.map(|p| p.observed_at)) {
                s.price = Some(PriceSnapshot {
                    usd_per_token: price,
                    observed_at: issued_at,
                });
            }
        });
        debug!(usd = price, "[chat-sync] Price updated");
        Ok(price)
    }
}
