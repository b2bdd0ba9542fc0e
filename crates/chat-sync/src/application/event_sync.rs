//! # Event Log Synchronizer
//!
//! Keeps the feed of `MessagePosted` events complete and ordered.
//!
//! ## Protocol
//!
//! ```text
//! head = blockNumber()
//! sub  = subscribe(from = head)        live events buffer in the channel
//! logs = getLogs(start ..= head)       chunked, committed all-or-nothing
//! feed.extend(logs); status = Live
//! while let Some(ev) = sub.next() { feed.admit(ev) }
//! subscription dropped: start = highest block seen, repeat
//! ```
//!
//! Backfill and live ranges overlap at `head`; the feed drops duplicates.
//!
//! ## Status
//!
//! | Situation | Status |
//! |-----------|--------|
//! | Initial backfill running | `Loading` |
//! | Initial backfill failed | `Unavailable` |
//! | Subscription dropped, recovering silently | `Live` |
//! | Recovery failed fewer than N times in a row | `Recovering` |
//! | Recovery failed N times in a row | `Unavailable` |

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::deadline::with_deadline;
use super::session::SessionContext;
use super::snapshot::SharedSnapshot;
use crate::domain::{Address, ChatMessageEvent, FeedStatus, SyncError, SyncResult};
use crate::ports::{ChainRpc, EventSubscription};

/// Feed synchronizer settings.
#[derive(Clone, Copy, Debug)]
pub struct EventSyncSettings {
    /// Chat contract emitting the events.
    pub chat_contract: Address,
    /// Maximum block span of one log query.
    pub chunk_blocks: u64,
    /// Per-request deadline.
    pub request_timeout: Duration,
    /// Delay between attempts.
    pub retry_delay: Duration,
    /// Consecutive recovery failures before `Unavailable`.
    pub failure_threshold: u32,
}

/// Maintains the session's event feed.
pub struct EventLogSynchronizer {
    rpc: Arc<dyn ChainRpc>,
    snapshot: Arc<SharedSnapshot>,
    settings: EventSyncSettings,
}

impl EventLogSynchronizer {
    /// Create a synchronizer.
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        snapshot: Arc<SharedSnapshot>,
        settings: EventSyncSettings,
    ) -> Self {
        Self {
            rpc,
            snapshot,
            settings,
        }
    }

    /// Run until the session ends.
    pub async fn run(self: Arc<Self>, ctx: SessionContext) {
        let mut start_block = 0u64;
        let mut went_live = false;
        let mut failures = 0u32;

        while self.snapshot.is_current(ctx.id()) {
            match self.attach(&ctx, start_block).await {
                Ok((subscription, head)) => {
                    failures = 0;
                    went_live = true;
                    start_block = self.follow(&ctx, subscription, head).await;
                    info!(
                        session = %ctx.id(),
                        resume_from = start_block,
                        "[chat-sync] Event subscription dropped, recovering"
                    );
                }
                Err(SyncError::SessionEnded) => return,
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let status = feed_status_after_failure(
                        went_live,
                        failures,
                        self.settings.failure_threshold,
                    );
                    warn!(
                        session = %ctx.id(),
                        error = %e,
                        failures,
                        ?status,
                        "[chat-sync] Event sync attempt failed"
                    );
                    self.snapshot.update(ctx.id(), |s| s.feed_status = status);
                    tokio::time::sleep(self.settings.retry_delay).await;
                }
            }
        }
    }

    /// Subscribe at head, then backfill `start_block ..= head` and commit.
    async fn attach(
        &self,
        ctx: &SessionContext,
        start_block: u64,
    ) -> SyncResult<(EventSubscription, u64)> {
        let timeout = self.settings.request_timeout;
        let head = with_deadline(timeout, self.rpc.block_number()).await?;
        let subscription = with_deadline(
            timeout,
            self.rpc
                .subscribe_message_events(self.settings.chat_contract, head),
        )
        .await?;

        let events = self.backfill(start_block, head).await?;
        let fetched = events.len();
        let admitted = self
            .snapshot
            .update(ctx.id(), |s| {
                let admitted = s.feed.extend(events);
                s.feed_status = FeedStatus::Live;
                admitted
            })
            .ok_or(SyncError::SessionEnded)?;

        info!(
            session = %ctx.id(),
            from = start_block,
            to = head,
            fetched,
            admitted,
            "[chat-sync] Backfill committed, feed live"
        );
        Ok((subscription, head))
    }

    /// Read every event in `[from, to]`, chunked. Fails as a whole.
    pub async fn backfill(&self, from: u64, to: u64) -> SyncResult<Vec<ChatMessageEvent>> {
        let chunk = self.settings.chunk_blocks.max(1);
        let mut events = Vec::new();
        let mut cursor = from;
        while cursor <= to {
            let end = cursor.saturating_add(chunk - 1).min(to);
            let mut batch = with_deadline(
                self.settings.request_timeout,
                self.rpc
                    .message_events(self.settings.chat_contract, cursor, end),
            )
            .await?;
            events.append(&mut batch);
            if end == u64::MAX {
                break;
            }
            cursor = end + 1;
        }
        Ok(events)
    }

    /// Admit live events until the subscription drops.
    ///
    /// Returns the block to resume backfill from.
    async fn follow(&self, ctx: &SessionContext, mut subscription: EventSubscription, head: u64) -> u64 {
        let mut highest = head;
        while let Some(event) = subscription.next().await {
            highest = highest.max(event.block_number);
            let key = event.key();
            match self.snapshot.update(ctx.id(), |s| s.feed.admit(event)) {
                Some(true) => debug!(
                    block = key.block_number,
                    log_index = key.log_index,
                    "[chat-sync] Live event admitted"
                ),
                Some(false) => debug!(
                    block = key.block_number,
                    log_index = key.log_index,
                    "[chat-sync] Duplicate live event dropped"
                ),
                None => break,
            }
        }
        highest
    }
}

/// Status to show after `failures` consecutive failed attempts.
pub fn feed_status_after_failure(went_live: bool, failures: u32, threshold: u32) -> FeedStatus {
    if !went_live || failures >= threshold {
        FeedStatus::Unavailable
    } else {
        FeedStatus::Recovering
    }
}
