//! # Session Coordinator
//!
//! Owns the epoch lifecycle.
//!
//! ```text
//! wallet change ──→ end epoch k ──→ cancel tasks of k
//!                                   bump id, reset snapshot
//!                                   start tasks of k+1
//! ```
//!
//! Every write carries its epoch id, so a completion from epoch `k` that
//! lands after the switch is dropped by the snapshot.
//!
//! The price poller is global and survives epoch changes.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info};

use super::approval::{ApprovalWorkflow, TransactionSettings};
use super::balance_reader::BalanceAllowanceReader;
use super::contract_stats::ContractStatsReader;
use super::deadline::with_deadline;
use super::event_sync::{EventLogSynchronizer, EventSyncSettings};
use super::post::PostWorkflow;
use super::price_feed::PriceFeed;
use super::scheduler::{schedule, TaskHandle};
use super::session::SessionContext;
use super::snapshot::{ChatView, SharedSnapshot};
use crate::config::SyncConfig;
use crate::domain::{ActionError, SessionId, SyncError, SyncResult, TxRef, WalletSession};
use crate::ports::{ChainRpc, ChatClientApi, PriceOracle, SystemTimeSource, TimeSource, WalletProvider};

/// Coordinates sessions, background tasks and the workflows.
pub struct SessionCoordinator {
    config: SyncConfig,
    wallet: Arc<dyn WalletProvider>,
    snapshot: Arc<SharedSnapshot>,
    reader: Arc<BalanceAllowanceReader>,
    stats: Arc<ContractStatsReader>,
    price: Arc<PriceFeed>,
    events: Arc<EventLogSynchronizer>,
    approval: Arc<ApprovalWorkflow>,
    post: Arc<PostWorkflow>,
    active: Mutex<Option<SessionContext>>,
    price_task: Mutex<Option<TaskHandle>>,
}

impl SessionCoordinator {
    /// Create a coordinator using the system clock.
    pub fn new(
        config: SyncConfig,
        rpc: Arc<dyn ChainRpc>,
        oracle: Arc<dyn PriceOracle>,
        wallet: Arc<dyn WalletProvider>,
    ) -> Self {
        Self::with_time_source(config, rpc, oracle, wallet, Arc::new(SystemTimeSource))
    }

    /// Create a coordinator with an explicit clock.
    pub fn with_time_source(
        config: SyncConfig,
        rpc: Arc<dyn ChainRpc>,
        oracle: Arc<dyn PriceOracle>,
        wallet: Arc<dyn WalletProvider>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        let snapshot = Arc::new(SharedSnapshot::new());
        let timeout = config.request_timeout();

        let reader = Arc::new(BalanceAllowanceReader::new(
            Arc::clone(&rpc),
            Arc::clone(&snapshot),
            Arc::clone(&clock),
            config.token_contract,
            config.chat_contract,
            timeout,
        ));
        let stats = Arc::new(ContractStatsReader::new(
            Arc::clone(&rpc),
            Arc::clone(&snapshot),
            config.chat_contract,
            timeout,
        ));
        let price = Arc::new(PriceFeed::new(
            oracle,
            Arc::clone(&snapshot),
            clock,
            config.token_contract,
            timeout,
        ));
        let events = Arc::new(EventLogSynchronizer::new(
            Arc::clone(&rpc),
            Arc::clone(&snapshot),
            EventSyncSettings {
                chat_contract: config.chat_contract,
                chunk_blocks: config.backfill_chunk_blocks,
                request_timeout: timeout,
                retry_delay: config.feed_retry_delay(),
                failure_threshold: config.feed_failure_threshold,
            },
        ));

        let tx_settings = TransactionSettings {
            token_contract: config.token_contract,
            chat_contract: config.chat_contract,
            target_chain_id: config.target_chain_id,
            request_timeout: timeout,
            receipt_timeout: config.receipt_timeout(),
        };
        let approval = Arc::new(ApprovalWorkflow::new(
            Arc::clone(&rpc),
            Arc::clone(&snapshot),
            Arc::clone(&reader),
            tx_settings,
        ));
        let post = Arc::new(PostWorkflow::new(
            rpc,
            Arc::clone(&snapshot),
            Arc::clone(&reader),
            tx_settings,
            config.post_refresh_delay(),
        ));

        Self {
            config,
            wallet,
            snapshot,
            reader,
            stats,
            price,
            events,
            approval,
            post,
            active: Mutex::new(None),
            price_task: Mutex::new(None),
        }
    }

    /// Start the price poller and a disconnected epoch.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        {
            let mut price_task = self.price_task.lock();
            if price_task.is_none() {
                let price = Arc::clone(&self.price);
                *price_task = Some(schedule(
                    "price-poll",
                    self.config.price_poll_interval(),
                    move || {
                        let price = Arc::clone(&price);
                        async move { price.tick().await }
                    },
                ));
            }
        }
        if self.active.lock().is_none() {
            self.apply_wallet(None);
        }
        info!(
            chat = %self.config.chat_contract,
            token = %self.config.token_contract,
            chain = self.config.target_chain_id,
            "[chat-sync] Coordinator started"
        );
    }

    /// Bring the epoch in line with `wallet`.
    ///
    /// A changed account or chain ends the current epoch and starts a new
    /// one. Returns the id of the epoch now current.
    pub fn apply_wallet(&self, wallet: Option<WalletSession>) -> SessionId {
        let mut active = self.active.lock();
        if let Some(ctx) = active.as_ref() {
            if ctx.wallet() == wallet {
                return ctx.id();
            }
            ctx.end();
            info!(
                session = %ctx.id(),
                "[chat-sync] Session ended, cancelled its tasks"
            );
        }

        let id = self.snapshot.current_session().next();
        self.snapshot.begin_session(id, wallet);
        let ctx = SessionContext::new(id, wallet);
        self.start_tasks(&ctx);
        info!(
            session = %id,
            account = ?wallet.map(|w| w.account_id.to_string()),
            chain = ?wallet.map(|w| w.chain_id),
            "[chat-sync] Session started"
        );
        *active = Some(ctx);
        id
    }

    fn start_tasks(&self, ctx: &SessionContext) {
        ctx.spawn("event-sync", Arc::clone(&self.events).run(ctx.clone()));

        let stats = Arc::clone(&self.stats);
        let stats_ctx = ctx.clone();
        ctx.schedule("stats-poll", self.config.stats_poll_interval(), move || {
            let stats = Arc::clone(&stats);
            let ctx = stats_ctx.clone();
            async move { stats.tick(&ctx).await }
        });

        if ctx.account().is_some() {
            let reader = Arc::clone(&self.reader);
            let reader_ctx = ctx.clone();
            ctx.schedule("balance-poll", self.config.balance_poll_interval(), move || {
                let reader = Arc::clone(&reader);
                let ctx = reader_ctx.clone();
                async move { reader.tick(&ctx).await }
            });
        }
    }

    /// The current epoch.
    pub fn active_session(&self) -> Option<SessionContext> {
        self.active.lock().clone()
    }

    fn require_session(&self) -> SyncResult<SessionContext> {
        self.active_session()
            .ok_or(SyncError::InvalidAction(ActionError::NotConnected))
    }

    /// Shared snapshot.
    pub fn snapshot(&self) -> Arc<SharedSnapshot> {
        Arc::clone(&self.snapshot)
    }

    /// Receive a version number after every snapshot write.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.snapshot.subscribe()
    }

    /// Configuration in use.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Cancel every task, including the price poller.
    pub fn shutdown(&self) {
        if let Some(ctx) = self.active.lock().take() {
            ctx.end();
        }
        if let Some(task) = self.price_task.lock().take() {
            task.cancel();
        }
        info!("[chat-sync] Coordinator shut down");
    }
}

#[async_trait]
impl ChatClientApi for SessionCoordinator {
    async fn connect_check(&self) -> SyncResult<Option<WalletSession>> {
        let wallet = with_deadline(self.config.request_timeout(), self.wallet.current_session()).await?;
        let id = self.apply_wallet(wallet);
        debug!(session = %id, "[chat-sync] Wallet checked");
        Ok(wallet)
    }

    async fn switch_network(&self) -> SyncResult<()> {
        with_deadline(
            self.config.request_timeout(),
            self.wallet.switch_chain(self.config.target_chain_id),
        )
        .await?;
        self.connect_check().await?;
        Ok(())
    }

    async fn approve(&self) -> SyncResult<TxRef> {
        let ctx = self.require_session()?;
        self.approval.submit(&ctx).await
    }

    async fn post(&self, body: &str) -> SyncResult<TxRef> {
        let ctx = self.require_session()?;
        self.post.submit(&ctx, body).await
    }

    fn set_draft(&self, body: &str) {
        if let Some(ctx) = self.active_session() {
            self.snapshot.update(ctx.id(), |s| s.draft = body.to_string());
        }
    }

    fn view(&self) -> ChatView {
        ChatView::new(self.snapshot.read(), self.config.target_chain_id)
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        if let Some(ctx) = self.active.get_mut().take() {
            ctx.end();
        }
    }
}
