//! # Contract Stats Reader
//!
//! Reads `messageCost` until it is known for the session, then keeps
//! `totalMessages` / `totalBurned` current.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::deadline::with_deadline;
use super::session::SessionContext;
use super::snapshot::SharedSnapshot;
use crate::domain::{Address, ChatStats, SyncResult};
use crate::ports::{ChainRpc, ContractCall};

/// Reads chat contract parameters and counters.
pub struct ContractStatsReader {
    rpc: Arc<dyn ChainRpc>,
    snapshot: Arc<SharedSnapshot>,
    chat_contract: Address,
    timeout: Duration,
    in_flight: Mutex<()>,
}

impl ContractStatsReader {
    /// Create a reader for `chat_contract`.
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        snapshot: Arc<SharedSnapshot>,
        chat_contract: Address,
        timeout: Duration,
    ) -> Self {
        Self {
            rpc,
            snapshot,
            chat_contract,
            timeout,
            in_flight: Mutex::new(()),
        }
    }

    /// Scheduled tick.
    pub async fn tick(&self, ctx: &SessionContext) {
        let Ok(_guard) = self.in_flight.try_lock() else {
            return;
        };
        if let Err(e) = self.read_message_cost(ctx).await {
            warn!(session = %ctx.id(), error = %e, "[chat-sync] messageCost read failed");
        }
        if let Err(e) = self.read_totals(ctx).await {
            warn!(session = %ctx.id(), error = %e, "[chat-sync] Counter read failed");
        }
    }

    /// Read `messageCost` if the session does not know it yet.
    pub async fn read_message_cost(&self, ctx: &SessionContext) -> SyncResult<()> {
        if self.snapshot.with(|s| s.message_cost.is_some()) {
            return Ok(());
        }
        let cost = with_deadline(
            self.timeout,
            self.rpc.read_contract(self.chat_contract, ContractCall::MessageCost),
        )
        .await?;
        let set = self.snapshot.update(ctx.id(), |s| {
            if s.message_cost.is_none() {
                s.message_cost = Some(cost);
            }
        });
        if set.is_some() {
            info!(session = %ctx.id(), %cost, "[chat-sync] Message cost known");
        }
        Ok(())
    }

    /// Read both counters. Committed together.
    pub async fn read_totals(&self, ctx: &SessionContext) -> SyncResult<()> {
        let (messages, burned) = tokio::join!(
            with_deadline(
                self.timeout,
                self.rpc.read_contract(self.chat_contract, ContractCall::TotalMessages)
            ),
            with_deadline(
                self.timeout,
                self.rpc.read_contract(self.chat_contract, ContractCall::TotalBurned)
            ),
        );
        let stats = ChatStats {
            total_messages: messages?,
            total_burned: burned?,
        };
        self.snapshot.update(ctx.id(), |s| s.stats = Some(stats));
        debug!(
            session = %ctx.id(),
            total_messages = %stats.total_messages,
            total_burned = %stats.total_burned,
            "[chat-sync] Counters updated"
        );
        Ok(())
    }
}
