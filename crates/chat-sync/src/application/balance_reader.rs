//! # Balance / Allowance Reader
//!
//! Reads `balanceOf(account)` and `allowance(account, chat)` together and
//! commits both or neither.
//!
//! Scheduled ticks skip while a refresh is running. Out-of-cycle refreshes
//! (after an approval or a post) wait for it and then run.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::deadline::with_deadline;
use super::session::SessionContext;
use super::snapshot::SharedSnapshot;
use crate::domain::{
    invariant_fresher, Address, AllowanceSnapshot, SyncResult, TokenBalanceSnapshot,
};
use crate::ports::{ChainRpc, ContractCall, TimeSource};

/// Polls the account's token balance and the chat contract's allowance.
pub struct BalanceAllowanceReader {
    rpc: Arc<dyn ChainRpc>,
    snapshot: Arc<SharedSnapshot>,
    clock: Arc<dyn TimeSource>,
    token: Address,
    spender: Address,
    timeout: Duration,
    in_flight: Mutex<()>,
}

impl BalanceAllowanceReader {
    /// Create a reader for `token`, with `spender` as the allowance holder.
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        snapshot: Arc<SharedSnapshot>,
        clock: Arc<dyn TimeSource>,
        token: Address,
        spender: Address,
        timeout: Duration,
    ) -> Self {
        Self {
            rpc,
            snapshot,
            clock,
            token,
            spender,
            timeout,
            in_flight: Mutex::new(()),
        }
    }

    /// Scheduled tick. Skipped if a refresh is already running.
    pub async fn tick(&self, ctx: &SessionContext) {
        let Ok(_guard) = self.in_flight.try_lock() else {
            debug!(session = %ctx.id(), "[chat-sync] Balance refresh in flight, skipping tick");
            return;
        };
        if let Err(e) = self.read_and_commit(ctx).await {
            warn!(session = %ctx.id(), error = %e, "[chat-sync] Balance/allowance read failed");
        }
    }

    /// Out-of-cycle refresh. Waits for any running refresh first.
    ///
    /// Returns whether new values were committed.
    pub async fn refresh(&self, ctx: &SessionContext) -> SyncResult<bool> {
        let _guard = self.in_flight.lock().await;
        self.read_and_commit(ctx).await
    }

    async fn read_and_commit(&self, ctx: &SessionContext) -> SyncResult<bool> {
        let Some(owner) = ctx.account() else {
            return Ok(false);
        };
        let issued_at = self.clock.now();

        let (balance, allowance) = tokio::join!(
            with_deadline(
                self.timeout,
                self.rpc
                    .read_contract(self.token, ContractCall::BalanceOf { owner })
            ),
            with_deadline(
                self.timeout,
                self.rpc.read_contract(
                    self.token,
                    ContractCall::Allowance {
                        owner,
                        spender: self.spender,
                    },
                )
            ),
        );
        let (balance, allowance) = (balance?, allowance?);

        let committed = self.snapshot.update(ctx.id(), |s| {
            let fresher = invariant_fresher(issued_at, s.balance.map(|b| b.observed_at))
                && invariant_fresher(issued_at, s.allowance.map(|a| a.observed_at));
            if fresher {
                s.balance = Some(TokenBalanceSnapshot {
                    amount: balance,
                    observed_at: issued_at,
                });
                s.allowance = Some(AllowanceSnapshot {
                    amount: allowance,
                    observed_at: issued_at,
                });
            }
            fresher
        });

        match committed {
            Some(true) => {
                debug!(
                    session = %ctx.id(),
                    %balance,
                    %allowance,
                    "[chat-sync] Balance/allowance committed"
                );
                Ok(true)
            }
            Some(false) => {
                debug!(session = %ctx.id(), "[chat-sync] Discarding older balance read");
                Ok(false)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::MockChain;
    use crate::domain::{SessionId, WalletSession};
    use crate::ports::SystemTimeSource;
    use primitive_types::U256;

    const TOKEN: Address = Address([0x70; 20]);
    const CHAT: Address = Address([0xcc; 20]);
    const ME: Address = Address([0x01; 20]);

    fn setup() -> (Arc<MockChain>, Arc<SharedSnapshot>, BalanceAllowanceReader, SessionContext) {
        let chain = Arc::new(MockChain::new(TOKEN, CHAT));
        let snapshot = Arc::new(SharedSnapshot::new());
        let wallet = WalletSession::new(ME, 8453);
        snapshot.begin_session(SessionId(1), Some(wallet));
        let reader = BalanceAllowanceReader::new(
            chain.clone(),
            snapshot.clone(),
            Arc::new(SystemTimeSource),
            TOKEN,
            CHAT,
            Duration::from_secs(1),
        );
        (chain, snapshot, reader, SessionContext::new(SessionId(1), Some(wallet)))
    }

    #[tokio::test]
    async fn test_commits_both_values() {
        let (chain, snapshot, reader, ctx) = setup();
        chain.set_balance(ME, U256::from(500u64));
        chain.set_allowance(ME, CHAT, U256::from(100u64));

        assert_eq!(reader.refresh(&ctx).await, Ok(true));
        let snap = snapshot.read();
        assert_eq!(snap.balance.map(|b| b.amount), Some(U256::from(500u64)));
        assert_eq!(snap.allowance.map(|a| a.amount), Some(U256::from(100u64)));
    }

    #[tokio::test]
    async fn test_failure_commits_neither() {
        let (chain, snapshot, reader, ctx) = setup();
        chain.set_balance(ME, U256::from(500u64));
        chain.fail_call("allowance");

        assert!(reader.refresh(&ctx).await.is_err());
        let snap = snapshot.read();
        assert!(snap.balance.is_none());
        assert!(snap.allowance.is_none());
    }

    #[tokio::test]
    async fn test_stale_session_discarded() {
        let (chain, snapshot, reader, ctx) = setup();
        chain.set_balance(ME, U256::from(500u64));
        snapshot.begin_session(SessionId(2), None);

        assert_eq!(reader.refresh(&ctx).await, Ok(false));
        assert!(snapshot.read().balance.is_none());
    }

    #[tokio::test]
    async fn test_disconnected_session_reads_nothing() {
        let (chain, _snapshot, reader, _) = setup();
        let ctx = SessionContext::new(SessionId(1), None);
        assert_eq!(reader.refresh(&ctx).await, Ok(false));
        assert_eq!(chain.read_count("balanceOf"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_skips_while_refresh_running() {
        let (chain, _snapshot, reader, ctx) = setup();
        let reader = Arc::new(reader);
        chain.set_read_delay(Duration::from_millis(300));

        let r = Arc::clone(&reader);
        let c = ctx.clone();
        let running = tokio::spawn(async move { r.refresh(&c).await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        reader.tick(&ctx).await;
        assert!(running.await.unwrap().is_ok());
        assert_eq!(chain.read_count("balanceOf"), 1);
    }
}
