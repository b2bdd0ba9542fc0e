//! # Approval Workflow
//!
//! Grants the chat contract an allowance of exactly one `messageCost`.
//!
//! The entry checks and the move to `Submitted` happen under one snapshot
//! write, so two concurrent calls cannot both submit.

use std::sync::Arc;
use std::time::Duration;

use primitive_types::U256;
use tracing::{error, info, warn};

use super::balance_reader::BalanceAllowanceReader;
use super::deadline::with_deadline;
use super::session::SessionContext;
use super::snapshot::SharedSnapshot;
use crate::domain::{
    ActionError, Address, ApprovalState, ApprovalTransaction, ChainId, ReceiptStatus,
    SyncError, SyncResult, TxRef,
};
use crate::ports::{ChainRpc, ContractCall};

/// Contracts and deadlines used by the transaction workflows.
#[derive(Clone, Copy, Debug)]
pub struct TransactionSettings {
    /// Token being approved and burned.
    pub token_contract: Address,
    /// Chat contract.
    pub chat_contract: Address,
    /// Chain transactions must be sent on.
    pub target_chain_id: ChainId,
    /// Deadline for submission.
    pub request_timeout: Duration,
    /// Deadline for the receipt.
    pub receipt_timeout: Duration,
}

/// Drives `approve(chat, messageCost)`.
pub struct ApprovalWorkflow {
    rpc: Arc<dyn ChainRpc>,
    snapshot: Arc<SharedSnapshot>,
    reader: Arc<BalanceAllowanceReader>,
    settings: TransactionSettings,
}

impl ApprovalWorkflow {
    /// Create the workflow.
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        snapshot: Arc<SharedSnapshot>,
        reader: Arc<BalanceAllowanceReader>,
        settings: TransactionSettings,
    ) -> Self {
        Self {
            rpc,
            snapshot,
            reader,
            settings,
        }
    }

    /// Submit an approval for the session.
    ///
    /// Returns once the transaction is submitted; confirmation runs as a
    /// task owned by the session.
    pub async fn submit(self: &Arc<Self>, ctx: &SessionContext) -> SyncResult<TxRef> {
        let (owner, amount) = self.begin(ctx)?;

        let call = ContractCall::Approve {
            spender: self.settings.chat_contract,
            amount,
        };
        let submitted = with_deadline(
            self.settings.request_timeout,
            self.rpc
                .submit_transaction(owner, self.settings.token_contract, call),
        )
        .await;

        match submitted {
            Ok(tx) => {
                info!(session = %ctx.id(), %tx, %amount, "[chat-sync] Approval submitted");
                self.snapshot
                    .update(ctx.id(), |s| s.approval.tx_ref = Some(tx));
                let this = Arc::clone(self);
                let task_ctx = ctx.clone();
                ctx.spawn("approval-confirm", async move {
                    this.confirm(&task_ctx, tx).await;
                });
                Ok(tx)
            }
            Err(e) => {
                let e = rejected(e);
                error!(session = %ctx.id(), error = %e, "[chat-sync] Approval submission failed");
                self.fail(ctx, &e);
                Err(e)
            }
        }
    }

    /// Check preconditions and move to `Submitted` in one write.
    fn begin(&self, ctx: &SessionContext) -> SyncResult<(Address, U256)> {
        let target = self.settings.target_chain_id;
        let started = self
            .snapshot
            .update(ctx.id(), |s| -> Result<(Address, U256), ActionError> {
                let session = s.writable_session(target)?;
                if s.approval.is_pending() {
                    return Err(ActionError::ApprovalPending);
                }
                let cost = s.message_cost.ok_or(ActionError::MessageCostUnknown)?;
                let flags = s.flags(target);
                if !flags.needs_approval {
                    return Err(ActionError::ApprovalNotNeeded);
                }
                if !flags.has_enough_balance {
                    return Err(ActionError::InsufficientBalance);
                }
                s.approval = ApprovalTransaction {
                    state: ApprovalState::Submitted,
                    approved_amount: Some(cost),
                    tx_ref: None,
                    failure: None,
                };
                Ok((session.account_id, cost))
            })
            .ok_or(SyncError::SessionEnded)?;
        started.map_err(SyncError::from)
    }

    async fn confirm(&self, ctx: &SessionContext, tx: TxRef) {
        let receipt = with_deadline(
            self.settings.receipt_timeout,
            self.rpc.wait_for_receipt(tx),
        )
        .await;

        match receipt {
            Ok(ReceiptStatus::Success) => {
                let applied = self
                    .snapshot
                    .update(ctx.id(), |s| s.approval.state = ApprovalState::Confirmed);
                if applied.is_none() {
                    return;
                }
                info!(session = %ctx.id(), %tx, "[chat-sync] Approval confirmed");
                if let Err(e) = self.reader.refresh(ctx).await {
                    warn!(session = %ctx.id(), error = %e, "[chat-sync] Post-approval refresh failed");
                }
            }
            Ok(ReceiptStatus::Failure) => {
                let e = SyncError::TransactionReverted(tx);
                error!(session = %ctx.id(), error = %e, "[chat-sync] Approval reverted");
                self.fail(ctx, &e);
            }
            Err(e) => {
                error!(session = %ctx.id(), %tx, error = %e, "[chat-sync] Approval confirmation failed");
                self.fail(ctx, &e);
            }
        }
    }

    fn fail(&self, ctx: &SessionContext, e: &SyncError) {
        self.snapshot.update(ctx.id(), |s| {
            s.approval.state = ApprovalState::Failed;
            s.approval.failure = Some(e.to_string());
        });
    }
}

/// Submission failures surface as a rejection unless already named.
pub(crate) fn rejected(e: SyncError) -> SyncError {
    match e {
        SyncError::TransactionRejected(_)
        | SyncError::InvalidAction(_)
        | SyncError::SessionEnded
        | SyncError::Wallet(_) => e,
        other => SyncError::TransactionRejected(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::MockChain;
    use crate::domain::{SessionId, WalletSession};
    use crate::ports::SystemTimeSource;

    const TOKEN: Address = Address([0x70; 20]);
    const CHAT: Address = Address([0xcc; 20]);
    const ME: Address = Address([0x01; 20]);

    struct Fixture {
        chain: Arc<MockChain>,
        snapshot: Arc<SharedSnapshot>,
        workflow: Arc<ApprovalWorkflow>,
        ctx: SessionContext,
    }

    fn fixture(chain_id: ChainId) -> Fixture {
        let chain = Arc::new(MockChain::new(TOKEN, CHAT));
        let snapshot = Arc::new(SharedSnapshot::new());
        let wallet = WalletSession::new(ME, chain_id);
        snapshot.begin_session(SessionId(1), Some(wallet));
        let reader = Arc::new(BalanceAllowanceReader::new(
            chain.clone(),
            snapshot.clone(),
            Arc::new(SystemTimeSource),
            TOKEN,
            CHAT,
            Duration::from_secs(1),
        ));
        let workflow = Arc::new(ApprovalWorkflow::new(
            chain.clone(),
            snapshot.clone(),
            reader,
            TransactionSettings {
                token_contract: TOKEN,
                chat_contract: CHAT,
                target_chain_id: 8453,
                request_timeout: Duration::from_secs(1),
                receipt_timeout: Duration::from_secs(10),
            },
        ));
        Fixture {
            chain,
            snapshot,
            workflow,
            ctx: SessionContext::new(SessionId(1), Some(wallet)),
        }
    }

    fn seed(f: &Fixture, balance: u64, allowance: u64) {
        f.snapshot.update(SessionId(1), |s| {
            s.message_cost = Some(U256::from(100u64));
            s.balance = Some(crate::domain::TokenBalanceSnapshot {
                amount: U256::from(balance),
                observed_at: 0,
            });
            s.allowance = Some(crate::domain::AllowanceSnapshot {
                amount: U256::from(allowance),
                observed_at: 0,
            });
        });
        f.chain.set_balance(ME, U256::from(balance));
        f.chain.set_allowance(ME, CHAT, U256::from(allowance));
    }

    #[tokio::test(start_paused = true)]
    async fn test_approves_exact_message_cost() {
        let f = fixture(8453);
        seed(&f, 100, 0);

        f.workflow.submit(&f.ctx).await.unwrap();
        assert_eq!(f.snapshot.read().approval.state, ApprovalState::Submitted);
        assert_eq!(
            f.chain.submitted_calls(),
            vec![ContractCall::Approve {
                spender: CHAT,
                amount: U256::from(100u64)
            }]
        );

        tokio::time::sleep(Duration::from_secs(2)).await;
        let snap = f.snapshot.read();
        assert_eq!(snap.approval.state, ApprovalState::Confirmed);
        assert_eq!(snap.allowance.map(|a| a.amount), Some(U256::from(100u64)));
        assert!(!snap.flags(8453).needs_approval);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_submit_rejected_while_pending() {
        let f = fixture(8453);
        seed(&f, 100, 0);
        f.chain.set_receipt_delay(Duration::from_secs(5));

        f.workflow.submit(&f.ctx).await.unwrap();
        let second = f.workflow.submit(&f.ctx).await;
        assert_eq!(
            second,
            Err(SyncError::InvalidAction(ActionError::ApprovalPending))
        );
        assert_eq!(f.chain.submitted_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_before_network_call() {
        let f = fixture(1);
        seed(&f, 100, 0);
        assert_eq!(
            f.workflow.submit(&f.ctx).await,
            Err(SyncError::InvalidAction(ActionError::WrongNetwork {
                expected: 8453,
                actual: 1
            }))
        );

        let f = fixture(8453);
        seed(&f, 100, 100);
        assert_eq!(
            f.workflow.submit(&f.ctx).await,
            Err(SyncError::InvalidAction(ActionError::ApprovalNotNeeded))
        );

        let f = fixture(8453);
        seed(&f, 50, 0);
        assert_eq!(
            f.workflow.submit(&f.ctx).await,
            Err(SyncError::InvalidAction(ActionError::InsufficientBalance))
        );
        assert!(f.chain.submitted_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_marks_failed() {
        let f = fixture(8453);
        seed(&f, 100, 0);
        f.chain.reject_next_submission("user denied");

        let result = f.workflow.submit(&f.ctx).await;
        assert!(matches!(result, Err(SyncError::TransactionRejected(_))));
        let snap = f.snapshot.read();
        assert_eq!(snap.approval.state, ApprovalState::Failed);
        assert!(snap.approval.failure.is_some());
        // Failed is idle-equivalent
        assert!(snap.flags(8453).can_approve);
    }

    #[tokio::test(start_paused = true)]
    async fn test_revert_marks_failed() {
        let f = fixture(8453);
        seed(&f, 100, 0);
        f.chain.revert_next_transaction();

        f.workflow.submit(&f.ctx).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(f.snapshot.read().approval.state, ApprovalState::Failed);
        assert_eq!(f.chain.allowance(ME, CHAT), U256::zero());
    }
}
