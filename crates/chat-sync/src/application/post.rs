//! # Post Workflow
//!
//! Submits `postMessage(body)`. The message itself shows up through the
//! event feed; this workflow only tracks the transaction.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use super::approval::{rejected, TransactionSettings};
use super::balance_reader::BalanceAllowanceReader;
use super::deadline::with_deadline;
use super::session::SessionContext;
use super::snapshot::SharedSnapshot;
use crate::domain::{
    validate_message_body, ActionError, Address, PostState, PostTransaction, ReceiptStatus,
    SyncError, SyncResult, TxRef,
};
use crate::ports::{ChainRpc, ContractCall};

/// Drives `postMessage(body)`.
pub struct PostWorkflow {
    rpc: Arc<dyn ChainRpc>,
    snapshot: Arc<SharedSnapshot>,
    reader: Arc<BalanceAllowanceReader>,
    settings: TransactionSettings,
    refresh_delay: Duration,
}

impl PostWorkflow {
    /// Create the workflow. `refresh_delay` is the wait before the
    /// post-success balance refresh.
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        snapshot: Arc<SharedSnapshot>,
        reader: Arc<BalanceAllowanceReader>,
        settings: TransactionSettings,
        refresh_delay: Duration,
    ) -> Self {
        Self {
            rpc,
            snapshot,
            reader,
            settings,
            refresh_delay,
        }
    }

    /// Submit `raw_body` for the session.
    ///
    /// The body is trimmed and validated first; invalid bodies never reach
    /// the network.
    pub async fn submit(self: &Arc<Self>, ctx: &SessionContext, raw_body: &str) -> SyncResult<TxRef> {
        let body = validate_message_body(raw_body)?;
        let sender = self.begin(ctx, raw_body, &body)?;

        let submitted = with_deadline(
            self.settings.request_timeout,
            self.rpc.submit_transaction(
                sender,
                self.settings.chat_contract,
                ContractCall::PostMessage { body: body.clone() },
            ),
        )
        .await;

        match submitted {
            Ok(tx) => {
                info!(
                    session = %ctx.id(),
                    %tx,
                    chars = body.chars().count(),
                    "[chat-sync] Post submitted"
                );
                self.snapshot.update(ctx.id(), |s| s.post.tx_ref = Some(tx));
                let this = Arc::clone(self);
                let task_ctx = ctx.clone();
                ctx.spawn("post-confirm", async move {
                    this.confirm(&task_ctx, tx).await;
                });
                Ok(tx)
            }
            Err(e) => {
                let e = rejected(e);
                error!(session = %ctx.id(), error = %e, "[chat-sync] Post submission failed");
                self.fail(ctx, &e);
                Err(e)
            }
        }
    }

    fn begin(&self, ctx: &SessionContext, raw_body: &str, body: &str) -> SyncResult<Address> {
        let target = self.settings.target_chain_id;
        let started = self
            .snapshot
            .update(ctx.id(), |s| -> Result<Address, ActionError> {
                let session = s.writable_session(target)?;
                if s.post.is_pending() {
                    return Err(ActionError::PostPending);
                }
                if s.message_cost.is_none() {
                    return Err(ActionError::MessageCostUnknown);
                }
                let flags = s.flags(target);
                if flags.needs_approval {
                    return Err(ActionError::ApprovalRequired);
                }
                if !flags.has_enough_balance {
                    return Err(ActionError::InsufficientBalance);
                }
                s.draft = raw_body.to_string();
                s.post = PostTransaction {
                    state: PostState::Submitting,
                    body: Some(body.to_string()),
                    tx_ref: None,
                    failure: None,
                };
                Ok(session.account_id)
            })
            .ok_or(SyncError::SessionEnded)?;
        started.map_err(SyncError::from)
    }

    async fn confirm(self: Arc<Self>, ctx: &SessionContext, tx: TxRef) {
        let receipt = with_deadline(
            self.settings.receipt_timeout,
            self.rpc.wait_for_receipt(tx),
        )
        .await;

        match receipt {
            Ok(ReceiptStatus::Success) => {
                let applied = self.snapshot.update(ctx.id(), |s| {
                    s.post.state = PostState::Succeeded;
                    s.draft.clear();
                });
                if applied.is_none() {
                    return;
                }
                info!(session = %ctx.id(), %tx, "[chat-sync] Post confirmed");

                let reader = Arc::clone(&self.reader);
                let refresh_ctx = ctx.clone();
                ctx.schedule_once("post-refresh", self.refresh_delay, async move {
                    if let Err(e) = reader.refresh(&refresh_ctx).await {
                        warn!(
                            session = %refresh_ctx.id(),
                            error = %e,
                            "[chat-sync] Post-success refresh failed"
                        );
                    }
                });
            }
            Ok(ReceiptStatus::Failure) => {
                let e = SyncError::TransactionReverted(tx);
                error!(session = %ctx.id(), error = %e, "[chat-sync] Post reverted");
                self.fail(ctx, &e);
            }
            Err(e) => {
                error!(session = %ctx.id(), %tx, error = %e, "[chat-sync] Post confirmation failed");
                self.fail(ctx, &e);
            }
        }
    }

    fn fail(&self, ctx: &SessionContext, e: &SyncError) {
        // The draft is kept so the user can retry.
        self.snapshot.update(ctx.id(), |s| {
            s.post.state = PostState::Failed;
            s.post.failure = Some(e.to_string());
        });
    }
}
