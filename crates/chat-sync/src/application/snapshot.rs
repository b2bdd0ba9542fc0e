//! # Shared Snapshot
//!
//! The single piece of state shared between background tasks and readers.
//!
//! Every session-scoped write names the epoch it belongs to. Writes whose
//! epoch is no longer current are dropped, so a late completion from an
//! ended session can never overwrite the new session's state.

use parking_lot::RwLock;
use primitive_types::U256;
use tokio::sync::watch;
use tracing::debug;

use crate::algorithms::{compute_derived_flags, DerivedFlags, DerivedInputs, EventFeed};
use crate::domain::{
    ActionError, AllowanceSnapshot, ApprovalTransaction, ChainId, ChatStats, FeedStatus,
    PostTransaction, PriceSnapshot, SessionId, TokenBalanceSnapshot, WalletSession,
};

/// Everything the UI renders.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    /// Current epoch.
    pub session_id: SessionId,
    /// Connected wallet, if any.
    pub session: Option<WalletSession>,
    /// Cost of one message, once read.
    pub message_cost: Option<U256>,
    /// Contract counters, once read.
    pub stats: Option<ChatStats>,
    /// Token balance of the connected account.
    pub balance: Option<TokenBalanceSnapshot>,
    /// Allowance of the chat contract.
    pub allowance: Option<AllowanceSnapshot>,
    /// Token price. Survives session changes.
    pub price: Option<PriceSnapshot>,
    /// Synchronized message events.
    pub feed: EventFeed,
    /// Feed health.
    pub feed_status: FeedStatus,
    /// Approval record.
    pub approval: ApprovalTransaction,
    /// Post record.
    pub post: PostTransaction,
    /// Composed, unsent message.
    pub draft: String,
    /// Bumped on every committed write.
    pub version: u64,
}

impl Snapshot {
    /// Inputs for flag recomputation.
    pub fn derived_inputs(&self, target_chain_id: ChainId) -> DerivedInputs {
        DerivedInputs {
            session: self.session,
            target_chain_id,
            message_cost: self.message_cost,
            balance: self.balance.map(|b| b.amount),
            allowance: self.allowance.map(|a| a.amount),
            approval_pending: self.approval.is_pending(),
            post_pending: self.post.is_pending(),
        }
    }

    /// Derived flags for this snapshot.
    pub fn flags(&self, target_chain_id: ChainId) -> DerivedFlags {
        compute_derived_flags(&self.derived_inputs(target_chain_id))
    }

    /// The session, if it can send transactions on `target_chain_id`.
    pub fn writable_session(&self, target_chain_id: ChainId) -> Result<WalletSession, ActionError> {
        let session = self.session.ok_or(ActionError::NotConnected)?;
        if session.chain_id != target_chain_id {
            return Err(ActionError::WrongNetwork {
                expected: target_chain_id,
                actual: session.chain_id,
            });
        }
        Ok(session)
    }
}

/// Read-only view handed to the UI.
#[derive(Clone, Debug)]
pub struct ChatView {
    /// Snapshot at the time of the read.
    pub snapshot: Snapshot,
    /// Flags derived from it.
    pub flags: DerivedFlags,
}

impl ChatView {
    /// Build a view of `snapshot` for the deployment chain.
    pub fn new(snapshot: Snapshot, target_chain_id: ChainId) -> Self {
        let flags = snapshot.flags(target_chain_id);
        Self { snapshot, flags }
    }
}

/// Snapshot behind a lock, with change notification.
pub struct SharedSnapshot {
    inner: RwLock<Snapshot>,
    version_tx: watch::Sender<u64>,
}

impl Default for SharedSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedSnapshot {
    /// Create an empty snapshot at epoch 0.
    pub fn new() -> Self {
        let (version_tx, _) = watch::channel(0);
        Self {
            inner: RwLock::new(Snapshot::default()),
            version_tx,
        }
    }

    /// Copy of the current snapshot.
    pub fn read(&self) -> Snapshot {
        self.inner.read().clone()
    }

    /// Borrow the current snapshot.
    pub fn with<R>(&self, f: impl FnOnce(&Snapshot) -> R) -> R {
        f(&self.inner.read())
    }

    /// Current epoch.
    pub fn current_session(&self) -> SessionId {
        self.inner.read().session_id
    }

    /// Is `session` still the current epoch?
    pub fn is_current(&self, session: SessionId) -> bool {
        self.current_session() == session
    }

    /// Apply a write tagged with `session`.
    ///
    /// Returns `None` (and writes nothing) if the epoch has ended.
    pub fn update<R>(&self, session: SessionId, f: impl FnOnce(&mut Snapshot) -> R) -> Option<R> {
        let (result, version) = {
            let mut guard = self.inner.write();
            if guard.session_id != session {
                debug!(
                    stale = %session,
                    current = %guard.session_id,
                    "[chat-sync] Dropping write from ended session"
                );
                return None;
            }
            let result = f(&mut guard);
            guard.version += 1;
            (result, guard.version)
        };
        self.version_tx.send_replace(version);
        Some(result)
    }

    /// Apply a write that is not scoped to any session.
    pub fn update_global<R>(&self, f: impl FnOnce(&mut Snapshot) -> R) -> R {
        let (result, version) = {
            let mut guard = self.inner.write();
            let result = f(&mut guard);
            guard.version += 1;
            (result, guard.version)
        };
        self.version_tx.send_replace(version);
        result
    }

    /// Switch to epoch `session`, clearing all session-scoped state.
    ///
    /// The price and the version counter carry over.
    pub fn begin_session(&self, session: SessionId, wallet: Option<WalletSession>) {
        let version = {
            let mut guard = self.inner.write();
            let price = guard.price;
            let version = guard.version + 1;
            *guard = Snapshot {
                session_id: session,
                session: wallet,
                price,
                version,
                ..Snapshot::default()
            };
            version
        };
        self.version_tx.send_replace(version);
    }

    /// Receive the version number after every committed write.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version_tx.subscribe()
    }
}
