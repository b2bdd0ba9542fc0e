//! # Domain Entities
//!
//! Session, snapshot records, chat events and transaction records.

use super::value_objects::{Address, ChainId, EventKey, SessionId, Timestamp, TxRef};
use primitive_types::U256;
use serde::{Deserialize, Serialize};

/// Connected wallet identity. Replaced wholesale on account or chain change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSession {
    /// Connected account.
    pub account_id: Address,
    /// Chain the wallet is currently on.
    pub chain_id: ChainId,
}

impl WalletSession {
    /// Create a new wallet session.
    pub fn new(account_id: Address, chain_id: ChainId) -> Self {
        Self {
            account_id,
            chain_id,
        }
    }
}

/// Latest known token balance of the connected account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalanceSnapshot {
    /// Balance in base units.
    pub amount: U256,
    /// When the read producing this value was issued.
    pub observed_at: Timestamp,
}

/// Latest known allowance of the chat contract over the account's tokens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowanceSnapshot {
    /// Remaining amount the chat contract may pull.
    pub amount: U256,
    /// When the read producing this value was issued.
    pub observed_at: Timestamp,
}

/// External USD price of the token.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    /// USD per whole token.
    pub usd_per_token: f64,
    /// When the fetch was issued.
    pub observed_at: Timestamp,
}

/// Informational contract counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatStats {
    /// Number of messages ever posted.
    pub total_messages: U256,
    /// Tokens burned by all posts, in base units.
    pub total_burned: U256,
}

/// A `MessagePosted` event. Immutable once observed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessageEvent {
    /// Block containing the log.
    pub block_number: u64,
    /// Log index within the block.
    pub log_index: u32,
    /// Poster.
    pub sender: Address,
    /// Message text.
    pub body: String,
    /// Tokens burned for this post.
    pub burn_amount: U256,
    /// Block timestamp reported by the contract (unix seconds).
    pub posted_at: u64,
}

impl ChatMessageEvent {
    /// Event identity.
    pub fn key(&self) -> EventKey {
        EventKey::new(self.block_number, self.log_index)
    }

    /// Was this posted by `account`?
    pub fn is_from(&self, account: &Address) -> bool {
        self.sender == *account
    }
}

/// Health of the synchronized feed as shown to the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FeedStatus {
    /// Initial backfill in progress.
    #[default]
    Loading,
    /// Backfill committed, live subscription running.
    Live,
    /// Subscription dropped, re-subscribing and backfilling the gap.
    Recovering,
    /// Backfill failed or recovery failed repeatedly.
    Unavailable,
}

/// Approval workflow state.
///
/// ```text
/// [Idle] ──submit──→ [Submitted] ──receipt ok──→ [Confirmed]
///                         │
///                         └── rejected / reverted ──→ [Failed]
/// ```
///
/// `Confirmed` and `Failed` are terminal and idle-equivalent: the next
/// submission supersedes them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ApprovalState {
    /// Nothing submitted.
    #[default]
    Idle,
    /// Awaiting confirmation.
    Submitted,
    /// Mined successfully.
    Confirmed,
    /// Rejected or reverted.
    Failed,
}

/// The session's approval transaction record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalTransaction {
    /// Current state.
    pub state: ApprovalState,
    /// Amount requested; always the message cost at submission time.
    pub approved_amount: Option<U256>,
    /// Hash once submitted.
    pub tx_ref: Option<TxRef>,
    /// Last failure message, for the user.
    pub failure: Option<String>,
}

impl ApprovalTransaction {
    /// Is a transaction outstanding?
    pub fn is_pending(&self) -> bool {
        self.state == ApprovalState::Submitted
    }
}

/// Post workflow state.
///
/// ```text
/// [Idle] ──submit──→ [Submitting] ──receipt ok──→ [Succeeded]
///                         │
///                         └── rejected / reverted ──→ [Failed]
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PostState {
    /// Nothing submitted.
    #[default]
    Idle,
    /// Submitted, awaiting confirmation.
    Submitting,
    /// Mined successfully.
    Succeeded,
    /// Rejected or reverted.
    Failed,
}

/// The session's post transaction record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostTransaction {
    /// Current state.
    pub state: PostState,
    /// Trimmed body being posted.
    pub body: Option<String>,
    /// Hash once submitted.
    pub tx_ref: Option<TxRef>,
    /// Last failure message, for the user.
    pub failure: Option<String>,
}

impl PostTransaction {
    /// Is a transaction outstanding?
    pub fn is_pending(&self) -> bool {
        self.state == PostState::Submitting
    }
}

/// Identity of the epoch a write belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionTag {
    /// Epoch id.
    pub id: SessionId,
    /// Wallet, if connected.
    pub wallet: Option<WalletSession>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(sender: Address) -> ChatMessageEvent {
        ChatMessageEvent {
            block_number: 42,
            log_index: 3,
            sender,
            body: "gm".to_string(),
            burn_amount: U256::from(100u64),
            posted_at: 1_700_000_000,
        }
    }

    #[test]
    fn test_event_key() {
        let ev = event(Address([1u8; 20]));
        assert_eq!(ev.key(), EventKey::new(42, 3));
    }

    #[test]
    fn test_event_is_from() {
        let me: Address = "0xABCDEF0000000000000000000000000000000001".parse().unwrap();
        let same: Address = "0xabcdef0000000000000000000000000000000001".parse().unwrap();
        let ev = event(me);
        assert!(ev.is_from(&same));
        assert!(!ev.is_from(&Address([9u8; 20])));
    }

    #[test]
    fn test_transactions_default_idle() {
        assert_eq!(ApprovalTransaction::default().state, ApprovalState::Idle);
        assert!(!ApprovalTransaction::default().is_pending());
        assert_eq!(PostTransaction::default().state, PostState::Idle);
        assert_eq!(FeedStatus::default(), FeedStatus::Loading);
    }
}
