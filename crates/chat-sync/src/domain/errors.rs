//! # Domain Errors
//!
//! Error types for the chat sync engine.
//!
//! Two layers:
//! - [`SyncError`] - runtime failures of reads, subscriptions and transactions
//! - [`ActionError`] - caller errors rejected synchronously, before any network call

use super::value_objects::TxRef;
use thiserror::Error;

/// Caller errors. Returned before any network request is made.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// No wallet account is connected.
    #[error("No wallet connected")]
    NotConnected,

    /// The wallet is on a different chain than the deployment.
    #[error("Wrong network: expected chain {expected}, wallet is on {actual}")]
    WrongNetwork {
        /// Deployment chain id
        expected: u64,
        /// Wallet chain id
        actual: u64,
    },

    /// `messageCost` has not been read yet for this session.
    #[error("Message cost not yet known")]
    MessageCostUnknown,

    /// An approval transaction is already outstanding.
    #[error("Approval already submitted")]
    ApprovalPending,

    /// The allowance already covers one message.
    #[error("Approval not needed: allowance covers message cost")]
    ApprovalNotNeeded,

    /// The allowance does not cover one message.
    #[error("Approval required before posting")]
    ApprovalRequired,

    /// The token balance does not cover one message.
    #[error("Insufficient token balance")]
    InsufficientBalance,

    /// A post transaction is already outstanding.
    #[error("Post already submitting")]
    PostPending,

    /// The message is empty after trimming.
    #[error("Message is empty")]
    EmptyMessage,

    /// The message exceeds the maximum length.
    #[error("Message too long: {len} > {max} characters")]
    MessageTooLong {
        /// Length in code points after trimming
        len: usize,
        /// Maximum allowed
        max: usize,
    },
}

/// Sync engine error types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SyncError {
    /// Transport-level failure talking to an endpoint.
    #[error("Network error: {0}")]
    Network(String),

    /// The endpoint answered with a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code
        code: i64,
        /// Error message
        message: String,
    },

    /// An operation exceeded the configured deadline.
    #[error("Operation timed out after {0} ms")]
    Timeout(u64),

    /// A response could not be decoded.
    #[error("Failed to decode {what}: {reason}")]
    Decode {
        /// What was being decoded
        what: String,
        /// Why it failed
        reason: String,
    },

    /// The price oracle returned no usable price.
    #[error("Price unavailable: {0}")]
    PriceUnavailable(String),

    /// The live event subscription ended.
    #[error("Event subscription closed")]
    SubscriptionClosed,

    /// The wallet or node refused to submit the transaction.
    #[error("Transaction rejected: {0}")]
    TransactionRejected(String),

    /// The transaction was mined but reverted.
    #[error("Transaction reverted: {0}")]
    TransactionReverted(TxRef),

    /// The owning session ended while the operation was in flight.
    #[error("Session ended")]
    SessionEnded,

    /// Wallet provider failure.
    #[error("Wallet error: {0}")]
    Wallet(String),

    /// Caller error.
    #[error("Invalid action: {0}")]
    InvalidAction(#[from] ActionError),
}

impl SyncError {
    /// Read failures that are logged and retried on the next tick.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::Network(_)
                | SyncError::Rpc { .. }
                | SyncError::Timeout(_)
                | SyncError::Decode { .. }
                | SyncError::PriceUnavailable(_)
                | SyncError::SubscriptionClosed
        )
    }

    /// Failures surfaced to the user as a named failure.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            SyncError::TransactionRejected(_)
                | SyncError::TransactionReverted(_)
                | SyncError::Wallet(_)
                | SyncError::InvalidAction(_)
        )
    }

    /// Build a decode error.
    pub fn decode(what: impl Into<String>, reason: impl ToString) -> Self {
        SyncError::Decode {
            what: what.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;
