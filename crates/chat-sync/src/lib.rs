//! # Chat Sync
//!
//! Client-side sync engine for a burn-to-post chat: every message costs a
//! fixed amount of an ERC-20 token, paid through an allowance of the chat
//! contract.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! Keep a live, consistent picture of:
//! - Token balance and chat-contract allowance of the connected account
//! - USD price of the token (best effort)
//! - The ordered, deduplicated feed of `MessagePosted` events
//!
//! and drive the two user transactions, approve and post, without letting a
//! wallet change mix state from two sessions.
//!
//! ## Session Epochs
//!
//! | Event | Effect |
//! |-------|--------|
//! | Account change | End epoch, cancel its tasks, reset snapshot |
//! | Chain change | Same as account change |
//! | Disconnect | New epoch without a wallet; feed keeps syncing |
//! | Late completion from an ended epoch | Dropped |
//!
//! ## Module Structure
//!
//! ```text
//! chat-sync/
//! ├── domain/          # Entities, value objects, errors, validation
//! ├── algorithms/      # Event feed merge, derived flags, display rounding
//! ├── ports/           # API trait (inbound) + chain/wallet/price traits (outbound)
//! ├── application/     # Readers, workflows, scheduler, SessionCoordinator
//! ├── adapters/        # JSON-RPC, DexScreener, mocks
//! └── config.rs        # SyncConfig
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

// Re-exports
pub use adapters::{
    DexScreenerOracle, JsonRpcChainClient, MockChain, MockPriceOracle, MockWallet,
};
pub use algorithms::{
    compute_derived_flags, format_token_amount, format_usd_value, DerivedFlags, DerivedInputs,
    EventFeed,
};
pub use application::{ChatView, SessionCoordinator, SharedSnapshot, Snapshot};
pub use config::{ConfigError, SyncConfig};
pub use domain::{
    validate_message_body, ActionError, Address, ApprovalState, ApprovalTransaction, ChainId,
    ChatMessageEvent, ChatStats, EventKey, FeedStatus, PostState, PostTransaction,
    PriceSnapshot, SessionId, SyncError, SyncResult, TxRef, WalletSession, MAX_MESSAGE_CHARS,
    MAX_TOKEN_DECIMALS,
};
pub use ports::{ChainRpc, ChatClientApi, PriceOracle, TimeSource, WalletProvider};
pub use primitive_types::U256;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
