//! # Inbound Ports
//!
//! API trait defining what the UI layer can do.

use async_trait::async_trait;

use crate::application::ChatView;
use crate::domain::{SyncResult, TxRef, WalletSession};

/// Chat client API - inbound port.
#[async_trait]
pub trait ChatClientApi: Send + Sync {
    /// Re-read the wallet and start, replace or end the session to match.
    async fn connect_check(&self) -> SyncResult<Option<WalletSession>>;

    /// Ask the wallet to switch to the deployment chain.
    async fn switch_network(&self) -> SyncResult<()>;

    /// Submit an exact-amount approval for one message.
    async fn approve(&self) -> SyncResult<TxRef>;

    /// Submit a message post. The message appears via the event feed.
    async fn post(&self, body: &str) -> SyncResult<TxRef>;

    /// Store the composed, unsent message.
    fn set_draft(&self, body: &str);

    /// Read-only view: snapshot plus derived flags.
    fn view(&self) -> ChatView;
}
