//! # Outbound Ports
//!
//! Traits for external collaborators: chain RPC, price oracle, wallet, clock.

use async_trait::async_trait;
use primitive_types::U256;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::domain::{
    Address, ChainId, ChatMessageEvent, ReceiptStatus, SyncResult, Timestamp, TxRef,
    WalletSession,
};

/// Typed contract calls used by the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContractCall {
    /// `balanceOf(address)` on the token.
    BalanceOf {
        /// Holder.
        owner: Address,
    },
    /// `allowance(address,address)` on the token.
    Allowance {
        /// Holder.
        owner: Address,
        /// Contract allowed to pull.
        spender: Address,
    },
    /// `approve(address,uint256)` on the token.
    Approve {
        /// Contract allowed to pull.
        spender: Address,
        /// Exact amount.
        amount: U256,
    },
    /// `messageCost()` on the chat contract.
    MessageCost,
    /// `totalMessages()` on the chat contract.
    TotalMessages,
    /// `totalBurned()` on the chat contract.
    TotalBurned,
    /// `postMessage(string)` on the chat contract.
    PostMessage {
        /// Message text.
        body: String,
    },
}

impl ContractCall {
    /// Solidity function name, for logging.
    pub fn function_name(&self) -> &'static str {
        match self {
            ContractCall::BalanceOf { .. } => "balanceOf",
            ContractCall::Allowance { .. } => "allowance",
            ContractCall::Approve { .. } => "approve",
            ContractCall::MessageCost => "messageCost",
            ContractCall::TotalMessages => "totalMessages",
            ContractCall::TotalBurned => "totalBurned",
            ContractCall::PostMessage { .. } => "postMessage",
        }
    }
}

/// Live stream of `MessagePosted` events.
///
/// The stream ends (`next()` returns `None`) when the subscription drops.
/// Dropping the subscription aborts its producer task, if any.
pub struct EventSubscription {
    receiver: mpsc::Receiver<ChatMessageEvent>,
    producer: Option<JoinHandle<()>>,
}

impl EventSubscription {
    /// Create a subscription and the sender feeding it.
    pub fn channel(capacity: usize) -> (mpsc::Sender<ChatMessageEvent>, Self) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            sender,
            Self {
                receiver,
                producer: None,
            },
        )
    }

    /// Tie the task feeding this subscription to its lifetime.
    pub fn with_producer(mut self, producer: JoinHandle<()>) -> Self {
        self.producer = Some(producer);
        self
    }

    /// Next event, or `None` once the subscription has dropped.
    pub async fn next(&mut self) -> Option<ChatMessageEvent> {
        self.receiver.recv().await
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
    }
}

/// Chain RPC endpoint - outbound port.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Current chain head.
    async fn block_number(&self) -> SyncResult<u64>;

    /// Read a `uint256` view function.
    async fn read_contract(&self, contract: Address, call: ContractCall) -> SyncResult<U256>;

    /// All `MessagePosted` events in `[from_block, to_block]`.
    async fn message_events(
        &self,
        contract: Address,
        from_block: u64,
        to_block: u64,
    ) -> SyncResult<Vec<ChatMessageEvent>>;

    /// Subscribe to `MessagePosted` events from `from_block` onward.
    async fn subscribe_message_events(
        &self,
        contract: Address,
        from_block: u64,
    ) -> SyncResult<EventSubscription>;

    /// Submit a state-changing call from `from`.
    async fn submit_transaction(
        &self,
        from: Address,
        contract: Address,
        call: ContractCall,
    ) -> SyncResult<TxRef>;

    /// Wait until the transaction is mined.
    async fn wait_for_receipt(&self, tx: TxRef) -> SyncResult<ReceiptStatus>;
}

/// Price oracle - outbound port. Best-effort.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// USD price of one whole token.
    async fn usd_price(&self, token: Address) -> SyncResult<f64>;
}

/// Wallet / identity provider - outbound port.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Currently connected account and chain, if any.
    async fn current_session(&self) -> SyncResult<Option<WalletSession>>;

    /// Ask the wallet to switch chains.
    async fn switch_chain(&self, chain_id: ChainId) -> SyncResult<()>;
}

/// Wall-clock source for snapshot freshness.
pub trait TimeSource: Send + Sync {
    /// Milliseconds since the unix epoch.
    fn now(&self) -> Timestamp;
}

/// System clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_time_source() {
        let now = SystemTimeSource.now();
        // After Jan 1, 2020 in ms
        assert!(now > 1_577_836_800_000);
    }

    #[test]
    fn test_function_names() {
        assert_eq!(ContractCall::MessageCost.function_name(), "messageCost");
        assert_eq!(
            ContractCall::Approve {
                spender: Address::ZERO,
                amount: U256::one()
            }
            .function_name(),
            "approve"
        );
    }

    #[tokio::test]
    async fn test_dropping_subscription_aborts_producer() {
        let (sender, sub) = EventSubscription::channel(4);
        let (alive_tx, alive_rx) = tokio::sync::oneshot::channel::<()>();
        let producer = tokio::spawn(async move {
            let _alive = alive_tx;
            let _sender = sender;
            std::future::pending::<()>().await;
        });
        let sub = sub.with_producer(producer);

        drop(sub);
        let finished = tokio::time::timeout(std::time::Duration::from_secs(1), alive_rx).await;
        assert!(matches!(finished, Ok(Err(_))));
    }

    #[tokio::test]
    async fn test_subscription_ends_when_sender_dropped() {
        let (sender, mut sub) = EventSubscription::channel(4);
        drop(sender);
        assert!(sub.next().await.is_none());
    }
}
