//! # Mock Adapters
//!
//! In-memory chain, wallet and price oracle for tests and local runs.
//!
//! `MockChain` models just enough of the two contracts: ERC-20 balances and
//! allowances, `messageCost`, the counters and `postMessage`, which burns
//! one message cost and emits a `MessagePosted` event.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use primitive_types::U256;
use tokio::sync::mpsc;

use crate::domain::{
    Address, ChainId, ChatMessageEvent, ReceiptStatus, SyncError, SyncResult, TxRef,
    WalletSession,
};
use crate::ports::{ChainRpc, ContractCall, EventSubscription, PriceOracle, WalletProvider};

/// Base of the fake block timestamps (unix seconds).
const GENESIS_TIME: u64 = 1_700_000_000;

struct Subscriber {
    from_block: u64,
    sender: mpsc::Sender<ChatMessageEvent>,
}

struct PendingTx {
    from: Address,
    call: ContractCall,
    revert: bool,
}

struct MockChainState {
    head: u64,
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
    message_cost: U256,
    total_messages: U256,
    total_burned: U256,
    logs: Vec<ChatMessageEvent>,
    subscribers: Vec<Subscriber>,
    failing_calls: HashSet<&'static str>,
    failing_log_queries: u32,
    reject_next: Option<String>,
    revert_next: bool,
    read_delay: Duration,
    receipt_delay: Duration,
    pending: HashMap<TxRef, PendingTx>,
    submitted: Vec<ContractCall>,
    next_tx: u64,
    read_counts: HashMap<&'static str, u32>,
    log_queries: u32,
    subscriptions: u32,
}

/// In-memory token and chat contracts.
pub struct MockChain {
    token: Address,
    chat: Address,
    state: Mutex<MockChainState>,
}

impl MockChain {
    /// Create a chain with `messageCost` 100, empty balances and no events.
    pub fn new(token: Address, chat: Address) -> Self {
        Self {
            token,
            chat,
            state: Mutex::new(MockChainState {
                head: 0,
                balances: HashMap::new(),
                allowances: HashMap::new(),
                message_cost: U256::from(100u64),
                total_messages: U256::zero(),
                total_burned: U256::zero(),
                logs: Vec::new(),
                subscribers: Vec::new(),
                failing_calls: HashSet::new(),
                failing_log_queries: 0,
                reject_next: None,
                revert_next: false,
                read_delay: Duration::ZERO,
                receipt_delay: Duration::from_secs(1),
                pending: HashMap::new(),
                submitted: Vec::new(),
                next_tx: 1,
                read_counts: HashMap::new(),
                log_queries: 0,
                subscriptions: 0,
            }),
        }
    }

    /// Set a token balance.
    pub fn set_balance(&self, owner: Address, amount: U256) {
        self.state.lock().balances.insert(owner, amount);
    }

    /// Token balance of `owner`.
    pub fn balance(&self, owner: Address) -> U256 {
        self.state
            .lock()
            .balances
            .get(&owner)
            .copied()
            .unwrap_or_default()
    }

    /// Set an allowance.
    pub fn set_allowance(&self, owner: Address, spender: Address, amount: U256) {
        self.state.lock().allowances.insert((owner, spender), amount);
    }

    /// Allowance of `spender` over `owner`'s tokens.
    pub fn allowance(&self, owner: Address, spender: Address) -> U256 {
        self.state
            .lock()
            .allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or_default()
    }

    /// Set `messageCost`.
    pub fn set_message_cost(&self, cost: U256) {
        self.state.lock().message_cost = cost;
    }

    /// Set `totalMessages` / `totalBurned`.
    pub fn set_totals(&self, messages: U256, burned: U256) {
        let mut state = self.state.lock();
        state.total_messages = messages;
        state.total_burned = burned;
    }

    /// Set the chain head.
    pub fn set_head(&self, head: u64) {
        self.state.lock().head = head;
    }

    /// Current chain head.
    pub fn head(&self) -> u64 {
        self.state.lock().head
    }

    /// Record a log and deliver it to live subscribers.
    pub fn push_log(&self, event: ChatMessageEvent) {
        let mut state = self.state.lock();
        state.head = state.head.max(event.block_number);
        state.logs.push(event.clone());
        broadcast(&mut state, event);
    }

    /// Record a log without delivering it (a subscription gap).
    pub fn push_log_silently(&self, event: ChatMessageEvent) {
        let mut state = self.state.lock();
        state.head = state.head.max(event.block_number);
        state.logs.push(event);
    }

    /// Deliver an event to live subscribers without recording it.
    pub fn replay_to_subscribers(&self, event: ChatMessageEvent) {
        broadcast(&mut self.state.lock(), event);
    }

    /// End every live subscription.
    pub fn drop_subscriptions(&self) {
        self.state.lock().subscribers.clear();
    }

    /// Make reads of `function` (or `blockNumber`) fail.
    pub fn fail_call(&self, function: &'static str) {
        self.state.lock().failing_calls.insert(function);
    }

    /// Undo all injected failures.
    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.failing_calls.clear();
        state.failing_log_queries = 0;
        state.reject_next = None;
        state.revert_next = false;
    }

    /// Fail the next `count` log queries.
    pub fn fail_next_log_queries(&self, count: u32) {
        self.state.lock().failing_log_queries = count;
    }

    /// Delay every contract read.
    pub fn set_read_delay(&self, delay: Duration) {
        self.state.lock().read_delay = delay;
    }

    /// Delay before receipts arrive.
    pub fn set_receipt_delay(&self, delay: Duration) {
        self.state.lock().receipt_delay = delay;
    }

    /// Refuse the next submission, as a user declining in the wallet.
    pub fn reject_next_submission(&self, reason: &str) {
        self.state.lock().reject_next = Some(reason.to_string());
    }

    /// Mine the next transaction as reverted.
    pub fn revert_next_transaction(&self) {
        self.state.lock().revert_next = true;
    }

    /// Calls accepted for submission, in order.
    pub fn submitted_calls(&self) -> Vec<ContractCall> {
        self.state.lock().submitted.clone()
    }

    /// Number of reads of `function`.
    pub fn read_count(&self, function: &str) -> u32 {
        self.state
            .lock()
            .read_counts
            .get(function)
            .copied()
            .unwrap_or(0)
    }

    /// Number of log queries served.
    pub fn log_query_count(&self) -> u32 {
        self.state.lock().log_queries
    }

    /// Number of subscriptions opened.
    pub fn subscription_count(&self) -> u32 {
        self.state.lock().subscriptions
    }
}

fn broadcast(state: &mut MockChainState, event: ChatMessageEvent) {
    state.subscribers.retain(|s| !s.sender.is_closed());
    for subscriber in &state.subscribers {
        if event.block_number >= subscriber.from_block {
            // Buffer is large enough for test traffic
            let _ = subscriber.sender.try_send(event.clone());
        }
    }
}

fn mock_failure(what: &str) -> SyncError {
    SyncError::Network(format!("mock {what} failure"))
}

fn apply_transaction(state: &mut MockChainState, chat: Address, tx: &PendingTx) -> ReceiptStatus {
    match &tx.call {
        ContractCall::Approve { spender, amount } => {
            state.allowances.insert((tx.from, *spender), *amount);
            ReceiptStatus::Success
        }
        ContractCall::PostMessage { body } => {
            let cost = state.message_cost;
            let allowance = state
                .allowances
                .get(&(tx.from, chat))
                .copied()
                .unwrap_or_default();
            let balance = state.balances.get(&tx.from).copied().unwrap_or_default();
            if allowance < cost || balance < cost {
                return ReceiptStatus::Failure;
            }
            state.allowances.insert((tx.from, chat), allowance - cost);
            state.balances.insert(tx.from, balance - cost);
            state.total_messages += U256::one();
            state.total_burned += cost;

            state.head += 1;
            let event = ChatMessageEvent {
                block_number: state.head,
                log_index: 0,
                sender: tx.from,
                body: body.clone(),
                burn_amount: cost,
                posted_at: GENESIS_TIME + state.head,
            };
            state.logs.push(event.clone());
            broadcast(state, event);
            ReceiptStatus::Success
        }
        _ => ReceiptStatus::Failure,
    }
}

#[async_trait]
impl ChainRpc for MockChain {
    async fn block_number(&self) -> SyncResult<u64> {
        let state = self.state.lock();
        if state.failing_calls.contains("blockNumber") {
            return Err(mock_failure("blockNumber"));
        }
        Ok(state.head)
    }

    async fn read_contract(&self, _contract: Address, call: ContractCall) -> SyncResult<U256> {
        let name = call.function_name();
        let delay = {
            let mut state = self.state.lock();
            *state.read_counts.entry(name).or_insert(0) += 1;
            state.read_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.lock();
        if state.failing_calls.contains(name) {
            return Err(mock_failure(name));
        }
        match call {
            ContractCall::BalanceOf { owner } => {
                Ok(state.balances.get(&owner).copied().unwrap_or_default())
            }
            ContractCall::Allowance { owner, spender } => Ok(state
                .allowances
                .get(&(owner, spender))
                .copied()
                .unwrap_or_default()),
            ContractCall::MessageCost => Ok(state.message_cost),
            ContractCall::TotalMessages => Ok(state.total_messages),
            ContractCall::TotalBurned => Ok(state.total_burned),
            other => Err(SyncError::Rpc {
                code: -32000,
                message: format!("{} is not a view function", other.function_name()),
            }),
        }
    }

    async fn message_events(
        &self,
        _contract: Address,
        from_block: u64,
        to_block: u64,
    ) -> SyncResult<Vec<ChatMessageEvent>> {
        let mut state = self.state.lock();
        state.log_queries += 1;
        if state.failing_log_queries > 0 {
            state.failing_log_queries -= 1;
            return Err(mock_failure("eth_getLogs"));
        }
        let mut events: Vec<_> = state
            .logs
            .iter()
            .filter(|e| e.block_number >= from_block && e.block_number <= to_block)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.key());
        Ok(events)
    }

    async fn subscribe_message_events(
        &self,
        _contract: Address,
        from_block: u64,
    ) -> SyncResult<EventSubscription> {
        let mut state = self.state.lock();
        if state.failing_calls.contains("subscribe") {
            return Err(SyncError::SubscriptionClosed);
        }
        state.subscriptions += 1;
        let (sender, subscription) = EventSubscription::channel(1024);
        state.subscribers.push(Subscriber { from_block, sender });
        Ok(subscription)
    }

    async fn submit_transaction(
        &self,
        from: Address,
        contract: Address,
        call: ContractCall,
    ) -> SyncResult<TxRef> {
        let mut state = self.state.lock();
        if let Some(reason) = state.reject_next.take() {
            return Err(SyncError::TransactionRejected(reason));
        }
        let expected = match call {
            ContractCall::Approve { .. } => self.token,
            _ => self.chat,
        };
        if contract != expected {
            return Err(SyncError::TransactionRejected(format!(
                "{} sent to wrong contract {contract}",
                call.function_name()
            )));
        }

        let mut hash = [0u8; 32];
        hash[24..].copy_from_slice(&state.next_tx.to_be_bytes());
        state.next_tx += 1;
        let tx = TxRef(hash);

        let revert = std::mem::take(&mut state.revert_next);
        state.submitted.push(call.clone());
        state.pending.insert(tx, PendingTx { from, call, revert });
        Ok(tx)
    }

    async fn wait_for_receipt(&self, tx: TxRef) -> SyncResult<ReceiptStatus> {
        let delay = self.state.lock().receipt_delay;
        tokio::time::sleep(delay).await;

        let mut state = self.state.lock();
        let pending = state
            .pending
            .remove(&tx)
            .ok_or_else(|| SyncError::Rpc {
                code: -32000,
                message: format!("unknown transaction {tx}"),
            })?;
        if pending.revert {
            return Ok(ReceiptStatus::Failure);
        }
        Ok(apply_transaction(&mut state, self.chat, &pending))
    }
}

/// In-memory wallet.
#[derive(Default)]
pub struct MockWallet {
    session: Mutex<Option<WalletSession>>,
    failing: Mutex<bool>,
}

impl MockWallet {
    /// Create a disconnected wallet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect (or switch to) `session`.
    pub fn connect(&self, session: WalletSession) {
        *self.session.lock() = Some(session);
    }

    /// Disconnect.
    pub fn disconnect(&self) {
        *self.session.lock() = None;
    }

    /// Change chains from the wallet side.
    pub fn set_chain(&self, chain_id: ChainId) {
        if let Some(session) = self.session.lock().as_mut() {
            session.chain_id = chain_id;
        }
    }

    /// Make every request fail.
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }
}

#[async_trait]
impl WalletProvider for MockWallet {
    async fn current_session(&self) -> SyncResult<Option<WalletSession>> {
        if *self.failing.lock() {
            return Err(SyncError::Wallet("mock wallet failure".to_string()));
        }
        Ok(*self.session.lock())
    }

    async fn switch_chain(&self, chain_id: ChainId) -> SyncResult<()> {
        if *self.failing.lock() {
            return Err(SyncError::Wallet("mock wallet failure".to_string()));
        }
        match self.session.lock().as_mut() {
            Some(session) => {
                session.chain_id = chain_id;
                Ok(())
            }
            None => Err(SyncError::Wallet("no account connected".to_string())),
        }
    }
}

/// Price oracle returning a settable price.
pub struct MockPriceOracle {
    price: Mutex<Option<f64>>,
    fetches: AtomicU32,
}

impl MockPriceOracle {
    /// `None` makes every fetch fail.
    pub fn new(price: Option<f64>) -> Self {
        Self {
            price: Mutex::new(price),
            fetches: AtomicU32::new(0),
        }
    }

    /// Change the price.
    pub fn set_price(&self, price: Option<f64>) {
        *self.price.lock() = price;
    }

    /// Number of fetches served.
    pub fn fetch_count(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceOracle for MockPriceOracle {
    async fn usd_price(&self, _token: Address) -> SyncResult<f64> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        (*self.price.lock()).ok_or_else(|| SyncError::PriceUnavailable("mock outage".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: Address = Address([0x70; 20]);
    const CHAT: Address = Address([0xcc; 20]);
    const ME: Address = Address([0x01; 20]);

    #[tokio::test(start_paused = true)]
    async fn test_post_burns_and_emits() {
        let chain = MockChain::new(TOKEN, CHAT);
        chain.set_balance(ME, U256::from(250u64));
        chain.set_allowance(ME, CHAT, U256::from(100u64));
        let mut sub = chain.subscribe_message_events(CHAT, 0).await.unwrap();

        let tx = chain
            .submit_transaction(ME, CHAT, ContractCall::PostMessage { body: "gm".into() })
            .await
            .unwrap();
        assert_eq!(chain.wait_for_receipt(tx).await.unwrap(), ReceiptStatus::Success);

        assert_eq!(chain.balance(ME), U256::from(150u64));
        assert_eq!(chain.allowance(ME, CHAT), U256::zero());
        let event = sub.next().await.unwrap();
        assert_eq!(event.body, "gm");
        assert_eq!(event.sender, ME);
        assert_eq!(chain.head(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_post_without_allowance_reverts() {
        let chain = MockChain::new(TOKEN, CHAT);
        chain.set_balance(ME, U256::from(250u64));
        let tx = chain
            .submit_transaction(ME, CHAT, ContractCall::PostMessage { body: "gm".into() })
            .await
            .unwrap();
        assert_eq!(chain.wait_for_receipt(tx).await.unwrap(), ReceiptStatus::Failure);
        assert_eq!(chain.balance(ME), U256::from(250u64));
    }

    #[tokio::test]
    async fn test_approve_sent_to_chat_rejected() {
        let chain = MockChain::new(TOKEN, CHAT);
        let result = chain
            .submit_transaction(
                ME,
                CHAT,
                ContractCall::Approve {
                    spender: CHAT,
                    amount: U256::one(),
                },
            )
            .await;
        assert!(matches!(result, Err(SyncError::TransactionRejected(_))));
    }

    #[tokio::test]
    async fn test_mock_wallet_switch_chain() {
        let wallet = MockWallet::new();
        assert!(wallet.switch_chain(8453).await.is_err());
        wallet.connect(WalletSession::new(ME, 1));
        wallet.switch_chain(8453).await.unwrap();
        assert_eq!(
            wallet.current_session().await.unwrap().map(|s| s.chain_id),
            Some(8453)
        );
    }
}
