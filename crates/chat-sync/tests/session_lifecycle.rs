//! End-to-end session scenarios against the in-memory chain.

use std::sync::Arc;
use std::time::Duration;

use chat_sync::{
    ActionError, Address, ApprovalState, ChatClientApi, ChatMessageEvent, FeedStatus,
    MockChain, MockPriceOracle, MockWallet, PostState, SessionCoordinator, SyncConfig, SyncError,
    WalletSession, U256,
};

const ME: Address = Address([0x01; 20]);
const OTHER: Address = Address([0x02; 20]);

struct Harness {
    chain: Arc<MockChain>,
    wallet: Arc<MockWallet>,
    oracle: Arc<MockPriceOracle>,
    coordinator: SessionCoordinator,
}

fn harness() -> Harness {
    let config = SyncConfig::for_testing();
    let chain = Arc::new(MockChain::new(config.token_contract, config.chat_contract));
    let wallet = Arc::new(MockWallet::new());
    let oracle = Arc::new(MockPriceOracle::new(Some(0.5)));
    let coordinator =
        SessionCoordinator::new(config, chain.clone(), oracle.clone(), wallet.clone());
    Harness {
        chain,
        wallet,
        oracle,
        coordinator,
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test(start_paused = true)]
async fn test_approve_then_post_flow() {
    let h = harness();
    h.chain.set_balance(ME, U256::from(100u64));
    h.wallet.connect(WalletSession::new(ME, 8453));
    h.coordinator.start();
    h.coordinator.connect_check().await.unwrap();
    settle().await;

    // balance 100, allowance 0, cost 100
    let view = h.coordinator.view();
    assert_eq!(view.snapshot.feed_status, FeedStatus::Live);
    assert!(view.flags.needs_approval);
    assert!(view.flags.has_enough_balance);
    assert!(view.flags.can_approve);
    assert!(!view.flags.can_post);
    assert!(matches!(
        h.coordinator.post("gm").await,
        Err(SyncError::InvalidAction(ActionError::ApprovalRequired))
    ));

    h.coordinator.approve().await.unwrap();
    let view = h.coordinator.view();
    assert_eq!(view.snapshot.approval.state, ApprovalState::Submitted);
    assert_eq!(view.snapshot.approval.approved_amount, Some(U256::from(100u64)));
    assert!(!view.flags.can_approve);

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    let view = h.coordinator.view();
    assert_eq!(view.snapshot.approval.state, ApprovalState::Confirmed);
    assert!(!view.flags.needs_approval);
    assert!(view.flags.can_post);

    h.coordinator.set_draft("hello chain");
    h.coordinator.post("  hello chain ").await.unwrap();
    assert_eq!(h.coordinator.view().snapshot.post.state, PostState::Submitting);

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    let view = h.coordinator.view();
    assert_eq!(view.snapshot.post.state, PostState::Succeeded);
    assert!(view.snapshot.draft.is_empty());
    let feed: Vec<ChatMessageEvent> = view.snapshot.feed.to_vec();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].body, "hello chain");
    assert!(feed[0].is_from(&ME));

    tokio::time::sleep(Duration::from_millis(3_500)).await;
    let view = h.coordinator.view();
    assert_eq!(view.snapshot.balance.map(|b| b.amount), Some(U256::zero()));
    assert!(view.flags.needs_approval);
    assert!(!view.flags.has_enough_balance);
    assert!(!view.flags.can_approve);
}

#[tokio::test(start_paused = true)]
async fn test_chain_change_during_approval_drops_completion() {
    let h = harness();
    h.chain.set_balance(ME, U256::from(100u64));
    h.chain.set_receipt_delay(Duration::from_secs(5));
    h.wallet.connect(WalletSession::new(ME, 8453));
    h.coordinator.start();
    h.coordinator.connect_check().await.unwrap();
    settle().await;

    h.coordinator.approve().await.unwrap();
    let old = h.coordinator.active_session().unwrap();

    h.wallet.set_chain(1);
    h.coordinator.connect_check().await.unwrap();
    assert!(old.is_ended());

    tokio::time::sleep(Duration::from_secs(6)).await;
    let view = h.coordinator.view();
    assert_eq!(view.snapshot.approval.state, ApprovalState::Idle);
    assert!(view.flags.wrong_network);
    assert!(!view.flags.can_approve);
    assert!(matches!(
        h.coordinator.approve().await,
        Err(SyncError::InvalidAction(ActionError::WrongNetwork { .. }))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_chain_change_during_post_drops_completion() {
    let h = harness();
    let chat = SyncConfig::for_testing().chat_contract;
    h.chain.set_balance(ME, U256::from(100u64));
    h.chain.set_allowance(ME, chat, U256::from(100u64));
    h.chain.set_receipt_delay(Duration::from_secs(5));
    h.wallet.connect(WalletSession::new(ME, 8453));
    h.coordinator.start();
    h.coordinator.connect_check().await.unwrap();
    settle().await;

    h.coordinator.post("gm").await.unwrap();
    let view = h.coordinator.view();
    assert_eq!(view.snapshot.post.state, PostState::Submitting);
    assert_eq!(view.snapshot.draft, "gm");
    let old = h.coordinator.active_session().unwrap();

    h.wallet.set_chain(1);
    h.coordinator.connect_check().await.unwrap();
    assert!(old.is_ended());
    assert_eq!(old.running_tasks(), 0);

    tokio::time::sleep(Duration::from_secs(10)).await;
    let view = h.coordinator.view();
    assert_eq!(view.snapshot.post.state, PostState::Idle);
    assert!(view.snapshot.post.tx_ref.is_none());
    assert!(view.snapshot.draft.is_empty());
    assert!(view.snapshot.feed.is_empty());
    assert!(view.flags.wrong_network);

    // The old confirmation never ran, so nothing was burned or refreshed
    assert_eq!(h.chain.balance(ME), U256::from(100u64));
    assert_eq!(view.snapshot.balance.map(|b| b.amount), Some(U256::from(100u64)));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_session_tasks() {
    let h = harness();
    h.wallet.connect(WalletSession::new(ME, 8453));
    h.coordinator.start();
    h.coordinator.connect_check().await.unwrap();
    settle().await;

    let old = h.coordinator.active_session().unwrap();
    assert!(old.running_tasks() > 0);
    assert!(h.chain.read_count("balanceOf") >= 1);

    h.wallet.disconnect();
    assert_eq!(h.coordinator.connect_check().await.unwrap(), None);
    assert!(old.is_ended());
    assert_eq!(old.running_tasks(), 0);

    let reads = h.chain.read_count("balanceOf");
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(h.chain.read_count("balanceOf"), reads);

    let view = h.coordinator.view();
    assert!(view.snapshot.session.is_none());
    assert!(view.snapshot.balance.is_none());
    assert!(matches!(
        h.coordinator.approve().await,
        Err(SyncError::InvalidAction(ActionError::NotConnected))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_price_outage_keeps_last_price() {
    let h = harness();
    h.coordinator.start();
    settle().await;
    assert_eq!(
        h.coordinator.view().snapshot.price.map(|p| p.usd_per_token),
        Some(0.5)
    );

    h.oracle.set_price(None);
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(h.oracle.fetch_count(), 2);
    assert_eq!(
        h.coordinator.view().snapshot.price.map(|p| p.usd_per_token),
        Some(0.5)
    );

    // Price survives a session change
    h.wallet.connect(WalletSession::new(ME, 8453));
    h.coordinator.connect_check().await.unwrap();
    assert!(h.coordinator.view().snapshot.price.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_account_switch_rebuilds_feed() {
    let h = harness();
    h.chain.set_balance(ME, U256::from(100u64));
    h.chain.set_allowance(ME, SyncConfig::for_testing().chat_contract, U256::from(100u64));
    h.wallet.connect(WalletSession::new(ME, 8453));
    h.coordinator.start();
    h.coordinator.connect_check().await.unwrap();
    settle().await;

    h.coordinator.post("first").await.unwrap();
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert_eq!(h.coordinator.view().snapshot.feed.len(), 1);

    h.wallet.connect(WalletSession::new(OTHER, 8453));
    h.coordinator.connect_check().await.unwrap();
    settle().await;

    let view = h.coordinator.view();
    let feed = view.snapshot.feed.to_vec();
    assert_eq!(feed.len(), 1);
    assert!(!feed[0].is_from(&OTHER));
    assert_eq!(view.snapshot.balance.map(|b| b.amount), Some(U256::zero()));
    assert!(view.flags.needs_approval);
}
