//! # Clawd-Chat Runtime
//!
//! Headless client for the burn-to-post chat.
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging (`CHAT_*` / `RUST_LOG`)
//! 2. Load `SyncConfig` from the environment, apply CLI overrides, validate
//! 3. Wire adapters (JSON-RPC + DexScreener, or in-memory with `--demo`)
//! 4. Start the coordinator and poll the wallet for account/chain changes
//! 5. Optionally approve and post one message
//! 6. Log feed activity until Ctrl+C

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use chat_sync::application::schedule;
use chat_sync::{
    format_token_amount, format_usd_value, Address, ApprovalState, ChainRpc, ChatClientApi,
    ChatMessageEvent, ChatView, DexScreenerOracle, JsonRpcChainClient, MockChain,
    MockPriceOracle, MockWallet, PostState, PriceOracle, SessionCoordinator, SessionId,
    SyncConfig, WalletProvider, WalletSession, U256,
};
use chat_telemetry::{init_telemetry, TelemetryConfig};

/// Clawd-Chat: burn-to-post chat client
#[derive(Parser, Debug)]
#[command(name = "chat-runtime")]
#[command(about = "Headless client for the burn-to-post chat")]
struct Args {
    /// JSON-RPC endpoint of a node that manages the account
    #[arg(short, long, default_value = "http://127.0.0.1:8545")]
    rpc_url: String,

    /// Chat contract address (overrides CHAT_CONTRACT)
    #[arg(long)]
    chat_contract: Option<Address>,

    /// Target chain id (overrides CHAT_CHAIN_ID)
    #[arg(long)]
    chain_id: Option<u64>,

    /// Wallet poll interval in seconds
    #[arg(short, long, default_value = "2")]
    wallet_poll: u64,

    /// Post this message once ready, approving first if needed
    #[arg(long)]
    post: Option<String>,

    /// Ask the wallet to switch to the target chain if it is elsewhere
    #[arg(long)]
    switch_network: bool,

    /// Log level (overrides CHAT_LOG_LEVEL)
    #[arg(long)]
    log_level: Option<String>,

    /// Run against an in-memory chain (no RPC connection required)
    #[arg(long)]
    demo: bool,
}

struct Adapters {
    rpc: Arc<dyn ChainRpc>,
    oracle: Arc<dyn PriceOracle>,
    wallet: Arc<dyn WalletProvider>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut telemetry = TelemetryConfig::from_env();
    if let Some(level) = &args.log_level {
        telemetry = telemetry.with_log_level(level.clone());
    }
    init_telemetry(&telemetry).context("Failed to initialize logging")?;

    let config = load_config(&args)?;
    let adapters = if args.demo {
        demo_adapters(&config)
    } else {
        live_adapters(&args, &config)?
    };

    let coordinator = Arc::new(SessionCoordinator::new(
        config.clone(),
        adapters.rpc,
        adapters.oracle,
        adapters.wallet,
    ));
    coordinator.start();

    match coordinator.connect_check().await {
        Ok(Some(session)) => info!(
            account = %session.account_id,
            chain = session.chain_id,
            "Wallet connected"
        ),
        Ok(None) => info!("No wallet account; feed is read-only"),
        Err(e) => warn!(error = %e, "Wallet check failed"),
    }

    if args.switch_network && coordinator.view().flags.wrong_network {
        coordinator
            .switch_network()
            .await
            .context("Network switch was refused")?;
    }

    let poller = Arc::clone(&coordinator);
    let _wallet_poll = schedule(
        "wallet-poll",
        Duration::from_secs(args.wallet_poll.max(1)),
        move || {
            let coordinator = Arc::clone(&poller);
            async move {
                if let Err(e) = coordinator.connect_check().await {
                    warn!(error = %e, "Wallet check failed");
                }
            }
        },
    );

    let printer = Arc::clone(&coordinator);
    let decimals = config.token_decimals;
    let _feed_log = tokio::spawn(async move { log_feed(printer, decimals).await });

    if let Some(body) = &args.post {
        if let Err(e) = approve_and_post(&coordinator, body).await {
            error!(error = %e, "Post flow failed");
        }
    }

    info!("Client is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    coordinator.shutdown();
    Ok(())
}

fn load_config(args: &Args) -> Result<SyncConfig> {
    let mut config = SyncConfig::from_env();
    if let Some(chat) = args.chat_contract {
        config.chat_contract = chat;
    }
    if let Some(chain_id) = args.chain_id {
        config.target_chain_id = chain_id;
    }
    if args.demo && config.chat_contract.is_zero() {
        config.chat_contract = Address([0xcc; 20]);
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn live_adapters(args: &Args, config: &SyncConfig) -> Result<Adapters> {
    let client = Arc::new(
        JsonRpcChainClient::new(&args.rpc_url, config.request_timeout())
            .context("Failed to create JSON-RPC client")?,
    );
    let oracle = DexScreenerOracle::new(&config.price_api_url, config.request_timeout())
        .context("Failed to create price client")?;
    Ok(Adapters {
        rpc: client.clone(),
        oracle: Arc::new(oracle),
        wallet: client,
    })
}

fn demo_adapters(config: &SyncConfig) -> Adapters {
    let account = Address([0x01; 20]);
    let chain = Arc::new(MockChain::new(config.token_contract, config.chat_contract));
    chain.set_balance(account, whole_tokens(1_000, config.token_decimals));
    chain.set_message_cost(whole_tokens(100, config.token_decimals));
    chain.set_head(1);

    let wallet = Arc::new(MockWallet::new());
    wallet.connect(WalletSession::new(account, config.target_chain_id));

    Adapters {
        rpc: chain,
        oracle: Arc::new(MockPriceOracle::new(Some(0.0004))),
        wallet,
    }
}

fn whole_tokens(whole: u64, decimals: u8) -> U256 {
    // `validate()` bounds decimals so the unit fits
    U256::from(whole).saturating_mul(U256::exp10(decimals as usize))
}

/// Wait until `ready` holds for the current view.
async fn wait_for(
    coordinator: &SessionCoordinator,
    limit: Duration,
    what: &str,
    ready: impl Fn(&ChatView) -> bool,
) -> Result<ChatView> {
    let mut changes = coordinator.subscribe();
    let waited = tokio::time::timeout(limit, async {
        loop {
            let view = coordinator.view();
            if ready(&view) {
                return Ok(view);
            }
            if changes.changed().await.is_err() {
                bail!("Snapshot closed while waiting for {what}");
            }
        }
    })
    .await;
    match waited {
        Ok(result) => result,
        Err(_) => bail!("Timed out waiting for {what}"),
    }
}

async fn approve_and_post(coordinator: &SessionCoordinator, body: &str) -> Result<()> {
    let limit = coordinator.config().receipt_timeout();

    let view = wait_for(coordinator, limit, "balance and message cost", |v| {
        v.snapshot.message_cost.is_some() && v.snapshot.balance.is_some()
    })
    .await?;
    if view.flags.wrong_network {
        bail!("Wallet is on the wrong network; rerun with --switch-network");
    }
    if !view.flags.has_enough_balance {
        bail!("Balance does not cover one message");
    }

    if view.flags.needs_approval {
        let tx = coordinator.approve().await.context("Approval failed")?;
        info!(%tx, "Approval submitted, waiting for confirmation");
        let view = wait_for(coordinator, limit, "approval", |v| {
            !v.snapshot.approval.is_pending()
        })
        .await?;
        if view.snapshot.approval.state != ApprovalState::Confirmed {
            bail!(
                "Approval did not confirm: {}",
                view.snapshot.approval.failure.unwrap_or_default()
            );
        }
        wait_for(coordinator, limit, "allowance refresh", |v| v.flags.can_post).await?;
    }

    coordinator.set_draft(body);
    let tx = coordinator.post(body).await.context("Post failed")?;
    info!(%tx, "Post submitted, waiting for confirmation");
    let view = wait_for(coordinator, limit, "post", |v| !v.snapshot.post.is_pending()).await?;
    match view.snapshot.post.state {
        PostState::Succeeded => info!(%tx, "Post confirmed"),
        _ => bail!(
            "Post did not confirm: {}",
            view.snapshot.post.failure.unwrap_or_default()
        ),
    }
    Ok(())
}

/// Log each new feed entry.
async fn log_feed(coordinator: Arc<SessionCoordinator>, decimals: u8) {
    let snapshot = coordinator.snapshot();
    let mut changes = coordinator.subscribe();
    let mut session = SessionId::default();
    let mut last_shown = None;
    loop {
        // Borrow the snapshot and copy out only the unseen events
        let (account, price, fresh) = snapshot.with(|s| {
            if s.session_id != session {
                session = s.session_id;
                last_shown = None;
            }
            let fresh: Vec<ChatMessageEvent> = s.feed.after(last_shown).cloned().collect();
            (
                s.session.map(|w| w.account_id),
                s.price.map(|p| p.usd_per_token),
                fresh,
            )
        });
        for event in fresh {
            last_shown = Some(event.key());
            let usd = format_usd_value(event.burn_amount, decimals, price);
            info!(
                block = event.block_number,
                from = %event.sender,
                mine = account.map_or(false, |a| event.is_from(&a)),
                burned = %format_token_amount(event.burn_amount, decimals),
                usd = usd.as_deref().unwrap_or("-"),
                "{}",
                event.body
            );
        }
        if changes.changed().await.is_err() {
            return;
        }
    }
}
