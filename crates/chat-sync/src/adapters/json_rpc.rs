//! # JSON-RPC Chain Client
//!
//! [`ChainRpc`] and [`WalletProvider`] over an Ethereum JSON-RPC endpoint
//! whose node manages the account (for example a local signer proxy).
//!
//! The live event subscription is emulated by polling `eth_getLogs`; the
//! stream ends when a poll fails, and the polling task stops when the
//! subscription is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use primitive_types::U256;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

use super::abi;
use crate::domain::value_objects::decode_prefixed_hex;
use crate::domain::{
    Address, ChainId, ChatMessageEvent, ReceiptStatus, SyncError, SyncResult, TxRef,
    WalletSession,
};
use crate::ports::{ChainRpc, ContractCall, EventSubscription, WalletProvider};

const SUBSCRIPTION_BUFFER: usize = 256;

/// JSON-RPC request envelope.
#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a, T> {
    jsonrpc: &'static str,
    method: &'a str,
    params: T,
    id: u64,
}

/// JSON-RPC response envelope.
#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcLog {
    #[serde(rename = "blockNumber")]
    block_number: Option<String>,
    #[serde(rename = "logIndex")]
    log_index: Option<String>,
    topics: Vec<String>,
    data: String,
    #[serde(default)]
    removed: bool,
}

#[derive(Debug, Deserialize)]
struct RpcReceipt {
    status: Option<String>,
}

/// Chain client over HTTP JSON-RPC.
#[derive(Clone)]
pub struct JsonRpcChainClient {
    client: Client,
    url: String,
    request_id: Arc<AtomicU64>,
    poll_interval: Duration,
    max_log_span: u64,
}

impl JsonRpcChainClient {
    /// Create a client for `url`.
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(2))
            .build()
            .map_err(|e| SyncError::Network(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            request_id: Arc::new(AtomicU64::new(1)),
            poll_interval: Duration::from_secs(2),
            max_log_span: 2_000,
        })
    }

    /// Interval of subscription and receipt polling.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Maximum block span of one subscription poll.
    pub fn with_max_log_span(mut self, span: u64) -> Self {
        self.max_log_span = span.max(1);
        self
    }

    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Call a method whose result may be `null`.
    async fn call_optional<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> SyncResult<Option<R>> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id(),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SyncError::Network(format!("{method} timed out"))
                } else if e.is_connect() {
                    SyncError::Network(format!("Cannot connect to {}", self.url))
                } else {
                    SyncError::Network(e.to_string())
                }
            })?;

        let rpc_response: JsonRpcResponse<R> = response
            .json()
            .await
            .map_err(|e| SyncError::decode(method, e))?;

        if let Some(error) = rpc_response.error {
            return Err(SyncError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(rpc_response.result)
    }

    async fn call<P: Serialize, R: DeserializeOwned>(&self, method: &str, params: P) -> SyncResult<R> {
        self.call_optional(method, params)
            .await?
            .ok_or_else(|| SyncError::decode(method, "missing result"))
    }

    async fn eth_block_number(&self) -> SyncResult<u64> {
        let raw: String = self.call("eth_blockNumber", json!([])).await?;
        parse_hex_u64(&raw, "blockNumber")
    }

    async fn eth_get_logs(&self, contract: Address, from: u64, to: u64) -> SyncResult<Vec<ChatMessageEvent>> {
        let filter = json!([{
            "address": contract.to_string(),
            "fromBlock": format!("0x{from:x}"),
            "toBlock": format!("0x{to:x}"),
            "topics": [format!("0x{}", hex::encode(abi::message_posted_topic()))],
        }]);
        let logs: Vec<RpcLog> = self.call("eth_getLogs", filter).await?;
        Ok(decode_logs(logs))
    }
}

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_hex_u64(raw: &str, field: &str) -> SyncResult<u64> {
    let value = raw.trim();
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| SyncError::decode(field, "must be 0x-prefixed hex"))?;
    u64::from_str_radix(digits, 16).map_err(|e| SyncError::decode(field, e))
}

fn parse_topic(raw: &str) -> SyncResult<[u8; 32]> {
    decode_prefixed_hex(raw, "topic")?
        .try_into()
        .map_err(|_| SyncError::decode("topic", "expected 32 bytes"))
}

fn decode_log(log: RpcLog) -> SyncResult<ChatMessageEvent> {
    let block_number = parse_hex_u64(
        log.block_number
            .as_deref()
            .ok_or_else(|| SyncError::decode("log", "missing blockNumber"))?,
        "blockNumber",
    )?;
    let log_index = parse_hex_u64(
        log.log_index
            .as_deref()
            .ok_or_else(|| SyncError::decode("log", "missing logIndex"))?,
        "logIndex",
    )?;
    let log_index =
        u32::try_from(log_index).map_err(|_| SyncError::decode("logIndex", "out of range"))?;
    let topics = log
        .topics
        .iter()
        .map(|t| parse_topic(t))
        .collect::<SyncResult<Vec<_>>>()?;
    let data = decode_prefixed_hex(&log.data, "data")?;
    abi::decode_message_posted(block_number, log_index, &topics, &data)
}

/// Decode a `eth_getLogs` batch. Removed and undecodable logs are skipped.
fn decode_logs(logs: Vec<RpcLog>) -> Vec<ChatMessageEvent> {
    logs.into_iter()
        .filter(|log| !log.removed)
        .filter_map(|log| {
            let block = log.block_number.clone();
            let index = log.log_index.clone();
            match decode_log(log) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(
                        block = ?block,
                        log_index = ?index,
                        error = %e,
                        "[chat-sync] Skipping undecodable log"
                    );
                    None
                }
            }
        })
        .collect()
}

#[async_trait]
impl ChainRpc for JsonRpcChainClient {
    async fn block_number(&self) -> SyncResult<u64> {
        self.eth_block_number().await
    }

    async fn read_contract(&self, contract: Address, call: ContractCall) -> SyncResult<U256> {
        let data = format!("0x{}", hex::encode(abi::encode_call(&call)));
        let raw: String = self
            .call(
                "eth_call",
                json!([{ "to": contract.to_string(), "data": data }, "latest"]),
            )
            .await?;
        abi::decode_u256(&decode_prefixed_hex(&raw, call.function_name())?)
    }

    async fn message_events(
        &self,
        contract: Address,
        from_block: u64,
        to_block: u64,
    ) -> SyncResult<Vec<ChatMessageEvent>> {
        self.eth_get_logs(contract, from_block, to_block).await
    }

    async fn subscribe_message_events(
        &self,
        contract: Address,
        from_block: u64,
    ) -> SyncResult<EventSubscription> {
        let (sender, subscription) = EventSubscription::channel(SUBSCRIPTION_BUFFER);
        let client = self.clone();

        let producer = tokio::spawn(async move {
            let mut next = from_block;
            let mut ticker = time::interval(client.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if sender.is_closed() {
                    return;
                }
                let head = match client.eth_block_number().await {
                    Ok(head) => head,
                    Err(e) => {
                        warn!(error = %e, "[chat-sync] Log poll failed, closing subscription");
                        return;
                    }
                };
                if head < next {
                    continue;
                }
                let to = head.min(next.saturating_add(client.max_log_span - 1));
                match client.eth_get_logs(contract, next, to).await {
                    Ok(events) => {
                        for event in events {
                            if sender.send(event).await.is_err() {
                                return;
                            }
                        }
                        debug!(from = next, to, "[chat-sync] Log poll complete");
                        next = to.saturating_add(1);
                    }
                    Err(e) => {
                        warn!(error = %e, "[chat-sync] Log poll failed, closing subscription");
                        return;
                    }
                }
            }
        });

        Ok(subscription.with_producer(producer))
    }

    async fn submit_transaction(
        &self,
        from: Address,
        contract: Address,
        call: ContractCall,
    ) -> SyncResult<TxRef> {
        let data = format!("0x{}", hex::encode(abi::encode_call(&call)));
        let params = json!([{
            "from": from.to_string(),
            "to": contract.to_string(),
            "data": data,
        }]);
        let raw: String = self
            .call("eth_sendTransaction", params)
            .await
            .map_err(|e| match e {
                SyncError::Rpc { code, message } => {
                    SyncError::TransactionRejected(format!("{message} (code {code})"))
                }
                other => other,
            })?;
        raw.parse()
    }

    async fn wait_for_receipt(&self, tx: TxRef) -> SyncResult<ReceiptStatus> {
        loop {
            let receipt: Option<RpcReceipt> = self
                .call_optional("eth_getTransactionReceipt", json!([tx.to_string()]))
                .await?;
            if let Some(receipt) = receipt {
                let status = receipt
                    .status
                    .as_deref()
                    .map(|s| parse_hex_u64(s, "status"))
                    .transpose()?;
                return Ok(match status {
                    Some(1) => ReceiptStatus::Success,
                    _ => ReceiptStatus::Failure,
                });
            }
            time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl WalletProvider for JsonRpcChainClient {
    async fn current_session(&self) -> SyncResult<Option<WalletSession>> {
        let accounts: Vec<String> = self
            .call("eth_accounts", json!([]))
            .await
            .map_err(|e| SyncError::Wallet(e.to_string()))?;
        let Some(account) = accounts.first() else {
            return Ok(None);
        };
        let account: Address = account.parse()?;
        let raw: String = self
            .call("eth_chainId", json!([]))
            .await
            .map_err(|e| SyncError::Wallet(e.to_string()))?;
        let chain_id: ChainId = parse_hex_u64(&raw, "chainId")?;
        Ok(Some(WalletSession::new(account, chain_id)))
    }

    async fn switch_chain(&self, chain_id: ChainId) -> SyncResult<()> {
        let _: Option<Value> = self
            .call_optional(
                "wallet_switchEthereumChain",
                json!([{ "chainId": format!("0x{chain_id:x}") }]),
            )
            .await
            .map_err(|e| SyncError::Wallet(e.to_string()))?;
        Ok(())
    }
}
