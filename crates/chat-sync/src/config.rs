//! # Sync Configuration
//!
//! Deployment parameters for the chat sync engine.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `CHAT_CONTRACT` | (required) | Chat contract address |
//! | `CHAT_TOKEN` | deployment token | Burn token address |
//! | `CHAT_CHAIN_ID` | `8453` | Target chain |
//! | `CHAT_TOKEN_DECIMALS` | `18` | Token decimals |
//! | `CHAT_BALANCE_POLL_MS` | `5000` | Balance/allowance poll |
//! | `CHAT_PRICE_POLL_MS` | `60000` | Price poll |
//! | `CHAT_STATS_POLL_MS` | `5000` | Contract counters poll |
//! | `CHAT_REQUEST_TIMEOUT_MS` | `10000` | Per-request deadline |
//! | `CHAT_RECEIPT_TIMEOUT_MS` | `180000` | Confirmation deadline |
//! | `CHAT_FEED_FAILURE_THRESHOLD` | `3` | Recovery failures before unavailable |
//! | `CHAT_PRICE_API_URL` | DexScreener | Price endpoint base |

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::domain::{
    Address, ChainId, DEFAULT_BALANCE_POLL_MS, DEFAULT_FEED_FAILURE_THRESHOLD,
    DEFAULT_POST_REFRESH_DELAY_MS, DEFAULT_PRICE_POLL_MS, MAX_TOKEN_DECIMALS,
};

/// Burn token of the deployment.
pub const DEFAULT_TOKEN_CONTRACT: Address = Address([
    0x9f, 0x86, 0xdb, 0x9f, 0xc6, 0xf7, 0xc9, 0x40, 0x8e, 0x8f, 0xda, 0x3f, 0xf8, 0xce, 0x4e,
    0x78, 0xac, 0x7a, 0x6b, 0x07,
]);

/// Base mainnet.
pub const DEFAULT_TARGET_CHAIN_ID: ChainId = 8453;

/// DexScreener token endpoint.
pub const DEFAULT_PRICE_API_URL: &str = "https://api.dexscreener.com/latest/dex/tokens";

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The chat contract address was not provided.
    #[error("Chat contract address is not set (CHAT_CONTRACT)")]
    MissingChatContract,

    /// A poll interval is zero.
    #[error("Interval {0} must be greater than zero")]
    ZeroInterval(&'static str),

    /// Token decimals too large for a 256-bit unit.
    #[error("Token decimals {0} exceed the maximum of {MAX_TOKEN_DECIMALS}")]
    InvalidDecimals(u8),
}

/// Sync engine configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Chat contract (resolved externally).
    pub chat_contract: Address,
    /// Token burned by posts.
    pub token_contract: Address,
    /// Chain the contracts live on.
    pub target_chain_id: ChainId,
    /// Token decimals, for display.
    pub token_decimals: u8,

    /// Balance/allowance poll interval.
    pub balance_poll_ms: u64,
    /// Price poll interval.
    pub price_poll_ms: u64,
    /// Contract counters poll interval.
    pub stats_poll_ms: u64,
    /// Delay before reconciling after a successful post.
    pub post_refresh_delay_ms: u64,

    /// Deadline for a single network request.
    pub request_timeout_ms: u64,
    /// Deadline for a transaction to be mined.
    pub receipt_timeout_ms: u64,

    /// Maximum block span of one log query.
    pub backfill_chunk_blocks: u64,
    /// Delay between feed recovery attempts.
    pub feed_retry_ms: u64,
    /// Consecutive recovery failures before the feed is unavailable.
    pub feed_failure_threshold: u32,

    /// Price endpoint base; the token address is appended.
    pub price_api_url: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            chat_contract: Address::ZERO,
            token_contract: DEFAULT_TOKEN_CONTRACT,
            target_chain_id: DEFAULT_TARGET_CHAIN_ID,
            token_decimals: 18,
            balance_poll_ms: DEFAULT_BALANCE_POLL_MS,
            price_poll_ms: DEFAULT_PRICE_POLL_MS,
            stats_poll_ms: DEFAULT_BALANCE_POLL_MS,
            post_refresh_delay_ms: DEFAULT_POST_REFRESH_DELAY_MS,
            request_timeout_ms: 10_000,
            receipt_timeout_ms: 180_000,
            backfill_chunk_blocks: 50_000,
            feed_retry_ms: 2_000,
            feed_failure_threshold: DEFAULT_FEED_FAILURE_THRESHOLD,
            price_api_url: DEFAULT_PRICE_API_URL.to_string(),
        }
    }
}

impl SyncConfig {
    /// Create a config for testing (fixed contracts, short deadlines).
    pub fn for_testing() -> Self {
        Self {
            chat_contract: Address([0xcc; 20]),
            token_contract: Address([0x70; 20]),
            request_timeout_ms: 1_000,
            receipt_timeout_ms: 10_000,
            backfill_chunk_blocks: 100,
            feed_retry_ms: 100,
            ..Self::default()
        }
    }

    /// Create configuration from `CHAT_*` environment variables.
    ///
    /// Unset or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            chat_contract: env_parse("CHAT_CONTRACT").unwrap_or(defaults.chat_contract),
            token_contract: env_parse("CHAT_TOKEN").unwrap_or(defaults.token_contract),
            target_chain_id: env_parse("CHAT_CHAIN_ID").unwrap_or(defaults.target_chain_id),
            token_decimals: env_parse("CHAT_TOKEN_DECIMALS").unwrap_or(defaults.token_decimals),
            balance_poll_ms: env_parse("CHAT_BALANCE_POLL_MS").unwrap_or(defaults.balance_poll_ms),
            price_poll_ms: env_parse("CHAT_PRICE_POLL_MS").unwrap_or(defaults.price_poll_ms),
            stats_poll_ms: env_parse("CHAT_STATS_POLL_MS").unwrap_or(defaults.stats_poll_ms),
            post_refresh_delay_ms: env_parse("CHAT_POST_REFRESH_DELAY_MS")
                .unwrap_or(defaults.post_refresh_delay_ms),
            request_timeout_ms: env_parse("CHAT_REQUEST_TIMEOUT_MS")
                .unwrap_or(defaults.request_timeout_ms),
            receipt_timeout_ms: env_parse("CHAT_RECEIPT_TIMEOUT_MS")
                .unwrap_or(defaults.receipt_timeout_ms),
            backfill_chunk_blocks: env_parse("CHAT_BACKFILL_CHUNK_BLOCKS")
                .unwrap_or(defaults.backfill_chunk_blocks),
            feed_retry_ms: env_parse("CHAT_FEED_RETRY_MS").unwrap_or(defaults.feed_retry_ms),
            feed_failure_threshold: env_parse("CHAT_FEED_FAILURE_THRESHOLD")
                .unwrap_or(defaults.feed_failure_threshold),
            price_api_url: env::var("CHAT_PRICE_API_URL").unwrap_or(defaults.price_api_url),
        }
    }

    /// Validate before starting a coordinator.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chat_contract.is_zero() {
            return Err(ConfigError::MissingChatContract);
        }
        if self.token_decimals > MAX_TOKEN_DECIMALS {
            return Err(ConfigError::InvalidDecimals(self.token_decimals));
        }
        for (name, value) in [
            ("balance_poll_ms", self.balance_poll_ms),
            ("price_poll_ms", self.price_poll_ms),
            ("stats_poll_ms", self.stats_poll_ms),
            ("feed_retry_ms", self.feed_retry_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroInterval(name));
            }
        }
        Ok(())
    }

    /// Balance/allowance poll interval.
    pub fn balance_poll_interval(&self) -> Duration {
        Duration::from_millis(self.balance_poll_ms)
    }

    /// Price poll interval.
    pub fn price_poll_interval(&self) -> Duration {
        Duration::from_millis(self.price_poll_ms)
    }

    /// Contract counters poll interval.
    pub fn stats_poll_interval(&self) -> Duration {
        Duration::from_millis(self.stats_poll_ms)
    }

    /// Delay before the post-success refresh.
    pub fn post_refresh_delay(&self) -> Duration {
        Duration::from_millis(self.post_refresh_delay_ms)
    }

    /// Per-request deadline.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Confirmation deadline.
    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_millis(self.receipt_timeout_ms)
    }

    /// Delay between feed recovery attempts.
    pub fn feed_retry_delay(&self) -> Duration {
        Duration::from_millis(self.feed_retry_ms)
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.balance_poll_ms, 5_000);
        assert_eq!(config.price_poll_ms, 60_000);
        assert_eq!(config.post_refresh_delay_ms, 3_000);
        assert_eq!(config.target_chain_id, 8453);
        assert_eq!(
            config.token_contract.to_string(),
            "0x9f86db9fc6f7c9408e8fda3ff8ce4e78ac7a6b07"
        );
    }

    #[test]
    fn test_default_requires_chat_contract() {
        assert_eq!(
            SyncConfig::default().validate(),
            Err(ConfigError::MissingChatContract)
        );
    }

    #[test]
    fn test_testing_config_is_valid() {
        assert!(SyncConfig::for_testing().validate().is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = SyncConfig {
            price_poll_ms: 0,
            ..SyncConfig::for_testing()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroInterval("price_poll_ms")));
    }

    #[test]
    fn test_token_decimals_bounded() {
        let config = SyncConfig {
            token_decimals: 78,
            ..SyncConfig::for_testing()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidDecimals(78)));

        let config = SyncConfig {
            token_decimals: MAX_TOKEN_DECIMALS,
            ..SyncConfig::for_testing()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_durations() {
        let config = SyncConfig::default();
        assert_eq!(config.balance_poll_interval(), Duration::from_secs(5));
        assert_eq!(config.post_refresh_delay(), Duration::from_secs(3));
    }
}
