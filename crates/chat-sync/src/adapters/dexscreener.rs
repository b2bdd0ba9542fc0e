//! DexScreener price oracle: `GET {base}/{token}`, first pair's `priceUsd`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::domain::{Address, SyncError, SyncResult};
use crate::ports::PriceOracle;

#[derive(Debug, Deserialize)]
struct TokenPairsResponse {
    #[serde(default)]
    pairs: Option<Vec<Pair>>,
}

#[derive(Debug, Deserialize)]
struct Pair {
    #[serde(rename = "priceUsd")]
    price_usd: Option<String>,
}

/// Price oracle backed by the DexScreener token endpoint.
pub struct DexScreenerOracle {
    client: Client,
    base_url: String,
}

impl DexScreenerOracle {
    /// Create an oracle for `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

fn first_pair_price(response: TokenPairsResponse) -> SyncResult<f64> {
    let raw = response
        .pairs
        .and_then(|pairs| pairs.into_iter().next())
        .and_then(|pair| pair.price_usd)
        .ok_or_else(|| SyncError::PriceUnavailable("no trading pair".to_string()))?;
    raw.trim()
        .parse::<f64>()
        .map_err(|e| SyncError::PriceUnavailable(format!("bad priceUsd {raw:?}: {e}")))
}

#[async_trait]
impl PriceOracle for DexScreenerOracle {
    async fn usd_price(&self, token: Address) -> SyncResult<f64> {
        let url = format!("{}/{}", self.base_url, token);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?
            .error_for_status()
            .map_err(|e| SyncError::PriceUnavailable(e.to_string()))?;
        let body: TokenPairsResponse = response
            .json()
            .await
            .map_err(|e| SyncError::decode("price response", e))?;
        first_pair_price(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_pair_wins() {
        let body: TokenPairsResponse = serde_json::from_str(
            r#"{"pairs":[{"priceUsd":"0.00042"},{"priceUsd":"9.0"}]}"#,
        )
        .unwrap();
        assert_eq!(first_pair_price(body).unwrap(), 0.00042);
    }

    #[test]
    fn test_no_pairs_is_unavailable() {
        let body: TokenPairsResponse = serde_json::from_str(r#"{"pairs":null}"#).unwrap();
        assert!(matches!(
            first_pair_price(body),
            Err(SyncError::PriceUnavailable(_))
        ));

        let body: TokenPairsResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert!(first_pair_price(body).is_err());
    }

    #[test]
    fn test_unparsable_price() {
        let body: TokenPairsResponse =
            serde_json::from_str(r#"{"pairs":[{"priceUsd":"n/a"}]}"#).unwrap();
        assert!(first_pair_price(body).is_err());
    }
}
