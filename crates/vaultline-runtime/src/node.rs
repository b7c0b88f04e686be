//! Ledger node HTTP client.
//!
//! Thin REST client over the fixed node endpoint list. Every call carries a
//! request timeout; the primary node is tried first, then the rest of the
//! list in order. There is no availability guarantee — callers decide how to
//! degrade.

use crate::error::RuntimeError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use vaultline_types::NetworkConfig;

/// Base-coin balance of an address, in base units.
///
/// The node reports amounts as decimal strings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BaseCoinBalance {
    #[serde(default)]
    pub available: String,
    #[serde(default)]
    pub total: String,
}

impl BaseCoinBalance {
    /// Available balance, falling back to total when available is absent.
    pub fn available_base(&self) -> u64 {
        if let Ok(v) = self.available.parse::<u64>() {
            return v;
        }
        self.total.parse::<u64>().unwrap_or(0)
    }
}

#[derive(Debug, Serialize)]
struct TransferRequest<'a> {
    outputs: &'a [TransferRequestOutput],
    #[serde(rename = "allowMicroAmount")]
    allow_micro_amount: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct TransferRequestOutput {
    pub address: String,
    /// Base-unit amount as a decimal string, as the node expects.
    pub amount: String,
}

#[derive(Debug, Deserialize)]
struct TransferResponse {
    #[serde(rename = "transactionId")]
    transaction_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "blockId")]
    block_id: Option<String>,
}

/// Async client for the ledger node REST API.
pub struct NodeClient {
    client: reqwest::Client,
    nodes: Vec<String>,
    timeout: Duration,
}

impl NodeClient {
    /// Build a client from the network configuration.
    pub fn new(network: &NetworkConfig, timeout: Duration) -> Result<Self, RuntimeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| RuntimeError::Network(e.to_string()))?;

        // Primary first, then the remaining candidates in order.
        let mut nodes = vec![network.primary_node.clone()];
        for node in &network.nodes {
            if *node != network.primary_node {
                nodes.push(node.clone());
            }
        }

        Ok(Self { client, nodes, timeout })
    }

    /// Request timeout this client applies per call.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Check that at least one node answers its health endpoint.
    pub async fn health(&self) -> Result<(), RuntimeError> {
        self.try_nodes(|node| format!("{}/health", node), |_: serde_json::Value| Ok(()))
            .await
    }

    /// Fetch the base-coin balance for an address.
    pub async fn balance(&self, address: &str) -> Result<BaseCoinBalance, RuntimeError> {
        let address = address.to_string();
        self.try_nodes(
            move |node| format!("{}/api/v1/addresses/{}/balance", node, address),
            Ok,
        )
        .await
    }

    /// Submit a transfer and return the node's receipt.
    pub(crate) async fn submit_transfer(
        &self,
        outputs: &[TransferRequestOutput],
        allow_micro_amount: bool,
    ) -> Result<(String, Option<String>), RuntimeError> {
        let body = TransferRequest { outputs, allow_micro_amount };

        let mut last_err = RuntimeError::Network("no nodes configured".into());
        for node in &self.nodes {
            let url = format!("{}/api/v1/transfers", node);
            match self.post_json::<_, TransferResponse>(&url, &body).await {
                Ok(resp) => {
                    let tx_id = resp
                        .transaction_id
                        .or(resp.id)
                        .ok_or_else(|| RuntimeError::Network("transfer receipt missing id".into()))?;
                    return Ok((tx_id, resp.block_id));
                }
                Err(e) => {
                    log::warn!("transfer submit via {} failed: {}", node, e);
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    /// Walk the node list issuing a GET, mapping the first success.
    async fn try_nodes<T, R>(
        &self,
        make_url: impl Fn(&str) -> String,
        map: impl Fn(T) -> Result<R, RuntimeError>,
    ) -> Result<R, RuntimeError>
    where
        T: serde::de::DeserializeOwned,
    {
        let mut last_err = RuntimeError::Network("no nodes configured".into());
        for node in &self.nodes {
            let url = make_url(node);
            match self.get_json::<T>(&url).await {
                Ok(val) => return map(val),
                Err(e) => {
                    log::debug!("node request {} failed: {}", url, e);
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, RuntimeError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        let resp = resp.error_for_status().map_err(|e| self.classify(e))?;
        resp.json::<T>().await.map_err(|e| self.classify(e))
    }

    async fn post_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, RuntimeError> {
        let resp = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        let resp = resp.error_for_status().map_err(|e| self.classify(e))?;
        resp.json::<T>().await.map_err(|e| self.classify(e))
    }

    /// Classify a transport failure into the tagged runtime error set.
    fn classify(&self, e: reqwest::Error) -> RuntimeError {
        if e.is_timeout() {
            RuntimeError::Timeout {
                what: "node request".into(),
                secs: self.timeout.as_secs(),
            }
        } else {
            RuntimeError::Network(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_base_prefers_available() {
        let b = BaseCoinBalance { available: "150".into(), total: "200".into() };
        assert_eq!(b.available_base(), 150);
    }

    #[test]
    fn test_available_base_falls_back_to_total() {
        let b = BaseCoinBalance { available: String::new(), total: "200".into() };
        assert_eq!(b.available_base(), 200);
        let empty = BaseCoinBalance::default();
        assert_eq!(empty.available_base(), 0);
    }

    #[test]
    fn test_primary_node_first() {
        let mut cfg = NetworkConfig::testnet();
        cfg.nodes = vec!["https://a.example".into(), "https://b.example".into()];
        cfg.primary_node = "https://b.example".into();
        let client = NodeClient::new(&cfg, Duration::from_secs(5)).unwrap();
        assert_eq!(client.nodes[0], "https://b.example");
        assert_eq!(client.nodes.len(), 2);
    }
}
