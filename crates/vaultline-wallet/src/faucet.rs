//! Faucet client.
//!
//! The external test-network faucet credits an address on request. The
//! amount it acknowledges is authoritative and may differ from the amount
//! requested; callers reconcile.

use crate::error::ServiceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// What the faucet granted.
#[derive(Debug, Clone)]
pub struct FaucetGrant {
    pub transaction_id: String,
    /// Base-unit amount the faucet acknowledged, when it reported one.
    pub amount: Option<u64>,
}

/// Seam for the faucet endpoint so tests can fail it on demand.
#[async_trait]
pub trait FaucetApi: Send + Sync {
    async fn request(&self, address: &str, amount_base: u64) -> Result<FaucetGrant, ServiceError>;
}

#[derive(Debug, Serialize)]
struct FaucetRequest<'a> {
    address: &'a str,
    amount: String,
}

#[derive(Debug, Deserialize)]
struct FaucetResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    amount: Option<String>,
}

/// HTTP faucet client posting `{address, amount}` to the enqueue endpoint.
pub struct HttpFaucet {
    client: reqwest::Client,
    endpoint: String,
}

/// Faucet calls get a short ceiling; a slow faucet is treated as offline.
const FAUCET_TIMEOUT: Duration = Duration::from_secs(10);

impl HttpFaucet {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(FAUCET_TIMEOUT)
            .build()
            .map_err(|e| ServiceError::Network { message: e.to_string() })?;
        Ok(Self { client, endpoint: endpoint.into() })
    }
}

#[async_trait]
impl FaucetApi for HttpFaucet {
    async fn request(&self, address: &str, amount_base: u64) -> Result<FaucetGrant, ServiceError> {
        let body = FaucetRequest {
            address,
            amount: amount_base.to_string(),
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(classify)?;
        let resp = resp.error_for_status().map_err(classify)?;
        let parsed: FaucetResponse = resp.json().await.map_err(classify)?;

        let amount = parsed.amount.as_deref().and_then(|a| a.parse::<u64>().ok());
        if let Some(granted) = amount {
            if granted != amount_base {
                log::debug!(
                    "faucet acknowledged a different amount: {} (requested {})",
                    granted,
                    amount_base
                );
            }
        }

        Ok(FaucetGrant {
            transaction_id: parsed.id.unwrap_or_else(|| format!("faucet-tx-{}", now_millis())),
            amount,
        })
    }
}

fn classify(e: reqwest::Error) -> ServiceError {
    if e.is_timeout() {
        ServiceError::Timeout { seconds: FAUCET_TIMEOUT.as_secs() }
    } else {
        ServiceError::Network { message: e.to_string() }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
