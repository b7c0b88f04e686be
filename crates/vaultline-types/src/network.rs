//! Network configuration.
//!
//! The node list, faucet endpoint, and network id are fixed per deployment;
//! there is no runtime discovery.

use serde::{Deserialize, Serialize};

/// Ledger network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Candidate node endpoints, tried in order.
    pub nodes: Vec<String>,
    /// Preferred node, always tried first.
    pub primary_node: String,
    /// Faucet enqueue endpoint.
    pub faucet_api: String,
    /// Explorer base URL for rendering transaction links.
    pub explorer_url: String,
    /// Network identifier (e.g., `testnet`).
    pub network_id: String,
    /// SLIP-44 style coin type used for account derivation.
    pub coin_type: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self::testnet()
    }
}

impl NetworkConfig {
    /// The public testnet configuration.
    pub fn testnet() -> Self {
        Self {
            nodes: vec!["https://api.testnet.iotaledger.net".to_string()],
            primary_node: "https://api.testnet.iotaledger.net".to_string(),
            faucet_api: "https://faucet.testnet.iotaledger.net/api/enqueue".to_string(),
            explorer_url: "https://explorer.iota.org/iota-testnet".to_string(),
            network_id: "testnet".to_string(),
            coin_type: 4218,
        }
    }
}
