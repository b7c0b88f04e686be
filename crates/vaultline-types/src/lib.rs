//! Shared vaultline types.
//!
//! Token unit conversion between base ledger units and display units,
//! plus the fixed network configuration surface.

pub mod amount;
pub mod network;

pub use amount::{base_to_display, display_to_base, format_token_amount, TOKEN_DECIMALS, TOKEN_SYMBOL};
pub use network::NetworkConfig;
