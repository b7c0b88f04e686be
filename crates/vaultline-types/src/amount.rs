//! Token unit conversion.
//!
//! All internal arithmetic is done in base units (the smallest indivisible
//! ledger unit). Display units are a fixed power-of-ten scaling used only at
//! the API boundary.

/// Token symbol shown alongside display amounts.
pub const TOKEN_SYMBOL: &str = "TST";

/// 1 display token = 10^6 base units.
pub const TOKEN_DECIMALS: u32 = 6;

/// Scale factor between base and display units.
const SCALE: u64 = 10u64.pow(TOKEN_DECIMALS);

/// Convert base units to a human-readable display amount.
pub fn base_to_display(base: u64) -> f64 {
    base as f64 / SCALE as f64
}

/// Convert a display amount to base units.
pub fn display_to_base(display: f64) -> u64 {
    if display <= 0.0 || !display.is_finite() {
        return 0;
    }
    // Round so values like 0.1 (not exactly representable in binary) still
    // map to the expected base amount.
    (display * SCALE as f64).round() as u64
}

/// Format a display amount with the token symbol.
pub fn format_token_amount(display: f64) -> String {
    format!("{} {}", display, TOKEN_SYMBOL)
}
