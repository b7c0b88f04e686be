//! CLI command implementations.

use crate::AppContext;
use vaultline_types::{display_to_base, TOKEN_SYMBOL};
use vaultline_wallet::ServiceError;

type Result = std::result::Result<(), Box<dyn std::error::Error>>;

/// Parse a display-unit amount string ("1.5") into base units.
fn parse_amount(s: &str) -> std::result::Result<u64, Box<dyn std::error::Error>> {
    let display: f64 = s
        .parse()
        .map_err(|_| format!("invalid amount: {}", s))?;
    let base = display_to_base(display);
    if base == 0 {
        return Err("amount must be positive".into());
    }
    Ok(base)
}

fn print_error(e: &ServiceError) {
    // Structured shape matches what the serving layer emits.
    match serde_json::to_string_pretty(&e.to_structured()) {
        Ok(json) => eprintln!("{}", json),
        Err(_) => eprintln!("{}", e),
    }
}

// ─── Commands ───────────────────────────────────────────────────────────────

pub async fn create(ctx: &AppContext, user: &str, wallet: &str) -> Result {
    let created = ctx.service.create_wallet(user, wallet).await.map_err(|e| {
        print_error(&e);
        e
    })?;

    println!("Wallet created: {}", created.id);
    println!("Address: {}", created.address);
    if created.generated_address {
        println!("  (deterministic fallback address, not vault-derived)");
    }
    println!();

    if let Some(mnemonic) = &created.mnemonic {
        println!("IMPORTANT: Write down your seed phrase and keep it safe!");
        println!("It is shown once and never again.");
        println!();
        println!("Seed phrase (24 words):");
        println!("  {}", mnemonic);
        println!();
    }
    if let Some(warning) = &created.warning {
        println!("Warning: {}", warning);
    }
    Ok(())
}

pub async fn address(ctx: &AppContext, wallet: &str) -> Result {
    let address = ctx.service.get_wallet_address(wallet).await.map_err(|e| {
        print_error(&e);
        e
    })?;
    println!("{}", address);
    Ok(())
}

pub async fn balance(ctx: &AppContext, wallet: &str) -> Result {
    let balance = ctx.service.get_wallet_balance(wallet).await.map_err(|e| {
        print_error(&e);
        e
    })?;
    println!("{} {}", balance, TOKEN_SYMBOL);
    Ok(())
}

pub async fn sync(ctx: &AppContext, wallet: &str) -> Result {
    let synced = ctx.service.sync_wallet(wallet).await.map_err(|e| {
        print_error(&e);
        e
    })?;

    println!("Wallet:  {}", synced.id);
    println!("Address: {}", synced.address);
    println!("Balance: {} {}", synced.balance, synced.token_symbol);
    println!("Updated: {}", synced.last_updated);
    if synced.offline {
        println!("(ledger unreachable; showing cached data)");
    }
    Ok(())
}

pub async fn transfer(
    ctx: &AppContext,
    wallet: &str,
    to: &str,
    amount: &str,
    direct: bool,
) -> Result {
    let amount_base = parse_amount(amount)?;

    let result = ctx
        .service
        .transfer_tokens(wallet, to, amount_base, direct)
        .await
        .map_err(|e| {
            print_error(&e);
            e
        })?;

    println!("Transfer submitted via {} path", result.method);
    println!("Transaction: {}", result.transaction_id);
    if let Some(block_id) = &result.block_id {
        println!("Block:       {}", block_id);
    }
    println!("Amount:      {} {}", result.amount, TOKEN_SYMBOL);
    println!("Recipient:   {}", result.recipient);
    println!("New balance: {} {}", result.new_balance, TOKEN_SYMBOL);
    Ok(())
}

pub async fn faucet(ctx: &AppContext, wallet: &str, amount: &str) -> Result {
    let display: f64 = amount
        .parse()
        .map_err(|_| format!("invalid amount: {}", amount))?;

    let outcome = ctx
        .service
        .request_faucet_tokens(wallet, display)
        .await
        .map_err(|e| {
            print_error(&e);
            e
        })?;

    println!("Faucet request: {}", outcome.status);
    println!("Address:     {}", outcome.address);
    println!("Amount:      {} {}", outcome.amount, outcome.token_symbol);
    println!("Transaction: {}", outcome.transaction_id);
    println!(
        "Balance:     {} -> {} {}",
        outcome.old_balance, outcome.new_balance, outcome.token_symbol
    );
    if let Some(message) = &outcome.message {
        println!("Note: {}", message);
    }
    Ok(())
}

pub async fn delete(ctx: &AppContext, wallet: &str) -> Result {
    ctx.service.delete_wallet(wallet).await.map_err(|e| {
        print_error(&e);
        e
    })?;
    println!("Wallet {} deleted", wallet);
    Ok(())
}

pub async fn reset(ctx: &AppContext, user: &str, wallet: &str) -> Result {
    let created = ctx.service.reset_wallet(user, wallet).await.map_err(|e| {
        print_error(&e);
        e
    })?;

    println!("Wallet {} reset and re-created", created.id);
    println!("Address: {}", created.address);
    if let Some(mnemonic) = &created.mnemonic {
        println!();
        println!("New seed phrase (24 words):");
        println!("  {}", mnemonic);
    }
    Ok(())
}
