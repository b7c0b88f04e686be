use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use vaultline_runtime::StrongboxProvider;
use vaultline_types::NetworkConfig;
use vaultline_wallet::{
    CoordinatorConfig, HttpFaucet, ServiceConfig, WalletCoordinator, WalletService,
};

mod commands;

/// Vaultline wallet command-line interface.
#[derive(Parser)]
#[command(name = "vaultline")]
#[command(about = "Coordinated wallet operations over an encrypted secret vault")]
#[command(version)]
struct Cli {
    /// Data directory for vault databases, snapshots, and lock files.
    #[arg(long, default_value = ".vaultline")]
    data_dir: PathBuf,

    /// Vault password (falls back to the VAULTLINE_PASSWORD environment
    /// variable).
    #[arg(long)]
    password: Option<String>,

    /// Timeout in seconds for individual node requests.
    #[arg(long, default_value = "10")]
    node_timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new wallet.
    Create {
        /// Owning user id.
        #[arg(long)]
        user: String,

        /// Wallet id.
        #[arg(long)]
        wallet: String,
    },

    /// Show the wallet's receive address.
    Address {
        #[arg(long)]
        wallet: String,
    },

    /// Show the wallet's balance.
    Balance {
        #[arg(long)]
        wallet: String,
    },

    /// Sync the wallet against the ledger.
    Sync {
        #[arg(long)]
        wallet: String,
    },

    /// Transfer tokens to an address.
    Transfer {
        #[arg(long)]
        wallet: String,

        /// Destination address.
        #[arg(long)]
        to: String,

        /// Amount in display units (e.g. "1.5").
        #[arg(long)]
        amount: String,

        /// Bypass the shared queue with a direct, file-locked handle.
        #[arg(long)]
        direct: bool,
    },

    /// Request test tokens from the faucet.
    Faucet {
        #[arg(long)]
        wallet: String,

        /// Amount in display units.
        #[arg(long, default_value = "100")]
        amount: String,
    },

    /// Delete a wallet's vault state.
    Delete {
        #[arg(long)]
        wallet: String,
    },

    /// Delete and re-create a wallet (recovery).
    Reset {
        #[arg(long)]
        user: String,

        #[arg(long)]
        wallet: String,
    },
}

/// Application context shared across commands.
struct AppContext {
    service: WalletService,
}

impl AppContext {
    fn from_cli(cli: &Cli) -> Result<Self, Box<dyn std::error::Error>> {
        let password = match &cli.password {
            Some(p) => p.clone(),
            None => std::env::var("VAULTLINE_PASSWORD")
                .map_err(|_| "no password: pass --password or set VAULTLINE_PASSWORD")?,
        };

        let db_dir = cli.data_dir.join("db");
        let snapshot_dir = cli.data_dir.join("snapshots");
        let network = NetworkConfig::testnet();
        let node_timeout = Duration::from_secs(cli.node_timeout);

        let provider = Arc::new(StrongboxProvider::new(
            &db_dir,
            &snapshot_dir,
            network.clone(),
            password,
            node_timeout,
        ));
        let coordinator =
            WalletCoordinator::new(provider.clone(), CoordinatorConfig::new(&db_dir));
        let faucet = Arc::new(HttpFaucet::new(network.faucet_api.clone())?);
        let service = WalletService::new(
            coordinator,
            provider,
            faucet,
            ServiceConfig::new(&snapshot_dir),
        );

        Ok(Self { service })
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let ctx = match AppContext::from_cli(&cli) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Create { user, wallet } => commands::create(&ctx, &user, &wallet).await,
        Commands::Address { wallet } => commands::address(&ctx, &wallet).await,
        Commands::Balance { wallet } => commands::balance(&ctx, &wallet).await,
        Commands::Sync { wallet } => commands::sync(&ctx, &wallet).await,
        Commands::Transfer {
            wallet,
            to,
            amount,
            direct,
        } => commands::transfer(&ctx, &wallet, &to, &amount, direct).await,
        Commands::Faucet { wallet, amount } => commands::faucet(&ctx, &wallet, &amount).await,
        Commands::Delete { wallet } => commands::delete(&ctx, &wallet).await,
        Commands::Reset { user, wallet } => commands::reset(&ctx, &user, &wallet).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
