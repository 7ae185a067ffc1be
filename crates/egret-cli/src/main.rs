use clap::{Parser, Subcommand};
use egret_types::address::Network;

mod commands;

/// Egret custodial transaction engine.
#[derive(Parser)]
#[command(name = "egret")]
#[command(about = "Custodial UTXO transaction engine")]
#[command(version)]
struct Cli {
    /// Network to use.
    #[arg(long, default_value = "testnet")]
    network: NetworkArg,

    /// SQLite database path.
    #[arg(long, env = "EGRET_DB", default_value = "egret.db")]
    db: String,

    /// Data provider base URL.
    #[arg(long, env = "EGRET_PROVIDER_URL", default_value = "http://localhost:3100")]
    provider_url: String,

    /// Data provider project key.
    #[arg(long, env = "EGRET_PROVIDER_KEY")]
    provider_key: Option<String>,

    /// Master sealing key (64 hex chars). Required for key operations.
    #[arg(long, env = "EGRET_MASTER_KEY", hide_env_values = true)]
    master_key: Option<String>,

    /// Metadata registry cache file.
    #[arg(long, env = "EGRET_REGISTRY_CACHE", default_value = "registry.json")]
    registry_cache: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug)]
enum NetworkArg {
    Mainnet,
    Testnet,
}

impl std::str::FromStr for NetworkArg {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" => Ok(Self::Mainnet),
            "testnet" | "test" | "preprod" | "preview" => Ok(Self::Testnet),
            _ => Err(format!("unknown network: {s} (use mainnet or testnet)")),
        }
    }
}

impl NetworkArg {
    fn to_network(&self) -> Network {
        match self {
            Self::Mainnet => Network::Mainnet,
            Self::Testnet => Network::Testnet,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Onboard a new custodial wallet.
    CreateWallet {
        /// Human name for the wallet.
        #[arg(long)]
        name: String,
    },

    /// List known wallets.
    ListWallets,

    /// Create a minting policy (optionally time-locked).
    CreatePolicy {
        /// Unique policy name.
        #[arg(long)]
        name: String,

        /// Absolute slot after which minting becomes invalid.
        #[arg(long, conflicts_with = "lock_timestamp")]
        lock_slot: Option<u64>,

        /// Unix timestamp converted to the locking slot.
        #[arg(long)]
        lock_timestamp: Option<i64>,
    },

    /// List minting policies.
    ListPolicies,

    /// Aggregate on-chain balance for an address.
    Balance {
        #[arg(long)]
        address: String,
    },

    /// Queue a transaction job described by a JSON file.
    Enqueue {
        /// Path to the job description.
        #[arg(long)]
        file: String,
    },

    /// Show a transaction's current state.
    Status {
        #[arg(long)]
        transaction: String,
    },

    /// Mark a submitted transaction confirmed (confirmation-listener hook).
    Confirm {
        #[arg(long)]
        tx_hash: String,
    },

    /// Run the engine: start every wallet's worker and process queued jobs.
    Run,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match &cli.command {
        Commands::CreateWallet { name } => commands::create_wallet(&cli, name).await,
        Commands::ListWallets => commands::list_wallets(&cli).await,
        Commands::CreatePolicy {
            name,
            lock_slot,
            lock_timestamp,
        } => commands::create_policy(&cli, name, *lock_slot, *lock_timestamp).await,
        Commands::ListPolicies => commands::list_policies(&cli).await,
        Commands::Balance { address } => commands::balance(&cli, address).await,
        Commands::Enqueue { file } => commands::enqueue(&cli, file).await,
        Commands::Status { transaction } => commands::status(&cli, transaction).await,
        Commands::Confirm { tx_hash } => commands::confirm(&cli, tx_hash).await,
        Commands::Run => commands::run(&cli).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

impl Cli {
    fn network(&self) -> Network {
        self.network.to_network()
    }
}
