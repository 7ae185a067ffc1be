//! Command implementations.

use crate::Cli;
use egret_engine::{BalanceCache, EngineContext, WorkerPool};
use egret_keys::KeyStore;
use egret_ledger::{registry, ChainClient, MetadataRegistry, ProviderConfig};
use egret_store::{NewMint, NewOutput, NewOutputAsset, Store};
use egret_types::{address, slot};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// How often the running engine re-scans for newly queued jobs.
const QUEUE_POLL_INTERVAL: Duration = Duration::from_secs(5);

fn open_store(cli: &Cli) -> Result<Store, Box<dyn std::error::Error>> {
    Ok(Store::open(&cli.db)?)
}

fn open_keystore(cli: &Cli) -> Result<KeyStore, Box<dyn std::error::Error>> {
    let master = cli
        .master_key
        .as_deref()
        .ok_or("master key required (set EGRET_MASTER_KEY or --master-key)")?;
    Ok(KeyStore::from_hex(master, cli.network())?)
}

fn chain_client(cli: &Cli) -> ChainClient {
    ChainClient::new(ProviderConfig {
        url: cli.provider_url.clone(),
        project_key: cli.provider_key.clone(),
        ..Default::default()
    })
}

pub async fn create_wallet(cli: &Cli, name: &str) -> CmdResult {
    let store = open_store(cli)?;
    let keys = open_keystore(cli)?;

    let generated = keys.generate_wallet()?;
    let row = store.create_wallet(name, &generated.address, &generated.sealed_key_hex)?;
    println!("id:      {}", row.id);
    println!("name:    {}", row.name);
    println!("address: {}", row.address);
    Ok(())
}

pub async fn list_wallets(cli: &Cli) -> CmdResult {
    let store = open_store(cli)?;
    for wallet in store.list_wallets()? {
        println!("{}  {}  {}", wallet.id, wallet.name, wallet.address);
    }
    Ok(())
}

pub async fn create_policy(
    cli: &Cli,
    name: &str,
    lock_slot: Option<u64>,
    lock_timestamp: Option<i64>,
) -> CmdResult {
    let store = open_store(cli)?;
    let keys = open_keystore(cli)?;

    let locking_slot = match (lock_slot, lock_timestamp) {
        (Some(slot), _) => Some(slot),
        (None, Some(ts)) => Some(slot::unix_to_slot(ts)),
        (None, None) => None,
    };

    let generated = keys.generate_policy(locking_slot)?;
    let row = store.create_policy(
        name,
        &generated.policy_id,
        &generated.sealed_key_hex,
        locking_slot.map(|s| s as i64),
    )?;
    println!("name:         {}", row.name);
    println!("policy id:    {}", row.policy_id);
    match row.locking_slot {
        Some(slot) => println!("locking slot: {slot}"),
        None => println!("locking slot: none"),
    }
    Ok(())
}

pub async fn list_policies(cli: &Cli) -> CmdResult {
    let store = open_store(cli)?;
    for policy in store.list_policies()? {
        let lock = policy
            .locking_slot
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".into());
        println!("{}  {}  lock:{}", policy.policy_id, policy.name, lock);
    }
    Ok(())
}

pub async fn balance(cli: &Cli, addr: &str) -> CmdResult {
    if !address::is_valid(addr) {
        return Err(format!("invalid address: {addr}").into());
    }
    let client = chain_client(cli);
    let balance = client.balance(addr).await?;
    println!("lovelace: {}", balance.value.coin);
    for (unit, quantity) in &balance.value.assets {
        println!("{unit}: {quantity}");
    }
    println!("({} unspent outputs)", balance.utxo_count);
    Ok(())
}

// ─── Job submission ─────────────────────────────────────────────────────────

/// On-disk job description accepted by `enqueue`.
#[derive(Debug, Deserialize)]
struct JobFile {
    wallet_id: String,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
    outputs: Vec<JobOutput>,
    #[serde(default)]
    mints: Vec<JobMint>,
}

#[derive(Debug, Deserialize)]
struct JobOutput {
    address: String,
    #[serde(default)]
    datum: Option<serde_json::Value>,
    assets: Vec<JobAsset>,
}

#[derive(Debug, Deserialize)]
struct JobAsset {
    unit: String,
    quantity: String,
}

#[derive(Debug, Deserialize)]
struct JobMint {
    policy_id: String,
    asset_name: String,
    quantity: i64,
}

pub async fn enqueue(cli: &Cli, file: &str) -> CmdResult {
    let raw = std::fs::read_to_string(file)?;
    let job: JobFile = serde_json::from_str(&raw)?;

    for output in &job.outputs {
        if !address::is_valid(&output.address) {
            return Err(format!("invalid destination address: {}", output.address).into());
        }
    }

    // Metadata labels are checked against the registry here, at the
    // boundary; the engine itself trusts accepted jobs.
    if let Some(metadata) = &job.metadata {
        validate_metadata_labels(cli, metadata).await?;
    }

    let outputs: Vec<NewOutput> = job
        .outputs
        .into_iter()
        .map(|o| NewOutput {
            address: o.address,
            datum: o.datum,
            assets: o
                .assets
                .into_iter()
                .map(|a| NewOutputAsset {
                    unit: a.unit,
                    quantity: a.quantity,
                })
                .collect(),
        })
        .collect();
    let mints: Vec<NewMint> = job
        .mints
        .into_iter()
        .map(|m| NewMint {
            policy_id: m.policy_id,
            asset_name: m.asset_name,
            quantity: m.quantity,
        })
        .collect();

    let store = open_store(cli)?;
    let row = store.create_transaction(&job.wallet_id, job.metadata.as_ref(), &outputs, &mints)?;
    println!("queued transaction {} (seq {})", row.id, row.seq);
    println!("a running `egret run` process will pick it up");
    Ok(())
}

async fn validate_metadata_labels(
    cli: &Cli,
    metadata: &serde_json::Value,
) -> Result<(), Box<dyn std::error::Error>> {
    let object = metadata
        .as_object()
        .ok_or("metadata must be an object mapping labels to payloads")?;

    let registry = MetadataRegistry::load(
        registry::REGISTRY_URL,
        Path::new(&cli.registry_cache),
    )
    .await?;

    for label_text in object.keys() {
        let label: u64 = label_text
            .parse()
            .map_err(|_| format!("metadata label {label_text} is not an integer"))?;
        if !registry.is_known(label) {
            return Err(format!("metadata label {label} is not in the registry").into());
        }
    }
    Ok(())
}

pub async fn status(cli: &Cli, transaction_id: &str) -> CmdResult {
    let store = open_store(cli)?;
    let job = store
        .transaction(transaction_id)?
        .ok_or_else(|| format!("transaction not found: {transaction_id}"))?;

    let row = &job.row;
    println!("id:      {}", row.id);
    println!("wallet:  {}", row.wallet_id);
    println!("status:  {}", row.status);
    println!("retries: {}", row.retry_count);
    if let Some(hash) = &row.tx_hash {
        println!("hash:    {hash}");
    }
    if let (Some(fee), Some(size)) = (row.fee, row.size) {
        println!("fee:     {fee} ({size} bytes)");
    }
    if let Some(error) = &row.error_message {
        println!("error:   {error}");
    }
    Ok(())
}

pub async fn confirm(cli: &Cli, tx_hash: &str) -> CmdResult {
    let store = open_store(cli)?;
    if store.mark_confirmed(tx_hash)? {
        println!("confirmed {tx_hash}");
    } else {
        println!("no submitted transaction with hash {tx_hash}");
    }
    Ok(())
}

pub async fn run(cli: &Cli) -> CmdResult {
    let store = Arc::new(open_store(cli)?);
    let keys = Arc::new(open_keystore(cli)?);
    let provider = Arc::new(chain_client(cli));
    let cache = Arc::new(BalanceCache::new());

    let ctx = EngineContext {
        provider,
        store,
        keys,
        cache,
    };
    let pool = WorkerPool::new(ctx);

    let started = pool.start_all()?;
    log::info!("engine running with {started} wallet workers");
    pool.recover_queued()?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("shutting down");
                break;
            }
            _ = tokio::time::sleep(QUEUE_POLL_INTERVAL) => {
                if let Err(e) = pool.recover_queued() {
                    log::error!("queue scan failed: {e}");
                }
            }
        }
    }
    Ok(())
}
