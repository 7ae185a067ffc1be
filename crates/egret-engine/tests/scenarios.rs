//! End-to-end engine scenarios against a scripted provider.

use async_trait::async_trait;
use egret_engine::job::{self, EngineContext, JobOutcome};
use egret_engine::{BalanceCache, Provider, WorkerPool};
use egret_keys::KeyStore;
use egret_ledger::{LedgerError, SubmitRejection};
use egret_store::{NewMint, NewOutput, NewOutputAsset, Store};
use egret_types::address::Network;
use egret_types::{TxStatus, Unit, UnspentOutput, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

const ACCEPT_HASH: &str = "e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5";

/// Scripted stand-in for the chain data provider.
struct MockProvider {
    utxos: Mutex<HashMap<String, Vec<UnspentOutput>>>,
    fetches: Mutex<HashMap<String, u32>>,
    submit_script: Mutex<VecDeque<Result<String, LedgerError>>>,
    submitted: Mutex<Vec<Vec<u8>>>,
    min_fee_a: u64,
    min_fee_b: u64,
    coins_per_utxo_byte: u64,
    max_tx_size: u64,
}

impl MockProvider {
    fn new() -> Self {
        MockProvider {
            utxos: Mutex::new(HashMap::new()),
            fetches: Mutex::new(HashMap::new()),
            submit_script: Mutex::new(VecDeque::new()),
            submitted: Mutex::new(Vec::new()),
            min_fee_a: 0,
            min_fee_b: 170_000,
            coins_per_utxo_byte: 0,
            max_tx_size: 16_384,
        }
    }

    fn with_min_coin(mut self) -> Self {
        self.coins_per_utxo_byte = 4_310;
        self
    }

    fn set_utxos(&self, address: &str, utxos: Vec<UnspentOutput>) {
        self.utxos.lock().unwrap().insert(address.to_string(), utxos);
    }

    fn script_submit(&self, results: Vec<Result<String, LedgerError>>) {
        *self.submit_script.lock().unwrap() = results.into();
    }

    fn fetch_count(&self, address: &str) -> u32 {
        *self.fetches.lock().unwrap().get(address).unwrap_or(&0)
    }

    fn submissions(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn utxos_for(&self, address: &str) -> Result<Vec<UnspentOutput>, LedgerError> {
        *self
            .fetches
            .lock()
            .unwrap()
            .entry(address.to_string())
            .or_insert(0) += 1;
        Ok(self
            .utxos
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .unwrap_or_default())
    }

    async fn fee_for_size(&self, size: usize) -> Result<u64, LedgerError> {
        Ok(self.min_fee_a * size as u64 + self.min_fee_b)
    }

    async fn fee_ceiling(&self) -> Result<u64, LedgerError> {
        Ok(self.min_fee_a * self.max_tx_size + self.min_fee_b)
    }

    async fn min_coin_for_size(&self, size: usize) -> Result<u64, LedgerError> {
        Ok((160 + size as u64) * self.coins_per_utxo_byte)
    }

    async fn submit(&self, tx_bytes: Vec<u8>) -> Result<String, LedgerError> {
        self.submitted.lock().unwrap().push(tx_bytes);
        self.submit_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ACCEPT_HASH.to_string()))
    }
}

struct Harness {
    ctx: EngineContext<MockProvider>,
    wallet_id: String,
    address: String,
}

fn harness(provider: MockProvider) -> Harness {
    let keys = Arc::new(KeyStore::new([7u8; 32], Network::Testnet));
    let store = Arc::new(Store::open_in_memory().unwrap());
    let generated = keys.generate_wallet().unwrap();
    let wallet = store
        .create_wallet("treasury", &generated.address, &generated.sealed_key_hex)
        .unwrap();

    Harness {
        ctx: EngineContext {
            provider: Arc::new(provider),
            store,
            keys,
            cache: Arc::new(BalanceCache::new()),
        },
        wallet_id: wallet.id,
        address: generated.address,
    }
}

fn destination() -> String {
    let mut payload = vec![0x60u8];
    payload.extend_from_slice(&[0x33; 28]);
    egret_types::address::encode(egret_types::address::TESTNET_HRP, &payload).unwrap()
}

fn coin_utxo(tag: u8, coin: u64) -> UnspentOutput {
    UnspentOutput::new(format!("{:02x}", tag).repeat(32), 0, Value::from_coin(coin))
}

fn coin_output(address: &str, coin: u64) -> NewOutput {
    NewOutput {
        address: address.to_string(),
        datum: None,
        assets: vec![NewOutputAsset {
            unit: "lovelace".into(),
            quantity: coin.to_string(),
        }],
    }
}

// ─── §8 scenarios ───────────────────────────────────────────────────────────

#[tokio::test]
async fn simple_payment_converges_and_commits_change() {
    let h = harness(MockProvider::new());
    h.ctx.cache.put(&h.address, vec![coin_utxo(0xaa, 10_000_000)]);

    let row = h
        .ctx
        .store
        .create_transaction(&h.wallet_id, None, &[coin_output(&destination(), 2_000_000)], &[])
        .unwrap();

    let outcome = job::process_job(&h.ctx, &row.id).await;
    assert_eq!(outcome, JobOutcome::Submitted);

    let job_row = h.ctx.store.transaction(&row.id).unwrap().unwrap().row;
    assert_eq!(job_row.status, TxStatus::Submitted);
    assert_eq!(job_row.fee, Some(170_000));
    assert_eq!(job_row.tx_hash.as_deref(), Some(ACCEPT_HASH));
    assert!(job_row.size.unwrap() > 0);
    assert!(job_row.error_message.is_none());

    // The change output (10_000_000 - 2_000_000 - 170_000) replaced the
    // consumed input in the cache, keyed by the ledger hash.
    let cached = h.ctx.cache.get(&h.address).unwrap();
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].tx_hash, ACCEPT_HASH);
    assert_eq!(cached[0].value.coin, 7_830_000);
    assert_eq!(cached[0].index, 1);
    assert_eq!(h.ctx.provider.submissions(), 1);
}

#[tokio::test]
async fn insufficient_balance_is_terminal_without_retry() {
    let h = harness(MockProvider::new());
    h.ctx
        .cache
        .put(&h.address, vec![coin_utxo(1, 500_000), coin_utxo(2, 300_000)]);

    let row = h
        .ctx
        .store
        .create_transaction(&h.wallet_id, None, &[coin_output(&destination(), 2_000_000)], &[])
        .unwrap();

    let outcome = job::process_job(&h.ctx, &row.id).await;
    assert_eq!(outcome, JobOutcome::Failed);

    let job_row = h.ctx.store.transaction(&row.id).unwrap().unwrap().row;
    assert_eq!(job_row.status, TxStatus::Failed);
    assert!(job_row.error_message.unwrap().contains("insufficient balance"));
    // Not a retryable class: the counter is untouched and nothing was
    // submitted.
    assert_eq!(job_row.retry_count, 0);
    assert_eq!(h.ctx.provider.submissions(), 0);
}

#[tokio::test]
async fn mint_under_unknown_policy_fails_before_any_ledger_call() {
    let h = harness(MockProvider::new());
    h.ctx.cache.put(&h.address, vec![coin_utxo(1, 10_000_000)]);

    let missing_policy = "d".repeat(56);
    let row = h
        .ctx
        .store
        .create_transaction(
            &h.wallet_id,
            None,
            &[coin_output(&h.address, 2_000_000)],
            &[NewMint {
                policy_id: missing_policy.clone(),
                asset_name: "X".into(),
                quantity: 2,
            }],
        )
        .unwrap();

    let outcome = job::process_job(&h.ctx, &row.id).await;
    assert_eq!(outcome, JobOutcome::Failed);

    let job_row = h.ctx.store.transaction(&row.id).unwrap().unwrap().row;
    assert_eq!(job_row.status, TxStatus::Failed);
    assert!(job_row
        .error_message
        .unwrap()
        .contains("minting policy not found"));
    assert_eq!(h.ctx.provider.submissions(), 0);
    assert_eq!(h.ctx.provider.fetch_count(&h.address), 0);
}

#[tokio::test]
async fn generic_rejections_fail_after_exactly_five_retries() {
    let h = harness(MockProvider::new());
    h.ctx.cache.put(&h.address, vec![coin_utxo(1, 10_000_000)]);
    h.ctx.provider.script_submit(
        (0..10)
            .map(|_| {
                Err(LedgerError::Rejected(SubmitRejection::Other(
                    "MempoolFull".into(),
                )))
            })
            .collect(),
    );

    let row = h
        .ctx
        .store
        .create_transaction(&h.wallet_id, None, &[coin_output(&destination(), 2_000_000)], &[])
        .unwrap();

    let mut attempts = 0;
    loop {
        attempts += 1;
        match job::process_job(&h.ctx, &row.id).await {
            JobOutcome::Retry { refresh_address } => {
                assert!(refresh_address.is_none(), "generic rejection must not refresh");
            }
            JobOutcome::Failed => break,
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(attempts < 20, "retry loop failed to terminate");
    }

    // Five retries, then the sixth attempt hits the ceiling.
    assert_eq!(attempts, 6);
    let job_row = h.ctx.store.transaction(&row.id).unwrap().unwrap().row;
    assert_eq!(job_row.status, TxStatus::Failed);
    assert_eq!(job_row.retry_count, 5);
    assert!(job_row.error_message.unwrap().contains("MempoolFull"));
}

#[tokio::test]
async fn bad_inputs_triggers_exactly_one_forced_refresh() {
    let h = harness(MockProvider::new());
    h.ctx.provider.set_utxos(&h.address, vec![coin_utxo(1, 10_000_000)]);
    h.ctx.cache.put(&h.address, vec![coin_utxo(2, 10_000_000)]);
    h.ctx.provider.script_submit(vec![
        Err(LedgerError::Rejected(SubmitRejection::BadInputs(
            "BadInputsUTxO".into(),
        ))),
        Ok(ACCEPT_HASH.to_string()),
    ]);

    let row = h
        .ctx
        .store
        .create_transaction(&h.wallet_id, None, &[coin_output(&destination(), 2_000_000)], &[])
        .unwrap();

    // First attempt: rejected, marked for refresh-and-retry.
    let outcome = job::process_job(&h.ctx, &row.id).await;
    let JobOutcome::Retry { refresh_address } = outcome else {
        panic!("expected retry, got {outcome:?}");
    };
    assert_eq!(refresh_address.as_deref(), Some(h.address.as_str()));
    assert_eq!(h.ctx.provider.fetch_count(&h.address), 0);

    // What the worker does with that outcome.
    h.ctx.cache.invalidate(&h.address);
    h.ctx
        .cache
        .refresh(h.ctx.provider.as_ref(), &h.address)
        .await
        .unwrap();
    assert_eq!(h.ctx.provider.fetch_count(&h.address), 1);

    // Second attempt selects the refreshed output and succeeds.
    let outcome = job::process_job(&h.ctx, &row.id).await;
    assert_eq!(outcome, JobOutcome::Submitted);
    assert_eq!(h.ctx.provider.fetch_count(&h.address), 1);

    let job_row = h.ctx.store.transaction(&row.id).unwrap().unwrap().row;
    assert_eq!(job_row.status, TxStatus::Submitted);
    assert_eq!(job_row.retry_count, 1);
}

#[tokio::test]
async fn value_not_conserved_also_marks_for_refresh() {
    let h = harness(MockProvider::new());
    h.ctx.cache.put(&h.address, vec![coin_utxo(1, 10_000_000)]);
    h.ctx.provider.script_submit(vec![Err(LedgerError::Rejected(
        SubmitRejection::ValueNotConserved("ValueNotConservedUTxO".into()),
    ))]);

    let row = h
        .ctx
        .store
        .create_transaction(&h.wallet_id, None, &[coin_output(&destination(), 2_000_000)], &[])
        .unwrap();

    let outcome = job::process_job(&h.ctx, &row.id).await;
    assert_eq!(
        outcome,
        JobOutcome::Retry {
            refresh_address: Some(h.address.clone())
        }
    );
}

#[tokio::test]
async fn dust_change_is_folded_into_the_fee() {
    let h = harness(MockProvider::new().with_min_coin());
    h.ctx.cache.put(&h.address, vec![coin_utxo(1, 2_200_000)]);

    let row = h
        .ctx
        .store
        .create_transaction(&h.wallet_id, None, &[coin_output(&destination(), 2_000_000)], &[])
        .unwrap();

    let outcome = job::process_job(&h.ctx, &row.id).await;
    assert_eq!(outcome, JobOutcome::Submitted);

    // 30_000 of would-be change is below the output minimum, so it rides
    // in the fee instead of creating a dust output.
    let job_row = h.ctx.store.transaction(&row.id).unwrap().unwrap().row;
    assert_eq!(job_row.fee, Some(200_000));
    let cached = h.ctx.cache.get(&h.address).unwrap();
    assert!(cached.is_empty(), "no change output should have been cached");
}

#[tokio::test]
async fn asset_output_coin_is_raised_to_the_minimum() {
    let h = harness(MockProvider::new().with_min_coin());
    let keys = &h.ctx.keys;
    let policy = keys.generate_policy(None).unwrap();
    h.ctx
        .store
        .create_policy("brand", &policy.policy_id, &policy.sealed_key_hex, None)
        .unwrap();

    // Wallet already holds the asset; it only sends, no minting.
    let unit = Unit::asset(&policy.policy_id, "Tok").unwrap();
    let mut holding = Value::from_coin(5_000_000);
    holding.add_unit(unit.clone(), 10).unwrap();
    h.ctx.cache.put(
        &h.address,
        vec![UnspentOutput::new("aa".repeat(32), 0, holding)],
    );

    // Requested with zero coin: the engine must raise it transparently.
    let row = h
        .ctx
        .store
        .create_transaction(
            &h.wallet_id,
            None,
            &[NewOutput {
                address: destination(),
                datum: None,
                assets: vec![
                    NewOutputAsset {
                        unit: "lovelace".into(),
                        quantity: "0".into(),
                    },
                    NewOutputAsset {
                        unit: unit.to_string(),
                        quantity: "1".into(),
                    },
                ],
            }],
            &[],
        )
        .unwrap();

    let outcome = job::process_job(&h.ctx, &row.id).await;
    assert_eq!(outcome, JobOutcome::Submitted);

    let cached = h.ctx.cache.get(&h.address).unwrap();
    assert_eq!(cached.len(), 1);
    let change = &cached[0].value;
    assert_eq!(change.quantity(&unit), 9);
    // Change = 5_000_000 − raised minimum − fee; the minimum is nonzero.
    assert!(change.coin < 5_000_000 - 170_000);
    assert!(change.coin > 3_000_000);
}

#[tokio::test]
async fn mint_produces_assets_and_attaches_policy_witness() {
    let h = harness(MockProvider::new().with_min_coin());
    let policy = h.ctx.keys.generate_policy(Some(500_000_000)).unwrap();
    h.ctx
        .store
        .create_policy(
            "drop",
            &policy.policy_id,
            &policy.sealed_key_hex,
            Some(500_000_000),
        )
        .unwrap();

    h.ctx.cache.put(&h.address, vec![coin_utxo(1, 10_000_000)]);

    let unit = Unit::asset(&policy.policy_id, "X").unwrap();
    let row = h
        .ctx
        .store
        .create_transaction(
            &h.wallet_id,
            None,
            // Mint straight into the wallet's own address.
            &[NewOutput {
                address: h.address.clone(),
                datum: None,
                assets: vec![
                    NewOutputAsset {
                        unit: "lovelace".into(),
                        quantity: "1500000".into(),
                    },
                    NewOutputAsset {
                        unit: unit.to_string(),
                        quantity: "2".into(),
                    },
                ],
            }],
            &[NewMint {
                policy_id: policy.policy_id.clone(),
                asset_name: "X".into(),
                quantity: 2,
            }],
        )
        .unwrap();

    let outcome = job::process_job(&h.ctx, &row.id).await;
    assert_eq!(outcome, JobOutcome::Submitted);

    // Both the minted output and the change return to the wallet.
    let cached = h.ctx.cache.get(&h.address).unwrap();
    assert_eq!(cached.len(), 2);
    let minted_total: u64 = cached.iter().map(|o| o.value.quantity(&unit)).sum();
    assert_eq!(minted_total, 2);
}

#[tokio::test]
async fn top_up_consumes_next_largest_coin_output() {
    let h = harness(MockProvider::new().with_min_coin());
    let policy = h.ctx.keys.generate_policy(None).unwrap();
    h.ctx
        .store
        .create_policy("brand", &policy.policy_id, &policy.sealed_key_hex, None)
        .unwrap();

    let unit = Unit::asset(&policy.policy_id, "Tok").unwrap();
    let mut asset_holding = Value::from_coin(1_500_000);
    asset_holding.add_unit(unit.clone(), 10).unwrap();
    h.ctx.cache.put(
        &h.address,
        vec![
            UnspentOutput::new("aa".repeat(32), 0, asset_holding),
            coin_utxo(0xbb, 5_000_000),
        ],
    );

    // Sending one token: the asset-bearing input barely covers the raised
    // output, leaving asset change below its own minimum, which forces the
    // single top-up.
    let row = h
        .ctx
        .store
        .create_transaction(
            &h.wallet_id,
            None,
            &[NewOutput {
                address: destination(),
                datum: None,
                assets: vec![
                    NewOutputAsset {
                        unit: "lovelace".into(),
                        quantity: "0".into(),
                    },
                    NewOutputAsset {
                        unit: unit.to_string(),
                        quantity: "1".into(),
                    },
                ],
            }],
            &[],
        )
        .unwrap();

    let outcome = job::process_job(&h.ctx, &row.id).await;
    assert_eq!(outcome, JobOutcome::Submitted);

    // Both inputs consumed; one change output carries the 9 leftover
    // tokens plus the topped-up coin.
    let cached = h.ctx.cache.get(&h.address).unwrap();
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].value.quantity(&unit), 9);
    assert!(cached[0].value.coin > 4_000_000);
    assert_eq!(h.ctx.provider.submissions(), 1);
}

#[tokio::test]
async fn non_queued_jobs_are_skipped() {
    let h = harness(MockProvider::new());
    h.ctx.cache.put(&h.address, vec![coin_utxo(1, 10_000_000)]);
    let row = h
        .ctx
        .store
        .create_transaction(&h.wallet_id, None, &[coin_output(&destination(), 2_000_000)], &[])
        .unwrap();
    h.ctx
        .store
        .mark_submitted(&row.id, ACCEPT_HASH, 170_000, 300)
        .unwrap();

    let outcome = job::process_job(&h.ctx, &row.id).await;
    assert_eq!(outcome, JobOutcome::Skipped);
    assert_eq!(h.ctx.provider.submissions(), 0);
}

// ─── Worker pool ────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn back_to_back_jobs_for_one_wallet_serialize() {
    let h = harness(MockProvider::new());
    h.ctx.cache.put(&h.address, vec![coin_utxo(1, 10_000_000)]);

    let pool = WorkerPool::new(h.ctx.clone());
    let first = h
        .ctx
        .store
        .create_transaction(&h.wallet_id, None, &[coin_output(&destination(), 2_000_000)], &[])
        .unwrap();
    let second = h
        .ctx
        .store
        .create_transaction(&h.wallet_id, None, &[coin_output(&destination(), 3_000_000)], &[])
        .unwrap();

    pool.enqueue(&first.id).unwrap();
    pool.enqueue(&second.id).unwrap();

    // Wait for both to reach a terminal-for-the-engine state.
    for _ in 0..200 {
        let a = h.ctx.store.transaction(&first.id).unwrap().unwrap().row;
        let b = h.ctx.store.transaction(&second.id).unwrap().unwrap().row;
        if a.status == TxStatus::Submitted && b.status == TxStatus::Submitted {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let a = h.ctx.store.transaction(&first.id).unwrap().unwrap().row;
    let b = h.ctx.store.transaction(&second.id).unwrap().unwrap().row;
    assert_eq!(a.status, TxStatus::Submitted);
    assert_eq!(b.status, TxStatus::Submitted);
    assert_eq!(h.ctx.provider.submissions(), 2);

    // The second build only ever saw the first build's committed cache:
    // one change output remains, reduced by both payments and both fees.
    let cached = h.ctx.cache.get(&h.address).unwrap();
    assert_eq!(cached.len(), 1);
    assert_eq!(
        cached[0].value.coin,
        10_000_000 - 2_000_000 - 3_000_000 - 2 * 170_000
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn worker_start_is_idempotent() {
    let h = harness(MockProvider::new());
    let pool = WorkerPool::new(h.ctx.clone());

    assert!(!pool.is_worker_alive(&h.wallet_id));
    assert!(pool.start_worker(&h.wallet_id));
    assert!(pool.is_worker_alive(&h.wallet_id));
    // A live worker is never duplicated.
    assert!(!pool.start_worker(&h.wallet_id));
    assert!(pool.is_worker_alive(&h.wallet_id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_all_and_recovery_enqueue_known_work() {
    let h = harness(MockProvider::new());
    h.ctx.cache.put(&h.address, vec![coin_utxo(1, 10_000_000)]);
    let row = h
        .ctx
        .store
        .create_transaction(&h.wallet_id, None, &[coin_output(&destination(), 2_000_000)], &[])
        .unwrap();

    let pool = WorkerPool::new(h.ctx.clone());
    assert_eq!(pool.start_all().unwrap(), 1);
    assert_eq!(pool.recover_queued().unwrap(), 1);

    for _ in 0..200 {
        let status = h.ctx.store.transaction(&row.id).unwrap().unwrap().row.status;
        if status == TxStatus::Submitted {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(
        h.ctx.store.transaction(&row.id).unwrap().unwrap().row.status,
        TxStatus::Submitted
    );
}

#[tokio::test]
async fn metadata_rides_along_when_labels_are_integers() {
    let h = harness(MockProvider::new());
    h.ctx.cache.put(&h.address, vec![coin_utxo(1, 10_000_000)]);

    let metadata = serde_json::json!({"674": {"msg": "invoice 42"}});
    let row = h
        .ctx
        .store
        .create_transaction(
            &h.wallet_id,
            Some(&metadata),
            &[coin_output(&destination(), 2_000_000)],
            &[],
        )
        .unwrap();

    let outcome = job::process_job(&h.ctx, &row.id).await;
    assert_eq!(outcome, JobOutcome::Submitted);
}

#[tokio::test]
async fn malformed_metadata_label_is_terminal() {
    let h = harness(MockProvider::new());
    h.ctx.cache.put(&h.address, vec![coin_utxo(1, 10_000_000)]);

    let metadata = serde_json::json!({"not-a-label": 1});
    let row = h
        .ctx
        .store
        .create_transaction(
            &h.wallet_id,
            Some(&metadata),
            &[coin_output(&destination(), 2_000_000)],
            &[],
        )
        .unwrap();

    let outcome = job::process_job(&h.ctx, &row.id).await;
    assert_eq!(outcome, JobOutcome::Failed);
    assert_eq!(h.ctx.provider.submissions(), 0);
}
