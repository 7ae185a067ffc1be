//! Per-wallet worker pool.
//!
//! One queue and one worker task per wallet: jobs for a wallet are only
//! ever consumed by its own worker, in enqueue order, so no two builds can
//! race over the same balance cache entry. Workers for different wallets
//! run fully in parallel. Retried jobs are re-enqueued at the tail; a
//! worker never re-enters a job in the same call frame.

use crate::error::EngineError;
use crate::job::{self, EngineContext, JobOutcome, RETRY_REFRESH_DELAY};
use crate::provider::Provider;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

struct WorkerHandle {
    sender: mpsc::UnboundedSender<String>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    fn is_alive(&self) -> bool {
        !self.join.is_finished() && !self.sender.is_closed()
    }
}

/// Supervisor holding one worker handle per wallet.
pub struct WorkerPool<P: Provider + ?Sized + 'static> {
    ctx: EngineContext<P>,
    workers: Mutex<HashMap<String, WorkerHandle>>,
    /// Jobs currently queued or retrying, so repeated enqueues (e.g. from a
    /// polling caller) don't duplicate work.
    pending: Arc<Mutex<HashSet<String>>>,
}

impl<P: Provider + ?Sized + 'static> WorkerPool<P> {
    pub fn new(ctx: EngineContext<P>) -> Self {
        WorkerPool {
            ctx,
            workers: Mutex::new(HashMap::new()),
            pending: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Whether a live worker exists for the wallet.
    pub fn is_worker_alive(&self, wallet_id: &str) -> bool {
        self.lock_workers()
            .get(wallet_id)
            .map(WorkerHandle::is_alive)
            .unwrap_or(false)
    }

    /// Start the wallet's worker if none is alive. Idempotent: an existing
    /// live worker is left alone. Returns whether a worker was started.
    pub fn start_worker(&self, wallet_id: &str) -> bool {
        let mut workers = self.lock_workers();
        if let Some(handle) = workers.get(wallet_id) {
            if handle.is_alive() {
                return false;
            }
            log::warn!("worker for wallet {wallet_id} is gone, replacing it");
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let join = tokio::spawn(worker_loop(
            self.ctx.clone(),
            wallet_id.to_string(),
            receiver,
            sender.clone(),
            Arc::clone(&self.pending),
        ));
        workers.insert(wallet_id.to_string(), WorkerHandle { sender, join });
        log::info!("started worker for wallet {wallet_id}");
        true
    }

    /// Start a worker for every known wallet (process start).
    pub fn start_all(&self) -> Result<usize, EngineError> {
        let wallets = self.ctx.store.list_wallets()?;
        let mut started = 0;
        for wallet in wallets {
            if self.start_worker(&wallet.id) {
                started += 1;
            }
        }
        Ok(started)
    }

    /// The sole entry point for work: route a transaction to its wallet's
    /// queue, starting the worker lazily. Re-enqueueing a job that is
    /// already waiting is a no-op.
    pub fn enqueue(&self, transaction_id: &str) -> Result<(), EngineError> {
        if !self.lock_pending().insert(transaction_id.to_string()) {
            log::debug!("transaction {transaction_id} already queued, skipping");
            return Ok(());
        }

        let result = self.route(transaction_id);
        if result.is_err() {
            self.lock_pending().remove(transaction_id);
        }
        result
    }

    fn route(&self, transaction_id: &str) -> Result<(), EngineError> {
        let job = self
            .ctx
            .store
            .transaction(transaction_id)?
            .ok_or_else(|| EngineError::TransactionNotFound(transaction_id.to_string()))?;
        let wallet_id = job.row.wallet_id;

        self.start_worker(&wallet_id);
        let workers = self.lock_workers();
        let handle = workers
            .get(&wallet_id)
            .ok_or_else(|| EngineError::WalletNotFound(wallet_id.clone()))?;
        handle
            .sender
            .send(transaction_id.to_string())
            .map_err(|_| EngineError::WalletNotFound(wallet_id.clone()))?;
        log::debug!("enqueued transaction {transaction_id} for wallet {wallet_id}");
        Ok(())
    }

    /// Enqueue every persisted `queued` transaction (crash recovery at
    /// process start, and the polling pickup while running). Returns how
    /// many were newly enqueued.
    pub fn recover_queued(&self) -> Result<usize, EngineError> {
        let queued = self
            .ctx
            .store
            .transactions_with_status(egret_types::TxStatus::Queued)?;
        let mut count = 0;
        for row in queued {
            let before = self.lock_pending().contains(&row.id);
            self.enqueue(&row.id)?;
            if !before {
                count += 1;
            }
        }
        if count > 0 {
            log::info!("enqueued {count} queued transactions");
        }
        Ok(count)
    }

    fn lock_workers(&self) -> std::sync::MutexGuard<'_, HashMap<String, WorkerHandle>> {
        self.workers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// One wallet's job loop. Jobs run strictly one at a time; a retryable
/// outcome is pushed back through the worker's own sender, landing at the
/// queue tail behind already-waiting jobs.
async fn worker_loop<P: Provider + ?Sized>(
    ctx: EngineContext<P>,
    wallet_id: String,
    mut receiver: mpsc::UnboundedReceiver<String>,
    self_sender: mpsc::UnboundedSender<String>,
    pending: Arc<Mutex<HashSet<String>>>,
) {
    log::debug!("worker loop for wallet {wallet_id} running");
    while let Some(transaction_id) = receiver.recv().await {
        let outcome = job::process_job(&ctx, &transaction_id).await;
        match outcome {
            JobOutcome::Retry { refresh_address } => {
                if let Some(address) = refresh_address {
                    // Let ledger state settle, then force a refresh so the
                    // next attempt selects from fresh outputs.
                    tokio::time::sleep(RETRY_REFRESH_DELAY).await;
                    ctx.cache.invalidate(&address);
                    if let Err(e) = ctx.cache.refresh(ctx.provider.as_ref(), &address).await {
                        log::warn!("cache refresh for {address} failed: {e}");
                    }
                }
                if self_sender.send(transaction_id).is_err() {
                    break;
                }
            }
            JobOutcome::Submitted | JobOutcome::Failed | JobOutcome::Skipped => {
                pending
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&transaction_id);
            }
        }
    }
    log::debug!("worker loop for wallet {wallet_id} stopped");
}
