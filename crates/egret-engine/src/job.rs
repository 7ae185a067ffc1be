//! Job processing: the submission and retry state machine.
//!
//! One call runs a queued transaction to a terminal local outcome:
//! submitted, re-queued for retry, or failed. Every failure is caught
//! here and recorded on the persisted row before the worker moves on; a
//! job never crashes its worker.

use crate::build::Assembler;
use crate::cache::BalanceCache;
use crate::error::EngineError;
use crate::provider::Provider;
use egret_keys::KeyStore;
use egret_ledger::{LedgerError, SubmitRejection};
use egret_store::Store;
use egret_types::{TxStatus, UnspentOutput};
use std::sync::Arc;
use std::time::Duration;

/// Retry ceiling shared by every retryable failure class.
pub const MAX_RETRIES: i64 = 5;

/// Settling delay before a forced cache refresh on a stale-cache rejection.
pub const RETRY_REFRESH_DELAY: Duration = Duration::from_secs(2);

/// Shared handles every worker runs against.
pub struct EngineContext<P: Provider + ?Sized> {
    pub provider: Arc<P>,
    pub store: Arc<Store>,
    pub keys: Arc<KeyStore>,
    pub cache: Arc<BalanceCache>,
}

impl<P: Provider + ?Sized> Clone for EngineContext<P> {
    fn clone(&self) -> Self {
        EngineContext {
            provider: Arc::clone(&self.provider),
            store: Arc::clone(&self.store),
            keys: Arc::clone(&self.keys),
            cache: Arc::clone(&self.cache),
        }
    }
}

/// Local outcome of one processing attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum JobOutcome {
    Submitted,
    /// Re-enqueue at the tail. When `refresh_address` is set, the worker
    /// waits briefly, then force-refreshes that address's cache entry.
    Retry { refresh_address: Option<String> },
    Failed,
    /// Nothing to do (missing row or not in `queued`).
    Skipped,
}

/// Process one transaction job to a terminal local outcome.
pub async fn process_job<P: Provider + ?Sized>(
    ctx: &EngineContext<P>,
    transaction_id: &str,
) -> JobOutcome {
    log::info!("processing transaction {transaction_id}");
    match run(ctx, transaction_id).await {
        Ok(outcome) => outcome,
        Err(e) => dispose_failure(ctx, transaction_id, e).await,
    }
}

async fn run<P: Provider + ?Sized>(
    ctx: &EngineContext<P>,
    transaction_id: &str,
) -> Result<JobOutcome, EngineError> {
    let Some(job) = ctx.store.transaction(transaction_id)? else {
        log::warn!("transaction {transaction_id} not found, skipping");
        return Ok(JobOutcome::Skipped);
    };
    if job.row.status != TxStatus::Queued {
        log::warn!(
            "transaction {transaction_id} is {}, not queued; skipping",
            job.row.status
        );
        return Ok(JobOutcome::Skipped);
    }

    let wallet = ctx
        .store
        .wallet(&job.row.wallet_id)?
        .ok_or_else(|| EngineError::WalletNotFound(job.row.wallet_id.clone()))?;
    let address = wallet.address.clone();

    let mut available = ctx
        .cache
        .get_or_refresh(ctx.provider.as_ref(), &address)
        .await?;

    let assembler = Assembler::new(ctx.provider.as_ref(), &ctx.store, &ctx.keys);
    let built = assembler.build(&wallet, &job, &mut available).await?;

    match ctx.provider.submit(built.tx_bytes.clone()).await {
        Ok(ledger_hash) => {
            ctx.store
                .mark_submitted(transaction_id, &ledger_hash, built.fee, built.size)?;

            // Commit the working copy: consumed inputs are gone, this
            // wallet's new outputs become spendable for the next job.
            let mut committed: Vec<UnspentOutput> = available;
            for (index, value) in built.own_outputs {
                committed.push(UnspentOutput::new(ledger_hash.clone(), index, value));
            }
            ctx.cache.put(&address, committed);

            log::info!(
                "transaction {transaction_id} submitted as {ledger_hash} (fee {}, {} bytes)",
                built.fee,
                built.size
            );
            Ok(JobOutcome::Submitted)
        }
        Err(LedgerError::Rejected(rejection)) => {
            Ok(handle_rejection(ctx, transaction_id, job.row.retry_count, &address, rejection).await?)
        }
        Err(other) => Err(EngineError::Ledger(other)),
    }
}

async fn handle_rejection<P: Provider + ?Sized>(
    ctx: &EngineContext<P>,
    transaction_id: &str,
    prior_retries: i64,
    address: &str,
    rejection: SubmitRejection,
) -> Result<JobOutcome, EngineError> {
    if prior_retries >= MAX_RETRIES {
        log::error!(
            "transaction {transaction_id} exhausted {MAX_RETRIES} retries: {rejection}"
        );
        ctx.store.mark_failed(transaction_id, rejection.reason())?;
        return Ok(JobOutcome::Failed);
    }

    let retries = ctx.store.requeue(transaction_id, rejection.reason())?;
    log::warn!(
        "transaction {transaction_id} rejected ({rejection}), retry {retries}/{MAX_RETRIES}"
    );
    let refresh_address = rejection.needs_refresh().then(|| address.to_string());
    Ok(JobOutcome::Retry { refresh_address })
}

/// Record a non-rejection failure. Terminal build errors fail the row
/// immediately; everything else retries up to the shared ceiling.
async fn dispose_failure<P: Provider + ?Sized>(
    ctx: &EngineContext<P>,
    transaction_id: &str,
    error: EngineError,
) -> JobOutcome {
    let message = error.to_string();

    if error.is_terminal() {
        log::error!("transaction {transaction_id} failed: {message}");
        if let Err(e) = ctx.store.mark_failed(transaction_id, &message) {
            log::error!("failed to record failure for {transaction_id}: {e}");
        }
        return JobOutcome::Failed;
    }

    // Retryable: generic errors count against the same ceiling.
    let prior = match ctx.store.transaction(transaction_id) {
        Ok(Some(job)) => job.row.retry_count,
        _ => MAX_RETRIES,
    };
    if prior >= MAX_RETRIES {
        log::error!(
            "transaction {transaction_id} exhausted {MAX_RETRIES} retries: {message}"
        );
        if let Err(e) = ctx.store.mark_failed(transaction_id, &message) {
            log::error!("failed to record failure for {transaction_id}: {e}");
        }
        return JobOutcome::Failed;
    }
    match ctx.store.requeue(transaction_id, &message) {
        Ok(retries) => {
            log::warn!(
                "transaction {transaction_id} errored ({message}), retry {retries}/{MAX_RETRIES}"
            );
            JobOutcome::Retry {
                refresh_address: None,
            }
        }
        Err(e) => {
            log::error!("failed to requeue {transaction_id}: {e}");
            JobOutcome::Failed
        }
    }
}
