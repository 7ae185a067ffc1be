//! Transaction assembly and fee iteration.
//!
//! The assembler turns a persisted job into a signed, submittable
//! transaction: it derives the selection requirement (minimum-coin raises
//! included), selects inputs, drafts the transaction with a worst-case fee
//! and zero-filled witnesses of the correct length, asks the provider for
//! the fee implied by the draft's size, then rebuilds with the exact fee
//! and change and signs for real. A negative final coin balance triggers
//! one bounded top-up before the job fails with `InsufficientBalance`.

use crate::error::EngineError;
use crate::provider::Provider;
use crate::select::{self, Selection};
use egret_keys::{KeyStore, Signer};
use egret_store::{Store, TransactionJob, WalletRow};
use egret_tx::metadata::metadata_hash;
use egret_tx::{
    Mint, NativeScript, Transaction, TransactionBody, TransactionInput, TransactionOutput,
    VKeyWitness, WitnessSet,
};
use egret_types::{Unit, UnspentOutput, Value};
use std::collections::BTreeMap;

/// A signed transaction ready for submission, plus the bookkeeping the
/// submission step needs.
#[derive(Debug)]
pub struct BuiltTransaction {
    pub tx_bytes: Vec<u8>,
    pub tx_hash: String,
    pub fee: u64,
    pub size: usize,
    /// Identifiers of the consumed unspent outputs.
    pub consumed_ids: Vec<String>,
    /// Final outputs landing back at the wallet's own address, by index.
    pub own_outputs: Vec<(u32, Value)>,
}

enum FinalizeOutcome {
    Done(Box<BuiltTransaction>),
    /// Final coin balance went negative by this many lovelace.
    NeedCoin(u64),
}

pub struct Assembler<'a, P: Provider + ?Sized> {
    provider: &'a P,
    store: &'a Store,
    keys: &'a KeyStore,
}

impl<'a, P: Provider + ?Sized> Assembler<'a, P> {
    pub fn new(provider: &'a P, store: &'a Store, keys: &'a KeyStore) -> Self {
        Assembler {
            provider,
            store,
            keys,
        }
    }

    /// Build and sign the job's transaction, consuming inputs from
    /// `available` (the working copy of the wallet's cache entry).
    pub async fn build(
        &self,
        wallet: &WalletRow,
        job: &TransactionJob,
        available: &mut Vec<UnspentOutput>,
    ) -> Result<BuiltTransaction, EngineError> {
        let mut outputs = parse_outputs(job)?;
        let (mint, scripts, policy_signers, ttl) = self.resolve_mint(job)?;
        let metadata = parse_metadata(job)?;
        let wallet_signer = self.keys.signer_for(&wallet.sealed_key)?;

        // Raise asset-bearing outputs to the ledger minimum before the
        // requirement is derived, so the shortfall enters selection
        // transparently instead of being discovered at submission.
        for output in &mut outputs {
            if output.value.assets.is_empty() {
                continue;
            }
            loop {
                let size = output.encoded_size()?;
                let min = self.provider.min_coin_for_size(size).await?;
                if output.value.coin >= min {
                    break;
                }
                log::info!(
                    "raising output coin {} -> {} to meet the minimum for {}",
                    output.value.coin,
                    min,
                    output.address
                );
                output.value.coin = min;
            }
        }

        let required = self.derive_requirement(&outputs, &mint).await?;
        let mut selection = select::select_inputs(available, &required)
            .map_err(|unmet| EngineError::InsufficientBalance(describe_shortfall(&unmet)))?;
        log::debug!(
            "selected {} inputs totalling {} lovelace",
            selection.inputs.len(),
            selection.total.coin
        );

        let mut topped_up = false;
        loop {
            let outcome = self
                .finalize(
                    wallet,
                    &selection,
                    &outputs,
                    &mint,
                    &scripts,
                    &policy_signers,
                    &wallet_signer,
                    ttl,
                    &metadata,
                )
                .await?;
            match outcome {
                FinalizeOutcome::Done(built) => return Ok(*built),
                FinalizeOutcome::NeedCoin(shortfall) => {
                    if topped_up {
                        return Err(EngineError::InsufficientBalance(format!(
                            "{shortfall} lovelace short after top-up"
                        )));
                    }
                    topped_up = true;
                    match select::take_largest_coin_only(available) {
                        Some(extra) => {
                            log::info!(
                                "topping up with {} ({} lovelace)",
                                extra.id(),
                                extra.value.coin
                            );
                            selection
                                .total
                                .add(&extra.value)
                                .map_err(|e| EngineError::InvalidJob(e.to_string()))?;
                            selection.inputs.push(extra);
                        }
                        None => {
                            return Err(EngineError::InsufficientBalance(format!(
                                "{shortfall} lovelace short, no coin-only output left"
                            )));
                        }
                    }
                }
            }
        }
    }

    /// Load the job's minting policies, their scripts and signers, and the
    /// validity bound implied by any time locks. Missing policies abort the
    /// job before any ledger call.
    fn resolve_mint(
        &self,
        job: &TransactionJob,
    ) -> Result<(Mint, Vec<NativeScript>, Vec<Signer>, Option<u64>), EngineError> {
        let mut mint = Mint::new();
        let mut scripts = Vec::new();
        let mut signers = Vec::new();
        let mut seen = Vec::new();
        let mut ttl = None;

        for declaration in &job.mints {
            let policy = self
                .store
                .policy_by_policy_id(&declaration.policy_id)?
                .ok_or_else(|| EngineError::PolicyNotFound(declaration.policy_id.clone()))?;

            mint.add(
                &declaration.policy_id,
                &declaration.asset_name,
                declaration.quantity,
            )?;

            if seen.contains(&policy.policy_id) {
                continue;
            }
            seen.push(policy.policy_id.clone());

            let signer = self.keys.signer_for(&policy.sealed_key)?;
            let locking_slot = policy.locking_slot.map(|s| s as u64);
            let script = NativeScript::policy(signer.verification_key_hash(), locking_slot);
            if script.policy_id() != policy.policy_id {
                return Err(EngineError::InvalidJob(format!(
                    "policy {} key material does not reproduce its script",
                    policy.policy_id
                )));
            }
            if let Some(slot) = locking_slot {
                ttl = Some(ttl.map_or(slot, |t: u64| t.min(slot)));
            }
            scripts.push(script);
            signers.push(signer);
        }

        Ok((mint, scripts, signers, ttl))
    }

    /// Requirement = outputs + worst-case fee + burns − mints.
    async fn derive_requirement(
        &self,
        outputs: &[TransactionOutput],
        mint: &Mint,
    ) -> Result<Value, EngineError> {
        let mut required = Value::default();
        for output in outputs {
            required
                .add(&output.value)
                .map_err(|e| EngineError::InvalidJob(e.to_string()))?;
        }
        let ceiling = self.provider.fee_ceiling().await?;
        required
            .add_unit(Unit::Coin, ceiling)
            .map_err(|e| EngineError::InvalidJob(e.to_string()))?;

        // Minted assets are supplied by the mint, not consumed from inputs;
        // burns must come from inputs.
        for (unit, qty) in &mint.minted().assets {
            required.saturating_sub_unit(unit, *qty);
        }
        required
            .add(&mint.burned())
            .map_err(|e| EngineError::InvalidJob(e.to_string()))?;
        Ok(required)
    }

    #[allow(clippy::too_many_arguments)]
    async fn finalize(
        &self,
        wallet: &WalletRow,
        selection: &Selection,
        outputs: &[TransactionOutput],
        mint: &Mint,
        scripts: &[NativeScript],
        policy_signers: &[Signer],
        wallet_signer: &Signer,
        ttl: Option<u64>,
        metadata: &Option<BTreeMap<u64, serde_json::Value>>,
    ) -> Result<FinalizeOutcome, EngineError> {
        let inputs: Vec<TransactionInput> = selection
            .inputs
            .iter()
            .map(|o| TransactionInput::from_hex(&o.tx_hash, o.index))
            .collect::<Result<_, _>>()?;
        let aux_data_hash = match metadata {
            Some(md) => Some(metadata_hash(md)?),
            None => None,
        };

        // What the inputs plus the mint put on the table.
        let mut pot = selection.total.clone();
        pot.add(&mint.minted())
            .map_err(|e| EngineError::InvalidJob(e.to_string()))?;

        let mut outputs_sum = Value::default();
        for output in outputs {
            outputs_sum
                .add(&output.value)
                .map_err(|e| EngineError::InvalidJob(e.to_string()))?;
        }

        let change_assets = change_assets(&pot, &outputs_sum, &mint.burned())?;

        // Draft: worst-case fee, zero-filled witnesses of the real length,
        // change output included so the size estimate is conservative.
        let fee_ceiling = self.provider.fee_ceiling().await?;
        let draft_change_coin = pot
            .coin
            .saturating_sub(outputs_sum.coin.saturating_add(fee_ceiling));
        let mut draft_outputs = outputs.to_vec();
        draft_outputs.push(TransactionOutput::new(
            wallet.address.clone(),
            Value {
                coin: draft_change_coin,
                assets: change_assets.clone(),
            },
        ));

        let signer_count = 1 + policy_signers.len();
        let draft = Transaction {
            body: TransactionBody {
                inputs: inputs.clone(),
                outputs: draft_outputs,
                fee: fee_ceiling,
                ttl,
                mint: mint.clone(),
                aux_data_hash,
            },
            witness_set: WitnessSet {
                vkey_witnesses: vec![VKeyWitness::placeholder(); signer_count],
                native_scripts: scripts.to_vec(),
            },
            metadata: metadata.clone(),
        };
        let draft_size = draft.to_bytes()?.len();
        let fee = self.provider.fee_for_size(draft_size).await?;
        log::debug!("draft size {draft_size} bytes, fee {fee}");

        // Exact change at the real fee.
        let balance =
            pot.coin as i128 - outputs_sum.coin as i128 - fee as i128;
        if balance < 0 {
            return Ok(FinalizeOutcome::NeedCoin((-balance) as u64));
        }
        let change_coin = balance as u64;

        let mut final_fee = fee;
        let mut final_outputs = outputs.to_vec();
        if !change_assets.is_empty() {
            let change = TransactionOutput::new(
                wallet.address.clone(),
                Value {
                    coin: change_coin,
                    assets: change_assets.clone(),
                },
            );
            let min = self.provider.min_coin_for_size(change.encoded_size()?).await?;
            if change_coin < min {
                // Asset change cannot be folded away; it needs more coin.
                return Ok(FinalizeOutcome::NeedCoin(min - change_coin));
            }
            final_outputs.push(change);
        } else if change_coin > 0 {
            let change = TransactionOutput::new(
                wallet.address.clone(),
                Value::from_coin(change_coin),
            );
            let min = self.provider.min_coin_for_size(change.encoded_size()?).await?;
            if change_coin < min {
                log::info!("folding dust change {change_coin} into the fee");
                final_fee += change_coin;
            } else {
                final_outputs.push(change);
            }
        }

        let body = TransactionBody {
            inputs,
            outputs: final_outputs.clone(),
            fee: final_fee,
            ttl,
            mint: mint.clone(),
            aux_data_hash,
        };
        let body_hash = body.hash()?;

        let mut witnesses = vec![wallet_signer.witness(&body_hash)];
        for signer in policy_signers {
            witnesses.push(signer.witness(&body_hash));
        }
        for witness in &witnesses {
            witness.verify(&body_hash)?;
        }

        let tx = Transaction {
            body,
            witness_set: WitnessSet {
                vkey_witnesses: witnesses,
                native_scripts: scripts.to_vec(),
            },
            metadata: metadata.clone(),
        };
        let tx_bytes = tx.to_bytes()?;
        let tx_hash = tx.hash_hex()?;

        verify_conservation(&selection.total, mint, &final_outputs, final_fee)?;

        let own_outputs = final_outputs
            .iter()
            .enumerate()
            .filter(|(_, o)| o.address == wallet.address)
            .map(|(i, o)| (i as u32, o.value.clone()))
            .collect();

        Ok(FinalizeOutcome::Done(Box::new(BuiltTransaction {
            size: tx_bytes.len(),
            tx_bytes,
            tx_hash,
            fee: final_fee,
            consumed_ids: selection.inputs.iter().map(|o| o.id()).collect(),
            own_outputs,
        })))
    }
}

/// Assets left over once requested outputs and burns are taken from the
/// pot. A negative remainder means selection under-covered, which the
/// requirement derivation rules out.
fn change_assets(
    pot: &Value,
    outputs_sum: &Value,
    burned: &Value,
) -> Result<BTreeMap<Unit, u64>, EngineError> {
    let mut change = BTreeMap::new();
    for (unit, have) in &pot.assets {
        let spent = outputs_sum
            .quantity(unit)
            .checked_add(burned.quantity(unit))
            .ok_or_else(|| EngineError::InvalidJob(format!("overflow on {unit}")))?;
        match have.checked_sub(spent) {
            Some(0) => {}
            Some(left) => {
                change.insert(unit.clone(), left);
            }
            None => {
                return Err(EngineError::ConservationViolated(format!(
                    "inputs supply {have} of {unit}, job spends {spent}"
                )));
            }
        }
    }
    Ok(change)
}

/// Per-unit value conservation: inputs + mint == outputs + burn + fee.
fn verify_conservation(
    inputs_total: &Value,
    mint: &Mint,
    outputs: &[TransactionOutput],
    fee: u64,
) -> Result<(), EngineError> {
    let mut produced = Value::from_coin(fee);
    for output in outputs {
        produced
            .add(&output.value)
            .map_err(|e| EngineError::InvalidJob(e.to_string()))?;
    }
    produced
        .add(&mint.burned())
        .map_err(|e| EngineError::InvalidJob(e.to_string()))?;

    let mut supplied = inputs_total.clone();
    supplied
        .add(&mint.minted())
        .map_err(|e| EngineError::InvalidJob(e.to_string()))?;

    if supplied != produced {
        return Err(EngineError::ConservationViolated(format!(
            "supplied {supplied:?} != produced {produced:?}"
        )));
    }
    Ok(())
}

fn parse_outputs(job: &TransactionJob) -> Result<Vec<TransactionOutput>, EngineError> {
    let mut outputs = Vec::with_capacity(job.outputs.len());
    for record in &job.outputs {
        let mut value = Value::default();
        for (unit_text, quantity_text) in &record.assets {
            let unit: Unit = unit_text
                .parse()
                .map_err(|e| EngineError::InvalidJob(format!("unit {unit_text}: {e}")))?;
            let quantity: u64 = quantity_text.parse().map_err(|_| {
                EngineError::InvalidJob(format!("quantity {quantity_text} for {unit_text}"))
            })?;
            value
                .add_unit(unit, quantity)
                .map_err(|e| EngineError::InvalidJob(e.to_string()))?;
        }
        let mut output = TransactionOutput::new(record.address.clone(), value);
        if let Some(datum) = &record.datum {
            output = output.with_datum(datum.clone());
        }
        outputs.push(output);
    }
    if outputs.is_empty() {
        return Err(EngineError::InvalidJob("no outputs requested".into()));
    }
    Ok(outputs)
}

fn parse_metadata(
    job: &TransactionJob,
) -> Result<Option<BTreeMap<u64, serde_json::Value>>, EngineError> {
    let Some(raw) = &job.row.metadata else {
        return Ok(None);
    };
    let object = raw
        .as_object()
        .ok_or_else(|| EngineError::InvalidJob("metadata must be a label map".into()))?;
    let mut out = BTreeMap::new();
    for (label_text, value) in object {
        let label: u64 = label_text
            .parse()
            .map_err(|_| EngineError::InvalidJob(format!("metadata label {label_text}")))?;
        out.insert(label, value.clone());
    }
    Ok(Some(out))
}

fn describe_shortfall(unmet: &Value) -> String {
    let mut parts = Vec::new();
    if unmet.coin > 0 {
        parts.push(format!("{} lovelace", unmet.coin));
    }
    for (unit, qty) in &unmet.assets {
        parts.push(format!("{qty} of {unit}"));
    }
    format!("short {}", parts.join(", "))
}
