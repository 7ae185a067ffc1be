//! Transaction structures and their canonical encoding.
//!
//! A transaction is `[body, witness_set, validity flag, auxiliary data]`.
//! The body is a keyed map; the transaction hash is the blake2b-256 of the
//! encoded body and is what witnesses sign.

use crate::cbor::Writer;
use crate::hashing::blake2b_256;
use crate::metadata;
use crate::script::NativeScript;
use crate::TxError;
use egret_types::{address, Unit, Value};
use std::collections::BTreeMap;

// Body map keys.
const KEY_INPUTS: u64 = 0;
const KEY_OUTPUTS: u64 = 1;
const KEY_FEE: u64 = 2;
const KEY_TTL: u64 = 3;
const KEY_AUX_HASH: u64 = 7;
const KEY_MINT: u64 = 9;

// Output map keys.
const KEY_OUT_ADDRESS: u64 = 0;
const KEY_OUT_VALUE: u64 = 1;
const KEY_OUT_DATUM: u64 = 2;

// Witness set map keys.
const KEY_WIT_VKEYS: u64 = 0;
const KEY_WIT_SCRIPTS: u64 = 1;

/// Reference to an unspent output being consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionInput {
    pub tx_hash: [u8; 32],
    pub index: u32,
}

impl TransactionInput {
    pub fn from_hex(tx_hash: &str, index: u32) -> Result<Self, TxError> {
        let raw = hex::decode(tx_hash).map_err(|_| TxError::InvalidHash(tx_hash.into()))?;
        let tx_hash: [u8; 32] = raw
            .try_into()
            .map_err(|_| TxError::InvalidHash(tx_hash.into()))?;
        Ok(TransactionInput { tx_hash, index })
    }

    fn encode(&self, w: &mut Writer) {
        w.array(2);
        w.bytes(&self.tx_hash);
        w.uint(self.index as u64);
    }
}

/// A produced output: destination, value bundle, optional inline datum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOutput {
    pub address: String,
    pub value: Value,
    pub datum: Option<serde_json::Value>,
}

impl TransactionOutput {
    pub fn new(address: impl Into<String>, value: Value) -> Self {
        TransactionOutput {
            address: address.into(),
            value,
            datum: None,
        }
    }

    pub fn with_datum(mut self, datum: serde_json::Value) -> Self {
        self.datum = Some(datum);
        self
    }

    fn encode(&self, w: &mut Writer) -> Result<(), TxError> {
        let payload = address::decode(&self.address)?;
        let entries = 2 + usize::from(self.datum.is_some());
        w.map(entries);
        w.uint(KEY_OUT_ADDRESS);
        w.bytes(&payload);
        w.uint(KEY_OUT_VALUE);
        encode_value(w, &self.value);
        if let Some(datum) = &self.datum {
            w.uint(KEY_OUT_DATUM);
            let inner = metadata::encode_metadata(&BTreeMap::from([(0u64, datum.clone())]))?;
            // Datum payload is committed as an opaque byte string.
            w.bytes(&inner);
        }
        Ok(())
    }

    /// Serialized size in bytes, the input to the minimum-coin rule.
    pub fn encoded_size(&self) -> Result<usize, TxError> {
        let mut w = Writer::new();
        self.encode(&mut w)?;
        Ok(w.len())
    }
}

/// Coin alone encodes as an integer; with assets, as
/// `[coin, {policy: {name: qty}}]`.
fn encode_value(w: &mut Writer, value: &Value) {
    if value.assets.is_empty() {
        w.uint(value.coin);
        return;
    }
    let grouped = group_assets(&value.assets);
    w.array(2);
    w.uint(value.coin);
    w.map(grouped.len());
    for (policy, names) in grouped {
        w.bytes(&policy);
        w.map(names.len());
        for (name, qty) in names {
            w.bytes(&name);
            w.uint(qty);
        }
    }
}

fn group_assets(assets: &BTreeMap<Unit, u64>) -> BTreeMap<Vec<u8>, BTreeMap<Vec<u8>, u64>> {
    let mut grouped: BTreeMap<Vec<u8>, BTreeMap<Vec<u8>, u64>> = BTreeMap::new();
    for (unit, qty) in assets {
        if let Unit::Asset {
            policy_id,
            asset_name,
        } = unit
        {
            let policy = hex::decode(policy_id).unwrap_or_default();
            grouped
                .entry(policy)
                .or_default()
                .insert(asset_name.as_bytes().to_vec(), *qty);
        }
    }
    grouped
}

/// Signed mint/burn declarations grouped by policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mint {
    entries: BTreeMap<String, BTreeMap<String, i64>>,
}

impl Mint {
    pub fn new() -> Self {
        Mint::default()
    }

    /// Record a mint (positive) or burn (negative) quantity.
    pub fn add(&mut self, policy_id: &str, asset_name: &str, quantity: i64) -> Result<(), TxError> {
        if quantity == 0 {
            return Err(TxError::ZeroMint(policy_id.into(), asset_name.into()));
        }
        let names = self.entries.entry(policy_id.to_string()).or_default();
        let entry = names.entry(asset_name.to_string()).or_insert(0);
        *entry += quantity;
        if *entry == 0 {
            names.remove(asset_name);
        }
        let policy_empty = names.is_empty();
        if policy_empty {
            self.entries.remove(policy_id);
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct policy ids referenced.
    pub fn policies(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Positive (minted) quantities as a value bundle.
    pub fn minted(&self) -> Value {
        self.signed_part(true)
    }

    /// Absolute negative (burned) quantities as a value bundle.
    pub fn burned(&self) -> Value {
        self.signed_part(false)
    }

    fn signed_part(&self, positive: bool) -> Value {
        let mut out = Value::default();
        for (policy, names) in &self.entries {
            for (name, qty) in names {
                let q = if positive { *qty } else { -*qty };
                if q > 0 {
                    if let Ok(unit) = Unit::asset(policy, name) {
                        // Overflow impossible: quantities merge from i64.
                        let _ = out.add_unit(unit, q as u64);
                    }
                }
            }
        }
        out
    }

    fn encode(&self, w: &mut Writer) {
        w.map(self.entries.len());
        for (policy, names) in &self.entries {
            w.bytes(&hex::decode(policy).unwrap_or_default());
            w.map(names.len());
            for (name, qty) in names {
                w.bytes(name.as_bytes());
                w.int(*qty);
            }
        }
    }
}

/// The signable transaction body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionBody {
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub fee: u64,
    pub ttl: Option<u64>,
    pub mint: Mint,
    pub aux_data_hash: Option<[u8; 32]>,
}

impl TransactionBody {
    pub fn encode(&self, w: &mut Writer) -> Result<(), TxError> {
        let entries = 3
            + usize::from(self.ttl.is_some())
            + usize::from(self.aux_data_hash.is_some())
            + usize::from(!self.mint.is_empty());
        w.map(entries);
        w.uint(KEY_INPUTS);
        w.array(self.inputs.len());
        for input in &self.inputs {
            input.encode(w);
        }
        w.uint(KEY_OUTPUTS);
        w.array(self.outputs.len());
        for output in &self.outputs {
            output.encode(w)?;
        }
        w.uint(KEY_FEE);
        w.uint(self.fee);
        if let Some(ttl) = self.ttl {
            w.uint(KEY_TTL);
            w.uint(ttl);
        }
        if let Some(hash) = &self.aux_data_hash {
            w.uint(KEY_AUX_HASH);
            w.bytes(hash);
        }
        if !self.mint.is_empty() {
            w.uint(KEY_MINT);
            self.mint.encode(w);
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, TxError> {
        let mut w = Writer::new();
        self.encode(&mut w)?;
        Ok(w.into_bytes())
    }

    /// The transaction hash: blake2b-256 of the encoded body. This is what
    /// every witness signs.
    pub fn hash(&self) -> Result<[u8; 32], TxError> {
        Ok(blake2b_256(&self.to_bytes()?))
    }
}

/// A verification-key witness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VKeyWitness {
    pub vkey: [u8; 32],
    pub signature: [u8; 64],
}

impl VKeyWitness {
    /// Zero-filled witness of the correct byte length, used for fee-sizing
    /// drafts.
    pub fn placeholder() -> Self {
        VKeyWitness {
            vkey: [0u8; 32],
            signature: [0u8; 64],
        }
    }

    /// Verify this witness against the signed message.
    pub fn verify(&self, message: &[u8]) -> Result<(), TxError> {
        use ed25519_dalek::{Signature, Verifier, VerifyingKey};
        let vkey = VerifyingKey::from_bytes(&self.vkey)
            .map_err(|e| TxError::InvalidKey(e.to_string()))?;
        let signature = Signature::from_bytes(&self.signature);
        vkey.verify(message, &signature)
            .map_err(|_| TxError::WitnessInvalid(hex::encode(self.vkey)))
    }

    fn encode(&self, w: &mut Writer) {
        w.array(2);
        w.bytes(&self.vkey);
        w.bytes(&self.signature);
    }
}

/// Witness set: key witnesses plus any native scripts they satisfy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WitnessSet {
    pub vkey_witnesses: Vec<VKeyWitness>,
    pub native_scripts: Vec<NativeScript>,
}

impl WitnessSet {
    fn encode(&self, w: &mut Writer) {
        let entries =
            usize::from(!self.vkey_witnesses.is_empty()) + usize::from(!self.native_scripts.is_empty());
        w.map(entries);
        if !self.vkey_witnesses.is_empty() {
            w.uint(KEY_WIT_VKEYS);
            w.array(self.vkey_witnesses.len());
            for wit in &self.vkey_witnesses {
                wit.encode(w);
            }
        }
        if !self.native_scripts.is_empty() {
            w.uint(KEY_WIT_SCRIPTS);
            w.array(self.native_scripts.len());
            for script in &self.native_scripts {
                script.encode(w);
            }
        }
    }
}

/// A complete transaction ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub body: TransactionBody,
    pub witness_set: WitnessSet,
    pub metadata: Option<BTreeMap<u64, serde_json::Value>>,
}

impl Transaction {
    pub fn to_bytes(&self) -> Result<Vec<u8>, TxError> {
        let mut w = Writer::new();
        w.array(4);
        self.body.encode(&mut w)?;
        self.witness_set.encode(&mut w);
        w.bool(true);
        match &self.metadata {
            Some(md) => w.raw(&metadata::encode_metadata(md)?),
            None => w.null(),
        }
        Ok(w.into_bytes())
    }

    /// Hex transaction hash (hash of the body).
    pub fn hash_hex(&self) -> Result<String, TxError> {
        Ok(hex::encode(self.body.hash()?))
    }
}
