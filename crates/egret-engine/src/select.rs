//! Coin selection.
//!
//! Builds an input set covering a per-unit requirement. Asset requirements
//! are satisfied first by consuming whole outputs that carry the unit (the
//! ledger spends outputs atomically, so everything an output holds counts
//! toward the requirement); the remaining coin requirement is covered
//! largest-first to bound transaction growth from many small inputs.

use egret_types::{Unit, UnspentOutput, Value};

/// Result of a selection pass.
#[derive(Debug)]
pub struct Selection {
    pub inputs: Vec<UnspentOutput>,
    pub total: Value,
}

/// Select inputs from `available` (the job's working copy of the cache)
/// until `required` is covered. Consumed outputs are removed from
/// `available`, so an output can never be selected twice within a job.
///
/// Returns the unmet remainder on exhaustion.
pub fn select_inputs(
    available: &mut Vec<UnspentOutput>,
    required: &Value,
) -> Result<Selection, Value> {
    let mut remaining = required.clone();
    let mut selection = Selection {
        inputs: Vec::new(),
        total: Value::default(),
    };

    // Asset requirements first: consume a covering output whole.
    let asset_units: Vec<Unit> = remaining.assets.keys().cloned().collect();
    for unit in asset_units {
        while remaining.quantity(&unit) > 0 {
            let Some(pos) = available.iter().position(|o| o.value.quantity(&unit) > 0) else {
                return Err(remaining);
            };
            consume(available, pos, &mut remaining, &mut selection);
        }
    }

    // Remaining coin: largest-first.
    while remaining.coin > 0 {
        let Some(pos) = largest_coin_index(available) else {
            return Err(remaining);
        };
        consume(available, pos, &mut remaining, &mut selection);
    }

    Ok(selection)
}

/// Take the largest coin-only output, for the bounded top-up pass.
pub fn take_largest_coin_only(available: &mut Vec<UnspentOutput>) -> Option<UnspentOutput> {
    let pos = available
        .iter()
        .enumerate()
        .filter(|(_, o)| o.is_coin_only())
        .max_by_key(|(_, o)| o.value.coin)
        .map(|(i, _)| i)?;
    Some(available.remove(pos))
}

fn largest_coin_index(available: &[UnspentOutput]) -> Option<usize> {
    available
        .iter()
        .enumerate()
        .max_by_key(|(_, o)| o.value.coin)
        .map(|(i, _)| i)
}

fn consume(
    available: &mut Vec<UnspentOutput>,
    pos: usize,
    remaining: &mut Value,
    selection: &mut Selection,
) {
    let output = available.remove(pos);
    // Everything the output supplies decrements the requirement.
    remaining.saturating_sub_unit(&Unit::Coin, output.value.coin);
    for (unit, qty) in &output.value.assets {
        remaining.saturating_sub_unit(unit, *qty);
    }
    // Selection totals never overflow u64 sums that fit the ledger.
    let _ = selection.total.add(&output.value);
    selection.inputs.push(output);
}
