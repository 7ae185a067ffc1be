//! Multi-asset values.
//!
//! A [`Value`] is a bundle of coin plus arbitrary asset quantities. It is
//! used both for unspent-output contents and for selection requirements.
//! Zero asset entries are pruned so equality is canonical.

use crate::unit::Unit;
use crate::TypesError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Coin plus per-asset quantities. Asset map never contains the coin unit
/// or zero quantities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value {
    pub coin: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub assets: BTreeMap<Unit, u64>,
}

impl Value {
    pub fn from_coin(coin: u64) -> Self {
        Value {
            coin,
            assets: BTreeMap::new(),
        }
    }

    /// Quantity of a unit in this value.
    pub fn quantity(&self, unit: &Unit) -> u64 {
        match unit {
            Unit::Coin => self.coin,
            asset => self.assets.get(asset).copied().unwrap_or(0),
        }
    }

    /// Add a quantity of a unit, checking for overflow.
    pub fn add_unit(&mut self, unit: Unit, quantity: u64) -> Result<(), TypesError> {
        if quantity == 0 {
            return Ok(());
        }
        match unit {
            Unit::Coin => {
                self.coin = self
                    .coin
                    .checked_add(quantity)
                    .ok_or_else(|| TypesError::QuantityOverflow(Unit::Coin.to_string()))?;
            }
            asset => {
                let entry = self.assets.entry(asset.clone()).or_insert(0);
                *entry = entry
                    .checked_add(quantity)
                    .ok_or_else(|| TypesError::QuantityOverflow(asset.to_string()))?;
            }
        }
        Ok(())
    }

    /// Add another value into this one.
    pub fn add(&mut self, other: &Value) -> Result<(), TypesError> {
        self.add_unit(Unit::Coin, other.coin)?;
        for (unit, qty) in &other.assets {
            self.add_unit(unit.clone(), *qty)?;
        }
        Ok(())
    }

    /// Subtract a quantity of a unit, saturating at zero and pruning empty
    /// entries.
    pub fn saturating_sub_unit(&mut self, unit: &Unit, quantity: u64) {
        match unit {
            Unit::Coin => self.coin = self.coin.saturating_sub(quantity),
            asset => {
                if let Some(entry) = self.assets.get_mut(asset) {
                    *entry = entry.saturating_sub(quantity);
                    if *entry == 0 {
                        self.assets.remove(asset);
                    }
                }
            }
        }
    }

    /// Whether this value covers `required` in every unit.
    pub fn covers(&self, required: &Value) -> bool {
        if self.coin < required.coin {
            return false;
        }
        required
            .assets
            .iter()
            .all(|(unit, qty)| self.quantity(unit) >= *qty)
    }

    /// The per-unit shortfall of `self` against `required` (zero units
    /// omitted).
    pub fn shortfall(&self, required: &Value) -> Value {
        let mut out = Value::from_coin(required.coin.saturating_sub(self.coin));
        for (unit, qty) in &required.assets {
            let missing = qty.saturating_sub(self.quantity(unit));
            if missing > 0 {
                out.assets.insert(unit.clone(), missing);
            }
        }
        out
    }

    /// True when no unit carries a nonzero quantity.
    pub fn is_empty(&self) -> bool {
        self.coin == 0 && self.assets.is_empty()
    }

    /// Units with nonzero quantity, coin first.
    pub fn units(&self) -> Vec<Unit> {
        let mut out = Vec::with_capacity(1 + self.assets.len());
        if self.coin > 0 {
            out.push(Unit::Coin);
        }
        out.extend(self.assets.keys().cloned());
        out
    }
}
