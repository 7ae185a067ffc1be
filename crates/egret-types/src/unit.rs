//! Asset units.
//!
//! A unit identifies a fungible quantity on the ledger: either the native
//! coin (`lovelace`) or a policy-scoped asset written `<policy_id>.<name>`.

use crate::TypesError;
use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// String form of the native coin unit.
pub const COIN: &str = "lovelace";

/// Hex length of a policy id (blake2b-224 of the policy script).
pub const POLICY_ID_HEX_LEN: usize = 56;

/// A ledger unit: the native coin or a policy-scoped asset.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Unit {
    Coin,
    Asset { policy_id: String, asset_name: String },
}

impl Unit {
    /// Construct an asset unit, validating the policy id.
    pub fn asset(policy_id: &str, asset_name: &str) -> Result<Self, TypesError> {
        if policy_id.len() != POLICY_ID_HEX_LEN
            || !policy_id.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(TypesError::InvalidUnit(format!(
                "{policy_id}.{asset_name}"
            )));
        }
        Ok(Unit::Asset {
            policy_id: policy_id.to_ascii_lowercase(),
            asset_name: asset_name.to_string(),
        })
    }

    pub fn is_coin(&self) -> bool {
        matches!(self, Unit::Coin)
    }

    /// Policy id for asset units, `None` for coin.
    pub fn policy_id(&self) -> Option<&str> {
        match self {
            Unit::Coin => None,
            Unit::Asset { policy_id, .. } => Some(policy_id),
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Coin => f.write_str(COIN),
            Unit::Asset {
                policy_id,
                asset_name,
            } => write!(f, "{policy_id}.{asset_name}"),
        }
    }
}

impl FromStr for Unit {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, TypesError> {
        if s == COIN {
            return Ok(Unit::Coin);
        }
        let (policy_id, asset_name) = s
            .split_once('.')
            .ok_or_else(|| TypesError::InvalidUnit(s.to_string()))?;
        Unit::asset(policy_id, asset_name)
    }
}

// Units appear as JSON map keys, so they serialize as plain strings.
impl Serialize for Unit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Unit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct UnitVisitor;
        impl Visitor<'_> for UnitVisitor {
            type Value = Unit;
            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a unit string (\"lovelace\" or \"<policy>.<asset>\")")
            }
            fn visit_str<E: de::Error>(self, v: &str) -> Result<Unit, E> {
                v.parse().map_err(de::Error::custom)
            }
        }
        deserializer.deserialize_str(UnitVisitor)
    }
}
