//! Ledger address validation and payload extraction.
//!
//! Addresses are bech32 strings with an `addr` (mainnet) or `addr_test`
//! (testnet) human-readable prefix. The payload byte string is what the
//! transaction codec embeds in outputs.

use crate::TypesError;
use bech32::Hrp;

pub const MAINNET_HRP: &str = "addr";
pub const TESTNET_HRP: &str = "addr_test";

/// Ledger network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    pub fn hrp(&self) -> &'static str {
        match self {
            Network::Mainnet => MAINNET_HRP,
            Network::Testnet => TESTNET_HRP,
        }
    }

    /// Network id bits in the address header byte.
    pub fn id(&self) -> u8 {
        match self {
            Network::Mainnet => 1,
            Network::Testnet => 0,
        }
    }
}

/// Decode a payment address into its payload bytes.
///
/// Rejects non-bech32 strings and unknown prefixes.
pub fn decode(address: &str) -> Result<Vec<u8>, TypesError> {
    let (hrp, data) = bech32::decode(address)
        .map_err(|e| TypesError::InvalidAddress(format!("{address}: {e}")))?;
    let hrp = hrp.as_str();
    if hrp != MAINNET_HRP && hrp != TESTNET_HRP {
        return Err(TypesError::InvalidAddress(format!(
            "{address}: unexpected prefix {hrp}"
        )));
    }
    if data.is_empty() {
        return Err(TypesError::InvalidAddress(format!("{address}: empty payload")));
    }
    Ok(data)
}

/// Encode payload bytes as a payment address with the given prefix.
pub fn encode(hrp: &str, payload: &[u8]) -> Result<String, TypesError> {
    let hrp = Hrp::parse(hrp).map_err(|e| TypesError::InvalidAddress(e.to_string()))?;
    bech32::encode::<bech32::Bech32>(hrp, payload)
        .map_err(|e| TypesError::InvalidAddress(e.to_string()))
}

/// Cheap validity check used before any provider call.
pub fn is_valid(address: &str) -> bool {
    decode(address).is_ok()
}
