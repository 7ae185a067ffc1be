//! Ledger data provider client.
//!
//! Typed async access to the chain data provider: paginated unspent-output
//! listing, protocol parameters, the linear fee rule, the minimum-coin
//! rule, and transaction submission. This crate is the single place where
//! node rejection text is classified into the engine's closed taxonomy.

pub mod chain;
pub mod error;
pub mod http;
pub mod registry;

pub use chain::{AddressBalance, ChainClient, ProtocolParams};
pub use error::{LedgerError, SubmitRejection};
pub use http::ProviderConfig;
pub use registry::MetadataRegistry;
