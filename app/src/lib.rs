//! Generic Transaction Parser.
//!
//! Interprets backend-signed descriptors against raw Ethereum calldata and
//! produces a flat table of human-readable `(key, value)` pairs for the UI.
//!
//! Data flow: command handlers reassemble TLV payloads, the TLV codec feeds
//! typed structures (`TxInfo`, `Field`, params, values), values are resolved
//! through the data-path evaluator against the calldata of the current
//! transaction context, and formatters append rows to the field table or
//! push nested transaction contexts.
//!
//! # Security
//!
//! - Descriptors come from the HOST and are UNTRUSTED until their signature
//!   envelope has been verified.
//! - Every field record is hash-chained into the context it belongs to and
//!   checked against the signed `fields_hash` before the context is
//!   considered complete.
//! - Any failure aborts the signing flow and wipes all accumulated state.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod calldata;
pub mod config;
pub mod context;
pub mod crypto;
pub mod descriptors;
pub mod field_table;
pub mod handlers;
pub mod parsing;
pub mod session;
pub mod state;
pub mod tlv;
pub mod tlv_apdu;
pub mod tx_ctx;
pub mod utils;

pub use common::error::Error;
pub use config::{ParserConfig, SigningMode};
pub use context::{DeviceKeys, DisplayContext};
pub use crypto::{K256Verifier, SignatureVerifier};
pub use session::ParserSession;
