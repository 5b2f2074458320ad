//! Parser configuration.
//!
//! Holds the signing mode and the resource ceilings of a session. All
//! limits are reported as `Error::OutOfMemory` when reached.

use alloc::string::String;
use serde::{Deserialize, Serialize};

/// Flow the parser is serving.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SigningMode {
    /// Plain transaction signing: the root context is never hash-checked
    /// on its own and pushing it resets the field table.
    #[default]
    Transaction,
    /// Typed-data signing: every context, root included, is hash-checked.
    TypedData,
}

/// Session configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ParserConfig {
    pub mode: SigningMode,
    /// Maximum number of in-flight transaction contexts.
    pub max_contexts: usize,
    /// Maximum number of field table rows.
    pub max_fields: usize,
    /// Maximum size of a reassembled TLV payload.
    pub max_payload_size: usize,
    /// Capacity of a displayed value, in bytes.
    pub display_buffer_size: usize,
    /// Ticker used when the network registry knows none.
    pub native_ticker: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            mode: SigningMode::Transaction,
            max_contexts: 16,
            max_fields: 64,
            max_payload_size: u16::MAX as usize,
            display_buffer_size: 128,
            native_ticker: String::from("ETH"),
        }
    }
}

impl ParserConfig {
    /// Default configuration for a typed-data flow.
    pub fn typed_data() -> Self {
        Self {
            mode: SigningMode::TypedData,
            ..Self::default()
        }
    }
}
