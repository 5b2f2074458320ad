//! Command handlers of the parser.
//!
//! Each handler receives one complete, reassembled TLV payload.
//! All handlers must:
//! 1. Verify the signature envelope of signed descriptors before use
//! 2. Chain every field record into the hash of its transaction context
//! 3. Return an error on the first failure, leaving cleanup to the session
//!
//! Status-word mapping and chunk reassembly live in [`crate::session`].

mod descriptors;
mod field;
mod tx_info;

pub use descriptors::{handle_enum_value, handle_proxy_info};
pub use field::handle_field;
pub use tx_info::handle_tx_info;
