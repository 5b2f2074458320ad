//! Standalone signed descriptors.
//!
//! Unlike fields, these are not tied to a transaction context. They are
//! verified on receipt and cached in the session state until cleanup.

pub mod enum_value;
pub mod proxy_info;

pub use enum_value::EnumValue;
pub use proxy_info::{DelegationType, ProxyInfo};
