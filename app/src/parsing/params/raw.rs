//! RAW parameter: a value displayed according to its ABI type.

use alloc::string::String;
use common::error::Error;
use common::types::{EthAddress, ADDRESS_LENGTH};
use num_bigint::BigUint;

use super::{address_constraint_matched, parse_single_value};
use crate::context::{DeviceKeys, DisplayContext};
use crate::parsing::field::{Field, ParamType};
use crate::parsing::value::{ParsedValue, TypeFamily, Value};
use crate::parsing::FormatEnv;
use crate::utils::{
    buf_shrink_expand, format_address_checksummed, format_hex_truncated, format_int,
    str_from_bytes_truncated,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawParam {
    pub version: u8,
    pub value: Value,
}

impl RawParam {
    pub fn parse(payload: &[u8]) -> Result<Self, Error> {
        let (version, value) = parse_single_value(payload)?;
        Ok(Self { version, value })
    }

    pub fn format<C: DisplayContext + DeviceKeys + ?Sized>(
        &self,
        field: &Field,
        env: &mut FormatEnv<'_, C>,
    ) -> Result<(), Error> {
        let chain_id = env.tx_info()?.chain_id;
        let values = env.resolve(&self.value)?;
        for value in &values {
            if let Some(text) = self.format_one(field, value, chain_id, env.config.display_buffer_size)? {
                env.add_field(ParamType::Raw, &field.name, text, None)?;
            }
        }
        Ok(())
    }

    /// Text of one value, or `None` if the visibility rule hides it.
    fn format_one(
        &self,
        field: &Field,
        value: &ParsedValue,
        chain_id: u64,
        display_size: usize,
    ) -> Result<Option<String>, Error> {
        let bytes = value.as_bytes();
        let (matched, text) = match self.value.type_family {
            TypeFamily::Uint => {
                let n = BigUint::from_bytes_be(bytes);
                let matched = field
                    .constraints
                    .iter()
                    .any(|c| BigUint::from_bytes_be(c) == n);
                (matched, n.to_str_radix(10))
            }
            TypeFamily::Int => {
                let size = self.value.type_size.map_or(bytes.len(), usize::from);
                (exact_match(field, bytes), format_int(bytes, size))
            }
            TypeFamily::Address => {
                let mut addr: EthAddress = [0u8; ADDRESS_LENGTH];
                buf_shrink_expand(bytes, &mut addr);
                let matched = address_constraint_matched(&field.constraints, &addr, ADDRESS_LENGTH);
                (matched, format_address_checksummed(&addr, chain_id))
            }
            TypeFamily::Bool => {
                let set = bytes.last().is_some_and(|&b| b != 0);
                let text = if set { "true" } else { "false" };
                (exact_match(field, bytes), String::from(text))
            }
            TypeFamily::Bytes => {
                let full = alloc::format!("0x{}", hex::encode(bytes));
                let matched = field
                    .constraints
                    .iter()
                    .filter(|c| c.len() <= bytes.len())
                    .any(|c| alloc::format!("0x{}", hex::encode(c)) == full);
                (matched, format_hex_truncated(bytes, display_size))
            }
            TypeFamily::String => (
                exact_match(field, bytes),
                str_from_bytes_truncated(bytes, display_size),
            ),
            TypeFamily::Ufixed | TypeFamily::Fixed => {
                log::warn!("gtp: fixed point values are not supported");
                return Err(Error::InvalidValue);
            }
        };
        Ok(field.check_visibility(matched)?.then_some(text))
    }
}

/// Byte-for-byte constraint comparison.
fn exact_match(field: &Field, bytes: &[u8]) -> bool {
    field.constraints.iter().any(|c| c.as_slice() == bytes)
}
