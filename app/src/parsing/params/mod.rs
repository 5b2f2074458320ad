//! Field parameters.
//!
//! Every parameter kind is parsed from the nested TLV carried by the
//! field's PARAM record, then formatted into zero or more field table rows
//! (or, for [`CalldataParam`], into new transaction contexts). A value that
//! resolves to N elements yields N rows.

mod amount;
mod calldata;
mod datetime;
mod duration;
mod enumeration;
mod network;
mod nft;
mod raw;
mod token;
mod token_amount;
mod trusted_name;
mod unit;

pub use amount::AmountParam;
pub use calldata::CalldataParam;
pub use datetime::{DatetimeParam, DatetimeType};
pub use duration::DurationParam;
pub use enumeration::EnumParam;
pub use network::NetworkParam;
pub use nft::NftParam;
pub use raw::RawParam;
pub use token::TokenParam;
pub use token_amount::TokenAmountParam;
pub use trusted_name::TrustedNameParam;
pub use unit::UnitParam;

use alloc::vec::Vec;
use common::error::Error;
use common::types::{EthAddress, ADDRESS_LENGTH};

use super::value::Value;
use crate::tlv::{Multiplicity, TagHandler, TlvParser, TlvRecord};
use crate::utils::buf_shrink_expand;

const TAG_VERSION: u8 = 0x00;
const TAG_VALUE: u8 = 0x01;

/// Maximum number of native currency addresses on one parameter.
pub const MAX_NATIVE_ADDRS: usize = 4;

/// A parameter holding nothing but a version and a value.
#[derive(Default)]
struct SingleValueBuilder {
    version: u8,
    value: Option<Value>,
}

static SINGLE_VALUE_PARSER: TlvParser<SingleValueBuilder> = TlvParser {
    handlers: &[
        TagHandler { tag: TAG_VERSION, handler: handle_version, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_VALUE, handler: handle_value, multiplicity: Multiplicity::EnforceUnique },
    ],
    common: None,
};

fn handle_version(r: &TlvRecord<'_>, b: &mut SingleValueBuilder) -> Result<(), Error> {
    b.version = r.as_u8()?;
    Ok(())
}

fn handle_value(r: &TlvRecord<'_>, b: &mut SingleValueBuilder) -> Result<(), Error> {
    b.value = Some(Value::parse(r.value)?);
    Ok(())
}

/// Parses `{version, value}`. The value is mandatory.
fn parse_single_value(payload: &[u8]) -> Result<(u8, Value), Error> {
    let mut builder = SingleValueBuilder::default();
    SINGLE_VALUE_PARSER.parse(payload, &mut builder)?;
    let value = builder.value.ok_or(Error::MissingField)?;
    Ok((builder.version, value))
}

/// Adds a native currency placeholder address, bounded by
/// [`MAX_NATIVE_ADDRS`].
fn push_native_addr(r: &TlvRecord<'_>, addrs: &mut Vec<EthAddress>) -> Result<(), Error> {
    if addrs.len() >= MAX_NATIVE_ADDRS {
        return Err(Error::LimitExceeded);
    }
    addrs.push(r.as_address()?);
    Ok(())
}

/// Whether `address` matches one of the constraints, each read as a
/// right-aligned address. Constraints longer than `value_len` are skipped.
fn address_constraint_matched(constraints: &[Vec<u8>], address: &EthAddress, value_len: usize) -> bool {
    constraints.iter().any(|c| {
        if c.len() > value_len || c.len() > ADDRESS_LENGTH {
            return false;
        }
        let mut padded = [0u8; ADDRESS_LENGTH];
        buf_shrink_expand(c, &mut padded);
        &padded == address
    })
}
