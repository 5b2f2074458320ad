//! UNIT parameter: a scaled quantity followed by its unit symbol.

use alloc::string::String;
use common::error::Error;

use crate::context::{DeviceKeys, DisplayContext};
use crate::parsing::field::{Field, ParamType};
use crate::parsing::value::Value;
use crate::parsing::FormatEnv;
use crate::tlv::{Multiplicity, TagHandler, TlvParser, TlvRecord};
use crate::utils::format_decimal;

const TAG_VERSION: u8 = 0x00;
const TAG_VALUE: u8 = 0x01;
const TAG_BASE: u8 = 0x02;
const TAG_DECIMALS: u8 = 0x03;
const TAG_PREFIX: u8 = 0x04;

/// Maximum length of the unit symbol.
pub const UNIT_BASE_MAX_LENGTH: usize = 11;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitParam {
    pub version: u8,
    pub value: Value,
    /// Unit symbol, e.g. `%` or `bps`.
    pub base: String,
    pub decimals: u8,
    /// Whether an SI prefix may be used. Not applied yet.
    pub prefix: bool,
}

#[derive(Default)]
struct UnitBuilder {
    version: u8,
    value: Option<Value>,
    base: String,
    decimals: u8,
    prefix: bool,
}

static UNIT_PARSER: TlvParser<UnitBuilder> = TlvParser {
    handlers: &[
        TagHandler { tag: TAG_VERSION, handler: handle_version, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_VALUE, handler: handle_value, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_BASE, handler: handle_base, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_DECIMALS, handler: handle_decimals, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_PREFIX, handler: handle_prefix, multiplicity: Multiplicity::EnforceUnique },
    ],
    common: None,
};

fn handle_version(r: &TlvRecord<'_>, b: &mut UnitBuilder) -> Result<(), Error> {
    b.version = r.as_u8()?;
    Ok(())
}

fn handle_value(r: &TlvRecord<'_>, b: &mut UnitBuilder) -> Result<(), Error> {
    b.value = Some(Value::parse(r.value)?);
    Ok(())
}

fn handle_base(r: &TlvRecord<'_>, b: &mut UnitBuilder) -> Result<(), Error> {
    if r.value.len() > UNIT_BASE_MAX_LENGTH {
        return Err(Error::InvalidValue);
    }
    b.base = r.as_str_truncated(UNIT_BASE_MAX_LENGTH);
    Ok(())
}

fn handle_decimals(r: &TlvRecord<'_>, b: &mut UnitBuilder) -> Result<(), Error> {
    b.decimals = r.as_u8()?;
    Ok(())
}

fn handle_prefix(r: &TlvRecord<'_>, b: &mut UnitBuilder) -> Result<(), Error> {
    b.prefix = r.as_bool()?;
    Ok(())
}

impl UnitParam {
    pub fn parse(payload: &[u8]) -> Result<Self, Error> {
        let mut builder = UnitBuilder::default();
        UNIT_PARSER.parse(payload, &mut builder)?;
        let value = builder.value.ok_or(Error::MissingField)?;
        Ok(Self {
            version: builder.version,
            value,
            base: builder.base,
            decimals: builder.decimals,
            prefix: builder.prefix,
        })
    }

    pub fn format<C: DisplayContext + DeviceKeys + ?Sized>(
        &self,
        field: &Field,
        env: &mut FormatEnv<'_, C>,
    ) -> Result<(), Error> {
        if self.base.is_empty() {
            log::warn!("gtp: unit \"{}\" has no symbol", field.name);
            return Err(Error::InvalidValue);
        }
        let values = env.resolve(&self.value)?;
        for value in &values {
            let amount = format_decimal(value.as_bytes(), self.decimals);
            let text = alloc::format!("{} {}", amount, self.base);
            env.add_field(ParamType::Unit, &field.name, text, None)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::MockRegistry;
    use crate::parsing::field::{Param, Visibility};
    use crate::parsing::params::tests::{constant_value, rows, Harness};
    use crate::parsing::value::TypeFamily;
    use crate::tlv::TlvWriter;
    use alloc::vec;

    fn unit(bytes: &[u8], base: &[u8], decimals: u8) -> Param {
        let payload = TlvWriter::new()
            .u8(TAG_VERSION, 1)
            .record(TAG_VALUE, &constant_value(TypeFamily::Uint, bytes))
            .record(TAG_BASE, base)
            .u8(TAG_DECIMALS, decimals)
            .u8(TAG_PREFIX, 0)
            .finish();
        Param::Unit(UnitParam::parse(&payload).unwrap())
    }

    #[test]
    fn test_format_unit() {
        let mut h = Harness::new(MockRegistry::default());
        h.format("Fee", unit(&[0x01, 0xf4], b"%", 2), Visibility::Always, vec![])
            .unwrap();
        h.format("Slippage", unit(&[0x32], b"bps", 0), Visibility::Always, vec![])
            .unwrap();
        assert_eq!(h.rows(), rows(&[("Fee", "5 %"), ("Slippage", "50 bps")]));
    }

    #[test]
    fn test_empty_base_is_rejected() {
        let mut h = Harness::new(MockRegistry::default());
        assert_eq!(
            h.format("Fee", unit(&[1], b"", 0), Visibility::Always, vec![]),
            Err(Error::InvalidValue)
        );
    }

    #[test]
    fn test_parse_limits() {
        let payload = TlvWriter::new()
            .record(TAG_VALUE, &constant_value(TypeFamily::Uint, &[1]))
            .record(TAG_BASE, b"twelve chars")
            .finish();
        assert_eq!(UnitParam::parse(&payload), Err(Error::InvalidValue));
        let payload = TlvWriter::new()
            .record(TAG_VALUE, &constant_value(TypeFamily::Uint, &[1]))
            .u8(TAG_PREFIX, 2)
            .finish();
        assert_eq!(UnitParam::parse(&payload), Err(Error::InvalidValue));
    }
}
