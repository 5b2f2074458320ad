//! DATETIME parameter: a UNIX timestamp or a block height.

use common::error::Error;

use crate::context::{DeviceKeys, DisplayContext};
use crate::parsing::field::{Field, ParamType};
use crate::parsing::value::Value;
use crate::parsing::FormatEnv;
use crate::tlv::{Multiplicity, TagHandler, TlvParser, TlvRecord};
use crate::utils::{format_datetime_utc, format_uint, read_u64_be};

const TAG_VERSION: u8 = 0x00;
const TAG_VALUE: u8 = 0x01;
const TAG_TYPE: u8 = 0x02;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatetimeType {
    Unix = 0x00,
    BlockHeight = 0x01,
}

impl DatetimeType {
    fn from_u8(value: u8) -> Result<Self, Error> {
        match value {
            0x00 => Ok(DatetimeType::Unix),
            0x01 => Ok(DatetimeType::BlockHeight),
            _ => {
                log::warn!("gtp: unknown datetime type {}", value);
                Err(Error::InvalidValue)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatetimeParam {
    pub version: u8,
    pub value: Value,
    pub datetime_type: DatetimeType,
}

#[derive(Default)]
struct DatetimeBuilder {
    version: u8,
    value: Option<Value>,
    datetime_type: Option<DatetimeType>,
}

static DATETIME_PARSER: TlvParser<DatetimeBuilder> = TlvParser {
    handlers: &[
        TagHandler { tag: TAG_VERSION, handler: handle_version, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_VALUE, handler: handle_value, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_TYPE, handler: handle_type, multiplicity: Multiplicity::EnforceUnique },
    ],
    common: None,
};

fn handle_version(r: &TlvRecord<'_>, b: &mut DatetimeBuilder) -> Result<(), Error> {
    b.version = r.as_u8()?;
    Ok(())
}

fn handle_value(r: &TlvRecord<'_>, b: &mut DatetimeBuilder) -> Result<(), Error> {
    b.value = Some(Value::parse(r.value)?);
    Ok(())
}

fn handle_type(r: &TlvRecord<'_>, b: &mut DatetimeBuilder) -> Result<(), Error> {
    b.datetime_type = Some(DatetimeType::from_u8(r.as_u8()?)?);
    Ok(())
}

impl DatetimeParam {
    pub fn parse(payload: &[u8]) -> Result<Self, Error> {
        let mut builder = DatetimeBuilder::default();
        DATETIME_PARSER.parse(payload, &mut builder)?;
        match (builder.value, builder.datetime_type) {
            (Some(value), Some(datetime_type)) => Ok(Self {
                version: builder.version,
                value,
                datetime_type,
            }),
            _ => Err(Error::MissingField),
        }
    }

    pub fn format<C: DisplayContext + DeviceKeys + ?Sized>(
        &self,
        field: &Field,
        env: &mut FormatEnv<'_, C>,
    ) -> Result<(), Error> {
        let values = env.resolve(&self.value)?;
        for value in &values {
            let bytes = value.as_bytes();
            let text = match self.datetime_type {
                DatetimeType::Unix if self.is_unlimited(bytes) => "Unlimited".into(),
                DatetimeType::Unix => format_datetime_utc(read_u64_be(bytes)),
                DatetimeType::BlockHeight => format_uint(bytes),
            };
            env.add_field(ParamType::Datetime, &field.name, text, None)?;
        }
        Ok(())
    }

    /// A full-width value with every bit set.
    fn is_unlimited(&self, bytes: &[u8]) -> bool {
        let type_size = self.value.type_size.map_or(0, usize::from);
        !bytes.is_empty() && bytes.len() >= type_size && bytes.iter().all(|&b| b == 0xff)
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
    use hex_literal::hex;

    fn datetime(bytes: &[u8], datetime_type: u8) -> Param {
        let payload = TlvWriter::new()
            .u8(TAG_VERSION, 1)
            .record(TAG_VALUE, &constant_value(TypeFamily::Uint, bytes))
            .u8(TAG_TYPE, datetime_type)
            .finish();
        Param::Datetime(DatetimeParam::parse(&payload).unwrap())
    }

    #[test]
    fn test_format_datetime() {
        let mut h = Harness::new(MockRegistry::default());
        // 2024-03-09 16:00:00 UTC
        h.format("Deadline", datetime(&hex!("65ec8780"), 0), Visibility::Always, vec![])
            .unwrap();
        h.format("Deadline", datetime(&[0xff; 32], 0), Visibility::Always, vec![])
            .unwrap();
        h.format("Block", datetime(&hex!("01312d00"), 1), Visibility::Always, vec![])
            .unwrap();
        assert_eq!(
            h.rows(),
            rows(&[
                ("Deadline", "2024-03-09 04:00:00 PM UTC"),
                ("Deadline", "Unlimited"),
                ("Block", "20000000"),
            ])
        );
    }

    #[test]
    fn test_parse_rejects_unknown_type() {
        let payload = TlvWriter::new()
            .u8(TAG_VERSION, 1)
            .record(TAG_VALUE, &constant_value(TypeFamily::Uint, &[1]))
            .u8(TAG_TYPE, 2)
            .finish();
        assert_eq!(DatetimeParam::parse(&payload), Err(Error::InvalidValue));
        let no_type = TlvWriter::new()
            .record(TAG_VALUE, &constant_value(TypeFamily::Uint, &[1]))
            .finish();
        assert_eq!(DatetimeParam::parse(&no_type), Err(Error::MissingField));
    }
}
