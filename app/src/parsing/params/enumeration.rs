//! ENUM parameter: a value named through a previously received ENUM_VALUE
//! descriptor.

use common::error::Error;

use crate::context::{DeviceKeys, DisplayContext};
use crate::parsing::field::{Field, ParamType};
use crate::parsing::value::Value;
use crate::parsing::FormatEnv;
use crate::tlv::{Multiplicity, TagHandler, TlvParser, TlvRecord};

const TAG_VERSION: u8 = 0x00;
const TAG_ID: u8 = 0x01;
const TAG_VALUE: u8 = 0x02;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumParam {
    pub version: u8,
    /// Enum identifier within the function.
    pub id: u8,
    pub value: Value,
}

#[derive(Default)]
struct EnumBuilder {
    version: u8,
    id: Option<u8>,
    value: Option<Value>,
}

static ENUM_PARSER: TlvParser<EnumBuilder> = TlvParser {
    handlers: &[
        TagHandler { tag: TAG_VERSION, handler: handle_version, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_ID, handler: handle_id, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_VALUE, handler: handle_value, multiplicity: Multiplicity::EnforceUnique },
    ],
    common: None,
};

fn handle_version(r: &TlvRecord<'_>, b: &mut EnumBuilder) -> Result<(), Error> {
    b.version = r.as_u8()?;
    Ok(())
}

fn handle_id(r: &TlvRecord<'_>, b: &mut EnumBuilder) -> Result<(), Error> {
    b.id = Some(r.as_u8()?);
    Ok(())
}

fn handle_value(r: &TlvRecord<'_>, b: &mut EnumBuilder) -> Result<(), Error> {
    b.value = Some(Value::parse(r.value)?);
    Ok(())
}

impl EnumParam {
    pub fn parse(payload: &[u8]) -> Result<Self, Error> {
        let mut builder = EnumBuilder::default();
        ENUM_PARSER.parse(payload, &mut builder)?;
        match (builder.id, builder.value) {
            (Some(id), Some(value)) => Ok(Self {
                version: builder.version,
                id,
                value,
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
        let chain_id = env.tx_info()?.chain_id;
        let ctx = env.contexts.current().ok_or(Error::InvalidState)?;
        let contract = *ctx.to().ok_or(Error::InvalidState)?;
        let selector = *ctx.calldata().ok_or(Error::InvalidState)?.get_selector()?;

        for value in &values {
            let Some(&last) = value.as_bytes().last() else {
                return Err(Error::InvalidValue);
            };
            let Some(entry) = env
                .state
                .lookup_enum_value(chain_id, &contract, &selector, self.id, last)
            else {
                log::warn!("gtp: no name for value {} of enum {}", last, self.id);
                return Err(Error::NotFound);
            };
            let name = entry.name.clone();
            env.add_field(ParamType::Enum, &field.name, name, None)?;
        }
        Ok(())
    }
}
