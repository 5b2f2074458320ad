//! FIELD descriptor.
//!
//! One displayed line (or one nested call) of a transaction: a name, a
//! typed parameter, and an optional visibility rule with its constraints.
//!
//! Field records are not signed one by one. Their raw bytes are chained
//! into the running hash of the transaction context they belong to, which
//! is checked against the `fields_hash` of the signed TX_INFO.

use alloc::string::String;
use alloc::vec::Vec;
use common::error::Error;

use super::params::{
    AmountParam, CalldataParam, DatetimeParam, DurationParam, EnumParam, NetworkParam, NftParam,
    RawParam, TokenAmountParam, TokenParam, TrustedNameParam, UnitParam,
};
use super::FormatEnv;
use crate::context::{DeviceKeys, DisplayContext};
use crate::tlv::{Multiplicity, TagHandler, TlvParser, TlvRecord};

const TAG_VERSION: u8 = 0x00;
const TAG_NAME: u8 = 0x01;
const TAG_PARAM_TYPE: u8 = 0x02;
const TAG_PARAM: u8 = 0x03;
const TAG_VISIBLE: u8 = 0x04;
const TAG_CONSTRAINT: u8 = 0x05;

/// Maximum length of a field name.
pub const FIELD_NAME_MAX_LENGTH: usize = 20;
/// Maximum number of constraints on one field.
pub const MAX_CONSTRAINTS: usize = 16;

/// Kind of a field parameter, also used to tag field table rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Raw = 0x00,
    Amount = 0x01,
    TokenAmount = 0x02,
    Nft = 0x03,
    Datetime = 0x04,
    Duration = 0x05,
    Unit = 0x06,
    Enum = 0x07,
    TrustedName = 0x08,
    Calldata = 0x09,
    Token = 0x0a,
    Network = 0x0b,
    /// Transaction type marker, never received on the wire.
    Intent = 0xff,
}

impl ParamType {
    fn from_u8(value: u8) -> Result<Self, Error> {
        Ok(match value {
            0x00 => ParamType::Raw,
            0x01 => ParamType::Amount,
            0x02 => ParamType::TokenAmount,
            0x03 => ParamType::Nft,
            0x04 => ParamType::Datetime,
            0x05 => ParamType::Duration,
            0x06 => ParamType::Unit,
            0x07 => ParamType::Enum,
            0x08 => ParamType::TrustedName,
            0x09 => ParamType::Calldata,
            0x0a => ParamType::Token,
            0x0b => ParamType::Network,
            _ => {
                log::warn!("gtp: unsupported param type {}", value);
                return Err(Error::InvalidValue);
            }
        })
    }
}

/// Display rule of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Always = 0x00,
    /// The value must match one of the constraints, or the transaction
    /// is rejected.
    MustBe = 0x01,
    /// Displayed only if the value matches none of the constraints.
    IfNotIn = 0x02,
}

impl Visibility {
    fn from_u8(value: u8) -> Result<Self, Error> {
        match value {
            0x00 => Ok(Visibility::Always),
            0x01 => Ok(Visibility::MustBe),
            0x02 => Ok(Visibility::IfNotIn),
            _ => Err(Error::InvalidValue),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Raw(RawParam),
    Amount(AmountParam),
    TokenAmount(TokenAmountParam),
    Nft(NftParam),
    Datetime(DatetimeParam),
    Duration(DurationParam),
    Unit(UnitParam),
    Enum(EnumParam),
    TrustedName(TrustedNameParam),
    Calldata(CalldataParam),
    Token(TokenParam),
    Network(NetworkParam),
}

impl Param {
    fn parse(param_type: ParamType, payload: &[u8]) -> Result<Self, Error> {
        Ok(match param_type {
            ParamType::Raw => Param::Raw(RawParam::parse(payload)?),
            ParamType::Amount => Param::Amount(AmountParam::parse(payload)?),
            ParamType::TokenAmount => Param::TokenAmount(TokenAmountParam::parse(payload)?),
            ParamType::Nft => Param::Nft(NftParam::parse(payload)?),
            ParamType::Datetime => Param::Datetime(DatetimeParam::parse(payload)?),
            ParamType::Duration => Param::Duration(DurationParam::parse(payload)?),
            ParamType::Unit => Param::Unit(UnitParam::parse(payload)?),
            ParamType::Enum => Param::Enum(EnumParam::parse(payload)?),
            ParamType::TrustedName => Param::TrustedName(TrustedNameParam::parse(payload)?),
            ParamType::Calldata => Param::Calldata(CalldataParam::parse(payload)?),
            ParamType::Token => Param::Token(TokenParam::parse(payload)?),
            ParamType::Network => Param::Network(NetworkParam::parse(payload)?),
            ParamType::Intent => return Err(Error::InvalidValue),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub version: u8,
    pub name: String,
    pub param: Param,
    pub visibility: Visibility,
    /// Opaque byte strings compared against the value.
    pub constraints: Vec<Vec<u8>>,
}

#[derive(Default)]
struct FieldBuilder {
    version: u8,
    name: Option<String>,
    param_type: Option<ParamType>,
    param: Option<Param>,
    visibility: Option<Visibility>,
    constraints: Vec<Vec<u8>>,
}

static FIELD_PARSER: TlvParser<FieldBuilder> = TlvParser {
    handlers: &[
        TagHandler { tag: TAG_VERSION, handler: handle_version, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_NAME, handler: handle_name, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_PARAM_TYPE, handler: handle_param_type, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_PARAM, handler: handle_param, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_VISIBLE, handler: handle_visible, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_CONSTRAINT, handler: handle_constraint, multiplicity: Multiplicity::AllowMultiple },
    ],
    common: None,
};

fn handle_version(r: &TlvRecord<'_>, f: &mut FieldBuilder) -> Result<(), Error> {
    f.version = r.as_u8()?;
    Ok(())
}

fn handle_name(r: &TlvRecord<'_>, f: &mut FieldBuilder) -> Result<(), Error> {
    f.name = Some(r.as_str_truncated(FIELD_NAME_MAX_LENGTH));
    Ok(())
}

fn handle_param_type(r: &TlvRecord<'_>, f: &mut FieldBuilder) -> Result<(), Error> {
    f.param_type = Some(ParamType::from_u8(r.as_u8()?)?);
    Ok(())
}

fn handle_param(r: &TlvRecord<'_>, f: &mut FieldBuilder) -> Result<(), Error> {
    let Some(param_type) = f.param_type else {
        log::warn!("gtp: field param received before its type");
        return Err(Error::InvalidValue);
    };
    f.param = Some(Param::parse(param_type, r.value)?);
    Ok(())
}

fn handle_visible(r: &TlvRecord<'_>, f: &mut FieldBuilder) -> Result<(), Error> {
    f.visibility = Some(Visibility::from_u8(r.as_u8()?)?);
    Ok(())
}

fn handle_constraint(r: &TlvRecord<'_>, f: &mut FieldBuilder) -> Result<(), Error> {
    match f.visibility {
        Some(Visibility::MustBe) | Some(Visibility::IfNotIn) => {}
        _ => {
            log::warn!("gtp: constraint without a MUST_BE or IF_NOT_IN visibility");
            return Err(Error::InvalidValue);
        }
    }
    if f.constraints.len() >= MAX_CONSTRAINTS {
        return Err(Error::LimitExceeded);
    }
    f.constraints.push(r.value.to_vec());
    Ok(())
}

impl Field {
    /// Parses and verifies a FIELD structure.
    pub fn parse(payload: &[u8]) -> Result<Self, Error> {
        let mut builder = FieldBuilder::default();
        let received = FIELD_PARSER.parse(payload, &mut builder)?;

        if !received.contains(TAG_VERSION) {
            log::warn!("gtp: field without version");
            return Err(Error::MissingField);
        }
        if builder.version != 1 {
            log::warn!("gtp: unsupported field version {}", builder.version);
            return Err(Error::UnsupportedVersion);
        }
        match (builder.name, builder.param) {
            (Some(name), Some(param)) => Ok(Field {
                version: builder.version,
                name,
                param,
                visibility: builder.visibility.unwrap_or_default(),
                constraints: builder.constraints,
            }),
            _ => {
                log::warn!("gtp: field missing required field(s)");
                Err(Error::MissingField)
            }
        }
    }

    /// Applies the visibility rule given whether the value matched one of
    /// the constraints.
    ///
    /// Returns whether the value is to be displayed, or
    /// `ConstraintRejected` if a MUST_BE rule is not satisfied.
    pub fn check_visibility(&self, matched: bool) -> Result<bool, Error> {
        match self.visibility {
            Visibility::Always => Ok(true),
            Visibility::MustBe if matched => Ok(true),
            Visibility::MustBe => {
                log::warn!("gtp: \"{}\" matches no MUST_BE constraint, rejecting", self.name);
                Err(Error::ConstraintRejected)
            }
            Visibility::IfNotIn if matched => {
                log::info!("gtp: \"{}\" hidden by an IF_NOT_IN constraint", self.name);
                Ok(false)
            }
            Visibility::IfNotIn => Ok(true),
        }
    }

    /// Formats the field into the field table, or pushes the nested
    /// transaction contexts it describes.
    pub fn format<C: DisplayContext + DeviceKeys + ?Sized>(
        &self,
        env: &mut FormatEnv<'_, C>,
    ) -> Result<(), Error> {
        match &self.param {
            Param::Raw(p) => p.format(self, env),
            Param::Amount(p) => p.format(self, env),
            Param::TokenAmount(p) => p.format(self, env),
            Param::Nft(p) => p.format(self, env),
            Param::Datetime(p) => p.format(self, env),
            Param::Duration(p) => p.format(self, env),
            Param::Unit(p) => p.format(self, env),
            Param::Enum(p) => p.format(self, env),
            Param::TrustedName(p) => p.format(self, env),
            Param::Calldata(p) => p.format(self, env),
            Param::Token(p) => p.format(self, env),
            Param::Network(p) => p.format(self, env),
        }
    }
}
