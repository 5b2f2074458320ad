//! TRUSTED_NAME parameter: an address displayed through the trusted name
//! registry.

use alloc::vec::Vec;
use common::error::Error;
use common::types::{EthAddress, NameSource, NameType};

use super::address_constraint_matched;
use crate::context::{DeviceKeys, DisplayContext};
use crate::field_table::ExtraData;
use crate::parsing::field::{Field, ParamType};
use crate::parsing::value::Value;
use crate::parsing::FormatEnv;
use crate::tlv::{Multiplicity, TagHandler, TlvParser, TlvRecord};
use crate::utils::format_address_checksummed;

const TAG_VERSION: u8 = 0x00;
const TAG_VALUE: u8 = 0x01;
const TAG_TYPES: u8 = 0x02;
const TAG_SOURCES: u8 = 0x03;
const TAG_SENDER_ADDR: u8 = 0x04;

const MAX_TYPES: usize = 6;
const MAX_SOURCES: usize = 8;
/// Maximum number of placeholder addresses standing for the sender.
pub const MAX_SENDER_ADDRS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedNameParam {
    pub version: u8,
    pub value: Value,
    /// Accepted name types. Empty accepts any.
    pub types: Vec<NameType>,
    /// Accepted name sources. Empty accepts any.
    pub sources: Vec<NameSource>,
    /// Addresses to replace with the device's own address before lookup.
    pub sender_addrs: Vec<EthAddress>,
}

#[derive(Default)]
struct TrustedNameBuilder {
    version: u8,
    value: Option<Value>,
    types: Vec<NameType>,
    sources: Vec<NameSource>,
    sender_addrs: Vec<EthAddress>,
}

static TRUSTED_NAME_PARSER: TlvParser<TrustedNameBuilder> = TlvParser {
    handlers: &[
        TagHandler { tag: TAG_VERSION, handler: handle_version, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_VALUE, handler: handle_value, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_TYPES, handler: handle_types, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_SOURCES, handler: handle_sources, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_SENDER_ADDR, handler: handle_sender_addr, multiplicity: Multiplicity::AllowMultiple },
    ],
    common: None,
};

fn handle_version(r: &TlvRecord<'_>, b: &mut TrustedNameBuilder) -> Result<(), Error> {
    b.version = r.as_u8()?;
    Ok(())
}

fn handle_value(r: &TlvRecord<'_>, b: &mut TrustedNameBuilder) -> Result<(), Error> {
    b.value = Some(Value::parse(r.value)?);
    Ok(())
}

fn handle_types(r: &TlvRecord<'_>, b: &mut TrustedNameBuilder) -> Result<(), Error> {
    if r.value.len() > MAX_TYPES {
        return Err(Error::InvalidValue);
    }
    b.types = r
        .value
        .iter()
        .map(|&t| NameType::from_u8(t).ok_or(Error::InvalidValue))
        .collect::<Result<_, _>>()?;
    Ok(())
}

fn handle_sources(r: &TlvRecord<'_>, b: &mut TrustedNameBuilder) -> Result<(), Error> {
    if r.value.len() > MAX_SOURCES {
        return Err(Error::InvalidValue);
    }
    b.sources = r
        .value
        .iter()
        .map(|&s| NameSource::from_u8(s).ok_or(Error::InvalidValue))
        .collect::<Result<_, _>>()?;
    Ok(())
}

fn handle_sender_addr(r: &TlvRecord<'_>, b: &mut TrustedNameBuilder) -> Result<(), Error> {
    if b.sender_addrs.len() >= MAX_SENDER_ADDRS {
        return Err(Error::LimitExceeded);
    }
    b.sender_addrs.push(r.as_address()?);
    Ok(())
}

impl TrustedNameParam {
    pub fn parse(payload: &[u8]) -> Result<Self, Error> {
        let mut builder = TrustedNameBuilder::default();
        TRUSTED_NAME_PARSER.parse(payload, &mut builder)?;
        let value = builder.value.ok_or(Error::MissingField)?;
        Ok(Self {
            version: builder.version,
            value,
            types: builder.types,
            sources: builder.sources,
            sender_addrs: builder.sender_addrs,
        })
    }

    pub fn format<C: DisplayContext + DeviceKeys + ?Sized>(
        &self,
        field: &Field,
        env: &mut FormatEnv<'_, C>,
    ) -> Result<(), Error> {
        let values = env.resolve(&self.value)?;
        let chain_id = env.contexts.current().map_or(0, |ctx| ctx.chain_id());
        if chain_id == 0 {
            log::warn!("gtp: trusted name lookup without a chain ID");
            return Err(Error::InvalidState);
        }

        for value in &values {
            let mut address = value.to_address();
            if self.sender_addrs.contains(&address) {
                address = env.registry.wallet_address()?;
            }
            let matched = address_constraint_matched(&field.constraints, &address, value.len());
            if !field.check_visibility(matched)? {
                continue;
            }
            match env
                .registry
                .trusted_name(&self.types, &self.sources, chain_id, &address)
            {
                Some(name) => {
                    let text = name.name.clone();
                    env.add_field(
                        ParamType::TrustedName,
                        &field.name,
                        text,
                        Some(ExtraData::TrustedName(name)),
                    )?;
                }
                None => {
                    let text = format_address_checksummed(&address, chain_id);
                    env.add_field(ParamType::Raw, &field.name, text, None)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::MockRegistry;
    use crate::parsing::field::{Param, Visibility};
    use crate::parsing::params::tests::{
        array_value, array_words, constant_value, rows, word_addr, Harness,
    };
    use crate::parsing::value::TypeFamily;
    use crate::tlv::TlvWriter;
    use alloc::string::String;
    use alloc::vec;
    use common::types::TrustedName;
    use hex_literal::hex;

    const VITALIK: EthAddress = hex!("d8da6bf26964af9d7eed9e03e53415d37aa96045");
    const SENDER_PLACEHOLDER: EthAddress = hex!("0000000000000000000000000000000000000001");

    fn vitalik() -> TrustedName {
        TrustedName {
            chain_id: 1,
            address: VITALIK,
            name: String::from("vitalik.eth"),
            name_type: NameType::Account,
            source: NameSource::Ens,
        }
    }

    fn trusted_name(value: &[u8]) -> TlvWriter {
        TlvWriter::new()
            .u8(TAG_VERSION, 1)
            .record(TAG_VALUE, value)
            .record(TAG_TYPES, &[NameType::Account as u8])
            .record(TAG_SOURCES, &[NameSource::Ens as u8, NameSource::Lab as u8])
    }

    fn param(writer: TlvWriter) -> Param {
        Param::TrustedName(TrustedNameParam::parse(&writer.finish()).unwrap())
    }

    #[test]
    fn test_known_and_unknown_names() {
        let registry = MockRegistry::default().with_trusted_name(vitalik());
        let other = hex!("5aaeb6053f3e94c9b9a09f33669435e7ef1beaed");
        let words = array_words(&[word_addr(&VITALIK), word_addr(&other)]);
        let mut h = Harness::with_calldata(registry, &words);
        h.format("To", param(trusted_name(&array_value(TypeFamily::Address))), Visibility::Always, vec![])
            .unwrap();
        assert_eq!(
            h.rows(),
            rows(&[
                ("To", "vitalik.eth"),
                ("To", "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"),
            ])
        );
        assert_eq!(h.row_types(), vec![ParamType::TrustedName, ParamType::Raw]);
    }

    #[test]
    fn test_sender_placeholder_is_the_wallet() {
        let mut registry = MockRegistry::default().with_trusted_name(TrustedName {
            address: hex!("dddddddddddddddddddddddddddddddddddddddd"),
            name: String::from("me.eth"),
            ..vitalik()
        });
        registry.wallet = hex!("dddddddddddddddddddddddddddddddddddddddd");
        let mut h = Harness::new(registry);
        let writer = trusted_name(&constant_value(TypeFamily::Address, &SENDER_PLACEHOLDER))
            .record(TAG_SENDER_ADDR, &SENDER_PLACEHOLDER);
        h.format("Beneficiary", param(writer), Visibility::Always, vec![]).unwrap();
        assert_eq!(h.rows(), rows(&[("Beneficiary", "me.eth")]));
    }

    #[test]
    fn test_constraints_on_raw_address() {
        let registry = MockRegistry::default().with_trusted_name(vitalik());
        let mut h = Harness::new(registry);
        let value = || param(trusted_name(&constant_value(TypeFamily::Address, &VITALIK)));

        h.format("To", value(), Visibility::IfNotIn, vec![VITALIK.to_vec()]).unwrap();
        assert!(h.table.is_empty());

        h.format("To", value(), Visibility::MustBe, vec![VITALIK.to_vec()]).unwrap();
        assert_eq!(h.rows(), rows(&[("To", "vitalik.eth")]));

        assert_eq!(
            h.format("To", value(), Visibility::MustBe, vec![vec![0x01]]),
            Err(Error::ConstraintRejected)
        );
    }

    #[test]
    fn test_parse_rejects_unknown_filters() {
        let value = constant_value(TypeFamily::Address, &VITALIK);
        let bad_type = TlvWriter::new().record(TAG_VALUE, &value).record(TAG_TYPES, &[0x09]);
        assert_eq!(TrustedNameParam::parse(&bad_type.finish()), Err(Error::InvalidValue));
        let bad_source = TlvWriter::new().record(TAG_VALUE, &value).record(TAG_SOURCES, &[0x08]);
        assert_eq!(TrustedNameParam::parse(&bad_source.finish()), Err(Error::InvalidValue));
    }
}
