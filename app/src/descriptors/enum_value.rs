//! ENUM_VALUE descriptor.
//!
//! Names one value of an enumerated parameter of a given contract function,
//! e.g. `(chain 1, 0xcccc.., 0xaabbccdd, id 3, value 7) -> "Accepted"`.
//! Signed with the `Calldata` key usage.

use alloc::string::String;
use alloc::vec::Vec;
use common::error::Error;
use common::types::{EthAddress, KeyUsage, Selector, SELECTOR_LENGTH};

use crate::crypto::{Sha256Hasher, SignatureVerifier, ECDSA_SIGNATURE_MAX_LENGTH};
use crate::tlv::{Multiplicity, TagHandler, TlvParser, TlvRecord};

const TAG_VERSION: u8 = 0x00;
const TAG_CHAIN_ID: u8 = 0x01;
const TAG_CONTRACT_ADDR: u8 = 0x02;
const TAG_SELECTOR: u8 = 0x03;
const TAG_ID: u8 = 0x04;
const TAG_VALUE: u8 = 0x05;
const TAG_NAME: u8 = 0x06;
const TAG_SIGNATURE: u8 = 0xff;

const STRUCT_VERSION: u8 = 0x01;
/// Maximum length of an enum value name.
pub const ENUM_NAME_MAX_LENGTH: usize = 20;

const REQUIRED_TAGS: [u8; 8] = [
    TAG_VERSION,
    TAG_CHAIN_ID,
    TAG_CONTRACT_ADDR,
    TAG_SELECTOR,
    TAG_ID,
    TAG_VALUE,
    TAG_NAME,
    TAG_SIGNATURE,
];

/// Verified name of one enum value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnumValue {
    pub chain_id: u64,
    pub contract_addr: EthAddress,
    pub selector: Selector,
    /// Enum identifier within the function.
    pub id: u8,
    pub value: u8,
    pub name: String,
}

struct EnumValueBuilder {
    entry: EnumValue,
    hasher: Sha256Hasher,
    signature: Vec<u8>,
}

static ENUM_VALUE_PARSER: TlvParser<EnumValueBuilder> = TlvParser {
    handlers: &[
        TagHandler { tag: TAG_VERSION, handler: handle_version, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_CHAIN_ID, handler: handle_chain_id, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_CONTRACT_ADDR, handler: handle_contract_addr, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_SELECTOR, handler: handle_selector, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_ID, handler: handle_id, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_VALUE, handler: handle_value, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_NAME, handler: handle_name, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_SIGNATURE, handler: handle_signature, multiplicity: Multiplicity::EnforceUnique },
    ],
    common: Some(hash_record),
};

fn hash_record(r: &TlvRecord<'_>, b: &mut EnumValueBuilder) -> Result<(), Error> {
    if r.tag != TAG_SIGNATURE {
        b.hasher.update(r.raw);
    }
    Ok(())
}

fn handle_version(r: &TlvRecord<'_>, _: &mut EnumValueBuilder) -> Result<(), Error> {
    if r.as_u8()? != STRUCT_VERSION {
        return Err(Error::UnsupportedVersion);
    }
    Ok(())
}

fn handle_chain_id(r: &TlvRecord<'_>, b: &mut EnumValueBuilder) -> Result<(), Error> {
    b.entry.chain_id = r.as_u64()?;
    Ok(())
}

fn handle_contract_addr(r: &TlvRecord<'_>, b: &mut EnumValueBuilder) -> Result<(), Error> {
    b.entry.contract_addr = r.as_address()?;
    Ok(())
}

fn handle_selector(r: &TlvRecord<'_>, b: &mut EnumValueBuilder) -> Result<(), Error> {
    let mut selector = [0u8; SELECTOR_LENGTH];
    r.copy_left_padded(&mut selector)?;
    b.entry.selector = selector;
    Ok(())
}

fn handle_id(r: &TlvRecord<'_>, b: &mut EnumValueBuilder) -> Result<(), Error> {
    b.entry.id = r.as_u8()?;
    Ok(())
}

fn handle_value(r: &TlvRecord<'_>, b: &mut EnumValueBuilder) -> Result<(), Error> {
    b.entry.value = r.as_u8()?;
    Ok(())
}

fn handle_name(r: &TlvRecord<'_>, b: &mut EnumValueBuilder) -> Result<(), Error> {
    b.entry.name = r.as_str_bounded(ENUM_NAME_MAX_LENGTH)?;
    Ok(())
}

fn handle_signature(r: &TlvRecord<'_>, b: &mut EnumValueBuilder) -> Result<(), Error> {
    if r.value.len() > ECDSA_SIGNATURE_MAX_LENGTH {
        return Err(Error::InvalidValue);
    }
    b.signature = r.value.to_vec();
    Ok(())
}

impl EnumValue {
    /// Parses an ENUM_VALUE structure and verifies its signature envelope.
    pub fn parse<V: SignatureVerifier + ?Sized>(payload: &[u8], verifier: &V) -> Result<Self, Error> {
        let mut builder = EnumValueBuilder {
            entry: EnumValue::default(),
            hasher: Sha256Hasher::new(),
            signature: Vec::new(),
        };
        let received = ENUM_VALUE_PARSER.parse(payload, &mut builder)?;
        if !received.contains_all(&REQUIRED_TAGS) {
            log::warn!("gtp: enum value missing required field(s)");
            return Err(Error::MissingField);
        }
        let hash = builder.hasher.finalize();
        if !verifier.verify(KeyUsage::Calldata, &hash, &builder.signature) {
            log::error!("gtp: enum value signature verification failed");
            return Err(Error::InvalidSignature);
        }
        Ok(builder.entry)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::crypto::tests::{sign, test_verifier};
    use crate::tlv::TlvWriter;
    use hex_literal::hex;

    /// Signed ENUM_VALUE naming `(chain_id, contract, selector, id, value)`.
    pub(crate) fn signed_enum_value(
        chain_id: u64,
        contract: &EthAddress,
        selector: &Selector,
        id: u8,
        value: u8,
        name: &str,
    ) -> Vec<u8> {
        let mut payload = TlvWriter::new()
            .u8(TAG_VERSION, STRUCT_VERSION)
            .u64(TAG_CHAIN_ID, chain_id)
            .record(TAG_CONTRACT_ADDR, contract)
            .record(TAG_SELECTOR, selector)
            .u8(TAG_ID, id)
            .u8(TAG_VALUE, value)
            .record(TAG_NAME, name.as_bytes())
            .finish();
        let signature = sign(&payload);
        payload.extend_from_slice(&TlvWriter::new().record(TAG_SIGNATURE, &signature).finish());
        payload
    }

    #[test]
    fn test_parse_enum_value() {
        let contract = hex!("cccccccccccccccccccccccccccccccccccccccc");
        let payload = signed_enum_value(1, &contract, &hex!("aabbccdd"), 3, 7, "Accepted");
        let entry = EnumValue::parse(&payload, &test_verifier()).unwrap();
        assert_eq!(entry.chain_id, 1);
        assert_eq!(entry.contract_addr, contract);
        assert_eq!(entry.selector, hex!("aabbccdd"));
        assert_eq!((entry.id, entry.value), (3, 7));
        assert_eq!(entry.name, "Accepted");
    }

    #[test]
    fn test_rejects_bad_entries() {
        let contract = [0xcc; 20];
        let verifier = test_verifier();

        let empty_name = signed_enum_value(1, &contract, &[0; 4], 0, 0, "");
        assert_eq!(EnumValue::parse(&empty_name, &verifier), Err(Error::InvalidValue));

        let no_sig = TlvWriter::new().u8(TAG_VERSION, 1).u64(TAG_CHAIN_ID, 1).finish();
        assert_eq!(EnumValue::parse(&no_sig, &verifier), Err(Error::MissingField));

        let wide_id = TlvWriter::new().u16(TAG_ID, 0x0100).finish();
        assert_eq!(EnumValue::parse(&wide_id, &verifier), Err(Error::InvalidValue));

        let mut forged = signed_enum_value(1, &contract, &[0; 4], 0, 0, "Open");
        let pos = forged.windows(4).position(|w| w == b"Open").unwrap();
        forged[pos] = b'o';
        assert_eq!(EnumValue::parse(&forged, &verifier), Err(Error::InvalidSignature));
    }
}
