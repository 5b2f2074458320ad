//! TX_INFO descriptor.
//!
//! Binds a set of field descriptors to one contract call and carries the
//! expected digest of those fields. Signed by the backend with the
//! `Calldata` key usage.
//!
//! # Security
//!
//! - Nothing in a `TxInfo` is acted upon before [`TxInfo::parse`] checked its
//!   signature envelope
//! - When no transaction context exists yet, the selector is cross-checked
//!   against the parked calldata

use alloc::string::String;
use alloc::vec::Vec;
use common::error::Error;
use common::types::{EthAddress, Hash256, KeyUsage, Selector, SELECTOR_LENGTH};

use crate::crypto::{Sha256Hasher, SignatureVerifier, ECDSA_SIGNATURE_MAX_LENGTH};
use crate::tlv::{Multiplicity, TagHandler, TlvParser, TlvRecord};
use crate::utils::format_date;

const TAG_VERSION: u8 = 0x00;
const TAG_CHAIN_ID: u8 = 0x01;
const TAG_CONTRACT_ADDR: u8 = 0x02;
const TAG_SELECTOR: u8 = 0x03;
const TAG_FIELDS_HASH: u8 = 0x04;
const TAG_OPERATION_TYPE: u8 = 0x05;
const TAG_CREATOR_NAME: u8 = 0x06;
const TAG_CREATOR_LEGAL_NAME: u8 = 0x07;
const TAG_CREATOR_URL: u8 = 0x08;
const TAG_CONTRACT_NAME: u8 = 0x09;
const TAG_DEPLOY_DATE: u8 = 0x0a;
const TAG_SIGNATURE: u8 = 0xff;

const OPERATION_TYPE_MAX_LENGTH: usize = 30;
const CREATOR_NAME_MAX_LENGTH: usize = 22;
const CREATOR_LEGAL_NAME_MAX_LENGTH: usize = 30;
const CREATOR_URL_MAX_LENGTH: usize = 26;
const CONTRACT_NAME_MAX_LENGTH: usize = 30;

const REQUIRED_TAGS_V1: [u8; 6] = [
    TAG_CHAIN_ID,
    TAG_CONTRACT_ADDR,
    TAG_SELECTOR,
    TAG_FIELDS_HASH,
    TAG_OPERATION_TYPE,
    TAG_SIGNATURE,
];

/// How the selector of an incoming TX_INFO must be checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorCheck {
    /// Transaction contexts exist, matching happens later.
    Deferred,
    /// No context yet: must equal the parked calldata selector.
    MustMatch(Selector),
    /// No context and no usable parked calldata.
    Unavailable,
}

/// Verified transaction descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TxInfo {
    pub version: u8,
    pub chain_id: u64,
    pub contract_addr: EthAddress,
    pub selector: Selector,
    /// Expected SHA3-256 of every field record of this call.
    pub fields_hash: Hash256,
    pub operation_type: String,
    pub creator_name: Option<String>,
    pub creator_legal_name: Option<String>,
    pub creator_url: Option<String>,
    pub contract_name: Option<String>,
    /// `YYYY-MM-DD`.
    pub deploy_date: Option<String>,
    pub signature: Vec<u8>,
}

struct TxInfoBuilder {
    info: TxInfo,
    hasher: Sha256Hasher,
    selector_check: SelectorCheck,
}

static TX_INFO_PARSER: TlvParser<TxInfoBuilder> = TlvParser {
    handlers: &[
        TagHandler { tag: TAG_VERSION, handler: handle_version, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_CHAIN_ID, handler: handle_chain_id, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_CONTRACT_ADDR, handler: handle_contract_addr, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_SELECTOR, handler: handle_selector, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_FIELDS_HASH, handler: handle_fields_hash, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_OPERATION_TYPE, handler: handle_operation_type, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_CREATOR_NAME, handler: handle_creator_name, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_CREATOR_LEGAL_NAME, handler: handle_creator_legal_name, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_CREATOR_URL, handler: handle_creator_url, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_CONTRACT_NAME, handler: handle_contract_name, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_DEPLOY_DATE, handler: handle_deploy_date, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_SIGNATURE, handler: handle_signature, multiplicity: Multiplicity::EnforceUnique },
    ],
    common: Some(hash_record),
};

/// Feeds every record but the signature into the envelope hash.
fn hash_record(r: &TlvRecord<'_>, b: &mut TxInfoBuilder) -> Result<(), Error> {
    if r.tag != TAG_SIGNATURE {
        b.hasher.update(r.raw);
    }
    Ok(())
}

fn handle_version(r: &TlvRecord<'_>, b: &mut TxInfoBuilder) -> Result<(), Error> {
    b.info.version = r.as_u8()?;
    Ok(())
}

fn handle_chain_id(r: &TlvRecord<'_>, b: &mut TxInfoBuilder) -> Result<(), Error> {
    b.info.chain_id = r.as_u64()?;
    Ok(())
}

fn handle_contract_addr(r: &TlvRecord<'_>, b: &mut TxInfoBuilder) -> Result<(), Error> {
    b.info.contract_addr = r.as_address()?;
    Ok(())
}

fn handle_selector(r: &TlvRecord<'_>, b: &mut TxInfoBuilder) -> Result<(), Error> {
    let mut selector = [0u8; SELECTOR_LENGTH];
    r.copy_left_padded(&mut selector)?;
    match b.selector_check {
        SelectorCheck::Deferred => {}
        SelectorCheck::MustMatch(expected) if expected == selector => {}
        SelectorCheck::MustMatch(_) => {
            log::error!("gtp: tx info selector mismatch");
            return Err(Error::ContextMismatch);
        }
        SelectorCheck::Unavailable => {
            log::warn!("gtp: tx info without calldata to match");
            return Err(Error::InvalidState);
        }
    }
    b.info.selector = selector;
    Ok(())
}

fn handle_fields_hash(r: &TlvRecord<'_>, b: &mut TxInfoBuilder) -> Result<(), Error> {
    r.copy_left_padded(&mut b.info.fields_hash)
}

fn handle_operation_type(r: &TlvRecord<'_>, b: &mut TxInfoBuilder) -> Result<(), Error> {
    b.info.operation_type = r.as_str_truncated(OPERATION_TYPE_MAX_LENGTH);
    Ok(())
}

fn handle_creator_name(r: &TlvRecord<'_>, b: &mut TxInfoBuilder) -> Result<(), Error> {
    b.info.creator_name = Some(r.as_str_truncated(CREATOR_NAME_MAX_LENGTH));
    Ok(())
}

fn handle_creator_legal_name(r: &TlvRecord<'_>, b: &mut TxInfoBuilder) -> Result<(), Error> {
    b.info.creator_legal_name = Some(r.as_str_truncated(CREATOR_LEGAL_NAME_MAX_LENGTH));
    Ok(())
}

fn handle_creator_url(r: &TlvRecord<'_>, b: &mut TxInfoBuilder) -> Result<(), Error> {
    b.info.creator_url = Some(r.as_str_truncated(CREATOR_URL_MAX_LENGTH));
    Ok(())
}

fn handle_contract_name(r: &TlvRecord<'_>, b: &mut TxInfoBuilder) -> Result<(), Error> {
    b.info.contract_name = Some(r.as_str_truncated(CONTRACT_NAME_MAX_LENGTH));
    Ok(())
}

fn handle_deploy_date(r: &TlvRecord<'_>, b: &mut TxInfoBuilder) -> Result<(), Error> {
    b.info.deploy_date = Some(format_date(r.as_u32()? as u64));
    Ok(())
}

fn handle_signature(r: &TlvRecord<'_>, b: &mut TxInfoBuilder) -> Result<(), Error> {
    if r.value.len() > ECDSA_SIGNATURE_MAX_LENGTH {
        return Err(Error::InvalidValue);
    }
    b.info.signature = r.value.to_vec();
    Ok(())
}

impl TxInfo {
    /// Parses a TX_INFO structure and verifies its signature envelope.
    pub fn parse<V: SignatureVerifier + ?Sized>(
        payload: &[u8],
        selector_check: SelectorCheck,
        verifier: &V,
    ) -> Result<Self, Error> {
        let mut builder = TxInfoBuilder {
            info: TxInfo::default(),
            hasher: Sha256Hasher::new(),
            selector_check,
        };
        let received = TX_INFO_PARSER.parse(payload, &mut builder)?;

        if !received.contains(TAG_VERSION) {
            log::warn!("gtp: tx info without version");
            return Err(Error::MissingField);
        }
        match builder.info.version {
            1 => {
                if !received.contains_all(&REQUIRED_TAGS_V1) {
                    log::warn!("gtp: tx info missing required field(s)");
                    return Err(Error::MissingField);
                }
            }
            v => {
                log::warn!("gtp: unsupported tx info version {}", v);
                return Err(Error::UnsupportedVersion);
            }
        }

        let hash = builder.hasher.finalize();
        if !verifier.verify(KeyUsage::Calldata, &hash, &builder.info.signature) {
            log::error!("gtp: tx info signature verification failed");
            return Err(Error::InvalidSignature);
        }
        Ok(builder.info)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::crypto::tests::{sign, test_verifier};
    use crate::tlv::TlvWriter;
    use hex_literal::hex;

    /// Signed TX_INFO for `(chain_id, contract, selector)` expecting `fields_hash`.
    pub(crate) fn signed_tx_info(
        chain_id: u64,
        contract: &EthAddress,
        selector: &Selector,
        fields_hash: &Hash256,
        operation_type: &str,
    ) -> Vec<u8> {
        let mut payload = TlvWriter::new()
            .u8(TAG_VERSION, 1)
            .u64(TAG_CHAIN_ID, chain_id)
            .record(TAG_CONTRACT_ADDR, contract)
            .record(TAG_SELECTOR, selector)
            .record(TAG_FIELDS_HASH, fields_hash)
            .record(TAG_OPERATION_TYPE, operation_type.as_bytes())
            .finish();
        let signature = sign(&payload);
        payload.extend_from_slice(&TlvWriter::new().record(TAG_SIGNATURE, &signature).finish());
        payload
    }

    const CONTRACT: EthAddress = hex!("2222222222222222222222222222222222222222");
    const SELECTOR: Selector = hex!("01020304");

    #[test]
    fn test_parse_signed_tx_info() {
        let payload = signed_tx_info(1, &CONTRACT, &SELECTOR, &[0xab; 32], "Swap");
        let info = TxInfo::parse(&payload, SelectorCheck::Deferred, &test_verifier()).unwrap();
        assert_eq!(info.chain_id, 1);
        assert_eq!(info.contract_addr, CONTRACT);
        assert_eq!(info.selector, SELECTOR);
        assert_eq!(info.fields_hash, [0xab; 32]);
        assert_eq!(info.operation_type, "Swap");
        assert_eq!(info.creator_name, None);
    }

    #[test]
    fn test_tampered_tx_info_is_rejected() {
        let mut payload = signed_tx_info(1, &CONTRACT, &SELECTOR, &[0xab; 32], "Swap");
        let hash_pos = payload.iter().position(|&b| b == 0xab).unwrap();
        payload[hash_pos] ^= 0x01;
        assert_eq!(
            TxInfo::parse(&payload, SelectorCheck::Deferred, &test_verifier()),
            Err(Error::InvalidSignature)
        );
    }

    #[test]
    fn test_selector_checked_against_parked_calldata() {
        let payload = signed_tx_info(1, &CONTRACT, &SELECTOR, &[0; 32], "Swap");
        let verifier = test_verifier();
        assert!(TxInfo::parse(&payload, SelectorCheck::MustMatch(SELECTOR), &verifier).is_ok());
        assert_eq!(
            TxInfo::parse(&payload, SelectorCheck::MustMatch(hex!("deadbeef")), &verifier),
            Err(Error::ContextMismatch)
        );
        assert_eq!(
            TxInfo::parse(&payload, SelectorCheck::Unavailable, &verifier),
            Err(Error::InvalidState)
        );
    }

    #[test]
    fn test_creator_metadata() {
        let mut payload = TlvWriter::new()
            .u8(TAG_VERSION, 1)
            .u64(TAG_CHAIN_ID, 1)
            .record(TAG_CONTRACT_ADDR, &CONTRACT)
            .record(TAG_SELECTOR, &SELECTOR)
            .record(TAG_FIELDS_HASH, &[0; 32])
            .record(TAG_OPERATION_TYPE, b"Supply")
            .record(TAG_CREATOR_NAME, b"A creator name that is far too long")
            .record(TAG_CREATOR_URL, b"example.org")
            .record(TAG_CONTRACT_NAME, b"Pool")
            .record(TAG_DEPLOY_DATE, &1_709_251_200u32.to_be_bytes())
            .finish();
        let signature = sign(&payload);
        payload.extend_from_slice(&TlvWriter::new().record(TAG_SIGNATURE, &signature).finish());

        let info = TxInfo::parse(&payload, SelectorCheck::Deferred, &test_verifier()).unwrap();
        assert_eq!(info.creator_name.as_deref(), Some("A creator name that is"));
        assert_eq!(info.creator_legal_name, None);
        assert_eq!(info.creator_url.as_deref(), Some("example.org"));
        assert_eq!(info.contract_name.as_deref(), Some("Pool"));
        assert_eq!(info.deploy_date.as_deref(), Some("2024-03-01"));
    }

    #[test]
    fn test_missing_fields_and_version() {
        let verifier = test_verifier();
        let no_version = TlvWriter::new().u64(TAG_CHAIN_ID, 1).finish();
        assert_eq!(
            TxInfo::parse(&no_version, SelectorCheck::Deferred, &verifier),
            Err(Error::MissingField)
        );
        let v2 = TlvWriter::new().u8(TAG_VERSION, 2).finish();
        assert_eq!(
            TxInfo::parse(&v2, SelectorCheck::Deferred, &verifier),
            Err(Error::UnsupportedVersion)
        );
        let incomplete = TlvWriter::new().u8(TAG_VERSION, 1).u64(TAG_CHAIN_ID, 1).finish();
        assert_eq!(
            TxInfo::parse(&incomplete, SelectorCheck::Deferred, &verifier),
            Err(Error::MissingField)
        );
    }
}
