//! PROXY_INFO descriptor.
//!
//! Binds a proxy contract to the implementation it delegates to, so that a
//! TX_INFO written for the implementation can be matched against a call
//! made to the proxy.
//!
//! # Security
//!
//! - Signed with the `TrustedName` key usage
//! - Carries the device anti-replay challenge, which must match the current
//!   one

use alloc::vec::Vec;
use common::error::Error;
use common::types::{EthAddress, KeyUsage, Selector, SELECTOR_LENGTH};

use crate::crypto::{Sha256Hasher, SignatureVerifier, ECDSA_SIGNATURE_MAX_LENGTH};
use crate::tlv::{Multiplicity, TagHandler, TlvParser, TlvRecord};

const TAG_STRUCT_TYPE: u8 = 0x01;
const TAG_STRUCT_VERSION: u8 = 0x02;
const TAG_CHALLENGE: u8 = 0x12;
const TAG_SIGNATURE: u8 = 0x15;
const TAG_ADDRESS: u8 = 0x22;
const TAG_CHAIN_ID: u8 = 0x23;
const TAG_SELECTOR: u8 = 0x41;
const TAG_IMPLEM_ADDRESS: u8 = 0x42;
const TAG_DELEGATION_TYPE: u8 = 0x43;

const STRUCT_TYPE_PROXY_INFO: u8 = 0x26;
const STRUCT_VERSION: u8 = 0x01;

const REQUIRED_TAGS: [u8; 8] = [
    TAG_STRUCT_TYPE,
    TAG_STRUCT_VERSION,
    TAG_CHALLENGE,
    TAG_ADDRESS,
    TAG_CHAIN_ID,
    TAG_IMPLEM_ADDRESS,
    TAG_DELEGATION_TYPE,
    TAG_SIGNATURE,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DelegationType {
    #[default]
    Proxy = 0,
    IssuedFromFactory = 1,
    Delegator = 2,
}

impl DelegationType {
    fn from_u8(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(DelegationType::Proxy),
            1 => Ok(DelegationType::IssuedFromFactory),
            2 => Ok(DelegationType::Delegator),
            _ => Err(Error::InvalidValue),
        }
    }
}

/// Verified proxy to implementation binding.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProxyInfo {
    pub chain_id: u64,
    /// Proxy address.
    pub address: EthAddress,
    /// Restricts the binding to one function when present.
    pub selector: Option<Selector>,
    pub implem_address: EthAddress,
    pub delegation_type: DelegationType,
}

impl ProxyInfo {
    /// Implementation address of `address` for a call to `selector`, if
    /// this binding covers it.
    pub fn implementation_of(
        &self,
        chain_id: u64,
        address: &EthAddress,
        selector: &Selector,
    ) -> Option<EthAddress> {
        if chain_id != self.chain_id || address != &self.address {
            return None;
        }
        match &self.selector {
            Some(s) if s != selector => None,
            _ => Some(self.implem_address),
        }
    }
}

struct ProxyInfoBuilder {
    info: ProxyInfo,
    hasher: Sha256Hasher,
    expected_challenge: u32,
    signature: Vec<u8>,
}

static PROXY_INFO_PARSER: TlvParser<ProxyInfoBuilder> = TlvParser {
    handlers: &[
        TagHandler { tag: TAG_STRUCT_TYPE, handler: handle_struct_type, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_STRUCT_VERSION, handler: handle_struct_version, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_CHALLENGE, handler: handle_challenge, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_ADDRESS, handler: handle_address, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_CHAIN_ID, handler: handle_chain_id, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_SELECTOR, handler: handle_selector, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_IMPLEM_ADDRESS, handler: handle_implem_address, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_DELEGATION_TYPE, handler: handle_delegation_type, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_SIGNATURE, handler: handle_signature, multiplicity: Multiplicity::EnforceUnique },
    ],
    common: Some(hash_record),
};

fn hash_record(r: &TlvRecord<'_>, b: &mut ProxyInfoBuilder) -> Result<(), Error> {
    if r.tag != TAG_SIGNATURE {
        b.hasher.update(r.raw);
    }
    Ok(())
}

fn handle_struct_type(r: &TlvRecord<'_>, _: &mut ProxyInfoBuilder) -> Result<(), Error> {
    if r.as_u8()? != STRUCT_TYPE_PROXY_INFO {
        return Err(Error::InvalidValue);
    }
    Ok(())
}

fn handle_struct_version(r: &TlvRecord<'_>, _: &mut ProxyInfoBuilder) -> Result<(), Error> {
    if r.as_u8()? != STRUCT_VERSION {
        return Err(Error::UnsupportedVersion);
    }
    Ok(())
}

fn handle_challenge(r: &TlvRecord<'_>, b: &mut ProxyInfoBuilder) -> Result<(), Error> {
    if r.as_u32()? != b.expected_challenge {
        log::warn!("gtp: proxy info challenge mismatch");
        return Err(Error::InvalidValue);
    }
    Ok(())
}

fn handle_address(r: &TlvRecord<'_>, b: &mut ProxyInfoBuilder) -> Result<(), Error> {
    b.info.address = r.as_address()?;
    Ok(())
}

fn handle_chain_id(r: &TlvRecord<'_>, b: &mut ProxyInfoBuilder) -> Result<(), Error> {
    b.info.chain_id = r.as_u64()?;
    Ok(())
}

fn handle_selector(r: &TlvRecord<'_>, b: &mut ProxyInfoBuilder) -> Result<(), Error> {
    let mut selector = [0u8; SELECTOR_LENGTH];
    r.copy_left_padded(&mut selector)?;
    b.info.selector = Some(selector);
    Ok(())
}

fn handle_implem_address(r: &TlvRecord<'_>, b: &mut ProxyInfoBuilder) -> Result<(), Error> {
    b.info.implem_address = r.as_address()?;
    Ok(())
}

fn handle_delegation_type(r: &TlvRecord<'_>, b: &mut ProxyInfoBuilder) -> Result<(), Error> {
    b.info.delegation_type = DelegationType::from_u8(r.as_u8()?)?;
    Ok(())
}

fn handle_signature(r: &TlvRecord<'_>, b: &mut ProxyInfoBuilder) -> Result<(), Error> {
    if r.value.len() > ECDSA_SIGNATURE_MAX_LENGTH {
        return Err(Error::InvalidValue);
    }
    b.signature = r.value.to_vec();
    Ok(())
}

impl ProxyInfo {
    /// Parses a PROXY_INFO structure bound to `challenge` and verifies its
    /// signature envelope.
    pub fn parse<V: SignatureVerifier + ?Sized>(
        payload: &[u8],
        challenge: u32,
        verifier: &V,
    ) -> Result<Self, Error> {
        let mut builder = ProxyInfoBuilder {
            info: ProxyInfo::default(),
            hasher: Sha256Hasher::new(),
            expected_challenge: challenge,
            signature: Vec::new(),
        };
        let received = PROXY_INFO_PARSER.parse(payload, &mut builder)?;
        if !received.contains_all(&REQUIRED_TAGS) {
            log::warn!("gtp: proxy info missing required field(s)");
            return Err(Error::MissingField);
        }
        let hash = builder.hasher.finalize();
        if !verifier.verify(KeyUsage::TrustedName, &hash, &builder.signature) {
            log::error!("gtp: proxy info signature verification failed");
            return Err(Error::InvalidSignature);
        }
        log::info!(
            "gtp: proxy 0x{} -> implementation 0x{} (chain {})",
            hex::encode(builder.info.address),
            hex::encode(builder.info.implem_address),
            builder.info.chain_id
        );
        Ok(builder.info)
    }
}
