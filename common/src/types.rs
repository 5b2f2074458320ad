//! Core types shared by the descriptor engine and its collaborators.

use alloc::string::String;
use serde::{Deserialize, Serialize};

/// Ethereum address length in bytes.
pub const ADDRESS_LENGTH: usize = 20;
/// Function selector length in bytes.
pub const SELECTOR_LENGTH: usize = 4;
/// Length of a uint256 word in bytes.
pub const WORD_LENGTH: usize = 32;

/// Ethereum address (20 bytes).
pub type EthAddress = [u8; ADDRESS_LENGTH];

/// SHA-256 / SHA3-256 / Keccak256 digest (32 bytes).
pub type Hash256 = [u8; 32];

/// Function selector (4 bytes).
pub type Selector = [u8; SELECTOR_LENGTH];

/// Scope of the public key a descriptor signature is checked against.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum KeyUsage {
    /// Transaction descriptors (TxInfo, enum values).
    Calldata = 0x01,
    /// Trusted names and proxy information.
    TrustedName = 0x02,
    /// Network information.
    Network = 0x03,
}

/// Kind of entity a trusted name designates.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NameType {
    Account = 1,
    Contract = 2,
    NftCollection = 3,
    Token = 4,
    Wallet = 5,
    ContextAddress = 6,
}

impl NameType {
    /// Decodes a wire value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(NameType::Account),
            2 => Some(NameType::Contract),
            3 => Some(NameType::NftCollection),
            4 => Some(NameType::Token),
            5 => Some(NameType::Wallet),
            6 => Some(NameType::ContextAddress),
            _ => None,
        }
    }
}

/// Origin of a trusted name.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NameSource {
    Lab = 0,
    Cal = 1,
    Ens = 2,
    UnstoppableDomains = 3,
    Freename = 4,
    Dns = 5,
    DynamicResolver = 6,
    Mab = 7,
}

impl NameSource {
    /// Decodes a wire value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(NameSource::Lab),
            1 => Some(NameSource::Cal),
            2 => Some(NameSource::Ens),
            3 => Some(NameSource::UnstoppableDomains),
            4 => Some(NameSource::Freename),
            5 => Some(NameSource::Dns),
            6 => Some(NameSource::DynamicResolver),
            7 => Some(NameSource::Mab),
            _ => None,
        }
    }
}

/// ERC-20 token information from the asset registry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    /// Chain ID where the token is deployed.
    pub chain_id: u64,
    /// Token contract address.
    pub address: EthAddress,
    /// Token ticker symbol.
    pub ticker: String,
    /// Number of decimals.
    pub decimals: u8,
}

/// NFT collection information from the asset registry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NftInfo {
    /// Chain ID where the collection is deployed.
    pub chain_id: u64,
    /// Collection contract address.
    pub address: EthAddress,
    /// Collection name.
    pub collection_name: String,
}

/// A verified address to name binding.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TrustedName {
    /// Chain ID the binding applies to.
    pub chain_id: u64,
    /// Resolved address.
    pub address: EthAddress,
    /// Human-readable name.
    pub name: String,
    /// Kind of entity.
    pub name_type: NameType,
    /// Where the binding comes from.
    pub source: NameSource,
}
