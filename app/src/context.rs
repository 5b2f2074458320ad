//! External collaborators of the engine.
//!
//! Registries and the device key are consulted through these traits so
//! the engine never owns their storage. Implementations must only return
//! data that was verified on their side.

use alloc::string::String;
use common::error::Error;
use common::types::{EthAddress, NameSource, NameType, NftInfo, TokenInfo, TrustedName};

use crate::config::ParserConfig;

/// Device identity.
pub trait DeviceKeys {
    /// Address derived from the signing key of the current flow.
    fn wallet_address(&self) -> Result<EthAddress, Error>;

    /// Fresh random value for anti-replay challenges.
    fn random_u32(&self) -> u32;
}

/// Name and metadata lookups (tokens, NFTs, trusted names, networks).
pub trait DisplayContext {
    /// Token ticker and decimals by contract address.
    fn token_info(&self, chain_id: u64, address: &EthAddress) -> Option<TokenInfo>;

    /// NFT collection metadata by contract address.
    fn nft_info(&self, chain_id: u64, address: &EthAddress) -> Option<NftInfo>;

    /// Trusted name of `address`, restricted to the given types and sources.
    ///
    /// Empty filters match anything.
    fn trusted_name(
        &self,
        types: &[NameType],
        sources: &[NameSource],
        chain_id: u64,
        address: &EthAddress,
    ) -> Option<TrustedName>;

    /// Human-readable network name.
    fn network_name(&self, chain_id: u64) -> Option<String>;

    /// Native currency ticker of a network.
    fn native_ticker(&self, chain_id: u64) -> Option<String>;
}

/// Native currency ticker of `chain_id`, falling back to the configured one.
pub fn native_ticker<C: DisplayContext + ?Sized>(
    registry: &C,
    config: &ParserConfig,
    chain_id: u64,
) -> String {
    registry
        .native_ticker(chain_id)
        .unwrap_or_else(|| config.native_ticker.clone())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloc::vec::Vec;
    use core::cell::Cell;
    use hex_literal::hex;

    /// In-memory registries and device.
    pub(crate) struct MockRegistry {
        pub wallet: EthAddress,
        tokens: Vec<TokenInfo>,
        nfts: Vec<NftInfo>,
        names: Vec<TrustedName>,
        networks: Vec<(u64, String, String)>,
        next_random: Cell<u32>,
    }

    impl Default for MockRegistry {
        fn default() -> Self {
            Self {
                wallet: hex!("dddddddddddddddddddddddddddddddddddddddd"),
                tokens: Vec::new(),
                nfts: Vec::new(),
                names: Vec::new(),
                networks: Vec::new(),
                next_random: Cell::new(0x0bad_cafe),
            }
        }
    }

    impl MockRegistry {
        pub(crate) fn with_token(mut self, chain_id: u64, address: EthAddress, ticker: &str, decimals: u8) -> Self {
            self.tokens.push(TokenInfo {
                chain_id,
                address,
                ticker: String::from(ticker),
                decimals,
            });
            self
        }

        pub(crate) fn with_nft(mut self, chain_id: u64, address: EthAddress, name: &str) -> Self {
            self.nfts.push(NftInfo {
                chain_id,
                address,
                collection_name: String::from(name),
            });
            self
        }

        pub(crate) fn with_trusted_name(mut self, name: TrustedName) -> Self {
            self.names.push(name);
            self
        }

        pub(crate) fn with_network(mut self, chain_id: u64, name: &str, ticker: &str) -> Self {
            self.networks
                .push((chain_id, String::from(name), String::from(ticker)));
            self
        }
    }

    impl DeviceKeys for MockRegistry {
        fn wallet_address(&self) -> Result<EthAddress, Error> {
            Ok(self.wallet)
        }

        fn random_u32(&self) -> u32 {
            let value = self.next_random.get();
            self.next_random.set(value.wrapping_add(1));
            value
        }
    }

    impl DisplayContext for MockRegistry {
        fn token_info(&self, chain_id: u64, address: &EthAddress) -> Option<TokenInfo> {
            self.tokens
                .iter()
                .find(|t| t.chain_id == chain_id && &t.address == address)
                .cloned()
        }

        fn nft_info(&self, chain_id: u64, address: &EthAddress) -> Option<NftInfo> {
            self.nfts
                .iter()
                .find(|n| n.chain_id == chain_id && &n.address == address)
                .cloned()
        }

        fn trusted_name(
            &self,
            types: &[NameType],
            sources: &[NameSource],
            chain_id: u64,
            address: &EthAddress,
        ) -> Option<TrustedName> {
            self.names
                .iter()
                .find(|n| {
                    n.chain_id == chain_id
                        && &n.address == address
                        && (types.is_empty() || types.contains(&n.name_type))
                        && (sources.is_empty() || sources.contains(&n.source))
                })
                .cloned()
        }

        fn network_name(&self, chain_id: u64) -> Option<String> {
            self.networks
                .iter()
                .find(|(id, _, _)| *id == chain_id)
                .map(|(_, name, _)| name.clone())
        }

        fn native_ticker(&self, chain_id: u64) -> Option<String> {
            self.networks
                .iter()
                .find(|(id, _, _)| *id == chain_id)
                .map(|(_, _, ticker)| ticker.clone())
        }
    }

    #[test]
    fn test_native_ticker_fallback() {
        let registry = MockRegistry::default().with_network(137, "Polygon", "POL");
        let config = ParserConfig::default();
        assert_eq!(native_ticker(&registry, &config, 137), "POL");
        assert_eq!(native_ticker(&registry, &config, 1), "ETH");
    }
}
