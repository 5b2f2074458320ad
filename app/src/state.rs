//! Session state shared across descriptors.
//!
//! Holds the verified standalone descriptors (proxy bindings and enum value
//! names) and the anti-replay challenge.
//!
//! # Security
//!
//! - Only descriptors whose signature envelope was verified are stored
//! - Everything is wiped on cleanup

use alloc::vec::Vec;
use common::types::{EthAddress, Selector};

use crate::context::DeviceKeys;
use crate::descriptors::{EnumValue, ProxyInfo};

/// Maximum number of cached proxy bindings.
pub const MAX_PROXY_CACHE: usize = 4;
/// Maximum number of cached enum value names.
pub const MAX_ENUM_CACHE: usize = 32;

#[derive(Debug, Default)]
pub struct SessionState {
    proxy_cache: Vec<ProxyInfo>,
    enum_cache: Vec<EnumValue>,
    challenge: u32,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current anti-replay challenge.
    pub fn challenge(&self) -> u32 {
        self.challenge
    }

    /// Draws a new challenge, invalidating the previous one.
    pub fn roll_challenge<K: DeviceKeys + ?Sized>(&mut self, keys: &K) {
        self.challenge = keys.random_u32();
    }

    /// Caches a verified proxy binding.
    ///
    /// A binding for the same proxy and chain is replaced, otherwise the
    /// oldest one is evicted when the cache is full.
    pub fn cache_proxy_info(&mut self, info: ProxyInfo) {
        if let Some(cached) = self
            .proxy_cache
            .iter_mut()
            .find(|p| p.chain_id == info.chain_id && p.address == info.address)
        {
            *cached = info;
            return;
        }
        if self.proxy_cache.len() >= MAX_PROXY_CACHE {
            self.proxy_cache.remove(0);
        }
        self.proxy_cache.push(info);
    }

    /// Implementation behind `address` for a call to `selector`, if a
    /// cached proxy binding covers it.
    pub fn implementation_of(
        &self,
        chain_id: u64,
        address: &EthAddress,
        selector: &Selector,
    ) -> Option<EthAddress> {
        self.proxy_cache
            .iter()
            .find_map(|p| p.implementation_of(chain_id, address, selector))
    }

    /// Caches a verified enum value name, evicting the oldest entry when
    /// full.
    pub fn cache_enum_value(&mut self, entry: EnumValue) {
        if self.enum_cache.len() >= MAX_ENUM_CACHE {
            self.enum_cache.remove(0);
        }
        self.enum_cache.push(entry);
    }

    /// Looks up the name of `value` for enum `id` of a contract function.
    ///
    /// `contract` is resolved through the proxy bindings first.
    pub fn lookup_enum_value(
        &self,
        chain_id: u64,
        contract: &EthAddress,
        selector: &Selector,
        id: u8,
        value: u8,
    ) -> Option<&EnumValue> {
        let contract = self
            .implementation_of(chain_id, contract, selector)
            .unwrap_or(*contract);
        self.enum_cache.iter().find(|e| {
            e.chain_id == chain_id
                && e.contract_addr == contract
                && &e.selector == selector
                && e.id == id
                && e.value == value
        })
    }

    /// Drops every cached descriptor. The challenge is kept.
    pub fn clear(&mut self) {
        self.proxy_cache.clear();
        self.enum_cache.clear();
    }
}
