//! Hashing primitives and the descriptor signature oracle.
//!
//! This module provides:
//! - Keccak256 (address checksums)
//! - SHA-256 (descriptor signature envelopes)
//! - SHA3-256 (per-transaction field hash chain)
//! - [`SignatureVerifier`], the "verify S over H with usage U" oracle, and
//!   its secp256k1 implementation [`K256Verifier`]
//!
//! # Security
//!
//! - tiny-keccak and sha2 have data-independent memory access patterns
//! - Only DER-encoded, low-S signatures are accepted

use alloc::vec::Vec;
use common::error::Error;
use common::types::{Hash256, KeyUsage};
use k256::ecdsa::{signature::hazmat::PrehashVerifier, Signature, VerifyingKey};
use sha2::{Digest, Sha256};
use tiny_keccak::{Hasher as KeccakHasher, Keccak, Sha3};

/// Shortest DER signature accepted.
pub const ECDSA_SIGNATURE_MIN_LENGTH: usize = 8;
/// Longest DER signature accepted.
pub const ECDSA_SIGNATURE_MAX_LENGTH: usize = 72;

/// Keccak256 hash function as used by Ethereum.
pub fn keccak256(data: &[u8]) -> Hash256 {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// One-shot SHA-256.
pub fn sha256(data: &[u8]) -> Hash256 {
    Sha256Hasher::new().chain(data).finalize()
}

/// Streaming SHA-256 used for signature envelopes.
///
/// Every record of a signed descriptor except the signature itself is fed
/// in wire order.
#[derive(Clone, Default)]
pub struct Sha256Hasher {
    inner: Sha256,
}

impl Sha256Hasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    fn chain(mut self, data: &[u8]) -> Self {
        self.update(data);
        self
    }

    pub fn finalize(self) -> Hash256 {
        self.inner.finalize().into()
    }
}

/// Streaming SHA3-256 accumulating the field records of one transaction.
///
/// `peek` computes the digest of what was fed so far without consuming the
/// accumulator.
#[derive(Clone)]
pub struct FieldsHasher {
    inner: Sha3,
}

impl FieldsHasher {
    pub fn new() -> Self {
        Self { inner: Sha3::v256() }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Digest of the data fed so far, leaving the accumulator untouched.
    pub fn peek(&self) -> Hash256 {
        let mut output = [0u8; 32];
        self.inner.clone().finalize(&mut output);
        output
    }

    /// Digest of an empty accumulator.
    pub fn empty_digest() -> Hash256 {
        Self::new().peek()
    }
}

impl Default for FieldsHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Descriptor signature oracle.
pub trait SignatureVerifier {
    /// Returns true if `signature` is valid over `hash` for a key trusted
    /// for `usage`.
    fn verify(&self, usage: KeyUsage, hash: &Hash256, signature: &[u8]) -> bool;
}

/// secp256k1 verifier holding the trusted public keys per usage.
#[derive(Clone, Default)]
pub struct K256Verifier {
    keys: Vec<(KeyUsage, VerifyingKey)>,
}

impl K256Verifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trusts `key` for `usage`.
    pub fn with_key(mut self, usage: KeyUsage, key: VerifyingKey) -> Self {
        self.keys.push((usage, key));
        self
    }

    /// Trusts a SEC1-encoded public key for `usage`.
    pub fn add_sec1_key(&mut self, usage: KeyUsage, sec1: &[u8]) -> Result<(), Error> {
        let key = VerifyingKey::from_sec1_bytes(sec1).map_err(|_| Error::InvalidValue)?;
        self.keys.push((usage, key));
        Ok(())
    }
}

impl SignatureVerifier for K256Verifier {
    fn verify(&self, usage: KeyUsage, hash: &Hash256, signature: &[u8]) -> bool {
        if !(ECDSA_SIGNATURE_MIN_LENGTH..=ECDSA_SIGNATURE_MAX_LENGTH).contains(&signature.len()) {
            return false;
        }
        let Ok(signature) = Signature::from_der(signature) else {
            return false;
        };
        self.keys
            .iter()
            .filter(|(u, _)| *u == usage)
            .any(|(_, key)| key.verify_prehash(hash, &signature).is_ok())
    }
}
