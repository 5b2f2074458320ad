//! Common types and definitions for the Generic Transaction Parser.
//!
//! This crate provides the status-word taxonomy and the fixed-size types
//! shared by the descriptor engine and its external collaborators
//! (registries, signature oracle, UI).
//!
//! # Security Note
//!
//! Everything defined here travels across the trust boundary. Values of
//! these types coming from the host are untrusted until the engine has
//! verified the descriptor envelope they arrived in.

#![no_std]

extern crate alloc;

pub mod error;
pub mod types;

pub use error::Error;
