//! Field table.
//!
//! Flat, ordered list of the `(key, value)` rows built while formatting a
//! transaction, consumed by the review UI. Rows can open or close an
//! "intent", the group of rows describing one call of a batch.

use alloc::string::String;
use alloc::vec::Vec;
use common::error::Error;
use common::types::{NftInfo, TokenInfo, TrustedName};

use crate::parsing::field::ParamType;

/// Registry record a row was resolved from, kept for richer UIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtraData {
    Token(TokenInfo),
    Nft(NftInfo),
    TrustedName(TrustedName),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldEntry {
    pub param_type: ParamType,
    pub key: String,
    pub value: String,
    /// First row of an intent.
    pub start_intent: bool,
    /// Last row of an intent.
    pub end_intent: bool,
    pub extra: Option<ExtraData>,
}

/// Bounded list of displayed rows.
#[derive(Debug, Clone)]
pub struct FieldTable {
    entries: Vec<FieldEntry>,
    max_fields: usize,
}

impl FieldTable {
    pub fn new(max_fields: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_fields,
        }
    }

    /// Appends a row.
    ///
    /// `ParamType::Intent` rows are stored as `Raw` and flagged as the start
    /// of an intent; `end_intent` is ignored for them.
    pub fn add(
        &mut self,
        param_type: ParamType,
        key: &str,
        value: String,
        extra: Option<ExtraData>,
        end_intent: bool,
    ) -> Result<(), Error> {
        if self.entries.len() >= self.max_fields {
            log::warn!("gtp: field table full ({} rows)", self.max_fields);
            return Err(Error::OutOfMemory);
        }
        log::debug!("gtp: >>> \"{}\": \"{}\"", key, value);
        let entry = if param_type == ParamType::Intent {
            log::debug!("gtp: [Intent] Start");
            FieldEntry {
                param_type: ParamType::Raw,
                key: String::from(key),
                value,
                start_intent: true,
                end_intent: false,
                extra,
            }
        } else {
            if end_intent {
                log::debug!("gtp: [Intent] End");
            }
            FieldEntry {
                param_type,
                key: String::from(key),
                value,
                start_intent: false,
                end_intent,
                extra,
            }
        };
        self.entries.push(entry);
        Ok(())
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[FieldEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&FieldEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
