//! Descriptor structures and their formatting.
//!
//! - [`data_path`]: calldata walking programs
//! - [`value`]: typed value sources and their resolution
//! - [`field`]: one displayed field and its parameter
//! - [`params`]: the twelve parameter kinds
//! - [`tx_info`]: the signed per-call descriptor
//!
//! Formatters share a [`FormatEnv`], the borrowed slice of the session they
//! are allowed to touch.

pub mod data_path;
pub mod field;
pub mod params;
pub mod tx_info;
pub mod value;

use alloc::string::String;
use common::error::Error;

use crate::config::ParserConfig;
use crate::context::{native_ticker, DeviceKeys, DisplayContext};
use crate::field_table::{ExtraData, FieldTable};
use crate::state::SessionState;
use crate::tx_ctx::TxContexts;
use field::ParamType;
use tx_info::TxInfo;
use value::{Value, ValueCollection};

/// Session state reachable from a formatter.
pub struct FormatEnv<'a, C: DisplayContext + DeviceKeys + ?Sized> {
    pub registry: &'a C,
    pub state: &'a SessionState,
    pub contexts: &'a mut TxContexts,
    pub table: &'a mut FieldTable,
    pub config: &'a ParserConfig,
}

impl<C: DisplayContext + DeviceKeys + ?Sized> FormatEnv<'_, C> {
    /// Resolves `value` against the current transaction context.
    pub fn resolve(&self, value: &Value) -> Result<ValueCollection, Error> {
        value.resolve(self.contexts)
    }

    /// Descriptor of the current transaction context.
    pub fn tx_info(&self) -> Result<&TxInfo, Error> {
        self.contexts
            .current()
            .and_then(|ctx| ctx.tx_info())
            .ok_or(Error::InvalidState)
    }

    /// Native ticker of `chain_id`.
    pub fn native_ticker(&self, chain_id: u64) -> String {
        native_ticker(self.registry, self.config, chain_id)
    }

    /// Appends a row to the field table.
    pub fn add_field(
        &mut self,
        param_type: ParamType,
        key: &str,
        value: String,
        extra: Option<ExtraData>,
    ) -> Result<(), Error> {
        self.contexts.add_field(self.table, param_type, key, value, extra)
    }
}
