//! Parser session.
//!
//! Owns every piece of state of one signing flow: the transaction contexts
//! with their calldata, the field table, the cached standalone descriptors,
//! the reassembly buffer and the calldata parked before the root context
//! exists. Command entry points return the status word for the host.

use common::error::{Error, SW_OK};
use common::types::{EthAddress, WORD_LENGTH};

use crate::calldata::Calldata;
use crate::config::{ParserConfig, SigningMode};
use crate::context::{DeviceKeys, DisplayContext};
use crate::crypto::SignatureVerifier;
use crate::field_table::{FieldEntry, FieldTable};
use crate::handlers;
use crate::parsing::tx_info::TxInfo;
use crate::state::SessionState;
use crate::tlv_apdu::Reassembly;
use crate::tx_ctx::TxContexts;

pub struct ParserSession<C: DisplayContext + DeviceKeys, V: SignatureVerifier> {
    pub(crate) registry: C,
    pub(crate) verifier: V,
    pub(crate) config: ParserConfig,
    pub(crate) state: SessionState,
    pub(crate) contexts: TxContexts,
    pub(crate) table: FieldTable,
    pub(crate) reassembly: Reassembly,
    /// Calldata received before the root context was created.
    pub(crate) parked_calldata: Option<Calldata>,
}

impl<C: DisplayContext + DeviceKeys, V: SignatureVerifier> ParserSession<C, V> {
    /// Creates an idle session with a freshly drawn challenge.
    pub fn new(registry: C, verifier: V, config: ParserConfig) -> Self {
        let mut state = SessionState::new();
        state.roll_challenge(&registry);
        Self {
            contexts: TxContexts::new(&config),
            table: FieldTable::new(config.max_fields),
            reassembly: Reassembly::new(config.max_payload_size),
            state,
            parked_calldata: None,
            registry,
            verifier,
            config,
        }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn registry(&self) -> &C {
        &self.registry
    }

    /// Rows built so far.
    pub fn entries(&self) -> &[FieldEntry] {
        self.table.entries()
    }

    pub fn field_table(&self) -> &FieldTable {
        &self.table
    }

    /// Number of transaction contexts still waiting for their fields.
    pub fn pending_contexts(&self) -> usize {
        self.contexts.count()
    }

    /// Descriptor of the root transaction, once received.
    pub fn root_tx_info(&self) -> Option<&TxInfo> {
        self.contexts.root().and_then(|ctx| ctx.tx_info())
    }

    /// Anti-replay challenge PROXY_INFO descriptors must carry.
    pub fn challenge(&self) -> u32 {
        self.state.challenge()
    }

    /// Draws a fresh anti-replay challenge.
    pub fn roll_challenge(&mut self) {
        self.state.roll_challenge(&self.registry);
    }

    /// Creates the root transaction context, sent from the device address.
    ///
    /// Without an explicit `calldata`, the parked one (if any) is used. In
    /// Transaction mode the field table starts over.
    pub fn begin_transaction(
        &mut self,
        to: Option<EthAddress>,
        amount: Option<[u8; WORD_LENGTH]>,
        chain_id: u64,
        calldata: Option<Calldata>,
    ) -> Result<(), Error> {
        if !self.contexts.is_empty() {
            log::warn!("gtp: transaction already in progress");
            return Err(Error::InvalidState);
        }
        let calldata = calldata.or_else(|| self.parked_calldata.take());
        self.create_root(calldata, to, amount, chain_id)
    }

    pub(crate) fn create_root(
        &mut self,
        calldata: Option<Calldata>,
        to: Option<EthAddress>,
        amount: Option<[u8; WORD_LENGTH]>,
        chain_id: u64,
    ) -> Result<(), Error> {
        self.contexts
            .push(&self.registry, calldata, None, to, amount, Some(chain_id))?;
        self.contexts.select_root()?;
        if self.config.mode == SigningMode::Transaction {
            self.table.reset();
        }
        Ok(())
    }

    /// Whether every field announced for the transaction has been received
    /// and matches its signed hash, with no nested call left pending.
    pub fn ready_to_sign(&self) -> bool {
        match self.config.mode {
            SigningMode::Transaction => {
                self.contexts.count() == 1
                    && self.contexts.is_root()
                    && self.contexts.validate_instruction_hash()
            }
            SigningMode::TypedData => self.contexts.is_empty() && !self.table.is_empty(),
        }
    }

    /// Stores calldata to be attached to the root context once it exists.
    pub fn park_calldata(&mut self, calldata: Calldata) {
        self.parked_calldata = Some(calldata);
    }

    /// Streams bytes into the root calldata, or into the parked one if the
    /// root context does not exist yet.
    pub fn calldata_append(&mut self, data: &[u8]) -> Result<(), Error> {
        let calldata = if self.contexts.is_empty() {
            self.parked_calldata.as_mut()
        } else {
            self.contexts.root_calldata_mut()
        };
        let Some(calldata) = calldata else {
            log::warn!("gtp: no calldata to append to");
            return Err(Error::InvalidState);
        };
        calldata.append(data)
    }

    /// Wipes every live structure of the flow.
    pub fn gcs_cleanup(&mut self) {
        self.contexts.clear();
        self.table.reset();
        self.reassembly.reset();
        self.parked_calldata = None;
        self.state.clear();
        log::debug!("gtp: session cleaned up");
    }

    /// FIELD command.
    pub fn handle_field(&mut self, p1: u8, data: &[u8]) -> u16 {
        if self.contexts.current().and_then(|ctx| ctx.tx_info()).is_none() {
            log::warn!("gtp: field received without a transaction info");
            self.gcs_cleanup();
            return Error::CommandNotAllowed.status_word();
        }
        self.dispatch(p1, data, handlers::handle_field)
    }

    /// TX_INFO command.
    pub fn handle_tx_info(&mut self, p1: u8, data: &[u8]) -> u16 {
        self.dispatch(p1, data, handlers::handle_tx_info)
    }

    /// PROXY_INFO command.
    pub fn handle_proxy_info(&mut self, p1: u8, data: &[u8]) -> u16 {
        self.dispatch(p1, data, handlers::handle_proxy_info)
    }

    /// ENUM_VALUE command.
    pub fn handle_enum_value(&mut self, p1: u8, data: &[u8]) -> u16 {
        self.dispatch(p1, data, handlers::handle_enum_value)
    }

    /// Reassembles the chunk, runs `handler` on a complete payload and maps
    /// the outcome to a status word.
    fn dispatch(
        &mut self,
        p1: u8,
        data: &[u8],
        handler: fn(&mut Self, &[u8]) -> Result<(), Error>,
    ) -> u16 {
        let result = match self.reassembly.feed(p1, data) {
            Ok(Some(payload)) => handler(self, &payload),
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => SW_OK,
            Err(e) => {
                if e.is_rejection() {
                    log::warn!("gtp: transaction rejected: {}", e);
                } else if e.is_authenticity_failure() {
                    log::error!("gtp: descriptor refused: {}", e);
                } else {
                    log::warn!("gtp: command failed: {}", e);
                }
                self.gcs_cleanup();
                e.status_word()
            }
        }
    }
}
