//! Transaction-context stack.
//!
//! Every call being reviewed (the signed transaction itself, then each call
//! it triggers through a nested Calldata field) gets a [`TxContext`]. They
//! live in an arena with stable slot indices; the list order is the slot
//! order and removed contexts leave an empty slot behind.
//!
//! Lifecycle of a context: created with its calldata, a TX_INFO is attached,
//! field records are hashed into it until the digest matches the signed
//! one, then it is popped. Contexts without calldata (plain transfers or
//! no-op legs of a batch) never receive a TX_INFO and are flushed directly
//! into the field table.

use alloc::string::String;
use alloc::vec::Vec;
use common::error::Error;
use common::types::{EthAddress, NameSource, NameType, Selector, WORD_LENGTH};

use crate::calldata::Calldata;
use crate::config::{ParserConfig, SigningMode};
use crate::context::{native_ticker, DeviceKeys, DisplayContext};
use crate::crypto::FieldsHasher;
use crate::field_table::{ExtraData, FieldTable};
use crate::parsing::field::ParamType;
use crate::parsing::tx_info::TxInfo;
use crate::state::SessionState;
use crate::utils::{format_address_checksummed, format_token_amount, WEI_DECIMALS};

const INTENT_KEY: &str = "Transaction type";

/// One call under review.
#[derive(Clone)]
pub struct TxContext {
    tx_info: Option<TxInfo>,
    calldata: Option<Calldata>,
    from: EthAddress,
    to: Option<EthAddress>,
    amount: Option<[u8; WORD_LENGTH]>,
    chain_id: u64,
    fields_hasher: FieldsHasher,
}

impl TxContext {
    pub fn tx_info(&self) -> Option<&TxInfo> {
        self.tx_info.as_ref()
    }

    pub fn calldata(&self) -> Option<&Calldata> {
        self.calldata.as_ref()
    }

    pub fn from(&self) -> &EthAddress {
        &self.from
    }

    pub fn to(&self) -> Option<&EthAddress> {
        self.to.as_ref()
    }

    pub fn amount(&self) -> Option<[u8; WORD_LENGTH]> {
        self.amount
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Whether every field record of this call has been received.
    fn is_verified(&self) -> bool {
        self.tx_info
            .as_ref()
            .is_some_and(|info| self.fields_hasher.peek() == info.fields_hash)
    }

    fn selector(&self) -> Option<&Selector> {
        self.calldata.as_ref().and_then(|c| c.get_selector().ok())
    }
}

/// Arena of the contexts of one signing flow.
pub struct TxContexts {
    slots: Vec<Option<TxContext>>,
    current: Option<usize>,
    mode: SigningMode,
    max_contexts: usize,
    /// Number of transactions announced by batch Calldata fields.
    pub batch_nb_tx: usize,
    /// Size of the batch the last Calldata field pushed.
    pub current_batch_size: usize,
}

impl TxContexts {
    pub fn new(config: &ParserConfig) -> Self {
        Self {
            slots: Vec::new(),
            current: None,
            mode: config.mode,
            max_contexts: config.max_contexts,
            batch_nb_tx: 0,
            current_batch_size: 0,
        }
    }

    /// Number of live contexts.
    pub fn count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    fn root_index(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_some)
    }

    fn last_index(&self) -> Option<usize> {
        self.slots.iter().rposition(Option::is_some)
    }

    fn prev_index(&self, index: usize) -> Option<usize> {
        self.slots[..index].iter().rposition(Option::is_some)
    }

    fn next_index(&self, index: usize) -> Option<usize> {
        let start = index + 1;
        self.slots
            .get(start..)?
            .iter()
            .position(Option::is_some)
            .map(|i| i + start)
    }

    pub fn current(&self) -> Option<&TxContext> {
        self.current.and_then(|i| self.slots.get(i)?.as_ref())
    }

    fn current_mut(&mut self) -> Option<&mut TxContext> {
        self.current.and_then(|i| self.slots.get_mut(i)?.as_mut())
    }

    pub fn root(&self) -> Option<&TxContext> {
        self.root_index().and_then(|i| self.slots[i].as_ref())
    }

    /// Calldata of the root context, for streaming.
    pub fn root_calldata_mut(&mut self) -> Option<&mut Calldata> {
        let index = self.root_index()?;
        self.slots[index].as_mut()?.calldata.as_mut()
    }

    /// Whether the current context is the root one.
    pub fn is_root(&self) -> bool {
        self.current.is_some() && self.current == self.root_index()
    }

    /// Whether the current context must be hash-checked on its own.
    fn is_hashed(&self) -> bool {
        self.mode == SigningMode::TypedData || !self.is_root()
    }

    /// Appends a new context to the list, without making it current.
    ///
    /// The first context sends from the device address. Later ones inherit
    /// `from` and `chain_id` from the last context of the list. Explicit
    /// arguments override these defaults.
    pub fn push<K: DeviceKeys + ?Sized>(
        &mut self,
        keys: &K,
        calldata: Option<Calldata>,
        from: Option<EthAddress>,
        to: Option<EthAddress>,
        amount: Option<[u8; WORD_LENGTH]>,
        chain_id: Option<u64>,
    ) -> Result<usize, Error> {
        if self.count() >= self.max_contexts {
            log::warn!("gtp: too many transaction contexts");
            return Err(Error::OutOfMemory);
        }
        let (default_from, default_chain_id) = match self.last_index() {
            Some(last) => {
                let last = self.slots[last].as_ref().ok_or(Error::InvalidState)?;
                (last.from, last.chain_id)
            }
            None => (keys.wallet_address()?, 0),
        };
        let ctx = TxContext {
            tx_info: None,
            calldata,
            from: from.unwrap_or(default_from),
            to,
            amount,
            chain_id: chain_id.unwrap_or(default_chain_id),
            fields_hasher: FieldsHasher::new(),
        };
        if self.slots.iter().all(Option::is_none) {
            self.slots.clear();
            self.current = None;
        }
        self.slots.push(Some(ctx));
        Ok(self.slots.len() - 1)
    }

    /// Removes the current context. The previous one becomes current.
    pub fn pop(&mut self) -> Result<(), Error> {
        let index = self.current.ok_or(Error::InvalidState)?;
        self.current = self.prev_index(index);
        self.slots[index] = None;
        log::debug!("gtp: context {} done", index);
        Ok(())
    }

    /// Attaches a verified descriptor to the current context.
    ///
    /// Hash-checked contexts get their intent row right away, and are popped
    /// at once if the descriptor announces no field at all.
    pub fn set_tx_info(&mut self, info: TxInfo, table: &mut FieldTable) -> Result<(), Error> {
        let hashed = self.is_hashed();
        let ctx = self.current_mut().ok_or(Error::InvalidState)?;
        let operation_type = info.operation_type.clone();
        let no_fields = info.fields_hash == FieldsHasher::empty_digest();
        ctx.tx_info = Some(info);
        if hashed {
            self.set_intent_field(table, operation_type)?;
            if no_fields {
                self.pop()?;
            }
        }
        Ok(())
    }

    /// Feeds a raw field record into the current context hash.
    pub fn hash_field(&mut self, record: &[u8]) -> Result<(), Error> {
        let ctx = self.current_mut().ok_or(Error::InvalidState)?;
        ctx.fields_hasher.update(record);
        Ok(())
    }

    /// Whether the fields received for the current context add up to its
    /// signed digest. Does not consume the running hash.
    pub fn validate_instruction_hash(&self) -> bool {
        self.current().is_some_and(TxContext::is_verified)
    }

    /// Whether the current context is complete and must be popped.
    pub fn current_done(&self) -> bool {
        self.is_hashed() && self.validate_instruction_hash()
    }

    /// Appends a row, closing the intent if the current context is complete.
    pub fn add_field(
        &self,
        table: &mut FieldTable,
        param_type: ParamType,
        key: &str,
        value: String,
        extra: Option<ExtraData>,
    ) -> Result<(), Error> {
        let end_intent = param_type != ParamType::Intent && self.validate_instruction_hash();
        table.add(param_type, key, value, extra, end_intent)
    }

    /// Writes the "Transaction type" row.
    ///
    /// It opens an intent, unless the current batch holds a single
    /// transaction, in which case it is a plain row.
    pub fn set_intent_field(
        &self,
        table: &mut FieldTable,
        value: String,
    ) -> Result<(), Error> {
        let param_type = if self.current_batch_size == 1 {
            ParamType::Raw
        } else {
            ParamType::Intent
        };
        self.add_field(table, param_type, INTENT_KEY, value, None)
    }

    /// Makes current the context a TX_INFO for `(contract, selector,
    /// chain_id)` belongs to.
    ///
    /// A context matches when its destination, or the implementation behind
    /// it, is `contract` and its calldata has the same selector and chain.
    pub fn find_matching(
        &mut self,
        contract: &EthAddress,
        selector: &Selector,
        chain_id: u64,
        state: &SessionState,
    ) -> Result<(), Error> {
        let found = self.slots.iter().position(|slot| {
            let Some(ctx) = slot else {
                return false;
            };
            let to = ctx.to.unwrap_or_default();
            let target = state
                .implementation_of(chain_id, &to, selector)
                .unwrap_or(to);
            &target == contract && ctx.selector() == Some(selector) && ctx.chain_id == chain_id
        });
        match found {
            Some(index) => {
                self.current = Some(index);
                Ok(())
            }
            None => {
                log::error!(
                    "gtp: no transaction context for 0x{} / 0x{} on chain {}",
                    hex::encode(contract),
                    hex::encode(selector),
                    chain_id
                );
                Err(Error::ContextMismatch)
            }
        }
    }

    /// Flushes the contexts without calldata right before the current one,
    /// nearest first.
    pub fn process_empty_txs_before<C: DisplayContext + ?Sized>(
        &mut self,
        table: &mut FieldTable,
        registry: &C,
        config: &ParserConfig,
    ) -> Result<(), Error> {
        let Some(current) = self.current else {
            return Ok(());
        };
        let mut index = self.prev_index(current);
        while let Some(i) = index {
            if self.slots[i].as_ref().is_some_and(|c| c.calldata.is_some()) {
                break;
            }
            self.process_empty_tx(i, table, registry, config)?;
            index = self.prev_index(i);
        }
        Ok(())
    }

    /// Flushes the contexts without calldata right after the current one.
    pub fn process_empty_txs_after<C: DisplayContext + ?Sized>(
        &mut self,
        table: &mut FieldTable,
        registry: &C,
        config: &ParserConfig,
    ) -> Result<(), Error> {
        let Some(current) = self.current else {
            return Ok(());
        };
        let mut index = self.next_index(current);
        while let Some(i) = index {
            if self.slots[i].as_ref().is_some_and(|c| c.calldata.is_some()) {
                break;
            }
            self.process_empty_tx(i, table, registry, config)?;
            index = self.next_index(i);
        }
        Ok(())
    }

    /// Describes a context without calldata and removes it.
    fn process_empty_tx<C: DisplayContext + ?Sized>(
        &mut self,
        index: usize,
        table: &mut FieldTable,
        registry: &C,
        config: &ParserConfig,
    ) -> Result<(), Error> {
        let ctx = self.slots[index].take().ok_or(Error::InvalidState)?;
        match ctx.amount {
            Some(amount) => {
                let chain_id = ctx
                    .tx_info
                    .as_ref()
                    .or_else(|| self.root().and_then(TxContext::tx_info))
                    .map(|info| info.chain_id)
                    .ok_or(Error::InvalidState)?;
                let ticker = native_ticker(registry, config, chain_id);
                self.set_intent_field(table, "Send".into())?;
                let value = format_token_amount(&amount, WEI_DECIMALS, &ticker);
                self.add_field(table, ParamType::Amount, "Amount", value, None)?;
            }
            None => self.set_intent_field(table, "Empty transaction".into())?,
        }

        let to = ctx.to.unwrap_or_default();
        match registry.trusted_name(
            &[NameType::Account],
            &[NameSource::Ens, NameSource::Lab, NameSource::Mab],
            ctx.chain_id,
            &to,
        ) {
            Some(name) => {
                let value = name.name.clone();
                self.add_field(
                    table,
                    ParamType::TrustedName,
                    "To",
                    value,
                    Some(ExtraData::TrustedName(name)),
                )
            }
            None => {
                let value = format_address_checksummed(&to, ctx.chain_id);
                self.add_field(table, ParamType::Raw, "To", value, None)
            }
        }
    }

    /// Drops every context and resets the batch counters.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.current = None;
        self.batch_nb_tx = 0;
        self.current_batch_size = 0;
    }

    /// Makes the root context current, e.g. once it was just created.
    pub fn select_root(&mut self) -> Result<(), Error> {
        self.current = Some(self.root_index().ok_or(Error::InvalidState)?);
        Ok(())
    }
}
