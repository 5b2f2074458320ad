//! Value descriptors and their resolution.
//!
//! A [`Value`] says where a datum comes from (calldata through a data path,
//! a well-known transaction property, or an inline constant) and how it is
//! typed. Resolving it yields a [`ValueCollection`] of byte strings, one per
//! array iteration of the data path.

use alloc::vec::Vec;
use common::error::Error;
use common::types::{EthAddress, ADDRESS_LENGTH, WORD_LENGTH};

use super::data_path::{resolve_window, DataPath};
use crate::tlv::{Multiplicity, TagHandler, TlvParser, TlvRecord};
use crate::tx_ctx::TxContexts;

/// Maximum number of values a single resolution may produce.
pub const MAX_VALUE_COLLECTION_SIZE: usize = 16;
/// Maximum size of an inline constant.
pub const MAX_CONSTANT_SIZE: usize = WORD_LENGTH;

const TAG_VERSION: u8 = 0x00;
const TAG_TYPE_FAMILY: u8 = 0x01;
const TAG_TYPE_SIZE: u8 = 0x02;
const TAG_DATA_PATH: u8 = 0x03;
const TAG_CONTAINER_PATH: u8 = 0x04;
const TAG_CONSTANT: u8 = 0x05;

/// ABI type family of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFamily {
    Uint = 0x01,
    Int = 0x02,
    Ufixed = 0x03,
    Fixed = 0x04,
    Address = 0x05,
    Bool = 0x06,
    Bytes = 0x07,
    String = 0x08,
}

impl TypeFamily {
    pub fn from_u8(value: u8) -> Result<Self, Error> {
        match value {
            0x01 => Ok(TypeFamily::Uint),
            0x02 => Ok(TypeFamily::Int),
            0x03 => Ok(TypeFamily::Ufixed),
            0x04 => Ok(TypeFamily::Fixed),
            0x05 => Ok(TypeFamily::Address),
            0x06 => Ok(TypeFamily::Bool),
            0x07 => Ok(TypeFamily::Bytes),
            0x08 => Ok(TypeFamily::String),
            _ => Err(Error::InvalidValue),
        }
    }
}

/// Well-known properties of the current transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerPath {
    From = 0x00,
    To = 0x01,
    Value = 0x02,
    ChainId = 0x03,
}

impl ContainerPath {
    pub fn from_u8(value: u8) -> Result<Self, Error> {
        match value {
            0x00 => Ok(ContainerPath::From),
            0x01 => Ok(ContainerPath::To),
            0x02 => Ok(ContainerPath::Value),
            0x03 => Ok(ContainerPath::ChainId),
            _ => Err(Error::InvalidValue),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    Calldata(DataPath),
    Container(ContainerPath),
    Constant(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    pub version: u8,
    pub type_family: TypeFamily,
    /// Size in bytes, `1..=32`.
    pub type_size: Option<u8>,
    pub source: ValueSource,
}

#[derive(Default)]
struct ValueBuilder {
    version: u8,
    type_family: Option<TypeFamily>,
    type_size: Option<u8>,
    source: Option<ValueSource>,
}

impl ValueBuilder {
    fn set_source(&mut self, source: ValueSource) -> Result<(), Error> {
        if self.source.is_some() {
            log::warn!("gtp: value with more than one source");
            return Err(Error::DuplicateTag);
        }
        self.source = Some(source);
        Ok(())
    }
}

static VALUE_PARSER: TlvParser<ValueBuilder> = TlvParser {
    handlers: &[
        TagHandler { tag: TAG_VERSION, handler: handle_version, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_TYPE_FAMILY, handler: handle_type_family, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_TYPE_SIZE, handler: handle_type_size, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_DATA_PATH, handler: handle_data_path, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_CONTAINER_PATH, handler: handle_container_path, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_CONSTANT, handler: handle_constant, multiplicity: Multiplicity::EnforceUnique },
    ],
    common: None,
};

fn handle_version(r: &TlvRecord<'_>, v: &mut ValueBuilder) -> Result<(), Error> {
    v.version = r.as_u8()?;
    Ok(())
}

fn handle_type_family(r: &TlvRecord<'_>, v: &mut ValueBuilder) -> Result<(), Error> {
    v.type_family = Some(TypeFamily::from_u8(r.as_u8()?)?);
    Ok(())
}

fn handle_data_path(r: &TlvRecord<'_>, v: &mut ValueBuilder) -> Result<(), Error> {
    v.set_source(ValueSource::Calldata(DataPath::parse(r.value)?))
}

fn handle_container_path(r: &TlvRecord<'_>, v: &mut ValueBuilder) -> Result<(), Error> {
    v.set_source(ValueSource::Container(ContainerPath::from_u8(r.as_u8()?)?))
}

fn handle_type_size(r: &TlvRecord<'_>, v: &mut ValueBuilder) -> Result<(), Error> {
    let size = r.as_u8()?;
    if size == 0 || size as usize > WORD_LENGTH {
        return Err(Error::InvalidValue);
    }
    v.type_size = Some(size);
    Ok(())
}

fn handle_constant(r: &TlvRecord<'_>, v: &mut ValueBuilder) -> Result<(), Error> {
    if r.value.len() > MAX_CONSTANT_SIZE {
        return Err(Error::InvalidValue);
    }
    v.set_source(ValueSource::Constant(r.value.to_vec()))
}

impl Value {
    /// Parses a VALUE structure. A type family and exactly one source are
    /// required.
    pub fn parse(payload: &[u8]) -> Result<Self, Error> {
        let mut builder = ValueBuilder::default();
        VALUE_PARSER.parse(payload, &mut builder)?;
        match (builder.type_family, builder.source) {
            (Some(type_family), Some(source)) => Ok(Value {
                version: builder.version,
                type_family,
                type_size: builder.type_size,
                source,
            }),
            _ => Err(Error::MissingField),
        }
    }

    /// Shorthand for a constant value, mostly used when authoring fields.
    pub fn constant(type_family: TypeFamily, bytes: &[u8]) -> Self {
        Value {
            version: 1,
            type_family,
            type_size: None,
            source: ValueSource::Constant(bytes.to_vec()),
        }
    }

    /// Resolves the value against the current transaction context.
    ///
    /// Calldata-backed values need complete calldata on the current context.
    pub fn resolve(&self, contexts: &TxContexts) -> Result<ValueCollection, Error> {
        match &self.source {
            ValueSource::Calldata(path) => {
                let calldata = contexts
                    .current()
                    .and_then(|ctx| ctx.calldata())
                    .ok_or(Error::InvalidState)?;
                path.evaluate(calldata)
            }
            ValueSource::Container(container) => {
                let ctx = contexts.current().ok_or(Error::InvalidState)?;
                let bytes = match container {
                    ContainerPath::From => ctx.from().to_vec(),
                    ContainerPath::To => ctx.to().ok_or(Error::InvalidState)?.to_vec(),
                    ContainerPath::Value => ctx.amount().unwrap_or([0u8; WORD_LENGTH]).to_vec(),
                    ContainerPath::ChainId => {
                        let info = ctx.tx_info().ok_or(Error::InvalidState)?;
                        info.chain_id.to_be_bytes().to_vec()
                    }
                };
                ValueCollection::single(bytes)
            }
            ValueSource::Constant(bytes) => ValueCollection::single(bytes.clone()),
        }
    }
}

/// One resolved byte string.
///
/// Owns its backing storage. `offset` records how far slicing advanced into
/// it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedValue {
    storage: Vec<u8>,
    offset: usize,
    length: usize,
}

impl ParsedValue {
    pub fn owned(storage: Vec<u8>) -> Self {
        let length = storage.len();
        Self {
            storage,
            offset: 0,
            length,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.storage[self.offset..self.offset + self.length]
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Distance from the start of the backing storage.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Right-aligned copy as an address.
    pub fn to_address(&self) -> EthAddress {
        let mut addr = [0u8; ADDRESS_LENGTH];
        crate::utils::buf_shrink_expand(self.as_bytes(), &mut addr);
        addr
    }

    /// Low 8 bytes as a big-endian integer.
    pub fn to_u64(&self) -> u64 {
        crate::utils::read_u64_be(self.as_bytes())
    }

    fn slice(&mut self, start: Option<i16>, end: Option<i16>) -> Result<(), Error> {
        let (start, end) = resolve_window(start, end, self.length)?;
        self.offset += start;
        self.length = end - start;
        Ok(())
    }
}

/// Ordered result of a value resolution.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValueCollection {
    values: Vec<ParsedValue>,
}

impl ValueCollection {
    pub fn new() -> Self {
        Self::default()
    }

    fn single(bytes: Vec<u8>) -> Result<Self, Error> {
        let mut collection = Self::new();
        collection.push(ParsedValue::owned(bytes))?;
        Ok(collection)
    }

    /// Appends a value, failing once the collection is full.
    pub fn push(&mut self, value: ParsedValue) -> Result<(), Error> {
        if self.values.len() >= MAX_VALUE_COLLECTION_SIZE {
            log::warn!("gtp: more than {} values", MAX_VALUE_COLLECTION_SIZE);
            return Err(Error::LimitExceeded);
        }
        self.values.push(value);
        Ok(())
    }

    /// Narrows the most recently appended value.
    ///
    /// Position-sensitive: it only ever applies to the tail, and fails on an
    /// empty collection.
    pub fn slice_last(&mut self, start: Option<i16>, end: Option<i16>) -> Result<(), Error> {
        self.values
            .last_mut()
            .ok_or(Error::InvalidValue)?
            .slice(start, end)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ParsedValue> {
        self.values.get(index)
    }

    pub fn iter(&self) -> core::slice::Iter<'_, ParsedValue> {
        self.values.iter()
    }
}

impl<'a> IntoIterator for &'a ValueCollection {
    type Item = &'a ParsedValue;
    type IntoIter = core::slice::Iter<'a, ParsedValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}
