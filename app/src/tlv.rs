//! TLV codec.
//!
//! Every descriptor structure is a flat sequence of Tag-Length-Value records.
//! Both tag and length use a DER-like variable length integer:
//!
//! - short form: a single byte `< 0x80` holding the value itself
//! - long form: `0x80 | n` followed by `n` (1..=4) big-endian bytes
//!
//! Tags must fit in a `u8` and lengths in a `u16`, otherwise the record is
//! rejected. A payload is only valid if it ends exactly on a record boundary.
//!
//! On top of the raw decoder sits [`TlvParser`], a declarative table of
//! `(tag, handler, multiplicity)` entries with an optional common handler
//! run on every record (used to hash every record except the signature).
//!
//! # Security
//!
//! Payloads come from the host and are UNTRUSTED. The decoder never reads
//! past the end of the buffer and handlers receive bounds-checked slices.

use alloc::string::String;
use alloc::vec::Vec;
use common::error::Error;
use common::types::{EthAddress, ADDRESS_LENGTH};

use crate::utils::{buf_shrink_expand, str_from_bytes_truncated};

/// Maximum number of bytes following a long-form DER header.
const DER_MAX_BYTES: usize = 4;
/// Long-form flag of the first DER byte.
const DER_LONG_FORM_FLAG: u8 = 0x80;

/// One decoded record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlvRecord<'a> {
    /// Record tag.
    pub tag: u8,
    /// Declared value length.
    pub length: u16,
    /// Value bytes.
    pub value: &'a [u8],
    /// Tag + length + value, exactly as received.
    pub raw: &'a [u8],
}

/// Reads one DER-like integer at `*offset`, advancing it.
fn read_der(buf: &[u8], offset: &mut usize) -> Result<u32, Error> {
    let first = *buf.get(*offset).ok_or(Error::MalformedTlv)?;
    *offset += 1;
    if first & DER_LONG_FORM_FLAG == 0 {
        return Ok(first as u32);
    }
    let count = (first & !DER_LONG_FORM_FLAG) as usize;
    if count == 0 || count > DER_MAX_BYTES {
        return Err(Error::MalformedTlv);
    }
    let bytes = buf
        .get(*offset..*offset + count)
        .ok_or(Error::MalformedTlv)?;
    *offset += count;
    Ok(bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32))
}

enum DecodeStep {
    Tag,
    Length,
    Value,
}

/// Streams through `payload`, invoking `handler` on every record.
///
/// Any handler error aborts the whole parse. The payload must end exactly
/// on a record boundary.
pub fn parse<'a, F>(payload: &'a [u8], mut handler: F) -> Result<(), Error>
where
    F: FnMut(&TlvRecord<'a>) -> Result<(), Error>,
{
    let mut offset = 0usize;
    let mut start = 0usize;
    let mut tag = 0u8;
    let mut length = 0u16;
    let mut step = DecodeStep::Tag;

    loop {
        match step {
            DecodeStep::Tag => {
                if offset == payload.len() {
                    return Ok(());
                }
                start = offset;
                tag = u8::try_from(read_der(payload, &mut offset)?)
                    .map_err(|_| Error::MalformedTlv)?;
                step = DecodeStep::Length;
            }
            DecodeStep::Length => {
                length = u16::try_from(read_der(payload, &mut offset)?)
                    .map_err(|_| Error::MalformedTlv)?;
                step = DecodeStep::Value;
            }
            DecodeStep::Value => {
                let end = offset + length as usize;
                let value = payload.get(offset..end).ok_or(Error::MalformedTlv)?;
                let record = TlvRecord {
                    tag,
                    length,
                    value,
                    raw: &payload[start..end],
                };
                handler(&record)?;
                offset = end;
                step = DecodeStep::Tag;
            }
        }
    }
}

/// Whether a tag may appear more than once in a structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplicity {
    EnforceUnique,
    AllowMultiple,
}

/// Handler invoked for one record of a structure being built into `T`.
pub type RecordHandler<T> = fn(&TlvRecord<'_>, &mut T) -> Result<(), Error>;

/// One row of a parser table.
pub struct TagHandler<T: 'static> {
    pub tag: u8,
    pub handler: RecordHandler<T>,
    pub multiplicity: Multiplicity,
}

/// Set of tags received while parsing a structure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceivedTags([u64; 4]);

impl ReceivedTags {
    pub fn insert(&mut self, tag: u8) {
        self.0[(tag >> 6) as usize] |= 1u64 << (tag & 0x3f);
    }

    pub fn contains(&self, tag: u8) -> bool {
        self.0[(tag >> 6) as usize] & (1u64 << (tag & 0x3f)) != 0
    }

    /// Returns true if every tag in `tags` was received.
    pub fn contains_all(&self, tags: &[u8]) -> bool {
        tags.iter().all(|&t| self.contains(t))
    }
}

/// Declarative parser for one TLV structure.
pub struct TlvParser<T: 'static> {
    pub handlers: &'static [TagHandler<T>],
    /// Runs on every record before its specific handler.
    pub common: Option<RecordHandler<T>>,
}

impl<T: 'static> TlvParser<T> {
    /// Parses `payload` into `target`, returning the set of received tags.
    ///
    /// Unknown tags and duplicated unique tags are hard errors. On error the
    /// caller is expected to drop `target`.
    pub fn parse(&self, payload: &[u8], target: &mut T) -> Result<ReceivedTags, Error> {
        let mut received = ReceivedTags::default();
        parse(payload, |record| {
            let entry = self
                .handlers
                .iter()
                .find(|h| h.tag == record.tag)
                .ok_or_else(|| {
                    log::warn!("gtp: unknown tag 0x{:02x}", record.tag);
                    Error::UnknownTag
                })?;
            if entry.multiplicity == Multiplicity::EnforceUnique && received.contains(record.tag)
            {
                log::warn!("gtp: duplicate tag 0x{:02x}", record.tag);
                return Err(Error::DuplicateTag);
            }
            if let Some(common) = self.common {
                common(record, target)?;
            }
            (entry.handler)(record, target)?;
            received.insert(record.tag);
            Ok(())
        })?;
        Ok(received)
    }
}

impl<'a> TlvRecord<'a> {
    /// Single byte value.
    pub fn as_u8(&self) -> Result<u8, Error> {
        match self.value {
            [b] => Ok(*b),
            _ => Err(Error::InvalidValue),
        }
    }

    /// Single byte boolean.
    pub fn as_bool(&self) -> Result<bool, Error> {
        match self.as_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(Error::InvalidValue),
        }
    }

    /// Exactly two big-endian bytes.
    pub fn as_u16(&self) -> Result<u16, Error> {
        match self.value {
            [hi, lo] => Ok(u16::from_be_bytes([*hi, *lo])),
            _ => Err(Error::InvalidValue),
        }
    }

    /// Exactly two big-endian bytes, two's complement.
    pub fn as_i16(&self) -> Result<i16, Error> {
        self.as_u16().map(|v| v as i16)
    }

    /// Up to 4 big-endian bytes.
    pub fn as_u32(&self) -> Result<u32, Error> {
        let mut buf = [0u8; 4];
        self.copy_left_padded(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    /// Up to 8 big-endian bytes.
    pub fn as_u64(&self) -> Result<u64, Error> {
        let mut buf = [0u8; 8];
        self.copy_left_padded(&mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    /// Up to 20 bytes, left-padded.
    pub fn as_address(&self) -> Result<EthAddress, Error> {
        let mut buf = [0u8; ADDRESS_LENGTH];
        self.copy_left_padded(&mut buf)?;
        Ok(buf)
    }

    /// Copies the value right-aligned into `out`, rejecting oversized values.
    pub fn copy_left_padded(&self, out: &mut [u8]) -> Result<(), Error> {
        if self.value.len() > out.len() {
            return Err(Error::InvalidValue);
        }
        buf_shrink_expand(self.value, out);
        Ok(())
    }

    /// Printable string truncated to `max_len` bytes on a character boundary.
    pub fn as_str_truncated(&self, max_len: usize) -> String {
        str_from_bytes_truncated(self.value, max_len)
    }

    /// String that must be non-empty and fit in `max_len` bytes.
    pub fn as_str_bounded(&self, max_len: usize) -> Result<String, Error> {
        if self.value.is_empty() || self.value.len() > max_len {
            return Err(Error::InvalidValue);
        }
        core::str::from_utf8(self.value)
            .map(String::from)
            .map_err(|_| Error::InvalidValue)
    }
}

/// Appends a DER-like encoded integer.
pub fn encode_der(value: u32, out: &mut Vec<u8>) {
    if value < DER_LONG_FORM_FLAG as u32 {
        out.push(value as u8);
        return;
    }
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    out.push(DER_LONG_FORM_FLAG | (bytes.len() - skip) as u8);
    out.extend_from_slice(&bytes[skip..]);
}

/// Builder for TLV payloads.
///
/// Used to author descriptors, mostly from tests and host-side tooling.
#[derive(Debug, Clone, Default)]
pub struct TlvWriter {
    buf: Vec<u8>,
}

impl TlvWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record. Values longer than `u16::MAX` are not representable.
    pub fn record(mut self, tag: u8, value: &[u8]) -> Self {
        encode_der(tag as u32, &mut self.buf);
        encode_der(value.len() as u32, &mut self.buf);
        self.buf.extend_from_slice(value);
        self
    }

    pub fn u8(self, tag: u8, value: u8) -> Self {
        self.record(tag, &[value])
    }

    pub fn u16(self, tag: u8, value: u16) -> Self {
        self.record(tag, &value.to_be_bytes())
    }

    pub fn u64(self, tag: u8, value: u64) -> Self {
        self.record(tag, &value.to_be_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}
