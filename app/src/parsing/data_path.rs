//! Data-path evaluator.
//!
//! A data path is a short program walking ABI-encoded calldata, word by
//! word, down to one or more leaf values:
//!
//! - `Tuple(n)`: skip `n` words of a static tuple
//! - `Array(weight, start?, end?)`: iterate over a dynamic array window
//! - `Ref`: follow an ABI offset word
//! - `Leaf(static | dynamic)`: capture a value
//! - `Slice(start?, end?)`: narrow the last captured value
//!
//! The whole path is replayed once per array iteration, nested arrays
//! behaving like an odometer (innermost level turning fastest).
//!
//! # Security
//!
//! - Paths and calldata are both host-controlled: every word access goes
//!   through the bounds-checked calldata store
//! - Path length, array nesting and result count are capped

use alloc::vec::Vec;
use common::error::Error;
use common::types::WORD_LENGTH;

use super::value::{ParsedValue, ValueCollection};
use crate::calldata::Calldata;
use crate::tlv::{Multiplicity, TagHandler, TlvParser, TlvRecord};

/// Maximum number of elements in a path.
pub const PATH_MAX_SIZE: usize = 16;
/// Maximum number of nested arrays in a path.
pub const MAX_ARRAYS: usize = 8;

const TAG_VERSION: u8 = 0x00;
const TAG_TUPLE: u8 = 0x01;
const TAG_ARRAY: u8 = 0x02;
const TAG_REF: u8 = 0x03;
const TAG_LEAF: u8 = 0x04;
const TAG_SLICE: u8 = 0x05;

const TAG_ARRAY_WEIGHT: u8 = 0x01;
const TAG_ARRAY_START: u8 = 0x02;
const TAG_ARRAY_END: u8 = 0x03;

const TAG_SLICE_START: u8 = 0x01;
const TAG_SLICE_END: u8 = 0x02;

/// Kind of value a leaf captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafType {
    Array = 0x01,
    Tuple = 0x02,
    /// One 32-byte word, no length prefix.
    Static = 0x03,
    /// Length-prefixed byte string.
    Dynamic = 0x04,
}

impl LeafType {
    fn from_u8(value: u8) -> Result<Self, Error> {
        match value {
            0x01 => Ok(LeafType::Array),
            0x02 => Ok(LeafType::Tuple),
            0x03 => Ok(LeafType::Static),
            0x04 => Ok(LeafType::Dynamic),
            _ => Err(Error::InvalidValue),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArrayArgs {
    /// Element stride, in words.
    pub weight: u8,
    pub start: Option<i16>,
    pub end: Option<i16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SliceArgs {
    pub start: Option<i16>,
    pub end: Option<i16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathElement {
    Tuple(u16),
    Array(ArrayArgs),
    Ref,
    Leaf(LeafType),
    Slice(SliceArgs),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DataPath {
    pub version: u8,
    pub elements: Vec<PathElement>,
}

fn handle_version(r: &TlvRecord<'_>, p: &mut DataPath) -> Result<(), Error> {
    p.version = r.as_u8()?;
    Ok(())
}

fn handle_tuple(r: &TlvRecord<'_>, p: &mut DataPath) -> Result<(), Error> {
    p.elements.push(PathElement::Tuple(r.as_u16()?));
    Ok(())
}

fn handle_array(r: &TlvRecord<'_>, p: &mut DataPath) -> Result<(), Error> {
    let mut args = ArrayArgs::default();
    let received = ARRAY_PARSER.parse(r.value, &mut args)?;
    if !received.contains(TAG_ARRAY_WEIGHT) {
        return Err(Error::MissingField);
    }
    p.elements.push(PathElement::Array(args));
    Ok(())
}

fn handle_ref(r: &TlvRecord<'_>, p: &mut DataPath) -> Result<(), Error> {
    if !r.value.is_empty() {
        return Err(Error::InvalidValue);
    }
    p.elements.push(PathElement::Ref);
    Ok(())
}

fn handle_leaf(r: &TlvRecord<'_>, p: &mut DataPath) -> Result<(), Error> {
    p.elements.push(PathElement::Leaf(LeafType::from_u8(r.as_u8()?)?));
    Ok(())
}

fn handle_slice(r: &TlvRecord<'_>, p: &mut DataPath) -> Result<(), Error> {
    let mut args = SliceArgs::default();
    SLICE_PARSER.parse(r.value, &mut args)?;
    p.elements.push(PathElement::Slice(args));
    Ok(())
}

/// Enforces the path length cap before any element is added.
fn check_path_size(r: &TlvRecord<'_>, p: &mut DataPath) -> Result<(), Error> {
    if r.tag != TAG_VERSION && p.elements.len() >= PATH_MAX_SIZE {
        log::warn!("gtp: data path longer than {}", PATH_MAX_SIZE);
        return Err(Error::LimitExceeded);
    }
    Ok(())
}

static DATA_PATH_PARSER: TlvParser<DataPath> = TlvParser {
    handlers: &[
        TagHandler { tag: TAG_VERSION, handler: handle_version, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_TUPLE, handler: handle_tuple, multiplicity: Multiplicity::AllowMultiple },
        TagHandler { tag: TAG_ARRAY, handler: handle_array, multiplicity: Multiplicity::AllowMultiple },
        TagHandler { tag: TAG_REF, handler: handle_ref, multiplicity: Multiplicity::AllowMultiple },
        TagHandler { tag: TAG_LEAF, handler: handle_leaf, multiplicity: Multiplicity::AllowMultiple },
        TagHandler { tag: TAG_SLICE, handler: handle_slice, multiplicity: Multiplicity::AllowMultiple },
    ],
    common: Some(check_path_size),
};

fn handle_array_weight(r: &TlvRecord<'_>, a: &mut ArrayArgs) -> Result<(), Error> {
    a.weight = r.as_u8()?;
    Ok(())
}

fn handle_array_start(r: &TlvRecord<'_>, a: &mut ArrayArgs) -> Result<(), Error> {
    a.start = Some(r.as_i16()?);
    Ok(())
}

fn handle_array_end(r: &TlvRecord<'_>, a: &mut ArrayArgs) -> Result<(), Error> {
    a.end = Some(r.as_i16()?);
    Ok(())
}

static ARRAY_PARSER: TlvParser<ArrayArgs> = TlvParser {
    handlers: &[
        TagHandler { tag: TAG_ARRAY_WEIGHT, handler: handle_array_weight, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_ARRAY_START, handler: handle_array_start, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_ARRAY_END, handler: handle_array_end, multiplicity: Multiplicity::EnforceUnique },
    ],
    common: None,
};

fn handle_slice_start(r: &TlvRecord<'_>, s: &mut SliceArgs) -> Result<(), Error> {
    s.start = Some(r.as_i16()?);
    Ok(())
}

fn handle_slice_end(r: &TlvRecord<'_>, s: &mut SliceArgs) -> Result<(), Error> {
    s.end = Some(r.as_i16()?);
    Ok(())
}

static SLICE_PARSER: TlvParser<SliceArgs> = TlvParser {
    handlers: &[
        TagHandler { tag: TAG_SLICE_START, handler: handle_slice_start, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_SLICE_END, handler: handle_slice_end, multiplicity: Multiplicity::EnforceUnique },
    ],
    common: None,
};

/// Resolves a possibly negative `[start, end)` window against `len`.
///
/// Negative indices count from the end. Fails unless
/// `0 <= start < end <= len`.
pub fn resolve_window(
    start: Option<i16>,
    end: Option<i16>,
    len: usize,
) -> Result<(usize, usize), Error> {
    let len = len as i64;
    let resolve = |idx: i16| if idx < 0 { len + idx as i64 } else { idx as i64 };
    let start = start.map_or(0, resolve);
    let end = end.map_or(len, resolve);
    if start < 0 || start >= end || end > len {
        return Err(Error::InvalidValue);
    }
    Ok((start as usize, end as usize))
}

/// Low 16 bits of a word, big-endian.
fn word_u16(word: &[u8; WORD_LENGTH]) -> u16 {
    u16::from_be_bytes([word[WORD_LENGTH - 2], word[WORD_LENGTH - 1]])
}

/// Odometer over the arrays met while replaying a path.
#[derive(Default)]
struct ArraysInfo {
    /// Number of array levels currently iterating.
    depth: usize,
    /// Array level reached in the current pass.
    index: usize,
    passes_remaining: [u16; MAX_ARRAYS],
}

impl ArraysInfo {
    /// Moves to the next iteration, innermost level first.
    fn update(&mut self) {
        while self.depth > 0 {
            self.passes_remaining[self.depth - 1] -= 1;
            if self.passes_remaining[self.depth - 1] > 0 {
                break;
            }
            self.depth -= 1;
        }
    }
}

struct Cursor<'c> {
    calldata: &'c Calldata,
    /// Current word.
    offset: usize,
    /// Base for `Ref` offsets.
    ref_offset: usize,
}

impl Cursor<'_> {
    fn tuple(&mut self, skip: u16) {
        self.ref_offset = self.offset;
        self.offset += skip as usize;
    }

    fn reference(&mut self) -> Result<(), Error> {
        let word = self.calldata.get_chunk(self.offset)?;
        self.offset = word_u16(&word) as usize / WORD_LENGTH + self.ref_offset;
        Ok(())
    }

    fn array(&mut self, args: &ArrayArgs, arrays: &mut ArraysInfo) -> Result<(), Error> {
        if arrays.index >= MAX_ARRAYS {
            log::warn!("gtp: more than {} nested arrays", MAX_ARRAYS);
            return Err(Error::LimitExceeded);
        }
        let array_size = word_u16(&self.calldata.get_chunk(self.offset)?) as usize;
        let (start, end) = resolve_window(args.start, args.end, array_size)?;
        let span = (end - start) as u16;

        self.offset += 1;
        if arrays.index == arrays.depth {
            arrays.passes_remaining[arrays.index] = span;
            arrays.depth += 1;
        }
        let idx = start + (span - arrays.passes_remaining[arrays.index]) as usize;
        self.ref_offset = self.offset;
        self.offset += idx * args.weight as usize;
        arrays.index += 1;
        Ok(())
    }

    fn leaf(&mut self, leaf: LeafType, out: &mut ValueCollection) -> Result<(), Error> {
        let length = match leaf {
            LeafType::Static => WORD_LENGTH,
            LeafType::Dynamic => {
                let length = word_u16(&self.calldata.get_chunk(self.offset)?) as usize;
                self.offset += 1;
                length
            }
            LeafType::Array | LeafType::Tuple => return Err(Error::InvalidValue),
        };
        let mut buf = Vec::new();
        buf.try_reserve_exact(length)
            .map_err(|_| Error::OutOfMemory)?;
        let mut chunk_idx = 0;
        while buf.len() < length {
            let word = self.calldata.get_chunk(self.offset + chunk_idx)?;
            let n = (length - buf.len()).min(WORD_LENGTH);
            buf.extend_from_slice(&word[..n]);
            chunk_idx += 1;
        }
        out.push(ParsedValue::owned(buf))
    }
}

impl DataPath {
    /// Parses a DATA_PATH structure.
    pub fn parse(payload: &[u8]) -> Result<Self, Error> {
        let mut path = DataPath::default();
        DATA_PATH_PARSER.parse(payload, &mut path)?;
        Ok(path)
    }

    /// Evaluates the path against complete calldata.
    ///
    /// Any element failing aborts the whole evaluation.
    pub fn evaluate(&self, calldata: &Calldata) -> Result<ValueCollection, Error> {
        let mut out = ValueCollection::new();
        let mut arrays = ArraysInfo::default();

        loop {
            arrays.index = 0;
            let mut cursor = Cursor {
                calldata,
                offset: 0,
                ref_offset: 0,
            };
            for element in &self.elements {
                match element {
                    PathElement::Tuple(skip) => cursor.tuple(*skip),
                    PathElement::Array(args) => cursor.array(args, &mut arrays)?,
                    PathElement::Ref => cursor.reference()?,
                    PathElement::Leaf(leaf) => cursor.leaf(*leaf, &mut out)?,
                    PathElement::Slice(args) => out.slice_last(args.start, args.end)?,
                }
            }
            arrays.update();
            if arrays.depth == 0 {
                break;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tlv::TlvWriter;
    use hex_literal::hex;

    fn u256(v: u64) -> [u8; 32] {
        let mut w = [0u8; 32];
        w[24..].copy_from_slice(&v.to_be_bytes());
        w
    }

    fn calldata(words: &[[u8; 32]]) -> Calldata {
        let payload: Vec<u8> = words.iter().flatten().copied().collect();
        Calldata::from_bytes([0; 4], &payload).unwrap()
    }

    fn path(elements: &[PathElement]) -> DataPath {
        DataPath { version: 1, elements: elements.to_vec() }
    }

    fn values(c: &ValueCollection) -> Vec<Vec<u8>> {
        c.iter().map(|v| v.as_bytes().to_vec()).collect()
    }

    #[test]
    fn test_tuple_static_leaf() {
        let cd = calldata(&[u256(1), u256(2), u256(3)]);
        let out = path(&[PathElement::Tuple(2), PathElement::Leaf(LeafType::Static)])
            .evaluate(&cd)
            .unwrap();
        assert_eq!(values(&out), vec![u256(3).to_vec()]);
    }

    #[test]
    fn test_dynamic_bytes_through_ref() {
        // f(uint256, bytes): head = [1, 0x40], tail = [len=40, data...]
        let mut first = [0u8; 32];
        first.fill(0xaa);
        let mut second = [0u8; 32];
        second[..8].fill(0xbb);
        let cd = calldata(&[u256(1), u256(0x40), u256(40), first, second]);
        let out = path(&[
            PathElement::Tuple(1),
            PathElement::Ref,
            PathElement::Leaf(LeafType::Dynamic),
        ])
        .evaluate(&cd)
        .unwrap();
        let mut expected = vec![0xaa; 32];
        expected.extend_from_slice(&[0xbb; 8]);
        assert_eq!(values(&out), vec![expected]);
    }

    #[test]
    fn test_empty_dynamic_leaf() {
        let cd = calldata(&[u256(0x20), u256(0)]);
        let out = path(&[PathElement::Ref, PathElement::Leaf(LeafType::Dynamic)])
            .evaluate(&cd)
            .unwrap();
        assert_eq!(out.len(), 1);
        assert!(out.get(0).unwrap().as_bytes().is_empty());
    }

    fn uint_array_calldata(items: &[u64]) -> Calldata {
        // f(uint256[]): [0x20, len, items...]
        let mut words = vec![u256(0x20), u256(items.len() as u64)];
        words.extend(items.iter().map(|&v| u256(v)));
        calldata(&words)
    }

    fn array_path(start: Option<i16>, end: Option<i16>) -> DataPath {
        path(&[
            PathElement::Ref,
            PathElement::Array(ArrayArgs { weight: 1, start, end }),
            PathElement::Leaf(LeafType::Static),
        ])
    }

    #[test]
    fn test_array_full_iteration() {
        let cd = uint_array_calldata(&[10, 20, 30]);
        let out = array_path(None, None).evaluate(&cd).unwrap();
        assert_eq!(values(&out), vec![u256(10).to_vec(), u256(20).to_vec(), u256(30).to_vec()]);
    }

    #[test]
    fn test_array_window_with_negative_indices() {
        let cd = uint_array_calldata(&[10, 20, 30, 40, 50]);
        let out = array_path(Some(1), Some(-1)).evaluate(&cd).unwrap();
        assert_eq!(values(&out), vec![u256(20).to_vec(), u256(30).to_vec(), u256(40).to_vec()]);
        let out = array_path(Some(-2), None).evaluate(&cd).unwrap();
        assert_eq!(values(&out), vec![u256(40).to_vec(), u256(50).to_vec()]);
    }

    #[test]
    fn test_array_window_errors() {
        let cd = uint_array_calldata(&[10, 20, 30]);
        assert_eq!(array_path(Some(2), Some(2)).evaluate(&cd), Err(Error::InvalidValue));
        assert_eq!(array_path(Some(2), Some(1)).evaluate(&cd), Err(Error::InvalidValue));
        assert_eq!(array_path(None, Some(4)).evaluate(&cd), Err(Error::InvalidValue));
        assert_eq!(array_path(Some(-4), None).evaluate(&cd), Err(Error::InvalidValue));
        assert_eq!(array_path(None, None).evaluate(&uint_array_calldata(&[])), Err(Error::InvalidValue));
    }

    #[test]
    fn test_nested_arrays_odometer() {
        // f(uint256[][]) with [[1, 2], [3]]
        let cd = calldata(&[
            u256(0x20), // offset of outer array
            u256(2),    // outer length
            u256(0x40), // offset of inner[0], relative to outer data
            u256(0xa0), // offset of inner[1]
            u256(2),
            u256(1),
            u256(2),
            u256(1),
            u256(3),
        ]);
        let out = path(&[
            PathElement::Ref,
            PathElement::Array(ArrayArgs { weight: 1, start: None, end: None }),
            PathElement::Ref,
            PathElement::Array(ArrayArgs { weight: 1, start: None, end: None }),
            PathElement::Leaf(LeafType::Static),
        ])
        .evaluate(&cd)
        .unwrap();
        // The inner window is sized on first visit of each depth
        assert_eq!(values(&out)[0], u256(1).to_vec());
        assert_eq!(values(&out)[1], u256(2).to_vec());
    }

    #[test]
    fn test_array_depth_limit() {
        let mut elements = vec![PathElement::Ref];
        for _ in 0..=MAX_ARRAYS {
            elements.push(PathElement::Array(ArrayArgs { weight: 0, start: None, end: None }));
        }
        let cd = calldata(&[u256(0x20), u256(1), u256(1), u256(1), u256(1), u256(1), u256(1), u256(1), u256(1), u256(1), u256(1)]);
        assert_eq!(path(&elements).evaluate(&cd), Err(Error::LimitExceeded));
    }

    #[test]
    fn test_slice_on_leaf() {
        let cd = calldata(&[u256(0xdeadbeef)]);
        let out = path(&[
            PathElement::Leaf(LeafType::Static),
            PathElement::Slice(SliceArgs { start: Some(-4), end: None }),
        ])
        .evaluate(&cd)
        .unwrap();
        assert_eq!(values(&out), vec![hex!("deadbeef").to_vec()]);
        assert_eq!(out.get(0).unwrap().offset(), 28);
    }

    #[test]
    fn test_slice_without_leaf_fails() {
        let cd = calldata(&[u256(1)]);
        let p = path(&[PathElement::Slice(SliceArgs { start: Some(0), end: Some(1) })]);
        assert_eq!(p.evaluate(&cd), Err(Error::InvalidValue));
    }

    #[test]
    fn test_incomplete_calldata_fails() {
        let mut cd = Calldata::new(64, [0; 4]);
        cd.append(&u256(1)).unwrap();
        let p = path(&[PathElement::Leaf(LeafType::Static)]);
        assert_eq!(p.evaluate(&cd), Err(Error::IncompleteCalldata));
    }

    #[test]
    fn test_out_of_range_word_fails() {
        let cd = calldata(&[u256(1)]);
        let p = path(&[PathElement::Tuple(1), PathElement::Leaf(LeafType::Static)]);
        assert_eq!(p.evaluate(&cd), Err(Error::InvalidValue));
    }

    #[test]
    fn test_parse_path_struct() {
        let array = TlvWriter::new().u8(0x01, 1).u16(0x02, (-2i16) as u16).finish();
        let slice = TlvWriter::new().u16(0x01, 12).finish();
        let payload = TlvWriter::new()
            .u8(0x00, 1)
            .u16(0x01, 3)
            .record(0x03, &[])
            .record(0x02, &array)
            .u8(0x04, 0x03)
            .record(0x05, &slice)
            .finish();
        let parsed = DataPath::parse(&payload).unwrap();
        assert_eq!(
            parsed.elements,
            vec![
                PathElement::Tuple(3),
                PathElement::Ref,
                PathElement::Array(ArrayArgs { weight: 1, start: Some(-2), end: None }),
                PathElement::Leaf(LeafType::Static),
                PathElement::Slice(SliceArgs { start: Some(12), end: None }),
            ]
        );
    }

    #[test]
    fn test_parse_rejects_long_path() {
        let mut writer = TlvWriter::new().u8(0x00, 1);
        for _ in 0..=PATH_MAX_SIZE {
            writer = writer.u16(0x01, 0);
        }
        assert_eq!(DataPath::parse(writer.as_bytes()), Err(Error::LimitExceeded));
    }

    #[test]
    fn test_parse_rejects_bad_elements() {
        let array_without_weight = TlvWriter::new().u16(0x02, 1).finish();
        let payload = TlvWriter::new().record(0x02, &array_without_weight).finish();
        assert_eq!(DataPath::parse(&payload), Err(Error::MissingField));
        let payload = TlvWriter::new().record(0x03, &[0x00]).finish();
        assert_eq!(DataPath::parse(&payload), Err(Error::InvalidValue));
        let payload = TlvWriter::new().u8(0x04, 0x07).finish();
        assert_eq!(DataPath::parse(&payload), Err(Error::InvalidValue));
    }
}
