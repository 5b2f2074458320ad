//! Compressed calldata store.
//!
//! Calldata (minus its 4-byte selector) is ABI encoded as a sequence of
//! 32-byte words, most of them padded with zeros on one side. Each word is
//! stored as a chunk with whichever zero run (leading or trailing) is the
//! longest stripped off, ties favouring the leading run.
//!
//! Chunks are only readable once the whole payload has been received.

use alloc::vec::Vec;
use common::error::Error;
use common::types::{Selector, WORD_LENGTH};

/// Which side of the word was stripped of its zeros.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StripDirection {
    Left,
    Right,
}

/// One compressed 32-byte word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    dir: StripDirection,
    data: Vec<u8>,
}

impl Chunk {
    /// Compresses a full word.
    pub fn compress(word: &[u8; WORD_LENGTH]) -> Self {
        let strip_left = word.iter().take_while(|&&b| b == 0).count();
        if strip_left == WORD_LENGTH {
            return Self {
                dir: StripDirection::Left,
                data: Vec::new(),
            };
        }
        let strip_right = word.iter().rev().take_while(|&&b| b == 0).count();
        if strip_left >= strip_right {
            Self {
                dir: StripDirection::Left,
                data: word[strip_left..].to_vec(),
            }
        } else {
            Self {
                dir: StripDirection::Right,
                data: word[..WORD_LENGTH - strip_right].to_vec(),
            }
        }
    }

    /// Restores the full word.
    pub fn decompress(&self) -> [u8; WORD_LENGTH] {
        let mut word = [0u8; WORD_LENGTH];
        match self.dir {
            StripDirection::Left => word[WORD_LENGTH - self.data.len()..].copy_from_slice(&self.data),
            StripDirection::Right => word[..self.data.len()].copy_from_slice(&self.data),
        }
        word
    }

    /// Number of bytes kept after compression.
    pub fn stored_len(&self) -> usize {
        self.data.len()
    }

    pub fn direction(&self) -> StripDirection {
        self.dir
    }
}

/// Calldata of one transaction.
#[derive(Debug, Clone)]
pub struct Calldata {
    expected_size: usize,
    received_size: usize,
    selector: Selector,
    chunks: Vec<Chunk>,
    staging: [u8; WORD_LENGTH],
    staging_len: usize,
}

impl Calldata {
    /// Creates an empty store expecting `expected_size` bytes after the selector.
    pub fn new(expected_size: usize, selector: Selector) -> Self {
        Self {
            expected_size,
            received_size: 0,
            selector,
            chunks: Vec::with_capacity(expected_size.div_ceil(WORD_LENGTH)),
            staging: [0u8; WORD_LENGTH],
            staging_len: 0,
        }
    }

    /// Builds a complete store from a full blob.
    pub fn from_bytes(selector: Selector, payload: &[u8]) -> Result<Self, Error> {
        let mut calldata = Self::new(payload.len(), selector);
        calldata.append(payload)?;
        Ok(calldata)
    }

    /// Appends streamed bytes, compressing every completed word.
    ///
    /// Fails without modifying the store if it would exceed the expected size.
    pub fn append(&mut self, mut data: &[u8]) -> Result<(), Error> {
        if self.received_size + data.len() > self.expected_size {
            log::warn!(
                "gtp: calldata overflow ({} + {} > {})",
                self.received_size,
                data.len(),
                self.expected_size
            );
            return Err(Error::InvalidValue);
        }
        self.received_size += data.len();
        while !data.is_empty() {
            let n = (WORD_LENGTH - self.staging_len).min(data.len());
            self.staging[self.staging_len..self.staging_len + n].copy_from_slice(&data[..n]);
            self.staging_len += n;
            data = &data[n..];
            if self.staging_len == WORD_LENGTH {
                self.chunks.push(Chunk::compress(&self.staging));
                self.staging = [0u8; WORD_LENGTH];
                self.staging_len = 0;
            }
        }
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.received_size == self.expected_size
    }

    pub fn expected_size(&self) -> usize {
        self.expected_size
    }

    pub fn received_size(&self) -> usize {
        self.received_size
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Decompressed word at `index`.
    pub fn get_chunk(&self, index: usize) -> Result<[u8; WORD_LENGTH], Error> {
        if !self.is_complete() {
            return Err(Error::IncompleteCalldata);
        }
        self.chunks
            .get(index)
            .map(Chunk::decompress)
            .ok_or(Error::InvalidValue)
    }

    pub fn get_selector(&self) -> Result<&Selector, Error> {
        if !self.is_complete() {
            return Err(Error::IncompleteCalldata);
        }
        Ok(&self.selector)
    }
}
