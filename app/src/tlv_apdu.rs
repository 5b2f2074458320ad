//! Reassembly of TLV payloads split across several command chunks.
//!
//! The first chunk starts with the big-endian `u16` size of the whole
//! payload. Following chunks carry raw bytes until the announced size is
//! reached, at which point the payload is handed over in one piece.

use alloc::vec::Vec;
use common::error::Error;

/// P1 of the first chunk of a payload.
pub const P1_FIRST_CHUNK: u8 = 0x01;
/// P1 of every other chunk.
pub const P1_FOLLOWING_CHUNK: u8 = 0x00;

const SIZE_PREFIX_LENGTH: usize = 2;

struct Pending {
    expected: usize,
    buffer: Vec<u8>,
}

/// Single in-flight reassembly buffer.
pub struct Reassembly {
    pending: Option<Pending>,
    max_payload_size: usize,
}

impl Reassembly {
    pub fn new(max_payload_size: usize) -> Self {
        Self {
            pending: None,
            max_payload_size,
        }
    }

    /// Feeds one chunk.
    ///
    /// Returns the complete payload once its last byte is received, `None`
    /// while more chunks are expected. On error the pending buffer is
    /// dropped.
    pub fn feed(&mut self, p1: u8, data: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        let result = self.feed_inner(p1, data);
        if result.is_err() {
            self.reset();
        }
        result
    }

    fn feed_inner(&mut self, p1: u8, data: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        let data = match p1 {
            P1_FIRST_CHUNK => {
                if self.pending.is_some() {
                    log::warn!("gtp: new payload while the previous one is incomplete");
                    return Err(Error::InvalidState);
                }
                if data.len() < SIZE_PREFIX_LENGTH {
                    log::warn!("gtp: first chunk too short for its size prefix");
                    return Err(Error::MalformedTlv);
                }
                let expected = u16::from_be_bytes([data[0], data[1]]) as usize;
                if expected > self.max_payload_size {
                    log::warn!("gtp: payload of {} bytes exceeds the limit", expected);
                    return Err(Error::OutOfMemory);
                }
                let mut buffer = Vec::new();
                buffer
                    .try_reserve_exact(expected)
                    .map_err(|_| Error::OutOfMemory)?;
                self.pending = Some(Pending { expected, buffer });
                &data[SIZE_PREFIX_LENGTH..]
            }
            P1_FOLLOWING_CHUNK => {
                if self.pending.is_none() {
                    log::warn!("gtp: following chunk without a first one");
                    return Err(Error::InvalidState);
                }
                data
            }
            _ => return Err(Error::WrongParameters),
        };

        let pending = self.pending.as_mut().ok_or(Error::InvalidState)?;
        if pending.buffer.len() + data.len() > pending.expected {
            log::warn!(
                "gtp: chunk overflows the payload ({} + {} > {})",
                pending.buffer.len(),
                data.len(),
                pending.expected
            );
            return Err(Error::InvalidValue);
        }
        pending.buffer.extend_from_slice(data);
        if pending.buffer.len() < pending.expected {
            return Ok(None);
        }
        Ok(self.pending.take().map(|p| p.buffer))
    }

    /// Drops any partially received payload.
    pub fn reset(&mut self) {
        self.pending = None;
    }

    /// Whether a payload is partially received.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_single_chunk() {
        let mut r = Reassembly::new(0xffff);
        assert_eq!(
            r.feed(P1_FIRST_CHUNK, &hex!("0003 010203")).unwrap(),
            Some(hex!("010203").to_vec())
        );
        assert!(!r.is_pending());
    }

    #[test]
    fn test_multiple_chunks() {
        let mut r = Reassembly::new(0xffff);
        assert_eq!(r.feed(P1_FIRST_CHUNK, &hex!("0005 0102")).unwrap(), None);
        assert!(r.is_pending());
        assert_eq!(r.feed(P1_FOLLOWING_CHUNK, &hex!("03")).unwrap(), None);
        assert_eq!(
            r.feed(P1_FOLLOWING_CHUNK, &hex!("0405")).unwrap(),
            Some(hex!("0102030405").to_vec())
        );
        assert!(!r.is_pending());
    }

    #[test]
    fn test_empty_payload() {
        let mut r = Reassembly::new(0xffff);
        assert_eq!(r.feed(P1_FIRST_CHUNK, &hex!("0000")).unwrap(), Some(Vec::new()));
    }

    #[test]
    fn test_errors() {
        let mut r = Reassembly::new(4);
        assert_eq!(r.feed(0x02, &hex!("0001 00")), Err(Error::WrongParameters));
        assert_eq!(r.feed(P1_FIRST_CHUNK, &hex!("00")), Err(Error::MalformedTlv));
        assert_eq!(r.feed(P1_FIRST_CHUNK, &hex!("0005")), Err(Error::OutOfMemory));
        assert_eq!(r.feed(P1_FOLLOWING_CHUNK, &hex!("00")), Err(Error::InvalidState));

        // Overflow drops the pending payload
        assert_eq!(r.feed(P1_FIRST_CHUNK, &hex!("0002 01")).unwrap(), None);
        assert_eq!(r.feed(P1_FOLLOWING_CHUNK, &hex!("0203")), Err(Error::InvalidValue));
        assert!(!r.is_pending());

        // A first chunk cannot interrupt an incomplete payload
        assert_eq!(r.feed(P1_FIRST_CHUNK, &hex!("0002 01")).unwrap(), None);
        assert_eq!(r.feed(P1_FIRST_CHUNK, &hex!("0001 01")), Err(Error::InvalidState));
        assert!(!r.is_pending());
    }
}
