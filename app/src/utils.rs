//! Utility functions for the descriptor engine.
//!
//! This module provides helper functions for:
//! - Address formatting (EIP-55 / EIP-1191 checksum)
//! - Big-integer decimal formatting with decimals
//! - Display-safe string and hex truncation
//! - Fixed-size buffer resizing
//!
//! # Security
//!
//! All functions are pure and operate on bounds-checked slices.

use alloc::borrow::ToOwned;
use alloc::string::{String, ToString};
use common::types::EthAddress;
use num_bigint::{BigInt, BigUint};

use crate::crypto::keccak256;

/// Chain IDs using the EIP-1191 chain-aware checksum.
const EIP1191_CHAIN_IDS: [u64; 2] = [30, 31];

/// Number of decimals of the native currency.
pub const WEI_DECIMALS: u8 = 18;

/// Copies `src` right-aligned into `dst`.
///
/// A shorter source is left-padded with zeros, a longer one keeps only its
/// last `dst.len()` bytes.
pub fn buf_shrink_expand(src: &[u8], dst: &mut [u8]) {
    if src.len() >= dst.len() {
        dst.copy_from_slice(&src[src.len() - dst.len()..]);
    } else {
        let pad = dst.len() - src.len();
        dst[..pad].fill(0);
        dst[pad..].copy_from_slice(src);
    }
}

/// Reads up to the last 8 bytes of a big-endian value.
pub fn read_u64_be(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf_shrink_expand(bytes, &mut buf);
    u64::from_be_bytes(buf)
}

/// Formats an Ethereum address with its checksum.
///
/// The checksum is computed by taking the Keccak256 hash of the lowercase
/// hex address (prefixed by `"{chain_id}0x"` on EIP-1191 chains) and
/// capitalizing each letter where the corresponding hash nibble is >= 8.
pub fn format_address_checksummed(address: &EthAddress, chain_id: u64) -> String {
    let hex_lower = hex::encode(address);
    let hash = if EIP1191_CHAIN_IDS.contains(&chain_id) {
        keccak256(alloc::format!("{}0x{}", chain_id, hex_lower).as_bytes())
    } else {
        keccak256(hex_lower.as_bytes())
    };

    let mut result = String::with_capacity(42);
    result.push_str("0x");
    for (i, c) in hex_lower.chars().enumerate() {
        let nibble = if i % 2 == 0 {
            hash[i / 2] >> 4
        } else {
            hash[i / 2] & 0x0F
        };
        if c.is_ascii_alphabetic() && nibble >= 8 {
            result.push(c.to_ascii_uppercase());
        } else {
            result.push(c);
        }
    }
    result
}

/// Formats big-endian bytes as an unsigned decimal string.
pub fn format_uint(bytes: &[u8]) -> String {
    BigUint::from_bytes_be(bytes).to_string()
}

/// Formats big-endian two's complement bytes as a signed decimal string.
///
/// Only the last `type_size` bytes are significant; the sign is taken from
/// the highest of them.
pub fn format_int(bytes: &[u8], type_size: usize) -> String {
    let start = bytes.len().saturating_sub(type_size);
    BigInt::from_signed_bytes_be(&bytes[start..]).to_string()
}

/// Inserts a decimal point `decimals` digits from the right.
///
/// Trailing fractional zeros are trimmed, as is a dangling point.
pub fn adjust_decimals(digits: &str, decimals: u8) -> String {
    let decimals = decimals as usize;
    if decimals == 0 {
        return digits.to_owned();
    }
    let mut result = if digits.len() <= decimals {
        let mut s = String::with_capacity(decimals + 2);
        s.push_str("0.");
        for _ in digits.len()..decimals {
            s.push('0');
        }
        s.push_str(digits);
        s
    } else {
        let (whole, frac) = digits.split_at(digits.len() - decimals);
        alloc::format!("{}.{}", whole, frac)
    };
    let trimmed = result.trim_end_matches('0').trim_end_matches('.').len();
    result.truncate(trimmed);
    result
}

/// Formats a big-endian unsigned amount scaled by `decimals`.
pub fn format_decimal(bytes: &[u8], decimals: u8) -> String {
    adjust_decimals(&format_uint(bytes), decimals)
}

/// Formats an amount followed by its ticker.
pub fn format_token_amount(bytes: &[u8], decimals: u8, ticker: &str) -> String {
    let amount = format_decimal(bytes, decimals);
    if ticker.is_empty() {
        amount
    } else {
        alloc::format!("{} {}", amount, ticker)
    }
}

/// Formats bytes as `0x`-prefixed hex fitting in `max_len` characters.
///
/// Overflowing output is cut and terminated with `"..."`.
pub fn format_hex_truncated(bytes: &[u8], max_len: usize) -> String {
    let mut result = String::with_capacity(2 + bytes.len() * 2);
    result.push_str("0x");
    result.push_str(&hex::encode(bytes));
    if result.len() > max_len {
        result.truncate(max_len.saturating_sub(3));
        result.push_str("...");
    }
    result
}

/// Truncates a string to at most `max_len` bytes on a character boundary.
pub fn truncate_on_char_boundary(s: &mut String, max_len: usize) {
    if s.len() <= max_len {
        return;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}

/// Best-effort UTF-8 copy of `bytes`, at most `max_len` bytes long.
///
/// Invalid sequences are replaced, multi-byte characters are never split.
pub fn str_from_bytes_truncated(bytes: &[u8], max_len: usize) -> String {
    let mut s = String::from_utf8_lossy(bytes).into_owned();
    truncate_on_char_boundary(&mut s, max_len);
    s
}

/// Formats a UNIX timestamp as its UTC calendar date and time.
///
/// Returns `(year, month, day, hour, minute, second)`.
pub fn civil_from_timestamp(timestamp: u64) -> (u64, u8, u8, u8, u8, u8) {
    let days = timestamp / 86_400;
    let secs = timestamp % 86_400;
    // Howard Hinnant's days-from-civil inverse, shifted to 0000-03-01
    let z = days + 719_468;
    let era = z / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u8;
    let year = yoe + era * 400 + if month <= 2 { 1 } else { 0 };
    (
        year,
        month,
        day,
        (secs / 3_600) as u8,
        ((secs % 3_600) / 60) as u8,
        (secs % 60) as u8,
    )
}

/// `YYYY-MM-DD` of a UNIX timestamp.
pub fn format_date(timestamp: u64) -> String {
    let (y, m, d, _, _, _) = civil_from_timestamp(timestamp);
    alloc::format!("{:04}-{:02}-{:02}", y, m, d)
}

/// `YYYY-MM-DD hh:mm:ss AM/PM UTC` of a UNIX timestamp.
pub fn format_datetime_utc(timestamp: u64) -> String {
    let (y, mo, d, h, mi, s) = civil_from_timestamp(timestamp);
    let shown_hour = match h {
        0 => 12,
        13..=23 => h - 12,
        _ => h,
    };
    let meridiem = if h < 12 { "AM" } else { "PM" };
    alloc::format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02} {} UTC",
        y,
        mo,
        d,
        shown_hour,
        mi,
        s,
        meridiem
    )
}
