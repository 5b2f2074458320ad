//! Error types for the Generic Transaction Parser.
//!
//! Every failure of the descriptor engine maps to one of these codes, and
//! every code maps to one of the four status-word categories returned to
//! the host. Messages are kept terse on purpose.

use core::fmt;
use serde::{Deserialize, Serialize};

/// Status word returned on success.
pub const SW_OK: u16 = 0x9000;
/// Malformed TLV, semantic violation, failed authenticity or constraint check.
pub const SW_INVALID_DATA: u16 = 0x6A80;
/// Command received while the parser is not in a signing flow.
pub const SW_COMMAND_NOT_ALLOWED: u16 = 0x6986;
/// Allocation or fixed-capacity limit reached.
pub const SW_INSUFFICIENT_MEMORY: u16 = 0x6A84;
/// Unexpected P1/P2 parameters.
pub const SW_WRONG_P1_P2: u16 = 0x6B00;

/// Error codes for the Generic Transaction Parser.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Error {
    /// Truncated record, bad DER length or trailing bytes.
    MalformedTlv = 0x01,
    /// Tag not declared by the structure being parsed.
    UnknownTag = 0x02,
    /// Unique tag received more than once.
    DuplicateTag = 0x03,
    /// Mandatory tag missing after parsing.
    MissingField = 0x04,
    /// Value outside its declared size, range or enumeration.
    InvalidValue = 0x05,
    /// Structure version not supported.
    UnsupportedVersion = 0x06,
    /// Descriptor signature verification failed.
    InvalidSignature = 0x07,
    /// Accumulated hash does not match the signed one.
    HashMismatch = 0x08,
    /// Descriptor does not match any in-flight transaction.
    ContextMismatch = 0x09,
    /// A `MUST_BE` visibility constraint rejected the transaction.
    ConstraintRejected = 0x0A,
    /// Registry lookup returned nothing.
    NotFound = 0x0B,
    /// Allocation failure.
    OutOfMemory = 0x0C,
    /// Path depth, array depth or collection capacity exceeded.
    LimitExceeded = 0x0D,
    /// Operation invalid in the current parser state.
    InvalidState = 0x0E,
    /// Command not allowed in the current signing mode.
    CommandNotAllowed = 0x0F,
    /// Unexpected P1/P2 parameters.
    WrongParameters = 0x10,
    /// Calldata accessed before it was fully received.
    IncompleteCalldata = 0x11,
}

impl Error {
    /// Returns the error code as a u8.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Maps the error to the status word returned to the host.
    pub fn status_word(self) -> u16 {
        match self {
            Error::OutOfMemory | Error::LimitExceeded => SW_INSUFFICIENT_MEMORY,
            Error::CommandNotAllowed | Error::InvalidState => SW_COMMAND_NOT_ALLOWED,
            Error::WrongParameters => SW_WRONG_P1_P2,
            _ => SW_INVALID_DATA,
        }
    }

    /// Returns true for forged or stale descriptors.
    ///
    /// These must wipe every piece of accumulated state.
    pub fn is_authenticity_failure(self) -> bool {
        matches!(
            self,
            Error::InvalidSignature | Error::HashMismatch | Error::ContextMismatch
        )
    }

    /// Returns true when the device deliberately refused the transaction.
    pub fn is_rejection(self) -> bool {
        matches!(self, Error::ConstraintRejected)
    }

    /// Returns true for allocation or capacity failures.
    pub fn is_resource_exhaustion(self) -> bool {
        matches!(self, Error::OutOfMemory | Error::LimitExceeded)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MalformedTlv => write!(f, "Malformed TLV"),
            Error::UnknownTag => write!(f, "Unknown tag"),
            Error::DuplicateTag => write!(f, "Duplicate tag"),
            Error::MissingField => write!(f, "Missing field"),
            Error::InvalidValue => write!(f, "Invalid value"),
            Error::UnsupportedVersion => write!(f, "Unsupported version"),
            Error::InvalidSignature => write!(f, "Invalid signature"),
            Error::HashMismatch => write!(f, "Hash mismatch"),
            Error::ContextMismatch => write!(f, "Context mismatch"),
            Error::ConstraintRejected => write!(f, "Rejected by constraint"),
            Error::NotFound => write!(f, "Not found"),
            Error::OutOfMemory => write!(f, "Out of memory"),
            Error::LimitExceeded => write!(f, "Limit exceeded"),
            Error::InvalidState => write!(f, "Invalid state"),
            Error::CommandNotAllowed => write!(f, "Command not allowed"),
            Error::WrongParameters => write!(f, "Wrong parameters"),
            Error::IncompleteCalldata => write!(f, "Incomplete calldata"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::MalformedTlv.code(), 0x01);
        assert_eq!(Error::ConstraintRejected.code(), 0x0A);
        assert_eq!(Error::IncompleteCalldata.code(), 0x11);
    }

    #[test]
    fn test_status_words() {
        assert_eq!(Error::MalformedTlv.status_word(), SW_INVALID_DATA);
        assert_eq!(Error::InvalidSignature.status_word(), SW_INVALID_DATA);
        assert_eq!(Error::ConstraintRejected.status_word(), SW_INVALID_DATA);
        assert_eq!(Error::LimitExceeded.status_word(), SW_INSUFFICIENT_MEMORY);
        assert_eq!(Error::OutOfMemory.status_word(), SW_INSUFFICIENT_MEMORY);
        assert_eq!(Error::CommandNotAllowed.status_word(), SW_COMMAND_NOT_ALLOWED);
        assert_eq!(Error::WrongParameters.status_word(), SW_WRONG_P1_P2);
    }

    #[test]
    fn test_categories_are_distinct() {
        assert!(Error::ConstraintRejected.is_rejection());
        assert!(!Error::ConstraintRejected.is_authenticity_failure());
        assert!(Error::HashMismatch.is_authenticity_failure());
        assert!(!Error::MalformedTlv.is_rejection());
        assert!(Error::LimitExceeded.is_resource_exhaustion());
    }
}
