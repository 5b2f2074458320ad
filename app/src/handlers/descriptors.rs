//! PROXY_INFO and ENUM_VALUE command handlers.
//!
//! # Security
//!
//! Both descriptors are cached only once their signature envelope has been
//! verified. PROXY_INFO is additionally bound to the anti-replay challenge,
//! which is re-rolled after every attempt, successful or not.

use common::error::Error;

use crate::context::{DeviceKeys, DisplayContext};
use crate::crypto::SignatureVerifier;
use crate::descriptors::{EnumValue, ProxyInfo};
use crate::session::ParserSession;

/// Handles a signed PROXY_INFO.
pub fn handle_proxy_info<C: DisplayContext + DeviceKeys, V: SignatureVerifier>(
    session: &mut ParserSession<C, V>,
    payload: &[u8],
) -> Result<(), Error> {
    let result = ProxyInfo::parse(payload, session.state.challenge(), &session.verifier);
    session.state.roll_challenge(&session.registry);
    session.state.cache_proxy_info(result?);
    Ok(())
}

/// Handles a signed ENUM_VALUE.
pub fn handle_enum_value<C: DisplayContext + DeviceKeys, V: SignatureVerifier>(
    session: &mut ParserSession<C, V>,
    payload: &[u8],
) -> Result<(), Error> {
    let entry = EnumValue::parse(payload, &session.verifier)?;
    session.state.cache_enum_value(entry);
    Ok(())
}
