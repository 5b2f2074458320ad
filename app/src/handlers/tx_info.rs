//! TX_INFO command handler.

use common::error::Error;

use crate::context::{DeviceKeys, DisplayContext};
use crate::crypto::SignatureVerifier;
use crate::parsing::tx_info::{SelectorCheck, TxInfo};
use crate::session::ParserSession;

/// Handles a signed TX_INFO.
///
/// Without any transaction context, the descriptor is for the transaction
/// being signed: its selector must match the parked calldata, which then
/// becomes the root context. Otherwise the descriptor selects the
/// context it matches. Empty transactions queued before that context are
/// flushed first.
pub fn handle_tx_info<C: DisplayContext + DeviceKeys, V: SignatureVerifier>(
    session: &mut ParserSession<C, V>,
    payload: &[u8],
) -> Result<(), Error> {
    let promote = session.contexts.is_empty();
    let selector_check = if !promote {
        SelectorCheck::Deferred
    } else {
        match session.parked_calldata.as_ref().map(|c| c.get_selector()) {
            Some(Ok(selector)) => SelectorCheck::MustMatch(*selector),
            _ => SelectorCheck::Unavailable,
        }
    };
    let info = TxInfo::parse(payload, selector_check, &session.verifier)?;

    if promote {
        let calldata = session.parked_calldata.take();
        session.create_root(calldata, Some(info.contract_addr), None, info.chain_id)?;
    }

    session.contexts.find_matching(
        &info.contract_addr,
        &info.selector,
        info.chain_id,
        &session.state,
    )?;
    session.contexts.process_empty_txs_before(
        &mut session.table,
        &session.registry,
        &session.config,
    )?;
    log::debug!("gtp: tx info \"{}\" accepted", info.operation_type);
    session.contexts.set_tx_info(info, &mut session.table)
}
