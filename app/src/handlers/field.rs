//! FIELD command handler.

use common::error::Error;

use crate::context::{DeviceKeys, DisplayContext};
use crate::crypto::SignatureVerifier;
use crate::parsing::field::Field;
use crate::parsing::FormatEnv;
use crate::session::ParserSession;

/// Handles one FIELD record of the current transaction context.
///
/// The raw record is chained into the context hash before formatting, so
/// the rows of the last field already close the intent. Every context
/// whose fields are then complete is popped, flushing the empty
/// transactions that follow it.
pub fn handle_field<C: DisplayContext + DeviceKeys, V: SignatureVerifier>(
    session: &mut ParserSession<C, V>,
    payload: &[u8],
) -> Result<(), Error> {
    let field = Field::parse(payload)?;
    session.contexts.hash_field(payload)?;

    let mut env = FormatEnv {
        registry: &session.registry,
        state: &session.state,
        contexts: &mut session.contexts,
        table: &mut session.table,
        config: &session.config,
    };
    field.format(&mut env)?;

    while session.contexts.current_done() {
        session.contexts.process_empty_txs_after(
            &mut session.table,
            &session.registry,
            &session.config,
        )?;
        session.contexts.pop()?;
    }
    Ok(())
}
