//! CALLDATA parameter: calls triggered by the transaction.
//!
//! Formatting does not produce rows. Each resolved blob becomes a new
//! transaction context, to be described later by its own TX_INFO and
//! fields. Several blobs make a batch.

use common::error::Error;
use common::types::{EthAddress, Selector, SELECTOR_LENGTH, WORD_LENGTH};

use crate::calldata::Calldata;
use crate::context::{DeviceKeys, DisplayContext};
use crate::parsing::field::Field;
use crate::parsing::value::{ParsedValue, Value, ValueCollection};
use crate::parsing::FormatEnv;
use crate::tlv::{Multiplicity, TagHandler, TlvParser, TlvRecord};
use crate::utils::buf_shrink_expand;

const TAG_VERSION: u8 = 0x00;
const TAG_VALUE: u8 = 0x01;
const TAG_CALLEE: u8 = 0x02;
const TAG_CHAIN_ID: u8 = 0x03;
const TAG_SELECTOR: u8 = 0x04;
const TAG_AMOUNT: u8 = 0x05;
const TAG_SPENDER: u8 = 0x06;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalldataParam {
    pub version: u8,
    /// Calldata blobs, with their selector unless `selector` is set.
    pub calldata: Value,
    /// Destination of each call.
    pub callee: Value,
    pub chain_id: Option<Value>,
    pub selector: Option<Value>,
    pub amount: Option<Value>,
    /// Sender of each call, defaults to the sender of the enclosing one.
    pub spender: Option<Value>,
}

#[derive(Default)]
struct CalldataBuilder {
    version: u8,
    calldata: Option<Value>,
    callee: Option<Value>,
    chain_id: Option<Value>,
    selector: Option<Value>,
    amount: Option<Value>,
    spender: Option<Value>,
}

static CALLDATA_PARSER: TlvParser<CalldataBuilder> = TlvParser {
    handlers: &[
        TagHandler { tag: TAG_VERSION, handler: handle_version, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_VALUE, handler: handle_value, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_CALLEE, handler: handle_callee, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_CHAIN_ID, handler: handle_chain_id, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_SELECTOR, handler: handle_selector, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_AMOUNT, handler: handle_amount, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_SPENDER, handler: handle_spender, multiplicity: Multiplicity::EnforceUnique },
    ],
    common: None,
};

fn handle_version(r: &TlvRecord<'_>, b: &mut CalldataBuilder) -> Result<(), Error> {
    b.version = r.as_u8()?;
    Ok(())
}

fn handle_value(r: &TlvRecord<'_>, b: &mut CalldataBuilder) -> Result<(), Error> {
    b.calldata = Some(Value::parse(r.value)?);
    Ok(())
}

fn handle_callee(r: &TlvRecord<'_>, b: &mut CalldataBuilder) -> Result<(), Error> {
    b.callee = Some(Value::parse(r.value)?);
    Ok(())
}

fn handle_chain_id(r: &TlvRecord<'_>, b: &mut CalldataBuilder) -> Result<(), Error> {
    b.chain_id = Some(Value::parse(r.value)?);
    Ok(())
}

fn handle_selector(r: &TlvRecord<'_>, b: &mut CalldataBuilder) -> Result<(), Error> {
    b.selector = Some(Value::parse(r.value)?);
    Ok(())
}

fn handle_amount(r: &TlvRecord<'_>, b: &mut CalldataBuilder) -> Result<(), Error> {
    b.amount = Some(Value::parse(r.value)?);
    Ok(())
}

fn handle_spender(r: &TlvRecord<'_>, b: &mut CalldataBuilder) -> Result<(), Error> {
    b.spender = Some(Value::parse(r.value)?);
    Ok(())
}

/// Resolved values of one CALLDATA parameter, all of the same length.
struct Resolved {
    calldatas: ValueCollection,
    callees: ValueCollection,
    chain_ids: Option<ValueCollection>,
    selectors: Option<ValueCollection>,
    amounts: Option<ValueCollection>,
    spenders: Option<ValueCollection>,
}

impl CalldataParam {
    pub fn parse(payload: &[u8]) -> Result<Self, Error> {
        let mut builder = CalldataBuilder::default();
        CALLDATA_PARSER.parse(payload, &mut builder)?;
        match (builder.calldata, builder.callee) {
            (Some(calldata), Some(callee)) => Ok(Self {
                version: builder.version,
                calldata,
                callee,
                chain_id: builder.chain_id,
                selector: builder.selector,
                amount: builder.amount,
                spender: builder.spender,
            }),
            _ => Err(Error::MissingField),
        }
    }

    /// Pushes one transaction context per resolved calldata.
    pub fn format<C: DisplayContext + DeviceKeys + ?Sized>(
        &self,
        _field: &Field,
        env: &mut FormatEnv<'_, C>,
    ) -> Result<(), Error> {
        let resolved = self.resolve_all(env)?;
        let size = resolved.calldatas.len();
        if size > 1 {
            env.contexts.batch_nb_tx += size;
        }
        env.contexts.current_batch_size = size;

        for i in 0..size {
            let blob = resolved.calldatas.get(i).ok_or(Error::InvalidState)?;
            let selector = resolved.selectors.as_ref().and_then(|s| s.get(i));
            let calldata = split_calldata(blob, selector)?;
            let callee = resolved.callees.get(i).map(ParsedValue::to_address);
            let chain_id = resolved
                .chain_ids
                .as_ref()
                .and_then(|c| c.get(i))
                .map(ParsedValue::to_u64);
            let amount = resolved.amounts.as_ref().and_then(|a| a.get(i)).map(|v| {
                let mut word = [0u8; WORD_LENGTH];
                buf_shrink_expand(v.as_bytes(), &mut word);
                word
            });
            let spender: Option<EthAddress> = resolved
                .spenders
                .as_ref()
                .and_then(|s| s.get(i))
                .map(ParsedValue::to_address);

            let index = env
                .contexts
                .push(env.registry, calldata, spender, callee, amount, chain_id)?;
            log::debug!("gtp: nested call {}/{} in context {}", i + 1, size, index);
        }
        Ok(())
    }

    fn resolve_all<C: DisplayContext + DeviceKeys + ?Sized>(
        &self,
        env: &FormatEnv<'_, C>,
    ) -> Result<Resolved, Error> {
        let calldatas = env.resolve(&self.calldata)?;
        let expected = calldatas.len();
        let sized = |value: &Value| -> Result<ValueCollection, Error> {
            let values = env.resolve(value)?;
            if values.len() != expected {
                log::warn!("gtp: {} values for {} calldatas", values.len(), expected);
                return Err(Error::InvalidValue);
            }
            Ok(values)
        };
        Ok(Resolved {
            callees: sized(&self.callee)?,
            chain_ids: self.chain_id.as_ref().map(sized).transpose()?,
            selectors: self.selector.as_ref().map(sized).transpose()?,
            amounts: self.amount.as_ref().map(sized).transpose()?,
            spenders: self.spender.as_ref().map(sized).transpose()?,
            calldatas,
        })
    }
}

/// Splits a blob into its selector and payload.
///
/// An explicit selector means the whole blob is payload. An empty blob is
/// a call without calldata.
fn split_calldata(blob: &ParsedValue, selector: Option<&ParsedValue>) -> Result<Option<Calldata>, Error> {
    let bytes = blob.as_bytes();
    if bytes.is_empty() {
        return Ok(None);
    }
    let (selector, payload) = match selector {
        Some(explicit) => {
            let mut selector: Selector = [0u8; SELECTOR_LENGTH];
            buf_shrink_expand(explicit.as_bytes(), &mut selector);
            (selector, bytes)
        }
        None => {
            if bytes.len() < SELECTOR_LENGTH {
                log::warn!("gtp: nested calldata shorter than a selector");
                return Err(Error::InvalidValue);
            }
            let (head, payload) = bytes.split_at(SELECTOR_LENGTH);
            let mut selector: Selector = [0u8; SELECTOR_LENGTH];
            selector.copy_from_slice(head);
            (selector, payload)
        }
    };
    Calldata::from_bytes(selector, payload).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::MockRegistry;
    use crate::parsing::field::{Param, Visibility};
    use crate::parsing::params::tests::{constant_value, u256, word_addr, Harness};
    use crate::parsing::value::TypeFamily;
    use crate::tlv::TlvWriter;
    use alloc::vec;
    use alloc::vec::Vec;
    use hex_literal::hex;

    const TARGET_A: EthAddress = hex!("1111111111111111111111111111111111111111");
    const TARGET_B: EthAddress = hex!("2222222222222222222222222222222222222222");

    fn param(writer: TlvWriter) -> Param {
        Param::Calldata(CalldataParam::parse(&writer.finish()).unwrap())
    }

    /// Every element of `f(address[] targets, bytes[] datas)`'s first
    /// argument.
    fn targets_value() -> Vec<u8> {
        let array = TlvWriter::new().u8(0x01, 1).finish();
        let path = TlvWriter::new()
            .u8(0x00, 1)
            .record(0x03, &[])
            .record(0x02, &array)
            .u8(0x04, 3)
            .finish();
        TlvWriter::new()
            .u8(0x00, 1)
            .u8(0x01, TypeFamily::Address as u8)
            .record(0x03, &path)
            .finish()
    }

    /// Every element of its second argument.
    fn datas_value() -> Vec<u8> {
        let array = TlvWriter::new().u8(0x01, 1).finish();
        let path = TlvWriter::new()
            .u8(0x00, 1)
            .u16(0x01, 1)
            .record(0x03, &[])
            .record(0x02, &array)
            .record(0x03, &[])
            .u8(0x04, 4)
            .finish();
        TlvWriter::new()
            .u8(0x00, 1)
            .u8(0x01, TypeFamily::Bytes as u8)
            .record(0x03, &path)
            .finish()
    }

    /// `f([A, B], [0x01020304, ""])`
    fn batch_words() -> Vec<[u8; 32]> {
        let mut selector_word = [0u8; 32];
        selector_word[..4].copy_from_slice(&hex!("01020304"));
        vec![
            u256(0x40),
            u256(0xa0),
            u256(2),
            word_addr(&TARGET_A),
            word_addr(&TARGET_B),
            u256(2),
            u256(0x40),
            u256(0x80),
            u256(4),
            selector_word,
            u256(0),
        ]
    }

    #[test]
    fn test_batch_pushes_one_context_per_call() {
        let mut h = Harness::with_calldata(MockRegistry::default(), &batch_words());
        let writer = TlvWriter::new()
            .u8(TAG_VERSION, 1)
            .record(TAG_VALUE, &datas_value())
            .record(TAG_CALLEE, &targets_value());
        h.format("Calls", param(writer), Visibility::Always, vec![]).unwrap();

        assert!(h.table.is_empty());
        assert_eq!(h.contexts.count(), 3);
        assert_eq!(h.contexts.batch_nb_tx, 2);
        assert_eq!(h.contexts.current_batch_size, 2);

        h.contexts.set_current_last();
        let last = h.contexts.current().unwrap();
        assert_eq!(last.to(), Some(&TARGET_B));
        assert!(last.calldata().is_none());
        assert_eq!(last.chain_id(), 1);

        h.contexts
            .find_matching(&TARGET_A, &hex!("01020304"), 1, &h.state)
            .unwrap();
        let first = h.contexts.current().unwrap();
        assert_eq!(first.calldata().unwrap().expected_size(), 0);
        assert_eq!(first.from(), &h.registry.wallet);
    }

    #[test]
    fn test_explicit_overrides() {
        let mut h = Harness::new(MockRegistry::default());
        let spender = hex!("3333333333333333333333333333333333333333");
        let writer = TlvWriter::new()
            .u8(TAG_VERSION, 1)
            .record(TAG_VALUE, &constant_value(TypeFamily::Bytes, &[0x42; 32]))
            .record(TAG_CALLEE, &constant_value(TypeFamily::Address, &TARGET_A))
            .record(TAG_SELECTOR, &constant_value(TypeFamily::Bytes, &hex!("095ea7b3")))
            .record(TAG_CHAIN_ID, &constant_value(TypeFamily::Uint, &[0x89]))
            .record(TAG_AMOUNT, &constant_value(TypeFamily::Uint, &[0x01]))
            .record(TAG_SPENDER, &constant_value(TypeFamily::Address, &spender));
        h.format("Call", param(writer), Visibility::Always, vec![]).unwrap();

        assert_eq!(h.contexts.batch_nb_tx, 0);
        assert_eq!(h.contexts.current_batch_size, 1);
        h.contexts.set_current_last();
        let ctx = h.contexts.current().unwrap();
        let calldata = ctx.calldata().unwrap();
        assert_eq!(calldata.get_selector().unwrap(), &hex!("095ea7b3"));
        assert_eq!(calldata.expected_size(), 32);
        assert_eq!(ctx.chain_id(), 137);
        assert_eq!(ctx.from(), &spender);
        assert_eq!(ctx.amount(), Some(u256(1)));
    }

    #[test]
    fn test_rejects_bad_calls() {
        let mut h = Harness::new(MockRegistry::default());
        let short = TlvWriter::new()
            .record(TAG_VALUE, &constant_value(TypeFamily::Bytes, &[0x01, 0x02]))
            .record(TAG_CALLEE, &constant_value(TypeFamily::Address, &TARGET_A));
        assert_eq!(
            h.format("Call", param(short), Visibility::Always, vec![]),
            Err(Error::InvalidValue)
        );

        let mut h = Harness::with_calldata(MockRegistry::default(), &batch_words());
        let mismatch = TlvWriter::new()
            .record(TAG_VALUE, &datas_value())
            .record(TAG_CALLEE, &constant_value(TypeFamily::Address, &TARGET_A));
        assert_eq!(
            h.format("Call", param(mismatch), Visibility::Always, vec![]),
            Err(Error::InvalidValue)
        );
        assert_eq!(h.contexts.count(), 1);

        let no_callee = TlvWriter::new().record(TAG_VALUE, &datas_value()).finish();
        assert_eq!(CalldataParam::parse(&no_callee), Err(Error::MissingField));
    }
}
