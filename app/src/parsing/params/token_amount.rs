//! TOKEN_AMOUNT parameter: an amount of a token, resolved by address.

use alloc::string::String;
use alloc::vec::Vec;
use common::error::Error;
use common::types::{EthAddress, ADDRESS_LENGTH, WORD_LENGTH};
use num_bigint::BigUint;
use num_traits::Zero;

use super::push_native_addr;
use crate::context::{DeviceKeys, DisplayContext};
use crate::field_table::ExtraData;
use crate::parsing::field::{Field, ParamType};
use crate::parsing::value::Value;
use crate::parsing::FormatEnv;
use crate::tlv::{Multiplicity, TagHandler, TlvParser, TlvRecord};
use crate::utils::{buf_shrink_expand, format_token_amount, WEI_DECIMALS};

const TAG_VERSION: u8 = 0x00;
const TAG_VALUE: u8 = 0x01;
const TAG_TOKEN: u8 = 0x02;
const TAG_NATIVE_CURRENCY: u8 = 0x03;
const TAG_THRESHOLD: u8 = 0x04;
const TAG_ABOVE_THRESHOLD_MSG: u8 = 0x05;

/// Maximum length of the message shown above the threshold.
pub const ABOVE_THRESHOLD_MSG_MAX_LENGTH: usize = 20;

const UNKNOWN_TICKER: &str = "???";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAmountParam {
    pub version: u8,
    pub value: Value,
    /// Token address of each amount.
    pub token: Option<Value>,
    /// Placeholder addresses standing for the native currency.
    pub native_addrs: Vec<EthAddress>,
    /// Amounts at or above it are not displayed. Zero disables it.
    pub threshold: BigUint,
    pub above_threshold_msg: Option<String>,
}

#[derive(Default)]
struct TokenAmountBuilder {
    version: u8,
    value: Option<Value>,
    token: Option<Value>,
    native_addrs: Vec<EthAddress>,
    threshold: BigUint,
    above_threshold_msg: Option<String>,
}

static TOKEN_AMOUNT_PARSER: TlvParser<TokenAmountBuilder> = TlvParser {
    handlers: &[
        TagHandler { tag: TAG_VERSION, handler: handle_version, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_VALUE, handler: handle_value, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_TOKEN, handler: handle_token, multiplicity: Multiplicity::AllowMultiple },
        TagHandler { tag: TAG_NATIVE_CURRENCY, handler: handle_native_currency, multiplicity: Multiplicity::AllowMultiple },
        TagHandler { tag: TAG_THRESHOLD, handler: handle_threshold, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_ABOVE_THRESHOLD_MSG, handler: handle_above_threshold_msg, multiplicity: Multiplicity::EnforceUnique },
    ],
    common: None,
};

fn handle_version(r: &TlvRecord<'_>, b: &mut TokenAmountBuilder) -> Result<(), Error> {
    b.version = r.as_u8()?;
    Ok(())
}

fn handle_value(r: &TlvRecord<'_>, b: &mut TokenAmountBuilder) -> Result<(), Error> {
    b.value = Some(Value::parse(r.value)?);
    Ok(())
}

fn handle_token(r: &TlvRecord<'_>, b: &mut TokenAmountBuilder) -> Result<(), Error> {
    b.token = Some(Value::parse(r.value)?);
    Ok(())
}

fn handle_native_currency(r: &TlvRecord<'_>, b: &mut TokenAmountBuilder) -> Result<(), Error> {
    push_native_addr(r, &mut b.native_addrs)
}

fn handle_threshold(r: &TlvRecord<'_>, b: &mut TokenAmountBuilder) -> Result<(), Error> {
    if r.value.len() > WORD_LENGTH {
        return Err(Error::InvalidValue);
    }
    b.threshold = BigUint::from_bytes_be(r.value);
    Ok(())
}

fn handle_above_threshold_msg(r: &TlvRecord<'_>, b: &mut TokenAmountBuilder) -> Result<(), Error> {
    if r.value.len() > ABOVE_THRESHOLD_MSG_MAX_LENGTH {
        return Err(Error::InvalidValue);
    }
    let msg = r.as_str_truncated(ABOVE_THRESHOLD_MSG_MAX_LENGTH);
    b.above_threshold_msg = (!msg.is_empty()).then_some(msg);
    Ok(())
}

impl TokenAmountParam {
    pub fn parse(payload: &[u8]) -> Result<Self, Error> {
        let mut builder = TokenAmountBuilder::default();
        TOKEN_AMOUNT_PARSER.parse(payload, &mut builder)?;
        let value = builder.value.ok_or(Error::MissingField)?;
        Ok(Self {
            version: builder.version,
            value,
            token: builder.token,
            native_addrs: builder.native_addrs,
            threshold: builder.threshold,
            above_threshold_msg: builder.above_threshold_msg,
        })
    }

    pub fn format<C: DisplayContext + DeviceKeys + ?Sized>(
        &self,
        field: &Field,
        env: &mut FormatEnv<'_, C>,
    ) -> Result<(), Error> {
        let chain_id = env.tx_info()?.chain_id;
        let amounts = env.resolve(&self.value)?;
        let tokens = match &self.token {
            Some(token) => {
                let tokens = env.resolve(token)?;
                if tokens.len() != amounts.len() {
                    log::warn!(
                        "gtp: {} amounts for {} tokens",
                        amounts.len(),
                        tokens.len()
                    );
                    return Err(Error::InvalidValue);
                }
                Some(tokens)
            }
            None => None,
        };

        for (i, amount) in amounts.iter().enumerate() {
            let mut ticker = String::from(UNKNOWN_TICKER);
            let mut decimals = 0;
            let mut extra = None;
            if let Some(token) = tokens.as_ref().and_then(|t| t.get(i)) {
                let mut addr = [0u8; ADDRESS_LENGTH];
                buf_shrink_expand(token.as_bytes(), &mut addr);
                if self.native_addrs.contains(&addr) {
                    ticker = env.native_ticker(chain_id);
                    decimals = WEI_DECIMALS;
                } else if let Some(info) = env.registry.token_info(chain_id, &addr) {
                    ticker = info.ticker.clone();
                    decimals = info.decimals;
                    extra = Some(ExtraData::Token(info));
                } else {
                    log::info!("gtp: unknown token 0x{}", hex::encode(addr));
                }
            }

            let bytes = amount.as_bytes();
            let text = if self.is_above_threshold(bytes) {
                let msg = self.above_threshold_msg.as_deref().unwrap_or("Unlimited");
                alloc::format!("{} {}", msg, ticker)
            } else {
                format_token_amount(bytes, decimals, &ticker)
            };
            let param_type = if extra.is_some() {
                ParamType::TokenAmount
            } else {
                ParamType::Amount
            };
            env.add_field(param_type, &field.name, text, extra)?;
        }
        Ok(())
    }

    fn is_above_threshold(&self, amount: &[u8]) -> bool {
        !self.threshold.is_zero() && BigUint::from_bytes_be(amount) >= self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::MockRegistry;
    use crate::parsing::field::{Param, Visibility};
    use crate::parsing::params::tests::{constant_value, rows, Harness};
    use crate::parsing::value::TypeFamily;
    use crate::tlv::TlvWriter;
    use alloc::vec;
    use hex_literal::hex;

    const USDC: EthAddress = hex!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
    const NATIVE: EthAddress = hex!("eeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee");

    fn registry() -> MockRegistry {
        MockRegistry::default().with_token(1, USDC, "USDC", 6)
    }

    fn token_amount(amount: &[u8], token: &EthAddress) -> TlvWriter {
        TlvWriter::new()
            .u8(TAG_VERSION, 1)
            .record(TAG_VALUE, &constant_value(TypeFamily::Uint, amount))
            .record(TAG_TOKEN, &constant_value(TypeFamily::Address, token))
    }

    fn param(writer: TlvWriter) -> Param {
        Param::TokenAmount(TokenAmountParam::parse(&writer.finish()).unwrap())
    }

    #[test]
    fn test_known_token() {
        let mut h = Harness::new(registry());
        h.format("Send", param(token_amount(&hex!("0f4240"), &USDC)), Visibility::Always, vec![])
            .unwrap();
        assert_eq!(h.rows(), rows(&[("Send", "1 USDC")]));
        assert_eq!(h.row_types(), vec![ParamType::TokenAmount]);
        assert!(matches!(
            h.table.get(0).unwrap().extra,
            Some(ExtraData::Token(ref t)) if t.ticker == "USDC"
        ));
    }

    #[test]
    fn test_native_and_unknown_tokens() {
        let mut h = Harness::new(registry());
        let native = token_amount(&hex!("0de0b6b3a7640000"), &NATIVE).record(TAG_NATIVE_CURRENCY, &NATIVE);
        h.format("Send", param(native), Visibility::Always, vec![]).unwrap();
        h.format("Send", param(token_amount(&[0x2a], &[0x77; 20])), Visibility::Always, vec![])
            .unwrap();
        assert_eq!(h.rows(), rows(&[("Send", "1 ETH"), ("Send", "42 ???")]));
        assert_eq!(h.row_types(), vec![ParamType::Amount, ParamType::Amount]);
    }

    #[test]
    fn test_threshold() {
        let mut h = Harness::new(registry());
        let max = [0xff; 32];
        let unlimited = token_amount(&max, &USDC).record(TAG_THRESHOLD, &max);
        h.format("Approve", param(unlimited), Visibility::Always, vec![]).unwrap();
        let custom = token_amount(&hex!("0f4240"), &USDC)
            .record(TAG_THRESHOLD, &hex!("0f4240"))
            .record(TAG_ABOVE_THRESHOLD_MSG, b"Everything");
        h.format("Approve", param(custom), Visibility::Always, vec![]).unwrap();
        let below = token_amount(&hex!("0f423f"), &USDC).record(TAG_THRESHOLD, &hex!("0f4240"));
        h.format("Approve", param(below), Visibility::Always, vec![]).unwrap();
        assert_eq!(
            h.rows(),
            rows(&[
                ("Approve", "Unlimited USDC"),
                ("Approve", "Everything USDC"),
                ("Approve", "0.999999 USDC"),
            ])
        );
    }

    #[test]
    fn test_parse_limits() {
        let mut writer = token_amount(&[1], &USDC);
        for _ in 0..=crate::parsing::params::MAX_NATIVE_ADDRS {
            writer = writer.record(TAG_NATIVE_CURRENCY, &NATIVE);
        }
        assert_eq!(TokenAmountParam::parse(&writer.finish()), Err(Error::LimitExceeded));

        let long_msg = token_amount(&[1], &USDC).record(TAG_ABOVE_THRESHOLD_MSG, &[b'a'; 21]);
        assert_eq!(TokenAmountParam::parse(&long_msg.finish()), Err(Error::InvalidValue));

        let wide = token_amount(&[1], &USDC).record(TAG_THRESHOLD, &[1; 33]);
        assert_eq!(TokenAmountParam::parse(&wide.finish()), Err(Error::InvalidValue));
    }
}
