//! TOKEN parameter: a token address displayed as its ticker.

use alloc::vec::Vec;
use common::error::Error;
use common::types::EthAddress;

use super::push_native_addr;
use crate::context::{DeviceKeys, DisplayContext};
use crate::field_table::ExtraData;
use crate::parsing::field::{Field, ParamType};
use crate::parsing::value::Value;
use crate::parsing::FormatEnv;
use crate::tlv::{Multiplicity, TagHandler, TlvParser, TlvRecord};

const TAG_VERSION: u8 = 0x00;
const TAG_ADDRESS: u8 = 0x01;
const TAG_NATIVE_CURRENCY: u8 = 0x02;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenParam {
    pub version: u8,
    pub address: Value,
    pub native_addrs: Vec<EthAddress>,
}

#[derive(Default)]
struct TokenBuilder {
    version: u8,
    address: Option<Value>,
    native_addrs: Vec<EthAddress>,
}

static TOKEN_PARSER: TlvParser<TokenBuilder> = TlvParser {
    handlers: &[
        TagHandler { tag: TAG_VERSION, handler: handle_version, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_ADDRESS, handler: handle_address, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_NATIVE_CURRENCY, handler: handle_native_currency, multiplicity: Multiplicity::AllowMultiple },
    ],
    common: None,
};

fn handle_version(r: &TlvRecord<'_>, b: &mut TokenBuilder) -> Result<(), Error> {
    b.version = r.as_u8()?;
    Ok(())
}

fn handle_address(r: &TlvRecord<'_>, b: &mut TokenBuilder) -> Result<(), Error> {
    b.address = Some(Value::parse(r.value)?);
    Ok(())
}

fn handle_native_currency(r: &TlvRecord<'_>, b: &mut TokenBuilder) -> Result<(), Error> {
    push_native_addr(r, &mut b.native_addrs)
}

impl TokenParam {
    pub fn parse(payload: &[u8]) -> Result<Self, Error> {
        let mut builder = TokenBuilder::default();
        TOKEN_PARSER.parse(payload, &mut builder)?;
        let address = builder.address.ok_or(Error::MissingField)?;
        Ok(Self {
            version: builder.version,
            address,
            native_addrs: builder.native_addrs,
        })
    }

    pub fn format<C: DisplayContext + DeviceKeys + ?Sized>(
        &self,
        field: &Field,
        env: &mut FormatEnv<'_, C>,
    ) -> Result<(), Error> {
        let chain_id = env.tx_info()?.chain_id;
        let values = env.resolve(&self.address)?;
        for value in &values {
            let address = value.to_address();
            if self.native_addrs.contains(&address) {
                let ticker = env.native_ticker(chain_id);
                env.add_field(ParamType::Token, &field.name, ticker, None)?;
                continue;
            }
            let Some(info) = env.registry.token_info(chain_id, &address) else {
                log::warn!("gtp: unknown token 0x{}", hex::encode(address));
                return Err(Error::NotFound);
            };
            let ticker = info.ticker.clone();
            env.add_field(ParamType::Token, &field.name, ticker, Some(ExtraData::Token(info)))?;
        }
        Ok(())
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

    const DAI: EthAddress = hex!("6b175474e89094c44da98b954eedeac495271d0f");
    const NATIVE: EthAddress = hex!("eeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee");

    fn token(address: &EthAddress) -> Param {
        let payload = TlvWriter::new()
            .u8(TAG_VERSION, 1)
            .record(TAG_ADDRESS, &constant_value(TypeFamily::Address, address))
            .record(TAG_NATIVE_CURRENCY, &NATIVE)
            .finish();
        Param::Token(TokenParam::parse(&payload).unwrap())
    }

    #[test]
    fn test_format_token() {
        let registry = MockRegistry::default()
            .with_token(1, DAI, "DAI", 18)
            .with_network(1, "Ethereum", "ETH");
        let mut h = Harness::new(registry);
        h.format("Buy", token(&DAI), Visibility::Always, vec![]).unwrap();
        h.format("Sell", token(&NATIVE), Visibility::Always, vec![]).unwrap();
        assert_eq!(h.rows(), rows(&[("Buy", "DAI"), ("Sell", "ETH")]));
        assert_eq!(h.row_types(), vec![ParamType::Token, ParamType::Token]);
    }

    #[test]
    fn test_unknown_token() {
        let mut h = Harness::new(MockRegistry::default());
        assert_eq!(
            h.format("Buy", token(&DAI), Visibility::Always, vec![]),
            Err(Error::NotFound)
        );
    }
}
