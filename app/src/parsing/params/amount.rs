//! AMOUNT parameter: a native currency amount.

use common::error::Error;

use super::parse_single_value;
use crate::context::{DeviceKeys, DisplayContext};
use crate::parsing::field::{Field, ParamType};
use crate::parsing::value::Value;
use crate::parsing::FormatEnv;
use crate::utils::{format_token_amount, WEI_DECIMALS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmountParam {
    pub version: u8,
    pub value: Value,
}

impl AmountParam {
    pub fn parse(payload: &[u8]) -> Result<Self, Error> {
        let (version, value) = parse_single_value(payload)?;
        Ok(Self { version, value })
    }

    pub fn format<C: DisplayContext + DeviceKeys + ?Sized>(
        &self,
        field: &Field,
        env: &mut FormatEnv<'_, C>,
    ) -> Result<(), Error> {
        let chain_id = env.tx_info()?.chain_id;
        let ticker = env.native_ticker(chain_id);
        let values = env.resolve(&self.value)?;
        for value in &values {
            let text = format_token_amount(value.as_bytes(), WEI_DECIMALS, &ticker);
            env.add_field(ParamType::Amount, &field.name, text, None)?;
        }
        Ok(())
    }
}
