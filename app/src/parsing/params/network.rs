//! NETWORK parameter: a chain ID displayed as its network name.

use common::error::Error;

use super::parse_single_value;
use crate::context::{DeviceKeys, DisplayContext};
use crate::parsing::field::{Field, ParamType};
use crate::parsing::value::{TypeFamily, Value};
use crate::parsing::FormatEnv;
use crate::utils::read_u64_be;

/// Largest chain ID allowed by EIP-2294.
pub const MAX_CHAIN_ID: u64 = 0x7FFF_FFFF_FFFF_FFDB;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkParam {
    pub version: u8,
    pub value: Value,
}

impl NetworkParam {
    pub fn parse(payload: &[u8]) -> Result<Self, Error> {
        let (version, value) = parse_single_value(payload)?;
        Ok(Self { version, value })
    }

    pub fn format<C: DisplayContext + DeviceKeys + ?Sized>(
        &self,
        field: &Field,
        env: &mut FormatEnv<'_, C>,
    ) -> Result<(), Error> {
        if self.value.type_family != TypeFamily::Uint {
            log::warn!("gtp: network value must be a uint");
            return Err(Error::InvalidValue);
        }
        let values = env.resolve(&self.value)?;
        for value in &values {
            let chain_id = chain_id_from_bytes(value.as_bytes())?;
            let Some(name) = env.registry.network_name(chain_id) else {
                log::warn!("gtp: unknown network {}", chain_id);
                return Err(Error::NotFound);
            };
            env.add_field(ParamType::Network, &field.name, name, None)?;
        }
        Ok(())
    }
}

/// Reads a chain ID, which must fit in 64 bits and be in the EIP-2294 range.
fn chain_id_from_bytes(bytes: &[u8]) -> Result<u64, Error> {
    let significant = bytes.iter().position(|&b| b != 0).map_or(0, |i| bytes.len() - i);
    if significant > 8 {
        return Err(Error::InvalidValue);
    }
    let chain_id = read_u64_be(bytes);
    if chain_id == 0 || chain_id > MAX_CHAIN_ID {
        log::warn!("gtp: unsupported chain ID {}", chain_id);
        return Err(Error::InvalidValue);
    }
    Ok(chain_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::MockRegistry;
    use crate::parsing::field::{Param, Visibility};
    use crate::parsing::params::tests::{constant_value, container_value, rows, Harness};
    use crate::parsing::value::ContainerPath;
    use crate::tlv::TlvWriter;
    use alloc::vec;
    use alloc::vec::Vec;

    fn network(value: Vec<u8>) -> Param {
        let payload = TlvWriter::new().u8(0x00, 1).record(0x01, &value).finish();
        Param::Network(NetworkParam::parse(&payload).unwrap())
    }

    #[test]
    fn test_format_network() {
        let registry = MockRegistry::default()
            .with_network(1, "Ethereum", "ETH")
            .with_network(137, "Polygon", "POL");
        let mut h = Harness::new(registry);
        h.format("Network", network(container_value(TypeFamily::Uint, ContainerPath::ChainId)), Visibility::Always, vec![])
            .unwrap();
        h.format("Destination", network(constant_value(TypeFamily::Uint, &[0x89])), Visibility::Always, vec![])
            .unwrap();
        assert_eq!(
            h.rows(),
            rows(&[("Network", "Ethereum"), ("Destination", "Polygon")])
        );
    }

    #[test]
    fn test_rejects_out_of_range_chain_ids() {
        assert_eq!(chain_id_from_bytes(&[0; 32]), Err(Error::InvalidValue));
        assert_eq!(chain_id_from_bytes(&[0xff; 8]), Err(Error::InvalidValue));
        assert_eq!(chain_id_from_bytes(&[1; 9]), Err(Error::InvalidValue));
        assert_eq!(chain_id_from_bytes(&MAX_CHAIN_ID.to_be_bytes()), Ok(MAX_CHAIN_ID));

        let mut h = Harness::new(MockRegistry::default());
        assert_eq!(
            h.format("Network", network(constant_value(TypeFamily::Uint, &[0x05])), Visibility::Always, vec![]),
            Err(Error::NotFound)
        );
        assert_eq!(
            h.format("Network", network(constant_value(TypeFamily::Bytes, &[0x01])), Visibility::Always, vec![]),
            Err(Error::InvalidValue)
        );
    }
}
