//! DURATION parameter: a number of seconds.

use alloc::string::String;
use alloc::vec::Vec;
use common::error::Error;

use super::parse_single_value;
use crate::context::{DeviceKeys, DisplayContext};
use crate::parsing::field::{Field, ParamType};
use crate::parsing::value::Value;
use crate::parsing::FormatEnv;
use crate::utils::read_u64_be;

const SECONDS_IN_MINUTE: u64 = 60;
const SECONDS_IN_HOUR: u64 = 60 * SECONDS_IN_MINUTE;
const SECONDS_IN_DAY: u64 = 24 * SECONDS_IN_HOUR;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurationParam {
    pub version: u8,
    pub value: Value,
}

impl DurationParam {
    pub fn parse(payload: &[u8]) -> Result<Self, Error> {
        let (version, value) = parse_single_value(payload)?;
        Ok(Self { version, value })
    }

    pub fn format<C: DisplayContext + DeviceKeys + ?Sized>(
        &self,
        field: &Field,
        env: &mut FormatEnv<'_, C>,
    ) -> Result<(), Error> {
        let values = env.resolve(&self.value)?;
        for value in &values {
            let text = format_duration(read_u64_be(value.as_bytes()));
            env.add_field(ParamType::Duration, &field.name, text, None)?;
        }
        Ok(())
    }
}

/// `1d 01h 01m 01s`, zero components left out. Zero is `00s`.
fn format_duration(seconds: u64) -> String {
    let days = seconds / SECONDS_IN_DAY;
    let hours = (seconds % SECONDS_IN_DAY) / SECONDS_IN_HOUR;
    let minutes = (seconds % SECONDS_IN_HOUR) / SECONDS_IN_MINUTE;
    let secs = seconds % SECONDS_IN_MINUTE;

    let mut parts = Vec::with_capacity(4);
    if days > 0 {
        parts.push(alloc::format!("{}d", days));
    }
    if hours > 0 {
        parts.push(alloc::format!("{:02}h", hours));
    }
    if minutes > 0 {
        parts.push(alloc::format!("{:02}m", minutes));
    }
    if secs > 0 || parts.is_empty() {
        parts.push(alloc::format!("{:02}s", secs));
    }
    parts.join(" ")
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

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "00s");
        assert_eq!(format_duration(90_061), "1d 01h 01m 01s");
        assert_eq!(format_duration(45), "45s");
        assert_eq!(format_duration(3_600), "01h");
        assert_eq!(format_duration(86_405), "1d 05s");
        assert_eq!(format_duration(30 * 86_400 + 600), "30d 10m");
    }

    #[test]
    fn test_format_field() {
        let payload = TlvWriter::new()
            .u8(0x00, 1)
            .record(0x01, &constant_value(TypeFamily::Uint, &90_061u32.to_be_bytes()))
            .finish();
        let param = Param::Duration(DurationParam::parse(&payload).unwrap());
        let mut h = Harness::new(MockRegistry::default());
        h.format("Lock", param, Visibility::Always, vec![]).unwrap();
        assert_eq!(h.rows(), rows(&[("Lock", "1d 01h 01m 01s")]));
        assert_eq!(h.row_types(), vec![ParamType::Duration]);
    }
}
