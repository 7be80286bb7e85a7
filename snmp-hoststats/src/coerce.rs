//! SNMP wire value to metric value conversion.

use instrument_common::SampleValue;
use thiserror::Error;

use crate::session::{WireValue, octets_to_text};

/// The `datatype` label attached to emitted metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datatype {
    Counter,
    Gauge,
    Integer,
    String,
}

impl Datatype {
    pub fn as_str(&self) -> &'static str {
        match self {
            Datatype::Counter => "counter",
            Datatype::Gauge => "gauge",
            Datatype::Integer => "integer",
            Datatype::String => "string",
        }
    }
}

/// How the caller wants a field interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FieldKind {
    #[default]
    Plain,
    /// OCTET STRING holding a MAC address.
    HardwareAddress,
}

/// A successfully coerced field.
#[derive(Debug, Clone, PartialEq)]
pub struct Coerced {
    pub datatype: Datatype,
    /// `ticks` for TimeTicks.
    pub units: Option<&'static str>,
    pub value: SampleValue,
}

/// Why a field was skipped. Counted per poll cycle, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("unsupported SNMP type {0}")]
    Unsupported(&'static str),

    #[error("value '{0}' is not numeric")]
    NotNumeric(String),

    #[error("hardware address has {0} bytes, expected 6")]
    BadHardwareAddress(usize),

    #[error("missing field {0}")]
    MissingField(String),
}

impl SkipReason {
    /// Short key for diagnostic counters.
    pub fn kind(&self) -> &'static str {
        match self {
            SkipReason::Unsupported(_) => "unsupported",
            SkipReason::NotNumeric(_) => "not_numeric",
            SkipReason::BadHardwareAddress(_) => "bad_hwaddr",
            SkipReason::MissingField(_) => "missing_field",
        }
    }
}

/// Format six bytes as `xx:xx:xx:xx:xx:xx`.
pub fn format_mac_address(bytes: &[u8]) -> Result<String, SkipReason> {
    if bytes.len() != 6 {
        return Err(SkipReason::BadHardwareAddress(bytes.len()));
    }
    Ok(bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":"))
}

/// Map a wire value to its datatype label and sample value.
pub fn coerce(value: &WireValue, kind: FieldKind) -> Result<Coerced, SkipReason> {
    let numeric = |datatype: Datatype, n: f64| Coerced {
        datatype,
        units: None,
        value: SampleValue::Double(n),
    };
    match value {
        WireValue::Counter32(n) => Ok(numeric(Datatype::Counter, f64::from(*n))),
        WireValue::Counter64(n) => Ok(numeric(Datatype::Counter, *n as f64)),
        WireValue::Gauge32(n) => Ok(numeric(Datatype::Gauge, f64::from(*n))),
        WireValue::Integer(n) => Ok(numeric(Datatype::Integer, *n as f64)),
        WireValue::TimeTicks(n) => Ok(Coerced {
            units: Some("ticks"),
            ..numeric(Datatype::Integer, f64::from(*n))
        }),
        WireValue::OctetString(bytes) => {
            let text = match kind {
                FieldKind::HardwareAddress => format_mac_address(bytes)?,
                FieldKind::Plain => octets_to_text(bytes),
            };
            Ok(Coerced {
                datatype: Datatype::String,
                units: None,
                value: SampleValue::Text(text),
            })
        }
        other => Err(SkipReason::Unsupported(other.type_name())),
    }
}

/// Numeric value of a field that must be a number (sizes, counts).
///
/// Numeric strings are accepted; anything else is a skip.
pub fn require_number(value: Option<&WireValue>, field: &str) -> Result<f64, SkipReason> {
    let value = value.ok_or_else(|| SkipReason::MissingField(field.to_string()))?;
    match value {
        WireValue::Counter64(n) => Ok(*n as f64),
        other => other.as_i64().map(|n| n as f64).ok_or_else(|| match other {
            WireValue::OctetString(bytes) => SkipReason::NotNumeric(octets_to_text(bytes)),
            _ => SkipReason::Unsupported(other.type_name()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_counter() {
        let c = coerce(&WireValue::Counter32(42), FieldKind::Plain).unwrap();
        assert_eq!(c.datatype.as_str(), "counter");
        assert_eq!(c.value, SampleValue::Double(42.0));
        assert_eq!(c.units, None);

        let c = coerce(&WireValue::Counter64(1 << 40), FieldKind::Plain).unwrap();
        assert_eq!(c.datatype, Datatype::Counter);
    }

    #[test]
    fn test_coerce_gauge_integer_ticks() {
        assert_eq!(
            coerce(&WireValue::Gauge32(7), FieldKind::Plain).unwrap().datatype,
            Datatype::Gauge
        );
        assert_eq!(
            coerce(&WireValue::Integer(-1), FieldKind::Plain).unwrap().value,
            SampleValue::Double(-1.0)
        );
        let ticks = coerce(&WireValue::TimeTicks(100), FieldKind::Plain).unwrap();
        assert_eq!(ticks.datatype, Datatype::Integer);
        assert_eq!(ticks.units, Some("ticks"));
    }

    #[test]
    fn test_coerce_mac_address() {
        let mac = WireValue::OctetString(vec![0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        let c = coerce(&mac, FieldKind::HardwareAddress).unwrap();
        assert_eq!(c.datatype, Datatype::String);
        assert_eq!(c.value, SampleValue::Text("00:11:22:33:44:55".into()));

        let short = WireValue::OctetString(vec![0xde, 0xad]);
        assert_eq!(
            coerce(&short, FieldKind::HardwareAddress),
            Err(SkipReason::BadHardwareAddress(2))
        );
    }

    #[test]
    fn test_coerce_string() {
        let c = coerce(&WireValue::OctetString(b"eth0".to_vec()), FieldKind::Plain).unwrap();
        assert_eq!(c.value, SampleValue::Text("eth0".into()));
    }

    #[test]
    fn test_unsupported_types_are_skipped() {
        for value in [
            WireValue::Null,
            WireValue::IpAddress([10, 0, 0, 1]),
            WireValue::ObjectIdentifier("1.3.6".into()),
            WireValue::NoSuchInstance,
        ] {
            let err = coerce(&value, FieldKind::Plain).unwrap_err();
            assert_eq!(err.kind(), "unsupported");
        }
    }

    #[test]
    fn test_require_number() {
        assert_eq!(require_number(Some(&WireValue::Integer(4096)), "x"), Ok(4096.0));
        assert_eq!(
            require_number(Some(&WireValue::OctetString(b"12".to_vec())), "x"),
            Ok(12.0)
        );
        assert_eq!(
            require_number(Some(&WireValue::OctetString(Vec::new())), "x"),
            Err(SkipReason::NotNumeric(String::new()))
        );
        assert_eq!(
            require_number(None, "hrStorageSize"),
            Err(SkipReason::MissingField("hrStorageSize".into()))
        );
    }
}
