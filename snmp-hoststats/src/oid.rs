use std::cmp::Ordering;

use snmp2::Oid;

use crate::error::TransportError;

/// Parse an OID string (e.g., "1.3.6.1.2.1.1.3.0") into an snmp2::Oid.
pub fn parse_oid(oid_str: &str) -> Result<Oid<'static>, TransportError> {
    oid_str
        .trim_start_matches('.')
        .parse::<Oid>()
        .map_err(|_| TransportError::InvalidOid(oid_str.to_string()))
        .map(|oid| oid.to_owned())
}

/// Convert an snmp2::Oid back to a dotted string representation.
pub fn oid_to_string(oid: &Oid) -> String {
    oid.to_id_string()
}

/// Check if a dotted OID is a child of (or equal to) `prefix`, component-wise.
///
/// `1.3.6.1.2.1.2.20` is not under `1.3.6.1.2.1.2.2`.
pub fn oid_has_prefix(oid: &str, prefix: &str) -> bool {
    let oid = oid.trim_start_matches('.');
    let prefix = prefix.trim_start_matches('.');
    match oid.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('.'),
        None => false,
    }
}

/// Split off the last component: `1.3.6.1` -> (`1.3.6`, `1`).
pub fn split_last(oid: &str) -> Option<(&str, &str)> {
    oid.rsplit_once('.')
}

/// Compare two dotted OIDs in lexicographic component order (numeric, not
/// string order: `1.10` sorts after `1.9`).
pub fn compare(a: &str, b: &str) -> Ordering {
    let components = |oid: &str| {
        oid.trim_start_matches('.')
            .split('.')
            .map(|c| c.parse::<u64>().unwrap_or(u64::MAX))
            .collect::<Vec<_>>()
    };
    components(a).cmp(&components(b))
}
