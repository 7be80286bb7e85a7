//! SNMP bulk walks.
//!
//! [`Walker`] is the seam between the poller and the network. The real
//! implementation, [`SnmpSession`], opens one `snmp2` session per walk and
//! pages through the subtree with GETBULK (GETNEXT for v1 agents).

use std::cmp::Ordering;
use std::future::Future;

use snmp2::{AsyncSession, Oid, Value, v3};
use tokio::time::timeout;

use crate::config::{AuthProtocol, Credentials, HostConfig, SnmpVersion};
use crate::error::TransportError;
use crate::oid::{compare, oid_has_prefix, oid_to_string, parse_oid};

/// SNMPv1 `noSuchName`, returned by v1 agents when GETNEXT runs off the MIB.
const V1_NO_SUCH_NAME: u32 = 2;

/// An SNMP value detached from the response buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Integer(i64),
    OctetString(Vec<u8>),
    ObjectIdentifier(String),
    IpAddress([u8; 4]),
    Counter32(u32),
    /// Gauge32 / Unsigned32 share a wire tag.
    Gauge32(u32),
    TimeTicks(u32),
    Counter64(u64),
    Opaque(Vec<u8>),
    Null,
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
    /// Anything else the agent sent back (constructed types, PDUs).
    Other,
}

impl WireValue {
    /// SNMP type name, used in skip diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            WireValue::Integer(_) => "Integer",
            WireValue::OctetString(_) => "OctetString",
            WireValue::ObjectIdentifier(_) => "ObjectIdentifier",
            WireValue::IpAddress(_) => "IpAddress",
            WireValue::Counter32(_) => "Counter32",
            WireValue::Gauge32(_) => "Gauge32",
            WireValue::TimeTicks(_) => "TimeTicks",
            WireValue::Counter64(_) => "Counter64",
            WireValue::Opaque(_) => "Opaque",
            WireValue::Null => "Null",
            WireValue::NoSuchObject => "NoSuchObject",
            WireValue::NoSuchInstance => "NoSuchInstance",
            WireValue::EndOfMibView => "EndOfMibView",
            WireValue::Other => "Other",
        }
    }

    /// Numeric value for integer-like types.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            WireValue::Integer(n) => Some(*n),
            WireValue::Counter32(n) | WireValue::Gauge32(n) | WireValue::TimeTicks(n) => {
                Some(i64::from(*n))
            }
            WireValue::Counter64(n) => i64::try_from(*n).ok(),
            WireValue::OctetString(bytes) => std::str::from_utf8(bytes).ok()?.trim().parse().ok(),
            _ => None,
        }
    }

    /// Textual form, used for row titles and pivot keys.
    pub fn as_text(&self) -> Option<String> {
        match self {
            WireValue::OctetString(bytes) => Some(octets_to_text(bytes)),
            WireValue::ObjectIdentifier(oid) => Some(oid.clone()),
            WireValue::IpAddress(ip) => Some(format!("{}.{}.{}.{}", ip[0], ip[1], ip[2], ip[3])),
            other => other.as_i64().map(|n| n.to_string()),
        }
    }
}

/// Render an OCTET STRING as text; trailing NULs are dropped.
pub fn octets_to_text(bytes: &[u8]) -> String {
    let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |p| p + 1);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

impl From<&Value<'_>> for WireValue {
    fn from(value: &Value<'_>) -> Self {
        match value {
            Value::Integer(n) => WireValue::Integer(*n),
            Value::OctetString(s) => WireValue::OctetString(s.to_vec()),
            Value::ObjectIdentifier(oid) => WireValue::ObjectIdentifier(oid_to_string(oid)),
            Value::IpAddress(ip) => WireValue::IpAddress(*ip),
            Value::Counter32(n) => WireValue::Counter32(*n),
            Value::Unsigned32(n) => WireValue::Gauge32(*n),
            Value::Timeticks(n) => WireValue::TimeTicks(*n),
            Value::Counter64(n) => WireValue::Counter64(*n),
            Value::Opaque(bytes) => WireValue::Opaque(bytes.to_vec()),
            Value::Null => WireValue::Null,
            Value::NoSuchObject => WireValue::NoSuchObject,
            Value::NoSuchInstance => WireValue::NoSuchInstance,
            Value::EndOfMibView => WireValue::EndOfMibView,
            _ => WireValue::Other,
        }
    }
}

/// One (full OID, value) pair from a walk.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkEntry {
    pub oid: String,
    pub value: WireValue,
}

impl WalkEntry {
    pub fn new(oid: impl Into<String>, value: WireValue) -> Self {
        Self {
            oid: oid.into(),
            value,
        }
    }
}

/// Walks an OID subtree on one host.
///
/// Implementations must be safe to call concurrently for different hosts.
pub trait Walker: Send + Sync + 'static {
    /// Return every (OID, value) pair under `prefix`, in agent order.
    fn bulk_walk(
        &self,
        host: &HostConfig,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<WalkEntry>, TransportError>> + Send;
}

/// Fold one response page into `out`.
///
/// Returns the OID to continue from, or `None` when the walk is complete:
/// the page was empty, left the prefix, hit end-of-MIB, or failed to advance
/// past `last`. The entry that ended the walk is discarded.
pub(crate) fn accept_page(
    prefix: &str,
    last: &str,
    page: impl IntoIterator<Item = WalkEntry>,
    out: &mut Vec<WalkEntry>,
) -> Option<String> {
    let mut cursor = last.to_string();
    let mut any = false;
    for entry in page {
        if !oid_has_prefix(&entry.oid, prefix) || entry.oid == prefix {
            return None;
        }
        if entry.value == WireValue::EndOfMibView {
            return None;
        }
        if compare(&entry.oid, &cursor) != Ordering::Greater {
            tracing::debug!(prefix, oid = %entry.oid, "Agent returned a non-increasing OID");
            return None;
        }
        cursor.clone_from(&entry.oid);
        out.push(entry);
        any = true;
    }
    any.then_some(cursor)
}

fn session_error(address: &str, e: &dyn std::fmt::Display) -> TransportError {
    TransportError::Session {
        address: address.to_string(),
        message: e.to_string(),
    }
}

/// The `snmp2`-backed [`Walker`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SnmpSession;

impl SnmpSession {
    pub fn new() -> Self {
        Self
    }

    /// Open a session with auth parameters derived from the SNMP version.
    async fn open(host: &HostConfig) -> Result<AsyncSession, TransportError> {
        let address = host.address();

        match (&host.credentials, host.version) {
            (Credentials::Community(community), SnmpVersion::V1) => {
                AsyncSession::new_v1(&address, community.as_bytes(), 0)
                    .await
                    .map_err(|e| session_error(&address, &e))
            }
            (Credentials::Community(community), _) => {
                AsyncSession::new_v2c(&address, community.as_bytes(), 0)
                    .await
                    .map_err(|e| session_error(&address, &e))
            }
            (
                Credentials::User {
                    username,
                    password,
                    auth_protocol,
                },
                _,
            ) => {
                let password = password.as_deref().unwrap_or_default();
                let protocol = match auth_protocol {
                    AuthProtocol::Md5 => v3::AuthProtocol::Md5,
                    AuthProtocol::Sha1 => v3::AuthProtocol::Sha1,
                };
                let auth = if password.is_empty() {
                    v3::Auth::NoAuthNoPriv
                } else {
                    v3::Auth::AuthNoPriv
                };
                let security = v3::Security::new(username.as_bytes(), password.as_bytes())
                    .with_auth_protocol(protocol)
                    .with_auth(auth);
                let mut session = AsyncSession::new_v3(&address, 0, security)
                    .await
                    .map_err(|e| session_error(&address, &e))?;
                session.init().await.map_err(|e| session_error(&address, &e))?;
                Ok(session)
            }
        }
    }

    /// Fetch the page following `cursor`.
    async fn next_page(
        session: &mut AsyncSession,
        host: &HostConfig,
        cursor: &Oid<'_>,
    ) -> Result<Option<Vec<WalkEntry>>, TransportError> {
        let pdu = if host.version == SnmpVersion::V1 {
            session.getnext(cursor).await
        } else {
            session.getbulk(&[cursor], 0, host.max_repetitions).await
        }
        .map_err(|e| TransportError::Request(e.to_string()))?;

        if pdu.error_status != 0 {
            if host.version == SnmpVersion::V1 && pdu.error_status == V1_NO_SUCH_NAME {
                return Ok(None);
            }
            return Err(TransportError::Agent {
                status: pdu.error_status,
                index: pdu.error_index,
            });
        }

        Ok(Some(
            pdu.varbinds
                .map(|(oid, value)| WalkEntry::new(oid_to_string(&oid), WireValue::from(&value)))
                .collect(),
        ))
    }

    async fn walk(host: &HostConfig, prefix: &str) -> Result<Vec<WalkEntry>, TransportError> {
        let timed_out = || TransportError::Timeout {
            prefix: prefix.to_string(),
        };
        let mut session = timeout(host.timeout, Self::open(host))
            .await
            .map_err(|_| timed_out())??;

        let mut results = Vec::new();
        let mut cursor = prefix.trim_start_matches('.').to_string();
        loop {
            let oid = parse_oid(&cursor)?;
            let page = timeout(host.timeout, Self::next_page(&mut session, host, &oid))
                .await
                .map_err(|_| timed_out())??;
            let Some(page) = page else {
                break;
            };
            match accept_page(prefix, &cursor, page, &mut results) {
                Some(next) => cursor = next,
                None => break,
            }
        }
        Ok(results)
    }
}

impl Walker for SnmpSession {
    async fn bulk_walk(
        &self,
        host: &HostConfig,
        prefix: &str,
    ) -> Result<Vec<WalkEntry>, TransportError> {
        let result = Self::walk(host, prefix).await;
        if let Ok(entries) = &result {
            tracing::trace!(host = %host.name, prefix, entries = entries.len(), "Walk complete");
        }
        result
    }
}
