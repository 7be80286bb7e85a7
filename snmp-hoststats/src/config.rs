//! Host list configuration.
//!
//! The host file is INI: one section per polled device, named after the
//! device. A `[DEFAULT]` section supplies fallback values for every host.
//!
//! ```ini
//! [DEFAULT]
//! community = public
//! store = datastore:8020
//! interval = 60
//!
//! [sw1]
//! ip = 10.0.0.2
//! poll_interfaces = 1
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ini::{Ini, ParseOption};

use crate::error::ConfigError;
use crate::watch::FileFingerprint;

/// Section holding fallback values; never treated as a host.
pub const DEFAULT_SECTION: &str = "DEFAULT";

const DEFAULT_PORT: u16 = 161;
const DEFAULT_COMMUNITY: &str = "public";
const DEFAULT_INTERVAL_SECS: u64 = 60;
const DEFAULT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_MAX_REPETITIONS: u32 = 25;

/// SNMP protocol version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SnmpVersion {
    V1,
    #[default]
    V2c,
    V3,
}

/// SNMPv3 authentication protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthProtocol {
    #[default]
    Md5,
    Sha1,
}

/// Authentication parameters, derived from the SNMP version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// v1/v2c community string.
    Community(String),
    /// v3 user (no privacy/encryption).
    User {
        username: String,
        password: Option<String>,
        auth_protocol: AuthProtocol,
    },
}

/// Per-host feature switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Features {
    pub interfaces: bool,
    pub filesystems: bool,
    pub system: bool,
    pub sockets: bool,
}

/// Typed, validated view of one host section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    /// Section name; the `hostname` label of every metric.
    pub name: String,
    pub ip: String,
    pub port: u16,
    pub version: SnmpVersion,
    pub credentials: Credentials,
    pub interval: Duration,
    /// Datastore address (`host:port`).
    pub store: Option<String>,
    pub skip: bool,
    pub features: Features,
    /// Per-request SNMP timeout.
    pub timeout: Duration,
    pub max_repetitions: u32,
    /// Back off exponentially while the host is unreachable.
    pub backoff: bool,
}

impl HostConfig {
    /// Socket address string for the SNMP agent.
    pub fn address(&self) -> String {
        if self.ip.contains(':') && !self.ip.starts_with('[') {
            format!("[{}]:{}", self.ip, self.port)
        } else {
            format!("{}:{}", self.ip, self.port)
        }
    }

    fn from_section(name: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let invalid = |key: &str, value: &str, reason: &str| ConfigError::InvalidValue {
            host: name.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        };
        let number = |key: &str, default: u64| -> Result<u64, ConfigError> {
            match lookup(key) {
                Some(v) => v
                    .trim()
                    .parse::<u64>()
                    .map_err(|e| invalid(key, &v, &e.to_string())),
                None => Ok(default),
            }
        };
        let flag = |key: &str| -> Result<bool, ConfigError> {
            match lookup(key) {
                Some(v) => parse_flag(&v).ok_or_else(|| invalid(key, &v, "expected a boolean")),
                None => Ok(false),
            }
        };

        let version = match lookup("snmp_version").as_deref().map(str::trim) {
            None | Some("2") | Some("2c") => SnmpVersion::V2c,
            Some("1") => SnmpVersion::V1,
            Some("3") => SnmpVersion::V3,
            Some(other) => return Err(invalid("snmp_version", other, "expected 1, 2 or 3")),
        };

        let credentials = match version {
            SnmpVersion::V1 | SnmpVersion::V2c => Credentials::Community(
                lookup("community").unwrap_or_else(|| DEFAULT_COMMUNITY.to_string()),
            ),
            SnmpVersion::V3 => {
                let username = lookup("username").ok_or_else(|| ConfigError::MissingKey {
                    host: name.to_string(),
                    key: "username".to_string(),
                })?;
                let auth_protocol = match lookup("auth_protocol")
                    .map(|v| v.trim().to_ascii_lowercase())
                    .as_deref()
                {
                    None | Some("md5") => AuthProtocol::Md5,
                    Some("sha") | Some("sha1") => AuthProtocol::Sha1,
                    Some(other) => return Err(invalid("auth_protocol", other, "expected md5 or sha")),
                };
                Credentials::User {
                    username,
                    password: lookup("password"),
                    auth_protocol,
                }
            }
        };

        let port = number("port", DEFAULT_PORT as u64)?;
        let port = u16::try_from(port)
            .map_err(|_| invalid("port", &port.to_string(), "out of range"))?;

        let interval = number("interval", DEFAULT_INTERVAL_SECS)?;
        if interval == 0 {
            return Err(invalid("interval", "0", "must be at least 1 second"));
        }

        let max_repetitions = number("max_repetitions", DEFAULT_MAX_REPETITIONS as u64)?;
        let max_repetitions = u32::try_from(max_repetitions)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| invalid("max_repetitions", &max_repetitions.to_string(), "out of range"))?;

        Ok(Self {
            name: name.to_string(),
            ip: lookup("ip").unwrap_or_else(|| name.to_string()),
            port,
            version,
            credentials,
            interval: Duration::from_secs(interval),
            store: lookup("store").filter(|s| !s.trim().is_empty()),
            skip: flag("skip")?,
            features: Features {
                interfaces: flag("poll_interfaces")?,
                filesystems: flag("poll_filesystems")?,
                system: flag("poll_system_stats")?,
                sockets: flag("poll_socket_stats")?,
            },
            timeout: Duration::from_secs(number("timeout", DEFAULT_TIMEOUT_SECS)?.max(1)),
            max_repetitions,
            backoff: flag("backoff")?,
        })
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Immutable view of one successfully loaded config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSnapshot {
    defaults: BTreeMap<String, String>,
    sections: BTreeMap<String, BTreeMap<String, String>>,
    hosts: BTreeMap<String, Arc<HostConfig>>,
}

impl ConfigSnapshot {
    /// Parse INI content. `origin` is only used in error messages.
    pub fn parse(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        let options = ParseOption {
            enabled_quote: false,
            enabled_escape: false,
            ..ParseOption::default()
        };
        let ini = Ini::load_from_str_opt(content, options).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;

        let mut defaults = BTreeMap::new();
        let mut sections: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();

        for (section, properties) in ini.iter() {
            let target = match section {
                None => {
                    if let Some((key, _)) = properties.iter().next() {
                        return Err(ConfigError::Parse {
                            path: origin.to_path_buf(),
                            message: format!("key '{}' appears before any section header", key),
                        });
                    }
                    continue;
                }
                Some(DEFAULT_SECTION) => &mut defaults,
                Some(name) => sections.entry(name.trim().to_string()).or_default(),
            };
            for (key, value) in properties.iter() {
                target.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }

        let mut hosts = BTreeMap::new();
        for (name, values) in &sections {
            let lookup = |key: &str| values.get(key).or_else(|| defaults.get(key)).cloned();
            hosts.insert(name.clone(), Arc::new(HostConfig::from_section(name, lookup)?));
        }

        Ok(Self {
            defaults,
            sections,
            hosts,
        })
    }

    /// All host names, including skipped ones.
    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// Typed config for a host.
    pub fn host(&self, name: &str) -> Option<&Arc<HostConfig>> {
        self.hosts.get(name)
    }

    /// Hosts eligible for scheduling (`skip` unset).
    pub fn schedulable(&self) -> impl Iterator<Item = &Arc<HostConfig>> {
        self.hosts.values().filter(|h| !h.skip)
    }

    /// Raw configured value for `key`, falling back to `[DEFAULT]`.
    pub fn get(&self, host: &str, key: &str) -> Option<&str> {
        let key = key.to_ascii_lowercase();
        let section = self.sections.get(host)?;
        section
            .get(&key)
            .or_else(|| self.defaults.get(&key))
            .map(String::as_str)
    }

    /// Raw configured value for `key`, or `default` when absent.
    pub fn get_or<'a>(&'a self, host: &str, key: &str, default: &'a str) -> &'a str {
        self.get(host, key).unwrap_or(default)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

/// Owns the active snapshot and reloads it when the file changes.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    fingerprint: Option<FileFingerprint>,
    snapshot: Arc<ConfigSnapshot>,
}

impl ConfigStore {
    /// Load the config file. Fails if it is unreadable or malformed.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let fingerprint = FileFingerprint::of(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let snapshot = read_snapshot(&path)?;

        Ok(Self {
            path,
            fingerprint: Some(fingerprint),
            snapshot: Arc::new(snapshot),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The active snapshot. Readers keep their `Arc` for as long as they
    /// need; a reload never mutates it.
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.snapshot.clone()
    }

    /// Reload if the file's device/inode/mtime changed.
    ///
    /// Returns `Ok(true)` when a new snapshot was swapped in. On error the
    /// previous snapshot stays active and the same broken file is not
    /// reported again until it changes.
    pub fn check_and_reload(&mut self) -> Result<bool, ConfigError> {
        let current = match FileFingerprint::of(&self.path) {
            Ok(fp) => fp,
            Err(source) => {
                if self.fingerprint.take().is_none() {
                    return Ok(false);
                }
                return Err(ConfigError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        if self.fingerprint == Some(current) {
            return Ok(false);
        }
        self.fingerprint = Some(current);

        let snapshot = read_snapshot(&self.path)?;
        tracing::info!(
            path = %self.path.display(),
            hosts = snapshot.len(),
            "Reloaded configuration file"
        );
        self.snapshot = Arc::new(snapshot);
        Ok(true)
    }
}

fn read_snapshot(path: &Path) -> Result<ConfigSnapshot, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    ConfigSnapshot::parse(&content, path)
}
