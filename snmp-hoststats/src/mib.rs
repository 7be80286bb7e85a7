//! MIB (Management Information Base) name resolution.
//!
//! Walk results arrive as numeric OIDs. The collectors work with MIB column
//! names (`ifDescr`, `hrStorageSize`, ...) so the resolver maps each OID to
//! an object name plus the instance suffix that follows it:
//!
//! ```ignore
//! let resolver = MibResolver::builtin();
//! let (name, index) = resolver.split("1.3.6.1.2.1.2.2.1.10.5").unwrap();
//! assert_eq!((name, index), ("ifInOctets", "5"));
//! assert_eq!(resolver.resolve("1.3.6.1.2.1.25.1.1.0"), "hrSystemUptime.0");
//! ```

use std::collections::HashMap;

use crate::oid::split_last;

/// `interfaces.ifTable` (IF-MIB).
pub const IF_TABLE: &str = "1.3.6.1.2.1.2.2";
/// `ifMIBObjects.ifXTable`, high-capacity interface counters (IF-MIB).
pub const IF_X_TABLE: &str = "1.3.6.1.2.1.31.1.1";
/// `host.hrStorage.hrStorageTable` (HOST-RESOURCES-MIB).
pub const HR_STORAGE_TABLE: &str = "1.3.6.1.2.1.25.2.3";
/// `host.hrSystem` scalars (HOST-RESOURCES-MIB).
pub const HR_SYSTEM: &str = "1.3.6.1.2.1.25.1";
/// `mib-2.tcp` group (TCP-MIB).
pub const TCP: &str = "1.3.6.1.2.1.6";
/// `mib-2.udp` group (UDP-MIB).
pub const UDP: &str = "1.3.6.1.2.1.7";

/// `hrStorageRam` (HOST-RESOURCES-TYPES).
pub const HR_STORAGE_RAM: &str = "1.3.6.1.2.1.25.2.1.2";
/// `hrStorageVirtualMemory` (HOST-RESOURCES-TYPES).
pub const HR_STORAGE_VIRTUAL_MEMORY: &str = "1.3.6.1.2.1.25.2.1.3";
/// `hrStorageFixedDisk` (HOST-RESOURCES-TYPES).
pub const HR_STORAGE_FIXED_DISK: &str = "1.3.6.1.2.1.25.2.1.4";

/// A group of sibling objects under one base OID.
struct MibGroup {
    module: &'static str,
    base: &'static str,
    objects: &'static [(u32, &'static str)],
}

const BUILTIN: &[MibGroup] = &[
    MibGroup {
        module: "IF-MIB",
        base: "1.3.6.1.2.1.2.2.1",
        objects: &[
            (1, "ifIndex"),
            (2, "ifDescr"),
            (3, "ifType"),
            (4, "ifMtu"),
            (5, "ifSpeed"),
            (6, "ifPhysAddress"),
            (7, "ifAdminStatus"),
            (8, "ifOperStatus"),
            (9, "ifLastChange"),
            (10, "ifInOctets"),
            (11, "ifInUcastPkts"),
            (12, "ifInNUcastPkts"),
            (13, "ifInDiscards"),
            (14, "ifInErrors"),
            (15, "ifInUnknownProtos"),
            (16, "ifOutOctets"),
            (17, "ifOutUcastPkts"),
            (18, "ifOutNUcastPkts"),
            (19, "ifOutDiscards"),
            (20, "ifOutErrors"),
            (21, "ifOutQLen"),
            (22, "ifSpecific"),
        ],
    },
    MibGroup {
        module: "IF-MIB",
        base: "1.3.6.1.2.1.31.1.1.1",
        objects: &[
            (1, "ifName"),
            (2, "ifInMulticastPkts"),
            (3, "ifInBroadcastPkts"),
            (4, "ifOutMulticastPkts"),
            (5, "ifOutBroadcastPkts"),
            (6, "ifHCInOctets"),
            (7, "ifHCInUcastPkts"),
            (8, "ifHCInMulticastPkts"),
            (9, "ifHCInBroadcastPkts"),
            (10, "ifHCOutOctets"),
            (11, "ifHCOutUcastPkts"),
            (12, "ifHCOutMulticastPkts"),
            (13, "ifHCOutBroadcastPkts"),
            (14, "ifLinkUpDownTrapEnable"),
            (15, "ifHighSpeed"),
            (16, "ifPromiscuousMode"),
            (17, "ifConnectorPresent"),
            (18, "ifAlias"),
            (19, "ifCounterDiscontinuityTime"),
        ],
    },
    MibGroup {
        module: "HOST-RESOURCES-MIB",
        base: "1.3.6.1.2.1.25.1",
        objects: &[
            (1, "hrSystemUptime"),
            (2, "hrSystemDate"),
            (3, "hrSystemInitialLoadDevice"),
            (4, "hrSystemInitialLoadParameters"),
            (5, "hrSystemNumUsers"),
            (6, "hrSystemProcesses"),
            (7, "hrSystemMaxProcesses"),
        ],
    },
    MibGroup {
        module: "HOST-RESOURCES-MIB",
        base: "1.3.6.1.2.1.25.2.3.1",
        objects: &[
            (1, "hrStorageIndex"),
            (2, "hrStorageType"),
            (3, "hrStorageDescr"),
            (4, "hrStorageAllocationUnits"),
            (5, "hrStorageSize"),
            (6, "hrStorageUsed"),
            (7, "hrStorageAllocationFailures"),
        ],
    },
    MibGroup {
        module: "TCP-MIB",
        base: "1.3.6.1.2.1.6",
        objects: &[
            (1, "tcpRtoAlgorithm"),
            (2, "tcpRtoMin"),
            (3, "tcpRtoMax"),
            (4, "tcpMaxConn"),
            (5, "tcpActiveOpens"),
            (6, "tcpPassiveOpens"),
            (7, "tcpAttemptFails"),
            (8, "tcpEstabResets"),
            (9, "tcpCurrEstab"),
            (10, "tcpInSegs"),
            (11, "tcpOutSegs"),
            (12, "tcpRetransSegs"),
            (13, "tcpConnTable"),
            (14, "tcpInErrs"),
            (15, "tcpOutRsts"),
        ],
    },
    MibGroup {
        module: "UDP-MIB",
        base: "1.3.6.1.2.1.7",
        objects: &[
            (1, "udpInDatagrams"),
            (2, "udpNoPorts"),
            (3, "udpInErrors"),
            (4, "udpOutDatagrams"),
            (5, "udpTable"),
        ],
    },
];

/// An object known to the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MibObject {
    pub name: &'static str,
    pub module: &'static str,
}

/// Resolves numeric OIDs to MIB object names (longest prefix match).
#[derive(Debug, Clone, Default)]
pub struct MibResolver {
    objects: HashMap<String, MibObject>,
}

impl MibResolver {
    /// Create an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// A resolver preloaded with IF-MIB, HOST-RESOURCES-MIB, TCP-MIB and
    /// UDP-MIB objects used by the collectors.
    pub fn builtin() -> Self {
        let mut resolver = Self::new();
        for group in BUILTIN {
            for (sub, name) in group.objects {
                resolver.insert(format!("{}.{}", group.base, sub), name, group.module);
            }
        }
        resolver
    }

    /// Register an object.
    pub fn insert(&mut self, oid: impl Into<String>, name: &'static str, module: &'static str) {
        self.objects.insert(oid.into(), MibObject { name, module });
    }

    /// Find the longest known object prefix of `oid`.
    ///
    /// Returns the object and the instance suffix after it (may be empty).
    pub fn lookup<'a>(&self, oid: &'a str) -> Option<(&MibObject, &'a str)> {
        let oid = oid.trim_start_matches('.');
        let mut prefix = oid;
        loop {
            if let Some(object) = self.objects.get(prefix) {
                let suffix = oid[prefix.len()..].trim_start_matches('.');
                return Some((object, suffix));
            }
            prefix = split_last(prefix)?.0;
        }
    }

    /// Object name and instance suffix, e.g. (`ifInOctets`, `5`).
    pub fn split<'a>(&self, oid: &'a str) -> Option<(&'static str, &'a str)> {
        self.lookup(oid).map(|(object, suffix)| (object.name, suffix))
    }

    /// Resolve an OID to a human-readable name (`ifInOctets.5`).
    ///
    /// Returns the original OID when nothing matches.
    pub fn resolve(&self, oid: &str) -> String {
        match self.split(oid) {
            Some((name, "")) => name.to_string(),
            Some((name, suffix)) => format!("{}.{}", name, suffix),
            None => oid.to_string(),
        }
    }

    /// Get total number of known objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_resolution() {
        let resolver = MibResolver::builtin();

        assert_eq!(resolver.resolve("1.3.6.1.2.1.2.2.1.10.1"), "ifInOctets.1");
        assert_eq!(resolver.resolve("1.3.6.1.2.1.2.2.1.16.5"), "ifOutOctets.5");
        assert_eq!(resolver.resolve("1.3.6.1.2.1.31.1.1.1.6.3"), "ifHCInOctets.3");
        assert_eq!(
            resolver.resolve("1.3.6.1.2.1.25.1.1.0"),
            "hrSystemUptime.0"
        );
        assert_eq!(
            resolver.resolve("1.3.6.1.2.1.25.2.3.1.3.31"),
            "hrStorageDescr.31"
        );
        assert_eq!(resolver.resolve("1.3.6.1.2.1.6.9.0"), "tcpCurrEstab.0");

        // Unknown OID returns as-is
        assert_eq!(
            resolver.resolve("1.3.6.1.4.1.9.9.999.0"),
            "1.3.6.1.4.1.9.9.999.0"
        );
    }

    #[test]
    fn test_split_multi_component_index() {
        let resolver = MibResolver::builtin();
        // tcpConnTable rows resolve to the table object with a long suffix.
        let (name, suffix) = resolver.split("1.3.6.1.2.1.6.13.1.1.10.0.0.1.22").unwrap();
        assert_eq!(name, "tcpConnTable");
        assert_eq!(suffix, "1.1.10.0.0.1.22");
    }

    #[test]
    fn test_lookup_module() {
        let resolver = MibResolver::builtin();
        let (object, _) = resolver.lookup(".1.3.6.1.2.1.25.2.3.1.5.1").unwrap();
        assert_eq!(object.name, "hrStorageSize");
        assert_eq!(object.module, "HOST-RESOURCES-MIB");
        assert!(resolver.lookup("1.3.6.1.4.1").is_none());
    }

    #[test]
    fn test_custom_objects() {
        let mut resolver = MibResolver::new();
        assert!(resolver.is_empty());
        resolver.insert("1.3.6.1.4.1.9999.1", "myCounter", "CUSTOM-MIB");
        assert_eq!(resolver.resolve("1.3.6.1.4.1.9999.1.0"), "myCounter.0");
        assert_eq!(resolver.resolve("1.3.6.1.4.1.9999.1"), "myCounter");
        assert_eq!(resolver.len(), 1);
    }
}
