//! Feature collectors.
//!
//! Each collector turns the walk results for one feature into metrics. They
//! never fail as a whole: a field that cannot be converted is skipped and
//! counted in [`Collection::skipped`].

use std::collections::BTreeMap;

use instrument_common::{Batch, SampleValue};

use crate::coerce::{self, FieldKind, SkipReason, require_number};
use crate::metrics::MetricBuilder;
use crate::mib::{
    HR_STORAGE_FIXED_DISK, HR_STORAGE_RAM, HR_STORAGE_VIRTUAL_MEMORY, MibResolver,
};
use crate::session::{WalkEntry, WireValue};
use crate::table::{INDEX_FIELD, TableBuilder, TableRow};

const INTERFACE_PATH: &str = "/network/interface/stats";

/// Interface columns to keep, with the ifXTable column that supersedes them.
const INTERFACE_STATS: &[(&str, Option<&str>)] = &[
    ("ifAdminStatus", None),
    ("ifDescr", None),
    ("ifInDiscards", None),
    ("ifInErrors", None),
    ("ifInNUcastPkts", Some("ifHCInBroadcastPkts")),
    ("ifInOctets", Some("ifHCInOctets")),
    ("ifInUcastPkts", Some("ifHCInUcastPkts")),
    ("ifMtu", None),
    ("ifOperStatus", None),
    ("ifOutDiscards", None),
    ("ifOutErrors", None),
    ("ifOutNUcastPkts", Some("ifHCOutBroadcastPkts")),
    ("ifOutOctets", Some("ifHCOutOctets")),
    ("ifOutQLen", None),
    ("ifOutUcastPkts", Some("ifHCOutUcastPkts")),
    ("ifSpeed", None),
    ("ifType", None),
    ("ifPhysAddress", None),
];

/// Metrics and skip counts produced during one host cycle.
#[derive(Debug, Default)]
pub struct Collection {
    pub batch: Batch,
    pub skipped: BTreeMap<&'static str, usize>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a skipped field.
    pub fn skip(&mut self, field: &str, reason: SkipReason) {
        tracing::debug!(field, reason = %reason, "Skipping field");
        *self.skipped.entry(reason.kind()).or_default() += 1;
    }

    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }
}

/// Interface counters: the ifTable joined with ifXTable by interface index.
///
/// High-capacity columns override their 32-bit counterparts when present.
pub fn interface_stats(
    metrics: &MetricBuilder,
    mib: &MibResolver,
    if_walk: &[WalkEntry],
    if_x_walk: &[WalkEntry],
    out: &mut Collection,
) {
    let builder = TableBuilder::new(mib);
    let table = builder.build(if_walk, Some("ifDescr"));
    let hc_table = TableBuilder::pivot(&builder.build(if_x_walk, None), INDEX_FIELD);

    for (interface, row) in &table {
        let if_index = row
            .get("ifIndex")
            .and_then(WireValue::as_text)
            .unwrap_or_else(|| row.index.clone());
        let hc_row = hc_table.get(&if_index);

        for (stat, hc_stat) in INTERFACE_STATS {
            let Some(primary) = row.get(stat) else {
                continue;
            };
            let value = (*hc_stat)
                .zip(hc_row)
                .and_then(|(hc_stat, hc_row)| hc_row.get(hc_stat))
                .unwrap_or(primary);

            let kind = if *stat == "ifPhysAddress" {
                FieldKind::HardwareAddress
            } else {
                FieldKind::Plain
            };
            match coerce::coerce(value, kind) {
                Ok(coerced) => metrics.emit_coerced(
                    &mut out.batch,
                    &format!("{}/{}", INTERFACE_PATH, stat),
                    [("interface", interface.clone())],
                    coerced,
                ),
                Err(reason) => out.skip(stat, reason),
            }
        }
    }
}

/// Storage rows whose `hrStorageType` is one of `types`.
fn storage_rows<'t>(
    table: &'t BTreeMap<String, TableRow>,
    types: &'t [&'t str],
) -> impl Iterator<Item = (&'t String, &'t TableRow)> {
    table.iter().filter(move |(_, row)| {
        row.get("hrStorageType")
            .and_then(WireValue::as_text)
            .is_some_and(|t| types.iter().any(|ty| *ty == t.trim_start_matches('.')))
    })
}

/// Size, used and available bytes of one storage row.
fn storage_bytes(row: &TableRow) -> Result<(f64, f64, f64), (&'static str, SkipReason)> {
    let field = |name: &'static str| require_number(row.get(name), name).map_err(|e| (name, e));
    let block_size = field("hrStorageAllocationUnits")?;
    let size = field("hrStorageSize")?;
    let used = field("hrStorageUsed")?;
    Ok((size * block_size, used * block_size, (size - used) * block_size))
}

/// Fixed-disk usage in bytes; other storage types are ignored entirely.
pub fn filesystem_stats(
    metrics: &MetricBuilder,
    mib: &MibResolver,
    storage_walk: &[WalkEntry],
    out: &mut Collection,
) {
    let table = TableBuilder::new(mib).build(storage_walk, Some("hrStorageDescr"));
    for (device, row) in storage_rows(&table, &[HR_STORAGE_FIXED_DISK]) {
        match storage_bytes(row) {
            Ok((size, used, available)) => {
                let labels = || [("device", device.clone())];
                metrics.emit(&mut out.batch, "/system/filesystem/size", labels(), size);
                metrics.emit(&mut out.batch, "/system/filesystem/used", labels(), used);
                metrics.emit(&mut out.batch, "/system/filesystem/available", labels(), available);
            }
            Err((field, reason)) => out.skip(field, reason),
        }
    }
}

/// Uptime, boot parameters, user/process counts and RAM usage.
pub fn system_stats(
    metrics: &MetricBuilder,
    mib: &MibResolver,
    system_walk: &[WalkEntry],
    storage_walk: &[WalkEntry],
    out: &mut Collection,
) {
    let builder = TableBuilder::new(mib);
    let scalars = builder.scalars(system_walk);
    let gauge = || [("datatype", "gauge".to_string())];

    if let Some(ticks) = scalars.get("hrSystemUptime") {
        match require_number(Some(ticks), "hrSystemUptime") {
            Ok(ticks) => {
                let seconds = (ticks / 100.0).trunc();
                metrics.emit(&mut out.batch, "/system/uptime", gauge(), seconds);
            }
            Err(reason) => out.skip("hrSystemUptime", reason),
        }
    }
    if let Some(value) = scalars.get("hrSystemInitialLoadParameters") {
        let text = value.as_text().unwrap_or_default();
        metrics.emit(
            &mut out.batch,
            "/system/boot/kernel-commandline",
            [("datatype", "string".to_string())],
            SampleValue::Text(text),
        );
    }
    for (field, path) in [
        ("hrSystemNumUsers", "/system/num_users"),
        ("hrSystemProcesses", "/system/num_processes"),
    ] {
        let Some(value) = scalars.get(field) else {
            continue;
        };
        match require_number(Some(value), field) {
            Ok(n) => metrics.emit(&mut out.batch, path, gauge(), n),
            Err(reason) => out.skip(field, reason),
        }
    }

    let table = builder.build(storage_walk, Some("hrStorageDescr"));
    for (_, row) in storage_rows(&table, &[HR_STORAGE_RAM, HR_STORAGE_VIRTUAL_MEMORY]) {
        let space = row
            .get("hrStorageDescr")
            .and_then(WireValue::as_text)
            .unwrap_or_else(|| row.index.clone());
        match storage_bytes(row) {
            Ok((size, used, available)) => {
                let labels = || [("datatype", "gauge".to_string()), ("space", space.clone())];
                metrics.emit(&mut out.batch, "/system/ram/size", labels(), size);
                metrics.emit(&mut out.batch, "/system/ram/used", labels(), used);
                metrics.emit(&mut out.batch, "/system/ram/available", labels(), available);
            }
            Err((field, reason)) => out.skip(field, reason),
        }
    }
}

/// TCP and UDP protocol counters (`tcpInSegs`, `udpNoPorts`, ...).
pub fn socket_stats(
    metrics: &MetricBuilder,
    mib: &MibResolver,
    tcp_walk: &[WalkEntry],
    udp_walk: &[WalkEntry],
    out: &mut Collection,
) {
    let builder = TableBuilder::new(mib);
    for (protocol, walk) in [("tcp", tcp_walk), ("udp", udp_walk)] {
        for entry in walk {
            // Only scalars; connection tables have multi-component indexes.
            let Some((name, "0")) = builder.cell(&entry.oid) else {
                continue;
            };
            match coerce::coerce(&entry.value, FieldKind::Plain) {
                Ok(coerced) => metrics.emit_coerced(
                    &mut out.batch,
                    &format!("/network/{}/{}", protocol, name),
                    Vec::<(&str, String)>::new(),
                    coerced,
                ),
                Err(reason) => out.skip(&name, reason),
            }
        }
    }
}
