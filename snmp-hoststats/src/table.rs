//! Turning flat walk results into tables.

use std::collections::BTreeMap;

use crate::mib::MibResolver;
use crate::oid::split_last;
use crate::session::{WalkEntry, WireValue};

/// Pseudo-column naming a row's raw SNMP index in [`TableBuilder::pivot`].
pub const INDEX_FIELD: &str = "index";

/// One table row: the raw SNMP index plus column name to value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableRow {
    pub index: String,
    pub columns: BTreeMap<String, WireValue>,
}

impl TableRow {
    pub fn get(&self, column: &str) -> Option<&WireValue> {
        self.columns.get(column)
    }

    /// Value of `field`, where [`INDEX_FIELD`] names the raw index.
    fn key_for(&self, field: &str) -> Option<String> {
        if field == INDEX_FIELD {
            return Some(self.index.clone());
        }
        self.get(field).and_then(WireValue::as_text)
    }
}

/// Rows keyed by title (or raw index when untitled).
pub type Table = BTreeMap<String, TableRow>;

/// Groups walk results into rows using MIB column names.
#[derive(Debug, Clone, Copy)]
pub struct TableBuilder<'a> {
    mib: &'a MibResolver,
}

impl<'a> TableBuilder<'a> {
    pub fn new(mib: &'a MibResolver) -> Self {
        Self { mib }
    }

    /// Split an OID into (column, row index).
    ///
    /// Known columns come from the MIB; otherwise the penultimate component
    /// is the column and the last one the index.
    pub fn cell<'o>(&self, oid: &'o str) -> Option<(String, &'o str)> {
        if let Some((name, index)) = self.mib.split(oid) {
            if !index.is_empty() {
                return Some((name.to_string(), index));
            }
        }
        let (head, index) = split_last(oid)?;
        let (_, column) = split_last(head)?;
        Some((column.to_string(), index))
    }

    /// Build a table from a walk over a table OID.
    ///
    /// Rows whose `title` column holds a value are keyed by that value;
    /// the rest keep their raw index.
    pub fn build(&self, results: &[WalkEntry], title: Option<&str>) -> Table {
        let mut rows: BTreeMap<String, TableRow> = BTreeMap::new();
        for entry in results {
            let Some((column, index)) = self.cell(&entry.oid) else {
                tracing::debug!(oid = %entry.oid, "Cannot split table OID");
                continue;
            };
            rows.entry(index.to_string())
                .or_insert_with(|| TableRow {
                    index: index.to_string(),
                    columns: BTreeMap::new(),
                })
                .columns
                .insert(column, entry.value.clone());
        }

        let Some(title) = title else {
            return rows;
        };
        let mut table = Table::new();
        for (index, row) in rows {
            let key = row
                .get(title)
                .and_then(WireValue::as_text)
                .unwrap_or(index);
            if table.contains_key(&key) {
                tracing::debug!(title, key = %key, "Duplicate row title, later row wins");
            }
            table.insert(key, row);
        }
        table
    }

    /// Collapse a walk over scalar objects (`…x.0`) into column name to value.
    pub fn scalars(&self, results: &[WalkEntry]) -> BTreeMap<String, WireValue> {
        results
            .iter()
            .filter_map(|entry| {
                let (column, _) = self.cell(&entry.oid)?;
                Some((column, entry.value.clone()))
            })
            .collect()
    }

    /// Re-key `table` by the value of `field` in each row.
    ///
    /// Rows without that field are dropped.
    pub fn pivot(table: &Table, field: &str) -> Table {
        table
            .values()
            .filter_map(|row| Some((row.key_for(field)?, row.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn if_walk() -> Vec<WalkEntry> {
        vec![
            WalkEntry::new("1.3.6.1.2.1.2.2.1.1.1", WireValue::Integer(1)),
            WalkEntry::new("1.3.6.1.2.1.2.2.1.1.2", WireValue::Integer(2)),
            WalkEntry::new(
                "1.3.6.1.2.1.2.2.1.2.1",
                WireValue::OctetString(b"eth0".to_vec()),
            ),
            WalkEntry::new("1.3.6.1.2.1.2.2.1.10.1", WireValue::Counter32(100)),
            WalkEntry::new("1.3.6.1.2.1.2.2.1.10.2", WireValue::Counter32(200)),
        ]
    }

    #[test]
    fn test_build_renames_titled_rows() {
        let mib = MibResolver::builtin();
        let table = TableBuilder::new(&mib).build(&if_walk(), Some("ifDescr"));

        assert_eq!(table.len(), 2);
        let eth0 = &table["eth0"];
        assert_eq!(eth0.index, "1");
        assert_eq!(eth0.get("ifInOctets"), Some(&WireValue::Counter32(100)));
        // No ifDescr for row 2: raw index kept.
        assert_eq!(table["2"].get("ifInOctets"), Some(&WireValue::Counter32(200)));
    }

    #[test]
    fn test_build_is_idempotent() {
        let mib = MibResolver::builtin();
        let builder = TableBuilder::new(&mib);
        let walk = if_walk();
        assert_eq!(
            builder.build(&walk, Some("ifDescr")),
            builder.build(&walk, Some("ifDescr"))
        );
    }

    #[test]
    fn test_unknown_columns_use_oid_components() {
        let mib = MibResolver::new();
        let walk = vec![WalkEntry::new("1.3.6.1.4.1.99.1.7.3", WireValue::Integer(5))];
        let table = TableBuilder::new(&mib).build(&walk, None);
        assert_eq!(table["3"].get("7"), Some(&WireValue::Integer(5)));
    }

    #[test]
    fn test_scalars() {
        let mib = MibResolver::builtin();
        let walk = vec![
            WalkEntry::new("1.3.6.1.2.1.25.1.1.0", WireValue::TimeTicks(500)),
            WalkEntry::new("1.3.6.1.2.1.25.1.5.0", WireValue::Gauge32(3)),
        ];
        let scalars = TableBuilder::new(&mib).scalars(&walk);
        assert_eq!(scalars["hrSystemUptime"], WireValue::TimeTicks(500));
        assert_eq!(scalars["hrSystemNumUsers"], WireValue::Gauge32(3));
    }

    #[test]
    fn test_pivot_by_index_and_column() {
        let mib = MibResolver::builtin();
        let builder = TableBuilder::new(&mib);
        let table = builder.build(&if_walk(), Some("ifDescr"));

        let by_index = TableBuilder::pivot(&table, INDEX_FIELD);
        assert_eq!(by_index["1"].get("ifDescr").and_then(WireValue::as_text).as_deref(), Some("eth0"));

        let by_descr = TableBuilder::pivot(&table, "ifDescr");
        assert_eq!(by_descr.len(), 1);
        assert!(by_descr.contains_key("eth0"));
    }
}
