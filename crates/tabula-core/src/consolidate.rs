//! Record consolidation: merges main and patch records of one table into an
//! indexed snapshot.
//!
//! - ONE: patches replace the whole record list.
//! - MAP: main records are keyed by the index field. Same-key records that
//!   share a tag are duplicates; tag-disjoint ones are kept as variants and
//!   the first one owns the map slot. Patches overwrite by key in place or
//!   append new keys, at most one patch per key.
//! - LIST: patches are rejected. Each index spec gets its own key map and a
//!   multi-value flag when keys collide.
//!
//! Every record in the final list receives its zero-based position.

use crate::record::Record;
use crate::table::{IndexSpec, TableDef, TableMode};
use crate::value::IndexKey;
use std::collections::HashMap;
use tracing::{debug, warn};

// ===========================================================================
// Errors
// ===========================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsolidateError {
    #[error("duplicate key '{key}' in table '{table}': {first} and {second}")]
    DuplicateKey {
        table: String,
        key: String,
        first: String,
        second: String,
    },

    #[error(
        "patch {patch_source} overrides key '{key}' of table '{table}' already overridden by {existing}"
    )]
    PatchConflict {
        table: String,
        key: String,
        patch_source: String,
        existing: String,
    },

    #[error("table '{table}' is a list table and does not accept patches ({count} given)")]
    PatchNotSupported { table: String, count: usize },

    #[error("record {record} of table '{table}' has no value for index field '{field}'")]
    MissingKeyField {
        table: String,
        field: String,
        record: String,
    },
}

// ===========================================================================
// Snapshot
// ===========================================================================

/// Key map of one LIST index spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexData {
    /// The spec as declared, e.g. `a+b`.
    pub name: String,
    /// True when more than one record shares a key.
    pub is_multi_value: bool,
    /// Key to record position. On collision the last record wins.
    pub map: HashMap<IndexKey, usize>,
}

/// The consolidated, indexed record set of one table. Immutable once built.
#[derive(Debug, Clone)]
pub struct TableData {
    table: String,
    mode: TableMode,
    records: Vec<Record>,
    key_map: HashMap<IndexKey, usize>,
    indexes: Vec<IndexData>,
}

impl TableData {
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn mode(&self) -> TableMode {
        self.mode
    }

    /// Final records in order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Records handed to exporters. Same as [`records`](Self::records).
    pub fn export_records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// MAP lookup by key.
    pub fn get(&self, key: &IndexKey) -> Option<&Record> {
        self.key_map.get(key).and_then(|&i| self.records.get(i))
    }

    /// MAP key to record position.
    pub fn key_map(&self) -> &HashMap<IndexKey, usize> {
        &self.key_map
    }

    /// LIST index maps, in spec order.
    pub fn indexes(&self) -> &[IndexData] {
        &self.indexes
    }

    pub fn index(&self, name: &str) -> Option<&IndexData> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// LIST lookup through the named index.
    pub fn lookup(&self, index: &str, key: &IndexKey) -> Option<&Record> {
        self.index(index)
            .and_then(|i| i.map.get(key))
            .and_then(|&pos| self.records.get(pos))
    }
}

// ===========================================================================
// Consolidation
// ===========================================================================

/// Merge `main` and `patch` records of `table` into a snapshot.
pub fn consolidate(
    table: &TableDef,
    main: Vec<Record>,
    patch: Vec<Record>,
) -> Result<TableData, ConsolidateError> {
    let mut data = TableData {
        table: table.full_name.clone(),
        mode: table.mode,
        records: Vec::new(),
        key_map: HashMap::new(),
        indexes: Vec::new(),
    };

    match table.mode {
        TableMode::One => {
            data.records = if patch.is_empty() { main } else { patch };
            if data.records.len() != 1 {
                warn!(
                    table = %table.full_name,
                    records = data.records.len(),
                    "singleton table does not have exactly one record"
                );
            }
        }
        TableMode::Map => {
            let (records, key_map) = merge_map(table, main, patch)?;
            data.records = records;
            data.key_map = key_map;
        }
        TableMode::List => {
            if !patch.is_empty() {
                return Err(ConsolidateError::PatchNotSupported {
                    table: table.full_name.clone(),
                    count: patch.len(),
                });
            }
            data.indexes = table
                .index_list
                .iter()
                .map(|spec| build_index(table, spec, &main))
                .collect::<Result<_, _>>()?;
            data.records = main;
        }
    }

    for (i, record) in data.records.iter_mut().enumerate() {
        record.set_auto_index(i);
    }

    debug!(
        table = %table.full_name,
        mode = table.mode.as_str(),
        records = data.records.len(),
        "table consolidated"
    );
    Ok(data)
}

fn key_of(table: &TableDef, spec: &IndexSpec, record: &Record) -> Result<IndexKey, ConsolidateError> {
    spec.fields
        .iter()
        .map(|field| {
            record
                .data()
                .field(field.position)
                .cloned()
                .ok_or_else(|| ConsolidateError::MissingKeyField {
                    table: table.full_name.clone(),
                    field: field.name.clone(),
                    record: record.source().to_string(),
                })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(IndexKey)
}

fn merge_map(
    table: &TableDef,
    main: Vec<Record>,
    patch: Vec<Record>,
) -> Result<(Vec<Record>, HashMap<IndexKey, usize>), ConsolidateError> {
    let Some(spec) = table.index_list.first() else {
        return Ok((main, HashMap::new()));
    };

    let mut records = main;
    let mut key_map: HashMap<IndexKey, usize> = HashMap::new();
    let mut same_key: HashMap<IndexKey, Vec<usize>> = HashMap::new();

    for (i, record) in records.iter().enumerate() {
        let key = key_of(table, spec, record)?;
        let positions = same_key.entry(key.clone()).or_default();
        if let Some(&j) = positions.iter().find(|&&j| records[j].shares_tag(record)) {
            return Err(ConsolidateError::DuplicateKey {
                table: table.full_name.clone(),
                key: key.to_string(),
                first: records[j].source().to_string(),
                second: record.source().to_string(),
            });
        }
        positions.push(i);
        key_map.entry(key).or_insert(i);
    }

    let mut overridden: HashMap<IndexKey, String> = HashMap::new();
    for record in patch {
        let key = key_of(table, spec, &record)?;
        if let Some(existing) = overridden.get(&key) {
            return Err(ConsolidateError::PatchConflict {
                table: table.full_name.clone(),
                key: key.to_string(),
                patch_source: record.source().to_string(),
                existing: existing.clone(),
            });
        }
        overridden.insert(key.clone(), record.source().to_string());

        match key_map.get(&key) {
            Some(&pos) => {
                debug!(table = %table.full_name, key = %key, source = record.source(), "patch overrides record");
                records[pos] = record;
            }
            None => {
                key_map.insert(key, records.len());
                records.push(record);
            }
        }
    }
    Ok((records, key_map))
}

fn build_index(
    table: &TableDef,
    spec: &IndexSpec,
    records: &[Record],
) -> Result<IndexData, ConsolidateError> {
    let mut map = HashMap::with_capacity(records.len());
    let mut is_multi_value = false;
    for (i, record) in records.iter().enumerate() {
        if map.insert(key_of(table, spec, record)?, i).is_some() {
            is_multi_value = true;
        }
    }
    Ok(IndexData {
        name: spec.name(),
        is_multi_value,
        map,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use crate::value::Value;

    fn key(v: i32) -> IndexKey {
        IndexKey::single(Value::Int(v))
    }

    // -----------------------------------------------------------------------
    // ONE
    // -----------------------------------------------------------------------

    #[test]
    fn one_mode_patch_replaces_all() {
        let (reg, id) = one_table();
        let table = reg.table_def(id).unwrap();
        let main = vec![int_record(table, &[1, 10], &[], "main")];
        let patch = vec![int_record(table, &[2, 20], &[], "patch")];
        let data = consolidate(table, main.clone(), Vec::new()).unwrap();
        assert_eq!(data.records()[0].source(), "main");
        let data = consolidate(table, main, patch).unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data.records()[0].source(), "patch");
        assert_eq!(data.records()[0].auto_index(), Some(0));
    }

    // -----------------------------------------------------------------------
    // MAP
    // -----------------------------------------------------------------------

    #[test]
    fn map_patch_overrides_in_place() {
        let (reg, id) = map_table();
        let table = reg.table_def(id).unwrap();
        let main = vec![
            int_record(table, &[1, 10], &[], "main[0]"),
            int_record(table, &[2, 20], &[], "main[1]"),
        ];
        let patch = vec![int_record(table, &[1, 99], &[], "patch[0]")];
        let data = consolidate(table, main, patch).unwrap();

        assert_eq!(data.len(), 2);
        assert_eq!(data.records()[0].source(), "patch[0]");
        assert_eq!(data.records()[1].source(), "main[1]");
        assert_eq!(data.get(&key(1)).map(|r| r.source()), Some("patch[0]"));
        let indices: Vec<_> = data.records().iter().map(|r| r.auto_index()).collect();
        assert_eq!(indices, vec![Some(0), Some(1)]);
    }

    #[test]
    fn map_patch_with_new_key_appends() {
        let (reg, id) = map_table();
        let table = reg.table_def(id).unwrap();
        let main = vec![int_record(table, &[1, 10], &[], "main[0]")];
        let patch = vec![int_record(table, &[5, 50], &[], "patch[0]")];
        let data = consolidate(table, main, patch).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data.records()[1].source(), "patch[0]");
        assert_eq!(data.get(&key(5)).and_then(|r| r.auto_index()), Some(1));
    }

    #[test]
    fn map_second_patch_on_same_key_conflicts() {
        let (reg, id) = map_table();
        let table = reg.table_def(id).unwrap();
        let main = vec![int_record(table, &[1, 10], &[], "main[0]")];
        let patch = vec![
            int_record(table, &[1, 11], &[], "patch[0]"),
            int_record(table, &[1, 12], &[], "patch[1]"),
        ];
        match consolidate(table, main, patch) {
            Err(ConsolidateError::PatchConflict {
                key,
                patch_source,
                existing,
                ..
            }) => {
                assert_eq!(key, "1");
                assert_eq!(patch_source, "patch[1]");
                assert_eq!(existing, "patch[0]");
            }
            other => panic!("expected PatchConflict, got: {other:?}"),
        }
    }

    #[test]
    fn map_duplicate_key_with_shared_tag_fails() {
        let (reg, id) = map_table();
        let table = reg.table_def(id).unwrap();
        let main = vec![
            int_record(table, &[1, 10], &[], "a.json[0]"),
            int_record(table, &[1, 20], &[], "a.json[1]"),
        ];
        match consolidate(table, main, Vec::new()) {
            Err(ConsolidateError::DuplicateKey { first, second, .. }) => {
                assert_eq!(first, "a.json[0]");
                assert_eq!(second, "a.json[1]");
            }
            other => panic!("expected DuplicateKey, got: {other:?}"),
        }
    }

    #[test]
    fn map_duplicate_key_with_disjoint_tags_is_kept() {
        let (reg, id) = map_table();
        let table = reg.table_def(id).unwrap();
        let main = vec![
            int_record(table, &[1, 10], &["cn"], "a[0]"),
            int_record(table, &[1, 20], &["en"], "a[1]"),
        ];
        let data = consolidate(table, main, Vec::new()).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data.get(&key(1)).map(|r| r.source()), Some("a[0]"));
    }

    #[test]
    fn map_missing_key_field_fails() {
        let (reg, id) = map_table();
        let table = reg.table_def(id).unwrap();
        let main = vec![int_record(table, &[], &[], "short[0]")];
        assert!(matches!(
            consolidate(table, main, Vec::new()),
            Err(ConsolidateError::MissingKeyField { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // LIST
    // -----------------------------------------------------------------------

    #[test]
    fn list_union_index_collisions_set_multi_value() {
        let (reg, id) = list_table("a+b");
        let table = reg.table_def(id).unwrap();
        let main = vec![
            int_record(table, &[1, 1, 0], &[], "r0"),
            int_record(table, &[1, 1, 0], &[], "r1"),
        ];
        let data = consolidate(table, main, Vec::new()).unwrap();
        let index = data.index("a+b").unwrap();
        assert!(index.is_multi_value);
        assert_eq!(index.map.len(), 1);
        let k = IndexKey(vec![Value::Int(1), Value::Int(1)]);
        assert_eq!(data.lookup("a+b", &k).map(|r| r.source()), Some("r1"));
    }

    #[test]
    fn list_union_index_distinguishes_second_component() {
        let (reg, id) = list_table("a+b");
        let table = reg.table_def(id).unwrap();
        let main = vec![
            int_record(table, &[1, 1, 0], &[], "r0"),
            int_record(table, &[1, 2, 0], &[], "r1"),
        ];
        let data = consolidate(table, main, Vec::new()).unwrap();
        let index = data.index("a+b").unwrap();
        assert!(!index.is_multi_value);
        assert_eq!(index.map.len(), 2);
    }

    #[test]
    fn list_multi_key_indexes_independent() {
        let (reg, id) = list_table("a,b");
        let table = reg.table_def(id).unwrap();
        let main = vec![
            int_record(table, &[1, 7, 0], &[], "r0"),
            int_record(table, &[2, 7, 0], &[], "r1"),
        ];
        let data = consolidate(table, main, Vec::new()).unwrap();
        assert!(!data.index("a").unwrap().is_multi_value);
        assert!(data.index("b").unwrap().is_multi_value);
        let sources: Vec<_> = data.records().iter().map(|r| r.source()).collect();
        assert_eq!(sources, vec!["r0", "r1"]);
    }

    #[test]
    fn list_rejects_patches() {
        let (reg, id) = list_table("a");
        let table = reg.table_def(id).unwrap();
        let patch = vec![int_record(table, &[1, 1, 1], &[], "p0")];
        match consolidate(table, Vec::new(), patch) {
            Err(ConsolidateError::PatchNotSupported { table, count }) => {
                assert_eq!(table, "TbList");
                assert_eq!(count, 1);
            }
            other => panic!("expected PatchNotSupported, got: {other:?}"),
        }
    }
}
