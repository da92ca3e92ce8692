//! Build context: the compiled registry plus per-build tag options and the
//! consolidated table snapshots.
//!
//! The registry is read-only here. Each table's snapshot is built by exactly
//! one consolidation and stored behind a lock, so distinct tables can be
//! consolidated on parallel workers (`parallel` feature).

use crate::consolidate::{TableData, consolidate};
use crate::error::{Error, Result};
use crate::id::TypeId;
use crate::record::{DEFAULT_TAG, Record, TagFilter};
use crate::registry::Registry;
use crate::table::TableDef;
use crate::types::PrimitiveKind;
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::info;

// ===========================================================================
// Configuration
// ===========================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("include tags {include:?} and exclude tags {exclude:?} cannot both be set")]
    InvalidConfiguration {
        include: Vec<String>,
        exclude: Vec<String>,
    },
}

/// Per-build selection options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    /// Active target; the first declared target (or an implicit one) when absent.
    pub target: Option<String>,
    pub include_tags: Vec<String>,
    pub exclude_tags: Vec<String>,
    /// Tables to export regardless of groups, by full name.
    pub export_tables: Vec<String>,
    /// Variant key to variant name; `default` applies to unlisted keys.
    pub variants: BTreeMap<String, String>,
}

impl BuildOptions {
    pub fn validate(&self) -> std::result::Result<TagFilter, ConfigError> {
        TagFilter::new(self.include_tags.clone(), self.exclude_tags.clone())
    }
}

/// Raw records of one table awaiting consolidation.
#[derive(Debug, Clone)]
pub struct TableInput {
    pub table: TypeId,
    pub main: Vec<Record>,
    pub patch: Vec<Record>,
}

// ===========================================================================
// Context
// ===========================================================================

#[derive(Debug)]
pub struct BuildContext {
    registry: Arc<Registry>,
    filter: TagFilter,
    all_tags: Vec<String>,
    tables: RwLock<HashMap<TypeId, Arc<TableData>>>,
    tables_by_tag: Mutex<BTreeMap<String, BTreeSet<TypeId>>>,
}

impl BuildContext {
    pub fn new(registry: Arc<Registry>, options: &BuildOptions) -> Result<Self> {
        let filter = options.validate()?;
        let mut all_tags = filter.include().to_vec();
        if !all_tags.is_empty() && !all_tags.iter().any(|t| t.eq_ignore_ascii_case(DEFAULT_TAG)) {
            all_tags.push(DEFAULT_TAG.to_string());
        }

        info!(
            build_target = %registry.target().name,
            export_tables = registry.export_tables().len(),
            include = ?filter.include(),
            exclude = ?filter.exclude(),
            "build context created"
        );

        Ok(Self {
            registry,
            filter,
            all_tags,
            tables: RwLock::new(HashMap::new()),
            tables_by_tag: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn filter(&self) -> &TagFilter {
        &self.filter
    }

    /// Include tags plus the base tag; empty when no include tags are set.
    pub fn all_tags(&self) -> &[String] {
        &self.all_tags
    }

    pub fn export_tables(&self) -> Vec<&TableDef> {
        self.registry
            .export_tables()
            .iter()
            .filter_map(|id| self.registry.table_def(*id))
            .collect()
    }

    fn table_def(&self, table: TypeId) -> Result<&TableDef> {
        self.registry
            .table_def(table)
            .ok_or_else(|| Error::NotATable(format!("{table:?}")))
    }

    /// Filter, consolidate and store one table's records.
    pub fn add_table_data(
        &self,
        table: TypeId,
        main: Vec<Record>,
        patch: Vec<Record>,
    ) -> Result<Arc<TableData>> {
        let def = self.table_def(table)?;
        let main: Vec<_> = main.into_iter().filter(|r| self.filter.includes(r)).collect();
        let patch: Vec<_> = patch
            .into_iter()
            .filter(|r| self.filter.includes(r))
            .collect();

        let data = Arc::new(consolidate(def, main, patch)?);

        if !self.all_tags.is_empty() {
            let mut by_tag = self.tables_by_tag.lock();
            for tag in &self.all_tags {
                if data.records().iter().any(|r| r.has_tag(tag)) {
                    by_tag.entry(tag.to_lowercase()).or_default().insert(table);
                }
            }
        }

        self.tables.write().insert(table, Arc::clone(&data));
        Ok(data)
    }

    /// Consolidate many tables. Runs on the rayon pool with the `parallel` feature.
    pub fn consolidate_all(&self, inputs: Vec<TableInput>) -> Result<()> {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            inputs
                .into_par_iter()
                .try_for_each(|input| self.add_table_data(input.table, input.main, input.patch).map(|_| ()))
        }
        #[cfg(not(feature = "parallel"))]
        {
            inputs
                .into_iter()
                .try_for_each(|input| self.add_table_data(input.table, input.main, input.patch).map(|_| ()))
        }
    }

    pub fn table_data(&self, table: TypeId) -> Option<Arc<TableData>> {
        self.tables.read().get(&table).cloned()
    }

    pub fn all_records(&self, table: TypeId) -> Vec<Record> {
        self.table_data(table)
            .map(|d| d.records().to_vec())
            .unwrap_or_default()
    }

    pub fn export_records(&self, table: TypeId) -> Vec<Record> {
        self.table_data(table)
            .map(|d| d.export_records().to_vec())
            .unwrap_or_default()
    }

    /// Records sorted by primary key when it is an `int` or `long`;
    /// original order otherwise.
    pub fn sorted_by_key(&self, table: TypeId, records: &[Record]) -> Vec<Record> {
        let mut out = records.to_vec();
        let Some(primary) = self.registry.table_def(table).and_then(|t| t.primary.as_ref()) else {
            return out;
        };
        if matches!(
            primary.ty.primitive_kind(),
            Some(PrimitiveKind::Int | PrimitiveKind::Long)
        ) {
            out.sort_by_key(|r| r.data().field(primary.position).and_then(|v| v.as_i64()));
        }
        out
    }

    /// Records of `table` carrying `tag`.
    pub fn records_with_tag(&self, table: TypeId, tag: &str) -> Vec<Record> {
        self.table_data(table)
            .map(|d| {
                d.records()
                    .iter()
                    .filter(|r| r.has_tag(tag))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Tables with at least one record carrying `tag` (an active tag).
    pub fn tables_with_tag(&self, tag: &str) -> Vec<TypeId> {
        self.tables_by_tag
            .lock()
            .get(&tag.to_lowercase())
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    fn context(options: &BuildOptions) -> (BuildContext, TypeId) {
        let (reg, id) = map_table();
        (BuildContext::new(Arc::new(reg), options).unwrap(), id)
    }

    // -----------------------------------------------------------------------
    // Options
    // -----------------------------------------------------------------------

    #[test]
    fn include_and_exclude_together_rejected() {
        let (reg, _) = map_table();
        let options = BuildOptions {
            include_tags: vec!["a".into()],
            exclude_tags: vec!["b".into()],
            ..BuildOptions::default()
        };
        assert!(matches!(
            BuildContext::new(Arc::new(reg), &options),
            Err(Error::Config(ConfigError::InvalidConfiguration { .. }))
        ));
    }

    #[test]
    fn all_tags_adds_base_when_including() {
        let options = BuildOptions {
            include_tags: vec!["event".into()],
            ..BuildOptions::default()
        };
        let (ctx, _) = context(&options);
        assert_eq!(ctx.all_tags(), &["event".to_string(), "base".to_string()]);
        let (ctx, _) = context(&BuildOptions::default());
        assert!(ctx.all_tags().is_empty());
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    #[test]
    fn add_table_data_filters_and_stores() {
        let options = BuildOptions {
            include_tags: vec!["event".into()],
            ..BuildOptions::default()
        };
        let (ctx, id) = context(&options);
        let reg = Arc::clone(ctx.registry());
        let table = reg.table_def(id).unwrap();
        let main = vec![
            int_record(table, &[1, 10], &[], "r0"),
            int_record(table, &[2, 20], &["event"], "r1"),
            int_record(table, &[3, 30], &["dev"], "r2"),
        ];
        ctx.add_table_data(id, main, Vec::new()).unwrap();

        let sources: Vec<_> = ctx
            .all_records(id)
            .iter()
            .map(|r| r.source().to_string())
            .collect();
        assert_eq!(sources, vec!["r0", "r1"]);
        assert_eq!(ctx.records_with_tag(id, "EVENT").len(), 1);
        assert_eq!(ctx.tables_with_tag("event"), vec![id]);
        assert_eq!(ctx.tables_with_tag("base"), vec![id]);
        assert!(ctx.tables_with_tag("dev").is_empty());
    }

    #[test]
    fn sorted_by_integer_key() {
        let (ctx, id) = context(&BuildOptions::default());
        let reg = Arc::clone(ctx.registry());
        let table = reg.table_def(id).unwrap();
        let main = vec![
            int_record(table, &[3, 0], &[], "r3"),
            int_record(table, &[1, 0], &[], "r1"),
        ];
        let data = ctx.add_table_data(id, main, Vec::new()).unwrap();
        let sorted = ctx.sorted_by_key(id, data.records());
        let sources: Vec<_> = sorted.iter().map(|r| r.source()).collect();
        assert_eq!(sources, vec!["r1", "r3"]);
        assert_eq!(ctx.export_records(id).len(), 2);
    }

    #[test]
    fn consolidate_all_stores_every_table() {
        let (ctx, id) = context(&BuildOptions::default());
        let reg = Arc::clone(ctx.registry());
        let table = reg.table_def(id).unwrap();
        ctx.consolidate_all(vec![TableInput {
            table: id,
            main: vec![int_record(table, &[1, 1], &[], "r0")],
            patch: Vec::new(),
        }])
        .unwrap();
        assert_eq!(ctx.table_data(id).map(|d| d.len()), Some(1));
    }

    #[test]
    fn non_table_id_rejected() {
        let (ctx, _) = context(&BuildOptions::default());
        let bean = ctx.registry().lookup("Row").unwrap();
        assert!(matches!(
            ctx.add_table_data(bean, Vec::new(), Vec::new()),
            Err(Error::NotATable(_))
        ));
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: BuildOptions = serde_json::from_str(r#"{"target":"client"}"#).unwrap();
        assert_eq!(options.target.as_deref(), Some("client"));
        assert!(options.include_tags.is_empty());
    }
}
