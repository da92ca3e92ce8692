//! Tabula Core -- schema compiler and record consolidation for data tables.
//!
//! The crate turns declarative schema definitions (enums, beans, tables)
//! into a checked type graph, then merges per-table records into indexed,
//! export-ready snapshots. It performs no I/O; loaders and exporters live in
//! other crates and talk to it through the types below.
//!
//! # Pipeline
//!
//! 1. **Parse** -- type expressions (`int?`, `list<Item>[,]`, `map<int,string>[;]`)
//!    become [`parser::TypeExpr`] trees.
//! 2. **Register** -- [`registry::RegistryBuilder`] enforces naming rules as
//!    declarations arrive.
//! 3. **Compile** -- pre-compile, compile and post-compile run over the whole
//!    graph, so definitions may reference each other in any order. The result
//!    is an immutable [`registry::Registry`].
//! 4. **Consolidate** -- [`context::BuildContext`] filters records by tag and
//!    merges main and patch records per table into [`consolidate::TableData`].
//!
//! ```rust,ignore
//! let mut builder = RegistryBuilder::new();
//! builder.add_bean(RawBean::new("item", "Item").field("id", "int"))?;
//! builder.add_table(RawTable::new("item", "TbItem", "Item", TableMode::Map))?;
//! let registry = Arc::new(builder.build(&options)?);
//!
//! let ctx = BuildContext::new(registry, &options)?;
//! ctx.add_table_data(table_id, main_records, patch_records)?;
//! ```
//!
//! # Key Types
//!
//! - [`types::Ty`] -- compiled type descriptor; attribute-free descriptors are
//!   interned by [`types::TypeCache`].
//! - [`table::TableDef`] -- table mode and resolved index specs.
//! - [`record::Record`] -- one data row with provenance and tags.
//! - [`value::IndexKey`] -- single or composite index key.

pub mod compile;
pub mod consolidate;
pub mod context;
pub mod defs;
pub mod error;
pub mod id;
pub mod parser;
pub mod raw;
pub mod record;
pub mod registry;
pub mod table;
pub mod types;
pub mod value;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
