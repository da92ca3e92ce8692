//! Shared test helpers for unit tests, integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::context::BuildOptions;
use crate::id::TypeId;
use crate::raw::{RawBean, RawTable};
use crate::record::Record;
use crate::registry::{Registry, RegistryBuilder};
use crate::table::{TableDef, TableMode};
use crate::value::{BeanValue, Value};

// ===========================================================================
// Schemas
// ===========================================================================

/// `Row { id: int, v: int }`
pub fn row_bean() -> RawBean {
    RawBean::new("", "Row").field("id", "int").field("v", "int")
}

/// `Triple { a: int, b: int, c: int }`
pub fn triple_bean() -> RawBean {
    RawBean::new("", "Triple")
        .field("a", "int")
        .field("b", "int")
        .field("c", "int")
}

/// Compile a one-bean, one-table schema and return the table id.
pub fn single_table(bean: RawBean, table: RawTable) -> (Registry, TypeId) {
    let mut b = RegistryBuilder::new();
    b.add_bean(bean).expect("bean registers");
    let id = b.add_table(table).expect("table registers");
    let reg = b.build(&BuildOptions::default()).expect("schema compiles");
    (reg, id)
}

/// `TbOne` over `Row`.
pub fn one_table() -> (Registry, TypeId) {
    single_table(row_bean(), RawTable::new("", "TbOne", "Row", TableMode::One))
}

/// `TbMap` over `Row`, keyed by `id`.
pub fn map_table() -> (Registry, TypeId) {
    single_table(
        row_bean(),
        RawTable::new("", "TbMap", "Row", TableMode::Map).index("id"),
    )
}

/// `TbList` over `Triple` with the given index text.
pub fn list_table(index: &str) -> (Registry, TypeId) {
    single_table(
        triple_bean(),
        RawTable::new("", "TbList", "Triple", TableMode::List).index(index),
    )
}

// ===========================================================================
// Records
// ===========================================================================

pub fn tags(v: &[&str]) -> Vec<String> {
    v.iter().map(|t| t.to_string()).collect()
}

/// A record of `table`'s value bean whose fields are the given ints.
pub fn int_record(table: &TableDef, values: &[i32], tag_list: &[&str], source: &str) -> Record {
    Record::new(
        BeanValue::new(
            table.value_bean,
            values.iter().map(|v| Value::Int(*v)).collect(),
        ),
        source,
        tags(tag_list),
    )
}
