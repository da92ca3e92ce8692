//! Integration test: schema modules, options and record files on disk, loaded
//! through `tabula-data` and consolidated by the core build context.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tabula_core::consolidate::ConsolidateError;
use tabula_core::context::BuildContext;
use tabula_core::error::Error;
use tabula_core::table::TableMode;
use tabula_core::value::{IndexKey, Value};
use tabula_data::{DataLoadError, load_build_options, load_export_tables, load_registry};

/// Create a temporary directory with a unique name for test isolation.
fn make_test_dir(suffix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "tabula_pipeline_test_{suffix}_{}",
        std::process::id()
    ));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Route library logs to the test harness output.
fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn cleanup(dir: &Path) {
    let _ = fs::remove_dir_all(dir);
}

const ITEM_MODULE: &str = r#"{
    "module": "item",
    "enums": [{"name": "Quality", "items": [
        {"name": "WHITE"},
        {"name": "GOLD", "value": 5, "alias": "gold"}
    ]}],
    "beans": [
        {"name": "Item", "fields": [
            {"name": "id", "type": "int"},
            {"name": "name", "type": "string"},
            {"name": "quality", "type": "Quality"},
            {"name": "costs", "type": "list<int>[,]"}
        ]},
        {"name": "Drop", "fields": [
            {"name": "monster", "type": "int"},
            {"name": "item", "type": "int"},
            {"name": "weight", "type": "float"}
        ]}
    ],
    "tables": [
        {"name": "TbItem", "value": "Item", "mode": "map", "index": "id"},
        {"name": "TbDrop", "value": "Drop", "mode": "list", "index": "monster,monster+item",
         "groups": ["s"], "input": ["drops.json"]}
    ]
}"#;

const GLOBAL_MODULE: &str = r#"
module = ""

[[beans]]
name = "Global"
fields = [{ name = "max_level", type = "int" }, { name = "motd", type = "string?" }]

[[tables]]
name = "TbGlobal"
value = "Global"
mode = "one"

[[groups]]
names = ["c", "client"]
default = true

[[groups]]
names = ["s"]

[[targets]]
name = "all"
groups = ["c", "s"]

[[targets]]
name = "client"
groups = ["c"]
"#;

struct Fixture {
    schema: PathBuf,
    data: PathBuf,
    patch: PathBuf,
}

impl Fixture {
    fn new(name: &str) -> Self {
        init_tracing();
        let fixture = Self {
            schema: make_test_dir(&format!("{name}_schema")),
            data: make_test_dir(&format!("{name}_data")),
            patch: make_test_dir(&format!("{name}_patch")),
        };
        fs::write(fixture.schema.join("item.json"), ITEM_MODULE).unwrap();
        fs::write(fixture.schema.join("global.toml"), GLOBAL_MODULE).unwrap();
        fs::write(
            fixture.data.join("item_tbitem.json"),
            r#"[
                {"id": 1, "name": "sword", "quality": "WHITE", "costs": "10,20"},
                {"id": 2, "name": "shield", "quality": "gold", "costs": [5]},
                {"id": 3, "name": "festival hat", "__tags": ["event"]},
                {"id": 4, "name": "debug stick", "tags": "dev"}
            ]"#,
        )
        .unwrap();
        fs::write(
            fixture.data.join("drops.json"),
            r#"[
                {"monster": 100, "item": 1, "weight": 0.5},
                {"monster": 100, "item": 2, "weight": 0.25},
                {"monster": 200, "item": 1, "weight": 1.0}
            ]"#,
        )
        .unwrap();
        fs::write(
            fixture.data.join("tbglobal.toml"),
            r#"
[[rows]]
max_level = 60
"#,
        )
        .unwrap();
        fs::write(
            fixture.patch.join("item_tbitem.json"),
            r#"[
                {"id": 2, "name": "golden shield", "quality": 5},
                {"id": 9, "name": "patch-only relic"}
            ]"#,
        )
        .unwrap();
        fixture
    }

    fn options(&self, body: &str) -> tabula_core::context::BuildOptions {
        let path = self.data.join("build.json");
        fs::write(&path, body).unwrap();
        load_build_options(&path).unwrap()
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        cleanup(&self.schema);
        cleanup(&self.data);
        cleanup(&self.patch);
    }
}

// ---------------------------------------------------------------------------
// Full build
// ---------------------------------------------------------------------------

#[test]
fn full_target_loads_and_consolidates_every_table() {
    let fx = Fixture::new("full");
    let options = fx.options(r#"{"exclude_tags": ["dev"]}"#);
    let registry = Arc::new(load_registry(&fx.schema, &options).unwrap());
    assert_eq!(registry.target().name, "all");

    let export: Vec<_> = registry
        .export_tables()
        .iter()
        .map(|id| registry.full_name(*id).unwrap().to_string())
        .collect();
    assert_eq!(export, vec!["TbGlobal", "item.TbDrop", "item.TbItem"]);

    let ctx = BuildContext::new(Arc::clone(&registry), &options).unwrap();
    load_export_tables(&ctx, &fx.data, Some(&fx.patch)).unwrap();

    // MAP: dev row filtered, patch overrides id 2 in place and appends id 9.
    let items = registry.lookup("item.TbItem").unwrap();
    let data = ctx.table_data(items).unwrap();
    assert_eq!(data.mode(), TableMode::Map);
    let ids: Vec<_> = data
        .records()
        .iter()
        .map(|r| r.data().field(0).cloned().unwrap())
        .collect();
    assert_eq!(
        ids,
        vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(9)]
    );
    let shield = data.get(&IndexKey::single(Value::Int(2))).unwrap();
    assert!(shield.source().ends_with("item_tbitem.json[0]"));
    assert_eq!(shield.data().field(2), Some(&Value::Enum(5)));
    assert_eq!(
        data.records()[0].data().field(3),
        Some(&Value::List(vec![Value::Int(10), Value::Int(20)]))
    );

    // LIST: two independent specs, the second a union index.
    let drops = registry.table_by_name("item.TbDrop").unwrap();
    assert!(drops.is_union_index);
    let drop_data = ctx.table_data(registry.lookup("item.TbDrop").unwrap()).unwrap();
    assert!(drop_data.index("monster").unwrap().is_multi_value);
    assert!(!drop_data.index("monster+item").unwrap().is_multi_value);

    // ONE: single global row, nullable field absent.
    let global = ctx
        .table_data(registry.lookup("TbGlobal").unwrap())
        .unwrap();
    assert_eq!(global.len(), 1);
    assert_eq!(global.records()[0].data().field(1), Some(&Value::Null));

    assert_eq!(ctx.tables_with_tag("event"), Vec::new());
    assert_eq!(ctx.records_with_tag(items, "event").len(), 1);
}

// ---------------------------------------------------------------------------
// Target selection and tags
// ---------------------------------------------------------------------------

#[test]
fn client_target_skips_server_tables_and_tracks_tags() {
    let fx = Fixture::new("client");
    let options = fx.options(r#"{"target": "client", "include_tags": ["event"]}"#);
    let registry = Arc::new(load_registry(&fx.schema, &options).unwrap());

    assert!(!registry.table_by_name("item.TbDrop").unwrap().is_exported);
    let ctx = BuildContext::new(Arc::clone(&registry), &options).unwrap();
    assert_eq!(ctx.export_tables().len(), 2);
    load_export_tables(&ctx, &fx.data, None).unwrap();

    let items = registry.lookup("item.TbItem").unwrap();
    let ids: Vec<_> = ctx
        .all_records(items)
        .iter()
        .map(|r| r.data().field(0).cloned().unwrap())
        .collect();
    assert_eq!(ids, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    assert_eq!(ctx.tables_with_tag("event"), vec![items]);
    assert!(ctx.table_data(registry.lookup("item.TbDrop").unwrap()).is_none());
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[test]
fn duplicate_keys_on_disk_name_both_rows() {
    let fx = Fixture::new("dup");
    fs::write(
        fx.data.join("item_tbitem.json"),
        r#"[{"id": 1, "name": "a"}, {"id": 1, "name": "b"}]"#,
    )
    .unwrap();
    let options = fx.options("{}");
    let registry = Arc::new(load_registry(&fx.schema, &options).unwrap());
    let ctx = BuildContext::new(Arc::clone(&registry), &options).unwrap();

    match load_export_tables(&ctx, &fx.data, None) {
        Err(DataLoadError::Core(Error::Consolidate(ConsolidateError::DuplicateKey {
            table,
            first,
            second,
            ..
        }))) => {
            assert_eq!(table, "item.TbItem");
            assert!(first.ends_with("item_tbitem.json[0]"));
            assert!(second.ends_with("item_tbitem.json[1]"));
        }
        other => panic!("expected DuplicateKey, got: {other:?}"),
    }
}

#[test]
fn bad_row_value_names_table_field_and_row() {
    let fx = Fixture::new("bad_value");
    fs::write(
        fx.data.join("item_tbitem.json"),
        r#"[{"id": 1, "quality": "PURPLE"}]"#,
    )
    .unwrap();
    let options = fx.options("{}");
    let registry = Arc::new(load_registry(&fx.schema, &options).unwrap());
    let ctx = BuildContext::new(Arc::clone(&registry), &options).unwrap();

    match load_export_tables(&ctx, &fx.data, None) {
        Err(DataLoadError::Convert {
            table,
            field,
            source_ref,
            ..
        }) => {
            assert_eq!(table, "item.TbItem");
            assert_eq!(field, "quality");
            assert!(source_ref.ends_with("item_tbitem.json[0]"));
        }
        other => panic!("expected Convert, got: {other:?}"),
    }
}

#[test]
fn unknown_target_fails_compilation() {
    let fx = Fixture::new("unknown_target");
    let options = fx.options(r#"{"target": "editor"}"#);
    assert!(matches!(
        load_registry(&fx.schema, &options),
        Err(DataLoadError::Core(Error::Compile(_)))
    ));
}
