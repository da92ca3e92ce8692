//! Table schema compiler: resolves a table's row bean and index declarations
//! into index metadata.

use crate::compile::CompileError;
use crate::defs::{BeanDef, BeanLookup, FieldDef};
use crate::id::{DefTag, TypeId};
use crate::raw::RawTable;
use crate::registry::TypeNamespace;
use crate::types::{Ty, TyKind, TypeRef};
use slotmap::SecondaryMap;

/// Access shape of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableMode {
    /// Exactly one row.
    One,
    /// Unique key to row.
    Map,
    /// Ordered rows with zero or more (possibly non-unique) indices.
    List,
}

impl TableMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TableMode::One => "one",
            TableMode::Map => "map",
            TableMode::List => "list",
        }
    }
}

/// One component of an index: a hierarchy field and its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexField {
    pub name: String,
    pub position: usize,
    pub ty: TypeRef,
}

/// A resolved index specification. More than one field makes it a union index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub fields: Vec<IndexField>,
}

impl IndexSpec {
    pub fn is_union(&self) -> bool {
        self.fields.len() > 1
    }

    /// The spec as declared, e.g. `a+b`.
    pub fn name(&self) -> String {
        self.fields
            .iter()
            .map(|f| f.name.as_str())
            .collect::<Vec<_>>()
            .join("+")
    }
}

/// A compiled table.
#[derive(Debug, Clone)]
pub struct TableDef {
    pub full_name: String,
    pub mode: TableMode,
    pub value_bean: TypeId,
    pub value_type: TypeRef,
    /// Type of the primary index field, absent for ONE tables and unindexed lists.
    pub key_type: Option<TypeRef>,
    /// Bean for ONE, `map<key, bean>` for MAP, `list<bean>` for LIST.
    pub effective_type: TypeRef,
    pub index_text: String,
    pub index_list: Vec<IndexSpec>,
    /// First component of the first spec.
    pub primary: Option<IndexField>,
    pub multi_key: bool,
    pub is_union_index: bool,
    pub output: Option<String>,
    pub input_files: Vec<String>,
    pub is_exported: bool,
}

impl TableDef {
    /// Output data file name: the explicit override, else the full name with
    /// `.` replaced by `_`, lower-cased.
    pub fn output_data_file(&self) -> String {
        match &self.output {
            Some(name) if !name.is_empty() => name.clone(),
            _ => self.full_name.replace('.', "_").to_lowercase(),
        }
    }
}

/// Compile one table against already-compiled beans.
pub(crate) fn compile_table(
    ns: &TypeNamespace,
    beans: &SecondaryMap<TypeId, BeanDef>,
    full_name: &str,
    raw: &RawTable,
) -> Result<TableDef, CompileError> {
    let value_name = raw.value_type.trim();
    let value_bean = ns
        .resolve(&raw.module, value_name)
        .ok_or_else(|| CompileError::UnresolvedType {
            name: value_name.to_string(),
            module: raw.module.clone(),
        })?;
    if ns.tag(value_bean) != Some(DefTag::Bean) || !beans.contains_key(value_bean) {
        return Err(CompileError::ValueTypeNotBean {
            table: full_name.to_string(),
            value_type: value_name.to_string(),
        });
    }
    let value_type = ns.cache().intern(Ty::new(TyKind::Bean(value_bean)));

    let resolve = |name: &str| -> Result<IndexField, CompileError> {
        beans
            .find_field(value_bean, name)
            .map(|(field, position)| index_field(field, position))
            .ok_or_else(|| CompileError::FieldNotFound {
                owner: full_name.to_string(),
                field: name.to_string(),
            })
    };

    let index_list = match raw.mode {
        TableMode::One => Vec::new(),
        TableMode::Map => {
            let name = raw.index.trim();
            let field = if name.is_empty() {
                let first = beans
                    .hierarchy_fields(value_bean)
                    .into_iter()
                    .next()
                    .ok_or_else(|| CompileError::TableWithoutFields {
                        table: full_name.to_string(),
                    })?;
                index_field(first, 0)
            } else {
                resolve(name)?
            };
            vec![IndexSpec {
                fields: vec![field],
            }]
        }
        TableMode::List => raw
            .index
            .split(',')
            .map(str::trim)
            .filter(|spec| !spec.is_empty())
            .map(|spec| {
                let fields = spec
                    .split('+')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(&resolve)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(IndexSpec { fields })
            })
            .collect::<Result<Vec<_>, CompileError>>()?,
    };

    for field in index_list.iter().flat_map(|spec| &spec.fields) {
        if field.ty.nullable || !field.ty.is_key_capable() {
            return Err(CompileError::InvalidIndexType {
                table: full_name.to_string(),
                field: field.name.clone(),
                ty: ns.describe(&field.ty),
            });
        }
    }

    let primary = index_list
        .first()
        .and_then(|spec| spec.fields.first())
        .cloned();
    let key_type = primary.as_ref().map(|f| f.ty.clone());
    let is_union_index = index_list.iter().any(IndexSpec::is_union);
    let multi_key = index_list.len() > 1 && !is_union_index;

    let effective_type = match (raw.mode, &key_type) {
        (TableMode::Map, Some(key)) => ns.cache().intern(Ty::new(TyKind::Map {
            key: key.clone(),
            value: value_type.clone(),
            sep: None,
        })),
        (TableMode::List, _) => ns.cache().intern(Ty::new(TyKind::List {
            elem: value_type.clone(),
            sep: None,
        })),
        _ => value_type.clone(),
    };

    Ok(TableDef {
        full_name: full_name.to_string(),
        mode: raw.mode,
        value_bean,
        value_type,
        key_type,
        effective_type,
        index_text: raw.index.clone(),
        index_list,
        primary,
        multi_key,
        is_union_index,
        output: raw.output.clone(),
        input_files: raw.input_files.clone(),
        is_exported: false,
    })
}

fn index_field(field: &FieldDef, position: usize) -> IndexField {
    IndexField {
        name: field.name.clone(),
        position,
        ty: field.ty.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BuildOptions;
    use crate::raw::{RawBean, RawEnum, RawEnumItem};
    use crate::registry::{Registry, RegistryBuilder};
    use crate::types::PrimitiveKind;

    fn item_bean() -> RawBean {
        RawBean::new("item", "Item")
            .field("id", "int")
            .field("kind", "Kind")
            .field("name", "string")
            .field("weight", "float")
            .field("owner", "int?")
            .field("tags", "list<string>[,]")
    }

    fn build(table: RawTable) -> Result<Registry, CompileError> {
        let mut b = RegistryBuilder::new();
        b.add_enum(RawEnum::new("item", "Kind").item(RawEnumItem::new("A")))
            .unwrap();
        b.add_bean(item_bean()).unwrap();
        b.add_table(table).unwrap();
        b.build(&BuildOptions::default())
    }

    fn table(reg: &Registry) -> &TableDef {
        reg.table_by_name("item.TbItem").unwrap()
    }

    // -----------------------------------------------------------------------
    // Modes
    // -----------------------------------------------------------------------

    #[test]
    fn one_mode_has_no_index() {
        let reg = build(RawTable::new("item", "TbItem", "Item", TableMode::One)).unwrap();
        let t = table(&reg);
        assert!(t.index_list.is_empty());
        assert!(t.key_type.is_none());
        assert!(matches!(t.effective_type.kind, TyKind::Bean(_)));
    }

    #[test]
    fn map_mode_defaults_to_first_field() {
        let reg = build(RawTable::new("item", "TbItem", "Item", TableMode::Map)).unwrap();
        let t = table(&reg);
        assert_eq!(t.index_list.len(), 1);
        assert_eq!(t.primary.as_ref().map(|f| f.name.as_str()), Some("id"));
        assert_eq!(
            t.key_type.as_ref().and_then(|k| k.primitive_kind()),
            Some(PrimitiveKind::Int)
        );
        assert!(matches!(t.effective_type.kind, TyKind::Map { .. }));
    }

    #[test]
    fn map_mode_accepts_enum_and_string_keys() {
        let reg =
            build(RawTable::new("item", "TbItem", "Item", TableMode::Map).index("kind")).unwrap();
        assert_eq!(table(&reg).primary.as_ref().map(|f| f.position), Some(1));
        assert!(build(RawTable::new("item", "TbItem", "Item", TableMode::Map).index("name")).is_ok());
    }

    #[test]
    fn list_mode_multi_key_and_union() {
        let reg = build(
            RawTable::new("item", "TbItem", "Item", TableMode::List).index("id, name"),
        )
        .unwrap();
        let t = table(&reg);
        assert!(t.multi_key);
        assert!(!t.is_union_index);
        assert_eq!(t.index_list.len(), 2);

        let reg = build(
            RawTable::new("item", "TbItem", "Item", TableMode::List).index("id+kind,name"),
        )
        .unwrap();
        let t = table(&reg);
        assert!(!t.multi_key);
        assert!(t.is_union_index);
        assert_eq!(t.index_list[0].name(), "id+kind");
        assert_eq!(t.primary.as_ref().map(|f| f.name.as_str()), Some("id"));
        assert!(matches!(t.effective_type.kind, TyKind::List { .. }));
    }

    #[test]
    fn list_mode_without_index() {
        let reg = build(RawTable::new("item", "TbItem", "Item", TableMode::List)).unwrap();
        let t = table(&reg);
        assert!(t.index_list.is_empty());
        assert!(t.primary.is_none());
        assert!(!t.multi_key);
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    #[test]
    fn unknown_index_field_fails() {
        let result = build(RawTable::new("item", "TbItem", "Item", TableMode::Map).index("nope"));
        match result {
            Err(CompileError::FieldNotFound { owner, field }) => {
                assert_eq!(owner, "item.TbItem");
                assert_eq!(field, "nope");
            }
            other => panic!("expected FieldNotFound, got: {other:?}"),
        }
    }

    #[test]
    fn union_component_unknown_fails() {
        let result =
            build(RawTable::new("item", "TbItem", "Item", TableMode::List).index("id+missing"));
        assert!(matches!(result, Err(CompileError::FieldNotFound { .. })));
    }

    #[test]
    fn invalid_index_types_fail() {
        for (index, ty) in [("weight", "float"), ("owner", "int?"), ("tags", "list<string>[,]")] {
            match build(RawTable::new("item", "TbItem", "Item", TableMode::Map).index(index)) {
                Err(CompileError::InvalidIndexType { field, ty: got, .. }) => {
                    assert_eq!(field, index);
                    assert_eq!(got, ty);
                }
                other => panic!("expected InvalidIndexType for {index}, got: {other:?}"),
            }
        }
    }

    #[test]
    fn value_type_must_be_bean() {
        let result = build(RawTable::new("item", "TbItem", "Kind", TableMode::Map));
        assert!(matches!(result, Err(CompileError::ValueTypeNotBean { .. })));
        let result = build(RawTable::new("item", "TbItem", "Missing", TableMode::Map));
        assert!(matches!(result, Err(CompileError::UnresolvedType { .. })));
    }

    #[test]
    fn map_over_fieldless_bean_fails() {
        let mut b = RegistryBuilder::new();
        b.add_bean(RawBean::new("", "Empty")).unwrap();
        b.add_table(RawTable::new("", "TbEmpty", "Empty", TableMode::Map))
            .unwrap();
        assert!(matches!(
            b.build(&BuildOptions::default()),
            Err(CompileError::TableWithoutFields { .. })
        ));
    }

    #[test]
    fn output_file_name_derivation() {
        let reg = build(RawTable::new("item", "TbItem", "Item", TableMode::Map)).unwrap();
        assert_eq!(table(&reg).output_data_file(), "item_tbitem");
        let reg = build(
            RawTable::new("item", "TbItem", "Item", TableMode::Map).output("items_custom"),
        )
        .unwrap();
        assert_eq!(table(&reg).output_data_file(), "items_custom");
    }
}
