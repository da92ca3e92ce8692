//! Compiled definitions stored in the registry.

use crate::id::TypeId;
use crate::table::TableDef;
use crate::types::TypeRef;
use slotmap::SecondaryMap;
use std::collections::HashSet;

/// A named type after compilation.
#[derive(Debug, Clone)]
pub struct TypeDef {
    pub name: String,
    pub module: String,
    pub full_name: String,
    pub groups: Vec<String>,
    pub comment: String,
    pub kind: DefKind,
}

#[derive(Debug, Clone)]
pub enum DefKind {
    Enum(EnumDef),
    Bean(BeanDef),
    Table(TableDef),
}

impl DefKind {
    pub fn as_enum(&self) -> Option<&EnumDef> {
        match self {
            DefKind::Enum(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_bean(&self) -> Option<&BeanDef> {
        match self {
            DefKind::Bean(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableDef> {
        match self {
            DefKind::Table(t) => Some(t),
            _ => None,
        }
    }
}

// ===========================================================================
// Enums
// ===========================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumItem {
    pub name: String,
    pub value: i32,
    pub alias: Option<String>,
    pub comment: String,
}

#[derive(Debug, Clone, Default)]
pub struct EnumDef {
    pub items: Vec<EnumItem>,
}

impl EnumDef {
    /// Look an item up by name or alias.
    pub fn item(&self, name: &str) -> Option<&EnumItem> {
        self.items
            .iter()
            .find(|i| i.name == name || i.alias.as_deref() == Some(name))
    }

    pub fn item_by_value(&self, value: i32) -> Option<&EnumItem> {
        self.items.iter().find(|i| i.value == value)
    }
}

// ===========================================================================
// Beans
// ===========================================================================

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeRef,
    pub comment: String,
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BeanDef {
    pub parent: Option<TypeId>,
    /// Fields declared on this bean only.
    pub fields: Vec<FieldDef>,
    /// Direct children, sorted by full name.
    pub children: Vec<TypeId>,
}

impl BeanDef {
    /// A bean with children is polymorphic and never instantiated directly.
    pub fn is_abstract(&self) -> bool {
        !self.children.is_empty()
    }
}

/// Read access to compiled beans, shared by the compile passes and the
/// finished registry.
pub trait BeanLookup {
    fn bean(&self, id: TypeId) -> Option<&BeanDef>;

    /// Fields of `bean` including inherited ones, root ancestor's fields first.
    fn hierarchy_fields(&self, bean: TypeId) -> Vec<&FieldDef> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut cur = Some(bean);
        while let Some(id) = cur {
            if !seen.insert(id) {
                break;
            }
            let Some(def) = self.bean(id) else { break };
            chain.push(def);
            cur = def.parent;
        }
        chain
            .iter()
            .rev()
            .flat_map(|def| def.fields.iter())
            .collect()
    }

    /// Exact-name lookup over hierarchy fields, returning the field and its position.
    fn find_field(&self, bean: TypeId, name: &str) -> Option<(&FieldDef, usize)> {
        self.hierarchy_fields(bean)
            .into_iter()
            .enumerate()
            .find(|(_, f)| f.name == name)
            .map(|(i, f)| (f, i))
    }
}

impl BeanLookup for SecondaryMap<TypeId, BeanDef> {
    fn bean(&self, id: TypeId) -> Option<&BeanDef> {
        self.get(id)
    }
}

// ===========================================================================
// Ref groups
// ===========================================================================

/// A compiled ref group: its tables, resolved, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefGroupDef {
    pub name: String,
    pub tables: Vec<TypeId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PrimitiveKind, Ty};
    use slotmap::SlotMap;
    use std::sync::Arc;

    fn field(name: &str) -> FieldDef {
        FieldDef {
            name: name.to_string(),
            ty: Arc::new(Ty::primitive(PrimitiveKind::Int)),
            comment: String::new(),
            groups: Vec::new(),
        }
    }

    #[test]
    fn enum_lookup_by_name_alias_and_value() {
        let def = EnumDef {
            items: vec![
                EnumItem {
                    name: "WHITE".into(),
                    value: 0,
                    alias: Some("white".into()),
                    comment: String::new(),
                },
                EnumItem {
                    name: "GOLD".into(),
                    value: 5,
                    alias: None,
                    comment: String::new(),
                },
            ],
        };
        assert_eq!(def.item("white").map(|i| i.value), Some(0));
        assert_eq!(def.item("GOLD").map(|i| i.value), Some(5));
        assert_eq!(def.item_by_value(5).map(|i| i.name.as_str()), Some("GOLD"));
        assert!(def.item("RED").is_none());
    }

    #[test]
    fn hierarchy_fields_parent_first() {
        let mut ids: SlotMap<TypeId, ()> = SlotMap::with_key();
        let base = ids.insert(());
        let child = ids.insert(());
        let mut beans = SecondaryMap::new();
        beans.insert(
            base,
            BeanDef {
                parent: None,
                fields: vec![field("id")],
                children: vec![child],
            },
        );
        beans.insert(
            child,
            BeanDef {
                parent: Some(base),
                fields: vec![field("power")],
                children: Vec::new(),
            },
        );

        let names: Vec<_> = beans
            .hierarchy_fields(child)
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["id", "power"]);
        assert_eq!(beans.find_field(child, "power").map(|(_, i)| i), Some(1));
        assert!(beans.find_field(base, "power").is_none());
        assert!(beans[base].is_abstract());
    }
}
