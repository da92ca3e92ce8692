//! Serde data file structs for schema modules.
//!
//! A schema module file declares the enums, beans and tables of one module,
//! plus any group and target definitions. Files are deserialized from RON,
//! JSON or TOML and then handed to the core as raw declarations.

use serde::Deserialize;
use tabula_core::raw::{
    RawBean, RawEnum, RawEnumItem, RawField, RawGroup, RawRefGroup, RawTable, RawTarget,
};
use tabula_core::registry::{DuplicateTypeError, RegistryBuilder};
use tabula_core::table::TableMode;

// ===========================================================================
// Module
// ===========================================================================

/// One schema module file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModuleData {
    /// Module name; empty for the root module.
    pub module: String,
    pub enums: Vec<EnumData>,
    pub beans: Vec<BeanData>,
    pub tables: Vec<TableDefData>,
    pub groups: Vec<GroupData>,
    pub targets: Vec<TargetData>,
    pub const_aliases: Vec<ConstAliasData>,
    pub ref_groups: Vec<RefGroupData>,
}

impl ModuleData {
    /// Hand every declaration of this module to `builder`.
    pub fn register(self, builder: &mut RegistryBuilder) -> Result<(), DuplicateTypeError> {
        let module = self.module;
        for c in self.const_aliases {
            builder.add_const_alias(&c.name, &c.value)?;
        }
        for g in self.ref_groups {
            builder.add_ref_group(RawRefGroup {
                name: g.name,
                refs: g.refs,
            })?;
        }
        for e in self.enums {
            builder.add_enum(e.into_raw(&module))?;
        }
        for b in self.beans {
            builder.add_bean(b.into_raw(&module))?;
        }
        for t in self.tables {
            builder.add_table(t.into_raw(&module))?;
        }
        for g in self.groups {
            builder.add_group(RawGroup {
                names: g.names,
                is_default: g.default,
            });
        }
        for t in self.targets {
            builder.add_target(RawTarget {
                name: t.name,
                groups: t.groups,
                top_module: t.top_module,
            });
        }
        Ok(())
    }
}

// ===========================================================================
// Enums
// ===========================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct EnumData {
    pub name: String,
    #[serde(default)]
    pub items: Vec<EnumItemData>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub comment: String,
}

/// An enum item. Items without a value follow the previous item's value.
#[derive(Debug, Clone, Deserialize)]
pub struct EnumItemData {
    pub name: String,
    #[serde(default)]
    pub value: Option<i32>,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub comment: String,
}

impl EnumData {
    fn into_raw(self, module: &str) -> RawEnum {
        RawEnum {
            module: module.to_string(),
            name: self.name,
            items: self
                .items
                .into_iter()
                .map(|i| RawEnumItem {
                    name: i.name,
                    value: i.value,
                    alias: i.alias,
                    comment: i.comment,
                })
                .collect(),
            groups: self.groups,
            comment: self.comment,
        }
    }
}

// ===========================================================================
// Beans
// ===========================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct BeanData {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldData>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldData {
    pub name: String,
    /// Type expression, e.g. `list<int>[,]`.
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

impl BeanData {
    fn into_raw(self, module: &str) -> RawBean {
        RawBean {
            module: module.to_string(),
            name: self.name,
            parent: self.parent.filter(|p| !p.trim().is_empty()),
            fields: self
                .fields
                .into_iter()
                .map(|f| RawField {
                    name: f.name,
                    ty: f.ty,
                    comment: f.comment,
                    groups: f.groups,
                })
                .collect(),
            groups: self.groups,
            comment: self.comment,
        }
    }
}

// ===========================================================================
// Tables
// ===========================================================================

/// Table access mode as written in schema files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeData {
    One,
    #[default]
    Map,
    List,
}

impl From<ModeData> for TableMode {
    fn from(mode: ModeData) -> Self {
        match mode {
            ModeData::One => TableMode::One,
            ModeData::Map => TableMode::Map,
            ModeData::List => TableMode::List,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableDefData {
    pub name: String,
    /// Row bean name.
    pub value: String,
    #[serde(default)]
    pub mode: ModeData,
    #[serde(default)]
    pub index: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub output: Option<String>,
    /// Record file names, relative to the data directory.
    #[serde(default)]
    pub input: Vec<String>,
}

impl TableDefData {
    fn into_raw(self, module: &str) -> RawTable {
        RawTable {
            module: module.to_string(),
            name: self.name,
            value_type: self.value,
            mode: self.mode.into(),
            index: self.index,
            groups: self.groups,
            comment: self.comment,
            output: self.output,
            input_files: self.input,
        }
    }
}

// ===========================================================================
// Groups and targets
// ===========================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct GroupData {
    pub names: Vec<String>,
    #[serde(default)]
    pub default: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetData {
    pub name: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub top_module: String,
}

// ===========================================================================
// Const aliases and ref groups
// ===========================================================================

/// A named constant. Numeric fields accept the name in place of the literal.
#[derive(Debug, Clone, Deserialize)]
pub struct ConstAliasData {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefGroupData {
    pub name: String,
    #[serde(default)]
    pub refs: Vec<String>,
}
