//! Raw schema declarations, as handed over by a schema loader.
//!
//! Type references are still text here; the registry resolves them during
//! compilation.

use crate::table::TableMode;

/// One enum item before value assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEnumItem {
    pub name: String,
    pub value: Option<i32>,
    pub alias: Option<String>,
    pub comment: String,
}

impl RawEnumItem {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_value(mut self, value: i32) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEnum {
    pub module: String,
    pub name: String,
    pub items: Vec<RawEnumItem>,
    pub groups: Vec<String>,
    pub comment: String,
}

impl RawEnum {
    pub fn new(module: &str, name: &str) -> Self {
        Self {
            module: module.to_string(),
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn item(mut self, item: RawEnumItem) -> Self {
        self.items.push(item);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawField {
    pub name: String,
    /// Declared type expression, e.g. `list<int>[,]`.
    pub ty: String,
    pub comment: String,
    pub groups: Vec<String>,
}

impl RawField {
    pub fn new(name: &str, ty: &str) -> Self {
        Self {
            name: name.to_string(),
            ty: ty.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawBean {
    pub module: String,
    pub name: String,
    /// Parent bean name, resolved module-first like any type reference.
    pub parent: Option<String>,
    pub fields: Vec<RawField>,
    pub groups: Vec<String>,
    pub comment: String,
}

impl RawBean {
    pub fn new(module: &str, name: &str) -> Self {
        Self {
            module: module.to_string(),
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn parent(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    pub fn field(mut self, name: &str, ty: &str) -> Self {
        self.fields.push(RawField::new(name, ty));
        self
    }

    pub fn groups(mut self, groups: &[&str]) -> Self {
        self.groups = groups.iter().map(|g| g.to_string()).collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    pub module: String,
    pub name: String,
    /// Name of the row bean.
    pub value_type: String,
    pub mode: TableMode,
    /// Raw index text: a field name for MAP, `a+b,c` style specs for LIST.
    pub index: String,
    pub groups: Vec<String>,
    pub comment: String,
    /// Explicit output data file name; derived from the full name when absent.
    pub output: Option<String>,
    pub input_files: Vec<String>,
}

impl RawTable {
    pub fn new(module: &str, name: &str, value_type: &str, mode: TableMode) -> Self {
        Self {
            module: module.to_string(),
            name: name.to_string(),
            value_type: value_type.to_string(),
            mode,
            index: String::new(),
            groups: Vec::new(),
            comment: String::new(),
            output: None,
            input_files: Vec::new(),
        }
    }

    pub fn index(mut self, index: &str) -> Self {
        self.index = index.to_string();
        self
    }

    pub fn groups(mut self, groups: &[&str]) -> Self {
        self.groups = groups.iter().map(|g| g.to_string()).collect();
        self
    }

    pub fn output(mut self, output: &str) -> Self {
        self.output = Some(output.to_string());
        self
    }
}

/// A named build target selecting a set of groups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTarget {
    pub name: String,
    pub groups: Vec<String>,
    pub top_module: String,
}

impl RawTarget {
    pub fn new(name: &str, groups: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            groups: groups.iter().map(|g| g.to_string()).collect(),
            top_module: String::new(),
        }
    }
}

/// A group definition. One definition may introduce several aliases.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawGroup {
    pub names: Vec<String>,
    pub is_default: bool,
}

impl RawGroup {
    pub fn new(names: &[&str], is_default: bool) -> Self {
        Self {
            names: names.iter().map(|n| n.to_string()).collect(),
            is_default,
        }
    }
}

/// A named set of tables that a field may reference as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRefGroup {
    pub name: String,
    /// Table names, full or local.
    pub refs: Vec<String>,
}

impl RawRefGroup {
    pub fn new(name: &str, refs: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            refs: refs.iter().map(|r| r.to_string()).collect(),
        }
    }
}
