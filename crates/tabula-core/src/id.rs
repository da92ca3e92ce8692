use slotmap::new_key_type;

new_key_type! {
    /// Identifies a named type (enum, bean or table) in the registry.
    ///
    /// Keys are handed out in registration order and never reused, so
    /// iterating the type store visits definitions in declaration order.
    pub struct TypeId;
}

/// The kind of definition a [`TypeId`] names. Known as soon as the type is
/// registered, before any compilation pass has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefTag {
    Enum,
    Bean,
    Table,
}

impl DefTag {
    pub fn as_str(self) -> &'static str {
        match self {
            DefTag::Enum => "enum",
            DefTag::Bean => "bean",
            DefTag::Table => "table",
        }
    }
}

/// Joins a module and a local name into a fully-qualified type name.
pub fn make_full_name(module: &str, name: &str) -> String {
    if module.is_empty() {
        name.to_string()
    } else {
        format!("{module}.{name}")
    }
}
