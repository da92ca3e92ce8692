//! Compiled type descriptors.
//!
//! A [`Ty`] is an immutable node: a primitive, a reference to a named enum
//! or bean (by [`TypeId`], never by owning pointer), or a container wrapping
//! one or two child descriptors. Attribute-free descriptors are interned by
//! [`TypeCache`] so that structurally identical uses share one instance.

use crate::id::TypeId;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Free-form `#key=value` attributes attached at a use site.
pub type Attrs = BTreeMap<String, String>;

/// Shared handle to an immutable type descriptor.
pub type TypeRef = Arc<Ty>;

/// Attribute recorded when a scalar is declared with a trailing `!`.
pub const NOT_DEFAULT_ATTR: &str = "not-default";

/// Attribute name carrying a legacy container separator.
pub const SEP_ATTR: &str = "sep";

// ===========================================================================
// Primitive kinds
// ===========================================================================

/// The fixed set of built-in scalar kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Bool,
    Byte,
    Short,
    Int,
    Long,
    BigInt,
    Float,
    Double,
    String,
    Text,
    DateTime,
}

impl PrimitiveKind {
    /// Match a type keyword, including synonyms (`int`/`int32`, `long`/`int64`, ...).
    pub fn from_keyword(word: &str) -> Option<Self> {
        let kind = match word {
            "bool" => PrimitiveKind::Bool,
            "byte" | "uint8" => PrimitiveKind::Byte,
            "short" | "int16" => PrimitiveKind::Short,
            "int" | "int32" => PrimitiveKind::Int,
            "long" | "int64" => PrimitiveKind::Long,
            "bigint" => PrimitiveKind::BigInt,
            "float" | "float32" => PrimitiveKind::Float,
            "double" | "float64" => PrimitiveKind::Double,
            "string" => PrimitiveKind::String,
            "text" => PrimitiveKind::Text,
            "time" | "datetime" => PrimitiveKind::DateTime,
            _ => return None,
        };
        Some(kind)
    }

    /// Canonical keyword for this kind.
    pub fn keyword(self) -> &'static str {
        match self {
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::Byte => "byte",
            PrimitiveKind::Short => "short",
            PrimitiveKind::Int => "int",
            PrimitiveKind::Long => "long",
            PrimitiveKind::BigInt => "bigint",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
            PrimitiveKind::String => "string",
            PrimitiveKind::Text => "text",
            PrimitiveKind::DateTime => "datetime",
        }
    }

    /// Whether values of this kind can key a table index. Excludes floats
    /// and date-times.
    pub fn is_key_capable(self) -> bool {
        !matches!(
            self,
            PrimitiveKind::Float | PrimitiveKind::Double | PrimitiveKind::DateTime
        )
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            PrimitiveKind::Byte
                | PrimitiveKind::Short
                | PrimitiveKind::Int
                | PrimitiveKind::Long
                | PrimitiveKind::BigInt
        )
    }
}

// ===========================================================================
// Descriptors
// ===========================================================================

/// Shape of a type descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TyKind {
    Primitive(PrimitiveKind),
    Enum(TypeId),
    Bean(TypeId),
    Array { elem: TypeRef, sep: Option<char> },
    List { elem: TypeRef, sep: Option<char> },
    Set { elem: TypeRef, sep: Option<char> },
    Map { key: TypeRef, value: TypeRef, sep: Option<char> },
}

/// An immutable type descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ty {
    pub kind: TyKind,
    pub nullable: bool,
    pub attrs: Attrs,
}

impl Ty {
    pub fn new(kind: TyKind) -> Self {
        Self {
            kind,
            nullable: false,
            attrs: Attrs::new(),
        }
    }

    pub fn primitive(kind: PrimitiveKind) -> Self {
        Self::new(TyKind::Primitive(kind))
    }

    pub fn is_container(&self) -> bool {
        matches!(
            self.kind,
            TyKind::Array { .. } | TyKind::List { .. } | TyKind::Set { .. } | TyKind::Map { .. }
        )
    }

    /// False when the declaration carried a trailing `!`.
    pub fn has_default(&self) -> bool {
        !self.attrs.contains_key(NOT_DEFAULT_ATTR)
    }

    /// The per-dimension separator of a container, if declared.
    pub fn separator(&self) -> Option<char> {
        match &self.kind {
            TyKind::Array { sep, .. }
            | TyKind::List { sep, .. }
            | TyKind::Set { sep, .. }
            | TyKind::Map { sep, .. } => *sep,
            _ => None,
        }
    }

    /// Element descriptor of an array, list or set.
    pub fn element(&self) -> Option<&TypeRef> {
        match &self.kind {
            TyKind::Array { elem, .. } | TyKind::List { elem, .. } | TyKind::Set { elem, .. } => {
                Some(elem)
            }
            _ => None,
        }
    }

    /// The enum or bean this descriptor names, if any.
    pub fn named(&self) -> Option<TypeId> {
        match self.kind {
            TyKind::Enum(id) | TyKind::Bean(id) => Some(id),
            _ => None,
        }
    }

    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        match self.kind {
            TyKind::Primitive(k) => Some(k),
            _ => None,
        }
    }

    /// Key-capable types are non-float primitive scalars and enums.
    pub fn is_key_capable(&self) -> bool {
        match &self.kind {
            TyKind::Primitive(k) => k.is_key_capable(),
            TyKind::Enum(_) => true,
            _ => false,
        }
    }
}

// ===========================================================================
// Interning
// ===========================================================================

/// Interns attribute-free descriptors so equal inputs yield the same
/// [`TypeRef`] instance. Descriptors with attributes are always fresh, since
/// attributes can change downstream behavior per use site.
#[derive(Debug, Default)]
pub struct TypeCache {
    interned: Mutex<HashMap<Ty, TypeRef>>,
}

impl TypeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&self, ty: Ty) -> TypeRef {
        if !ty.attrs.is_empty() {
            return Arc::new(ty);
        }
        let mut interned = self.interned.lock();
        if let Some(existing) = interned.get(&ty) {
            return Arc::clone(existing);
        }
        let shared = Arc::new(ty.clone());
        interned.insert(ty, Arc::clone(&shared));
        shared
    }

    pub fn len(&self) -> usize {
        self.interned.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
