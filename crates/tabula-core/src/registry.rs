//! Type registry: the global namespace of enums, beans and tables.
//!
//! Registration happens on a [`RegistryBuilder`], which enforces the naming
//! rules immediately. [`RegistryBuilder::build`] runs the three compile
//! passes and freezes the result into an immutable [`Registry`] that is safe
//! to share across threads.

use crate::compile::{self, CompileError, ExportSet};
use crate::context::BuildOptions;
use crate::defs::{BeanDef, BeanLookup, DefKind, EnumDef, FieldDef, RefGroupDef, TypeDef};
use crate::id::{DefTag, TypeId, make_full_name};
use crate::parser::{self, TypeExpr};
use crate::raw::{RawBean, RawEnum, RawGroup, RawRefGroup, RawTable, RawTarget};
use crate::table::TableDef;
use crate::types::{Ty, TyKind, TypeCache, TypeRef};
use slotmap::{SecondaryMap, SlotMap};
use std::collections::{BTreeMap, HashMap};
use tracing::info;

// ===========================================================================
// Errors
// ===========================================================================

/// A naming collision detected at registration. One variant per rule.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DuplicateTypeError {
    #[error("type '{0}' is already defined")]
    FullName(String),

    #[error("type '{name}' differs from '{existing}' only by case")]
    CaseFoldedName { name: String, existing: String },

    #[error("namespace '{namespace}' of type '{name}' differs from namespace '{existing}' only by case")]
    NamespaceCase {
        name: String,
        namespace: String,
        existing: String,
    },

    #[error("namespace '{namespace}' of type '{name}' collides with type '{existing}'")]
    NamespaceShadowsType {
        name: String,
        namespace: String,
        existing: String,
    },

    #[error("type '{name}' collides with namespace '{namespace}'")]
    TypeShadowsNamespace { name: String, namespace: String },

    #[error("table '{name}' has the same local name as table '{existing}'")]
    TableName { name: String, existing: String },

    #[error("const alias '{0}' is already defined")]
    ConstAlias(String),

    #[error("ref group '{0}' is already defined")]
    RefGroup(String),
}

// ===========================================================================
// Namespace
// ===========================================================================

/// A registered name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameEntry {
    pub name: String,
    pub module: String,
    pub full_name: String,
    pub tag: DefTag,
}

/// Name bookkeeping plus the shared type cache.
#[derive(Debug, Default)]
pub struct TypeNamespace {
    entries: SlotMap<TypeId, NameEntry>,
    by_full_name: HashMap<String, TypeId>,
    by_lower_full_name: HashMap<String, TypeId>,
    /// Lower-cased namespace -> first spelling seen.
    lower_namespaces: HashMap<String, String>,
    table_names: HashMap<String, TypeId>,
    cache: TypeCache,
}

impl TypeNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a name, enforcing every collision rule.
    pub fn register(
        &mut self,
        module: &str,
        name: &str,
        tag: DefTag,
    ) -> Result<TypeId, DuplicateTypeError> {
        let full_name = make_full_name(module, name);
        if self.by_full_name.contains_key(&full_name) {
            return Err(DuplicateTypeError::FullName(full_name));
        }

        let lower = full_name.to_lowercase();
        if let Some(&other) = self.by_lower_full_name.get(&lower) {
            return Err(DuplicateTypeError::CaseFoldedName {
                name: full_name,
                existing: self.entries[other].full_name.clone(),
            });
        }

        let lower_ns = module.to_lowercase();
        if !module.is_empty() {
            if let Some(spelling) = self.lower_namespaces.get(&lower_ns) {
                if spelling != module {
                    return Err(DuplicateTypeError::NamespaceCase {
                        name: full_name,
                        namespace: module.to_string(),
                        existing: spelling.clone(),
                    });
                }
            }
            if let Some(&other) = self.by_lower_full_name.get(&lower_ns) {
                return Err(DuplicateTypeError::NamespaceShadowsType {
                    name: full_name,
                    namespace: module.to_string(),
                    existing: self.entries[other].full_name.clone(),
                });
            }
        }
        if let Some(spelling) = self.lower_namespaces.get(&lower) {
            return Err(DuplicateTypeError::TypeShadowsNamespace {
                name: full_name,
                namespace: spelling.clone(),
            });
        }

        if tag == DefTag::Table {
            if let Some(&other) = self.table_names.get(name) {
                return Err(DuplicateTypeError::TableName {
                    name: full_name,
                    existing: self.entries[other].full_name.clone(),
                });
            }
        }

        let id = self.entries.insert(NameEntry {
            name: name.to_string(),
            module: module.to_string(),
            full_name: full_name.clone(),
            tag,
        });
        self.by_full_name.insert(full_name, id);
        self.by_lower_full_name.insert(lower, id);
        if !module.is_empty() {
            self.lower_namespaces
                .entry(lower_ns)
                .or_insert_with(|| module.to_string());
        }
        if tag == DefTag::Table {
            self.table_names.insert(name.to_string(), id);
        }
        Ok(id)
    }

    /// Resolve `name` as seen from `module`: module-qualified first, then global.
    pub fn resolve(&self, module: &str, name: &str) -> Option<TypeId> {
        self.by_full_name
            .get(&make_full_name(module, name))
            .or_else(|| self.by_full_name.get(name))
            .copied()
    }

    pub fn lookup(&self, full_name: &str) -> Option<TypeId> {
        self.by_full_name.get(full_name).copied()
    }

    /// A table by full name, or by its local name (unique across modules).
    pub fn resolve_table(&self, name: &str) -> Option<TypeId> {
        self.lookup(name)
            .filter(|id| self.tag(*id) == Some(DefTag::Table))
            .or_else(|| self.table_names.get(name).copied())
    }

    pub fn entry(&self, id: TypeId) -> Option<&NameEntry> {
        self.entries.get(id)
    }

    pub fn tag(&self, id: TypeId) -> Option<DefTag> {
        self.entries.get(id).map(|e| e.tag)
    }

    pub fn full_name(&self, id: TypeId) -> Option<&str> {
        self.entries.get(id).map(|e| e.full_name.as_str())
    }

    /// Ids in registration order.
    pub fn ids(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cache(&self) -> &TypeCache {
        &self.cache
    }

    /// Parse `text` and resolve it to a type descriptor as seen from `module`.
    pub fn create_type(
        &self,
        module: &str,
        text: &str,
        container_element: bool,
    ) -> Result<TypeRef, CompileError> {
        let expr = parser::parse_type_in(text, container_element)?;
        self.lower(module, &expr)
    }

    fn lower(&self, module: &str, expr: &TypeExpr) -> Result<TypeRef, CompileError> {
        let ty = match expr {
            TypeExpr::Primitive {
                kind,
                nullable,
                attrs,
            } => Ty {
                kind: TyKind::Primitive(*kind),
                nullable: *nullable,
                attrs: attrs.clone(),
            },
            TypeExpr::Named {
                name,
                nullable,
                attrs,
            } => {
                let id = self
                    .resolve(module, name)
                    .ok_or_else(|| CompileError::UnresolvedType {
                        name: name.clone(),
                        module: module.to_string(),
                    })?;
                let kind = match self.tag(id) {
                    Some(DefTag::Enum) => TyKind::Enum(id),
                    Some(DefTag::Bean) => TyKind::Bean(id),
                    _ => return Err(CompileError::TableAsType(name.clone())),
                };
                Ty {
                    kind,
                    nullable: *nullable,
                    attrs: attrs.clone(),
                }
            }
            TypeExpr::Array { elem, sep, attrs } => Ty {
                kind: TyKind::Array {
                    elem: self.lower(module, elem)?,
                    sep: *sep,
                },
                nullable: false,
                attrs: attrs.clone(),
            },
            TypeExpr::List { elem, sep, attrs } => Ty {
                kind: TyKind::List {
                    elem: self.lower(module, elem)?,
                    sep: *sep,
                },
                nullable: false,
                attrs: attrs.clone(),
            },
            TypeExpr::Set { elem, sep, attrs } => Ty {
                kind: TyKind::Set {
                    elem: self.lower(module, elem)?,
                    sep: *sep,
                },
                nullable: false,
                attrs: attrs.clone(),
            },
            TypeExpr::Map {
                key,
                value,
                sep,
                attrs,
            } => Ty {
                kind: TyKind::Map {
                    key: self.lower(module, key)?,
                    value: self.lower(module, value)?,
                    sep: *sep,
                },
                nullable: false,
                attrs: attrs.clone(),
            },
        };
        Ok(self.cache.intern(ty))
    }

    /// Render a descriptor back to type-expression text.
    pub fn describe(&self, ty: &Ty) -> String {
        let sep = |sep: Option<char>| sep.map(|c| format!("[{c}]")).unwrap_or_default();
        let base = match &ty.kind {
            TyKind::Primitive(kind) => kind.keyword().to_string(),
            TyKind::Enum(id) | TyKind::Bean(id) => {
                self.full_name(*id).unwrap_or("<unknown>").to_string()
            }
            TyKind::Array { elem, sep: s } => format!("{}{}", self.describe(elem), sep(*s)),
            TyKind::List { elem, sep: s } => format!("list<{}>{}", self.describe(elem), sep(*s)),
            TyKind::Set { elem, sep: s } => format!("set<{}>{}", self.describe(elem), sep(*s)),
            TyKind::Map { key, value, sep: s } => format!(
                "map<{},{}>{}",
                self.describe(key),
                self.describe(value),
                sep(*s)
            ),
        };
        if ty.nullable { format!("{base}?") } else { base }
    }
}

// ===========================================================================
// Builder
// ===========================================================================

/// A declaration awaiting compilation.
#[derive(Debug, Clone)]
pub(crate) enum RawDecl {
    Enum(RawEnum),
    Bean(RawBean),
    Table(RawTable),
}

impl RawDecl {
    pub(crate) fn full_name(&self) -> String {
        match self {
            RawDecl::Enum(e) => make_full_name(&e.module, &e.name),
            RawDecl::Bean(b) => make_full_name(&b.module, &b.name),
            RawDecl::Table(t) => make_full_name(&t.module, &t.name),
        }
    }
}

/// Collects declarations, then compiles them into a [`Registry`].
///
/// Phase 1 registers names (collisions fail immediately). Phase 2 is
/// [`build`](Self::build), which runs pre-compile, compile and post-compile
/// over the whole graph so declarations may reference each other in any order.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    ns: TypeNamespace,
    decls: SecondaryMap<TypeId, RawDecl>,
    groups: Vec<RawGroup>,
    targets: Vec<RawTarget>,
    const_aliases: HashMap<String, String>,
    ref_groups: Vec<RawRefGroup>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Phase 1: Register an enum.
    pub fn add_enum(&mut self, raw: RawEnum) -> Result<TypeId, DuplicateTypeError> {
        let id = self.ns.register(&raw.module, &raw.name, DefTag::Enum)?;
        self.decls.insert(id, RawDecl::Enum(raw));
        Ok(id)
    }

    /// Phase 1: Register a bean.
    pub fn add_bean(&mut self, raw: RawBean) -> Result<TypeId, DuplicateTypeError> {
        let id = self.ns.register(&raw.module, &raw.name, DefTag::Bean)?;
        self.decls.insert(id, RawDecl::Bean(raw));
        Ok(id)
    }

    /// Phase 1: Register a table.
    pub fn add_table(&mut self, raw: RawTable) -> Result<TypeId, DuplicateTypeError> {
        let id = self.ns.register(&raw.module, &raw.name, DefTag::Table)?;
        self.decls.insert(id, RawDecl::Table(raw));
        Ok(id)
    }

    pub fn add_group(&mut self, group: RawGroup) {
        self.groups.push(group);
    }

    pub fn add_target(&mut self, target: RawTarget) {
        self.targets.push(target);
    }

    /// Register a named constant usable in place of a numeric literal.
    pub fn add_const_alias(&mut self, name: &str, value: &str) -> Result<(), DuplicateTypeError> {
        if self.const_aliases.contains_key(name) {
            return Err(DuplicateTypeError::ConstAlias(name.to_string()));
        }
        self.const_aliases
            .insert(name.to_string(), value.trim().to_string());
        Ok(())
    }

    pub fn add_ref_group(&mut self, group: RawRefGroup) -> Result<(), DuplicateTypeError> {
        if self.ref_groups.iter().any(|g| g.name == group.name) {
            return Err(DuplicateTypeError::RefGroup(group.name));
        }
        self.ref_groups.push(group);
        Ok(())
    }

    pub fn type_count(&self) -> usize {
        self.ns.len()
    }

    /// Phase 2: Compile and freeze.
    pub fn build(self, options: &BuildOptions) -> Result<Registry, CompileError> {
        info!(types = self.ns.len(), "compiling schema");

        compile::pre_compile(&self.decls)?;
        let mut defs = compile::compile(&self.ns, &self.decls)?;
        let ref_groups = compile::compile_ref_groups(&self.ns, &self.ref_groups)?;
        let exports = compile::post_compile(
            &self.ns,
            &mut defs,
            &self.groups,
            &self.targets,
            options,
        )?;

        info!(
            types = defs.len(),
            build_target = %exports.target.name,
            export_tables = exports.tables.len(),
            export_types = exports.types.len(),
            "schema compiled"
        );

        Ok(Registry {
            ns: self.ns,
            defs,
            groups: self.groups,
            exports,
            const_aliases: self.const_aliases,
            ref_groups,
            variants: options.variants.clone(),
        })
    }
}

// ===========================================================================
// Registry
// ===========================================================================

/// Immutable compiled type graph. Frozen after build(). Thread-safe to share.
#[derive(Debug)]
pub struct Registry {
    ns: TypeNamespace,
    defs: SecondaryMap<TypeId, TypeDef>,
    groups: Vec<RawGroup>,
    exports: ExportSet,
    const_aliases: HashMap<String, String>,
    ref_groups: Vec<RefGroupDef>,
    variants: BTreeMap<String, String>,
}

impl Registry {
    pub fn get(&self, id: TypeId) -> Option<&TypeDef> {
        self.defs.get(id)
    }

    /// Lookup by fully-qualified name.
    pub fn lookup(&self, full_name: &str) -> Option<TypeId> {
        self.ns.lookup(full_name)
    }

    /// Resolve a name as seen from `module`.
    pub fn resolve(&self, module: &str, name: &str) -> Option<TypeId> {
        self.ns.resolve(module, name)
    }

    /// Every compiled type, in registration order.
    pub fn types(&self) -> impl Iterator<Item = (TypeId, &TypeDef)> {
        self.defs.iter()
    }

    pub fn type_count(&self) -> usize {
        self.defs.len()
    }

    pub fn full_name(&self, id: TypeId) -> Option<&str> {
        self.ns.full_name(id)
    }

    pub fn enum_def(&self, id: TypeId) -> Option<&EnumDef> {
        self.defs.get(id).and_then(|d| d.kind.as_enum())
    }

    pub fn bean_def(&self, id: TypeId) -> Option<&BeanDef> {
        self.defs.get(id).and_then(|d| d.kind.as_bean())
    }

    pub fn is_bean(&self, id: TypeId) -> bool {
        matches!(self.defs.get(id).map(|d| &d.kind), Some(DefKind::Bean(_)))
    }

    /// Exact-name field lookup over `bean`'s hierarchy.
    pub fn bean_field(&self, bean: TypeId, name: &str) -> Option<(&FieldDef, usize)> {
        self.find_field(bean, name)
    }

    pub fn table_def(&self, id: TypeId) -> Option<&TableDef> {
        self.defs.get(id).and_then(|d| d.kind.as_table())
    }

    pub fn table_by_name(&self, full_name: &str) -> Option<&TableDef> {
        self.lookup(full_name).and_then(|id| self.table_def(id))
    }

    /// All tables, in registration order.
    pub fn tables(&self) -> impl Iterator<Item = (TypeId, &TableDef)> {
        self.defs
            .iter()
            .filter_map(|(id, d)| d.kind.as_table().map(|t| (id, t)))
    }

    /// Descendant beans of `bean`, depth-first, children in full-name order.
    pub fn descendants(&self, bean: TypeId) -> Vec<TypeId> {
        let mut out = Vec::new();
        let mut stack: Vec<TypeId> = self
            .bean_def(bean)
            .map(|b| b.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(b) = self.bean_def(id) {
                stack.extend(b.children.iter().rev().copied());
            }
        }
        out
    }

    pub fn describe(&self, ty: &Ty) -> String {
        self.ns.describe(ty)
    }

    /// Parse and resolve a type expression against the compiled namespace.
    pub fn create_type(&self, module: &str, text: &str) -> Result<TypeRef, CompileError> {
        self.ns.create_type(module, text, false)
    }

    pub fn groups(&self) -> &[RawGroup] {
        &self.groups
    }

    pub fn target(&self) -> &RawTarget {
        &self.exports.target
    }

    /// Whether a definition tagged with `groups` belongs to the active target.
    pub fn need_export(&self, groups: &[String]) -> bool {
        compile::need_export(groups, &self.exports)
    }

    pub fn export_tables(&self) -> &[TypeId] {
        &self.exports.tables
    }

    /// Every type reachable from the export roots, in full-name order.
    pub fn export_types(&self) -> &[TypeId] {
        &self.exports.types
    }

    /// Exported beans, each root followed by its descendants.
    pub fn export_beans(&self) -> &[TypeId] {
        &self.exports.beans
    }

    pub fn export_enums(&self) -> &[TypeId] {
        &self.exports.enums
    }

    pub fn type_cache_len(&self) -> usize {
        self.ns.cache().len()
    }

    /// The literal a const alias stands for.
    pub fn const_alias(&self, name: &str) -> Option<&str> {
        self.const_aliases.get(name).map(String::as_str)
    }

    pub fn ref_group(&self, name: &str) -> Option<&RefGroupDef> {
        self.ref_groups.iter().find(|g| g.name == name)
    }

    pub fn ref_groups(&self) -> &[RefGroupDef] {
        &self.ref_groups
    }

    /// Variant chosen for `key` by the build options.
    pub fn variant_name(&self, key: &str) -> Option<&str> {
        self.variants.get(key).map(String::as_str)
    }

    /// Like [`variant_name`](Self::variant_name), falling back to the
    /// `default` entry.
    pub fn variant_name_or_default(&self, key: &str) -> Option<&str> {
        self.variant_name(key)
            .or_else(|| self.variant_name(DEFAULT_VARIANT_KEY))
    }
}

/// Variant entry used when a key has no entry of its own.
pub const DEFAULT_VARIANT_KEY: &str = "default";

impl BeanLookup for Registry {
    fn bean(&self, id: TypeId) -> Option<&BeanDef> {
        self.bean_def(id)
    }
}
