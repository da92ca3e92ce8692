//! The three whole-graph compile passes.
//!
//! - **pre-compile**: local structural checks, no cross-type lookups.
//! - **compile**: enums, then beans (parents, field types, hierarchy
//!   checks), then tables against the compiled beans. Any type may refer to
//!   any other regardless of declaration order.
//! - **post-compile**: children lists, target and group validation, export
//!   selection.
//!
//! Each pass runs to completion over every declaration before the next starts.

use crate::context::BuildOptions;
use crate::defs::{BeanDef, BeanLookup, DefKind, EnumDef, EnumItem, FieldDef, RefGroupDef, TypeDef};
use crate::id::{DefTag, TypeId};
use crate::parser::SyntaxError;
use crate::raw::{RawBean, RawEnum, RawGroup, RawRefGroup, RawTarget};
use crate::registry::{RawDecl, TypeNamespace};
use crate::table::compile_table;
use crate::types::{TyKind, TypeRef};
use slotmap::SecondaryMap;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Name of the target used when a schema declares none.
pub const IMPLICIT_TARGET: &str = "all";

// ===========================================================================
// Errors
// ===========================================================================

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error("unresolved type '{name}' (module '{module}')")]
    UnresolvedType { name: String, module: String },

    #[error("table '{0}' cannot be used as a field or element type")]
    TableAsType(String),

    #[error("{owner}.{field}: {source}")]
    InField {
        owner: String,
        field: String,
        source: Box<CompileError>,
    },

    #[error("value type '{value_type}' of table '{table}' is not a bean")]
    ValueTypeNotBean { table: String, value_type: String },

    #[error("field '{field}' not found in '{owner}'")]
    FieldNotFound { owner: String, field: String },

    #[error("index field '{field}' of table '{table}' has invalid key type '{ty}'")]
    InvalidIndexType {
        table: String,
        field: String,
        ty: String,
    },

    #[error("duplicate field '{field}' in '{owner}'")]
    DuplicateField { owner: String, field: String },

    #[error("duplicate enum item '{item}' in '{owner}'")]
    DuplicateEnumItem { owner: String, item: String },

    #[error("parent '{parent}' of bean '{bean}' does not exist or is not a bean")]
    UnresolvedParent { bean: String, parent: String },

    #[error("inheritance cycle through bean '{0}'")]
    InheritanceCycle(String),

    #[error("table '{table}' has no fields to index")]
    TableWithoutFields { table: String },

    #[error("unknown target '{0}'")]
    UnknownTarget(String),

    #[error("target '{target}' names undefined group '{group}'")]
    UndefinedGroup { target: String, group: String },

    #[error("export table '{0}' not found")]
    UnknownExportTable(String),

    #[error("ref group '{group}' references unknown table '{table}'")]
    UnresolvedRefGroupTable { group: String, table: String },
}

// ===========================================================================
// Pass 1: pre-compile
// ===========================================================================

pub(crate) fn pre_compile(decls: &SecondaryMap<TypeId, RawDecl>) -> Result<(), CompileError> {
    for decl in decls.values() {
        match decl {
            RawDecl::Enum(raw) => {
                let mut names = HashSet::new();
                for item in &raw.items {
                    if !names.insert(item.name.as_str()) {
                        return Err(CompileError::DuplicateEnumItem {
                            owner: decl.full_name(),
                            item: item.name.clone(),
                        });
                    }
                }
            }
            RawDecl::Bean(raw) => {
                let mut names = HashSet::new();
                for field in &raw.fields {
                    if !names.insert(field.name.as_str()) {
                        return Err(CompileError::DuplicateField {
                            owner: decl.full_name(),
                            field: field.name.clone(),
                        });
                    }
                }
            }
            RawDecl::Table(_) => {}
        }
    }
    Ok(())
}

// ===========================================================================
// Pass 2: compile
// ===========================================================================

pub(crate) fn compile(
    ns: &TypeNamespace,
    decls: &SecondaryMap<TypeId, RawDecl>,
) -> Result<SecondaryMap<TypeId, TypeDef>, CompileError> {
    let mut enums = SecondaryMap::new();
    for (id, decl) in decls {
        if let RawDecl::Enum(raw) = decl {
            enums.insert(id, compile_enum(raw));
        }
    }

    let mut beans = SecondaryMap::new();
    for (id, decl) in decls {
        if let RawDecl::Bean(raw) = decl {
            beans.insert(id, compile_bean(ns, raw, &decl.full_name())?);
        }
    }
    check_hierarchies(ns, &beans)?;

    let mut tables = SecondaryMap::new();
    for (id, decl) in decls {
        if let RawDecl::Table(raw) = decl {
            tables.insert(id, compile_table(ns, &beans, &decl.full_name(), raw)?);
        }
    }

    let mut defs = SecondaryMap::new();
    for (id, decl) in decls {
        let (kind, module, name, groups, comment) = match decl {
            RawDecl::Enum(raw) => (
                enums.remove(id).map(DefKind::Enum),
                &raw.module,
                &raw.name,
                &raw.groups,
                &raw.comment,
            ),
            RawDecl::Bean(raw) => (
                beans.remove(id).map(DefKind::Bean),
                &raw.module,
                &raw.name,
                &raw.groups,
                &raw.comment,
            ),
            RawDecl::Table(raw) => (
                tables.remove(id).map(DefKind::Table),
                &raw.module,
                &raw.name,
                &raw.groups,
                &raw.comment,
            ),
        };
        if let Some(kind) = kind {
            defs.insert(
                id,
                TypeDef {
                    name: name.clone(),
                    module: module.clone(),
                    full_name: decl.full_name(),
                    groups: groups.clone(),
                    comment: comment.clone(),
                    kind,
                },
            );
        }
    }
    Ok(defs)
}

/// Explicit value wins; otherwise previous value + 1, starting at 0.
fn compile_enum(raw: &RawEnum) -> EnumDef {
    let mut next = 0i32;
    let items = raw
        .items
        .iter()
        .map(|item| {
            let value = item.value.unwrap_or(next);
            next = value.wrapping_add(1);
            EnumItem {
                name: item.name.clone(),
                value,
                alias: item.alias.clone(),
                comment: item.comment.clone(),
            }
        })
        .collect();
    EnumDef { items }
}

fn compile_bean(ns: &TypeNamespace, raw: &RawBean, full_name: &str) -> Result<BeanDef, CompileError> {
    let parent = match raw.parent.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => {
            let id = ns
                .resolve(&raw.module, name)
                .filter(|id| ns.tag(*id) == Some(DefTag::Bean))
                .ok_or_else(|| CompileError::UnresolvedParent {
                    bean: full_name.to_string(),
                    parent: name.to_string(),
                })?;
            Some(id)
        }
        _ => None,
    };

    let fields = raw
        .fields
        .iter()
        .map(|f| {
            let ty = ns
                .create_type(&raw.module, &f.ty, false)
                .map_err(|e| CompileError::InField {
                    owner: full_name.to_string(),
                    field: f.name.clone(),
                    source: Box::new(e),
                })?;
            Ok(FieldDef {
                name: f.name.clone(),
                ty,
                comment: f.comment.clone(),
                groups: f.groups.clone(),
            })
        })
        .collect::<Result<Vec<_>, CompileError>>()?;

    Ok(BeanDef {
        parent,
        fields,
        children: Vec::new(),
    })
}

/// Reject inheritance cycles, then field names repeated anywhere in a hierarchy.
fn check_hierarchies(
    ns: &TypeNamespace,
    beans: &SecondaryMap<TypeId, BeanDef>,
) -> Result<(), CompileError> {
    let name_of = |id: TypeId| ns.full_name(id).unwrap_or_default().to_string();

    for id in beans.keys() {
        let mut seen = HashSet::new();
        let mut cur = Some(id);
        while let Some(c) = cur {
            if !seen.insert(c) {
                return Err(CompileError::InheritanceCycle(name_of(id)));
            }
            cur = beans.get(c).and_then(|b| b.parent);
        }
    }

    for id in beans.keys() {
        let mut names = HashSet::new();
        for field in beans.hierarchy_fields(id) {
            if !names.insert(field.name.as_str()) {
                return Err(CompileError::DuplicateField {
                    owner: name_of(id),
                    field: field.name.clone(),
                });
            }
        }
    }
    Ok(())
}

// ===========================================================================
// Pass 3: post-compile
// ===========================================================================

/// Export selection for the active target.
#[derive(Debug, Clone)]
pub struct ExportSet {
    pub target: RawTarget,
    /// Target groups plus every alias sharing a definition with one of them.
    pub active_groups: BTreeSet<String>,
    /// Whether definitions without groups are exported.
    pub default_groups_export: bool,
    /// Export tables in full-name order.
    pub tables: Vec<TypeId>,
    /// Every type reachable from the export roots, in full-name order.
    pub types: Vec<TypeId>,
    /// Exported beans, each root followed by its descendants.
    pub beans: Vec<TypeId>,
    pub enums: Vec<TypeId>,
}

pub(crate) fn need_export(groups: &[String], exports: &ExportSet) -> bool {
    if groups.is_empty() {
        exports.default_groups_export
    } else {
        groups.iter().any(|g| exports.active_groups.contains(g))
    }
}

pub(crate) fn post_compile(
    ns: &TypeNamespace,
    defs: &mut SecondaryMap<TypeId, TypeDef>,
    groups: &[RawGroup],
    targets: &[RawTarget],
    options: &BuildOptions,
) -> Result<ExportSet, CompileError> {
    assign_children(ns, defs);

    let target = select_target(targets, options)?;
    for group in &target.groups {
        if !groups.iter().any(|g| g.names.contains(group)) {
            return Err(CompileError::UndefinedGroup {
                target: target.name.clone(),
                group: group.clone(),
            });
        }
    }
    let default_groups_export = groups.is_empty()
        || target
            .groups
            .iter()
            .any(|g| groups.iter().any(|gd| gd.is_default && gd.names.contains(g)));

    let active_groups = groups
        .iter()
        .filter(|gd| gd.names.iter().any(|n| target.groups.contains(n)))
        .flat_map(|gd| gd.names.iter().cloned())
        .collect();

    let mut exports = ExportSet {
        target,
        active_groups,
        default_groups_export,
        tables: Vec::new(),
        types: Vec::new(),
        beans: Vec::new(),
        enums: Vec::new(),
    };

    let mut tables = if options.export_tables.is_empty() {
        defs.iter()
            .filter(|(_, d)| matches!(d.kind, DefKind::Table(_)) && need_export(&d.groups, &exports))
            .map(|(id, _)| id)
            .collect::<Vec<_>>()
    } else {
        options
            .export_tables
            .iter()
            .map(|name| {
                ns.lookup(name)
                    .filter(|id| ns.tag(*id) == Some(DefTag::Table))
                    .ok_or_else(|| CompileError::UnknownExportTable(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?
    };
    sort_by_full_name(ns, &mut tables);
    tables.dedup();
    for &id in &tables {
        if let Some(TypeDef {
            kind: DefKind::Table(table),
            ..
        }) = defs.get_mut(id)
        {
            table.is_exported = true;
        }
    }
    exports.tables = tables;

    let mut types = collect_export_types(defs, &exports);
    sort_by_full_name(ns, &mut types);
    exports.enums = types
        .iter()
        .copied()
        .filter(|id| ns.tag(*id) == Some(DefTag::Enum))
        .collect();
    exports.beans = order_beans_hierarchy_first(defs, &types);
    exports.types = types;
    Ok(exports)
}

/// Resolve every ref group's table names, full name first, then local name.
pub(crate) fn compile_ref_groups(
    ns: &TypeNamespace,
    groups: &[RawRefGroup],
) -> Result<Vec<RefGroupDef>, CompileError> {
    groups
        .iter()
        .map(|group| {
            let tables = group
                .refs
                .iter()
                .map(|name| {
                    ns.resolve_table(name)
                        .ok_or_else(|| CompileError::UnresolvedRefGroupTable {
                            group: group.name.clone(),
                            table: name.clone(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(RefGroupDef {
                name: group.name.clone(),
                tables,
            })
        })
        .collect()
}

fn assign_children(ns: &TypeNamespace, defs: &mut SecondaryMap<TypeId, TypeDef>) {
    let mut children: HashMap<TypeId, Vec<TypeId>> = HashMap::new();
    for (id, def) in defs.iter() {
        if let DefKind::Bean(BeanDef {
            parent: Some(parent),
            ..
        }) = def.kind
        {
            children.entry(parent).or_default().push(id);
        }
    }
    for (parent, mut kids) in children {
        sort_by_full_name(ns, &mut kids);
        if let Some(TypeDef {
            kind: DefKind::Bean(bean),
            ..
        }) = defs.get_mut(parent)
        {
            bean.children = kids;
        }
    }
}

fn select_target(targets: &[RawTarget], options: &BuildOptions) -> Result<RawTarget, CompileError> {
    match options.target.as_deref() {
        Some(name) => targets
            .iter()
            .find(|t| t.name == name)
            .cloned()
            .ok_or_else(|| CompileError::UnknownTarget(name.to_string())),
        None => Ok(targets.first().cloned().unwrap_or_else(|| RawTarget {
            name: IMPLICIT_TARGET.to_string(),
            ..RawTarget::default()
        })),
    }
}

/// Seed with grouped beans/enums and the export tables, then follow references.
fn collect_export_types(defs: &SecondaryMap<TypeId, TypeDef>, exports: &ExportSet) -> Vec<TypeId> {
    let mut stack: Vec<TypeId> = defs
        .iter()
        .filter(|(_, d)| {
            matches!(d.kind, DefKind::Enum(_) | DefKind::Bean(_)) && need_export(&d.groups, exports)
        })
        .map(|(id, _)| id)
        .collect();
    stack.extend(exports.tables.iter().copied());

    let mut seen = BTreeSet::new();
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        let Some(def) = defs.get(id) else { continue };
        match &def.kind {
            DefKind::Enum(_) => {}
            DefKind::Table(table) => stack.push(table.value_bean),
            DefKind::Bean(bean) => {
                stack.extend(bean.parent);
                stack.extend(bean.children.iter().copied());
                for field in &bean.fields {
                    push_type_refs(&field.ty, &mut stack);
                }
            }
        }
    }
    seen.into_iter().collect()
}

fn push_type_refs(ty: &TypeRef, out: &mut Vec<TypeId>) {
    match &ty.kind {
        TyKind::Primitive(_) => {}
        TyKind::Enum(id) | TyKind::Bean(id) => out.push(*id),
        TyKind::Array { elem, .. } | TyKind::List { elem, .. } | TyKind::Set { elem, .. } => {
            push_type_refs(elem, out)
        }
        TyKind::Map { key, value, .. } => {
            push_type_refs(key, out);
            push_type_refs(value, out);
        }
    }
}

fn order_beans_hierarchy_first(defs: &SecondaryMap<TypeId, TypeDef>, types: &[TypeId]) -> Vec<TypeId> {
    let exported: HashSet<TypeId> = types.iter().copied().collect();
    let mut out = Vec::new();
    for &id in types {
        if let Some(DefKind::Bean(bean)) = defs.get(id).map(|d| &d.kind) {
            if bean.parent.is_none() {
                push_with_children(defs, id, &exported, &mut out);
            }
        }
    }
    out
}

fn push_with_children(
    defs: &SecondaryMap<TypeId, TypeDef>,
    id: TypeId,
    exported: &HashSet<TypeId>,
    out: &mut Vec<TypeId>,
) {
    if !exported.contains(&id) {
        return;
    }
    out.push(id);
    if let Some(DefKind::Bean(bean)) = defs.get(id).map(|d| &d.kind) {
        for &child in &bean.children {
            push_with_children(defs, child, exported, out);
        }
    }
}

fn sort_by_full_name(ns: &TypeNamespace, ids: &mut [TypeId]) {
    ids.sort_by(|a, b| {
        ns.full_name(*a)
            .unwrap_or_default()
            .cmp(ns.full_name(*b).unwrap_or_default())
    });
}
