//! Type-directed conversion of parsed rows into core records.
//!
//! Rows arrive as `serde_json::Value` whatever their file format. Each row is
//! an object keyed by hierarchy field name, plus two reserved keys:
//!
//! - `__tags` (or `tags` when the row bean has no such field): an array of
//!   tag names or a comma-separated string.
//! - `$type`: the concrete bean of a polymorphic (abstract) bean value.
//!
//! Container fields also accept a string split by the declared separator,
//! one separator per nesting level, outermost first.

use crate::loader::DataLoadError;
use serde_json::Value as Json;
use tabula_core::defs::BeanLookup;
use tabula_core::id::TypeId;
use tabula_core::record::Record;
use tabula_core::registry::Registry;
use tabula_core::table::TableDef;
use tabula_core::types::{PrimitiveKind, Ty, TyKind};
use tabula_core::value::{BeanValue, F32, F64, Value};

pub const TAGS_KEY: &str = "__tags";
pub const SHORT_TAGS_KEY: &str = "tags";
pub const TYPE_KEY: &str = "$type";

/// Converts rows of one table.
pub struct RecordConverter<'a> {
    registry: &'a Registry,
    table: &'a TableDef,
}

/// A conversion failure below the row level: the dotted field path and detail.
struct FieldError {
    path: String,
    detail: String,
}

impl FieldError {
    fn new(detail: impl Into<String>) -> Self {
        Self {
            path: String::new(),
            detail: detail.into(),
        }
    }

    fn at(mut self, segment: &str) -> Self {
        self.path = if self.path.is_empty() {
            segment.to_string()
        } else if self.path.starts_with('[') {
            format!("{segment}{}", self.path)
        } else {
            format!("{segment}.{}", self.path)
        };
        self
    }
}

type FieldResult<T> = Result<T, FieldError>;

impl<'a> RecordConverter<'a> {
    pub fn new(registry: &'a Registry, table: &'a TableDef) -> Self {
        Self { registry, table }
    }

    /// Convert one row. `source` is recorded as the record's provenance.
    pub fn convert_row(&self, row: &Json, source: &str) -> Result<Record, DataLoadError> {
        let fail = |e: FieldError| DataLoadError::Convert {
            table: self.table.full_name.clone(),
            field: e.path,
            source_ref: source.to_string(),
            detail: e.detail,
        };

        let obj = row
            .as_object()
            .ok_or_else(|| fail(FieldError::new(format!("row must be an object, got {row}"))))?;

        let bean = self.table.value_bean;
        let tags_key = if obj.contains_key(TAGS_KEY)
            || self.registry.bean_field(bean, SHORT_TAGS_KEY).is_some()
        {
            TAGS_KEY
        } else {
            SHORT_TAGS_KEY
        };
        let tags = match obj.get(tags_key) {
            Some(v) => parse_tags(v).map_err(|e| fail(e.at(tags_key)))?,
            None => Vec::new(),
        };

        let data = self.convert_bean(bean, row).map_err(fail)?;
        Ok(Record::new(data, source, tags))
    }

    // -----------------------------------------------------------------------
    // Beans
    // -----------------------------------------------------------------------

    /// Pick the concrete bean for `declared`, honouring `$type`.
    fn concrete_bean(&self, declared: TypeId, obj: &serde_json::Map<String, Json>) -> FieldResult<TypeId> {
        let declared_name = self.registry.full_name(declared).unwrap_or_default();
        let Some(type_name) = obj.get(TYPE_KEY) else {
            let is_abstract = self
                .registry
                .bean_def(declared)
                .is_some_and(|b| b.is_abstract());
            if is_abstract {
                return Err(FieldError::new(format!(
                    "bean '{declared_name}' is polymorphic; '{TYPE_KEY}' is required"
                )));
            }
            return Ok(declared);
        };
        let type_name = type_name
            .as_str()
            .ok_or_else(|| FieldError::new(format!("'{TYPE_KEY}' must be a string")).at(TYPE_KEY))?;

        std::iter::once(declared)
            .chain(self.registry.descendants(declared))
            .find(|&id| {
                self.registry
                    .get(id)
                    .is_some_and(|def| def.name == type_name || def.full_name == type_name)
            })
            .filter(|&id| self.registry.bean_def(id).is_some_and(|b| !b.is_abstract()))
            .ok_or_else(|| {
                FieldError::new(format!(
                    "'{type_name}' is not a concrete bean derived from '{declared_name}'"
                ))
                .at(TYPE_KEY)
            })
    }

    fn convert_bean(&self, declared: TypeId, json: &Json) -> FieldResult<BeanValue> {
        let obj = json
            .as_object()
            .ok_or_else(|| FieldError::new(format!("expected an object, got {json}")))?;
        let bean = self.concrete_bean(declared, obj)?;

        let fields = self
            .registry
            .hierarchy_fields(bean)
            .into_iter()
            .map(|field| match obj.get(&field.name) {
                Some(v) => self.convert(&field.ty, v).map_err(|e| e.at(&field.name)),
                None => self
                    .default_value(&field.ty, &mut Vec::new())
                    .map_err(|e| e.at(&field.name)),
            })
            .collect::<FieldResult<Vec<_>>>()?;
        Ok(BeanValue::new(bean, fields))
    }

    /// Value of an absent field. `visiting` holds the beans being defaulted
    /// further up, so a bean that contains itself fails instead of recursing.
    fn default_value(&self, ty: &Ty, visiting: &mut Vec<TypeId>) -> FieldResult<Value> {
        if ty.nullable {
            return Ok(Value::Null);
        }
        if !ty.has_default() {
            return Err(FieldError::new("missing value for a field without default"));
        }
        let value = match &ty.kind {
            TyKind::Primitive(kind) => match kind {
                PrimitiveKind::Bool => Value::Bool(false),
                PrimitiveKind::Byte => Value::Byte(0),
                PrimitiveKind::Short => Value::Short(0),
                PrimitiveKind::Int => Value::Int(0),
                PrimitiveKind::Long | PrimitiveKind::BigInt => Value::Long(0),
                PrimitiveKind::Float => Value::Float(F32(0.0)),
                PrimitiveKind::Double => Value::Double(F64(0.0)),
                PrimitiveKind::String => Value::String(String::new()),
                PrimitiveKind::Text => Value::Text {
                    key: String::new(),
                    text: String::new(),
                },
                PrimitiveKind::DateTime => Value::DateTime(0),
            },
            TyKind::Enum(id) => {
                let first = self
                    .registry
                    .enum_def(*id)
                    .and_then(|e| e.items.first())
                    .map(|i| i.value);
                Value::Enum(first.unwrap_or(0))
            }
            TyKind::Bean(id) => Value::Bean(self.default_bean(*id, visiting)?),
            TyKind::Array { .. } => Value::Array(Vec::new()),
            TyKind::List { .. } => Value::List(Vec::new()),
            TyKind::Set { .. } => Value::Set(Vec::new()),
            TyKind::Map { .. } => Value::Map(Vec::new()),
        };
        Ok(value)
    }

    fn default_bean(&self, declared: TypeId, visiting: &mut Vec<TypeId>) -> FieldResult<BeanValue> {
        let bean = self.concrete_bean(declared, &serde_json::Map::new())?;
        if visiting.contains(&bean) {
            let name = self.registry.full_name(bean).unwrap_or_default();
            return Err(FieldError::new(format!("recursive bean '{name}' has no default")));
        }
        visiting.push(bean);
        let fields = self
            .registry
            .hierarchy_fields(bean)
            .into_iter()
            .map(|field| {
                self.default_value(&field.ty, visiting)
                    .map_err(|e| e.at(&field.name))
            })
            .collect::<FieldResult<Vec<_>>>()?;
        visiting.pop();
        Ok(BeanValue::new(bean, fields))
    }

    // -----------------------------------------------------------------------
    // Values
    // -----------------------------------------------------------------------

    fn convert(&self, ty: &Ty, json: &Json) -> FieldResult<Value> {
        if json.is_null() {
            return if ty.nullable {
                Ok(Value::Null)
            } else {
                Err(FieldError::new(format!(
                    "null for non-nullable type '{}'",
                    self.registry.describe(ty)
                )))
            };
        }

        match &ty.kind {
            TyKind::Primitive(kind) => convert_primitive(*kind, json, self.registry),
            TyKind::Enum(id) => self.convert_enum(*id, json),
            TyKind::Bean(id) => self.convert_bean(*id, json).map(Value::Bean),
            TyKind::Array { elem, sep } => self.convert_elements(elem, *sep, json).map(Value::Array),
            TyKind::List { elem, sep } => self.convert_elements(elem, *sep, json).map(Value::List),
            TyKind::Set { elem, sep } => {
                let mut unique: Vec<Value> = Vec::new();
                for v in self.convert_elements(elem, *sep, json)? {
                    if !unique.contains(&v) {
                        unique.push(v);
                    }
                }
                Ok(Value::Set(unique))
            }
            TyKind::Map { key, value, sep } => self.convert_map(key, value, *sep, json),
        }
    }

    fn convert_enum(&self, id: TypeId, json: &Json) -> FieldResult<Value> {
        let def = self
            .registry
            .enum_def(id)
            .ok_or_else(|| FieldError::new("enum definition missing"))?;
        let enum_name = self.registry.full_name(id).unwrap_or_default();

        let by_value = |v: i64| -> FieldResult<Value> {
            i32::try_from(v)
                .ok()
                .and_then(|v| def.item_by_value(v))
                .map(|i| Value::Enum(i.value))
                .ok_or_else(|| FieldError::new(format!("{v} is not a value of enum '{enum_name}'")))
        };

        match json {
            Json::Number(n) => n
                .as_i64()
                .ok_or_else(|| FieldError::new(format!("enum value must be an integer, got {n}")))
                .and_then(by_value),
            Json::String(s) => {
                let s = s.trim();
                if let Some(item) = def.item(s) {
                    return Ok(Value::Enum(item.value));
                }
                match s.parse::<i64>() {
                    Ok(v) => by_value(v),
                    Err(_) => Err(FieldError::new(format!(
                        "unknown item '{s}' of enum '{enum_name}'"
                    ))),
                }
            }
            other => Err(FieldError::new(format!(
                "expected an enum item of '{enum_name}', got {other}"
            ))),
        }
    }

    /// Elements of an array, list or set: a JSON array, or a string split by
    /// the container's separator.
    fn convert_elements(&self, elem: &Ty, sep: Option<char>, json: &Json) -> FieldResult<Vec<Value>> {
        match json {
            Json::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| self.convert(elem, v).map_err(|e| e.at(&format!("[{i}]"))))
                .collect(),
            Json::String(s) => {
                let sep = sep.ok_or_else(|| {
                    FieldError::new("string given for a container without separator")
                })?;
                split_pieces(s, sep)
                    .enumerate()
                    .map(|(i, piece)| {
                        self.convert(elem, &Json::String(piece.to_string()))
                            .map_err(|e| e.at(&format!("[{i}]")))
                    })
                    .collect()
            }
            other => Err(FieldError::new(format!("expected an array, got {other}"))),
        }
    }

    /// Map entries: an object, an array of `[key, value]` pairs, or a string of
    /// alternating keys and values split by the separator.
    fn convert_map(&self, key: &Ty, value: &Ty, sep: Option<char>, json: &Json) -> FieldResult<Value> {
        let entry = |k: &Json, v: &Json, i: usize| -> FieldResult<(Value, Value)> {
            let at = format!("[{i}]");
            Ok((
                self.convert(key, k).map_err(|e| e.at(&at))?,
                self.convert(value, v).map_err(|e| e.at(&at))?,
            ))
        };

        let entries = match json {
            Json::Object(obj) => obj
                .iter()
                .enumerate()
                .map(|(i, (k, v))| entry(&Json::String(k.clone()), v, i))
                .collect::<FieldResult<Vec<_>>>()?,
            Json::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, pair)| match pair.as_array().map(Vec::as_slice) {
                    Some([k, v]) => entry(k, v, i),
                    _ => Err(FieldError::new(format!("expected a [key, value] pair, got {pair}"))
                        .at(&format!("[{i}]"))),
                })
                .collect::<FieldResult<Vec<_>>>()?,
            Json::String(s) => {
                let sep = sep.ok_or_else(|| {
                    FieldError::new("string given for a map without separator")
                })?;
                let pieces: Vec<_> = split_pieces(s, sep).collect();
                if pieces.len() % 2 != 0 {
                    return Err(FieldError::new(format!(
                        "odd number of map pieces in '{s}'"
                    )));
                }
                pieces
                    .chunks(2)
                    .enumerate()
                    .map(|(i, kv)| {
                        entry(
                            &Json::String(kv[0].to_string()),
                            &Json::String(kv[1].to_string()),
                            i,
                        )
                    })
                    .collect::<FieldResult<Vec<_>>>()?
            }
            other => return Err(FieldError::new(format!("expected a map, got {other}"))),
        };

        let mut seen = std::collections::HashSet::new();
        for (k, _) in &entries {
            if !seen.insert(k) {
                return Err(FieldError::new(format!("duplicate map key '{k}'")));
            }
        }
        Ok(Value::Map(entries))
    }
}

/// Non-empty trimmed pieces of `s` split by `sep`.
fn split_pieces(s: &str, sep: char) -> impl Iterator<Item = &str> {
    s.split(sep).map(str::trim).filter(|p| !p.is_empty())
}

fn parse_tags(json: &Json) -> FieldResult<Vec<String>> {
    match json {
        Json::Array(items) => items
            .iter()
            .map(|t| {
                t.as_str()
                    .map(|s| s.trim().to_string())
                    .ok_or_else(|| FieldError::new(format!("tag must be a string, got {t}")))
            })
            .collect(),
        Json::String(s) => Ok(split_pieces(s, ',').map(str::to_string).collect()),
        Json::Null => Ok(Vec::new()),
        other => Err(FieldError::new(format!("expected tags, got {other}"))),
    }
}

/// Numeric kinds accept a const alias name wherever a literal is expected.
fn convert_primitive(kind: PrimitiveKind, json: &Json, registry: &Registry) -> FieldResult<Value> {
    let mismatch = || FieldError::new(format!("expected {}, got {json}", kind.keyword()));
    let literal = |s: &str| -> String {
        let s = s.trim();
        registry.const_alias(s).unwrap_or(s).to_string()
    };

    let integer = || -> FieldResult<i64> {
        match json {
            Json::Number(n) => n.as_i64().ok_or_else(mismatch),
            Json::String(s) => literal(s).parse().map_err(|_| mismatch()),
            _ => Err(mismatch()),
        }
    };
    let float = || -> FieldResult<f64> {
        match json {
            Json::Number(n) => n.as_f64().ok_or_else(mismatch),
            Json::String(s) => literal(s).parse().map_err(|_| mismatch()),
            _ => Err(mismatch()),
        }
    };
    let out_of_range = |v: i64| FieldError::new(format!("{v} is out of range for {}", kind.keyword()));

    let value = match kind {
        PrimitiveKind::Bool => match json {
            Json::Bool(b) => Value::Bool(*b),
            Json::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Value::Bool(true),
                "false" | "0" => Value::Bool(false),
                _ => return Err(mismatch()),
            },
            Json::Number(n) => Value::Bool(n.as_i64().ok_or_else(mismatch)? != 0),
            _ => return Err(mismatch()),
        },
        PrimitiveKind::Byte => {
            let v = integer()?;
            Value::Byte(u8::try_from(v).map_err(|_| out_of_range(v))?)
        }
        PrimitiveKind::Short => {
            let v = integer()?;
            Value::Short(i16::try_from(v).map_err(|_| out_of_range(v))?)
        }
        PrimitiveKind::Int => {
            let v = integer()?;
            Value::Int(i32::try_from(v).map_err(|_| out_of_range(v))?)
        }
        PrimitiveKind::Long | PrimitiveKind::BigInt => Value::Long(integer()?),
        PrimitiveKind::Float => Value::Float(F32(float()? as f32)),
        PrimitiveKind::Double => Value::Double(F64(float()?)),
        PrimitiveKind::String => match json {
            Json::String(s) => Value::String(s.clone()),
            Json::Number(n) => Value::String(n.to_string()),
            Json::Bool(b) => Value::String(b.to_string()),
            _ => return Err(mismatch()),
        },
        PrimitiveKind::Text => match json {
            Json::String(s) => Value::Text {
                key: s.clone(),
                text: s.clone(),
            },
            Json::Object(obj) => {
                let field = |name: &str| {
                    obj.get(name)
                        .and_then(Json::as_str)
                        .map(str::to_string)
                        .unwrap_or_default()
                };
                Value::Text {
                    key: field("key"),
                    text: field("text"),
                }
            }
            _ => return Err(mismatch()),
        },
        PrimitiveKind::DateTime => Value::DateTime(integer()?),
    };
    Ok(value)
}
