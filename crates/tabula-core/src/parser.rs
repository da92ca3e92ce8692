//! Type expression parser.
//!
//! Turns declared type text into a [`TypeExpr`] syntax tree. Parsing is pure:
//! named references are kept as text and resolved later by the registry.
//!
//! Accepted forms, tried in this order:
//!
//! - bracket syntax: `int[,]`, `int[;][,]`, `list<Item>[|]`, `map<int,string>[,]`
//! - legacy comma syntax: `list,int`, `array#sep=|,string`, `map,int,string`
//! - scalars and named references: `int`, `string?`, `long!`, `Item#ref=item.TbItem`
//!
//! The pre-bracket parenthesised container forms (`(list#sep=,),int`) are
//! rejected with a hint naming the bracket equivalent.

use crate::types::{Attrs, NOT_DEFAULT_ATTR, PrimitiveKind, SEP_ATTR};

const LEGACY_FORMS: [(&str, &str); 4] = [
    ("(array#sep=", "int[,]"),
    ("(list#sep=", "list<int>[,]"),
    ("(set#sep=", "set<int>[,]"),
    ("(map#sep=", "map<int,string>[,]"),
];

const CONTAINER_KEYWORDS: [&str; 4] = ["array", "list", "set", "map"];

const FULLWIDTH_COMMA: char = '\u{FF0C}';

// ===========================================================================
// Errors
// ===========================================================================

/// A malformed type expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyntaxError {
    #[error("empty type expression")]
    Empty,

    #[error("legacy container syntax '{text}' is no longer supported, use e.g. {hint}")]
    LegacyContainer { text: String, hint: &'static str },

    #[error("unbalanced brackets in type '{0}'")]
    UnbalancedBrackets(String),

    #[error("unexpected text after type in '{0}'")]
    UnexpectedText(String),

    #[error("separator cannot be empty in '{text}', declare one explicitly, e.g. {example}")]
    EmptySeparator { text: String, example: String },

    #[error(
        "separator '{sep}' must be a single character, use one bracket per dimension, e.g. {example}"
    )]
    MultiCharSeparator { sep: String, example: String },

    #[error("full-width comma cannot be a separator, use an ASCII comma: {base}[,]")]
    FullWidthComma { base: String },

    #[error("whitespace cannot be a separator in '{0}'")]
    WhitespaceSeparator(String),

    #[error("{container} type must declare a separator: {container}<{content}>[sep]")]
    MissingSeparator { container: String, content: String },

    #[error("{0} type must declare its element type: {0}<T>[sep]")]
    MissingElementType(String),

    #[error("{0} element type cannot be empty: {0}<T>[sep]")]
    EmptyElementType(String),

    #[error("map key and value types must be separated by ',' not ':' in '{0}': map<K,V>[sep]")]
    MapColonSeparator(String),

    #[error("map type must declare key and value types separated by ',' in '{0}': map<K,V>[sep]")]
    MapMissingValue(String),

    #[error("unsupported container '{0}'")]
    UnknownContainer(String),

    #[error("set element type cannot be a container: '{0}'")]
    SetOfContainer(String),

    #[error("set type supports exactly one separator: set<{elem}>[{sep}]")]
    MultiDimensionalSet { elem: String, sep: char },

    #[error("container element type cannot be nullable: '{0}'")]
    NullableElement(String),

    #[error("invalid type name '{0}'")]
    InvalidName(String),

    #[error("'group' is reserved for tables and fields and cannot tag a type: '{0}'")]
    ReservedGroupAttr(String),

    #[error("unknown attribute 'seq' in '{0}', field splitting uses 'sep'")]
    MisspelledSepAttr(String),

    #[error("duplicate attribute '{key}' in '{text}'")]
    DuplicateAttr { key: String, text: String },

    #[error("unbalanced braces in attributes '{0}'")]
    UnbalancedAttrs(String),
}

// ===========================================================================
// Syntax tree
// ===========================================================================

/// A parsed, unresolved type expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    Primitive {
        kind: PrimitiveKind,
        nullable: bool,
        attrs: Attrs,
    },
    /// A user-defined enum or bean, resolved later by name.
    Named {
        name: String,
        nullable: bool,
        attrs: Attrs,
    },
    Array {
        elem: Box<TypeExpr>,
        sep: Option<char>,
        attrs: Attrs,
    },
    List {
        elem: Box<TypeExpr>,
        sep: Option<char>,
        attrs: Attrs,
    },
    Set {
        elem: Box<TypeExpr>,
        sep: Option<char>,
        attrs: Attrs,
    },
    Map {
        key: Box<TypeExpr>,
        value: Box<TypeExpr>,
        sep: Option<char>,
        attrs: Attrs,
    },
}

impl TypeExpr {
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            TypeExpr::Array { .. } | TypeExpr::List { .. } | TypeExpr::Set { .. } | TypeExpr::Map { .. }
        )
    }

    pub fn separator(&self) -> Option<char> {
        match self {
            TypeExpr::Array { sep, .. }
            | TypeExpr::List { sep, .. }
            | TypeExpr::Set { sep, .. }
            | TypeExpr::Map { sep, .. } => *sep,
            _ => None,
        }
    }

    pub fn attrs(&self) -> &Attrs {
        match self {
            TypeExpr::Primitive { attrs, .. }
            | TypeExpr::Named { attrs, .. }
            | TypeExpr::Array { attrs, .. }
            | TypeExpr::List { attrs, .. }
            | TypeExpr::Set { attrs, .. }
            | TypeExpr::Map { attrs, .. } => attrs,
        }
    }

    /// Separators from the outermost container inwards, following element
    /// (or map value) descriptors.
    pub fn nesting_separators(&self) -> Vec<char> {
        let mut seps = Vec::new();
        let mut cur = self;
        loop {
            match cur {
                TypeExpr::Array { elem, sep, .. }
                | TypeExpr::List { elem, sep, .. }
                | TypeExpr::Set { elem, sep, .. } => {
                    seps.extend(*sep);
                    cur = elem;
                }
                TypeExpr::Map { value, sep, .. } => {
                    seps.extend(*sep);
                    cur = value;
                }
                _ => return seps,
            }
        }
    }
}

// ===========================================================================
// Entry points
// ===========================================================================

/// Parse a field or value type in a non-element position.
pub fn parse_type(text: &str) -> Result<TypeExpr, SyntaxError> {
    parse_type_in(text, false)
}

/// Parse a type; `container_element` marks positions inside a container,
/// where nullable types are illegal.
pub fn parse_type_in(text: &str, container_element: bool) -> Result<TypeExpr, SyntaxError> {
    let text = trim_brace_pairs(text.trim());
    if text.is_empty() {
        return Err(SyntaxError::Empty);
    }

    for (prefix, hint) in LEGACY_FORMS {
        if text.starts_with(prefix) {
            return Err(SyntaxError::LegacyContainer {
                text: text.to_string(),
                hint,
            });
        }
    }

    if let Some(first) = find_suffix_bracket(text) {
        return parse_bracket_type(text, first);
    }

    if text.contains('<') {
        let (container, content, _) = extract_angle_content(text)?;
        return Err(SyntaxError::MissingSeparator {
            container: container.to_string(),
            content: content.to_string(),
        });
    }

    if let Some(idx) = index_of_base_type_end(text) {
        return parse_legacy_container(text, idx);
    }

    parse_scalar(text, container_element)
}

// ===========================================================================
// Bracket syntax
// ===========================================================================

fn parse_bracket_type(text: &str, first: usize) -> Result<TypeExpr, SyntaxError> {
    let (base, seps) = split_separators(text, first)?;
    let (pure, mut attrs) = split_type_attrs(base)?;

    if !pure.contains('<') {
        let mut ty = parse_type_in(pure, true)?;
        for (i, sep) in seps.iter().enumerate().rev() {
            let attrs = if i == 0 {
                std::mem::take(&mut attrs)
            } else {
                Attrs::new()
            };
            ty = TypeExpr::Array {
                elem: Box::new(ty),
                sep: Some(*sep),
                attrs,
            };
        }
        return Ok(ty);
    }

    let (container, content, rest) = extract_angle_content(pure)?;
    if !rest.trim().is_empty() {
        return Err(SyntaxError::UnexpectedText(text.to_string()));
    }
    let inner_sep = Some(seps[0]);

    let generic = match container.to_ascii_lowercase().as_str() {
        "list" => TypeExpr::List {
            elem: Box::new(parse_type_in(content, true)?),
            sep: inner_sep,
            attrs,
        },
        "set" => {
            if seps.len() > 1 {
                return Err(SyntaxError::MultiDimensionalSet {
                    elem: content.to_string(),
                    sep: seps[0],
                });
            }
            let elem = parse_type_in(content, true)?;
            if elem.is_container() {
                return Err(SyntaxError::SetOfContainer(content.to_string()));
            }
            TypeExpr::Set {
                elem: Box::new(elem),
                sep: inner_sep,
                attrs,
            }
        }
        "map" => {
            let (key, value) = split_map_key_value(content)?;
            TypeExpr::Map {
                key: Box::new(parse_type_in(key, true)?),
                value: Box::new(parse_type_in(value, true)?),
                sep: inner_sep,
                attrs,
            }
        }
        _ => return Err(SyntaxError::UnknownContainer(container.to_string())),
    };

    // Extra dimensions wrap the generic container outwards, one array per separator.
    Ok(seps[1..].iter().fold(generic, |inner, sep| TypeExpr::Array {
        elem: Box::new(inner),
        sep: Some(*sep),
        attrs: Attrs::new(),
    }))
}

/// Position of the first `[` outside any angle, paren or brace nesting.
fn find_suffix_bracket(text: &str) -> Option<usize> {
    let mut depth = 0i32;
    for (i, c) in text.char_indices() {
        match c {
            '<' | '(' | '{' => depth += 1,
            '>' | ')' | '}' => depth -= 1,
            '[' if depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

/// Split `base[s1][s2]...` into the base text and its single-character separators.
fn split_separators(text: &str, first: usize) -> Result<(&str, Vec<char>), SyntaxError> {
    let base = &text[..first];
    let has_angle = text.contains('<');
    let mut seps = Vec::new();
    let mut pos = first;

    while let Some(rel) = text[pos..].find('[') {
        let open = pos + rel;
        if !text[pos..open].trim().is_empty() {
            return Err(SyntaxError::UnexpectedText(text.to_string()));
        }
        let close = text[open..]
            .find(']')
            .map(|r| open + r)
            .ok_or_else(|| SyntaxError::UnbalancedBrackets(text.to_string()))?;
        let raw = &text[open + 1..close];
        let mut chars = raw.chars();
        let sep = match (chars.next(), chars.next()) {
            (None, _) => {
                let shown = if has_angle { base } else { &text[..open] };
                return Err(SyntaxError::EmptySeparator {
                    text: text.to_string(),
                    example: format!("{shown}[,]"),
                });
            }
            (Some(a), Some(b)) => {
                return Err(SyntaxError::MultiCharSeparator {
                    sep: raw.to_string(),
                    example: format!("{base}[{a}][{b}]"),
                });
            }
            (Some(FULLWIDTH_COMMA), None) => {
                return Err(SyntaxError::FullWidthComma {
                    base: base.to_string(),
                });
            }
            (Some(c), None) if c.is_whitespace() => {
                return Err(SyntaxError::WhitespaceSeparator(text.to_string()));
            }
            (Some(c), None) => c,
        };
        seps.push(sep);
        pos = close + 1;
    }

    if !text[pos..].trim().is_empty() {
        return Err(SyntaxError::UnexpectedText(text.to_string()));
    }
    Ok((base, seps))
}

/// Split `name<content>rest` at its outermost matching angle brackets.
fn extract_angle_content(text: &str) -> Result<(&str, &str, &str), SyntaxError> {
    let open = text
        .find('<')
        .ok_or_else(|| SyntaxError::UnbalancedBrackets(text.to_string()))?;
    let container = text[..open].trim();

    let mut depth = 0i32;
    let mut close = None;
    for (i, c) in text[open..].char_indices() {
        match c {
            '<' => depth += 1,
            '>' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(open + i);
                    break;
                }
            }
            _ => {}
        }
    }
    let close = close.ok_or_else(|| SyntaxError::UnbalancedBrackets(text.to_string()))?;

    let content = text[open + 1..close].trim();
    if content.is_empty() {
        return Err(SyntaxError::EmptyElementType(container.to_string()));
    }
    Ok((container, content, &text[close + 1..]))
}

/// Split `K,V` at the first comma outside nested braces and angle brackets.
fn split_map_key_value(text: &str) -> Result<(&str, &str), SyntaxError> {
    let mut brace_depth = 0i32;
    let mut angle_depth = 0i32;
    let mut saw_colon = false;

    for (i, c) in text.char_indices() {
        match c {
            '(' | '[' | '{' => brace_depth += 1,
            ')' | ']' | '}' => brace_depth -= 1,
            '<' => angle_depth += 1,
            '>' => angle_depth -= 1,
            ':' if brace_depth == 0 && angle_depth == 0 => saw_colon = true,
            ',' if brace_depth == 0 && angle_depth == 0 => {
                let key = text[..i].trim();
                let value = text[i + 1..].trim();
                if key.is_empty() || value.is_empty() {
                    return Err(SyntaxError::MapMissingValue(text.to_string()));
                }
                return Ok((key, value));
            }
            _ => {}
        }
    }

    if saw_colon {
        Err(SyntaxError::MapColonSeparator(text.to_string()))
    } else {
        Err(SyntaxError::MapMissingValue(text.to_string()))
    }
}

// ===========================================================================
// Legacy comma syntax
// ===========================================================================

/// Index of the `,`/`;` ending a leading container keyword, e.g. the comma in
/// `list#sep=|,int`. `None` when the text does not start with a container.
fn index_of_base_type_end(text: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut first_sharp = None;
    for (i, c) in text.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
        if c == '#' && first_sharp.is_none() {
            first_sharp = Some(i);
        }
        if depth == 0 && (c == ',' || c == ';') {
            let head = match first_sharp {
                Some(sharp) if sharp > 0 => &text[..sharp],
                _ => &text[..i],
            };
            let head: String = head
                .chars()
                .filter(|c| !matches!(c, '(' | ')' | '[' | ']'))
                .collect();
            return (i > 0 && CONTAINER_KEYWORDS.contains(&head.trim())).then_some(i);
        }
    }
    None
}

/// First `,`/`;` outside nested braces.
fn index_of_element_type_sep(text: &str) -> Option<usize> {
    let mut depth = 0i32;
    for (i, c) in text.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ',' | ';' if depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

fn parse_legacy_container(text: &str, idx: usize) -> Result<TypeExpr, SyntaxError> {
    let head = trim_brace_pairs(text[..idx].trim());
    let elem_text = text[idx + 1..].trim();
    let (container, mut attrs) = split_type_attrs(head)?;
    let sep = attrs
        .remove(SEP_ATTR)
        .map(|raw| legacy_separator(&raw, container, text))
        .transpose()?;

    let expr = match container {
        "array" => TypeExpr::Array {
            elem: Box::new(parse_type_in(elem_text, true)?),
            sep,
            attrs,
        },
        "list" => TypeExpr::List {
            elem: Box::new(parse_type_in(elem_text, true)?),
            sep,
            attrs,
        },
        "set" => {
            let elem = parse_type_in(elem_text, true)?;
            if elem.is_container() {
                return Err(SyntaxError::SetOfContainer(elem_text.to_string()));
            }
            TypeExpr::Set {
                elem: Box::new(elem),
                sep,
                attrs,
            }
        }
        "map" => {
            let split = index_of_element_type_sep(elem_text)
                .filter(|&j| j > 0 && j + 1 < elem_text.len())
                .ok_or_else(|| SyntaxError::MapMissingValue(elem_text.to_string()))?;
            TypeExpr::Map {
                key: Box::new(parse_scalar(elem_text[..split].trim(), true)?),
                value: Box::new(parse_type_in(elem_text[split + 1..].trim(), true)?),
                sep,
                attrs,
            }
        }
        other => return Err(SyntaxError::UnknownContainer(other.to_string())),
    };
    Ok(expr)
}

fn legacy_separator(raw: &str, container: &str, text: &str) -> Result<char, SyntaxError> {
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c == FULLWIDTH_COMMA => Err(SyntaxError::FullWidthComma {
            base: container.to_string(),
        }),
        (Some(c), None) if c.is_whitespace() => {
            Err(SyntaxError::WhitespaceSeparator(text.to_string()))
        }
        (Some(c), None) => Ok(c),
        (None, _) => Err(SyntaxError::EmptySeparator {
            text: text.to_string(),
            example: format!("{container}#sep=,"),
        }),
        (Some(a), Some(b)) => Err(SyntaxError::MultiCharSeparator {
            sep: raw.to_string(),
            example: format!("{container}<T>[{a}][{b}]"),
        }),
    }
}

// ===========================================================================
// Scalars
// ===========================================================================

fn parse_scalar(text: &str, container_element: bool) -> Result<TypeExpr, SyntaxError> {
    let raw = trim_brace_pairs(text.trim());
    let (ty, mut attrs) = split_type_attrs(raw)?;

    let lower = ty.to_ascii_lowercase();
    if matches!(lower.as_str(), "list" | "set" | "map") {
        return Err(SyntaxError::MissingElementType(lower));
    }

    let mut name = ty;
    let mut nullable = false;
    let mut default_able = true;
    loop {
        if let Some(rest) = name.strip_suffix('?') {
            if container_element {
                return Err(SyntaxError::NullableElement(ty.to_string()));
            }
            nullable = true;
            name = rest;
            continue;
        }
        if let Some(rest) = name.strip_suffix('!') {
            default_able = false;
            name = rest;
            continue;
        }
        break;
    }

    let name = name.trim();
    if name.is_empty() {
        return Err(SyntaxError::Empty);
    }
    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
    {
        return Err(SyntaxError::InvalidName(name.to_string()));
    }
    if !default_able {
        attrs
            .entry(NOT_DEFAULT_ATTR.to_string())
            .or_insert_with(|| "1".to_string());
    }

    Ok(match PrimitiveKind::from_keyword(name) {
        Some(kind) => TypeExpr::Primitive {
            kind,
            nullable,
            attrs,
        },
        None => TypeExpr::Named {
            name: name.to_string(),
            nullable,
            attrs,
        },
    })
}

// ===========================================================================
// Attributes
// ===========================================================================

/// Split `type#attrs` at the first `#` outside nested brackets, rejecting
/// reserved attribute names.
pub fn split_type_attrs(text: &str) -> Result<(&str, Attrs), SyntaxError> {
    let mut depth = 0i32;
    let mut split = None;
    for (i, c) in text.char_indices() {
        match c {
            '(' | '[' | '{' | '<' => depth += 1,
            ')' | ']' | '}' | '>' => depth -= 1,
            '#' if depth == 0 => {
                split = Some(i);
                break;
            }
            _ => {}
        }
    }
    let Some(split) = split else {
        return Ok((text.trim(), Attrs::new()));
    };

    let attrs = parse_attrs(&text[split + 1..])?;
    if attrs.contains_key("group") {
        return Err(SyntaxError::ReservedGroupAttr(text.to_string()));
    }
    if attrs.contains_key("seq") {
        return Err(SyntaxError::MisspelledSepAttr(text.to_string()));
    }
    Ok((text[..split].trim(), attrs))
}

/// Parse `key=value#key2:value2#flag`. Nested braces protect `#`, and a
/// backslash escapes the following character. A bare key maps to itself.
pub fn parse_attrs(text: &str) -> Result<Attrs, SyntaxError> {
    let mut attrs = Attrs::new();
    if text.trim().is_empty() {
        return Ok(attrs);
    }

    let mut depth = 0i32;
    let mut buf = String::new();
    let mut escaped = false;
    for c in text.chars() {
        if escaped {
            escaped = false;
            buf.push(c);
            continue;
        }
        match c {
            '\\' => {
                escaped = true;
                continue;
            }
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
        if depth == 0 && c == '#' {
            add_attr(&mut attrs, &buf, text)?;
            buf.clear();
        } else {
            buf.push(c);
        }
    }
    if depth != 0 {
        return Err(SyntaxError::UnbalancedAttrs(text.to_string()));
    }
    add_attr(&mut attrs, &buf, text)?;
    Ok(attrs)
}

fn add_attr(attrs: &mut Attrs, raw: &str, text: &str) -> Result<(), SyntaxError> {
    let pair = trim_brace_pairs(raw.trim());
    if pair.is_empty() {
        return Ok(());
    }
    let (key, value) = match pair.find(['=', ':']) {
        Some(i) => (pair[..i].trim(), pair[i + 1..].trim()),
        None => (pair, pair),
    };
    if attrs.contains_key(key) {
        return Err(SyntaxError::DuplicateAttr {
            key: key.to_string(),
            text: text.to_string(),
        });
    }
    attrs.insert(key.to_string(), value.to_string());
    Ok(())
}

/// Strip balanced parentheses wrapping the entire text, repeatedly.
pub fn trim_brace_pairs(text: &str) -> &str {
    let mut text = text;
    while text.starts_with('(') {
        let mut depth = 0i32;
        let mut close = None;
        for (i, c) in text.char_indices() {
            match c {
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => {
                    depth -= 1;
                    if depth == 0 && c == ')' {
                        close = Some(i);
                        break;
                    }
                }
                _ => {}
            }
        }
        match close {
            Some(i) if i == text.len() - 1 => text = text[1..i].trim(),
            _ => break,
        }
    }
    text
}
