//! Data records and tag-based inclusion.

use crate::context::ConfigError;
use crate::value::BeanValue;

/// Implicit tag of records declared without tags.
pub const DEFAULT_TAG: &str = "base";

/// One data row with provenance and tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    data: BeanValue,
    source: String,
    tags: Vec<String>,
    auto_index: Option<usize>,
}

impl Record {
    /// Build a record. An empty tag list becomes the single implicit base tag.
    pub fn new(data: BeanValue, source: impl Into<String>, tags: Vec<String>) -> Self {
        let tags = if tags.is_empty() {
            vec![DEFAULT_TAG.to_string()]
        } else {
            tags
        };
        Self {
            data,
            source: source.into(),
            tags,
            auto_index: None,
        }
    }

    pub fn data(&self) -> &BeanValue {
        &self.data
    }

    /// Where the record came from, e.g. `item.json[3]`.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Position in the consolidated list; set during consolidation.
    pub fn auto_index(&self) -> Option<usize> {
        self.auto_index
    }

    pub(crate) fn set_auto_index(&mut self, index: usize) {
        self.auto_index = Some(index);
    }

    /// True when the record carries no tag other than the base tag.
    pub fn is_base_only(&self) -> bool {
        self.tags.iter().all(|t| t.eq_ignore_ascii_case(DEFAULT_TAG))
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    pub fn shares_tag(&self, other: &Record) -> bool {
        self.tags.iter().any(|t| other.has_tag(t))
    }

    /// Inclusion rule for one record. A base-only record is kept unless the
    /// base tag is excluded; a tagged record is kept when it overlaps a
    /// non-empty include list, dropped when it overlaps a non-empty exclude
    /// list, kept otherwise.
    ///
    /// Tags compare ASCII case-insensitively everywhere: `Event`, `EVENT` and
    /// `event` on a record all match an `event` entry in either list.
    pub fn is_included(&self, include: &[String], exclude: &[String]) -> bool {
        if self.is_base_only() {
            return !exclude.iter().any(|t| t.eq_ignore_ascii_case(DEFAULT_TAG));
        }
        if !include.is_empty() {
            return include.iter().any(|t| self.has_tag(t));
        }
        if !exclude.is_empty() {
            return !exclude.iter().any(|t| self.has_tag(t));
        }
        true
    }
}

/// Validated include/exclude tag lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl TagFilter {
    /// Fails when both lists are non-empty.
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Result<Self, ConfigError> {
        if !include.is_empty() && !exclude.is_empty() {
            return Err(ConfigError::InvalidConfiguration { include, exclude });
        }
        Ok(Self { include, exclude })
    }

    pub fn include(&self) -> &[String] {
        &self.include
    }

    pub fn exclude(&self) -> &[String] {
        &self.exclude
    }

    pub fn includes(&self, record: &Record) -> bool {
        record.is_included(&self.include, &self.exclude)
    }
}
