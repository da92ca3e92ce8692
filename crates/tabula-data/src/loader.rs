//! Schema and record loading.
//!
//! A schema directory holds one module file per module; a data directory
//! holds the record files of each table, optionally shadowed by same-named
//! files in a patch directory. Any of them may be RON, JSON or TOML, chosen
//! by extension. [`load_registry`] compiles the schema and
//! [`load_export_tables`] feeds the exported tables' records to the core.

use crate::records::RecordConverter;
use crate::schema::ModuleData;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tabula_core::context::{BuildContext, BuildOptions, TableInput};
use tabula_core::error::Error as CoreError;
use tabula_core::id::TypeId;
use tabula_core::record::Record;
use tabula_core::registry::{Registry, RegistryBuilder};
use tracing::{debug, info};

/// Top-level key holding the row array in TOML record files.
pub const TOML_ROWS_KEY: &str = "rows";

/// Record file extensions, in lookup order.
const EXTENSIONS: [&str; 3] = ["ron", "toml", "json"];

// ===========================================================================
// Errors
// ===========================================================================

#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// A table's record file is absent from the data directory.
    #[error("no record file '{file}' (.ron/.toml/.json) in {dir}")]
    MissingRequired { file: String, dir: PathBuf },

    #[error("{file}: not a .ron, .toml or .json file")]
    UnsupportedFormat { file: PathBuf },

    /// One table stem resolves to files of two formats.
    #[error("ambiguous record source: both {a} and {b} exist")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    #[error("cannot read {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A row value does not fit the declared field type.
    #[error("table '{table}' field '{field}' in {source_ref}: {detail}")]
    Convert {
        table: String,
        field: String,
        source_ref: String,
        detail: String,
    },

    /// The schema or the records were rejected by the core.
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Formats and file lookup
// ===========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    let format = match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Format::Ron,
        Some("toml") => Format::Toml,
        Some("json") => Format::Json,
        _ => {
            return Err(DataLoadError::UnsupportedFormat {
                file: path.to_path_buf(),
            });
        }
    };
    Ok(format)
}

/// The record file for `stem` in `dir`, whatever its format. Two formats of
/// the same stem are ambiguous.
pub fn find_data_file(dir: &Path, stem: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut present = EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{stem}.{ext}")))
        .filter(|path| path.exists());
    let first = present.next();
    if let (Some(a), Some(b)) = (&first, present.next()) {
        return Err(DataLoadError::ConflictingFormats {
            a: a.clone(),
            b: b.clone(),
        });
    }
    Ok(first)
}

pub fn require_data_file(dir: &Path, stem: &str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, stem)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: stem.to_string(),
        dir: dir.to_path_buf(),
    })
}

/// Schema module files directly inside `dir`, sorted by path.
pub fn list_data_files(dir: &Path) -> Result<Vec<PathBuf>, DataLoadError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && detect_format(&path).is_ok() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

// ===========================================================================
// Deserialization
// ===========================================================================

fn parse_error(path: &Path, detail: impl ToString) -> DataLoadError {
    DataLoadError::Parse {
        file: path.to_path_buf(),
        detail: detail.to_string(),
    }
}

/// Format and contents of `path`.
fn read_source(path: &Path) -> Result<(Format, String), DataLoadError> {
    let format = detect_format(path)?;
    Ok((format, std::fs::read_to_string(path)?))
}

/// Deserialize a schema module or options file.
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let (format, text) = read_source(path)?;
    match format {
        Format::Ron => ron::from_str(&text).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(&text).map_err(|e| parse_error(path, e)),
        Format::Toml => toml::from_str(&text).map_err(|e| parse_error(path, e)),
    }
}

/// Deserialize the rows of a record file. A TOML document cannot be an
/// array, so TOML rows live under `rows_key`.
pub fn deserialize_list<T: DeserializeOwned>(
    path: &Path,
    rows_key: &str,
) -> Result<Vec<T>, DataLoadError> {
    let (format, text) = read_source(path)?;
    match format {
        Format::Ron => ron::from_str(&text).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(&text).map_err(|e| parse_error(path, e)),
        Format::Toml => {
            let mut doc: toml::Table = toml::from_str(&text).map_err(|e| parse_error(path, e))?;
            let rows = doc
                .remove(rows_key)
                .ok_or_else(|| parse_error(path, format!("no '{rows_key}' array")))?;
            rows.try_into()
                .map_err(|e: toml::de::Error| parse_error(path, e))
        }
    }
}

// ===========================================================================
// Pipeline
// ===========================================================================

/// Register every schema module file in `dir` (sorted by file name) and
/// compile the registry for `options`.
pub fn load_registry(dir: &Path, options: &BuildOptions) -> Result<Registry, DataLoadError> {
    let mut builder = RegistryBuilder::new();
    for path in list_data_files(dir)? {
        let module: ModuleData = deserialize_file(&path)?;
        debug!(file = %path.display(), module = %module.module, "schema module read");
        module
            .register(&mut builder)
            .map_err(|e| DataLoadError::Core(e.into()))?;
    }
    builder
        .build(options)
        .map_err(|e| DataLoadError::Core(e.into()))
}

/// Data file locations of one table.
fn table_files(dir: &Path, base_names: &[String]) -> Result<Vec<PathBuf>, DataLoadError> {
    base_names
        .iter()
        .map(|name| {
            if Path::new(name).extension().is_some() {
                let path = dir.join(name);
                if path.is_file() {
                    Ok(path)
                } else {
                    Err(DataLoadError::MissingRequired {
                        file: name.clone(),
                        dir: dir.to_path_buf(),
                    })
                }
            } else {
                require_data_file(dir, name)
            }
        })
        .collect()
}

/// Read and convert the rows of every file, numbering sources per file.
fn read_records(
    converter: &RecordConverter<'_>,
    files: &[PathBuf],
) -> Result<Vec<Record>, DataLoadError> {
    let mut records = Vec::new();
    for path in files {
        let rows: Vec<serde_json::Value> = deserialize_list(path, TOML_ROWS_KEY)?;
        let file = path.display().to_string();
        for (i, row) in rows.iter().enumerate() {
            records.push(converter.convert_row(row, &format!("{file}[{i}]"))?);
        }
    }
    Ok(records)
}

/// Load the main and patch records of one table.
///
/// Main files are the table's declared input files, or its output data file
/// name when none are declared. Patch files use the same base names inside
/// `patch_dir` and may be absent.
pub fn load_table_input(
    registry: &Registry,
    table: TypeId,
    data_dir: &Path,
    patch_dir: Option<&Path>,
) -> Result<TableInput, DataLoadError> {
    let def = registry
        .table_def(table)
        .ok_or_else(|| CoreError::NotATable(format!("{table:?}")))?;
    let base_names = if def.input_files.is_empty() {
        vec![def.output_data_file()]
    } else {
        def.input_files.clone()
    };

    let converter = RecordConverter::new(registry, def);
    let main = read_records(&converter, &table_files(data_dir, &base_names)?)?;

    let mut patch_files = Vec::new();
    if let Some(dir) = patch_dir {
        for name in &base_names {
            let stem = Path::new(name)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(name.as_str());
            patch_files.extend(find_data_file(dir, stem)?);
        }
    }
    let patch = read_records(&converter, &patch_files)?;

    debug!(
        table = %def.full_name,
        main = main.len(),
        patch = patch.len(),
        "table records loaded"
    );
    Ok(TableInput { table, main, patch })
}

/// Load and consolidate every export table of `ctx`.
pub fn load_export_tables(
    ctx: &BuildContext,
    data_dir: &Path,
    patch_dir: Option<&Path>,
) -> Result<(), DataLoadError> {
    let registry = ctx.registry();
    let inputs = registry
        .export_tables()
        .iter()
        .map(|&id| load_table_input(registry, id, data_dir, patch_dir))
        .collect::<Result<Vec<_>, _>>()?;

    info!(tables = inputs.len(), data_dir = %data_dir.display(), "export tables loaded");
    ctx.consolidate_all(inputs)?;
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================
