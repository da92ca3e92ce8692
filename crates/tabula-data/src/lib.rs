//! Data files for the tabula core: schema modules, build options and table
//! records in RON, JSON or TOML.

pub mod loader;
pub mod options;
pub mod records;
pub mod schema;

pub use loader::{DataLoadError, load_export_tables, load_registry, load_table_input};
pub use options::load_build_options;
