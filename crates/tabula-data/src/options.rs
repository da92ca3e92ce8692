//! Build-options files.

use crate::loader::{DataLoadError, deserialize_file};
use std::path::Path;
use tabula_core::context::BuildOptions;
use tracing::debug;

/// Read [`BuildOptions`] from a RON, JSON or TOML file and validate the tag
/// lists. Absent keys take their defaults.
pub fn load_build_options(path: &Path) -> Result<BuildOptions, DataLoadError> {
    let options: BuildOptions = deserialize_file(path)?;
    options
        .validate()
        .map_err(|e| DataLoadError::Core(e.into()))?;
    debug!(
        file = %path.display(),
        build_target = ?options.target,
        "build options loaded"
    );
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tabula_core::context::ConfigError;
    use tabula_core::error::Error as CoreError;

    fn make_test_dir(suffix: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "tabula_options_test_{suffix}_{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn toml_options() {
        let dir = make_test_dir("toml");
        let path = dir.join("build.toml");
        fs::write(
            &path,
            r#"
target = "client"
include_tags = ["event"]
export_tables = ["item.TbItem"]

[variants]
"item.Item.name" = "en"
default = "zh"
"#,
        )
        .unwrap();

        let options = load_build_options(&path).unwrap();
        assert_eq!(options.target.as_deref(), Some("client"));
        assert_eq!(options.include_tags, vec!["event".to_string()]);
        assert!(options.exclude_tags.is_empty());
        assert_eq!(options.export_tables, vec!["item.TbItem".to_string()]);
        assert_eq!(options.variants.get("item.Item.name").map(String::as_str), Some("en"));
        assert_eq!(options.variants.get("default").map(String::as_str), Some("zh"));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn ron_options_with_defaults() {
        let dir = make_test_dir("ron");
        let path = dir.join("build.ron");
        fs::write(&path, r#"(exclude_tags: ["dev"])"#).unwrap();

        let options = load_build_options(&path).unwrap();
        assert_eq!(options.target, None);
        assert_eq!(options.exclude_tags, vec!["dev".to_string()]);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn conflicting_tag_lists_rejected() {
        let dir = make_test_dir("conflict");
        let path = dir.join("build.json");
        fs::write(&path, r#"{"include_tags": ["a"], "exclude_tags": ["b"]}"#).unwrap();

        let result = load_build_options(&path);
        assert!(matches!(
            result,
            Err(DataLoadError::Core(CoreError::Config(ConfigError::InvalidConfiguration { .. })))
        ));

        let _ = fs::remove_dir_all(&dir);
    }
}
