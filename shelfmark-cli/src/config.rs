//! CLI configuration file (`config.toml`).
//!
//! ```toml
//! [database]
//! path = "/srv/library/catalog.db"
//!
//! [import]
//! mode = "upsert"
//! create_missing_relations = true
//!
//! [export]
//! delimiter = "tab"
//! include_bom = false
//! ```
//!
//! Unknown keys are rejected. The database path is resolved as: `--db` flag,
//! then `SHELFMARK_DB`, then the config file, then the default location.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use shelfmark_catalog::options::{ExportOptions, ImportOptions};

use crate::CliError;

/// Environment variable naming the catalog database.
pub(crate) const DB_ENV_VAR: &str = "SHELFMARK_DB";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub import: ImportOptions,
    #[serde(default)]
    pub export: ExportOptions,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

/// Default config file: `<config_dir>/shelfmark/config.toml`.
pub(crate) fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("shelfmark").join("config.toml"))
}

/// Default database: `<data_dir>/shelfmark/catalog.db`.
pub(crate) fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("shelfmark")
        .join("catalog.db")
}

impl Config {
    /// Load the config file. An explicit path must exist; the default one
    /// is optional.
    pub(crate) fn load(explicit: Option<&Path>) -> Result<Self, CliError> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => match config_path() {
                Some(p) if p.exists() => p,
                _ => return Ok(Self::default()),
            },
        };
        let contents = std::fs::read_to_string(&path).map_err(|e| {
            CliError::config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::parse(&contents)
            .map_err(|e| CliError::config(format!("{}: {}", path.display(), e)))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub(crate) fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Resolve the database path from flag, environment, file and default.
    pub(crate) fn db_path(&self, flag: Option<PathBuf>) -> PathBuf {
        self.db_path_with_env(flag, std::env::var_os(DB_ENV_VAR).map(PathBuf::from))
    }

    fn db_path_with_env(&self, flag: Option<PathBuf>, env: Option<PathBuf>) -> PathBuf {
        flag.or(env)
            .or_else(|| self.database.path.clone())
            .unwrap_or_else(default_db_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelfmark_catalog::options::Delimiter;
    use shelfmark_catalog::types::ImportMode;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert!(config.database.path.is_none());
        assert_eq!(config.import, ImportOptions::default());
        assert_eq!(config.export, ExportOptions::default());
    }

    #[test]
    fn sections_are_parsed() {
        let config = Config::parse(
            r#"
            [database]
            path = "/tmp/catalog.db"

            [import]
            mode = "update_only"
            create_missing_relations = true
            chunk_size = 25

            [export]
            delimiter = "tab"
            include_bom = false
            "#,
        )
        .unwrap();
        assert_eq!(config.database.path, Some(PathBuf::from("/tmp/catalog.db")));
        assert_eq!(config.import.mode, ImportMode::UpdateOnly);
        assert!(config.import.create_missing_relations);
        assert!(config.import.skip_invalid_rows);
        assert_eq!(config.import.chunk_size, 25);
        assert_eq!(config.export.delimiter, Delimiter::Tab);
        assert!(!config.export.include_bom);
        assert!(config.export.include_mapping_row);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::parse("[import]\nmodee = \"upsert\"\n").is_err());
        assert!(Config::parse("[importer]\n").is_err());
    }

    #[test]
    fn db_path_precedence() {
        let config = Config {
            database: DatabaseConfig {
                path: Some(PathBuf::from("file.db")),
            },
            ..Default::default()
        };
        let flag = Some(PathBuf::from("flag.db"));
        let env = Some(PathBuf::from("env.db"));

        assert_eq!(config.db_path_with_env(flag.clone(), env.clone()), PathBuf::from("flag.db"));
        assert_eq!(config.db_path_with_env(None, env), PathBuf::from("env.db"));
        assert_eq!(config.db_path_with_env(None, None), PathBuf::from("file.db"));
        assert_eq!(
            Config::default().db_path_with_env(None, None),
            default_db_path()
        );
    }
}
