//! YAML loading for human-curated reference data.
//!
//! Loads language definitions and classification types from the `catalog/`
//! directory so a fresh database starts with known lookup entities.

use crate::types::{ClassificationTypeSeed, LanguageSeed};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum YamlError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("YAML parse error in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yml::Error,
    },
    #[error("Directory not found: {0}")]
    DirNotFound(String),
}

/// All reference data found in a catalog directory.
#[derive(Debug, Default)]
pub struct CatalogSeed {
    pub languages: Vec<LanguageSeed>,
    pub classification_types: Vec<ClassificationTypeSeed>,
}

/// Load language definitions from YAML files in a directory.
///
/// Each `.yaml` file should contain a YAML sequence of `LanguageSeed` entries.
pub fn load_languages(dir: &Path) -> Result<Vec<LanguageSeed>, YamlError> {
    let lists: Vec<Vec<LanguageSeed>> = load_yaml_dir(dir)?;
    Ok(lists.into_iter().flatten().collect())
}

/// Load classification types from YAML files in a directory.
///
/// Each `.yaml` file should contain a single `ClassificationTypeSeed`.
pub fn load_classification_types(dir: &Path) -> Result<Vec<ClassificationTypeSeed>, YamlError> {
    load_yaml_dir(dir)
}

/// Load all reference data from the standard directory layout.
///
/// Expected structure:
/// ```text
/// catalog_dir/
///   languages/
///     european.yaml
///     ...
///   classification_types/
///     genre.yaml
///     subject.yaml
///     ...
/// ```
pub fn load_seed(catalog_dir: &Path) -> Result<CatalogSeed, YamlError> {
    if !catalog_dir.is_dir() {
        return Err(YamlError::DirNotFound(catalog_dir.display().to_string()));
    }
    let languages = load_languages(&catalog_dir.join("languages"))?;
    let classification_types =
        load_classification_types(&catalog_dir.join("classification_types"))?;
    Ok(CatalogSeed {
        languages,
        classification_types,
    })
}

/// Load every YAML file in a directory, each deserialized as one `T`.
///
/// A missing directory yields an empty list.
fn load_yaml_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>, YamlError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    if !dir.is_dir() {
        return Err(YamlError::DirNotFound(dir.display().to_string()));
    }

    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .map_err(|e| YamlError::Io {
            path: dir.display().to_string(),
            source: e,
        })?
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .is_some_and(|ext| ext == "yaml" || ext == "yml")
        })
        .collect();
    entries.sort_by_key(|e| e.file_name());

    let mut items = Vec::with_capacity(entries.len());
    for entry in entries {
        let path = entry.path();
        let contents = std::fs::read_to_string(&path).map_err(|e| YamlError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let item: T = serde_yml::from_str(&contents).map_err(|e| YamlError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;
        items.push(item);
    }

    Ok(items)
}
