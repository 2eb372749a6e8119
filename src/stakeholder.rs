//! Static stakeholder profile catalog

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// A persona the simulated interviews are held with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stakeholder {
    pub id: String,
    pub title: String,
    pub profile: String,
    #[serde(default)]
    pub age_demography: String,
    #[serde(default)]
    pub tech_savviness: String,
    #[serde(default)]
    pub product_context: String,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read stakeholder file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("stakeholder file {path} is not a JSON array of stakeholders: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Lookup of stakeholders by id, preserving file order for listing
#[derive(Debug, Clone, Default)]
pub struct StakeholderCatalog {
    stakeholders: Vec<Stakeholder>,
    by_id: HashMap<String, usize>,
}

impl StakeholderCatalog {
    /// Build a catalog in memory. Later duplicates of an id win.
    pub fn from_stakeholders(stakeholders: Vec<Stakeholder>) -> Self {
        let by_id = stakeholders
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();
        Self { stakeholders, by_id }
    }

    /// Load a JSON array of stakeholders from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path_str.clone(),
            source,
        })?;
        let stakeholders: Vec<Stakeholder> =
            serde_json::from_str(&raw).map_err(|source| CatalogError::Parse {
                path: path_str.clone(),
                source,
            })?;

        info!(path = %path_str, count = stakeholders.len(), "Loaded stakeholder catalog");
        Ok(Self::from_stakeholders(stakeholders))
    }

    pub fn get(&self, id: &str) -> Option<&Stakeholder> {
        self.by_id.get(id).map(|&i| &self.stakeholders[i])
    }

    pub fn list(&self) -> &[Stakeholder] {
        &self.stakeholders
    }

    pub fn len(&self) -> usize {
        self.stakeholders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stakeholders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"[
        {"id": "ops", "title": "Ops lead", "profile": "Runs logistics", "tech_savviness": "high"},
        {"id": "cfo", "title": "CFO", "profile": "Owns the budget"}
    ]"#;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let catalog = StakeholderCatalog::load(file.path()).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("ops").unwrap().tech_savviness, "high");
        assert_eq!(catalog.get("cfo").unwrap().age_demography, "");
        assert!(catalog.get("nobody").is_none());
        assert_eq!(catalog.list()[1].id, "cfo");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = StakeholderCatalog::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, CatalogError::Io { .. }));
    }

    #[test]
    fn test_non_array_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"id": "ops"}"#).unwrap();
        let err = StakeholderCatalog::load(file.path()).unwrap_err();
        assert!(matches!(err, CatalogError::Parse { .. }));
    }
}
