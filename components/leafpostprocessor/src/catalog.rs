use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::CLASS_COUNT;

const BUILTIN_CATALOG: &str = include_str!("../data/catalog.json");

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("unable to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid catalog json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid catalog: {0}")]
    Invalid(String),
}

/// Educational text shown for a diseased leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiseaseInfo {
    pub description: String,
    pub symptoms: Vec<String>,
    pub causes: Vec<String>,
    pub solutions: Vec<String>,
    pub prevention: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassLabel {
    pub label: String,
    pub healthy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<DiseaseInfo>,
}

/// Ordered label set of the classifier plus the disease descriptions.
///
/// Entry `i` describes output index `i` of the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    healthy_advice: Vec<String>,
    classes: Vec<ClassLabel>,
}

impl Catalog {
    /// The catalog compiled into the binary.
    pub fn builtin() -> CatalogResult<Self> {
        Self::from_json(BUILTIN_CATALOG)
    }

    pub fn from_path(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = path.as_ref();
        info!("loading disease catalog from '{}'", path.display());

        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> CatalogResult<Self> {
        let catalog: Catalog = serde_json::from_str(json)?;
        catalog.validate()?;

        Ok(catalog)
    }

    fn validate(&self) -> CatalogResult<()> {
        if self.classes.len() != CLASS_COUNT {
            return Err(CatalogError::Invalid(format!(
                "expected {} classes, found {}",
                CLASS_COUNT,
                self.classes.len()
            )));
        }

        let mut seen = HashSet::new();
        for class in &self.classes {
            if class.label.trim().is_empty() {
                return Err(CatalogError::Invalid("empty class label".to_string()));
            }
            if !seen.insert(class.label.as_str()) {
                return Err(CatalogError::Invalid(format!(
                    "duplicate class label '{}'",
                    class.label
                )));
            }
            match (class.healthy, &class.info) {
                (false, None) => {
                    return Err(CatalogError::Invalid(format!(
                        "disease '{}' has no description",
                        class.label
                    )))
                }
                (true, Some(_)) => {
                    return Err(CatalogError::Invalid(format!(
                        "healthy class '{}' must not carry disease information",
                        class.label
                    )))
                }
                _ => {}
            }
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn by_index(&self, index: usize) -> Option<&ClassLabel> {
        self.classes.get(index)
    }

    pub fn by_label(&self, label: &str) -> Option<&ClassLabel> {
        self.classes.iter().find(|c| c.label == label)
    }

    pub fn labels(&self) -> Vec<&str> {
        self.classes.iter().map(|c| c.label.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassLabel> {
        self.classes.iter()
    }

    /// General care tips shown when the leaf is healthy.
    pub fn healthy_advice(&self) -> &[String] {
        &self.healthy_advice
    }
}
