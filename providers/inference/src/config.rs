use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Prefix of the environment variables picked up by [`ProviderConfig::from_env`].
pub const ENV_PREFIX: &str = "LEAFSCAN_";

/// Model artifact used when nothing else is configured
pub const DEFAULT_MODEL_PATH: &str = "trained_model.onnx";

/// Configuration key of the model artifact (file or bundle)
pub const MODEL_PATH_KEY: &str = "MODEL_PATH";

/// Configuration key of an alternative disease catalog
pub const CATALOG_PATH_KEY: &str = "CATALOG_PATH";

/// Configuration of the inference provider.
///
/// Values are kept as plain strings, typed accessors interpret them.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    pub values: HashMap<String, String>,
}

impl From<&HashMap<String, String>> for ProviderConfig {
    fn from(values: &HashMap<String, String>) -> ProviderConfig {
        ProviderConfig {
            values: values.clone(),
        }
    }
}

impl ProviderConfig {
    /// Collects every `LEAFSCAN_*` environment variable, prefix stripped.
    pub fn from_env() -> ProviderConfig {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> ProviderConfig {
        let values = vars
            .into_iter()
            .filter_map(|(k, v)| k.strip_prefix(ENV_PREFIX).map(|key| (key.to_string(), v)))
            .collect();

        ProviderConfig { values }
    }

    /// Overrides `key`, used for command line flags.
    pub fn set(mut self, key: &str, value: impl Into<String>) -> ProviderConfig {
        self.values.insert(key.to_string(), value.into());
        self
    }

    pub fn model_path(&self) -> PathBuf {
        match self.values.get(MODEL_PATH_KEY) {
            Some(path) if !path.trim().is_empty() => PathBuf::from(path),
            _ => PathBuf::from(DEFAULT_MODEL_PATH),
        }
    }

    pub fn catalog_path(&self) -> Option<PathBuf> {
        self.values
            .get(CATALOG_PATH_KEY)
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
    }
}
