use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use super::Registry;
use crate::error::{LoaderErr, Result};

/// Where the published artifacts live.
pub const DEFAULT_BASE_URL: &str = "https://dataverse.harvard.edu/api/access/datafile/";

/// The configuration of a `ModelLoader`: the artifact store and what it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Prefix every artifact id is appended to.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub registry: Registry,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            registry: Registry::default(),
        }
    }
}

impl LoaderConfig {
    /// Reads and validates a JSON configuration file. Missing fields take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| LoaderErr::InvalidConfig(format!("malformed json: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the base url and every artifact id are non-empty.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(LoaderErr::InvalidConfig("base_url must not be empty".into()));
        }

        for (kind, dataset, id) in self.registry.entries() {
            if id.trim().is_empty() {
                return Err(LoaderErr::InvalidConfig(format!(
                    "{kind} artifact id for `{dataset}` must not be empty"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::ModelKind;

    #[test]
    fn empty_json_is_the_reference_config() {
        let config = LoaderConfig::from_json_str("{}").unwrap();
        assert_eq!(config, LoaderConfig::default());
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn custom_registry_replaces_reference() {
        let config = LoaderConfig::from_json_str(
            r#"{
                "base_url": "http://localhost:8000/",
                "registry": { "linear": { "toy": "toy-lr" } }
            }"#,
        )
        .unwrap();

        assert_eq!(
            config.registry.artifact_id(ModelKind::Linear, "toy"),
            Some("toy-lr")
        );
        assert_eq!(config.registry.datasets(ModelKind::Multilayer).count(), 0);
        assert_eq!(config.base_url, "http://localhost:8000/");
    }

    #[test]
    fn rejects_invalid_configs() {
        assert!(matches!(
            LoaderConfig::from_json_str(r#"{ "base_url": " " }"#),
            Err(LoaderErr::InvalidConfig(_))
        ));
        assert!(matches!(
            LoaderConfig::from_json_str(r#"{ "registry": { "multilayer": { "adult": "" } } }"#),
            Err(LoaderErr::InvalidConfig(_))
        ));
        assert!(matches!(
            LoaderConfig::from_json_str("not json"),
            Err(LoaderErr::InvalidConfig(_))
        ));
    }
}
