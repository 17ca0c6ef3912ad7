use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration parsed from planbook.yaml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanbookConfig {
    /// Name of this device/person, used in log output.
    #[serde(default = "default_client")]
    pub client: String,
    #[serde(default = "StoreConfig::default_remote")]
    pub remote: StoreConfig,
    #[serde(default = "StoreConfig::default_fallback")]
    pub fallback: StoreConfig,
    #[serde(default)]
    pub venues: Vec<VenueConfig>,
    /// Directory relative paths resolve against; the config file's
    /// directory when loaded from disk.
    #[serde(skip, default = "default_base_dir")]
    pub base_dir: PathBuf,
}

impl Default for PlanbookConfig {
    fn default() -> Self {
        PlanbookConfig {
            client: default_client(),
            remote: StoreConfig::default_remote(),
            fallback: StoreConfig::default_fallback(),
            venues: Vec::new(),
            base_dir: default_base_dir(),
        }
    }
}

/// Where a remote channel or fallback store keeps its data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub kind: StoreKind,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    fn default_remote() -> Self {
        StoreConfig {
            kind: StoreKind::Sqlite,
            path: Some(PathBuf::from("shared.db")),
        }
    }

    fn default_fallback() -> Self {
        StoreConfig {
            kind: StoreKind::Sqlite,
            path: Some(PathBuf::from("fallback.db")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Memory,
    #[default]
    Sqlite,
}

/// A venue that gets its own tour document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

fn default_client() -> String {
    "default".to_string()
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}
