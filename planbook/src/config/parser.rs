use super::types::{PlanbookConfig, StoreKind};
use crate::error::{PlanbookError, Result};
use std::collections::HashSet;
use std::path::Path;

/// Parse a planbook.yaml file. Relative paths in it resolve against the
/// file's directory.
pub fn load_config(path: &Path) -> Result<PlanbookConfig> {
    let content = std::fs::read_to_string(path)?;
    let mut config = parse_config_str(&content)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            config.base_dir = parent.to_path_buf();
        }
    }
    Ok(config)
}

/// Parse and validate a config YAML string
pub fn parse_config_str(content: &str) -> Result<PlanbookConfig> {
    let config: PlanbookConfig = if content.trim().is_empty() {
        PlanbookConfig::default()
    } else {
        serde_yaml::from_str(content)?
    };
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &PlanbookConfig) -> Result<()> {
    let mut seen = HashSet::new();
    for venue in &config.venues {
        if venue.id.trim().is_empty() {
            return Err(PlanbookError::Config("Venue id must not be blank".into()));
        }
        if venue.id.contains('/') {
            return Err(PlanbookError::Config(format!(
                "Venue id '{}' must not contain '/'",
                venue.id
            )));
        }
        if !seen.insert(venue.id.as_str()) {
            return Err(PlanbookError::Config(format!("Duplicate venue id '{}'", venue.id)));
        }
    }

    for (name, store) in [("remote", &config.remote), ("fallback", &config.fallback)] {
        if store.kind == StoreKind::Sqlite && store.path.is_none() {
            return Err(PlanbookError::Config(format!(
                "'{name}' uses sqlite but has no path"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
client: alex
remote:
  kind: sqlite
  path: data/shared.db
fallback:
  kind: memory
venues:
  - id: riverside
    name: Riverside Hall
  - id: garden
"#;
        let config = parse_config_str(yaml).unwrap();
        assert_eq!(config.client, "alex");
        assert_eq!(config.remote.path, Some(PathBuf::from("data/shared.db")));
        assert_eq!(config.fallback.kind, StoreKind::Memory);
        assert_eq!(config.venues.len(), 2);
        assert_eq!(config.venues[0].name.as_deref(), Some("Riverside Hall"));
        assert_eq!(config.venues[1].name, None);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config_str("").unwrap();
        assert_eq!(config, PlanbookConfig::default());
        assert_eq!(config.remote.kind, StoreKind::Sqlite);
    }

    #[test]
    fn test_rejects_duplicate_venues() {
        let yaml = "venues:\n  - id: a\n  - id: a\n";
        assert!(matches!(parse_config_str(yaml), Err(PlanbookError::Config(_))));
    }

    #[test]
    fn test_rejects_slash_in_venue_id() {
        let yaml = "venues:\n  - id: a/b\n";
        assert!(parse_config_str(yaml).is_err());
    }

    #[test]
    fn test_sqlite_requires_path() {
        let yaml = "remote:\n  kind: sqlite\n";
        assert!(parse_config_str(yaml).is_err());
    }

    #[test]
    fn test_load_sets_base_dir() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("planbook.yaml");
        std::fs::write(&path, "client: sam\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.base_dir, tmp.path());
        assert_eq!(config.client, "sam");
    }
}
