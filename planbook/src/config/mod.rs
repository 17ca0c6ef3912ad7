pub mod parser;
pub mod types;

pub use parser::{load_config, parse_config_str, validate};
pub use types::{PlanbookConfig, StoreConfig, StoreKind, VenueConfig};

use crate::document::VenueTour;
use crate::error::{PlanbookError, Result};
use crate::fallback::{FallbackStore, MemoryFallback, SqliteFallback};
use crate::remote::{MemoryChannel, RemoteChannel, SqliteChannel};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Environment variable naming the config file when `--config` is not given.
pub const CONFIG_ENV: &str = "PLANBOOK_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "planbook.yaml";

impl PlanbookConfig {
    /// Load from `explicit`, else `$PLANBOOK_CONFIG`, else `./planbook.yaml`
    /// when it exists, else defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return load_config(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return load_config(Path::new(&path));
        }
        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return load_config(local);
        }
        Ok(PlanbookConfig::default())
    }

    /// Resolve a configured path against `base_dir`.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn venue(&self, id: &str) -> Option<&VenueConfig> {
        self.venues.iter().find(|v| v.id == id)
    }

    /// The tour family for a configured venue, named as configured.
    pub fn venue_family(&self, id: &str) -> Result<VenueTour> {
        let venue = self.venue(id).ok_or_else(|| {
            PlanbookError::Config(format!("Venue '{id}' is not listed in the config"))
        })?;
        Ok(match &venue.name {
            Some(name) => VenueTour::with_name(&venue.id, name),
            None => VenueTour::new(&venue.id),
        })
    }

    pub fn open_remote(&self) -> Result<Arc<dyn RemoteChannel>> {
        match self.remote.kind {
            StoreKind::Memory => Ok(Arc::new(MemoryChannel::new())),
            StoreKind::Sqlite => Ok(Arc::new(SqliteChannel::open(&self.store_path(&self.remote)?)?)),
        }
    }

    pub fn open_fallback(&self) -> Result<Arc<dyn FallbackStore>> {
        match self.fallback.kind {
            StoreKind::Memory => Ok(Arc::new(MemoryFallback::new())),
            StoreKind::Sqlite => Ok(Arc::new(SqliteFallback::open(&self.store_path(&self.fallback)?)?)),
        }
    }

    fn store_path(&self, store: &StoreConfig) -> Result<PathBuf> {
        store
            .path
            .as_deref()
            .map(|p| self.resolve(p))
            .ok_or_else(|| PlanbookError::Config("sqlite store needs a path".into()))
    }
}
