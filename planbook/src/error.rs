use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlanbookError {
    #[error("Remote channel error: {0}")]
    Remote(String),

    #[error("Subscription error: {0}")]
    Subscription(String),

    #[error("Fallback store error: {0}")]
    Fallback(String),

    #[error("Not found: {kind} '{id}'")]
    NotFound { kind: &'static str, id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Document '{key}' already has an active subscription")]
    AlreadySubscribed { key: String },

    #[error("Document '{key}' has not loaded yet")]
    NotLoaded { key: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("{0}")]
    Other(String),
}

impl PlanbookError {
    pub(crate) fn not_found(kind: &'static str, id: &str) -> Self {
        PlanbookError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PlanbookError>;
