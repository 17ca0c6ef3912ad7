pub mod config;
pub mod codec;
pub mod document;
pub mod migration;
pub mod fallback;
pub mod remote;
pub mod watcher;
pub mod sync;
pub mod view;
pub mod error;

pub use config::PlanbookConfig;
pub use document::{DocumentFamily, DocumentKey};
pub use error::{PlanbookError, Result};
pub use sync::{SyncController, SyncState};
pub use view::ViewState;
