// Document families - the three independently synchronized aggregates

pub mod checklist;
pub mod guest_list;
pub mod venue_tour;

use crate::error::{PlanbookError, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

pub use checklist::{Checklist, ChecklistDocument, ChecklistEdit};
pub use guest_list::{GuestList, GuestListDocument, GuestListEdit};
pub use venue_tour::{VenueTour, VenueTourDocument, VenueTourEdit};

/// Schema version used by families that never migrate.
pub const UNVERSIONED: u32 = 0;

/// Address of one shared document on the remote channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DocumentKey {
    Checklist,
    GuestList,
    VenueTour(String),
}

impl DocumentKey {
    pub fn venue(id: &str) -> Self {
        DocumentKey::VenueTour(id.to_string())
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKey::Checklist => f.write_str("checklist"),
            DocumentKey::GuestList => f.write_str("guest-list"),
            DocumentKey::VenueTour(id) => write!(f, "venue-tour/{id}"),
        }
    }
}

impl FromStr for DocumentKey {
    type Err = PlanbookError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "checklist" => Ok(DocumentKey::Checklist),
            "guest-list" => Ok(DocumentKey::GuestList),
            _ => match s.strip_prefix("venue-tour/") {
                Some(id) if !id.is_empty() && !id.contains('/') => Ok(DocumentKey::venue(id)),
                _ => Err(PlanbookError::Other(format!(
                    "Unknown document key '{s}' (expected checklist, guest-list or venue-tour/<id>)"
                ))),
            },
        }
    }
}

/// Descriptor for one document family: where it lives, how it is
/// decoded/encoded, what a fresh document looks like and how it is
/// summarized for display.
///
/// `decode_fields` must not fail; missing or mistyped fields fall back to
/// field-level defaults.
pub trait DocumentFamily: 'static {
    type Document: Clone + fmt::Debug + PartialEq;
    type Summary: Clone + fmt::Debug + PartialEq + Serialize;

    fn key(&self) -> DocumentKey;

    /// Current schema version. Stored payloads older than this are
    /// regenerated from the template on decode.
    fn schema_version(&self) -> u32 {
        UNVERSIONED
    }

    fn default_document(&self) -> Self::Document;

    /// Rebuild a document decoded from an outdated schema. Stored rows are
    /// not carried forward.
    fn regenerate(&self, stale: Self::Document) -> Self::Document {
        let _ = stale;
        self.default_document()
    }

    fn decode_fields(&self, fields: &Map<String, Value>) -> Self::Document;

    fn encode_fields(&self, document: &Self::Document) -> Map<String, Value>;

    fn summarize(document: &Self::Document) -> Self::Summary;
}

/// A user edit that can be applied to a document in place.
pub trait Edit<D> {
    fn apply(self, document: &mut D) -> Result<()>;
}

pub(crate) fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(PlanbookError::Validation(format!("'{field}' must not be blank")));
    }
    Ok(())
}

/// Generate an id for a user-added row or item.
pub(crate) fn new_row_id(prefix: &str) -> String {
    format!("{prefix}-{}", ulid::Ulid::new().to_string().to_lowercase())
}
