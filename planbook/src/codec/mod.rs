// Document codec - wire payload <-> in-memory document, with defaulting
// and schema-version upgrade

pub mod fields;

use crate::document::DocumentFamily;
use crate::migration::{self, Migration};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

pub const UPDATED_AT: &str = "updatedAt";
pub const SCHEMA_VERSION: &str = "schemaVersion";
/// Version field name used by payloads written before `schemaVersion`.
const LEGACY_SCHEMA_VERSION: &str = "dataVersion";

/// A decoded payload along with what the codec had to do to produce it.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<D> {
    pub document: D,
    pub updated_at: Option<DateTime<Utc>>,
    /// True when the stored rows were regenerated for a newer schema. The
    /// caller should write the document back.
    pub migrated: bool,
    pub stored_version: u32,
}

/// Decode a raw payload. Never fails: a payload that is not an object
/// decodes to the family's default document, and missing fields take their
/// defaults.
pub fn decode<F: DocumentFamily>(
    family: &F,
    raw: &Value,
    current_version: u32,
) -> Decoded<F::Document> {
    let Some(fields) = raw.as_object() else {
        log::warn!(
            "Payload for '{}' is not an object; using the default document",
            family.key()
        );
        return Decoded {
            document: family.default_document(),
            updated_at: None,
            migrated: false,
            stored_version: 0,
        };
    };

    let stored_version = stored_version(fields);
    let updated_at = fields::timestamp(fields, UPDATED_AT);
    let document = family.decode_fields(fields);

    let plan = migration::plan(stored_version, current_version);
    match plan {
        Migration::Current => {}
        Migration::Ahead { .. } => log::warn!("'{}': {}", family.key(), plan.describe()),
        Migration::Regenerate { .. } => log::info!("'{}': {}", family.key(), plan.describe()),
    }

    let migrated = plan.is_destructive();
    Decoded {
        document: if migrated {
            family.regenerate(document)
        } else {
            document
        },
        updated_at,
        migrated,
        stored_version,
    }
}

/// Encode a document for a whole-document write, stamping `updatedAt`.
pub fn encode<F: DocumentFamily>(family: &F, document: &F::Document, stamp: DateTime<Utc>) -> Value {
    let mut fields = family.encode_fields(document);
    fields.insert(UPDATED_AT.to_string(), Value::String(stamp.to_rfc3339()));
    Value::Object(fields)
}

/// Schema version recorded in a payload; 0 when absent.
pub fn stored_version(fields: &Map<String, Value>) -> u32 {
    fields
        .get(SCHEMA_VERSION)
        .or_else(|| fields.get(LEGACY_SCHEMA_VERSION))
        .and_then(fields::number)
        .unwrap_or(0)
}
