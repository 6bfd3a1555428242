//! Core Types and Trait Definitions for the transitions
//!
//! Defines the collaborator seams the facility resolver is built on:
//! - **FacilityIndex:** point queries by phone or external reference
//! - **LineageHydrator:** canonical documents with their parent chain
//! - **Transition:** the filter / match contract the runner drives
//!
//! Index rows come in two useful shapes (id only, or id with an inlined
//! snapshot) plus rows that carry only a key. [`IndexRow`] is the tagged
//! variant the resolver consumes.

use async_trait::async_trait;
use chw_common::documents::{DataRecord, Document, Facility};
use chw_common::StoreError;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;

/// First element of a reference-id index key
pub const EXTERNAL_KEY_MARKER: &str = "external";

// ============================================================================
// Index queries
// ============================================================================

/// Key of a facility index query
///
/// The index stores string keys only, so both variants hold strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexKey {
    /// Sender phone number, queried as a bare string
    Phone(String),
    /// External reference id, queried as `["external", refid]`
    External(String),
}

impl IndexKey {
    /// JSON form of the key as sent to the index
    pub fn to_json(&self) -> Value {
        match self {
            IndexKey::Phone(phone) => Value::String(phone.clone()),
            IndexKey::External(refid) => json!([EXTERNAL_KEY_MARKER, refid]),
        }
    }

    pub fn is_phone(&self) -> bool {
        matches!(self, IndexKey::Phone(_))
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// Facility index query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacilityQuery {
    pub key: IndexKey,
    /// Ask the index to inline the stored document in each row
    pub include_docs: bool,
    /// Place types the query is restricted to (empty = unrestricted)
    pub place_types: Vec<String>,
}

impl FacilityQuery {
    pub fn by_phone(phone: impl Into<String>) -> Self {
        Self {
            key: IndexKey::Phone(phone.into()),
            include_docs: false,
            place_types: Vec::new(),
        }
    }

    pub fn by_reference(refid: impl Into<String>, place_types: Vec<String>) -> Self {
        Self {
            key: IndexKey::External(refid.into()),
            include_docs: true,
            place_types,
        }
    }
}

/// Row returned by the facility index
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawIndexRow")]
pub enum IndexRow {
    /// Row with an inlined (possibly stale) document
    Snapshot(Facility),
    /// Row carrying only the matching document id
    Reference(String),
    /// Row with neither id nor document; resolves to nothing
    KeyOnly(Value),
}

impl IndexRow {
    pub fn id(&self) -> Option<&str> {
        match self {
            IndexRow::Snapshot(facility) => Some(&facility.id),
            IndexRow::Reference(id) => Some(id),
            IndexRow::KeyOnly(_) => None,
        }
    }
}

/// Wire shape of an index row: `{id?, key?, doc?}`
#[derive(Debug, Deserialize)]
struct RawIndexRow {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    key: Value,
    #[serde(default)]
    doc: Option<Facility>,
}

impl From<RawIndexRow> for IndexRow {
    fn from(raw: RawIndexRow) -> Self {
        match (raw.doc, raw.id) {
            (Some(doc), _) => IndexRow::Snapshot(doc),
            (None, Some(id)) if !id.is_empty() => IndexRow::Reference(id),
            _ => IndexRow::KeyOnly(raw.key),
        }
    }
}

// ============================================================================
// Collaborator traits
// ============================================================================

/// Secondary index over contacts keyed by phone or external reference
#[async_trait]
pub trait FacilityIndex: Send + Sync {
    /// Rows matching the query, in index order
    ///
    /// # Errors
    /// Returns `StoreError` when the index cannot be queried
    async fn query(&self, query: &FacilityQuery) -> Result<Vec<IndexRow>, StoreError>;
}

/// Authoritative source of current documents and their lineage
#[async_trait]
pub trait LineageHydrator: Send + Sync {
    /// Fetch the current document for `id` with its full parent chain
    ///
    /// # Errors
    /// Returns the store's failure unmodified
    async fn fetch_hydrated_doc(&self, id: &str) -> Result<Document, StoreError>;
}

/// A stage of the record-change pipeline
///
/// # Example
/// ```rust,ignore
/// let runner = TransitionRunner::new(vec![Arc::new(resolver)]);
/// let outcome = runner.run(&mut record).await;
/// ```
#[async_trait]
pub trait Transition: Send + Sync {
    /// Transition name for logs and outcomes
    fn name(&self) -> &'static str;

    /// Whether the record should be offered to `on_match`
    fn filter(&self, record: &DataRecord) -> bool;

    /// Apply the transition, returning whether the record changed
    ///
    /// # Errors
    /// Collaborator failures are returned unchanged and leave the record untouched
    async fn on_match(&self, record: &mut DataRecord) -> Result<bool, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_json_forms() {
        assert_eq!(IndexKey::Phone("123".into()).to_json(), json!("123"));
        assert_eq!(
            IndexKey::External("123".into()).to_json(),
            json!(["external", "123"])
        );
    }

    #[test]
    fn test_reference_query_requests_docs() {
        let query = FacilityQuery::by_reference("1000", vec!["clinic".into()]);
        assert!(query.include_docs);
        assert_eq!(query.place_types, vec!["clinic"]);

        let query = FacilityQuery::by_phone("+1");
        assert!(!query.include_docs);
        assert!(query.key.is_phone());
    }

    #[test]
    fn test_row_shapes() {
        let row: IndexRow = serde_json::from_value(json!({ "id": "abc", "key": "123" })).unwrap();
        assert_eq!(row, IndexRow::Reference("abc".into()));

        let row: IndexRow =
            serde_json::from_value(json!({ "id": "abc", "doc": { "_id": "abc", "type": "clinic" } }))
                .unwrap();
        assert!(matches!(row, IndexRow::Snapshot(ref f) if f.id == "abc"));

        let row: IndexRow = serde_json::from_value(json!({ "key": "123" })).unwrap();
        assert_eq!(row, IndexRow::KeyOnly(json!("123")));
        assert_eq!(row.id(), None);
    }
}
