//! In-memory contact store
//!
//! Holds contact documents as stored (minified lineage: each `parent` carries
//! only `_id` and the next `parent`) and answers both collaborator traits:
//! - [`FacilityIndex`]: phone and external-reference lookups in load order
//! - [`LineageHydrator`]: documents with parents and contacts filled in

use crate::types::{FacilityIndex, FacilityQuery, IndexKey, IndexRow, LineageHydrator};
use async_trait::async_trait;
use chw_common::documents::{primitive_to_string, Document, Facility, MAX_LINEAGE_DEPTH};
use chw_common::StoreError;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Contact documents keyed by `_id`, remembering insertion order
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    docs: HashMap<String, Value>,
    order: Vec<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_documents(documents: Vec<Value>) -> Result<Self, StoreError> {
        let mut store = Self::new();
        for doc in documents {
            store.insert(doc)?;
        }
        Ok(store)
    }

    /// Load a JSON array of contact documents
    pub fn load_json_file(path: &Path) -> chw_common::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let documents: Vec<Value> = serde_json::from_str(&content)?;
        let store = Self::from_documents(documents)
            .map_err(|e| chw_common::Error::Config(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), documents = store.len(), "Contact store loaded");
        Ok(store)
    }

    /// Insert or replace a document; replacing keeps its original position
    pub fn insert(&mut self, doc: Value) -> Result<(), StoreError> {
        let id = doc
            .get("_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| StoreError::Malformed {
                id: "<unknown>".to_string(),
                reason: "document has no _id".to_string(),
            })?
            .to_string();

        if self.docs.insert(id.clone(), doc).is_none() {
            self.order.push(id);
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Value> {
        self.docs.get(id)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    fn matches(doc: &Value, query: &FacilityQuery) -> bool {
        let field = |name: &str| doc.get(name).and_then(Value::as_str);
        // Keys are indexed in string form, numbers included
        let key = |name: &str| {
            doc.get(name)
                .filter(|v| v.is_string() || v.is_number())
                .map(primitive_to_string)
        };
        match &query.key {
            IndexKey::Phone(phone) => !phone.is_empty() && key("phone").as_ref() == Some(phone),
            IndexKey::External(refid) => {
                let type_allowed = query.place_types.is_empty()
                    || field("type").is_some_and(|t| query.place_types.iter().any(|p| p == t));
                type_allowed && key("place_id").as_ref() == Some(refid)
            }
        }
    }

    fn row_for(&self, id: &str, doc: &Value, include_docs: bool) -> Result<IndexRow, StoreError> {
        if !include_docs {
            return Ok(IndexRow::Reference(id.to_string()));
        }
        serde_json::from_value::<Facility>(doc.clone())
            .map(IndexRow::Snapshot)
            .map_err(|e| StoreError::Malformed {
                id: id.to_string(),
                reason: e.to_string(),
            })
    }

    /// Replace an embedded `contact: {_id}` reference with the stored person
    fn fill_contact(&self, doc: &mut Value) {
        let contact_id = doc
            .get("contact")
            .and_then(|c| c.get("_id"))
            .and_then(Value::as_str)
            .map(str::to_owned);
        if let Some(person) = contact_id.and_then(|id| self.docs.get(&id)) {
            if let Some(fields) = doc.as_object_mut() {
                fields.insert("contact".to_string(), person.clone());
            }
        }
    }

    /// Replace each minified `parent` with the stored document, nearest first
    ///
    /// Ancestors missing from the store stay minified and end the walk.
    fn fill_lineage(&self, root_id: &str, doc: &mut Value) -> Result<(), StoreError> {
        let mut cursor = doc;
        let mut depth = 0;

        loop {
            let Some(slot) = cursor.get_mut("parent") else {
                break;
            };
            let Some(parent_id) = slot.get("_id").and_then(Value::as_str).map(str::to_owned) else {
                break;
            };

            depth += 1;
            if depth > MAX_LINEAGE_DEPTH {
                return Err(StoreError::LineageTooDeep {
                    id: root_id.to_string(),
                    max_depth: MAX_LINEAGE_DEPTH,
                });
            }

            let Some(stored) = self.docs.get(&parent_id) else {
                debug!(%root_id, %parent_id, "Ancestor missing from store");
                break;
            };
            let mut parent = stored.clone();
            self.fill_contact(&mut parent);
            *slot = parent;
            cursor = slot;
        }
        Ok(())
    }
}

#[async_trait]
impl FacilityIndex for MemoryStore {
    async fn query(&self, query: &FacilityQuery) -> Result<Vec<IndexRow>, StoreError> {
        let mut rows = Vec::new();
        for id in &self.order {
            let Some(doc) = self.docs.get(id) else {
                continue;
            };
            if Self::matches(doc, query) {
                rows.push(self.row_for(id, doc, query.include_docs)?);
            }
        }
        debug!(key = %query.key, row_count = rows.len(), "Index query");
        Ok(rows)
    }
}

#[async_trait]
impl LineageHydrator for MemoryStore {
    async fn fetch_hydrated_doc(&self, id: &str) -> Result<Document, StoreError> {
        let mut doc = self
            .docs
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        self.fill_contact(&mut doc);
        self.fill_lineage(id, &mut doc)?;

        Document::from_value(doc).map_err(|e| StoreError::Malformed {
            id: id.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> MemoryStore {
        MemoryStore::from_documents(vec![
            json!({ "_id": "dh", "type": "district_hospital", "name": "District", "parent": {} }),
            json!({
                "_id": "hc", "type": "health_center", "name": "Health Center",
                "contact": { "_id": "hc-nurse" },
                "parent": { "_id": "dh" }
            }),
            json!({
                "_id": "clinic", "type": "clinic", "name": "Clinic", "place_id": "1000",
                "contact": { "name": "CCN", "phone": "+111" },
                "parent": { "_id": "hc", "parent": { "_id": "dh" } }
            }),
            json!({
                "_id": "hc-nurse", "type": "person", "name": "Nurse", "phone": "+222",
                "parent": { "_id": "hc", "parent": { "_id": "dh" } }
            }),
            json!({ "_id": "other", "type": "person", "name": "Other", "phone": "+222", "parent": {} }),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_phone_query_returns_ids_in_order() {
        let rows = store().query(&FacilityQuery::by_phone("+222")).await.unwrap();
        assert_eq!(
            rows,
            vec![
                IndexRow::Reference("hc-nurse".into()),
                IndexRow::Reference("other".into())
            ]
        );
    }

    #[tokio::test]
    async fn test_numeric_keys_match_string_queries() {
        let store = MemoryStore::from_documents(vec![json!({
            "_id": "c", "type": "clinic", "place_id": 1000, "phone": 34567,
            "contact": { "name": "CCN", "phone": 34567 }, "parent": {}
        })])
        .unwrap();

        let rows = store.query(&FacilityQuery::by_phone("34567")).await.unwrap();
        assert_eq!(rows, vec![IndexRow::Reference("c".into())]);

        let rows = store
            .query(&FacilityQuery::by_reference("1000", vec!["clinic".into()]))
            .await
            .unwrap();
        let [IndexRow::Snapshot(clinic)] = rows.as_slice() else {
            panic!("expected one snapshot row, got {:?}", rows);
        };
        assert_eq!(clinic.place_id.as_deref(), Some("1000"));
        assert_eq!(clinic.contact.as_ref().unwrap().phone.as_deref(), Some("34567"));
    }

    #[tokio::test]
    async fn test_empty_phone_matches_nothing() {
        let rows = store().query(&FacilityQuery::by_phone("")).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_reference_query_is_scoped_to_place_types() {
        let store = store();

        let rows = store
            .query(&FacilityQuery::by_reference("1000", vec!["clinic".into()]))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert!(matches!(&rows[0], IndexRow::Snapshot(f) if f.id == "clinic"));

        let rows = store
            .query(&FacilityQuery::by_reference("1000", vec!["health_center".into()]))
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_hydration_fills_lineage_and_contacts() {
        let doc = store().fetch_hydrated_doc("clinic").await.unwrap();
        let Document::Place(clinic) = doc else {
            panic!("clinic should hydrate as a place");
        };

        let names: Vec<&str> = clinic.lineage().filter_map(|f| f.name.as_deref()).collect();
        assert_eq!(names, vec!["Health Center", "District"]);

        let hc = clinic.lineage().next().unwrap();
        assert_eq!(hc.contact.as_ref().and_then(|c| c.name.as_deref()), Some("Nurse"));
    }

    #[tokio::test]
    async fn test_hydration_of_person() {
        let doc = store().fetch_hydrated_doc("hc-nurse").await.unwrap();
        let Document::Person(nurse) = doc else {
            panic!("nurse should hydrate as a person");
        };
        let ids: Vec<&str> = nurse.lineage().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["hc", "dh"]);
    }

    #[tokio::test]
    async fn test_hydration_of_missing_document() {
        let result = store().fetch_hydrated_doc("nope").await;
        assert_eq!(result, Err(StoreError::NotFound("nope".into())));
    }

    #[tokio::test]
    async fn test_hydration_stops_on_cycles() {
        let store = MemoryStore::from_documents(vec![
            json!({ "_id": "a", "type": "clinic", "parent": { "_id": "b" } }),
            json!({ "_id": "b", "type": "clinic", "parent": { "_id": "a" } }),
        ])
        .unwrap();

        let result = store.fetch_hydrated_doc("a").await;
        assert_eq!(
            result,
            Err(StoreError::LineageTooDeep {
                id: "a".into(),
                max_depth: MAX_LINEAGE_DEPTH
            })
        );
    }

    #[test]
    fn test_insert_requires_id() {
        let mut store = MemoryStore::new();
        assert!(matches!(
            store.insert(json!({ "name": "anonymous" })),
            Err(StoreError::Malformed { .. })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut store = store();
        store
            .insert(json!({ "_id": "dh", "type": "district_hospital", "name": "Renamed" }))
            .unwrap();
        assert_eq!(store.len(), 5);
        assert_eq!(store.order[0], "dh");
        assert_eq!(store.get("dh").unwrap()["name"], "Renamed");
    }
}
