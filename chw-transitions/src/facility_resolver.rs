//! Facility Resolver transition
//!
//! Attaches the owning contact to inbound data records, matching either the
//! external reference id (`refid`) or the sender phone number (`from`).
//!
//! # Resolution
//! 1. Build the index key: `["external", refid]` when a refid is present,
//!    otherwise the bare sender phone. Both are cast to strings.
//! 2. Take the first index row.
//! 3. Re-hydrate through the lineage store before assigning anything; the
//!    index may lag the authoritative documents.
//! 4. Without a match, annotate the record with `sys.facility_not_found`
//!    unless it is an xml submission or uses a public form.
//!
//! Store failures are returned as-is and the record is left untouched.

use crate::context::TransitionContext;
use crate::types::{FacilityIndex, FacilityQuery, IndexRow, LineageHydrator, Transition};
use async_trait::async_trait;
use chw_common::documents::{Contact, DataRecord, Document, ErrorEntry, Facility};
use chw_common::StoreError;
use std::sync::Arc;
use tracing::{debug, info};

/// Error code added to records whose facility cannot be found
pub const FACILITY_NOT_FOUND: &str = "sys.facility_not_found";

/// Outcome of the matched path
enum Resolution {
    /// Nothing usable in the index
    Unmatched,
    /// Owning facility found; its current contact, if it has one
    Matched(Option<Contact>),
}

/// Resolves the owning facility contact of data records
pub struct FacilityResolver {
    index: Arc<dyn FacilityIndex>,
    hydrator: Arc<dyn LineageHydrator>,
    context: Arc<TransitionContext>,
}

impl FacilityResolver {
    pub fn new(
        index: Arc<dyn FacilityIndex>,
        hydrator: Arc<dyn LineageHydrator>,
        context: Arc<TransitionContext>,
    ) -> Self {
        Self {
            index,
            hydrator,
            context,
        }
    }

    /// Accept data records that do not yet carry a hierarchy-bearing contact
    pub fn filter(&self, record: &DataRecord) -> bool {
        record.is_data_record() && !record.has_owning_contact()
    }

    /// Index query for a record: reference-id mode wins over phone mode
    pub fn build_query(&self, record: &DataRecord) -> FacilityQuery {
        match record.refid_key() {
            Some(refid) => FacilityQuery::by_reference(refid, self.context.place_type_ids()),
            None => FacilityQuery::by_phone(record.from_key()),
        }
    }

    /// Match the record against the index and mutate it in place
    ///
    /// # Returns
    /// Whether `contact` or `errors` was modified
    ///
    /// # Errors
    /// Index and hydration failures propagate unchanged; the record is not modified
    pub async fn resolve(&self, record: &mut DataRecord) -> Result<bool, StoreError> {
        let query = self.build_query(record);
        let rows = self.index.query(&query).await?;

        if rows.len() > 1 {
            debug!(
                key = %query.key,
                row_count = rows.len(),
                "Multiple facilities share this key, using the first row"
            );
        }

        let resolution = match rows.into_iter().next() {
            Some(row) => self.resolve_row(row).await?,
            None => Resolution::Unmatched,
        };

        match resolution {
            Resolution::Matched(mut contact) => {
                // A phone match identifies the facility, not the contact's own number
                if query.key.is_phone() {
                    if let Some(contact) = contact.as_mut() {
                        contact.phone = None;
                    }
                }
                info!(
                    record_id = record.id.as_deref().unwrap_or("-"),
                    key = %query.key,
                    contact_id = contact.as_ref().and_then(|c| c.id.as_deref()).unwrap_or("-"),
                    "Facility contact assigned"
                );
                record.contact = contact;
                Ok(true)
            }
            Resolution::Unmatched => Ok(self.apply_not_found_policy(record)),
        }
    }

    /// Turn the selected row into the current owning contact
    async fn resolve_row(&self, row: IndexRow) -> Result<Resolution, StoreError> {
        match row {
            IndexRow::Snapshot(facility) => self.current_contact(facility, false).await,
            IndexRow::Reference(id) => match self.hydrator.fetch_hydrated_doc(&id).await? {
                Document::Place(facility) => self.current_contact(facility, true).await,
                // The phone belongs to a person; the person is the match
                Document::Person(person) => Ok(Resolution::Matched(Some(person))),
            },
            IndexRow::KeyOnly(key) => {
                debug!(%key, "Index row has neither id nor document");
                Ok(Resolution::Unmatched)
            }
        }
    }

    /// Current contact of `facility`
    ///
    /// A facility that is not `fresh` (an index snapshot) is always hydrated
    /// again before its contact is used. A `fresh` facility came from an id-only
    /// row and was hydrated once already: its embedded contact is used as-is,
    /// so that row costs a single hydration. A contact referenced by `_id` is
    /// always hydrated on its own.
    async fn current_contact(&self, facility: Facility, fresh: bool) -> Result<Resolution, StoreError> {
        let contact_id = facility.contact_ref().unwrap_or(&facility.id).to_string();

        if contact_id != facility.id {
            let person = self.hydrator.fetch_hydrated_doc(&contact_id).await?;
            debug!(facility_id = %facility.id, %contact_id, "Hydrated referenced contact");
            return Ok(Resolution::Matched(Some(person.into_contact())));
        }

        let canonical = if fresh {
            Document::Place(facility)
        } else {
            self.hydrator.fetch_hydrated_doc(&contact_id).await?
        };
        Ok(Resolution::Matched(canonical.into_embedded_contact()))
    }

    /// Decide whether a record without a facility gets an error entry
    fn apply_not_found_policy(&self, record: &mut DataRecord) -> bool {
        if record.is_xml() {
            debug!(
                record_id = record.id.as_deref().unwrap_or("-"),
                "No facility for xml submission, not reporting"
            );
            return false;
        }

        let reportable = match record.form.as_deref() {
            None => true,
            Some(form) => !self.context.is_public_form(form),
        };
        if !reportable {
            debug!(form = record.form.as_deref(), "No facility for public form");
            return false;
        }

        let message = self.context.translate(FACILITY_NOT_FOUND);
        record.add_error(ErrorEntry::new(FACILITY_NOT_FOUND, message));
        info!(
            record_id = record.id.as_deref().unwrap_or("-"),
            form = record.form.as_deref(),
            "Facility not found"
        );
        true
    }
}

#[async_trait]
impl Transition for FacilityResolver {
    fn name(&self) -> &'static str {
        "update_clinics"
    }

    fn filter(&self, record: &DataRecord) -> bool {
        FacilityResolver::filter(self, record)
    }

    async fn on_match(&self, record: &mut DataRecord) -> Result<bool, StoreError> {
        self.resolve(record).await
    }
}

// ============================================================================
// Mock collaborators for testing
// ============================================================================

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Index returning canned rows and recording every query
    pub struct MockIndex {
        pub rows: Result<Vec<IndexRow>, StoreError>,
        pub queries: Mutex<Vec<FacilityQuery>>,
    }

    impl MockIndex {
        pub fn returning(rows: Vec<IndexRow>) -> Self {
            Self {
                rows: Ok(rows),
                queries: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(error: StoreError) -> Self {
            Self {
                rows: Err(error),
                queries: Mutex::new(Vec::new()),
            }
        }

        pub fn recorded(&self) -> Vec<FacilityQuery> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FacilityIndex for MockIndex {
        async fn query(&self, query: &FacilityQuery) -> Result<Vec<IndexRow>, StoreError> {
            self.queries.lock().unwrap().push(query.clone());
            self.rows.clone()
        }
    }

    /// Hydrator answering from a fixed map and recording requested ids
    #[derive(Default)]
    pub struct MockHydrator {
        pub docs: HashMap<String, Result<Document, StoreError>>,
        pub requests: Mutex<Vec<String>>,
    }

    impl MockHydrator {
        pub fn with(mut self, id: &str, doc: Result<Document, StoreError>) -> Self {
            self.docs.insert(id.to_string(), doc);
            self
        }

        pub fn recorded(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LineageHydrator for MockHydrator {
        async fn fetch_hydrated_doc(&self, id: &str) -> Result<Document, StoreError> {
            self.requests.lock().unwrap().push(id.to_string());
            self.docs
                .get(id)
                .cloned()
                .unwrap_or_else(|| Err(StoreError::NotFound(id.to_string())))
        }
    }

    /// Localizer recording its calls
    pub struct MockLocalizer {
        pub calls: Mutex<Vec<(String, String)>>,
    }

    impl MockLocalizer {
        pub fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl chw_common::Localizer for MockLocalizer {
        fn translate(&self, key: &str, locale: &str) -> String {
            self.calls
                .lock()
                .unwrap()
                .push((key.to_string(), locale.to_string()));
            "translated".to_string()
        }

        fn current_locale(&self) -> String {
            "locale".to_string()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
