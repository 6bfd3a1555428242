//! Document models shared by the transitions
//!
//! Records and contacts arrive as loosely-typed JSON documents. The structs here
//! type the fields the transitions read or write and carry everything else in an
//! `extra` map so documents survive a round trip unchanged.
//!
//! # Hierarchy
//! - **Facility** (place): clinic, health center, district hospital, ...
//! - **Contact**: a person, either embedded in a facility or a standalone document
//! - **Parent**: another facility, the empty root marker `{}`, or any other
//!   loosely-typed value (kept as-is and judged by truthiness)

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// `type` of documents that need facility attribution
pub const DATA_RECORD_TYPE: &str = "data_record";

/// `type` of standalone contact person documents
pub const PERSON_TYPE: &str = "person";

/// `content_type` of pre-structured (self-describing) submissions
pub const XML_CONTENT_TYPE: &str = "xml";

/// Maximum number of ancestors followed when walking a parent chain
pub const MAX_LINEAGE_DEPTH: usize = 32;

// ============================================================================
// Data records
// ============================================================================

/// Inbound health-data submission awaiting facility attribution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataRecord {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub record_type: Option<String>,

    /// Sender phone number (string or number on input)
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub from: Value,

    /// External facility reference (string or number on input)
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub refid: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<Contact>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ErrorEntry>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DataRecord {
    /// Create an empty data record from the given sender
    pub fn from_sender(from: impl Into<Value>) -> Self {
        Self {
            record_type: Some(DATA_RECORD_TYPE.to_string()),
            from: from.into(),
            ..Default::default()
        }
    }

    pub fn is_data_record(&self) -> bool {
        self.record_type.as_deref() == Some(DATA_RECORD_TYPE)
    }

    /// True once a contact carrying a truthy hierarchy link has been attached
    pub fn has_owning_contact(&self) -> bool {
        self.contact
            .as_ref()
            .and_then(|contact| contact.parent.as_ref())
            .is_some_and(Parent::is_truthy)
    }

    pub fn is_xml(&self) -> bool {
        self.content_type.as_deref() == Some(XML_CONTENT_TYPE)
    }

    /// Reference id as a string key, when one was supplied
    ///
    /// Falsy values (`""`, `0`, `false`) count as absent.
    pub fn refid_key(&self) -> Option<String> {
        is_truthy(&self.refid).then(|| primitive_to_string(&self.refid))
    }

    /// Sender phone as a string key (empty when the sender is missing)
    pub fn from_key(&self) -> String {
        primitive_to_string(&self.from)
    }

    /// Append an error entry, creating the list if needed
    pub fn add_error(&mut self, entry: ErrorEntry) {
        self.errors.get_or_insert_with(Vec::new).push(entry);
    }
}

/// Error annotation stored on a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorEntry {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: Some(message.into()),
        }
    }
}

// ============================================================================
// Contacts and facilities
// ============================================================================

/// Contact person, embedded in a facility or standalone
///
/// An embedded contact that carries only `_id` is a reference to a standalone
/// person document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub contact_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub phone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Parent>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Contact {
    /// Ancestors of this contact, nearest first
    pub fn lineage(&self) -> Lineage<'_> {
        Lineage::new(self.parent.as_ref())
    }
}

/// Node of the facility hierarchy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub place_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// External reference id used by refid matching
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub place_id: Option<String>,

    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub phone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<Contact>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Parent>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Facility {
    /// Id of the standalone person this facility's contact points at, if any
    pub fn contact_ref(&self) -> Option<&str> {
        self.contact.as_ref().and_then(|contact| contact.id.as_deref())
    }

    /// Ancestors of this facility, nearest first
    pub fn lineage(&self) -> Lineage<'_> {
        Lineage::new(self.parent.as_ref())
    }
}

impl From<Facility> for Contact {
    fn from(facility: Facility) -> Self {
        let mut extra = facility.extra;
        if let Some(place_id) = facility.place_id {
            extra.insert("place_id".to_string(), Value::String(place_id));
        }
        if let Some(contact) = facility.contact {
            if let Ok(value) = serde_json::to_value(contact) {
                extra.insert("contact".to_string(), value);
            }
        }

        Self {
            id: Some(facility.id),
            rev: facility.rev,
            contact_type: facility.place_type,
            name: facility.name,
            phone: facility.phone,
            parent: facility.parent,
            extra,
        }
    }
}

/// Parent link: another facility, the root marker (`{}` or any id-less object),
/// or a scalar left behind by other writers (`false`, `""`, a bare id, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Parent {
    Place(Box<Facility>),
    Marker(Map<String, Value>),
    Other(Value),
}

impl Parent {
    pub fn place(&self) -> Option<&Facility> {
        match self {
            Parent::Place(facility) => Some(facility),
            Parent::Marker(_) | Parent::Other(_) => None,
        }
    }

    /// Objects are always truthy; other values follow [`is_truthy`]
    pub fn is_truthy(&self) -> bool {
        match self {
            Parent::Place(_) | Parent::Marker(_) => true,
            Parent::Other(value) => is_truthy(value),
        }
    }
}

impl From<Facility> for Parent {
    fn from(facility: Facility) -> Self {
        Parent::Place(Box::new(facility))
    }
}

/// Ascending walk over a parent chain, stopping at the root marker
///
/// The walk ends after [`MAX_LINEAGE_DEPTH`] ancestors; [`Lineage::truncated`]
/// reports whether the cap cut the chain short.
pub struct Lineage<'a> {
    next: Option<&'a Parent>,
    depth: usize,
}

impl<'a> Lineage<'a> {
    fn new(start: Option<&'a Parent>) -> Self {
        Self { next: start, depth: 0 }
    }

    /// True when ancestors remain beyond the depth cap
    pub fn truncated(&self) -> bool {
        self.depth >= MAX_LINEAGE_DEPTH && self.next.and_then(Parent::place).is_some()
    }
}

impl<'a> Iterator for Lineage<'a> {
    type Item = &'a Facility;

    fn next(&mut self) -> Option<Self::Item> {
        if self.depth >= MAX_LINEAGE_DEPTH {
            return None;
        }
        let facility = self.next?.place()?;
        self.depth += 1;
        self.next = facility.parent.as_ref();
        Some(facility)
    }
}

// ============================================================================
// Canonical documents
// ============================================================================

/// Canonical document returned by lineage hydration
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Document {
    Place(Facility),
    Person(Contact),
}

impl Document {
    /// Classify a raw document by its `type` field
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let is_person = value.get("type").and_then(Value::as_str) == Some(PERSON_TYPE);
        if is_person {
            serde_json::from_value(value).map(Document::Person)
        } else {
            serde_json::from_value(value).map(Document::Place)
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Document::Place(facility) => Some(&facility.id),
            Document::Person(contact) => contact.id.as_deref(),
        }
    }

    /// View the document as a contact (places keep their own fields)
    pub fn into_contact(self) -> Contact {
        match self {
            Document::Place(facility) => facility.into(),
            Document::Person(contact) => contact,
        }
    }

    /// The embedded contact snapshot of a place
    ///
    /// A person document has no embedded contact and yields `None`.
    pub fn into_embedded_contact(self) -> Option<Contact> {
        match self {
            Document::Place(facility) => facility.contact,
            Document::Person(_) => None,
        }
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Document::from_value(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Primitive helpers
// ============================================================================

/// Truthiness of a loosely-typed JSON field
///
/// `null`, `false`, `0` and `""` are falsy; everything else, including empty
/// objects, is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Optional string field that may have been written as a number
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(value @ (Value::String(_) | Value::Number(_))) => Ok(Some(primitive_to_string(&value))),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a string or number, found {}",
            other
        ))),
    }
}

/// String form of a primitive field, as stored in index keys
///
/// Integral floats print without a fraction (`123.0` becomes `"123"`), and a
/// missing value becomes the empty string.
pub fn primitive_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                return n.to_string();
            }
            match n.as_f64() {
                Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 => {
                    format!("{}", f as i64)
                }
                _ => n.to_string(),
            }
        }
        other => other.to_string(),
    }
}
