//! Record types for the garage and their document encoding.
//!
//! Records live in the store as flat JSON documents with camelCase field
//! names. The identity is the document key: it is stripped from the field map
//! on write and merged back in on decode.

use std::fmt;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_with::{NoneAsEmptyString, serde_as};

/// Field map of a stored document.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Name of the field that ties a dependent record to its motorcycle.
pub const MOTORCYCLE_ID_FIELD: &str = "motorcycleId";

/// Authenticated identity that scopes every record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Collection a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CollectionKind {
    Motorcycles,
    ServiceLogs,
    Reminders,
    TechData,
}

impl CollectionKind {
    pub fn all() -> &'static [CollectionKind] {
        &[
            CollectionKind::Motorcycles,
            CollectionKind::ServiceLogs,
            CollectionKind::Reminders,
            CollectionKind::TechData,
        ]
    }

    /// Storage name of the collection.
    pub fn as_str(self) -> &'static str {
        match self {
            CollectionKind::Motorcycles => "motorcycles",
            CollectionKind::ServiceLogs => "serviceLogs",
            CollectionKind::Reminders => "reminders",
            CollectionKind::TechData => "techData",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored document: store-assigned identity plus its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Value of the `motorcycleId` field, if present and a string.
    pub fn motorcycle_id(&self) -> Option<&str> {
        self.fields
            .get(MOTORCYCLE_ID_FIELD)
            .and_then(serde_json::Value::as_str)
    }

    /// Decode into a typed record, merging the identity into the fields.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        let mut fields = self.fields;
        fields.insert("id".to_string(), serde_json::Value::String(self.id));
        serde_json::from_value(serde_json::Value::Object(fields))
    }
}

/// Serialize `value` into a field map, dropping any `id` key.
pub fn to_fields<T: Serialize>(value: &T) -> Result<Fields, serde_json::Error> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(mut map) => {
            map.remove("id");
            Ok(map)
        }
        other => Err(<serde_json::Error as serde::ser::Error>::custom(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

/// A typed record stored in one collection.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: CollectionKind;

    fn id(&self) -> &str;
}

// ─────────────────────────────────────────────────────────────────────────────
// Motorcycle
// ─────────────────────────────────────────────────────────────────────────────

/// User-entered fields of a new motorcycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMotorcycle {
    pub brand: String,
    pub model: String,
    pub year: u16,
    pub nickname: String,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Motorcycle {
    pub id: String,
    pub brand: String,
    pub model: String,
    pub year: u16,
    pub nickname: String,
    /// Fetchable photo URL; stored as `""` when there is none.
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub photo: Option<String>,
}

impl Motorcycle {
    pub fn from_draft(id: impl Into<String>, draft: NewMotorcycle, photo: Option<String>) -> Self {
        Self {
            id: id.into(),
            brand: draft.brand,
            model: draft.model,
            year: draft.year,
            nickname: draft.nickname,
            photo,
        }
    }
}

impl Record for Motorcycle {
    const KIND: CollectionKind = CollectionKind::Motorcycles;

    fn id(&self) -> &str {
        &self.id
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dependent records
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewServiceLog {
    pub date: NaiveDate,
    pub mileage: u32,
    pub service_type: String,
    pub parts_used: String,
    pub parts_cost: f64,
    pub labor_cost: f64,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceLog {
    pub id: String,
    pub motorcycle_id: String,
    pub date: NaiveDate,
    pub mileage: u32,
    pub service_type: String,
    pub parts_used: String,
    pub parts_cost: f64,
    pub labor_cost: f64,
    pub notes: String,
}

impl ServiceLog {
    pub fn total_cost(&self) -> f64 {
        self.parts_cost + self.labor_cost
    }
}

impl Record for ServiceLog {
    const KIND: CollectionKind = CollectionKind::ServiceLogs;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReminder {
    pub description: String,
    /// Free text threshold, e.g. "in 3,000 km" or "in 6 months".
    pub due_info: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub id: String,
    pub motorcycle_id: String,
    pub description: String,
    pub due_info: String,
}

impl Record for Reminder {
    const KIND: CollectionKind = CollectionKind::Reminders;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTechData {
    pub data_type: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechData {
    pub id: String,
    pub motorcycle_id: String,
    pub data_type: String,
    pub value: String,
}

impl Record for TechData {
    const KIND: CollectionKind = CollectionKind::TechData;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Fields for a dependent record: the draft plus its owning motorcycle.
pub fn dependent_fields<D: Serialize>(
    motorcycle_id: &str,
    draft: &D,
) -> Result<Fields, serde_json::Error> {
    let mut fields = to_fields(draft)?;
    fields.insert(
        MOTORCYCLE_ID_FIELD.to_string(),
        serde_json::Value::String(motorcycle_id.to_string()),
    );
    Ok(fields)
}
