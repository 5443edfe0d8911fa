//! Lead entities: the wire shape pulled from the marketplace, the validated
//! record the sync engine works with, and the two stored views of it
//! (append-only events and the per-entity projection).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of a lead/customer in the external source.
///
/// Ordered numerically; the sync watermark is the maximum stored id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(i64);

impl EntityId {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Deterministic event identity derived from (entity id, observed-at).
///
/// The same source record re-fetched any number of times always maps to the
/// same key, which is what makes event ingestion idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventKey(String);

impl EventKey {
    pub fn derive(entity_id: EntityId, observed_at_ms: i64) -> Self {
        let material = format!("{}:{}", entity_id.get(), observed_at_ms);
        Self(blake3::hash(material.as_bytes()).to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifiers in the marketplace payload show up both as JSON numbers and
/// as strings depending on the endpoint version.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FlexibleId {
    Number(i64),
    Text(String),
}

impl FlexibleId {
    fn into_text(self) -> Option<String> {
        match self {
            Self::Number(n) => Some(n.to_string()),
            Self::Text(s) => non_blank(Some(s)),
        }
    }

    fn to_entity_id(&self) -> Result<EntityId, String> {
        let value = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| format!("'{s}' is not a numeric id"))?,
        };
        if value <= 0 {
            return Err(format!("id must be positive, got {value}"));
        }
        Ok(EntityId(value))
    }
}

/// Nested service/category classification as sent by the source.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawServices {
    #[serde(default, alias = "service_id")]
    pub service_id: Option<FlexibleId>,
    #[serde(default, alias = "service_name")]
    pub service_name: Option<String>,
    #[serde(default, alias = "category_id")]
    pub category_id: Option<FlexibleId>,
    #[serde(default, alias = "category_name")]
    pub category_name: Option<String>,
    #[serde(default, alias = "sub_category_id")]
    pub sub_category_id: Option<FlexibleId>,
    #[serde(default, alias = "sub_category_name")]
    pub sub_category_name: Option<String>,
    #[serde(default, alias = "rate_card_name")]
    pub rate_card_name: Option<String>,
}

/// One lead exactly as it appears in a fetched page.
///
/// Every field is optional at this level so a single bad element cannot fail
/// the whole page; required fields are enforced by [`LeadRecord::try_from`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLead {
    #[serde(default, alias = "customer_id")]
    pub customer_id: Option<FlexibleId>,
    #[serde(default, alias = "first_name")]
    pub first_name: Option<String>,
    #[serde(default, alias = "last_name")]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "vendor_id")]
    pub vendor_id: Option<FlexibleId>,
    #[serde(default, alias = "submitted_at")]
    pub submitted_at: Option<i64>,
    #[serde(default)]
    pub services: Option<RawServices>,
}

/// Flattened service classification carried by every record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceClassification {
    pub service_id: Option<String>,
    pub service_name: Option<String>,
    pub category_id: Option<String>,
    pub category_name: Option<String>,
    pub sub_category_id: Option<String>,
    pub sub_category_name: Option<String>,
    pub rate_card_name: Option<String>,
}

impl From<RawServices> for ServiceClassification {
    fn from(raw: RawServices) -> Self {
        Self {
            service_id: raw.service_id.and_then(FlexibleId::into_text),
            service_name: non_blank(raw.service_name),
            category_id: raw.category_id.and_then(FlexibleId::into_text),
            category_name: non_blank(raw.category_name),
            sub_category_id: raw.sub_category_id.and_then(FlexibleId::into_text),
            sub_category_name: non_blank(raw.sub_category_name),
            rate_card_name: non_blank(raw.rate_card_name),
        }
    }
}

/// A record that could not be turned into a [`LeadRecord`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed lead (id: {}): field '{field}' {reason}", .raw_id.as_deref().unwrap_or("?"))]
pub struct MalformedLead {
    pub field: String,
    pub reason: String,
    /// Whatever identifier could be salvaged, for logging only
    pub raw_id: Option<String>,
}

impl MalformedLead {
    pub fn new(field: &str, reason: impl Into<String>, raw_id: Option<String>) -> Self {
        Self {
            field: field.to_string(),
            reason: reason.into(),
            raw_id,
        }
    }

    /// Builds the error for an element that did not even decode as a lead.
    pub fn undecodable(value: &serde_json::Value, error: &serde_json::Error) -> Self {
        let raw_id = value
            .get("customerId")
            .or_else(|| value.get("customer_id"))
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            });
        Self::new("payload", format!("could not be decoded: {error}"), raw_id)
    }
}

/// A validated lead observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadRecord {
    pub entity_id: EntityId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: Option<String>,
    pub vendor_id: Option<String>,
    pub service: ServiceClassification,
    /// Source-supplied `submittedAt`, epoch milliseconds
    pub observed_at_ms: i64,
}

impl LeadRecord {
    pub fn event_key(&self) -> EventKey {
        EventKey::derive(self.entity_id, self.observed_at_ms)
    }
}

impl TryFrom<RawLead> for LeadRecord {
    type Error = MalformedLead;

    fn try_from(raw: RawLead) -> Result<Self, Self::Error> {
        let raw_id = raw.customer_id.as_ref().map(|id| match id {
            FlexibleId::Number(n) => n.to_string(),
            FlexibleId::Text(s) => s.clone(),
        });

        let entity_id = match &raw.customer_id {
            Some(id) => id
                .to_entity_id()
                .map_err(|reason| MalformedLead::new("customerId", reason, raw_id.clone()))?,
            None => return Err(MalformedLead::new("customerId", "is missing", raw_id)),
        };

        let observed_at_ms = match raw.submitted_at {
            Some(ms) if ms > 0 => ms,
            Some(ms) => {
                return Err(MalformedLead::new(
                    "submittedAt",
                    format!("must be a positive epoch-millis value, got {ms}"),
                    raw_id,
                ));
            }
            None => return Err(MalformedLead::new("submittedAt", "is missing", raw_id)),
        };

        Ok(Self {
            entity_id,
            first_name: non_blank(raw.first_name),
            last_name: non_blank(raw.last_name),
            email: non_blank(raw.email),
            phone: non_blank(raw.phone),
            status: non_blank(raw.status),
            vendor_id: raw.vendor_id.and_then(FlexibleId::into_text),
            service: raw.services.map(ServiceClassification::from).unwrap_or_default(),
            observed_at_ms,
        })
    }
}

/// Immutable, append-only observation of a lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadEvent {
    pub event_key: EventKey,
    pub record: LeadRecord,
    pub ingested_at: DateTime<Utc>,
}

impl LeadEvent {
    pub fn from_record(record: LeadRecord, ingested_at: DateTime<Utc>) -> Self {
        Self {
            event_key: record.event_key(),
            record,
            ingested_at,
        }
    }
}

/// Current known state of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadProjection {
    pub entity_id: EntityId,
    pub latest_status: Option<String>,
    pub previous_status: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub vendor_id: Option<String>,
    pub service_id: Option<String>,
    pub service_name: Option<String>,
    pub category_name: Option<String>,
    pub sub_category_name: Option<String>,
    pub rate_card_name: Option<String>,
    /// Max observed-at (epoch ms) over every event of this entity
    pub last_updated_ms: i64,
    pub event_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
