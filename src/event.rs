//! Event records, domain events and the persisted wire shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{Error, Result};

/// Metadata key carrying an explicit schema-version tag.
pub const METADATA_SCHEMA_VERSION: &str = "schema_version";
/// Metadata key carrying a schema name such as `user_created_v3`.
pub const METADATA_SCHEMA_NAME: &str = "schema_name";

/// Classifies an event as a business fact or an infrastructure fact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// A fact produced by gameplay/business logic.
    #[default]
    Domain,
    /// A fact produced by the platform itself (migrations, maintenance).
    System,
}

/// Relative importance of an event for downstream consumers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPriority {
    /// Background noise, safe to process late.
    Low,
    /// The default.
    #[default]
    Normal,
    /// Should be processed promptly.
    High,
    /// Must never be dropped or delayed.
    Critical,
}

/// An immutable record of one fact.
///
/// The event ID and timestamp are generated at construction and never change
/// afterwards. Metadata is an open key/value side-channel: it must never be
/// treated as part of the semantic payload, and it is excluded from the
/// checksum for exactly that reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    event_id: Uuid,
    event_type: String,
    aggregate_id: String,
    aggregate_type: String,
    version: i64,
    payload: Value,
    metadata: Map<String, Value>,
    timestamp: DateTime<Utc>,
}

impl EventRecord {
    /// Creates a new event record, generating the event ID and timestamp.
    ///
    /// `version` is the event's 1-based position in its aggregate's stream.
    /// Fails with [`Error::Validation`] when a required field is empty.
    pub fn new(
        event_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        aggregate_type: impl Into<String>,
        version: i64,
        payload: Value,
    ) -> Result<Self> {
        let record = Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            aggregate_id: aggregate_id.into(),
            aggregate_type: aggregate_type.into(),
            version,
            payload,
            metadata: Map::new(),
            timestamp: Utc::now(),
        };
        record.validate()?;
        Ok(record)
    }

    /// Rebuilds a record from its persisted wire shape, preserving the stored
    /// identity and timestamp.
    pub(crate) fn from_wire(raw: &RawEventRecord) -> Result<Self> {
        let event_id = Uuid::parse_str(&raw.event_id)
            .map_err(|e| Error::Validation(format!("invalid event id `{}`: {e}", raw.event_id)))?;
        let record = Self {
            event_id,
            event_type: raw.event_type.clone(),
            aggregate_id: raw.aggregate_id.clone(),
            aggregate_type: raw.aggregate_type.clone(),
            version: raw.version,
            payload: raw.payload.clone(),
            metadata: raw.metadata.clone(),
            timestamp: raw.timestamp,
        };
        record.validate()?;
        Ok(record)
    }

    /// Checks the record's required invariants, naming every violated field.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.event_type.is_empty() {
            missing.push("event_type");
        }
        if self.aggregate_id.is_empty() {
            missing.push("aggregate_id");
        }
        if self.aggregate_type.is_empty() {
            missing.push("aggregate_type");
        }
        if !missing.is_empty() {
            return Err(Error::Validation(format!(
                "required event fields are empty: {}",
                missing.join(", ")
            )));
        }
        if self.version < 1 {
            return Err(Error::Validation(format!(
                "event version must be positive, got {}",
                self.version
            )));
        }
        Ok(())
    }

    /// Returns the globally unique event ID.
    pub fn event_id(&self) -> Uuid {
        self.event_id
    }
    /// Returns the event type tag, e.g. `user_created`.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }
    /// Returns the ID of the aggregate this event belongs to.
    pub fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }
    /// Returns the type of the aggregate this event belongs to.
    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }
    /// Returns the event's 1-based position in its aggregate's stream.
    pub fn version(&self) -> i64 {
        self.version
    }
    /// Returns the schema-specific payload.
    pub fn payload(&self) -> &Value {
        &self.payload
    }
    /// Returns the metadata side-channel.
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }
    /// Returns the creation timestamp.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Adds or replaces a metadata entry.
    pub fn insert_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    /// Looks up a metadata entry.
    pub fn metadata_value(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }
}

/// A domain event: an [`EventRecord`] plus causal metadata, classification
/// and an auditable checksum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    record: EventRecord,
    causation_id: Option<String>,
    correlation_id: Option<String>,
    user_id: Option<String>,
    category: EventCategory,
    priority: EventPriority,
    system: bool,
}

impl DomainEvent {
    /// Creates a new domain event with generated identity and default
    /// classification (domain category, normal priority).
    pub fn new(
        event_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        aggregate_type: impl Into<String>,
        version: i64,
        payload: Value,
    ) -> Result<Self> {
        Ok(Self {
            record: EventRecord::new(event_type, aggregate_id, aggregate_type, version, payload)?,
            causation_id: None,
            correlation_id: None,
            user_id: None,
            category: EventCategory::Domain,
            priority: EventPriority::Normal,
            system: false,
        })
    }

    /// Rehydrates a domain event from the wire shape, pulling causal fields
    /// back out of the metadata side-channel.
    pub fn from_raw(raw: &RawEventRecord) -> Result<Self> {
        let record = EventRecord::from_wire(raw)?;
        let text = |key: &str| {
            raw.metadata
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_owned)
        };
        let system = raw
            .metadata
            .get("system")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Ok(Self {
            record,
            causation_id: text("causation_id"),
            correlation_id: text("correlation_id"),
            user_id: text("user_id"),
            category: if system {
                EventCategory::System
            } else {
                EventCategory::Domain
            },
            priority: EventPriority::Normal,
            system,
        })
    }

    /// Sets the ID of the command or event that produced this one.
    #[must_use]
    pub fn with_causation_id(mut self, causation_id: impl Into<String>) -> Self {
        self.causation_id = Some(causation_id.into());
        self
    }

    /// Sets the ID grouping all events of one logical operation.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Sets the acting user.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Sets the event priority.
    #[must_use]
    pub fn with_priority(mut self, priority: EventPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Marks this as a system event rather than a business fact.
    #[must_use]
    pub fn as_system_event(mut self) -> Self {
        self.category = EventCategory::System;
        self.system = true;
        self
    }

    /// Links this event to the one that caused it: causation points at the
    /// cause, correlation is inherited (or falls back to the cause's ID).
    #[must_use]
    pub fn caused_by(mut self, cause: &DomainEvent) -> Self {
        self.causation_id = Some(cause.event_id().to_string());
        self.correlation_id = cause
            .correlation_id
            .clone()
            .or_else(|| Some(cause.event_id().to_string()));
        self
    }

    /// Returns the causation ID, if any.
    pub fn causation_id(&self) -> Option<&str> {
        self.causation_id.as_deref()
    }
    /// Returns the correlation ID, if any.
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }
    /// Returns the acting user's ID, if any.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }
    /// Returns the event category.
    pub fn category(&self) -> EventCategory {
        self.category
    }
    /// Returns the event priority.
    pub fn priority(&self) -> EventPriority {
        self.priority
    }
    /// Whether this event was produced by the platform rather than gameplay.
    pub fn is_system_event(&self) -> bool {
        self.system
    }

    /// Returns the underlying event record.
    pub fn record(&self) -> &EventRecord {
        &self.record
    }
    /// Returns the globally unique event ID.
    pub fn event_id(&self) -> Uuid {
        self.record.event_id()
    }
    /// Returns the event type tag.
    pub fn event_type(&self) -> &str {
        self.record.event_type()
    }
    /// Returns the ID of the aggregate this event belongs to.
    pub fn aggregate_id(&self) -> &str {
        self.record.aggregate_id()
    }
    /// Returns the type of the aggregate this event belongs to.
    pub fn aggregate_type(&self) -> &str {
        self.record.aggregate_type()
    }
    /// Returns the event's position in its aggregate's stream.
    pub fn version(&self) -> i64 {
        self.record.version()
    }
    /// Returns the schema-specific payload.
    pub fn payload(&self) -> &Value {
        self.record.payload()
    }
    /// Returns the metadata side-channel.
    pub fn metadata(&self) -> &Map<String, Value> {
        self.record.metadata()
    }
    /// Returns the creation timestamp.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.record.timestamp()
    }
    /// Adds or replaces a metadata entry.
    pub fn insert_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.record.insert_metadata(key, value);
    }
    /// Looks up a metadata entry.
    pub fn metadata_value(&self, key: &str) -> Option<&Value> {
        self.record.metadata_value(key)
    }

    /// Computes the tamper-detection checksum over the event's semantic
    /// fields: event ID, event type, aggregate ID, version and payload.
    ///
    /// Metadata is deliberately excluded, so annotating an event never
    /// changes its auditable identity. The checksum is recomputed on every
    /// call, never cached. `serde_json` keeps object keys sorted, so equal
    /// payloads always serialize, and therefore hash, identically.
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.record.event_id().as_bytes());
        hasher.update(self.record.event_type().as_bytes());
        hasher.update(self.record.aggregate_id().as_bytes());
        hasher.update(self.record.version().to_be_bytes());
        hasher.update(self.record.payload().to_string().as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    /// Produces the converted sibling of this event: same identity, causal
    /// links and timestamp, new payload, schema tags rewritten.
    pub(crate) fn with_converted_payload(&self, payload: Value, schema_version: u16) -> Self {
        let mut converted = self.clone();
        converted.record.payload = payload;
        converted
            .record
            .metadata
            .insert(METADATA_SCHEMA_VERSION.to_owned(), schema_version.into());
        converted.record.metadata.insert(
            METADATA_SCHEMA_NAME.to_owned(),
            format!("{}_v{}", converted.record.event_type, schema_version).into(),
        );
        converted
    }
}

/// The persisted wire shape of one stored event.
///
/// Every field of the event record is serialized. Metadata SHOULD carry a
/// `schema_version` tag so version detection is a table lookup instead of a
/// structural inference over the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEventRecord {
    /// The stored event ID.
    pub event_id: String,
    /// The event type tag.
    pub event_type: String,
    /// The aggregate the event belongs to.
    pub aggregate_id: String,
    /// The aggregate's type.
    pub aggregate_type: String,
    /// The event's 1-based position in its aggregate's stream.
    pub version: i64,
    /// The schema-specific payload, already decoded by the codec.
    pub payload: Value,
    /// The metadata side-channel.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// The event's creation timestamp.
    pub timestamp: DateTime<Utc>,
}

impl RawEventRecord {
    /// Builds a wire record for a brand-new event at stream position 1.
    ///
    /// The aggregate type is left for the schema factory to stamp.
    pub fn new(
        event_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        payload: Value,
        metadata: Map<String, Value>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            aggregate_id: aggregate_id.into(),
            aggregate_type: String::new(),
            version: 1,
            payload,
            metadata,
            timestamp: Utc::now(),
        }
    }
}

impl From<&DomainEvent> for RawEventRecord {
    fn from(event: &DomainEvent) -> Self {
        let mut metadata = event.metadata().clone();
        // Causal fields ride along in metadata so they survive the store.
        if let Some(causation_id) = event.causation_id() {
            metadata.insert("causation_id".to_owned(), causation_id.into());
        }
        if let Some(correlation_id) = event.correlation_id() {
            metadata.insert("correlation_id".to_owned(), correlation_id.into());
        }
        if let Some(user_id) = event.user_id() {
            metadata.insert("user_id".to_owned(), user_id.into());
        }
        if event.is_system_event() {
            metadata.insert("system".to_owned(), true.into());
        }
        Self {
            event_id: event.event_id().to_string(),
            event_type: event.event_type().to_owned(),
            aggregate_id: event.aggregate_id().to_owned(),
            aggregate_type: event.aggregate_type().to_owned(),
            version: event.version(),
            payload: event.payload().clone(),
            metadata,
            timestamp: event.timestamp(),
        }
    }
}
