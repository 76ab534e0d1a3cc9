//! Schema version 1: the original flat account shape.

use serde_json::{Value, json};

use super::{
    USER_CREATED, USER_DELETED, USER_EMAIL_CHANGED, conversion_str, default_preferences, hydrate,
    require_fields,
};
use crate::event::{DomainEvent, RawEventRecord};
use crate::versioning::convert::ConversionRule;
use crate::versioning::factory::EventSchemaFactory;
use crate::{Error, Result};

const VERSION: u16 = 1;
const EVENT_TYPES: &[&str] = &[USER_CREATED, USER_EMAIL_CHANGED, USER_DELETED];

/// Factory for version 1 events.
pub struct FactoryV1;

impl EventSchemaFactory for FactoryV1 {
    fn version(&self) -> u16 {
        VERSION
    }

    fn event_types(&self) -> &'static [&'static str] {
        EVENT_TYPES
    }

    fn create(&self, raw: &RawEventRecord) -> Result<DomainEvent> {
        match raw.event_type.as_str() {
            USER_CREATED => require_fields(raw, VERSION, &["user_id", "name", "email"])?,
            USER_EMAIL_CHANGED => require_fields(raw, VERSION, &["user_id", "email"])?,
            USER_DELETED => require_fields(raw, VERSION, &["user_id"])?,
            other => {
                return Err(Error::UnsupportedEventType {
                    version: VERSION,
                    event_type: other.to_owned(),
                });
            }
        }
        hydrate(raw, VERSION)
    }
}

/// Upcasts `user_created` from v1 to v2.
///
/// Defaulted fields: `profile.date_of_birth` (null, unknown in v1) and the
/// whole `preferences` bundle (the documented defaults).
pub struct UserCreatedV1ToV2;

impl ConversionRule for UserCreatedV1ToV2 {
    fn event_type(&self) -> &'static str {
        USER_CREATED
    }

    fn source_version(&self) -> u16 {
        1
    }

    fn target_version(&self) -> u16 {
        2
    }

    fn convert(&self, payload: Value) -> Result<Value> {
        let name = conversion_str(&payload, self, "name")?.to_owned();
        Ok(json!({
            "user_id": payload.get("user_id").cloned().unwrap_or(Value::Null),
            "email": payload.get("email").cloned().unwrap_or(Value::Null),
            "profile": {
                "name": name,
                "date_of_birth": Value::Null,
            },
            "preferences": default_preferences(),
        }))
    }
}
