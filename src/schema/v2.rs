//! Schema version 2: profile and preferences split out of the flat shape.

use serde_json::{Value, json};

use super::{
    USER_CREATED, USER_DELETED, USER_EMAIL_CHANGED, conversion_field, conversion_str,
    default_preferences, hydrate, require_fields,
};
use crate::event::{DomainEvent, RawEventRecord};
use crate::versioning::convert::ConversionRule;
use crate::versioning::factory::EventSchemaFactory;
use crate::{Error, Result};

const VERSION: u16 = 2;
const EVENT_TYPES: &[&str] = &[USER_CREATED, USER_EMAIL_CHANGED, USER_DELETED];

/// Factory for version 2 events.
pub struct FactoryV2;

impl EventSchemaFactory for FactoryV2 {
    fn version(&self) -> u16 {
        VERSION
    }

    fn event_types(&self) -> &'static [&'static str] {
        EVENT_TYPES
    }

    fn create(&self, raw: &RawEventRecord) -> Result<DomainEvent> {
        match raw.event_type.as_str() {
            USER_CREATED => {
                require_fields(raw, VERSION, &["user_id", "email", "profile", "preferences"])?;
            }
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

/// Downcasts `user_created` from v2 to v1.
///
/// Dropped fields: `profile.date_of_birth` and the whole `preferences`
/// bundle; v1 has nowhere to put either.
pub struct UserCreatedV2ToV1;

impl ConversionRule for UserCreatedV2ToV1 {
    fn event_type(&self) -> &'static str {
        USER_CREATED
    }

    fn source_version(&self) -> u16 {
        2
    }

    fn target_version(&self) -> u16 {
        1
    }

    fn convert(&self, payload: Value) -> Result<Value> {
        let profile = conversion_field(&payload, self, "profile")?;
        let name = conversion_str(profile, self, "name")?.to_owned();
        Ok(json!({
            "user_id": payload.get("user_id").cloned().unwrap_or(Value::Null),
            "name": name,
            "email": payload.get("email").cloned().unwrap_or(Value::Null),
        }))
    }
}

/// Upcasts `user_created` from v2 to v3.
///
/// The single `profile.name` splits on whitespace into structured name
/// parts: first token becomes the first name, last token the last name,
/// anything in between the middle name. Defaulted fields: `middle_name` and
/// `last_name` when the name has too few tokens, `personal_info.nationality`
/// (empty), `contact_info.secondary_email` (empty) and
/// `contact_info.phone_numbers` (empty list).
pub struct UserCreatedV2ToV3;

impl ConversionRule for UserCreatedV2ToV3 {
    fn event_type(&self) -> &'static str {
        USER_CREATED
    }

    fn source_version(&self) -> u16 {
        2
    }

    fn target_version(&self) -> u16 {
        3
    }

    fn convert(&self, payload: Value) -> Result<Value> {
        let profile = conversion_field(&payload, self, "profile")?;
        let name = conversion_str(profile, self, "name")?;

        let mut tokens = name.split_whitespace();
        let first_name = tokens.next().unwrap_or_default();
        let rest: Vec<&str> = tokens.collect();
        let last_name = rest.last().copied().unwrap_or_default();
        let middle_name = rest[..rest.len().saturating_sub(1)].join(" ");

        Ok(json!({
            "user_id": payload.get("user_id").cloned().unwrap_or(Value::Null),
            "personal_info": {
                "full_name": {
                    "first_name": first_name,
                    "middle_name": middle_name,
                    "last_name": last_name,
                },
                "date_of_birth": profile.get("date_of_birth").cloned().unwrap_or(Value::Null),
                "nationality": "",
            },
            "contact_info": {
                "primary_email": payload.get("email").cloned().unwrap_or(Value::Null),
                "secondary_email": "",
                "phone_numbers": [],
            },
            "preferences": payload
                .get("preferences")
                .cloned()
                .unwrap_or_else(default_preferences),
        }))
    }
}
