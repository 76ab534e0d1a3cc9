//! Schema version 3: structured personal and contact information.

use serde_json::{Value, json};

use super::{
    USER_CREATED, USER_DELETED, USER_EMAIL_CHANGED, conversion_field, default_preferences,
    hydrate, require_fields,
};
use crate::event::{DomainEvent, RawEventRecord};
use crate::versioning::convert::ConversionRule;
use crate::versioning::factory::EventSchemaFactory;
use crate::{Error, Result};

const VERSION: u16 = 3;
const EVENT_TYPES: &[&str] = &[USER_CREATED, USER_EMAIL_CHANGED, USER_DELETED];

/// Factory for version 3 events.
pub struct FactoryV3;

impl EventSchemaFactory for FactoryV3 {
    fn version(&self) -> u16 {
        VERSION
    }

    fn event_types(&self) -> &'static [&'static str] {
        EVENT_TYPES
    }

    fn create(&self, raw: &RawEventRecord) -> Result<DomainEvent> {
        match raw.event_type.as_str() {
            USER_CREATED => {
                require_fields(raw, VERSION, &["user_id", "personal_info", "contact_info"])?;
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

/// Downcasts `user_created` from v3 to v2.
///
/// Dropped fields: `personal_info.nationality`,
/// `contact_info.secondary_email` and `contact_info.phone_numbers`. The
/// structured name parts collapse into a single space-joined `profile.name`,
/// so this conversion is lossy and upcasting the result does not restore the
/// original event.
pub struct UserCreatedV3ToV2;

impl ConversionRule for UserCreatedV3ToV2 {
    fn event_type(&self) -> &'static str {
        USER_CREATED
    }

    fn source_version(&self) -> u16 {
        3
    }

    fn target_version(&self) -> u16 {
        2
    }

    fn convert(&self, payload: Value) -> Result<Value> {
        let personal_info = conversion_field(&payload, self, "personal_info")?;
        let contact_info = conversion_field(&payload, self, "contact_info")?;
        let full_name = conversion_field(personal_info, self, "full_name")?;

        let part = |field: &str| {
            full_name
                .get(field)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned()
        };
        let name = [part("first_name"), part("middle_name"), part("last_name")]
            .into_iter()
            .filter(|token| !token.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        Ok(json!({
            "user_id": payload.get("user_id").cloned().unwrap_or(Value::Null),
            "email": contact_info.get("primary_email").cloned().unwrap_or(Value::Null),
            "profile": {
                "name": name,
                "date_of_birth": personal_info
                    .get("date_of_birth")
                    .cloned()
                    .unwrap_or(Value::Null),
            },
            "preferences": payload
                .get("preferences")
                .cloned()
                .unwrap_or_else(default_preferences),
        }))
    }
}
