//! Versioned schemas for the player-account event family.
//!
//! Three schema versions coexist in stored history:
//!
//! | version | `user_created` payload |
//! |---------|------------------------|
//! | 1 | flat `user_id`, `name`, `email` |
//! | 2 | `user_id`, `email`, `profile` (name, date of birth), `preferences` |
//! | 3 | `user_id`, `personal_info` (structured full name, date of birth, nationality), `contact_info` (primary/secondary email, phone numbers), `preferences` |
//!
//! `user_email_changed` and `user_deleted` keep the same payload shape in
//! every version. Upcasts default the fields a newer version added;
//! downcasts drop what the older version cannot express:
//!
//! | downcast | fields lost |
//! |----------|-------------|
//! | 3 -> 2 | `personal_info.nationality`, `contact_info.secondary_email`, `contact_info.phone_numbers`; name parts collapse into one space-joined string |
//! | 2 -> 1 | `profile.date_of_birth`, the whole `preferences` bundle |

pub mod v1;
pub mod v2;
pub mod v3;

use serde_json::{Value, json};

use crate::event::{
    DomainEvent, METADATA_SCHEMA_NAME, METADATA_SCHEMA_VERSION, RawEventRecord,
};
use crate::versioning::convert::ConversionRule;
use crate::versioning::detect::StructuralRule;
use crate::versioning::{VersionManager, VersionManagerBuilder};
use crate::{Error, Result};

/// The aggregate type tag for player accounts.
pub const AGGREGATE_TYPE: &str = "player_account";
/// A player account came into existence.
pub const USER_CREATED: &str = "user_created";
/// A player changed their email address.
pub const USER_EMAIL_CHANGED: &str = "user_email_changed";
/// A player account was removed.
pub const USER_DELETED: &str = "user_deleted";

/// Builds the version manager covering schema versions 1 through 3 of the
/// player-account event family.
pub fn registry() -> Result<VersionManager> {
    let mut builder = VersionManagerBuilder::new()
        .with_factory(v1::FactoryV1)
        .with_factory(v2::FactoryV2)
        .with_factory(v3::FactoryV3)
        .with_rule(v1::UserCreatedV1ToV2)
        .with_rule(v2::UserCreatedV2ToV1)
        .with_rule(v2::UserCreatedV2ToV3)
        .with_rule(v3::UserCreatedV3ToV2)
        .with_structural_rule(
            3,
            StructuralRule::RequiredFields(&["personal_info", "contact_info"]),
        )
        .with_structural_rule(2, StructuralRule::RequiredFields(&["profile", "preferences"]))
        .with_structural_rule(1, StructuralRule::ClosedFieldSet(&["user_id", "name", "email"]));

    // Email-change and deletion payloads are shape-stable across versions,
    // but each hop still needs its own rule so conversion paths stay
    // complete and auditable.
    for event_type in [USER_EMAIL_CHANGED, USER_DELETED] {
        for (source, target) in [(1, 2), (2, 1), (2, 3), (3, 2)] {
            builder = builder.with_rule(UnchangedShape {
                event_type,
                source,
                target,
            });
        }
    }

    builder.build()
}

/// Conversion rule for event types whose payload is identical in the source
/// and target versions. Nothing is defaulted, nothing is dropped.
struct UnchangedShape {
    event_type: &'static str,
    source: u16,
    target: u16,
}

impl ConversionRule for UnchangedShape {
    fn event_type(&self) -> &'static str {
        self.event_type
    }
    fn source_version(&self) -> u16 {
        self.source
    }
    fn target_version(&self) -> u16 {
        self.target
    }
    fn convert(&self, payload: Value) -> Result<Value> {
        Ok(payload)
    }
}

/// The default preferences bundle stamped onto upcast events that predate
/// preferences.
pub fn default_preferences() -> Value {
    json!({ "language": "en", "notifications": true })
}

/// Validates that a raw payload is an object carrying every listed field.
fn require_fields(raw: &RawEventRecord, version: u16, fields: &[&str]) -> Result<()> {
    let object = raw.payload.as_object().ok_or_else(|| {
        Error::Validation(format!(
            "{} v{version} payload must be a JSON object",
            raw.event_type
        ))
    })?;
    for field in fields {
        if !object.contains_key(*field) {
            return Err(Error::Validation(format!(
                "{} v{version} payload is missing required field `{field}`",
                raw.event_type
            )));
        }
    }
    Ok(())
}

/// Materializes the domain event, stamping the family aggregate type and the
/// schema tags that make later detection a metadata lookup.
fn hydrate(raw: &RawEventRecord, version: u16) -> Result<DomainEvent> {
    let mut raw = raw.clone();
    if raw.aggregate_type.is_empty() {
        raw.aggregate_type = AGGREGATE_TYPE.to_owned();
    }
    raw.metadata
        .insert(METADATA_SCHEMA_VERSION.to_owned(), version.into());
    raw.metadata.insert(
        METADATA_SCHEMA_NAME.to_owned(),
        format!("{}_v{version}", raw.event_type).into(),
    );
    DomainEvent::from_raw(&raw)
}

/// Fetches a payload field a conversion rule cannot proceed without.
fn conversion_field<'a>(
    payload: &'a Value,
    rule: &dyn ConversionRule,
    field: &str,
) -> Result<&'a Value> {
    payload.get(field).ok_or_else(|| Error::Conversion {
        event_type: rule.event_type().to_owned(),
        from: rule.source_version(),
        to: rule.target_version(),
        reason: format!("missing payload field `{field}`"),
    })
}

/// Like [`conversion_field`], for fields that must be strings.
fn conversion_str<'a>(
    payload: &'a Value,
    rule: &dyn ConversionRule,
    field: &str,
) -> Result<&'a str> {
    conversion_field(payload, rule, field)?
        .as_str()
        .ok_or_else(|| Error::Conversion {
            event_type: rule.event_type().to_owned(),
            from: rule.source_version(),
            to: rule.target_version(),
            reason: format!("payload field `{field}` is not a string"),
        })
}
