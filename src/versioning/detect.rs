//! Schema-version detection from metadata tags and payload shape.

use serde_json::{Map, Value};
use tracing::warn;

use crate::event::{METADATA_SCHEMA_NAME, METADATA_SCHEMA_VERSION};

/// A structural signal distinguishing one schema version from its neighbors,
/// used only when an event carries no explicit version tag.
#[derive(Debug, Clone)]
pub enum StructuralRule {
    /// The payload must contain all of these top-level fields.
    RequiredFields(&'static [&'static str]),
    /// Every payload key must come from this closed set (and the payload
    /// must not be empty).
    ClosedFieldSet(&'static [&'static str]),
}

impl StructuralRule {
    fn matches(&self, payload: &Map<String, Value>) -> bool {
        match self {
            Self::RequiredFields(fields) => {
                fields.iter().all(|field| payload.contains_key(*field))
            }
            Self::ClosedFieldSet(fields) => {
                !payload.is_empty() && payload.keys().all(|key| fields.contains(&key.as_str()))
            }
        }
    }
}

/// Determines which schema version a stored event was encoded with.
///
/// Detection order: explicit metadata version tag, then the schema-name tag,
/// then structural inspection of the decoded payload from the highest known
/// version down to the lowest. When nothing matches, the detector falls back
/// to the oldest supported version; that fallback is permissive by design
/// and logged as a warning because a genuinely malformed event would be
/// misclassified as old-format.
pub struct VersionDetector {
    /// Structural rules ordered highest version first.
    rules: Vec<(u16, StructuralRule)>,
    oldest: u16,
}

impl VersionDetector {
    pub(crate) fn new(mut rules: Vec<(u16, StructuralRule)>, oldest: u16) -> Self {
        rules.sort_by(|a, b| b.0.cmp(&a.0));
        Self { rules, oldest }
    }

    /// Detects the schema version of a decoded payload and its metadata.
    pub fn detect(&self, payload: &Value, metadata: &Map<String, Value>) -> u16 {
        let tag = metadata
            .get(METADATA_SCHEMA_VERSION)
            .or_else(|| metadata.get("version"));
        if let Some(version) = tag.and_then(parse_version_tag) {
            return version;
        }

        if let Some(version) = metadata
            .get(METADATA_SCHEMA_NAME)
            .and_then(Value::as_str)
            .and_then(parse_schema_name)
        {
            return version;
        }

        if let Some(object) = payload.as_object() {
            for (version, rule) in &self.rules {
                if rule.matches(object) {
                    return *version;
                }
            }
        }

        warn!(
            assumed_version = self.oldest,
            "event carries no version signal, assuming oldest supported schema"
        );
        self.oldest
    }
}

/// Parses the accepted encodings of an explicit version tag: an integer, a
/// float (`2.0`), or string forms such as `"2"`, `"2.0"`, `"v2"` and
/// `"version_2"`.
fn parse_version_tag(tag: &Value) -> Option<u16> {
    match tag {
        Value::Number(number) => {
            if let Some(version) = number.as_u64() {
                u16::try_from(version).ok().filter(|v| *v > 0)
            } else {
                number
                    .as_f64()
                    .map(|f| f as u16)
                    .filter(|version| *version > 0)
            }
        }
        Value::String(text) => parse_version_text(text),
        _ => None,
    }
}

fn parse_version_text(text: &str) -> Option<u16> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("version_")
        .or_else(|| trimmed.strip_prefix('v'))
        .unwrap_or(trimmed);
    if let Ok(version) = digits.parse::<u16>() {
        return (version > 0).then_some(version);
    }
    digits
        .parse::<f64>()
        .ok()
        .map(|f| f as u16)
        .filter(|version| *version > 0)
}

/// Extracts the trailing `_vN` token from a schema name like
/// `user_created_v3`.
fn parse_schema_name(name: &str) -> Option<u16> {
    let (_, suffix) = name.rsplit_once("_v")?;
    suffix.parse::<u16>().ok().filter(|version| *version > 0)
}
