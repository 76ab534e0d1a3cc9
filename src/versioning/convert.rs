//! Pairwise schema-conversion rules and the registry that chains them.

use std::collections::HashMap;

use serde_json::Value;

use crate::{Error, Result};

/// A pure conversion of one event type's payload across exactly one schema
/// version step.
///
/// Rules are directional: an upcast targets `source + 1`, a downcast targets
/// `source - 1`. Multi-step conversion is always a chain of single-step
/// rules, never a direct skip transform, so every hop stays auditable and
/// independently testable. Concrete rules document which fields they default
/// (upcast) and which they drop (downcast); downcasts are allowed to be
/// lossy, so `downcast(upcast(x))` carries no round-trip guarantee.
pub trait ConversionRule: Send + Sync {
    /// The event type this rule converts.
    fn event_type(&self) -> &'static str;

    /// The schema version this rule converts from.
    fn source_version(&self) -> u16;

    /// The schema version this rule converts to; always `source ± 1`.
    fn target_version(&self) -> u16;

    /// Transforms a payload from the source shape to the target shape.
    fn convert(&self, payload: Value) -> Result<Value>;
}

type RuleKey = (String, u16);

/// Immutable tables of upcast and downcast rules keyed by
/// (event type, source version).
///
/// Built once during initialization and never mutated afterwards, so it is
/// freely shareable across concurrent operations without synchronization.
#[derive(Default)]
pub struct ConversionRegistry {
    upcasts: HashMap<RuleKey, Box<dyn ConversionRule>>,
    downcasts: HashMap<RuleKey, Box<dyn ConversionRule>>,
}

impl ConversionRegistry {
    /// Files a rule under the upcast or downcast table according to its
    /// direction; rejects rules spanning more than one version step.
    pub(crate) fn register(&mut self, rule: Box<dyn ConversionRule>) -> Result<()> {
        let source = rule.source_version();
        let target = rule.target_version();
        let event_type = rule.event_type();
        if target == source + 1 {
            self.upcasts.insert((event_type.to_owned(), source), rule);
        } else if target + 1 == source {
            self.downcasts.insert((event_type.to_owned(), source), rule);
        } else {
            return Err(Error::Validation(format!(
                "conversion rule for `{event_type}` must span exactly one version step, got {source} -> {target}"
            )));
        }
        Ok(())
    }

    fn rule_for(&self, event_type: &str, from: u16, to: u16) -> Option<&dyn ConversionRule> {
        let table = if to > from { &self.upcasts } else { &self.downcasts };
        table
            .get(&(event_type.to_owned(), from))
            .map(Box::as_ref)
    }

    /// Returns true only if every single-step hop between `from` and `to`
    /// has a registered rule for this event type. Checked before any
    /// transformation runs so a missing hop in the middle of a chain fails
    /// fast with zero partial mutation.
    pub fn can_convert(&self, event_type: &str, from: u16, to: u16) -> bool {
        hops(from, to)
            .into_iter()
            .all(|(step_from, step_to)| self.rule_for(event_type, step_from, step_to).is_some())
    }

    /// Applies exactly one adjacent-version conversion step.
    pub fn convert_one_step(
        &self,
        event_type: &str,
        payload: Value,
        from: u16,
        to: u16,
    ) -> Result<Value> {
        if from.abs_diff(to) != 1 {
            return Err(Error::Validation(format!(
                "conversion steps span exactly one version, requested {from} -> {to}"
            )));
        }
        let rule = self
            .rule_for(event_type, from, to)
            .ok_or_else(|| Error::ConversionPath {
                event_type: event_type.to_owned(),
                from,
                to,
            })?;
        rule.convert(payload)
    }
}

/// The adjacent (from, to) pairs walking from one version to another.
fn hops(from: u16, to: u16) -> Vec<(u16, u16)> {
    if to > from {
        (from..to).map(|v| (v, v + 1)).collect()
    } else {
        (to..from).rev().map(|v| (v + 1, v)).collect()
    }
}
