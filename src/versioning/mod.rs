//! The schema-evolution layer: version detection, per-version factories and
//! conversion chains, orchestrated by the [`VersionManager`].

pub mod convert;
pub mod detect;
pub mod factory;

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::event::{DomainEvent, RawEventRecord};
use crate::{Error, Result};
use convert::{ConversionRegistry, ConversionRule};
use detect::{StructuralRule, VersionDetector};
use factory::EventSchemaFactory;

/// Introspection data for one registered schema version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    /// The schema version described.
    pub version: u16,
    /// The event types this version can construct.
    pub event_types: Vec<&'static str>,
    /// Newer versions reachable by upcasting every supported event type.
    pub upcast_targets: Vec<u16>,
    /// Older versions reachable by downcasting every supported event type.
    pub downcast_targets: Vec<u16>,
}

/// Builds a [`VersionManager`] from registered factories, conversion rules
/// and structural detection rules.
#[derive(Default)]
pub struct VersionManagerBuilder {
    factories: HashMap<u16, Box<dyn EventSchemaFactory>>,
    rules: Vec<Box<dyn ConversionRule>>,
    structural_rules: Vec<(u16, StructuralRule)>,
}

impl VersionManagerBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the schema factory for one version.
    #[must_use]
    pub fn with_factory(mut self, factory: impl EventSchemaFactory + 'static) -> Self {
        self.factories.insert(factory.version(), Box::new(factory));
        self
    }

    /// Registers one adjacent-version conversion rule.
    #[must_use]
    pub fn with_rule(mut self, rule: impl ConversionRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Registers a structural detection rule for one version, consulted when
    /// an event carries no explicit version tag.
    #[must_use]
    pub fn with_structural_rule(mut self, version: u16, rule: StructuralRule) -> Self {
        self.structural_rules.push((version, rule));
        self
    }

    /// Finalizes the registration tables.
    ///
    /// Fails when no factory is registered or when a conversion rule spans
    /// more than one version step. The resulting manager is immutable and
    /// safe to share across concurrent operations.
    pub fn build(self) -> Result<VersionManager> {
        let oldest = self
            .factories
            .keys()
            .min()
            .copied()
            .ok_or_else(|| Error::Validation("at least one schema factory is required".into()))?;
        let latest = self
            .factories
            .keys()
            .max()
            .copied()
            .unwrap_or(oldest);
        let mut registry = ConversionRegistry::default();
        for rule in self.rules {
            registry.register(rule)?;
        }
        Ok(VersionManager {
            factories: self.factories,
            registry,
            detector: VersionDetector::new(self.structural_rules, oldest),
            oldest,
            latest,
        })
    }
}

/// Orchestrates version detection, factories and conversion chains.
///
/// Stateless after construction: its only shared state is the read-only
/// table of registered rules and factories, so every operation is a
/// synchronous, CPU-only transform safe to call from many operations at
/// once.
pub struct VersionManager {
    factories: HashMap<u16, Box<dyn EventSchemaFactory>>,
    registry: ConversionRegistry,
    detector: VersionDetector,
    oldest: u16,
    latest: u16,
}

impl VersionManager {
    /// Determines which schema version a decoded payload and its metadata
    /// were encoded with; falls back to the oldest supported version when no
    /// signal matches.
    pub fn detect_version(&self, payload: &Value, metadata: &Map<String, Value>) -> u16 {
        self.detector.detect(payload, metadata)
    }

    /// Converts an event to the target schema version through a chain of
    /// single-step rules.
    ///
    /// Returns a clone of the input when it is already at the target
    /// (identity no-op). The whole path is checked before the first
    /// transform runs, so a missing hop never leaves a partially converted
    /// value; the input event is never mutated.
    pub fn convert_to_version(&self, event: &DomainEvent, target: u16) -> Result<DomainEvent> {
        if !self.is_version_supported(target) {
            return Err(Error::UnsupportedVersion(target));
        }
        let current = self.detect_version(event.payload(), event.metadata());
        if current == target {
            return Ok(event.clone());
        }
        let event_type = event.event_type();
        if !self.registry.can_convert(event_type, current, target) {
            return Err(Error::ConversionPath {
                event_type: event_type.to_owned(),
                from: current,
                to: target,
            });
        }
        let mut version = current;
        let mut payload = event.payload().clone();
        while version != target {
            let next = if target > version { version + 1 } else { version - 1 };
            payload = self
                .registry
                .convert_one_step(event_type, payload, version, next)?;
            version = next;
        }
        Ok(event.with_converted_payload(payload, target))
    }

    /// Hydrates a stored wire record into a concrete domain event: detect
    /// the version, look up that version's factory, materialize.
    pub fn create_event_from_raw(&self, raw: &RawEventRecord) -> Result<DomainEvent> {
        let version = self.detect_version(&raw.payload, &raw.metadata);
        let factory = self
            .factories
            .get(&version)
            .ok_or(Error::UnsupportedVersion(version))?;
        if !factory.supports(&raw.event_type) {
            return Err(Error::UnsupportedEventType {
                version,
                event_type: raw.event_type.clone(),
            });
        }
        factory.create(raw)
    }

    /// Convenience wrapper over [`Self::create_event_from_raw`] for an event
    /// that is not yet part of a stream; it materializes at stream
    /// position 1.
    pub fn create_event_from_raw_data(
        &self,
        event_type: &str,
        aggregate_id: &str,
        payload: Value,
        metadata: Map<String, Value>,
    ) -> Result<DomainEvent> {
        let raw = RawEventRecord::new(event_type, aggregate_id, payload, metadata);
        self.create_event_from_raw(&raw)
    }

    /// All registered schema versions, ascending.
    pub fn supported_versions(&self) -> Vec<u16> {
        let mut versions: Vec<u16> = self.factories.keys().copied().collect();
        versions.sort_unstable();
        versions
    }

    /// The newest registered schema version.
    pub fn latest_version(&self) -> u16 {
        self.latest
    }

    /// The oldest registered schema version; also the detector's fallback.
    pub fn oldest_version(&self) -> u16 {
        self.oldest
    }

    /// Whether a factory is registered for the given version.
    pub fn is_version_supported(&self, version: u16) -> bool {
        self.factories.contains_key(&version)
    }

    /// Describes one version: its event types and which other versions every
    /// one of those event types can reach by up/down conversion.
    pub fn version_info(&self, version: u16) -> Result<VersionInfo> {
        let factory = self
            .factories
            .get(&version)
            .ok_or(Error::UnsupportedVersion(version))?;
        let event_types = factory.event_types().to_vec();
        let mut upcast_targets = Vec::new();
        let mut downcast_targets = Vec::new();
        for candidate in self.supported_versions() {
            if candidate == version {
                continue;
            }
            let reachable = event_types
                .iter()
                .all(|event_type| self.registry.can_convert(event_type, version, candidate));
            if !reachable {
                continue;
            }
            if candidate > version {
                upcast_targets.push(candidate);
            } else {
                downcast_targets.push(candidate);
            }
        }
        Ok(VersionInfo {
            version,
            event_types,
            upcast_targets,
            downcast_targets,
        })
    }

    /// Whether every hop between the two versions has a registered rule for
    /// the given event type.
    pub fn can_convert(&self, event_type: &str, from: u16, to: u16) -> bool {
        self.registry.can_convert(event_type, from, to)
    }
}
