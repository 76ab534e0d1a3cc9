//! Per-version event schema factories.

use crate::Result;
use crate::event::{DomainEvent, RawEventRecord};

/// Materializes concrete domain events for one schema version.
///
/// A factory knows the set of event types its version can construct and how
/// to validate a raw payload against that version's shape. Registering a new
/// schema version means registering one factory plus the two conversion
/// rules connecting it to its immediate neighbor; no existing version's code
/// changes.
pub trait EventSchemaFactory: Send + Sync {
    /// The schema version this factory materializes.
    fn version(&self) -> u16;

    /// The event types this version can construct.
    fn event_types(&self) -> &'static [&'static str];

    /// Whether this version can construct the given event type.
    fn supports(&self, event_type: &str) -> bool {
        self.event_types().contains(&event_type)
    }

    /// Validates the raw record against this version's shape and builds the
    /// concrete domain event.
    fn create(&self, raw: &RawEventRecord) -> Result<DomainEvent>;
}
