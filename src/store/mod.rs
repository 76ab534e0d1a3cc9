//! The event store boundary.
//!
//! The durable store itself is an external collaborator; this module
//! specifies the contract the core consumes and ships an in-memory
//! implementation behind the default `in-memory` feature.

use async_trait::async_trait;

use crate::Result;
use crate::event::{DomainEvent, RawEventRecord};

#[cfg(feature = "in-memory")]
pub mod in_memory;

/// The trait for event stores.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends events to an aggregate's stream.
    ///
    /// Must be atomic, and must fail with [`crate::Error::Conflict`] when
    /// `expected_version` does not equal the stream's current length; that
    /// is the optimistic concurrency check guarding every save.
    async fn append(
        &self,
        aggregate_id: &str,
        expected_version: i64,
        events: Vec<DomainEvent>,
    ) -> Result<()>;

    /// Loads the full raw stream for an aggregate, in the exact order the
    /// events were appended.
    async fn load(&self, aggregate_id: &str) -> Result<Vec<RawEventRecord>>;
}
