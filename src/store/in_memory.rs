//! An in-memory event store, useful for testing and development.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::instrument;

use crate::event::{DomainEvent, RawEventRecord};
use crate::store::EventStore;
use crate::{Error, Result};

/// Thread-safe map of streams keyed by aggregate ID.
type StoreMap = DashMap<String, Vec<DomainEvent>>;

/// An in-memory, thread-safe event store.
///
/// Useful for tests or hosts that do not need durability.
#[derive(Default)]
pub struct InMemoryEventStore {
    events: Arc<StoreMap>,
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    #[instrument(skip(self, events), fields(aggregate.id = %aggregate_id))]
    async fn append(
        &self,
        aggregate_id: &str,
        expected_version: i64,
        events: Vec<DomainEvent>,
    ) -> Result<()> {
        let mut stream = self.events.entry(aggregate_id.to_owned()).or_default();

        let actual = stream.len() as i64;
        if actual != expected_version {
            return Err(Error::Conflict {
                expected: expected_version,
                actual,
            });
        }

        // Validate every position before touching the stream so a bad batch
        // never lands partially.
        for (offset, event) in events.iter().enumerate() {
            let position = expected_version + offset as i64 + 1;
            if event.version() != position {
                return Err(Error::Store(format!(
                    "event version {} does not match stream position {position}",
                    event.version()
                )));
            }
        }
        stream.extend(events);
        Ok(())
    }

    #[instrument(skip(self), fields(aggregate.id = %aggregate_id))]
    async fn load(&self, aggregate_id: &str) -> Result<Vec<RawEventRecord>> {
        match self.events.get(aggregate_id) {
            Some(stream) => Ok(stream.iter().map(RawEventRecord::from).collect()),
            None => Ok(Vec::new()),
        }
    }
}
