//! Loading and saving aggregates through the versioning layer.

use std::{marker::PhantomData, sync::Arc};

use tracing::instrument;

use crate::aggregate::{AggregateRoot, AggregateState};
use crate::store::EventStore;
use crate::versioning::VersionManager;
use crate::{Error, Result};

/// Orchestrates the load-replay / append-commit cycle for one aggregate
/// type.
///
/// On load, every stored record is hydrated through the version manager
/// (detect then factory-create) and, by default, normalized to the latest
/// schema version before the replay fold. On save, pending events are
/// appended under the optimistic version check; a conflict propagates so the
/// caller can reload and retry.
pub struct EventRepository<S, ES>
where
    S: AggregateState,
    ES: EventStore,
{
    store: Arc<ES>,
    versions: Arc<VersionManager>,
    normalize_to_latest: bool,
    _phantom: PhantomData<S>,
}

impl<S, ES> EventRepository<S, ES>
where
    S: AggregateState,
    ES: EventStore,
{
    /// Creates a repository that normalizes loaded events to the latest
    /// schema version.
    pub fn new(store: Arc<ES>, versions: Arc<VersionManager>) -> Self {
        Self {
            store,
            versions,
            normalize_to_latest: true,
            _phantom: PhantomData,
        }
    }

    /// Controls whether loaded events are upcast to the latest schema
    /// version before replay. Disable when the aggregate's `apply` switch
    /// handles historical shapes itself.
    #[must_use]
    pub fn with_normalization(mut self, normalize_to_latest: bool) -> Self {
        self.normalize_to_latest = normalize_to_latest;
        self
    }

    /// Loads an aggregate by replaying its stored stream.
    #[instrument(skip(self), fields(aggregate.id = %id))]
    pub async fn load(&self, id: &str) -> Result<AggregateRoot<S>> {
        let raw_events = self.store.load(id).await?;
        if raw_events.is_empty() {
            return Err(Error::NotFound);
        }

        let mut events = Vec::with_capacity(raw_events.len());
        for raw in &raw_events {
            let event = self.versions.create_event_from_raw(raw)?;
            let event = if self.normalize_to_latest {
                self.versions
                    .convert_to_version(&event, self.versions.latest_version())?
            } else {
                event
            };
            events.push(event);
        }

        AggregateRoot::replay(id, events)
    }

    /// Appends the aggregate's pending events under the optimistic version
    /// check, then marks them committed. A no-op when nothing is pending.
    #[instrument(skip(self, root), fields(aggregate.id = %root.id()))]
    pub async fn save(&self, root: &mut AggregateRoot<S>) -> Result<()> {
        if root.pending_events().is_empty() {
            return Ok(());
        }
        self.store
            .append(
                root.id(),
                root.original_version(),
                root.pending_events().to_vec(),
            )
            .await?;
        root.mark_committed();
        Ok(())
    }
}
