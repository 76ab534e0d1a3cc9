//! Aggregate roots that derive their state by replaying domain events.

use crate::event::DomainEvent;
use crate::{Error, Result};

/// The state half of an aggregate: a pure fold over domain events.
///
/// Implementations switch on [`DomainEvent::event_type`] and mutate their
/// derived fields accordingly. An event type the switch does not recognize
/// means the aggregate cannot be correctly reconstructed, so `apply` must
/// return [`Error::Replay`] rather than silently skipping it.
pub trait AggregateState: Default + Send + Sync {
    /// The aggregate type tag stamped onto this aggregate's events.
    fn aggregate_type() -> &'static str;

    /// Applies one event to the state.
    fn apply(&mut self, event: &DomainEvent) -> Result<()>;

    /// Whether the aggregate has been logically deleted.
    fn is_deleted(&self) -> bool {
        false
    }
}

/// An aggregate instance: derived state plus version bookkeeping.
///
/// Tracks the current version (events applied so far), the original version
/// (what was last confirmed durable) and the pending events produced during
/// the current in-memory transaction. There is no interior locking: each
/// instance is owned by exactly one logical operation at a time, and
/// cross-operation safety comes from the optimistic version check at the
/// store boundary.
#[derive(Debug)]
pub struct AggregateRoot<S: AggregateState> {
    id: String,
    state: S,
    version: i64,
    original_version: i64,
    pending: Vec<DomainEvent>,
    deleted: bool,
}

impl<S: AggregateState> AggregateRoot<S> {
    fn empty(id: String) -> Self {
        Self {
            id,
            state: S::default(),
            version: 0,
            original_version: 0,
            pending: Vec::new(),
            deleted: false,
        }
    }

    /// Creates a fresh aggregate from its creation event.
    ///
    /// The event must carry version 1; afterwards the aggregate is at
    /// version 1 with exactly that event pending.
    pub fn create(event: DomainEvent) -> Result<Self> {
        if event.version() != 1 {
            return Err(Error::Validation(format!(
                "creation event must have version 1, got {}",
                event.version()
            )));
        }
        let mut root = Self::empty(event.aggregate_id().to_owned());
        root.record(event)?;
        Ok(root)
    }

    /// Reconstructs an aggregate by folding its historical stream.
    ///
    /// Events mutate state without joining the pending list; the original
    /// version ends up tracking the last event of the stream. A gap or an
    /// unrecognized event type aborts the load with [`Error::Replay`].
    pub fn replay(id: impl Into<String>, events: Vec<DomainEvent>) -> Result<Self> {
        let mut root = Self::empty(id.into());
        for event in events {
            if event.version() != root.version + 1 {
                return Err(Error::Replay(format!(
                    "gap in event stream for aggregate `{}`: expected version {}, got {}",
                    root.id,
                    root.version + 1,
                    event.version()
                )));
            }
            root.state.apply(&event)?;
            root.deleted = root.state.is_deleted();
            root.version = event.version();
            root.original_version = event.version();
        }
        // Nothing above appends, but a replayed aggregate must never start
        // its life with uncommitted events.
        root.pending.clear();
        Ok(root)
    }

    /// Applies a new business event: state mutates, the event joins the
    /// pending list and the current version increments.
    ///
    /// The event must target this aggregate and carry [`Self::next_version`].
    pub fn record(&mut self, event: DomainEvent) -> Result<()> {
        if event.aggregate_id() != self.id {
            return Err(Error::Validation(format!(
                "event targets aggregate `{}` but was recorded on `{}`",
                event.aggregate_id(),
                self.id
            )));
        }
        if event.version() != self.version + 1 {
            return Err(Error::Validation(format!(
                "out-of-order event for aggregate `{}`: expected version {}, got {}",
                self.id,
                self.version + 1,
                event.version()
            )));
        }
        self.state.apply(&event)?;
        self.deleted = self.state.is_deleted();
        self.pending.push(event);
        self.version += 1;
        Ok(())
    }

    /// Marks the pending events as durable: the original version catches up
    /// with the current version and the pending list clears.
    ///
    /// Called by the repository after a successful append.
    pub fn mark_committed(&mut self) {
        self.original_version = self.version;
        self.pending.clear();
    }

    /// Returns the aggregate ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the derived state.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Returns the number of events applied so far.
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Returns the version last confirmed durable by the store.
    pub fn original_version(&self) -> i64 {
        self.original_version
    }

    /// The stream position the next recorded event must carry.
    pub fn next_version(&self) -> i64 {
        self.version + 1
    }

    /// Returns the uncommitted events awaiting an append.
    pub fn pending_events(&self) -> &[DomainEvent] {
        &self.pending
    }

    /// Whether the aggregate is marked deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}
