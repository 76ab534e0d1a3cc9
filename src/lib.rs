//! # Palisade event-sourcing substrate
//!
//! `palisade-events` is the event-sourcing core of the Palisade game
//! backend. Aggregates derive their state by replaying an ordered log of
//! immutable domain events, and a schema-evolution layer lets the stored
//! event format change over the application's lifetime without breaking
//! replay of history.
//!
//! ## Core Concepts
//!
//! - **[`DomainEvent`]**: an immutable fact with causal metadata and an
//!   auditable checksum.
//! - **[`AggregateRoot`]**: a consistency boundary that folds its event
//!   stream into state and tracks uncommitted events.
//! - **[`VersionManager`]**: detects which schema version a stored event was
//!   encoded with and converts events between versions through chains of
//!   single-step upcast/downcast rules.
//! - **[`EventStore`]**: the append/load boundary, guarded by optimistic
//!   concurrency checks.
//! - **[`EventRepository`]**: the load-replay / append-commit cycle,
//!   hydrating stored events through the version manager.
//!
//! ## Example
//!
//! ```rust
//! use palisade_events::schema;
//! use serde_json::json;
//!
//! # fn main() -> palisade_events::Result<()> {
//! // The registry for the player-account event family, schema versions 1-3.
//! let versions = schema::registry()?;
//!
//! // A raw event as it came out of the store, tagged as the oldest schema.
//! let metadata = serde_json::Map::from_iter([("version".to_owned(), json!("1.0"))]);
//! let event = versions.create_event_from_raw_data(
//!     schema::USER_CREATED,
//!     "player-1",
//!     json!({"user_id": "u1", "name": "Jo Lee", "email": "jo@x.com"}),
//!     metadata,
//! )?;
//!
//! // Normalize it to the newest schema for replay.
//! let latest = versions.convert_to_version(&event, versions.latest_version())?;
//! assert_eq!(latest.payload()["contact_info"]["primary_email"], "jo@x.com");
//! assert_eq!(latest.payload()["personal_info"]["full_name"]["first_name"], "Jo");
//! # Ok(())
//! # }
//! ```
#![deny(missing_docs)]

pub mod aggregate;
pub mod event;
pub mod repository;
pub mod schema;
pub mod store;
pub mod versioning;

pub use aggregate::{AggregateRoot, AggregateState};
pub use event::{DomainEvent, EventCategory, EventPriority, EventRecord, RawEventRecord};
pub use repository::EventRepository;
pub use store::EventStore;
pub use versioning::{VersionInfo, VersionManager, VersionManagerBuilder};

/// The error type for this crate.
#[derive(Debug, thiserror::Error, Clone)]
pub enum Error {
    /// The optimistic version check failed at the store boundary. Not fatal:
    /// the caller is expected to reload the aggregate and retry.
    #[error("concurrency conflict: expected stream version {expected}, found {actual}")]
    Conflict {
        /// The stream version the writer expected to find.
        expected: i64,
        /// The stream version actually recorded by the store.
        actual: i64,
    },
    /// The aggregate has no stored events.
    #[error("aggregate not found")]
    NotFound,
    /// Wraps an error from the underlying event store.
    #[error("event store error: {0}")]
    Store(String),
    /// A constructed event violates a required invariant.
    #[error("validation error: {0}")]
    Validation(String),
    /// No schema factory is registered for the detected version.
    #[error("no schema factory registered for version {0}")]
    UnsupportedVersion(u16),
    /// A version's factory does not recognize the requested event type.
    #[error("schema version {version} does not support event type `{event_type}`")]
    UnsupportedEventType {
        /// The schema version whose factory was consulted.
        version: u16,
        /// The event type the factory did not recognize.
        event_type: String,
    },
    /// Some hop in a multi-step conversion chain has no registered rule.
    /// Raised before any transform runs, so the input is never partially
    /// converted.
    #[error("no conversion path for `{event_type}` from version {from} to {to}")]
    ConversionPath {
        /// The event type being converted.
        event_type: String,
        /// The version the chain starts from.
        from: u16,
        /// The version the chain should reach.
        to: u16,
    },
    /// A single conversion step failed.
    #[error("converting `{event_type}` from version {from} to {to} failed: {reason}")]
    Conversion {
        /// The event type being converted.
        event_type: String,
        /// The source version of the failing hop.
        from: u16,
        /// The target version of the failing hop.
        to: u16,
        /// What went wrong inside the rule.
        reason: String,
    },
    /// An unrecognized event type was encountered while reconstructing an
    /// aggregate from history. The aggregate cannot be correctly rebuilt, so
    /// this is fatal for that load.
    #[error("replay error: {0}")]
    Replay(String),
}

/// A specialized `Result` type for this crate's operations.
pub type Result<T> = std::result::Result<T, Error>;
