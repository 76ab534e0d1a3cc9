//! Integration tests for the aggregate replay engine, the in-memory store
//! and the repository cycle, exercised with a guild aggregate.

use std::sync::Arc;

use serde_json::{Value, json};

use palisade_events::versioning::factory::EventSchemaFactory;
use palisade_events::{
    AggregateRoot, AggregateState, DomainEvent, Error, EventCategory, EventRepository,
    EventStore, RawEventRecord, Result, VersionManager, VersionManagerBuilder,
    store::in_memory::InMemoryEventStore,
};

const GUILD_FOUNDED: &str = "guild_founded";
const MEMBER_JOINED: &str = "member_joined";
const GUILD_DISBANDED: &str = "guild_disbanded";

/// Derived state for a guild aggregate.
#[derive(Debug, Default)]
struct GuildState {
    name: String,
    members: Vec<String>,
    disbanded: bool,
}

impl AggregateState for GuildState {
    fn aggregate_type() -> &'static str {
        "guild"
    }

    fn apply(&mut self, event: &DomainEvent) -> Result<()> {
        match event.event_type() {
            GUILD_FOUNDED => {
                self.name = event.payload()["name"].as_str().unwrap_or_default().to_owned();
            }
            MEMBER_JOINED => {
                if let Some(user_id) = event.payload()["user_id"].as_str() {
                    self.members.push(user_id.to_owned());
                }
            }
            GUILD_DISBANDED => {
                self.disbanded = true;
            }
            other => {
                return Err(Error::Replay(format!("unknown event type `{other}`")));
            }
        }
        Ok(())
    }

    fn is_deleted(&self) -> bool {
        self.disbanded
    }
}

/// Single-version factory for guild events; the repository needs one even
/// when no schema migration has ever happened.
struct GuildFactory;

impl EventSchemaFactory for GuildFactory {
    fn version(&self) -> u16 {
        1
    }

    fn event_types(&self) -> &'static [&'static str] {
        &[GUILD_FOUNDED, MEMBER_JOINED, GUILD_DISBANDED]
    }

    fn create(&self, raw: &RawEventRecord) -> Result<DomainEvent> {
        let mut raw = raw.clone();
        if raw.aggregate_type.is_empty() {
            raw.aggregate_type = "guild".to_owned();
        }
        DomainEvent::from_raw(&raw)
    }
}

fn guild_registry() -> VersionManager {
    VersionManagerBuilder::new()
        .with_factory(GuildFactory)
        .build()
        .expect("guild registry builds")
}

fn guild_event(id: &str, event_type: &str, version: i64, payload: Value) -> DomainEvent {
    DomainEvent::new(event_type, id, "guild", version, payload).expect("valid event")
}

fn founded(id: &str) -> DomainEvent {
    guild_event(id, GUILD_FOUNDED, 1, json!({"name": "Night Watch"}))
}

fn joined(id: &str, version: i64, user_id: &str) -> DomainEvent {
    guild_event(id, MEMBER_JOINED, version, json!({"user_id": user_id}))
}

// -- Events --------------------------------------------------------------

#[test]
fn event_construction_requires_core_fields() {
    let err = DomainEvent::new("", "g-1", "guild", 1, json!({})).expect_err("must fail");
    assert!(matches!(err, Error::Validation(_)));
    assert!(err.to_string().contains("event_type"));

    let err = DomainEvent::new(GUILD_FOUNDED, "", "", 1, json!({})).expect_err("must fail");
    let message = err.to_string();
    assert!(message.contains("aggregate_id"));
    assert!(message.contains("aggregate_type"));
}

#[test]
fn event_construction_rejects_non_positive_version() {
    let err = DomainEvent::new(GUILD_FOUNDED, "g-1", "guild", 0, json!({})).expect_err("must fail");
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn event_ids_never_collide() {
    let a = founded("g-1");
    let b = founded("g-1");
    assert_ne!(a.event_id(), b.event_id());
}

#[test]
fn checksum_is_deterministic_and_ignores_metadata() {
    let mut event = founded("g-1");
    let before = event.checksum();
    assert_eq!(before, event.checksum(), "recomputation is stable");

    event.insert_metadata("annotated_by", json!("ops-tooling"));
    assert_eq!(before, event.checksum(), "metadata is not part of identity");

    let other = founded("g-1");
    assert_ne!(before, other.checksum(), "different event id, different hash");
}

#[test]
fn causal_links_are_carried() {
    let cause = founded("g-1").with_correlation_id("op-7");
    let effect = joined("g-1", 2, "u-1").caused_by(&cause);
    assert_eq!(effect.causation_id(), Some(cause.event_id().to_string().as_str()));
    assert_eq!(effect.correlation_id(), Some("op-7"));
}

#[test]
fn system_events_round_trip_through_the_store() {
    let event = founded("g-1").as_system_event().with_user_id("admin-1");
    assert_eq!(event.category(), EventCategory::System);
    assert!(event.is_system_event());

    let store = InMemoryEventStore::default();
    futures::executor::block_on(store.append("g-1", 0, vec![event])).expect("append");
    let raw = futures::executor::block_on(store.load("g-1"))
        .expect("load")
        .remove(0);
    assert_eq!(raw.metadata.get("system"), Some(&json!(true)));
    assert_eq!(raw.metadata.get("user_id"), Some(&json!("admin-1")));

    let rehydrated = DomainEvent::from_raw(&raw).expect("hydrate");
    assert!(rehydrated.is_system_event());
    assert_eq!(rehydrated.user_id(), Some("admin-1"));
}

// -- Aggregate replay engine ----------------------------------------------

#[test]
fn fresh_aggregate_has_one_pending_event() {
    let root = AggregateRoot::<GuildState>::create(founded("g-1")).expect("create");
    assert_eq!(root.version(), 1);
    assert_eq!(root.original_version(), 0);
    assert_eq!(root.pending_events().len(), 1);
    assert_eq!(root.state().name, "Night Watch");
}

#[test]
fn replay_tracks_stream_and_clears_pending() {
    let events = vec![founded("g-1"), joined("g-1", 2, "u-1"), joined("g-1", 3, "u-2")];
    let root = AggregateRoot::<GuildState>::replay("g-1", events).expect("replay");
    assert_eq!(root.version(), 3);
    assert_eq!(root.original_version(), 3);
    assert!(root.pending_events().is_empty());
    assert_eq!(root.state().members, vec!["u-1", "u-2"]);
}

#[test]
fn record_after_replay_adds_exactly_one_pending_event() {
    let events = vec![founded("g-1"), joined("g-1", 2, "u-1")];
    let mut root = AggregateRoot::<GuildState>::replay("g-1", events).expect("replay");

    root.record(joined("g-1", root.next_version(), "u-2")).expect("record");

    assert_eq!(root.version(), root.original_version() + 1);
    assert_eq!(root.pending_events().len(), 1);
    assert_eq!(root.pending_events()[0].version(), root.version());
}

#[test]
fn replay_fails_loudly_on_unknown_event_type() {
    let events = vec![
        founded("g-1"),
        guild_event("g-1", "guild_teleported", 2, json!({})),
    ];
    let err = AggregateRoot::<GuildState>::replay("g-1", events).expect_err("must fail");
    assert!(matches!(err, Error::Replay(_)));
}

#[test]
fn replay_rejects_gaps_in_the_stream() {
    let events = vec![founded("g-1"), joined("g-1", 3, "u-1")];
    let err = AggregateRoot::<GuildState>::replay("g-1", events).expect_err("must fail");
    assert!(matches!(err, Error::Replay(_)));
}

#[test]
fn record_rejects_out_of_order_events() {
    let mut root = AggregateRoot::<GuildState>::create(founded("g-1")).expect("create");
    let err = root.record(joined("g-1", 5, "u-1")).expect_err("must fail");
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(root.version(), 1, "failed record leaves version untouched");
}

#[test]
fn record_rejects_events_for_other_aggregates() {
    let mut root = AggregateRoot::<GuildState>::create(founded("g-1")).expect("create");
    let err = root.record(joined("g-2", 2, "u-1")).expect_err("must fail");
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn disband_event_marks_the_aggregate_deleted() {
    let mut root = AggregateRoot::<GuildState>::create(founded("g-1")).expect("create");
    assert!(!root.is_deleted());
    root.record(guild_event("g-1", GUILD_DISBANDED, 2, json!({})))
        .expect("record");
    assert!(root.is_deleted());
}

// -- In-memory store -------------------------------------------------------

#[test]
fn store_append_and_load_round_trip() {
    let store = InMemoryEventStore::default();

    futures::executor::block_on(store.append("g-1", 0, vec![founded("g-1")]))
        .expect("append succeeds");
    let stream = futures::executor::block_on(store.load("g-1")).expect("load succeeds");

    assert_eq!(stream.len(), 1);
    assert_eq!(stream[0].event_type, GUILD_FOUNDED);
    assert_eq!(stream[0].version, 1);
}

#[test]
fn store_append_detects_concurrency_conflicts() {
    let store = InMemoryEventStore::default();
    let events = vec![
        founded("g-1"),
        joined("g-1", 2, "u-1"),
        joined("g-1", 3, "u-2"),
        joined("g-1", 4, "u-3"),
    ];
    futures::executor::block_on(store.append("g-1", 0, events)).expect("initial append");

    // A writer that last saw version 3 loses the race against the stream
    // already at 4; no partial event may land.
    let err = futures::executor::block_on(store.append("g-1", 3, vec![joined("g-1", 4, "u-9")]))
        .expect_err("must conflict");
    assert!(matches!(err, Error::Conflict { expected: 3, actual: 4 }));

    let stream = futures::executor::block_on(store.load("g-1")).expect("load");
    assert_eq!(stream.len(), 4, "conflicting append left the stream alone");
}

#[test]
fn store_rejects_misnumbered_batches() {
    let store = InMemoryEventStore::default();
    let err = futures::executor::block_on(store.append("g-1", 0, vec![joined("g-1", 7, "u-1")]))
        .expect_err("must fail");
    assert!(matches!(err, Error::Store(_)));
}

// -- Repository ------------------------------------------------------------

#[test]
fn repository_save_then_load_round_trip() {
    let store = Arc::new(InMemoryEventStore::default());
    let repo: EventRepository<GuildState, _> =
        EventRepository::new(store, Arc::new(guild_registry()));

    let mut root = AggregateRoot::<GuildState>::create(founded("g-1")).expect("create");
    root.record(joined("g-1", 2, "u-1")).expect("record");

    futures::executor::block_on(repo.save(&mut root)).expect("save");
    assert!(root.pending_events().is_empty());
    assert_eq!(root.original_version(), root.version());

    let loaded = futures::executor::block_on(repo.load("g-1")).expect("load");
    assert_eq!(loaded.version(), 2);
    assert_eq!(loaded.original_version(), 2);
    assert_eq!(loaded.state().name, "Night Watch");
    assert_eq!(loaded.state().members, vec!["u-1"]);
}

#[test]
fn repository_load_of_missing_aggregate_is_not_found() {
    let store = Arc::new(InMemoryEventStore::default());
    let repo: EventRepository<GuildState, _> =
        EventRepository::new(store, Arc::new(guild_registry()));

    let err = futures::executor::block_on(repo.load("nope")).expect_err("must fail");
    assert!(matches!(err, Error::NotFound));
}

#[test]
fn repository_surfaces_conflicts_for_caller_retry() {
    let store = Arc::new(InMemoryEventStore::default());
    let repo: EventRepository<GuildState, _> =
        EventRepository::new(store, Arc::new(guild_registry()));

    let mut root = AggregateRoot::<GuildState>::create(founded("g-1")).expect("create");
    futures::executor::block_on(repo.save(&mut root)).expect("save");

    // Two operations load the same aggregate; the first save wins.
    let mut first = futures::executor::block_on(repo.load("g-1")).expect("load");
    let mut second = futures::executor::block_on(repo.load("g-1")).expect("load");

    first.record(joined("g-1", 2, "u-1")).expect("record");
    futures::executor::block_on(repo.save(&mut first)).expect("first save");

    second.record(joined("g-1", 2, "u-2")).expect("record");
    let err = futures::executor::block_on(repo.save(&mut second)).expect_err("must conflict");
    assert!(matches!(err, Error::Conflict { .. }));

    // The loser reloads and retries, as the contract prescribes.
    let mut retried = futures::executor::block_on(repo.load("g-1")).expect("reload");
    retried
        .record(joined("g-1", retried.next_version(), "u-2"))
        .expect("record");
    futures::executor::block_on(repo.save(&mut retried)).expect("retry save");

    let settled = futures::executor::block_on(repo.load("g-1")).expect("load");
    assert_eq!(settled.state().members, vec!["u-1", "u-2"]);
}

#[test]
fn repository_save_with_no_pending_events_is_a_noop() {
    let store = Arc::new(InMemoryEventStore::default());
    let repo: EventRepository<GuildState, _> =
        EventRepository::new(store, Arc::new(guild_registry()));

    let mut root = AggregateRoot::<GuildState>::create(founded("g-1")).expect("create");
    futures::executor::block_on(repo.save(&mut root)).expect("save");
    futures::executor::block_on(repo.save(&mut root)).expect("second save is a noop");

    let loaded = futures::executor::block_on(repo.load("g-1")).expect("load");
    assert_eq!(loaded.version(), 1);
}
