//! Like and view counters for works and chapters.
//!
//! Likes are remembered per device (durable store, key `<table>:<id>`), views
//! per browsing session (session store, key `viewed:<table>:<id>`). Every
//! change updates local state first and then queues an absolute "set count"
//! command for the backend; failures there never reach the reader.

use crate::counter::{CounterCommand, CounterField, CounterOutbox};
use crate::store::KeyValueStore;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, info, warn};
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum EntityKind {
    Work,
    Chapter,
}

impl EntityKind {
    /// Backend table holding this kind of entity.
    pub fn table(self) -> &'static str {
        match self {
            EntityKind::Work => "works",
            EntityKind::Chapter => "chapters",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityKey {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    fn like_key(&self) -> String {
        self.to_string()
    }

    fn view_key(&self) -> String {
        format!("viewed:{self}")
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.table(), self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct EngagementState {
    pub liked: bool,
    #[ts(type = "number")]
    pub displayed_count: i64,
}

pub struct EngagementCounter<D: KeyValueStore, S: KeyValueStore> {
    durable: D,
    session: S,
    outbox: CounterOutbox,
    states: HashMap<EntityKey, EngagementState>,
    // Backs up the session store when it cannot be written.
    counted: HashSet<EntityKey>,
}

impl<D: KeyValueStore, S: KeyValueStore> EngagementCounter<D, S> {
    pub fn new(durable: D, session: S, outbox: CounterOutbox) -> Self {
        Self {
            durable,
            session,
            outbox,
            states: HashMap::new(),
            counted: HashSet::new(),
        }
    }

    /// Hydrate (or re-hydrate) an entity from its last known server count.
    pub fn get_state(&mut self, kind: EntityKind, id: &str, initial_count: i64) -> EngagementState {
        let key = EntityKey::new(kind, id);
        let liked = self.is_liked_on_device(&key);
        let state = EngagementState {
            liked,
            displayed_count: initial_count,
        };
        self.states.insert(key, state);
        state
    }

    /// Current local state, if the entity was hydrated.
    pub fn state(&self, kind: EntityKind, id: &str) -> Option<EngagementState> {
        self.states.get(&EntityKey::new(kind, id)).copied()
    }

    pub fn toggle(&mut self, kind: EntityKind, id: &str) -> EngagementState {
        let key = EntityKey::new(kind, id);
        let current = match self.states.get(&key) {
            Some(state) => *state,
            None => {
                warn!(entity = %key, "Toggling an entity that was never hydrated; assuming count 0");
                EngagementState {
                    liked: self.is_liked_on_device(&key),
                    displayed_count: 0,
                }
            }
        };

        let liked = !current.liked;
        let next = EngagementState {
            liked,
            displayed_count: current.displayed_count + if liked { 1 } else { -1 },
        };
        self.states.insert(key.clone(), next);

        let stored = if liked {
            self.durable.set(&key.like_key(), "1")
        } else {
            self.durable.remove(&key.like_key())
        };
        if let Err(err) = stored {
            warn!(entity = %key, "Failed to persist like flag: {err:#}");
        }

        info!(entity = %key, liked, count = next.displayed_count, "Like toggled");
        self.outbox.submit(CounterCommand {
            entity: key,
            field: CounterField::LikeCount,
            value: next.displayed_count,
        });
        next
    }

    pub fn has_view_record(&self, kind: EntityKind, id: &str) -> bool {
        let key = EntityKey::new(kind, id);
        if self.counted.contains(&key) {
            return true;
        }
        match self.session.get(&key.view_key()) {
            Ok(record) => record.is_some(),
            Err(err) => {
                debug!(entity = %key, "View record unreadable, treating as absent: {err:#}");
                false
            }
        }
    }

    /// Count a view at most once per session. Returns true if a remote
    /// update was queued.
    pub fn record_view(&mut self, kind: EntityKind, id: &str, current_count: i64) -> bool {
        if self.has_view_record(kind, id) {
            debug!(kind = kind.table(), id, "View already counted this session");
            return false;
        }
        let key = EntityKey::new(kind, id);
        if let Err(err) = self.session.set(&key.view_key(), "1") {
            warn!(entity = %key, "Failed to write view record: {err:#}");
        }
        self.counted.insert(key.clone());
        let value = current_count + 1;
        info!(entity = %key, count = value, "Recording view");
        self.outbox.submit(CounterCommand {
            entity: key,
            field: CounterField::ViewCount,
            value,
        })
    }

    /// Adopt a freshly fetched authoritative count for a hydrated entity.
    pub fn reconcile(
        &mut self,
        kind: EntityKind,
        id: &str,
        authoritative_count: i64,
    ) -> Option<EngagementState> {
        let key = EntityKey::new(kind, id);
        let state = self.states.get_mut(&key)?;
        if state.displayed_count != authoritative_count {
            debug!(
                entity = %key,
                local = state.displayed_count,
                remote = authoritative_count,
                "Reconciling drifted like count"
            );
            state.displayed_count = authoritative_count;
        }
        Some(*state)
    }

    /// Stop the outbox, waiting for queued updates to be attempted.
    pub fn flush(self) {
        self.outbox.shutdown();
    }

    fn is_liked_on_device(&self, key: &EntityKey) -> bool {
        match self.durable.get(&key.like_key()) {
            Ok(value) => value.as_deref() == Some("1"),
            Err(err) => {
                debug!(entity = %key, "Like flag unreadable, treating as not liked: {err:#}");
                false
            }
        }
    }
}
