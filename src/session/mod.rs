//! Session registry: maps caller-facing session ids to the agent's own
//! continuation handles.
//!
//! Each session has its own async lock. A [`SessionTurn`] holds that lock for
//! the whole run, so two continuations of the same conversation execute one
//! after the other while distinct sessions run in parallel. The id map itself
//! sits behind a short-lived sync lock that is never held across an await.
//!
//! Entries live for the lifetime of the process; there is no eviction.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// What the registry remembers about a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionEntry {
    /// Handle the agent binary understands for resuming.
    pub handle: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Completed runs recorded against this session.
    pub turns: u64,
}

impl SessionEntry {
    fn new(handle: String) -> Self {
        let now = Utc::now();
        Self {
            handle,
            created_at: now,
            updated_at: now,
            turns: 1,
        }
    }

    fn advance(&mut self, handle: Option<String>) {
        if let Some(handle) = handle {
            self.handle = handle;
        }
        self.updated_at = Utc::now();
        self.turns += 1;
    }
}

type Slot = Arc<AsyncMutex<SessionEntry>>;

/// Exclusive access to one conversation for the duration of a run.
///
/// For a new conversation there is nothing to lock: the id was just minted
/// and nobody else can know it yet. Dropping a turn without committing
/// releases the lock and records nothing.
pub struct SessionTurn<'a> {
    registry: &'a SessionRegistry,
    id: String,
    guard: Option<OwnedMutexGuard<SessionEntry>>,
}

impl SessionTurn<'_> {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The entry being continued, if any.
    pub fn entry(&self) -> Option<&SessionEntry> {
        self.guard.as_deref()
    }

    pub fn is_new(&self) -> bool {
        self.guard.is_none()
    }

    /// Finish the turn, recording the continuation handle the run produced.
    ///
    /// A continued session keeps its previous handle when the run produced
    /// none. A new conversation is only registered once a handle exists.
    /// Returns the session id the caller should use next time.
    pub fn commit(self, handle: Option<String>) -> String {
        let SessionTurn {
            registry,
            id,
            guard,
        } = self;
        match guard {
            Some(mut entry) => entry.advance(handle),
            None => {
                if let Some(handle) = handle {
                    tracing::debug!(session_id = %id, "session created");
                    registry.slots.lock().insert(
                        id.clone(),
                        Arc::new(AsyncMutex::new(SessionEntry::new(handle))),
                    );
                }
            }
        }
        id
    }
}

/// Process-wide session id -> continuation handle map.
#[derive(Default)]
pub struct SessionRegistry {
    slots: Mutex<HashMap<String, Slot>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a turn. A known id locks that session (waiting behind any run
    /// already in flight for it); an absent or unknown id starts a fresh
    /// conversation under a newly generated id.
    pub async fn resolve(&self, session_id: Option<&str>) -> SessionTurn<'_> {
        let known = session_id.and_then(|id| {
            let slots = self.slots.lock();
            slots.get(id).map(|slot| (id.to_string(), Arc::clone(slot)))
        });

        match known {
            Some((id, slot)) => {
                let guard = slot.lock_owned().await;
                SessionTurn {
                    registry: self,
                    id,
                    guard: Some(guard),
                }
            }
            None => {
                if let Some(id) = session_id {
                    tracing::debug!(session_id = %id, "unknown session id, starting new conversation");
                }
                SessionTurn {
                    registry: self,
                    id: new_session_id(),
                    guard: None,
                }
            }
        }
    }

    /// Record `handle` for `session_id` outside of a turn, creating the entry
    /// if it does not exist. Waits for any in-flight turn on that session.
    pub async fn update(&self, session_id: &str, handle: String) {
        let existing = self.slots.lock().get(session_id).cloned();
        match existing {
            Some(slot) => slot.lock().await.advance(Some(handle)),
            None => {
                self.slots
                    .lock()
                    .entry(session_id.to_string())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(SessionEntry::new(handle))));
            }
        }
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.slots.lock().contains_key(session_id)
    }

    /// Current entry for `session_id`, waiting for any turn in flight.
    pub async fn get(&self, session_id: &str) -> Option<SessionEntry> {
        let slot = self.slots.lock().get(session_id).cloned()?;
        let entry = slot.lock().await;
        Some(entry.clone())
    }

    /// Every entry, sorted by id. Waits for turns in flight.
    pub async fn snapshot(&self) -> Vec<(String, SessionEntry)> {
        let mut slots: Vec<(String, Slot)> = self
            .slots
            .lock()
            .iter()
            .map(|(id, slot)| (id.clone(), Arc::clone(slot)))
            .collect();
        slots.sort_by(|a, b| a.0.cmp(&b.0));

        let mut entries = Vec::with_capacity(slots.len());
        for (id, slot) in slots {
            let entry = slot.lock().await.clone();
            entries.push((id, entry));
        }
        entries
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
