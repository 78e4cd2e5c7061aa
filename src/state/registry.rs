//! Directory of live sessions keyed by game code.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use rand::{Rng, rng};
use tokio::sync::Mutex;

use crate::{
    dto::validation::GAME_CODE_LEN,
    state::{effects::Effects, session::GameSession, timers::TimerSupervisor},
};

/// Characters used in game codes; `I`, `O`, `0` and `1` are left out.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// A live session with its lock and timers.
pub struct SessionHandle {
    code: String,
    session: Mutex<GameSession>,
    timers: TimerSupervisor,
}

impl SessionHandle {
    fn new(session: GameSession) -> Self {
        Self {
            code: session.code().to_string(),
            session: Mutex::new(session),
            timers: TimerSupervisor::new(),
        }
    }

    /// Game code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Session state. Mutations of one session are serialized through this lock.
    pub fn session(&self) -> &Mutex<GameSession> {
        &self.session
    }

    /// Timers armed on behalf of this session.
    pub fn timers(&self) -> &TimerSupervisor {
        &self.timers
    }
}

/// Concurrent map of game code to session.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<SessionHandle>>,
}

impl SessionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a fresh code and register the session `build` opens under it.
    ///
    /// The code stays reserved while `build` runs, so two concurrent creations can never share one.
    pub fn create<F>(&self, build: F) -> (Arc<SessionHandle>, Effects)
    where
        F: FnOnce(String) -> (GameSession, Effects),
    {
        let mut rng = rng();
        let slot = loop {
            if let Entry::Vacant(slot) = self.sessions.entry(random_code(&mut rng)) {
                break slot;
            }
        };
        let (session, effects) = build(slot.key().clone());
        let handle = Arc::new(SessionHandle::new(session));
        slot.insert(Arc::clone(&handle));
        (handle, effects)
    }

    /// Session registered under `code`.
    pub fn get(&self, code: &str) -> Option<Arc<SessionHandle>> {
        self.sessions
            .get(code)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Register a restored session unless one already holds its code.
    ///
    /// Returns the registered handle and whether `session` was the one inserted.
    pub fn insert_if_absent(&self, session: GameSession) -> (Arc<SessionHandle>, bool) {
        match self.sessions.entry(session.code().to_string()) {
            Entry::Occupied(existing) => (Arc::clone(existing.get()), false),
            Entry::Vacant(slot) => {
                let handle = Arc::new(SessionHandle::new(session));
                slot.insert(Arc::clone(&handle));
                (handle, true)
            }
        }
    }

    /// Drop `handle` from the registry and cancel its timers. A handle that was already
    /// replaced under the same code is left alone.
    pub fn remove(&self, handle: &Arc<SessionHandle>) -> bool {
        handle.timers.cancel_all();
        self.sessions
            .remove_if(handle.code(), |_, current| Arc::ptr_eq(current, handle))
            .is_some()
    }

    /// Snapshot of every registered session.
    pub fn handles(&self) -> Vec<Arc<SessionHandle>> {
        self.sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

fn random_code(rng: &mut impl Rng) -> String {
    (0..GAME_CODE_LEN)
        .map(|_| char::from(CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())]))
        .collect()
}
