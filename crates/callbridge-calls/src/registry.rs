use crate::error::CallError;
use crate::session::CallSession;
use callbridge_types::{Direction, SessionSnapshot};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Maps {
    sessions: HashMap<String, Arc<CallSession>>,
    /// Extra lookup key -> canonical session id.
    aliases: HashMap<String, String>,
}

impl Maps {
    fn resolve<'a>(&'a self, key: &'a str) -> Option<&'a str> {
        if self.sessions.contains_key(key) {
            return Some(key);
        }
        self.aliases.get(key).map(String::as_str)
    }

    fn is_taken(&self, key: &str) -> bool {
        self.sessions.contains_key(key) || self.aliases.contains_key(key)
    }
}

/// Process-wide map of live call sessions.
///
/// A session is reachable by its id and by any alias registered for it
/// (the provider's conversation and call-leg ids). One mutex guards both
/// maps; it is held for map operations only.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    maps: Mutex<Maps>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Maps> {
        self.maps.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers a new session in `Created`.
    pub fn create(
        &self,
        id: &str,
        direction: Direction,
        counterpart: &str,
    ) -> Result<Arc<CallSession>, CallError> {
        let mut maps = self.lock();
        if maps.is_taken(id) {
            return Err(CallError::DuplicateSession(id.to_string()));
        }
        let session = Arc::new(CallSession::new(id, direction, counterpart));
        maps.sessions.insert(id.to_string(), session.clone());
        Ok(session)
    }

    /// Makes `alias` resolve to the session `id`.
    pub fn alias(&self, alias: &str, id: &str) -> Result<(), CallError> {
        let mut maps = self.lock();
        if !maps.sessions.contains_key(id) {
            return Err(CallError::NotFound(id.to_string()));
        }
        if alias == id {
            return Ok(());
        }
        if maps.sessions.contains_key(alias) {
            return Err(CallError::DuplicateSession(alias.to_string()));
        }
        match maps.aliases.get(alias) {
            Some(existing) if existing != id => {
                Err(CallError::DuplicateSession(alias.to_string()))
            }
            Some(_) => Ok(()),
            None => {
                maps.aliases.insert(alias.to_string(), id.to_string());
                Ok(())
            }
        }
    }

    /// Looks a session up by id or alias.
    pub fn get(&self, key: &str) -> Option<Arc<CallSession>> {
        let maps = self.lock();
        let id = maps.resolve(key)?;
        maps.sessions.get(id).cloned()
    }

    /// Removes a session and every alias pointing at it.
    pub fn remove(&self, key: &str) -> Option<Arc<CallSession>> {
        let mut maps = self.lock();
        let id = maps.resolve(key)?.to_string();
        let session = maps.sessions.remove(&id)?;
        maps.aliases.retain(|_, target| *target != id);
        Some(session)
    }

    /// All live sessions.
    pub fn sessions(&self) -> Vec<Arc<CallSession>> {
        self.lock().sessions.values().cloned().collect()
    }

    /// Point-in-time copies of every live session.
    pub fn list(&self) -> Vec<SessionSnapshot> {
        // Snapshots take each session's own lock; collect first so the map
        // lock is not held while doing so.
        self.sessions().iter().map(|s| s.snapshot()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
