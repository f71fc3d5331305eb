// src/engine/session.rs

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, RwLock},
};

use tokio::sync::Mutex;

use crate::{
    engine::tracker::AttemptTracker,
    error::{AppError, AppResult},
};

/// Identifies a live session: one in-progress attempt per user and quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub user_id: i64,
    pub quiz_id: i64,
}

/// Tracker of one attempt, locked for every read-judge-persist sequence.
pub type SharedTracker = Arc<Mutex<AttemptTracker>>;

#[derive(Default)]
struct Sessions {
    by_key: HashMap<SessionKey, (i64, SharedTracker)>,
    by_attempt: HashMap<i64, SessionKey>,
    // Keys whose attempt is being created.
    reserved: HashSet<SessionKey>,
}

impl Sessions {
    fn ensure_free(&self, key: SessionKey) -> AppResult<()> {
        if let Some((live_id, _)) = self.by_key.get(&key) {
            return Err(AppError::InvalidState(format!(
                "User {} already has attempt {} in progress for quiz {}",
                key.user_id, live_id, key.quiz_id
            )));
        }
        if self.reserved.contains(&key) {
            return Err(AppError::InvalidState(format!(
                "User {} is already starting quiz {}",
                key.user_id, key.quiz_id
            )));
        }
        Ok(())
    }

    fn insert(&mut self, key: SessionKey, attempt_id: i64, tracker: AttemptTracker) -> SharedTracker {
        let shared = Arc::new(Mutex::new(tracker));
        self.by_key.insert(key, (attempt_id, shared.clone()));
        self.by_attempt.insert(attempt_id, key);
        shared
    }
}

/// Claim on a session key while the attempt behind it is being stored.
/// Dropping it without `open` frees the key again.
pub struct Reservation<'a> {
    store: &'a SessionStore,
    key: SessionKey,
}

impl Reservation<'_> {
    /// Registers the tracker of the freshly stored attempt under the reserved key.
    pub fn open(self, tracker: AttemptTracker) -> AppResult<SharedTracker> {
        let attempt = tracker.attempt();
        if attempt.user_id != self.key.user_id || attempt.quiz_id != self.key.quiz_id {
            return Err(AppError::InvalidState(format!(
                "Attempt {} does not belong to the reserved session",
                attempt.id
            )));
        }
        let attempt_id = attempt.id;
        let mut sessions = self.store.write();
        sessions.reserved.remove(&self.key);
        Ok(sessions.insert(self.key, attempt_id, tracker))
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.store.write().reserved.remove(&self.key);
    }
}

/// Live attempts of the process.
///
/// Created when an attempt starts, removed on completion or cancellation.
/// The map lock is never held across an `.await`; callers lock the returned
/// tracker instead.
#[derive(Default)]
pub struct SessionStore {
    inner: RwLock<Sessions>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the key for a new attempt. Fails if the user already has a live
    /// attempt for the quiz or is starting one right now.
    pub fn reserve(&self, key: SessionKey) -> AppResult<Reservation<'_>> {
        let mut sessions = self.write();
        sessions.ensure_free(key)?;
        sessions.reserved.insert(key);
        Ok(Reservation { store: self, key })
    }

    /// Registers the tracker of an attempt that already exists in storage.
    /// Reopening the same attempt hands back the tracker already registered.
    pub fn open(&self, tracker: AttemptTracker) -> AppResult<SharedTracker> {
        let attempt = tracker.attempt();
        let key = SessionKey {
            user_id: attempt.user_id,
            quiz_id: attempt.quiz_id,
        };
        let attempt_id = attempt.id;

        let mut sessions = self.write();
        if let Some((live_id, live)) = sessions.by_key.get(&key) {
            if *live_id == attempt_id {
                return Ok(live.clone());
            }
        }
        sessions.ensure_free(key)?;
        Ok(sessions.insert(key, attempt_id, tracker))
    }

    /// Attempt id of the live session for the key, if any.
    pub fn live_attempt(&self, key: SessionKey) -> Option<i64> {
        self.read().by_key.get(&key).map(|(id, _)| *id)
    }

    pub fn get(&self, attempt_id: i64) -> Option<SharedTracker> {
        let sessions = self.read();
        let key = sessions.by_attempt.get(&attempt_id)?;
        sessions.by_key.get(key).map(|(_, tracker)| tracker.clone())
    }

    /// Drops the session of an attempt. Returns whether one existed.
    pub fn close(&self, attempt_id: i64) -> bool {
        let mut sessions = self.write();
        match sessions.by_attempt.remove(&attempt_id) {
            Some(key) => {
                sessions.by_key.remove(&key);
                true
            }
            None => false,
        }
    }

    /// Drops every session of a quiz. Returns how many were closed.
    pub fn close_quiz(&self, quiz_id: i64) -> usize {
        let mut sessions = self.write();
        let ids: Vec<i64> = sessions
            .by_key
            .iter()
            .filter(|(k, _)| k.quiz_id == quiz_id)
            .map(|(_, (id, _))| *id)
            .collect();
        sessions.by_key.retain(|k, _| k.quiz_id != quiz_id);
        for id in &ids {
            sessions.by_attempt.remove(id);
        }
        ids.len()
    }

    pub fn len(&self) -> usize {
        self.read().by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A panic while holding the map lock cannot leave it half-updated, so poisoning is ignored.
    fn read(&self) -> std::sync::RwLockReadGuard<'_, Sessions> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Sessions> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}
