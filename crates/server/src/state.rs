//! Shared application state: the session registry plus the store.
//!
//! The whole struct lives behind a single `tokio::sync::Mutex`; every service
//! operation holds the lock for its full duration. That coarse critical
//! section is what makes the at-most-one-login and seat-uniqueness invariants
//! linearizable.

use std::collections::HashMap;

use coachline_protocol::Response;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::session::SessionHandle;
use crate::store::Store;

pub struct AppState {
    /// Live sessions, keyed by employee id. Invariant: at most one entry
    /// per employee.
    sessions: HashMap<i64, SessionHandle>,

    /// Storage collaborator.
    store: Store,
}

impl AppState {
    pub fn new(store: Store) -> Self {
        Self {
            sessions: HashMap::new(),
            store,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    pub fn is_logged_in(&self, employee_id: i64) -> bool {
        self.sessions.contains_key(&employee_id)
    }

    pub fn add_session(&mut self, handle: SessionHandle) {
        self.sessions.insert(handle.employee_id(), handle);
    }

    pub fn remove_session(&mut self, employee_id: i64) -> Option<SessionHandle> {
        self.sessions.remove(&employee_id)
    }

    /// Remove the entry for `employee_id` only if it still points at the
    /// given connection's channel. Returns whether an entry was removed.
    pub fn remove_session_for_channel(
        &mut self,
        employee_id: i64,
        tx: &mpsc::Sender<Response>,
    ) -> bool {
        match self.sessions.get(&employee_id) {
            Some(handle) if handle.uses_channel(tx) => {
                self.sessions.remove(&employee_id);
                true
            }
            _ => false,
        }
    }

    /// Push `response` to every session except `origin_employee_id`.
    ///
    /// Best-effort: a closed channel marks that session as implicitly
    /// disconnected and removes it; a full channel drops this one
    /// notification.
    pub fn broadcast_except(&mut self, origin_employee_id: i64, response: &Response) {
        let mut dead: Vec<i64> = Vec::new();
        for (&employee_id, handle) in &self.sessions {
            if employee_id == origin_employee_id {
                continue;
            }
            match handle.try_push(response.clone()) {
                Ok(()) => {
                    debug!(
                        component = "fanout",
                        event = "fanout.delivered",
                        employee_id,
                        username = handle.username(),
                        kind = response.kind(),
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    dead.push(employee_id);
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        component = "fanout",
                        event = "fanout.dropped_full",
                        employee_id,
                        kind = response.kind(),
                    );
                }
            }
        }
        for employee_id in dead {
            warn!(
                component = "fanout",
                event = "fanout.pruned_dead_session",
                employee_id,
            );
            self.sessions.remove(&employee_id);
        }
    }
}
