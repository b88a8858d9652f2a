//! Active sessions, indexed by scope.
//!
//! Lookups double as garbage collection: any session in the scope that is no
//! longer live is dropped from the index (and cancelled if it never reached a
//! terminal phase) before the caller sees the result.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use fusion_types::{Participant, ScopeKey, SessionId};

use crate::error::FusionError;
use crate::session::FusionSession;

type SessionMap = HashMap<ScopeKey, Vec<Arc<FusionSession>>>;

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<SessionMap>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, SessionMap> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn next_session_id(&self) -> SessionId {
        SessionId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Index `session` unless its participant already has one in the scope.
    ///
    /// The check and the insert happen under one guard. Dead sessions still
    /// count here; run [`Self::find`] first to reap them.
    pub fn create(&self, session: Arc<FusionSession>) -> Result<(), FusionError> {
        let mut sessions = self.guard();
        let list = sessions.entry(session.scope()).or_default();
        if list
            .iter()
            .any(|held| held.participant() == session.participant())
        {
            return Err(FusionError::AlreadyActive);
        }
        tracing::debug!(session = %session.id(), scope = %session.scope(), "Session registered");
        list.push(session);
        Ok(())
    }

    /// The participant's live session in `scope`, reaping dead ones on the way.
    pub async fn find(
        &self,
        scope: ScopeKey,
        participant: &Participant,
    ) -> Option<Arc<FusionSession>> {
        let snapshot: Vec<Arc<FusionSession>> =
            self.guard().get(&scope).cloned().unwrap_or_default();

        let mut found = None;
        let mut dead = Vec::new();
        for session in snapshot {
            if !session.is_live().await {
                dead.push(session);
            } else if found.is_none() && session.participant() == participant {
                found = Some(session);
            }
        }

        if !dead.is_empty() {
            {
                let mut sessions = self.guard();
                if let Some(list) = sessions.get_mut(&scope) {
                    list.retain(|held| !dead.iter().any(|gone| Arc::ptr_eq(held, gone)));
                    if list.is_empty() {
                        sessions.remove(&scope);
                    }
                }
            }
            for session in &dead {
                tracing::debug!(session = %session.id(), scope = %scope, "Session reaped");
                session.reap().await;
            }
        }
        found
    }

    /// Drop a session from the index without touching its state.
    pub fn remove(&self, session: &Arc<FusionSession>) -> bool {
        let mut sessions = self.guard();
        let Some(list) = sessions.get_mut(&session.scope()) else {
            return false;
        };
        let before = list.len();
        list.retain(|held| !Arc::ptr_eq(held, session));
        let removed = list.len() != before;
        if list.is_empty() {
            sessions.remove(&session.scope());
        }
        removed
    }

    /// Indexed sessions in `scope`, live or not.
    #[must_use]
    pub fn active_in(&self, scope: ScopeKey) -> usize {
        self.guard().get(&scope).map_or(0, Vec::len)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.guard().values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
