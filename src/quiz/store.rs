//! Session store: in-memory sessions keyed by id.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::state::Session;

/// Holds every live session. Each session is only ever mutated through
/// [`SessionStore::update`], under the write lock.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Session>>,
}

impl SessionStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Current session for `id`, created with defaults on first access.
    pub async fn get(&self, id: Uuid) -> Session {
        if let Some(session) = self.sessions.read().await.get(&id) {
            return session.clone();
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(id)
            .or_insert_with(|| {
                debug!(session_id = %id, "Creating session");
                Session::new(id)
            })
            .clone()
    }

    /// Apply a change to the session. Visible to every later read.
    pub async fn update<T>(&self, id: Uuid, f: impl FnOnce(&mut Session) -> T) -> T {
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(id).or_insert_with(|| Session::new(id));
        f(session)
    }

    /// Restore the default session, keeping the id.
    pub async fn reset(&self, id: Uuid) -> Session {
        let session = Session::new(id);
        self.sessions.write().await.insert(id, session.clone());
        info!(session_id = %id, "Session reset");
        session
    }

    /// Current run id of every live session.
    pub async fn run_ids(&self) -> HashMap<Uuid, Uuid> {
        self.sessions
            .read()
            .await
            .iter()
            .map(|(id, s)| (*id, s.run_id))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drop sessions not updated within `max_idle`. Returns how many went.
    pub async fn prune_idle(&self, max_idle: Duration) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(max_idle)
            .ok()
            .and_then(|d| Utc::now().checked_sub_signed(d))
        else {
            return 0;
        };
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.updated_at >= cutoff);
        let pruned = before - sessions.len();
        if pruned > 0 {
            info!(pruned, remaining = sessions.len(), "Pruned idle sessions");
        }
        pruned
    }
}
