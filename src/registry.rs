//! In-flight session registry
//!
//! The registry is the single owner of every live [`CaptureSession`]. Sessions
//! are inserted when a request starts tracking and removed exactly once after
//! their terminal outcome was reported. All access is serialized by one lock
//! that is never held across an `.await`.

use crate::{
    error::{CaptureError, Result},
    session::{CaptureSession, LifecycleState},
    types::RequestId,
};
use instant::Duration;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct InFlightRegistry {
    sessions: Mutex<HashMap<RequestId, CaptureSession>>,
}

impl InFlightRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<RequestId, CaptureSession>>> {
        self.sessions
            .lock()
            .map_err(|_| CaptureError::internal("in-flight registry lock poisoned"))
    }

    /// Register a new session
    ///
    /// # Errors
    /// - `Internal` when a session with the same id is already in flight
    pub fn insert(&self, session: CaptureSession) -> Result<()> {
        let id = session.request().id();
        let mut sessions = self.lock()?;
        if sessions.contains_key(&id) {
            return Err(CaptureError::internal(format!(
                "capture request {} is already in flight",
                id
            )));
        }
        sessions.insert(id, session);
        Ok(())
    }

    /// Run `f` against the session for `id` while holding the lock
    ///
    /// # Errors
    /// - `UnknownRequest` when no such session is in flight
    /// - Whatever `f` returns
    pub fn with_session<R>(
        &self,
        id: RequestId,
        f: impl FnOnce(&mut CaptureSession) -> Result<R>,
    ) -> Result<R> {
        let mut sessions = self.lock()?;
        let session = sessions
            .get_mut(&id)
            .ok_or(CaptureError::UnknownRequest(id))?;
        f(session)
    }

    /// Remove a session. Removing an absent id is a no-op.
    pub fn remove(&self, id: RequestId) -> Option<CaptureSession> {
        match self.sessions.lock() {
            Ok(mut sessions) => sessions.remove(&id),
            Err(poisoned) => poisoned.into_inner().remove(&id),
        }
    }

    #[must_use]
    pub fn contains(&self, id: RequestId) -> bool {
        self.lock().is_ok_and(|sessions| sessions.contains_key(&id))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().map_or(0, |sessions| sessions.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids currently in flight, ascending
    #[must_use]
    pub fn ids(&self) -> Vec<RequestId> {
        let mut ids: Vec<_> = self
            .lock()
            .map(|sessions| sessions.keys().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    /// Sessions still waiting on capture events that were created more than
    /// `older_than` ago, with their age. Finalizing sessions are excluded since
    /// their saves may already have landed.
    #[must_use]
    pub fn stale(&self, older_than: Duration) -> Vec<(RequestId, Duration)> {
        let mut stale: Vec<_> = self
            .lock()
            .map(|sessions| {
                sessions
                    .values()
                    .filter(|session| {
                        matches!(
                            session.state(),
                            LifecycleState::AwaitingCapture | LifecycleState::Exposing
                        )
                    })
                    .map(|session| (session.request().id(), session.request().age()))
                    .filter(|(_, age)| *age > older_than)
                    .collect()
            })
            .unwrap_or_default();
        stale.sort_unstable_by_key(|(id, _)| *id);
        stale
    }
}
