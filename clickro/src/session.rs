//! Session affinity.
//!
//! The server rejects concurrent requests within one session, the client
//! tracks sessions with an in-flight request so a second request fails fast
//! instead of waiting on the server lock.
use std::{
    collections::HashSet,
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

/// Set of session ids with an in-flight request.
#[derive(Debug, Clone, Default)]
pub(crate) struct Sessions {
    busy: Arc<Mutex<HashSet<String>>>,
}

impl Sessions {
    /// Mark session as busy, released when the guard is dropped.
    pub(crate) fn acquire(&self, id: &str) -> Result<SessionGuard, SessionBusyError> {
        let mut busy = self.busy.lock().unwrap_or_else(PoisonError::into_inner);
        if !busy.insert(id.to_owned()) {
            return Err(SessionBusyError { session_id: id.to_owned() });
        }
        Ok(SessionGuard { sessions: self.clone(), id: id.to_owned() })
    }
}

/// Busy flag of one session.
#[derive(Debug)]
pub(crate) struct SessionGuard {
    sessions: Sessions,
    id: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.sessions
            .busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

/// Generate a random session id.
pub(crate) fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Session is used by another in-flight request.
pub struct SessionBusyError {
    session_id: String,
}

impl SessionBusyError {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl std::error::Error for SessionBusyError { }

impl fmt::Display for SessionBusyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session `{}` is used by another in-flight request", self.session_id)
    }
}

impl fmt::Debug for SessionBusyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn busy_until_dropped() {
        let sessions = Sessions::default();
        let guard = sessions.acquire("s1").unwrap();

        let err = sessions.acquire("s1").unwrap_err();
        assert_eq!(err.session_id(), "s1");

        let other = sessions.acquire("s2").unwrap();
        drop(guard);
        assert!(sessions.acquire("s2").is_err());

        sessions.acquire("s1").unwrap();
        drop(other);
        sessions.acquire("s2").unwrap();
    }

    #[test]
    fn generated_ids_differ() {
        assert_ne!(generate_id(), generate_id());
    }
}
