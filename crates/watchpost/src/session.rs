use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use serde_json::Value;
use tracing::{event, Level};
use uuid::Uuid;

/// Name of the cookie carrying the session id.
pub const SESSION_COOKIE: &str = "SESSION";

/// Idle time after which a session is dropped.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Per-client state kept between requests.
#[derive(Debug)]
pub struct Session {
    id: String,
    attributes: HashMap<String, Value>,
    last_accessed: Instant,
}

impl Session {
    fn new(id: String) -> Self {
        Self {
            id,
            attributes: HashMap::new(),
            last_accessed: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Set an attribute, returning the previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.attributes.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.attributes.remove(name)
    }
}

/// Sessions of one server, owned by its event loop.
pub(crate) struct SessionStore {
    sessions: HashMap<String, Session>,
    timeout: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TIMEOUT)
    }
}

impl SessionStore {
    pub fn new(timeout: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            timeout,
        }
    }

    /// Create a new session and return its id.
    pub fn create(&mut self) -> String {
        self.prune();

        let id = Uuid::new_v4().simple().to_string();
        event!(Level::DEBUG, session = %id, "session created");

        self.sessions.insert(id.clone(), Session::new(id.clone()));
        id
    }

    /// Check that `id` is a live session and mark it as used.
    ///
    /// Expired sessions are removed.
    pub fn touch(&mut self, id: &str) -> bool {
        let Some(session) = self.sessions.get_mut(id) else {
            return false;
        };

        if session.last_accessed.elapsed() >= self.timeout {
            event!(Level::DEBUG, session = %id, "session expired");
            self.sessions.remove(id);
            return false;
        }

        session.last_accessed = Instant::now();
        true
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Session> {
        self.sessions.get_mut(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Session> {
        self.sessions.remove(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    fn prune(&mut self) {
        let timeout = self.timeout;
        self.sessions
            .retain(|_, session| session.last_accessed.elapsed() < timeout);
    }
}
