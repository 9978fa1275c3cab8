use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

/// Identifies one accepted connection for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-connection state. `username` is set only after a successful login.
#[derive(Debug, Clone)]
pub struct Session {
    pub peer: SocketAddr,
    username: Option<String>,
}

impl Session {
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }
}

/// All open sessions, keyed by connection.
///
/// Owned by the server loop; nothing else touches it.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<ConnectionId, Session>,
    next_id: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly accepted connection with no identity.
    pub fn open(&mut self, peer: SocketAddr) -> ConnectionId {
        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        self.sessions.insert(
            id,
            Session {
                peer,
                username: None,
            },
        );
        id
    }

    /// Forget a connection. Returns its final state, if it was known.
    pub fn close(&mut self, id: ConnectionId) -> Option<Session> {
        self.sessions.remove(&id)
    }

    pub fn identity(&self, id: ConnectionId) -> Option<&str> {
        self.sessions.get(&id).and_then(Session::username)
    }

    pub fn authenticate(&mut self, id: ConnectionId, username: String) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.username = Some(username);
        }
    }

    pub fn clear(&mut self, id: ConnectionId) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.username = None;
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
