//! Session lifecycle and the advisory edit-control token.
//!
//! A session is bookkeeping: who created it, who is in it, and who
//! currently holds the edit-control token. The token is mutual
//! exclusion by convention — the engine itself accepts edits from
//! anybody; enforcement is the host's choice.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::SystemTime;

use log::info;
use thiserror::Error;
use uuid::Uuid;

use crate::protocol::Peer;

/// Session-layer failures.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no active session")]
    NoActiveSession,
    #[error("unknown session `{0}`")]
    UnknownSession(String),
    #[error("edit control is not held by this user")]
    NotController,
}

/// Where the edit-control token currently sits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlStatus {
    pub current_controller: Option<String>,
    pub has_control: bool,
}

/// One shared-editing session.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub created_by: String,
    pub created_at: SystemTime,
    pub file_path: String,
    /// Content at session creation; the live document belongs to the
    /// sync engine.
    pub content: String,
    pub peers: HashMap<String, Peer>,
    pub controller: Option<String>,
    pub is_active: bool,
}

/// Registry of sessions plus this process's identity.
pub struct SessionManager {
    user_id: String,
    current: RwLock<Option<String>>,
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::with_user_id(generate_user_id())
    }

    /// Explicit identity, for tests.
    pub fn with_user_id(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            current: RwLock::new(None),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Create a session around `content`, with this user as creator and
    /// initial controller.
    pub fn create_session(
        &self,
        file_path: impl Into<String>,
        content: impl Into<String>,
    ) -> Session {
        let session = Session {
            id: generate_session_id(),
            created_by: self.user_id.clone(),
            created_at: SystemTime::now(),
            file_path: file_path.into(),
            content: content.into(),
            peers: HashMap::from([(
                self.user_id.clone(),
                Peer::new(self.user_id.clone(), "Creator"),
            )]),
            controller: Some(self.user_id.clone()),
            is_active: true,
        };
        self.sessions
            .write()
            .unwrap()
            .insert(session.id.clone(), session.clone());
        *self.current.write().unwrap() = Some(session.id.clone());
        info!("created session {} for {}", session.id, session.file_path);
        session
    }

    /// Join a known session as a peer.
    pub fn join_session(&self, session_id: &str) -> Result<Session, SessionError> {
        let mut sessions = self.sessions.write().unwrap();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::UnknownSession(session_id.to_string()))?;
        session
            .peers
            .insert(self.user_id.clone(), Peer::new(self.user_id.clone(), ""));
        session.is_active = true;
        let joined = session.clone();
        *self.current.write().unwrap() = Some(joined.id.clone());
        info!("{} joined session {}", self.user_id, joined.id);
        Ok(joined)
    }

    /// Leave the active session. The edit-control token is handed to
    /// any remaining peer; an empty session is deactivated.
    pub fn leave_session(&self) -> Result<(), SessionError> {
        let mut current = self.current.write().unwrap();
        let session_id = current.take().ok_or(SessionError::NoActiveSession)?;

        let mut sessions = self.sessions.write().unwrap();
        if let Some(session) = sessions.get_mut(&session_id) {
            session.peers.remove(&self.user_id);
            if session.controller.as_deref() == Some(self.user_id.as_str()) {
                session.controller = session.peers.keys().next().cloned();
            }
            if session.peers.is_empty() {
                session.is_active = false;
            }
        }
        info!("{} left session {session_id}", self.user_id);
        Ok(())
    }

    /// Take the edit-control token.
    pub fn request_control(&self) -> Result<ControlStatus, SessionError> {
        self.with_current(|session| {
            session.controller = Some(self.user_id.clone());
            Ok(ControlStatus {
                current_controller: session.controller.clone(),
                has_control: true,
            })
        })
    }

    /// Give the edit-control token back.
    pub fn release_control(&self) -> Result<ControlStatus, SessionError> {
        self.with_current(|session| {
            if session.controller.as_deref() != Some(self.user_id.as_str()) {
                return Err(SessionError::NotController);
            }
            session.controller = None;
            Ok(ControlStatus {
                current_controller: None,
                has_control: false,
            })
        })
    }

    /// Current token holder, without touching it.
    pub fn control_status(&self) -> Result<ControlStatus, SessionError> {
        self.with_current(|session| {
            Ok(ControlStatus {
                current_controller: session.controller.clone(),
                has_control: session.controller.as_deref() == Some(self.user_id.as_str()),
            })
        })
    }

    /// Copy of the active session, if any.
    pub fn current_session(&self) -> Option<Session> {
        let current = self.current.read().unwrap();
        let id = current.as_ref()?;
        self.sessions.read().unwrap().get(id).cloned()
    }

    fn with_current<T>(
        &self,
        f: impl FnOnce(&mut Session) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        let current = self.current.read().unwrap();
        let session_id = current.as_ref().ok_or(SessionError::NoActiveSession)?;
        let mut sessions = self.sessions.write().unwrap();
        let session = sessions
            .get_mut(session_id)
            .ok_or(SessionError::NoActiveSession)?;
        f(session)
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

fn generate_user_id() -> String {
    Uuid::new_v4().simple().to_string()[..16].to_string()
}

fn generate_session_id() -> String {
    Uuid::new_v4().simple().to_string()[..16].to_string()
}
