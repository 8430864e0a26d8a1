//! Client session context
//!
//! Operations are always performed on behalf of the client whose request is being
//! served. The session provider tells the agent who that is, for backup ownership and
//! for logging.

use crate::error::{NetError, NetResult};
use crate::types::{ClientSession, SessionRef};
use async_trait::async_trait;
use nix::unistd::{getpid, getuid};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

/// Credentials of a connected client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClientCredentials {
    pub uid: libc::uid_t,
    pub pid: libc::pid_t,
}

/// Source of the current client session and its identity
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Session of the request currently being served; `None` for internal callers
    async fn current_session(&self) -> ClientSession;

    /// Credentials of `session`
    async fn client_credentials(&self, session: SessionRef) -> NetResult<ClientCredentials>;

    /// Application name of process `pid`
    async fn app_name(&self, pid: libc::pid_t) -> NetResult<String>;
}

/// Sessions of a single local process; the current session is set before each request
pub struct LocalSessions {
    current: RwLock<ClientSession>,
}

impl LocalSessions {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
        }
    }

    /// Switch the session subsequent operations are attributed to
    pub async fn set_current(&self, session: ClientSession) {
        debug!("Serving session {:?}", session);
        *self.current.write().await = session;
    }
}

impl Default for LocalSessions {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionProvider for LocalSessions {
    async fn current_session(&self) -> ClientSession {
        *self.current.read().await
    }

    async fn client_credentials(&self, _session: SessionRef) -> NetResult<ClientCredentials> {
        Ok(ClientCredentials {
            uid: getuid().as_raw(),
            pid: getpid().as_raw(),
        })
    }

    async fn app_name(&self, pid: libc::pid_t) -> NetResult<String> {
        let comm = tokio::fs::read_to_string(format!("/proc/{}/comm", pid))
            .await
            .map_err(|e| NetError::Fault(format!("Cannot read name of process {}: {}", pid, e)))?;
        let name = comm.trim_end().to_string();
        if name.is_empty() {
            return Err(NetError::NotFound(format!("Process {} has no name", pid)));
        }
        Ok(name)
    }
}
