use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::browser::signals::NavTicket;
use crate::crawler::error::HostError;

/// Identity of a session, used to route navigation signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle to a page-rendering session owned by a single worker
#[derive(Debug, PartialEq, Eq)]
pub struct Session {
    id: SessionId,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }
}

/// Creates, drives and tears down page-rendering sessions
#[async_trait]
pub trait SessionHost: Send + Sync {
    /// Create a new session
    async fn create_session(&self) -> Result<Session, HostError>;

    /// Start navigating `session` to `url`.
    ///
    /// Returns once the request is issued. Completion is reported through the
    /// navigation signal hub, tagged with `ticket`.
    async fn navigate(&self, session: &Session, url: &Url, ticket: NavTicket) -> Result<(), HostError>;

    /// Read the current rendered document of `session`
    async fn page_source(&self, session: &Session) -> Result<String, HostError>;

    /// Release every resource held by `session`
    async fn destroy_session(&self, session: Session);
}

/// A session checked out from a host, destroyed exactly once.
///
/// Call [`SessionLease::release`] on the normal exit path. If the lease is
/// dropped without release, destruction is spawned onto the current runtime.
pub struct SessionLease {
    host: Arc<dyn SessionHost>,
    session: Session,
    released: bool,
}

impl SessionLease {
    /// Create a session on `host` and take ownership of it
    pub async fn acquire(host: Arc<dyn SessionHost>) -> Result<Self, HostError> {
        let session = host.create_session().await?;
        debug!("Acquired session {}", session.id());

        Ok(Self {
            host,
            session,
            released: false,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Destroy the session
    pub async fn release(mut self) {
        self.released = true;
        let id = self.session.id();
        self.host.destroy_session(Session::new(id)).await;
        debug!("Released session {}", id);
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let host = Arc::clone(&self.host);
        let session = Session::new(self.session.id());
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    host.destroy_session(session).await;
                });
            }
            Err(_) => warn!("Session {} dropped outside a runtime; not destroyed", self.session.id()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedHost;

    #[tokio::test]
    async fn test_release_destroys_once() {
        let host = ScriptedHost::new();
        let lease = SessionLease::acquire(host.clone()).await.unwrap();
        assert_eq!(host.created(), 1);

        lease.release().await;
        tokio::task::yield_now().await;

        assert_eq!(host.destroyed(), 1);
    }

    #[tokio::test]
    async fn test_dropped_lease_is_still_destroyed() {
        let host = ScriptedHost::new();
        let lease = SessionLease::acquire(host.clone()).await.unwrap();
        drop(lease);

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(host.destroyed(), 1);
    }

    #[tokio::test]
    async fn test_acquire_surfaces_host_error() {
        let host = ScriptedHost::new();
        host.fail_creates(1);

        let result = SessionLease::acquire(host.clone()).await;

        assert!(matches!(result, Err(HostError::Create(_))));
        assert_eq!(host.destroyed(), 0);
    }
}
