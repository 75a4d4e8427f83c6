//! Auth Session Service
//!
//! Owns the current [`Session`] and keeps a statistics row in place for every
//! user that signs up or in.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::{ActionResult, ClientError, Session, UserId, UserStats};
use crate::ports::outbound::{Query, RemoteStore, TableStoreExt, USER_STATS_TABLE};
use crate::service::loading::LoadingFlag;

/// Session lifecycle over a [`RemoteStore`].
pub struct AuthService<S: RemoteStore> {
    store: Arc<S>,
    session: RwLock<Option<Session>>,
    loading: LoadingFlag,
}

impl<S: RemoteStore> AuthService<S> {
    /// Service with no session.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            session: RwLock::new(None),
            loading: LoadingFlag::new(),
        }
    }

    /// Create an account and open a session.
    ///
    /// The statistics row is best-effort: a failure there is logged and the
    /// sign-up still succeeds.
    pub async fn sign_up(&self, email: &str, password: &str, username: &str) -> ActionResult<Session> {
        let _loading = self.loading.begin();

        let user = self.store.sign_up(email, password, username).await.map_err(|e| {
            warn!(email, error = %e, "Sign-up rejected");
            ClientError::from(e)
        })?;

        let session = Session::from(user);
        info!(user_id = %session.user_id, username = %session.username, "Signed up");
        self.open(session).await
    }

    /// Open a session with existing credentials.
    pub async fn sign_in(&self, email: &str, password: &str) -> ActionResult<Session> {
        let _loading = self.loading.begin();

        let user = self
            .store
            .sign_in_with_password(email, password)
            .await
            .map_err(|e| {
                warn!(email, error = %e, "Sign-in rejected");
                ClientError::from(e)
            })?;

        let session = Session::from(user);
        info!(user_id = %session.user_id, username = %session.username, "Signed in");
        self.open(session).await
    }

    async fn open(&self, session: Session) -> ActionResult<Session> {
        *self.session.write() = Some(session.clone());
        if let Err(e) = self
            .ensure_user_stats(&session.user_id, &session.username)
            .await
        {
            warn!(user_id = %session.user_id, error = %e, "Could not ensure statistics row");
        }
        Ok(session)
    }

    /// Close the session.
    ///
    /// Local state is cleared whatever the remote store answers; a remote
    /// failure is still reported.
    pub async fn sign_out(&self) -> ActionResult {
        let _loading = self.loading.begin();

        let result = self.store.sign_out().await;
        let previous = self.session.write().take();
        match result {
            Ok(()) => {
                if let Some(session) = previous {
                    info!(user_id = %session.user_id, "Signed out");
                }
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Remote sign-out failed; local session cleared");
                Err(e.into())
            }
        }
    }

    /// Re-read the session from the store.
    ///
    /// No user clears the session; a failed call leaves it untouched.
    pub async fn get_current_user(&self) -> ActionResult<Option<Session>> {
        let _loading = self.loading.begin();

        match self.store.get_user().await {
            Ok(Some(user)) => {
                let session = Session::from(user);
                *self.session.write() = Some(session.clone());
                Ok(Some(session))
            }
            Ok(None) => {
                *self.session.write() = None;
                Ok(None)
            }
            Err(e) => {
                warn!(error = %e, "Could not read current user");
                Err(e.into())
            }
        }
    }

    /// Create a zeroed statistics row unless one already exists.
    ///
    /// Never overwrites an existing row. A concurrent insert that wins the
    /// race is picked up by re-reading.
    pub async fn ensure_user_stats(&self, user_id: &UserId, username: &str) -> ActionResult<UserStats> {
        let query = Query::select("*").eq("user_id", user_id);

        match self
            .store
            .select_single_as::<UserStats>(USER_STATS_TABLE, &query)
            .await
        {
            Ok(existing) => {
                debug!(%user_id, "Statistics row already present");
                return Ok(existing);
            }
            Err(e) if e.is_no_rows() => {}
            Err(e) => return Err(e.into()),
        }

        let fresh = UserStats::empty(user_id.clone(), username);
        match self
            .store
            .insert_one::<_, UserStats>(USER_STATS_TABLE, &fresh)
            .await
        {
            Ok(stored) => {
                info!(%user_id, username, "Statistics row created");
                Ok(stored.unwrap_or(fresh))
            }
            Err(e) if e.is_unique_violation() => {
                debug!(%user_id, "Statistics row created concurrently");
                self.store
                    .select_single_as::<UserStats>(USER_STATS_TABLE, &query)
                    .await
                    .map_err(ClientError::from)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Current session, if any.
    pub fn current_session(&self) -> Option<Session> {
        self.session.read().clone()
    }

    /// Current session or [`ClientError::NotSignedIn`].
    pub fn require_session(&self) -> ActionResult<Session> {
        self.current_session().ok_or(ClientError::NotSignedIn)
    }

    /// True while an auth call is in flight.
    pub fn is_loading(&self) -> bool {
        self.loading.is_loading()
    }

    /// Underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::in_memory::{FailPoint, InMemoryStore};
    use crate::ports::outbound::TableStore;

    fn service() -> (Arc<InMemoryStore>, AuthService<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (store.clone(), AuthService::new(store))
    }

    #[tokio::test]
    async fn test_sign_up_creates_stats_row() {
        let (store, auth) = service();
        let session = auth.sign_up("a@x.io", "secret1", "alice").await.unwrap();
        assert_eq!(session.username, "alice");
        assert_eq!(auth.current_session(), Some(session));
        assert_eq!(store.row_count(USER_STATS_TABLE), 1);
        assert!(!auth.is_loading());
    }

    #[tokio::test]
    async fn test_sign_in_keeps_existing_stats() {
        let (store, auth) = service();
        let session = auth.sign_up("a@x.io", "secret1", "alice").await.unwrap();
        auth.sign_out().await.unwrap();

        auth.sign_in("a@x.io", "secret1").await.unwrap();
        assert_eq!(store.row_count(USER_STATS_TABLE), 1);

        let stats = auth.ensure_user_stats(&session.user_id, "renamed").await.unwrap();
        assert_eq!(stats.username, "alice");
        assert_eq!(store.row_count(USER_STATS_TABLE), 1);
    }

    #[tokio::test]
    async fn test_sign_in_error_is_verbatim() {
        let (_store, auth) = service();
        let err = auth.sign_in("nobody@x.io", "secret1").await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid login credentials");
        assert!(auth.current_session().is_none());
        assert!(!auth.is_loading());
    }

    #[tokio::test]
    async fn test_sign_up_survives_stats_failure() {
        let (store, auth) = service();
        store.fail_on(FailPoint::Select);
        let session = auth.sign_up("a@x.io", "secret1", "alice").await;
        assert!(session.is_ok());
        assert_eq!(store.row_count(USER_STATS_TABLE), 0);
    }

    #[tokio::test]
    async fn test_sign_out_clears_even_on_failure() {
        let (store, auth) = service();
        auth.sign_up("a@x.io", "secret1", "alice").await.unwrap();
        store.fail_on(FailPoint::SignOut);
        assert!(auth.sign_out().await.is_err());
        assert!(auth.current_session().is_none());
        assert_eq!(auth.require_session(), Err(ClientError::NotSignedIn));
    }

    #[tokio::test]
    async fn test_get_current_user() {
        let (store, auth) = service();
        assert_eq!(auth.get_current_user().await.unwrap(), None);

        let session = auth.sign_up("a@x.io", "secret1", "alice").await.unwrap();
        store.fail_on(FailPoint::GetUser);
        assert!(auth.get_current_user().await.is_err());
        assert_eq!(auth.current_session(), Some(session.clone()));

        store.recover(FailPoint::GetUser);
        assert_eq!(auth.get_current_user().await.unwrap(), Some(session));
    }

    #[tokio::test]
    async fn test_ensure_user_stats_never_overwrites() {
        let (store, auth) = service();
        let user = UserId::new("u-race");
        store
            .insert(
                USER_STATS_TABLE,
                vec![serde_json::to_value(UserStats::empty(user.clone(), "first")).unwrap()],
            )
            .await
            .unwrap();

        let stats = auth.ensure_user_stats(&user, "second").await.unwrap();
        assert_eq!(stats.username, "first");
        assert_eq!(store.row_count(USER_STATS_TABLE), 1);
    }
}
