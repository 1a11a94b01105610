//! Session registry.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use uuid::Uuid;

use super::dialog::{DialogOptions, DialogSession, DialogState};
use crate::error::DialogError;
use crate::llm::Message;

/// Id of the pinned session serving the session-less dialog endpoints.
pub const DEFAULT_SESSION_ID: &str = "default";

/// Thread-safe registry of dialog sessions.
///
/// Every session created through the store shares the store's
/// [`DialogOptions`]. The default session is created with the store and is
/// never removed or reaped.
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<SessionStoreInner>,
}

#[derive(Debug)]
struct SessionStoreInner {
    options: DialogOptions,
    default_seed: Option<String>,
    sessions: RwLock<HashMap<String, DialogSession>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DialogOptions::default(), None)
    }
}

impl SessionStore {
    /// Create a store and its default session.
    ///
    /// `default_seed` is the system prompt used for the default session and
    /// for sessions created without an explicit seed.
    #[must_use]
    pub fn new(options: DialogOptions, default_seed: Option<String>) -> Self {
        let store = Self {
            inner: Arc::new(SessionStoreInner {
                options,
                default_seed,
                sessions: RwLock::new(HashMap::new()),
            }),
        };
        store.insert(DEFAULT_SESSION_ID.to_string(), store.default_seed_message());
        store
    }

    fn default_seed_message(&self) -> Option<Message> {
        self.inner.default_seed.clone().map(Message::system)
    }

    fn insert(&self, id: String, seed: Option<Message>) -> DialogSession {
        let session = DialogSession::new(id.clone(), seed, self.inner.options);
        let mut guard = self
            .inner
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        guard.insert(id, session.clone());
        session
    }

    /// The pinned default session.
    #[must_use]
    pub fn default_session(&self) -> DialogSession {
        if let Some(session) = self.get(DEFAULT_SESSION_ID) {
            return session;
        }
        self.insert(DEFAULT_SESSION_ID.to_string(), self.default_seed_message())
    }

    /// Create a new session with a random id.
    ///
    /// With `seed == None` the store's default system prompt (if any) is used.
    #[must_use]
    pub fn create(&self, seed: Option<Message>) -> DialogSession {
        let id = Uuid::new_v4().to_string();
        self.create_with_id(id, seed)
    }

    /// Create a new session with a specific id, replacing any existing one.
    #[must_use]
    pub fn create_with_id(&self, id: impl Into<String>, seed: Option<Message>) -> DialogSession {
        let id = id.into();
        let seed = seed.or_else(|| self.default_seed_message());
        tracing::debug!(session_id = %id, seeded = seed.is_some(), "Creating dialog session");
        self.insert(id, seed)
    }

    /// Get a session by id. Lookups do not count as activity.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<DialogSession> {
        let guard = self
            .inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        guard.get(id).cloned()
    }

    /// Check out a session for use, or fail with [`DialogError::SessionNotFound`].
    ///
    /// The session is marked active before the registry lock is released;
    /// a reap that runs afterwards keeps it.
    pub fn require(&self, id: &str) -> Result<DialogSession, DialogError> {
        let guard = self
            .inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let session = guard
            .get(id)
            .ok_or_else(|| DialogError::SessionNotFound(id.to_string()))?;
        session.touch();
        Ok(session.clone())
    }

    /// Remove a session by id.
    ///
    /// # Errors
    ///
    /// The default session cannot be removed; unknown ids yield
    /// [`DialogError::SessionNotFound`].
    pub fn remove(&self, id: &str) -> Result<DialogSession, DialogError> {
        if id == DEFAULT_SESSION_ID {
            return Err(DialogError::Validation(
                "The default session cannot be deleted".to_string(),
            ));
        }
        let mut guard = self
            .inner
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        guard
            .remove(id)
            .ok_or_else(|| DialogError::SessionNotFound(id.to_string()))
    }

    /// Get the number of registered sessions, including the default one.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove sessions that have been inactive longer than the timeout.
    ///
    /// The default session and sessions awaiting a reply are kept.
    /// Returns the number of sessions removed.
    pub fn cleanup_expired_with_timeout(&self, timeout: Duration) -> usize {
        let mut guard = self
            .inner
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = guard.len();
        guard.retain(|id, session| {
            id == DEFAULT_SESSION_ID
                || session.state() == DialogState::AwaitingReply
                || !session.is_expired_with_timeout(timeout)
        });
        before - guard.len()
    }

    /// List all session ids, sorted.
    #[must_use]
    pub fn list_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Generation, ModelBackend, Orchestrator};
    use crate::session::LogKind;

    /// Backend whose calls never complete.
    struct Stalled;

    #[async_trait::async_trait]
    impl ModelBackend for Stalled {
        async fn chat(&self, _messages: &[Message]) -> anyhow::Result<Message> {
            std::future::pending().await
        }

        async fn generate(&self, _prompt: &str) -> anyhow::Result<Generation> {
            std::future::pending().await
        }
    }

    #[test]
    fn test_store_starts_with_default_session() {
        let store = SessionStore::new(DialogOptions::default(), Some("be Trincoll Bot".into()));

        assert_eq!(store.len(), 1);
        assert_eq!(store.list_ids(), vec![DEFAULT_SESSION_ID.to_string()]);
        assert_eq!(
            store.default_session().log(LogKind::Input),
            vec![Message::system("be Trincoll Bot")]
        );
    }

    #[test]
    fn test_session_store() {
        let store = SessionStore::default();

        let session = store.create(None);
        assert_eq!(store.len(), 2);
        assert!(session.log(LogKind::Input).is_empty());

        let retrieved = store.get(session.id()).unwrap();
        assert_eq!(retrieved.id(), session.id());

        store.remove(session.id()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.require(session.id()).unwrap_err(),
            DialogError::SessionNotFound(session.id().to_string())
        );
    }

    #[test]
    fn test_explicit_seed_overrides_default() {
        let store = SessionStore::new(DialogOptions::default(), Some("default prompt".into()));

        let inherited = store.create(None);
        assert_eq!(
            inherited.log(LogKind::Input),
            vec![Message::system("default prompt")]
        );

        let custom = store.create(Some(Message::system("pirate")));
        assert_eq!(custom.log(LogKind::Input), vec![Message::system("pirate")]);
    }

    #[test]
    fn test_default_session_cannot_be_removed() {
        let store = SessionStore::default();
        assert!(matches!(
            store.remove(DEFAULT_SESSION_ID),
            Err(DialogError::Validation(_))
        ));
        assert!(matches!(
            store.remove("missing"),
            Err(DialogError::SessionNotFound(_))
        ));
        assert!(!store.is_empty());
    }

    #[test]
    fn test_cleanup_keeps_default_session() {
        let store = SessionStore::default();
        let _a = store.create(None);
        let _b = store.create(None);
        assert_eq!(store.len(), 3);

        std::thread::sleep(Duration::from_millis(20));
        let removed = store.cleanup_expired_with_timeout(Duration::from_millis(5));

        assert_eq!(removed, 2);
        assert_eq!(store.list_ids(), vec![DEFAULT_SESSION_ID.to_string()]);
    }

    #[test]
    fn test_cleanup_keeps_fresh_sessions() {
        let store = SessionStore::default();
        let session = store.create(None);
        assert_eq!(store.cleanup_expired_with_timeout(Duration::from_secs(60)), 0);
        assert!(store.get(session.id()).is_some());
    }

    #[tokio::test]
    async fn test_cleanup_skips_sessions_awaiting_reply() {
        let store = SessionStore::default();
        let session = store.create(None);
        let orch = Orchestrator::new(Arc::new(Stalled));

        let turn = tokio::spawn({
            let session = session.clone();
            async move { session.ask(&orch, Some("anyone there?")).await }
        });
        while session.state() == DialogState::Idle {
            tokio::task::yield_now().await;
        }

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(store.cleanup_expired_with_timeout(Duration::from_millis(5)), 0);

        turn.abort();
        assert!(turn.await.unwrap_err().is_cancelled());
        assert_eq!(session.state(), DialogState::Idle);

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(store.cleanup_expired_with_timeout(Duration::from_millis(5)), 1);
        assert!(store.get(session.id()).is_none());
    }

    #[test]
    fn test_checked_out_session_survives_reap() {
        let store = SessionStore::default();
        let session = store.create(None);

        std::thread::sleep(Duration::from_millis(30));
        assert!(session.is_expired_with_timeout(Duration::from_millis(10)));

        let checked_out = store.require(session.id()).unwrap();
        assert_eq!(store.cleanup_expired_with_timeout(Duration::from_millis(10)), 0);
        assert!(store.get(checked_out.id()).is_some());
    }

    #[test]
    fn test_get_does_not_refresh_activity() {
        let store = SessionStore::default();
        let session = store.create(None);

        std::thread::sleep(Duration::from_millis(30));
        assert!(store.get(session.id()).is_some());
        assert_eq!(store.cleanup_expired_with_timeout(Duration::from_millis(10)), 1);
    }
}
