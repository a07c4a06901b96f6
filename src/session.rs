//! Shared inference session slot
//!
//! The session is the only durable state around the pipeline. It is either
//! not ready or ready; the only way back through "not ready" is an explicit
//! reload.

use crate::{
    error::{CutoutError, Result},
    inference::InferenceSession,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Produces a ready session, typically by loading a model file
#[async_trait]
pub trait SessionLoader: Send + Sync {
    /// Load the model and build a session
    ///
    /// # Errors
    /// Model loading or session construction failures
    async fn load(&self) -> Result<Arc<dyn InferenceSession>>;

    /// Short description for logs
    fn describe(&self) -> String;
}

/// State of the shared session
#[derive(Clone, Default)]
pub enum SessionState {
    #[default]
    NotReady,
    Ready(Arc<dyn InferenceSession>),
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotReady => write!(f, "NotReady"),
            Self::Ready(session) => write!(f, "Ready({})", session.backend_name()),
        }
    }
}

/// Holder for the session shared by every pipeline run
#[derive(Debug, Default)]
pub struct SessionSlot {
    state: RwLock<SessionState>,
}

impl SessionSlot {
    /// Empty slot; runs fail with `SessionNotReady` until a session is installed
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot that starts out ready
    #[must_use]
    pub fn ready(session: Arc<dyn InferenceSession>) -> Self {
        Self {
            state: RwLock::new(SessionState::Ready(session)),
        }
    }

    /// Install a session, replacing any previous one
    pub async fn install(&self, session: Arc<dyn InferenceSession>) {
        info!(backend = session.backend_name(), "Inference session ready");
        *self.state.write().await = SessionState::Ready(session);
    }

    /// The ready session
    ///
    /// # Errors
    /// `SessionNotReady` before the first install or during a reload
    pub async fn current(&self) -> Result<Arc<dyn InferenceSession>> {
        match &*self.state.read().await {
            SessionState::Ready(session) => Ok(Arc::clone(session)),
            SessionState::NotReady => Err(CutoutError::SessionNotReady),
        }
    }

    pub async fn is_ready(&self) -> bool {
        matches!(&*self.state.read().await, SessionState::Ready(_))
    }

    /// Drop the current session and load a new one
    ///
    /// The slot reads as not ready while the loader runs, and stays not
    /// ready if loading fails. Runs already holding the old session finish
    /// with it.
    ///
    /// # Errors
    /// Whatever the loader returns
    pub async fn reload(&self, loader: &dyn SessionLoader) -> Result<()> {
        info!(source = %loader.describe(), "Reloading inference session");
        *self.state.write().await = SessionState::NotReady;

        match loader.load().await {
            Ok(session) => {
                self.install(session).await;
                Ok(())
            },
            Err(e) => {
                warn!(error = %e, "Session reload failed; slot stays not ready");
                Err(e)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::mock::MockSession;

    struct MockLoader {
        fail: bool,
    }

    #[async_trait]
    impl SessionLoader for MockLoader {
        async fn load(&self) -> Result<Arc<dyn InferenceSession>> {
            if self.fail {
                Err(CutoutError::inference("model file corrupt"))
            } else {
                Ok(Arc::new(MockSession::uniform(1.0)))
            }
        }

        fn describe(&self) -> String {
            "mock loader".to_string()
        }
    }

    #[tokio::test]
    async fn test_slot_starts_not_ready() {
        let slot = SessionSlot::new();
        assert!(!slot.is_ready().await);
        assert!(matches!(
            slot.current().await,
            Err(CutoutError::SessionNotReady)
        ));
    }

    #[tokio::test]
    async fn test_install_makes_ready() {
        let slot = SessionSlot::new();
        slot.install(Arc::new(MockSession::default())).await;
        assert!(slot.is_ready().await);
        assert_eq!(slot.current().await.unwrap().backend_name(), "mock");
    }

    #[tokio::test]
    async fn test_reload_success() {
        let slot = SessionSlot::new();
        slot.reload(&MockLoader { fail: false }).await.unwrap();
        assert!(slot.is_ready().await);
    }

    #[tokio::test]
    async fn test_failed_reload_leaves_slot_not_ready() {
        let slot = SessionSlot::ready(Arc::new(MockSession::default()));
        assert!(slot.is_ready().await);

        let err = slot.reload(&MockLoader { fail: true }).await.unwrap_err();
        assert!(err.to_string().contains("model file corrupt"));
        assert!(!slot.is_ready().await);
    }
}
