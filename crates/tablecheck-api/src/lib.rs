//! TableCheck API Library
//!
//! Router, shared state and handlers for the dashboard HTTP surface. Each
//! session holds its own `Navigator` and expires after sitting idle past the
//! session TTL; warehouse work runs on the blocking pool.

pub mod error;
pub mod health;
pub mod sessions;

use axum::{
    routing::{get, post},
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tablecheck_core::navigation::Navigator;
use tablecheck_warehouse::DynConnector;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Idle time after which a session is dropped
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// One user's navigation state and when it was last used
#[derive(Debug, Clone)]
pub struct Session {
    pub navigator: Navigator,
    pub last_seen: Instant,
}

impl Session {
    fn new(navigator: Navigator) -> Self {
        Self {
            navigator,
            last_seen: Instant::now(),
        }
    }

    fn is_idle(&self, ttl: Duration) -> bool {
        self.last_seen.elapsed() > ttl
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub connector: Arc<DynConnector>,
    pub sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
    pub session_ttl: Duration,
}

impl AppState {
    pub fn new(connector: Arc<DynConnector>) -> Self {
        Self {
            connector,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            session_ttl: DEFAULT_SESSION_TTL,
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Start a session in the Input Form.
    pub async fn open_session(&self, navigator: Navigator) -> Uuid {
        self.evict_idle().await;
        let id = Uuid::new_v4();
        self.sessions.write().await.insert(id, Session::new(navigator));
        id
    }

    /// Copy of a live session's navigator, marking it used. An idle session
    /// is dropped and reported as missing.
    pub async fn checkout(&self, id: Uuid) -> Option<Navigator> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id)?;
        if session.is_idle(self.session_ttl) {
            sessions.remove(&id);
            tracing::info!(session = %id, "Session expired");
            return None;
        }
        session.last_seen = Instant::now();
        Some(session.navigator.clone())
    }

    /// Store a navigator back if its session still exists.
    pub async fn check_in(&self, id: Uuid, navigator: Navigator) {
        if let Some(session) = self.sessions.write().await.get_mut(&id) {
            session.navigator = navigator;
            session.last_seen = Instant::now();
        }
    }

    pub async fn close_session(&self, id: Uuid) -> bool {
        self.sessions.write().await.remove(&id).is_some()
    }

    /// Drop every session idle for longer than the TTL; returns how many.
    pub async fn evict_idle(&self) -> usize {
        let ttl = self.session_ttl;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_idle(ttl));
        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::info!(evicted, remaining = sessions.len(), "Evicted idle sessions");
        }
        evicted
    }
}

/// Periodically evict idle sessions. Runs until the runtime shuts down.
pub fn spawn_session_reaper(state: AppState, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            state.evict_idle().await;
        }
    })
}

/// Build the router
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/live", get(health::liveness_check))
        .route("/api/v1/sessions", post(sessions::create_session))
        .route(
            "/api/v1/sessions/:id",
            get(sessions::get_session).delete(sessions::delete_session),
        )
        .route("/api/v1/sessions/:id/form", post(sessions::submit_form))
        .route(
            "/api/v1/sessions/:id/identifier",
            post(sessions::confirm_identifier),
        )
        .route("/api/v1/sessions/:id/navigate", post(sessions::navigate))
        .route("/api/v1/sessions/:id/view", get(sessions::current_view))
        .route(
            "/api/v1/sessions/:id/outliers/save",
            post(sessions::save_outliers),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
