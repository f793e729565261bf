use crate::api::schemas::auth::{AuthSession, Login, Logout, Refresh, Registration};
use crate::domain::session::Session;
use crate::domain::user::{Permission, Role, UserProfile};
use crate::error::{ApiError, Result};
use crate::services::{read_api_error, resolve_url};
use crate::storage::session_store::SessionStore;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use opentelemetry::{global, metrics::Counter};
use reqwest::StatusCode;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::watch;

/// Where the session lifecycle currently stands. Broadcast on every change;
/// an embedding application reacts to `Anonymous` by sending the user back
/// to its login surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticated,
}

#[derive(Clone)]
struct Metrics {
    login_total: Counter<u64>,
    refresh_total: Counter<u64>,
    logout_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("lendhub-client");
        Self {
            login_total: meter
                .u64_counter("auth_login_total")
                .with_description("Total number of successful logins")
                .build(),
            refresh_total: meter
                .u64_counter("auth_refresh_total")
                .with_description("Total number of successful token rotations")
                .build(),
            logout_total: meter
                .u64_counter("auth_logout_total")
                .with_description("Total number of logouts")
                .build(),
        }
    }
}

type RefreshFuture = Shared<BoxFuture<'static, bool>>;

/// Owns the session: login, registration, logout and token refresh against
/// the auth endpoints, plus the persisted mirror in the session store.
///
/// Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct SessionService {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    base_url: String,
    store: SessionStore,
    session: RwLock<Option<Session>>,
    inflight_refresh: Mutex<Option<RefreshFuture>>,
    state_tx: watch::Sender<SessionState>,
    metrics: Metrics,
}

impl fmt::Debug for SessionService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionService")
            .field("base_url", &self.inner.base_url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SessionService {
    /// Loads any persisted session (running key migration in the process)
    /// and seeds the in-memory state from it.
    ///
    /// # Errors
    /// Returns an error if the persisted session file needed a rewrite that
    /// failed.
    pub fn new(http: reqwest::Client, base_url: String, store: SessionStore) -> Result<Self> {
        let session = store.load()?;
        let initial = if session.is_some() { SessionState::Authenticated } else { SessionState::Anonymous };
        let (state_tx, _) = watch::channel(initial);

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base_url,
                store,
                session: RwLock::new(session),
                inflight_refresh: Mutex::new(None),
                state_tx,
                metrics: Metrics::new(),
            }),
        })
    }

    /// Authenticates against `POST /auth/login` and persists the resulting
    /// session. A response of the wrong shape is reported as invalid
    /// credentials, exactly like a rejected password.
    ///
    /// # Errors
    /// `InvalidCredentials` on rejection or malformed response, `Network`
    /// on transport failure.
    #[tracing::instrument(skip(self, password), fields(user_id = tracing::field::Empty), err(level = "warn"))]
    pub async fn login(&self, username: &str, password: &str) -> Result<Session> {
        let payload = Login { username: username.to_owned(), password: password.to_owned() };
        let response = self
            .inner
            .http
            .post(resolve_url(&self.inner.base_url, "/auth/login"))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::InvalidCredentials);
        }
        if !status.is_success() {
            return Err(read_api_error(response).await);
        }

        let body: AuthSession = response.json().await.map_err(|_| ApiError::InvalidCredentials)?;
        let session = Session::try_from(body).map_err(|_| ApiError::InvalidCredentials)?;
        tracing::Span::current().record("user_id", tracing::field::display(&session.user.user_id));

        self.inner.install(session.clone())?;
        self.inner.metrics.login_total.add(1, &[]);
        Ok(session)
    }

    /// Registers a new account against `POST /register`; the backend logs
    /// the new user straight in, so this persists a session like login.
    ///
    /// # Errors
    /// `InvalidResponse` when the response shape is off, `Http` for
    /// rejections, `Network` on transport failure.
    #[tracing::instrument(skip(self, data), err(level = "warn"))]
    pub async fn register(&self, data: &Registration) -> Result<Session> {
        let response = self
            .inner
            .http
            .post(resolve_url(&self.inner.base_url, "/register"))
            .json(data)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(read_api_error(response).await);
        }

        let body: AuthSession = response.json().await.map_err(|_| ApiError::InvalidResponse)?;
        let session = Session::try_from(body)?;

        self.inner.install(session.clone())?;
        self.inner.metrics.login_total.add(1, &[]);
        Ok(session)
    }

    /// Best-effort server-side invalidation; local state is cleared no
    /// matter what the network does. Calling this while anonymous does
    /// nothing, network included.
    #[tracing::instrument(skip(self))]
    pub async fn logout(&self) {
        let Some(session) = self.read(Clone::clone) else {
            return;
        };

        let payload = Logout { refresh_token: session.refresh_token.clone() };
        let result = self
            .inner
            .http
            .post(resolve_url(&self.inner.base_url, "/auth/logout"))
            .bearer_auth(&session.access_token)
            .json(&payload)
            .send()
            .await;

        match result {
            Ok(response) if !response.status().is_success() => {
                tracing::warn!(status = %response.status(), "Logout rejected by server");
            }
            Err(e) => tracing::warn!(error = %e, "Logout request failed"),
            Ok(_) => {}
        }

        self.inner.metrics.logout_total.add(1, &[]);
        self.invalidate();
    }

    /// Exchanges the refresh token for a fresh pair. At most one exchange
    /// is in flight at a time; concurrent callers await the same shared
    /// future and therefore trigger exactly one HTTP call. Returns whether
    /// the session holds a fresh token afterwards.
    ///
    /// Without a refresh token this is a no-op (stale timers land here
    /// after logout). A failed exchange clears the session entirely; the
    /// error is logged, never surfaced.
    pub async fn refresh_access_token(&self) -> bool {
        if !self.read(|s| s.refresh_token.is_some()).unwrap_or(false) {
            tracing::debug!("No refresh token present, skipping refresh");
            return false;
        }

        let fut = {
            let mut inflight = self.inner.inflight_refresh.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(fut) = inflight.as_ref() {
                fut.clone()
            } else {
                let inner = Arc::clone(&self.inner);
                let fut: RefreshFuture = async move {
                    let refreshed = inner.perform_refresh().await;
                    *inner.inflight_refresh.lock().unwrap_or_else(PoisonError::into_inner) = None;
                    refreshed
                }
                .boxed()
                .shared();
                *inflight = Some(fut.clone());
                fut
            }
        };
        fut.await
    }

    /// Drops the session locally: store cleared, state flipped to
    /// `Anonymous`. Safe to call repeatedly; observers are notified once
    /// per actual transition.
    pub fn invalidate(&self) {
        self.inner.invalidate();
    }

    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.read(|s| s.access_token.clone())
    }

    #[must_use]
    pub fn user(&self) -> Option<UserProfile> {
        self.read(|s| s.user.clone())
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.read(|_| ()).is_some()
    }

    #[must_use]
    pub fn has_role(&self, roles: &[Role]) -> bool {
        self.read(|s| roles.contains(&s.user.role)).unwrap_or(false)
    }

    #[must_use]
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.read(|s| s.user.role.permissions().contains(&permission)).unwrap_or(false)
    }

    /// Unix timestamp the current access token expires at, if readable.
    #[must_use]
    pub fn expires_at(&self) -> Option<i64> {
        self.read(Session::expires_at).flatten()
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.inner.state_tx.borrow()
    }

    /// Subscribes to session transitions. The refresh worker re-arms on
    /// every message; applications typically only care about `Anonymous`.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state_tx.subscribe()
    }

    fn read<T>(&self, f: impl FnOnce(&Session) -> T) -> Option<T> {
        self.inner.session.read().unwrap_or_else(PoisonError::into_inner).as_ref().map(f)
    }
}

impl Inner {
    fn install(&self, session: Session) -> Result<()> {
        self.store.save(&session)?;
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
        // Unconditional send: a refresh replaces the token without changing
        // the state value, and the refresh worker re-arms on every message.
        self.state_tx.send_replace(SessionState::Authenticated);
        Ok(())
    }

    fn invalidate(&self) {
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "Failed to clear persisted session");
        }
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.state_tx.send_if_modified(|state| {
            if *state == SessionState::Anonymous {
                false
            } else {
                *state = SessionState::Anonymous;
                true
            }
        });
    }

    #[tracing::instrument(skip(self))]
    async fn perform_refresh(&self) -> bool {
        let refresh_token = self
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|s| s.refresh_token.clone());
        let Some(refresh_token) = refresh_token else {
            return false;
        };

        match self.exchange_refresh(refresh_token).await {
            Ok(session) => match self.install(session) {
                Ok(()) => {
                    self.metrics.refresh_total.add(1, &[]);
                    tracing::info!("Access token rotated");
                    true
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to persist refreshed session, clearing");
                    self.invalidate();
                    false
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh failed, clearing session");
                self.invalidate();
                false
            }
        }
    }

    async fn exchange_refresh(&self, refresh_token: String) -> Result<Session> {
        let payload = Refresh { refresh_token };
        let response = self
            .http
            .post(resolve_url(&self.base_url, "/auth/refresh"))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(read_api_error(response).await);
        }

        let body: AuthSession = response.json().await.map_err(|_| ApiError::InvalidResponse)?;
        Session::try_from(body)
    }
}
