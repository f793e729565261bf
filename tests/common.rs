#![allow(dead_code)]

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use lendhub_client::LendHubClient;
use lendhub_client::config::{CacheConfig, Config, HttpConfig, LogFormat, SessionConfig, TelemetryConfig};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

pub const JWT_SECRET: &str = "test_secret";
pub const PASSWORD: &str = "password123";

static INIT: Once = Once::new();

pub fn setup_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into())
            .add_directive("lendhub_client=debug".parse().unwrap())
            .add_directive("tower=warn".parse().unwrap())
            .add_directive("hyper=warn".parse().unwrap())
            .add_directive("reqwest=warn".parse().unwrap());

        tracing_subscriber::fmt().with_env_filter(filter).init();
    });
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: usize,
}

/// In-process stand-in for the LendHub backend. Counters and toggles let
/// tests observe exactly how many calls the client made and force the
/// failure modes the pipeline has to handle.
pub struct BackendState {
    pub access_ttl_secs: AtomicU64,
    pub login_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub lead_attempts: AtomicUsize,
    pub forbidden_attempts: AtomicUsize,
    pub flaky_attempts: AtomicUsize,
    pub flaky_failures_left: AtomicUsize,
    pub fail_refresh: AtomicBool,
    pub reject_all_bearers: AtomicBool,
    pub break_login_shape: AtomicBool,
    pub refresh_delay_ms: AtomicU64,
    valid_access_tokens: Mutex<HashMap<String, String>>,
    valid_refresh_tokens: Mutex<HashMap<String, String>>,
}

impl BackendState {
    fn new() -> Self {
        Self {
            access_ttl_secs: AtomicU64::new(900),
            login_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            lead_attempts: AtomicUsize::new(0),
            forbidden_attempts: AtomicUsize::new(0),
            flaky_attempts: AtomicUsize::new(0),
            flaky_failures_left: AtomicUsize::new(0),
            fail_refresh: AtomicBool::new(false),
            reject_all_bearers: AtomicBool::new(false),
            break_login_shape: AtomicBool::new(false),
            refresh_delay_ms: AtomicU64::new(0),
            valid_access_tokens: Mutex::new(HashMap::new()),
            valid_refresh_tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Simulates server-side access-token expiry: every outstanding access
    /// token stops being accepted, refresh tokens stay valid.
    pub fn expire_access_tokens(&self) {
        self.valid_access_tokens.lock().unwrap().clear();
    }

    /// Revokes all refresh tokens, so the next exchange fails.
    pub fn drop_refresh_tokens(&self) {
        self.valid_refresh_tokens.lock().unwrap().clear();
    }

    fn issue_session(&self, username: &str) -> Value {
        let exp = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as usize
            + self.access_ttl_secs.load(Ordering::SeqCst) as usize;
        let claims = Claims { sub: username.to_string(), exp };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(JWT_SECRET.as_bytes()))
            .expect("failed to encode test JWT");
        let refresh_token = format!("refresh-{}", Uuid::new_v4());

        self.valid_access_tokens.lock().unwrap().insert(token.clone(), username.to_string());
        self.valid_refresh_tokens.lock().unwrap().insert(refresh_token.clone(), username.to_string());

        json!({
            "token": token,
            "refreshToken": refresh_token,
            "userId": format!("u-{username}"),
            "email": username,
            "role": "BUILDER",
            "firstName": "Asha",
            "lastName": "Verma",
        })
    }

    fn bearer_is_valid(&self, headers: &HeaderMap) -> bool {
        if self.reject_all_bearers.load(Ordering::SeqCst) {
            return false;
        }
        let Some(token) = bearer_token(headers) else {
            return false;
        };
        if !self.valid_access_tokens.lock().unwrap().contains_key(&token) {
            return false;
        }
        decode::<Claims>(&token, &DecodingKey::from_secret(JWT_SECRET.as_bytes()), &Validation::default())
            .is_ok()
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    value.strip_prefix("Bearer ").map(str::to_owned)
}

async fn login(State(state): State<Arc<BackendState>>, Json(body): Json<Value>) -> impl IntoResponse {
    state.login_calls.fetch_add(1, Ordering::SeqCst);

    let username = body["username"].as_str().unwrap_or_default().to_owned();
    let password = body["password"].as_str().unwrap_or_default();
    if username.is_empty() || password != PASSWORD {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "message": "Invalid username or password" })));
    }
    if state.break_login_shape.load(Ordering::SeqCst) {
        return (StatusCode::OK, Json(json!({ "token": "", "email": username })));
    }
    (StatusCode::OK, Json(state.issue_session(&username)))
}

async fn register(State(state): State<Arc<BackendState>>, Json(body): Json<Value>) -> impl IntoResponse {
    let username = body["username"].as_str().unwrap_or_default().to_owned();
    if username.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(json!({ "message": "username is required" })));
    }
    (StatusCode::CREATED, Json(state.issue_session(&username)))
}

async fn refresh(State(state): State<Arc<BackendState>>, Json(body): Json<Value>) -> impl IntoResponse {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);

    let delay = state.refresh_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    if state.fail_refresh.load(Ordering::SeqCst) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "message": "Refresh token revoked" })));
    }

    let provided = body["refreshToken"].as_str().unwrap_or_default().to_owned();
    let username = state.valid_refresh_tokens.lock().unwrap().remove(&provided);
    match username {
        // Rotation: the used refresh token is gone, a new pair is issued.
        Some(username) => (StatusCode::OK, Json(state.issue_session(&username))),
        None => (StatusCode::UNAUTHORIZED, Json(json!({ "message": "Unknown refresh token" }))),
    }
}

async fn logout(State(state): State<Arc<BackendState>>) -> impl IntoResponse {
    state.logout_calls.fetch_add(1, Ordering::SeqCst);
    (StatusCode::OK, Json(json!({})))
}

async fn leads(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> impl IntoResponse {
    state.lead_attempts.fetch_add(1, Ordering::SeqCst);
    if !state.bearer_is_valid(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "message": "Unauthorized" })));
    }
    (
        StatusCode::OK,
        Json(json!({
            "leads": [
                { "id": "l1", "name": "Rohit Kumar", "status": "new" },
                { "id": "l2", "name": "Priya Singh", "status": "contacted" },
            ]
        })),
    )
}

async fn flaky(State(state): State<Arc<BackendState>>) -> impl IntoResponse {
    state.flaky_attempts.fetch_add(1, Ordering::SeqCst);
    let remaining = state.flaky_failures_left.load(Ordering::SeqCst);
    if remaining > 0 {
        state.flaky_failures_left.store(remaining - 1, Ordering::SeqCst);
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "message": "transient backend failure" })));
    }
    (StatusCode::OK, Json(json!({ "ok": true })))
}

async fn forbidden(State(state): State<Arc<BackendState>>) -> impl IntoResponse {
    state.forbidden_attempts.fetch_add(1, Ordering::SeqCst);
    (StatusCode::FORBIDDEN, Json(json!({ "message": "Insufficient role" })))
}

async fn empty() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn invalid_entity() -> impl IntoResponse {
    (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "error": "Name is required" })))
}

async fn text_error() -> impl IntoResponse {
    (StatusCode::BAD_REQUEST, "plain failure text")
}

pub struct TestBackend {
    pub server_url: String,
    pub state: Arc<BackendState>,
}

impl TestBackend {
    pub async fn spawn() -> Self {
        setup_tracing();

        let state = Arc::new(BackendState::new());
        let app = Router::new()
            .route("/auth/login", post(login))
            .route("/auth/refresh", post(refresh))
            .route("/auth/logout", post(logout))
            .route("/register", post(register))
            .route("/api/leads", get(leads))
            .route("/api/flaky", get(flaky))
            .route("/api/forbidden", get(forbidden))
            .route("/api/empty", get(empty))
            .route("/api/invalid", get(invalid_entity))
            .route("/api/text-error", get(text_error))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
        let addr = listener.local_addr().expect("listener address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("test backend exited");
        });

        Self { server_url: format!("http://{addr}"), state }
    }
}

pub fn test_config(server_url: &str, session_file: PathBuf) -> Config {
    Config {
        api_url: server_url.to_string(),
        http: HttpConfig { request_timeout_secs: 10, cookie_store: false },
        session: SessionConfig { session_file, refresh_lead_secs: 60 },
        cache: CacheConfig { ttl_secs: 300, max_attempts: 3 },
        telemetry: TelemetryConfig { log_format: LogFormat::Text, otlp_endpoint: None },
    }
}

pub fn build_client(backend: &TestBackend, dir: &tempfile::TempDir) -> LendHubClient {
    build_client_with(backend, dir, |_| {})
}

pub fn build_client_with(
    backend: &TestBackend,
    dir: &tempfile::TempDir,
    tweak: impl FnOnce(&mut Config),
) -> LendHubClient {
    let mut config = test_config(&backend.server_url, dir.path().join("session.json"));
    tweak(&mut config);
    LendHubClient::new(&config).expect("failed to build client")
}
