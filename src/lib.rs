#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod storage;
pub mod telemetry;
pub mod workers;

use crate::config::Config;
use crate::error::Result;
use crate::services::query_service::QueryService;
use crate::services::request_service::RequestService;
use crate::services::session_service::SessionService;
use crate::storage::session_store::SessionStore;
use crate::workers::token_refresh::TokenRefreshWorker;
use std::time::Duration;

/// Fully wired client: one session, one request pipeline, one query cache.
///
/// Constructed once at application start and passed by reference to whatever
/// needs it. There is no import-time singleton; a process that wants two
/// independent sessions can build two clients.
#[derive(Debug, Clone)]
pub struct LendHubClient {
    pub session: SessionService,
    pub requests: RequestService,
    pub queries: QueryService,
    refresh_lead_secs: u64,
}

impl LendHubClient {
    /// Builds the HTTP client, loads any persisted session from disk and
    /// wires the services together.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed or the
    /// persisted session file is not readable.
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http.request_timeout_secs))
            .cookie_store(config.http.cookie_store)
            .build()?;

        let store = SessionStore::new(config.session.session_file.clone());
        let session = SessionService::new(http.clone(), config.api_url.clone(), store)?;
        let requests = RequestService::new(http, config.api_url.clone(), session.clone());
        let queries = QueryService::new(
            requests.clone(),
            session.clone(),
            Duration::from_secs(config.cache.ttl_secs),
            config.cache.max_attempts,
        );

        Ok(Self {
            session,
            requests,
            queries,
            refresh_lead_secs: config.session.refresh_lead_secs,
        })
    }

    /// Spawns the proactive token refresh worker. The task runs until the
    /// shutdown signal flips to `true`.
    pub fn spawn_refresh_worker(
        &self,
        shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let worker = TokenRefreshWorker::new(self.session.clone(), self.refresh_lead_secs);
        tokio::spawn(worker.run(shutdown_rx))
    }
}
