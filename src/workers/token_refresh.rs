use crate::domain::token;
use crate::services::session_service::SessionService;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

/// Proactively refreshes the access token shortly before it expires, so
/// requests rarely run into a 401 in the first place.
#[derive(Debug)]
pub struct TokenRefreshWorker {
    session: SessionService,
    refresh_lead_secs: u64,
}

impl TokenRefreshWorker {
    #[must_use]
    pub const fn new(session: SessionService, refresh_lead_secs: u64) -> Self {
        Self { session, refresh_lead_secs }
    }

    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut session_rx = self.session.subscribe();

        while !*shutdown.borrow() {
            let deadline = self.next_refresh_deadline();
            tokio::select! {
                () = sleep_until_or_forever(deadline) => {
                    tracing::debug!("Proactive token refresh firing");
                    // Safe after logout: refreshing without a refresh token
                    // is a no-op.
                    self.session.refresh_access_token().await;
                }
                changed = session_rx.changed() => {
                    // New token or logout; recompute the deadline.
                    if changed.is_err() {
                        break;
                    }
                }
                _ = shutdown.changed() => {}
            }
        }
        tracing::info!("Token refresh worker shutting down");
    }

    /// The next instant to refresh at: `exp - lead`. Nothing is armed when
    /// there is no token, the token has no readable `exp`, or the window
    /// has already passed (the on-401 path covers that).
    fn next_refresh_deadline(&self) -> Option<Instant> {
        let access_token = self.session.token()?;
        let expires_at = token::expiry_unix(&access_token)?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs() as i64;

        let fire_in = expires_at - now - self.refresh_lead_secs as i64;
        (fire_in > 0).then(|| Instant::now() + Duration::from_secs(fire_in as u64))
    }
}

async fn sleep_until_or_forever(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
