use crate::error::{ApiError, Result};
use crate::services::session_service::SessionService;
use crate::services::{read_api_error, resolve_url};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Per-request knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestOptions {
    /// Skip attaching the bearer token (public routes).
    pub skip_auth: bool,
}

/// The one HTTP pipeline every authenticated API call goes through: token
/// attachment, the consolidated 401 policy (one central refresh, one
/// replay, then fatal) and error classification.
#[derive(Debug, Clone)]
pub struct RequestService {
    http: reqwest::Client,
    base_url: String,
    session: SessionService,
}

impl RequestService {
    #[must_use]
    pub const fn new(http: reqwest::Client, base_url: String, session: SessionService) -> Self {
        Self { http, base_url, session }
    }

    /// GET expecting a JSON body.
    ///
    /// # Errors
    /// See [`request`](Self::request); a 204 here is an `InvalidResponse`.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request::<T, ()>(Method::GET, path, None, RequestOptions::default())
            .await?
            .ok_or(ApiError::InvalidResponse)
    }

    /// POST with a JSON body, expecting a JSON body back.
    ///
    /// # Errors
    /// See [`request`](Self::request); a 204 here is an `InvalidResponse`.
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        self.request(Method::POST, path, Some(body), RequestOptions::default())
            .await?
            .ok_or(ApiError::InvalidResponse)
    }

    /// PUT with a JSON body, expecting a JSON body back.
    ///
    /// # Errors
    /// See [`request`](Self::request); a 204 here is an `InvalidResponse`.
    pub async fn put<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        self.request(Method::PUT, path, Some(body), RequestOptions::default())
            .await?
            .ok_or(ApiError::InvalidResponse)
    }

    /// DELETE; tolerates an empty 204 response.
    ///
    /// # Errors
    /// See [`request`](Self::request).
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.request::<serde_json::Value, ()>(Method::DELETE, path, None, RequestOptions::default())
            .await
            .map(|_| ())
    }

    /// Performs a request. Resolves to `None` for 204 responses.
    ///
    /// On a 401 the session manager is asked for one single-flight refresh
    /// and the request is replayed exactly once; a second 401, or no
    /// refresh token to begin with, invalidates the session (observers see
    /// `Anonymous`) and surfaces `Unauthorized`.
    ///
    /// # Errors
    /// `Unauthorized` after the policy above gives up, `Http` for other
    /// non-2xx responses, `Network` for classified transport failures.
    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        match self.execute(method.clone(), path, body, options).await {
            Err(ApiError::Unauthorized) if !options.skip_auth => {
                if self.session.refresh_access_token().await {
                    tracing::debug!(path, "Replaying request after token refresh");
                    match self.execute(method, path, body, options).await {
                        Err(ApiError::Unauthorized) => {
                            self.session.invalidate();
                            Err(ApiError::Unauthorized)
                        }
                        other => other,
                    }
                } else {
                    // No refresh token, or the exchange failed. Either way
                    // the session is gone.
                    self.session.invalidate();
                    Err(ApiError::Unauthorized)
                }
            }
            other => other,
        }
    }

    async fn execute<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        let url = resolve_url(&self.base_url, path);
        let mut request = self.http.request(method, url);

        // Content-Type is only set when a body actually exists.
        if let Some(body) = body {
            request = request.json(body);
        }
        if !options.skip_auth {
            if let Some(token) = self.session.token() {
                request = request.bearer_auth(token);
            }
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(read_api_error(response).await);
        }

        Ok(Some(response.json::<T>().await.map_err(|_| ApiError::InvalidResponse)?))
    }
}
