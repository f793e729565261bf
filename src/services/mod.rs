use crate::error::ApiError;
use reqwest::header::CONTENT_TYPE;

pub mod query_service;
pub mod request_service;
pub mod session_service;

/// Joins a request path onto the configured base URL. Paths that are already
/// absolute pass through untouched.
pub(crate) fn resolve_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        path.to_owned()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

/// Turns a non-2xx response into an [`ApiError::Http`], preferring the
/// backend's `message`/`error`/`detail` fields, then the raw body text, then
/// the status reason.
pub(crate) async fn read_api_error(response: reqwest::Response) -> ApiError {
    let status = response.status();
    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("application/json"));

    let message = if is_json {
        response.json::<serde_json::Value>().await.ok().and_then(|body| {
            ["message", "error", "detail"]
                .iter()
                .find_map(|key| body.get(*key).and_then(serde_json::Value::as_str).map(str::to_owned))
        })
    } else {
        response
            .text()
            .await
            .ok()
            .map(|text| text.trim().to_owned())
            .filter(|text| !text.is_empty())
    };

    let message =
        message.unwrap_or_else(|| status.canonical_reason().unwrap_or("Request failed").to_string());

    ApiError::Http { status: status.as_u16(), message }
}
