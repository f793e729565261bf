use base64::Engine;
use serde::Deserialize;

#[derive(Deserialize)]
struct ExpClaim {
    exp: i64,
}

/// Reads the `exp` claim out of a JWT payload without verifying the
/// signature. The backend is the sole authority on token validity; this is
/// only a scheduling hint for the proactive refresh.
#[must_use]
pub fn expiry_unix(token: &str) -> Option<i64> {
    let payload = token.split('.').nth(1)?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(payload).ok()?;
    serde_json::from_slice::<ExpClaim>(&bytes).ok().map(|c| c.exp)
}
