use crate::api::schemas::auth::AuthSession;
use crate::domain::token;
use crate::domain::user::UserProfile;
use crate::error::ApiError;

/// An authenticated session. The type itself enforces the invariant that a
/// user profile is present exactly when an access token is: anonymous state
/// is `Option::<Session>::None`, never a half-empty session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub user: UserProfile,
}

impl Session {
    /// Unix timestamp of access-token expiry, if the token carries a
    /// readable `exp` claim.
    #[must_use]
    pub fn expires_at(&self) -> Option<i64> {
        token::expiry_unix(&self.access_token)
    }
}

impl TryFrom<AuthSession> for Session {
    type Error = ApiError;

    /// Validates the shape of an auth endpoint response: token, refresh
    /// token, email, role and both name fields must be present and
    /// non-empty, and the role must be one the client knows.
    fn try_from(response: AuthSession) -> Result<Self, Self::Error> {
        let AuthSession { token, refresh_token, user_id, email, role, first_name, last_name, phone } = response;

        let required = [&token, &refresh_token, &email, &role, &first_name, &last_name];
        if required.iter().any(|field| field.trim().is_empty()) {
            return Err(ApiError::InvalidResponse);
        }

        let role = role.parse()?;

        Ok(Self {
            access_token: token,
            refresh_token: Some(refresh_token),
            user: UserProfile { user_id, email, first_name, last_name, role, phone },
        })
    }
}
