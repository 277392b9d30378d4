//! Access/refresh token pair

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_TOKEN_SCHEME;
use crate::errors::AuthError;

/// Credentials for authenticated requests
///
/// Replaced wholesale on every refresh, never mutated in place.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub access_value: String,
    pub scheme: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub refresh_value: Option<String>,
    pub csrf_value: Option<String>,
}

// Secrets stay out of logs.
impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("scheme", &self.scheme)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("has_refresh", &self.refresh_value.is_some())
            .field("has_csrf", &self.csrf_value.is_some())
            .finish()
    }
}

/// Where a token sits in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    NoToken,
    Valid,
    /// Inside the refresh window but still usable
    NearExpiry,
    Expired,
    /// A refresh is in flight
    Refreshing,
}

#[derive(Deserialize)]
struct JwtClaims {
    exp: i64,
    iat: Option<i64>,
}

impl Token {
    /// Build a token, rejecting `expires_at <= issued_at`
    pub fn new(
        access_value: impl Into<String>,
        scheme: impl Into<String>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Self, AuthError> {
        if expires_at <= issued_at {
            return Err(AuthError::Malformed("expires_at must be after issued_at".to_string()));
        }
        let access_value = access_value.into();
        if access_value.is_empty() {
            return Err(AuthError::Malformed("empty access token".to_string()));
        }

        Ok(Self {
            access_value,
            scheme: scheme.into(),
            issued_at,
            expires_at,
            refresh_value: None,
            csrf_value: None,
        })
    }

    /// Bearer token valid for `lifetime` from `issued_at`
    pub fn bearer(
        access_value: impl Into<String>,
        issued_at: DateTime<Utc>,
        lifetime: Duration,
    ) -> Result<Self, AuthError> {
        let lifetime = chrono::Duration::from_std(lifetime)
            .map_err(|e| AuthError::Malformed(format!("lifetime out of range: {e}")))?;
        Self::new(access_value, DEFAULT_TOKEN_SCHEME, issued_at, issued_at + lifetime)
    }

    /// Build a token from a JWT access value, reading `exp` and `iat` from
    /// its payload. The signature is not checked; the server does that.
    pub fn from_jwt(access_value: impl Into<String>, now: DateTime<Utc>) -> Result<Self, AuthError> {
        let access_value = access_value.into();
        let payload = access_value
            .split('.')
            .nth(1)
            .ok_or_else(|| AuthError::Malformed("not a JWT".to_string()))?;
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| AuthError::Malformed(format!("JWT payload: {e}")))?;
        let claims: JwtClaims = serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::Malformed(format!("JWT claims: {e}")))?;

        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or_else(|| AuthError::Malformed("exp out of range".to_string()))?;
        let issued_at = claims
            .iat
            .and_then(|iat| Utc.timestamp_opt(iat, 0).single())
            .unwrap_or(now)
            .min(now);

        Self::new(access_value, DEFAULT_TOKEN_SCHEME, issued_at, expires_at)
    }

    pub fn with_refresh_value(mut self, refresh_value: impl Into<String>) -> Self {
        self.refresh_value = Some(refresh_value.into());
        self
    }

    pub fn with_csrf_value(mut self, csrf_value: impl Into<String>) -> Self {
        self.csrf_value = Some(csrf_value.into());
        self
    }

    /// Apply refresh-token rotation: keep this token's refresh value if it
    /// has one, otherwise carry over `previous`
    pub fn retaining_refresh_from(mut self, previous: &Token) -> Self {
        if self.refresh_value.is_none() {
            self.refresh_value.clone_from(&previous.refresh_value);
        }
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn should_refresh(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now >= self.refresh_at(window)
    }

    /// The moment the token enters its refresh window
    pub fn refresh_at(&self, window: Duration) -> DateTime<Utc> {
        let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::zero());
        self.expires_at - window
    }

    pub fn state(&self, now: DateTime<Utc>, window: Duration) -> TokenState {
        if self.is_expired(now) {
            TokenState::Expired
        } else if self.should_refresh(now, window) {
            TokenState::NearExpiry
        } else {
            TokenState::Valid
        }
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_value.as_deref().is_some_and(|value| !value.is_empty())
    }

    /// Value for the `Authorization` header
    pub fn authorization_value(&self) -> String {
        format!("{} {}", self.scheme, self.access_value)
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}
