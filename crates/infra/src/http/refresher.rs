//! Refresh-endpoint client
//!
//! `POST {refresh_path}` with `{"refreshToken": ...}`. The response carries
//! `accessToken` and optionally `refreshToken`, `tokenType`, `expiresIn`
//! (seconds) and `csrfToken`. Without `expiresIn` the expiry is read from
//! the JWT `exp` claim.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fieldlink_common::time::{Clock, SystemClock};
use fieldlink_core::TokenRefresher;
use fieldlink_domain::constants::DEFAULT_TOKEN_SCHEME;
use fieldlink_domain::{AuthError, HttpMethod, Token, TransportError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::client::HttpClient;
use super::transport::read_response;

const UNAUTHORIZED: u16 = 401;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
    refresh_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<u64>,
    csrf_token: Option<String>,
}

impl RefreshResponse {
    fn into_token(self, now: DateTime<Utc>) -> Result<Token, AuthError> {
        let scheme = self.token_type.unwrap_or_else(|| DEFAULT_TOKEN_SCHEME.to_string());
        let mut token = match self.expires_in {
            Some(secs) => {
                let lifetime = chrono::Duration::from_std(Duration::from_secs(secs))
                    .map_err(|e| AuthError::Malformed(format!("expiresIn out of range: {e}")))?;
                Token::new(self.access_token, scheme, now, now + lifetime)?
            }
            None => Token { scheme, ..Token::from_jwt(self.access_token, now)? },
        };
        token.refresh_value = self.refresh_token.filter(|value| !value.is_empty());
        token.csrf_value = self.csrf_token;
        Ok(token)
    }
}

/// [`TokenRefresher`] calling the backend refresh endpoint directly
///
/// Goes straight to the HTTP client, never through the request pipeline,
/// so a refresh cannot recurse into credential injection.
pub struct HttpTokenRefresher<C: Clock = SystemClock> {
    client: HttpClient,
    refresh_path: String,
    clock: Arc<C>,
}

impl HttpTokenRefresher<SystemClock> {
    pub fn new(client: HttpClient, refresh_path: impl Into<String>) -> Self {
        Self::with_clock(client, refresh_path, Arc::new(SystemClock))
    }
}

impl<C: Clock> HttpTokenRefresher<C> {
    pub fn with_clock(client: HttpClient, refresh_path: impl Into<String>, clock: Arc<C>) -> Self {
        Self { client, refresh_path: refresh_path.into(), clock }
    }
}

#[async_trait]
impl<C: Clock> TokenRefresher for HttpTokenRefresher<C> {
    #[instrument(skip_all, fields(path = %self.refresh_path))]
    async fn refresh(&self, refresh_value: &str) -> Result<Token, AuthError> {
        let builder = self
            .client
            .request(HttpMethod::Post, &self.refresh_path)?
            .json(&RefreshRequest { refresh_token: refresh_value });

        let response = match read_response(self.client.execute(builder).await?).await {
            Ok(response) => response,
            Err(TransportError::BadResponse { status: UNAUTHORIZED, .. }) => {
                warn!("Refresh token rejected by server");
                return Err(AuthError::InvalidRefreshToken);
            }
            Err(e) => return Err(AuthError::Network(e)),
        };

        let body = response
            .body
            .ok_or_else(|| AuthError::Malformed("empty refresh response".to_string()))?;
        let parsed: RefreshResponse = serde_json::from_value(body)
            .map_err(|e| AuthError::Malformed(format!("refresh response: {e}")))?;
        let rotated = parsed.refresh_token.is_some();

        let token = parsed.into_token(self.clock.now_utc())?;
        info!(expires_at = %token.expires_at, rotated, "Token refreshed");
        debug!(has_csrf = token.csrf_value.is_some(), "Refresh response parsed");
        Ok(token)
    }
}
