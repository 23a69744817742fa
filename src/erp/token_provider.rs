use std::time::Duration;

use oauth2::{
    basic::BasicClient, reqwest::async_http_client, AuthUrl, ClientId, ClientSecret,
    TokenResponse, TokenUrl,
};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument};

use super::ErpError;

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    /// Expiry minus the configured skew
    refresh_at: Instant,
}

/// Fetches and caches the ERP bearer token.
///
/// The token is reused until `expires_in - skew` has elapsed. Callers that
/// arrive while a fetch is in flight wait on the lock and reuse its result.
#[derive(Debug)]
pub struct TokenProvider {
    client: BasicClient,
    skew: Duration,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        skew: Duration,
    ) -> Result<Self, ErpError> {
        let token_url = token_url.into();
        // the client-credentials grant never visits the authorization endpoint
        let client = BasicClient::new(
            ClientId::new(client_id.into()),
            Some(ClientSecret::new(client_secret.into())),
            AuthUrl::new(token_url.clone()).map_err(|e| ErpError::Token(e.to_string()))?,
            Some(TokenUrl::new(token_url).map_err(|e| ErpError::Token(e.to_string()))?),
        )
        .set_auth_type(oauth2::AuthType::RequestBody);

        Ok(Self {
            client,
            skew,
            cached: Mutex::new(None),
        })
    }

    /// A valid access token, from cache when still fresh.
    #[instrument(skip(self))]
    pub async fn token(&self) -> Result<String, ErpError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.access_token.clone());
            }
        }

        let fetched_at = Instant::now();
        let response = self
            .client
            .exchange_client_credentials()
            .request_async(async_http_client)
            .await
            .map_err(|e| ErpError::Token(describe_token_error(&e)))?;

        let access_token = response.access_token().secret().clone();
        if access_token.trim().is_empty() {
            return Err(ErpError::Token("empty access token".into()));
        }
        let lifetime = response.expires_in().unwrap_or(DEFAULT_TOKEN_LIFETIME);
        let refresh_at = fetched_at + lifetime.saturating_sub(self.skew);
        debug!(expires_in = lifetime.as_secs(), "ERP token refreshed");

        *cached = Some(CachedToken {
            access_token: access_token.clone(),
            refresh_at,
        });
        Ok(access_token)
    }

    /// Drops the cached token, e.g. after the ERP rejected it.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

fn describe_token_error<RE, T>(err: &oauth2::RequestTokenError<RE, T>) -> String
where
    RE: std::error::Error + 'static,
    T: oauth2::ErrorResponse + std::fmt::Display + 'static,
{
    match err {
        oauth2::RequestTokenError::ServerResponse(response) => response.to_string(),
        oauth2::RequestTokenError::Parse(parse_err, body) => format!(
            "invalid token response: {parse_err}: {}",
            super::truncate_body(&String::from_utf8_lossy(body))
        ),
        other => other.to_string(),
    }
}
