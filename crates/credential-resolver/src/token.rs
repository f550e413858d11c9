use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::TokenError;
use crate::source::ActiveCredential;

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
pub const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Tokens are refreshed this long before they expire.
const REFRESH_MARGIN_SECS: i64 = 60;
const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    aud: &'a str,
    scope: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + chrono::Duration::seconds(REFRESH_MARGIN_SECS) < self.expires_at
    }
}

/// Mints and caches OAuth2 access tokens for an [`ActiveCredential`].
///
/// Key-based sources sign an RS256 assertion and exchange it at the token
/// endpoint; the ambient source asks the hosting environment's metadata
/// server. Concurrent callers share one refresh.
pub struct TokenProvider {
    credential: Arc<ActiveCredential>,
    client: reqwest::Client,
    scope: String,
    token_uri_override: Option<String>,
    metadata_url: String,
    cache: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(credential: Arc<ActiveCredential>, client: reqwest::Client) -> Self {
        Self {
            credential,
            client,
            scope: DATASTORE_SCOPE.to_string(),
            token_uri_override: None,
            metadata_url: DEFAULT_METADATA_TOKEN_URL.to_string(),
            cache: Mutex::new(None),
        }
    }

    /// Exchange assertions at `uri` instead of the key's own token URI.
    pub fn with_token_uri(mut self, uri: impl Into<String>) -> Self {
        self.token_uri_override = Some(uri.into());
        self
    }

    pub fn with_metadata_url(mut self, url: impl Into<String>) -> Self {
        self.metadata_url = url.into();
        self
    }

    pub fn credential(&self) -> &ActiveCredential {
        &self.credential
    }

    /// A bearer token valid for at least the refresh margin.
    pub async fn access_token(&self) -> Result<String, TokenError> {
        let mut cache = self.cache.lock().await;
        let now = Utc::now();
        if let Some(cached) = cache.as_ref().filter(|c| c.is_fresh(now)) {
            return Ok(cached.token.clone());
        }

        let fresh = self.fetch(now).await?;
        debug!(
            source = self.credential.source().kind(),
            expires_at = %fresh.expires_at,
            "access token refreshed"
        );
        let token = fresh.token.clone();
        *cache = Some(fresh);
        Ok(token)
    }

    /// Drop the cached token so the next call fetches a new one.
    pub async fn invalidate(&self) {
        self.cache.lock().await.take();
    }

    async fn fetch(&self, now: DateTime<Utc>) -> Result<CachedToken, TokenError> {
        let response = match self.credential.signing_material() {
            Some(material) => {
                let token_uri = self
                    .token_uri_override
                    .as_deref()
                    .or(material.token_uri)
                    .unwrap_or(DEFAULT_TOKEN_URI);

                let claims = AssertionClaims {
                    iss: material.client_email,
                    sub: material.client_email,
                    aud: token_uri,
                    scope: &self.scope,
                    iat: now.timestamp(),
                    exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
                };
                let mut header = Header::new(Algorithm::RS256);
                header.kid = material.private_key_id.map(str::to_string);
                let key = EncodingKey::from_rsa_pem(material.private_key.as_bytes())
                    .map_err(TokenError::InvalidKey)?;
                let assertion =
                    jsonwebtoken::encode(&header, &claims, &key).map_err(TokenError::Signing)?;

                info!(
                    client_email = material.client_email,
                    "exchanging signed assertion for access token"
                );
                self.client
                    .post(token_uri)
                    .timeout(TOKEN_REQUEST_TIMEOUT)
                    .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", &assertion)])
                    .send()
                    .await
                    .map_err(TokenError::Transport)?
            }
            None => {
                info!("requesting access token from metadata server");
                self.client
                    .get(&self.metadata_url)
                    .timeout(TOKEN_REQUEST_TIMEOUT)
                    .header("Metadata-Flavor", "Google")
                    .query(&[("scopes", self.scope.as_str())])
                    .send()
                    .await
                    .map_err(TokenError::Transport)?
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(TokenError::Rejected {
                status: status.as_u16(),
            });
        }

        let body: TokenResponse = response.json().await.map_err(TokenError::Transport)?;
        Ok(CachedToken {
            token: body.access_token,
            expires_at: now + chrono::Duration::seconds(body.expires_in),
        })
    }
}
