use credential_resolver::TokenError;
use thiserror::Error;

/// Errors returned by a [`SettingsStore`](crate::SettingsStore).
///
/// Callers treat every variant the same way: fall back to the caller's
/// inline settings.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not obtain an access token: {0}")]
    Token(#[from] TokenError),

    #[error("document store unreachable: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("document store answered with status {status}")]
    Status { status: u16 },

    #[error("invalid document reference: {0}")]
    InvalidReference(String),

    #[error("document could not be decoded: {0}")]
    Decode(String),
}
