use thiserror::Error;

/// Failure to obtain an access token for a resolved credential.
///
/// None of the variants carry secret material in their messages.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("private key could not be loaded: {0}")]
    InvalidKey(#[source] jsonwebtoken::errors::Error),

    #[error("failed to sign token assertion: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),

    #[error("token endpoint unreachable: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("token endpoint rejected the request with status {status}")]
    Rejected { status: u16 },
}
