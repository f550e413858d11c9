use thiserror::Error;

/// A policy section that must not be served.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyConfigError {
    #[error("allowed origin '{0}' is not an absolute http(s) origin")]
    InvalidOrigin(String),

    #[error("allowed origin '{0}' must not carry a path, query or fragment")]
    OriginHasPath(String),

    #[error("wildcard origin '*' is not permitted in production")]
    WildcardInProduction,

    #[error("frontend url '{0}' is not an absolute http(s) url")]
    InvalidFrontendUrl(String),

    #[error("health path '{0}' must start with '/'")]
    InvalidHealthPath(String),
}
