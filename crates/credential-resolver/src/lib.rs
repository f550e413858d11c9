//! # credential-resolver
//!
//! Decides once, at startup, which operator identity the gateway uses for
//! privileged calls to the configuration store, and mints access tokens for
//! it.
//!
//! Resolution is a strict precedence chain over environment values
//! (service-account JSON, then client email + private key, then the ambient
//! identity of the host, then nothing). "Nothing" is a valid outcome: the
//! gateway degrades to caller-supplied configuration.
//!
//! ```rust
//! use std::collections::HashMap;
//! use credential_resolver::{CredentialSlot, PROJECT_ID_VAR};
//!
//! let env = HashMap::from([(PROJECT_ID_VAR.to_string(), "vpn-shop".to_string())]);
//! let slot = CredentialSlot::new();
//! let credential = slot.get_or_resolve(&env).expect("ambient credential");
//! assert_eq!(credential.project_id(), "vpn-shop");
//! ```

mod error;
mod resolver;
mod source;
mod token;

pub use error::TokenError;
pub use resolver::{
    process_env, resolve, CredentialSlot, CLIENT_EMAIL_VAR, FALLBACK_PROJECT_ID_VAR,
    PRIVATE_KEY_VAR, PROJECT_ID_VAR, SERVICE_ACCOUNT_VAR,
};
pub use source::{normalize_private_key, ActiveCredential, CredentialSource, ServiceAccountKey};
pub use token::{TokenProvider, DATASTORE_SCOPE, DEFAULT_METADATA_TOKEN_URL, DEFAULT_TOKEN_URI};
