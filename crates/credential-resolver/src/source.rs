use std::fmt;

use serde::Deserialize;

/// A service-account key as distributed by the document-store provider.
///
/// Only the fields the gateway needs are kept; unknown fields are ignored.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("private_key_id", &self.private_key_id.as_ref().map(|_| "<redacted>"))
            .field("project_id", &self.project_id)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

/// Where the operator identity comes from.
///
/// Exactly one variant is chosen per process and never changes afterwards.
#[derive(Clone)]
pub enum CredentialSource {
    /// A complete service-account JSON blob.
    ServiceAccountJson(ServiceAccountKey),
    /// Client email and private key supplied as separate values.
    SplitKeyPair {
        client_email: String,
        private_key: String,
    },
    /// Identity discovered from the hosting environment.
    AmbientDefault,
    /// No usable identity; elevated calls degrade.
    Unavailable,
}

impl CredentialSource {
    /// Stable label used in logs and audit records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ServiceAccountJson(_) => "service_account_json",
            Self::SplitKeyPair { .. } => "split_key_pair",
            Self::AmbientDefault => "ambient_default",
            Self::Unavailable => "unavailable",
        }
    }

    /// Client email of the identity, when the source carries one.
    pub fn client_email(&self) -> Option<&str> {
        match self {
            Self::ServiceAccountJson(key) => Some(&key.client_email),
            Self::SplitKeyPair { client_email, .. } => Some(client_email),
            Self::AmbientDefault | Self::Unavailable => None,
        }
    }
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServiceAccountJson(key) => {
                f.debug_tuple("ServiceAccountJson").field(key).finish()
            }
            Self::SplitKeyPair { client_email, .. } => f
                .debug_struct("SplitKeyPair")
                .field("client_email", client_email)
                .field("private_key", &"<redacted>")
                .finish(),
            Self::AmbientDefault => f.write_str("AmbientDefault"),
            Self::Unavailable => f.write_str("Unavailable"),
        }
    }
}

/// The resolved identity used for privileged calls.
///
/// Built once at startup and shared read-only behind an `Arc`.
#[derive(Debug, Clone)]
pub struct ActiveCredential {
    source: CredentialSource,
    project_id: String,
}

impl ActiveCredential {
    /// Returns `None` for [`CredentialSource::Unavailable`].
    pub fn new(source: CredentialSource, project_id: impl Into<String>) -> Option<Self> {
        if matches!(source, CredentialSource::Unavailable) {
            return None;
        }
        Some(Self {
            source,
            project_id: project_id.into(),
        })
    }

    pub fn source(&self) -> &CredentialSource {
        &self.source
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Private key material for JWT-bearer flows, if the source has one.
    pub(crate) fn signing_material(&self) -> Option<SigningMaterial<'_>> {
        match &self.source {
            CredentialSource::ServiceAccountJson(key) => Some(SigningMaterial {
                client_email: &key.client_email,
                private_key: &key.private_key,
                private_key_id: key.private_key_id.as_deref(),
                token_uri: key.token_uri.as_deref(),
            }),
            CredentialSource::SplitKeyPair {
                client_email,
                private_key,
            } => Some(SigningMaterial {
                client_email,
                private_key,
                private_key_id: None,
                token_uri: None,
            }),
            CredentialSource::AmbientDefault | CredentialSource::Unavailable => None,
        }
    }
}

pub(crate) struct SigningMaterial<'a> {
    pub client_email: &'a str,
    pub private_key: &'a str,
    pub private_key_id: Option<&'a str>,
    pub token_uri: Option<&'a str>,
}

/// Turn every two-character `\n` escape into a real line break.
///
/// Keys copied into environment variables usually arrive as a single line
/// with escaped breaks, which PEM parsers reject.
pub fn normalize_private_key(raw: &str) -> String {
    raw.replace("\\n", "\n")
}
