//! Applies a [`SanitizeMode`] to the findings of the [`Scanner`].

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::scanner::{Finding, Scanner, ScannerError};

/// What to do with a body that contains leak findings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanitizeMode {
    /// Replace every matched span with `[REDACTED]`, keep the rest.
    #[default]
    Redact,
    /// Discard the whole body in favour of a fixed placeholder.
    Replace,
}

const REDACTED: &str = "[REDACTED]";

/// Body returned in [`SanitizeMode::Replace`].
pub const REPLACEMENT_BODY: &str = r#"{"error":"upstream returned an error"}"#;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizeResult {
    /// `None` when nothing matched and the text is unchanged.
    pub modified_text: Option<String>,
    pub findings: Vec<Finding>,
}

impl SanitizeResult {
    pub fn has_findings(&self) -> bool {
        !self.findings.is_empty()
    }
}

/// Removes secrets and internal detail from bodies relayed to clients.
///
/// ```rust
/// use body_sanitizer::{BodySanitizer, SanitizeMode};
///
/// let sanitizer = BodySanitizer::new(SanitizeMode::Redact, ["panel-session-abcdef"]).unwrap();
/// let result = sanitizer.sanitize("login failed for session panel-session-abcdef");
/// assert!(result.has_findings());
/// assert!(!result.modified_text.unwrap().contains("panel-session-abcdef"));
/// ```
pub struct BodySanitizer {
    scanner: Scanner,
    mode: SanitizeMode,
}

impl BodySanitizer {
    pub fn new<I, S>(mode: SanitizeMode, literal_secrets: I) -> Result<Self, ScannerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self {
            scanner: Scanner::new(literal_secrets)?,
            mode,
        })
    }

    /// Redact only the given literal secrets. Used for successful upstream
    /// bodies, where catalogue patterns would touch legitimate payloads.
    pub fn literals_only<I, S>(literal_secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scanner: Scanner::literals_only(literal_secrets),
            mode: SanitizeMode::Redact,
        }
    }

    pub fn mode(&self) -> SanitizeMode {
        self.mode
    }

    pub fn sanitize(&self, text: &str) -> SanitizeResult {
        let findings = self.scanner.scan(text);

        if findings.is_empty() {
            return SanitizeResult {
                modified_text: None,
                findings,
            };
        }

        for f in &findings {
            warn!(
                pattern = %f.pattern_name,
                category = %f.category,
                offset = f.offset,
                "sensitive content removed from upstream body"
            );
        }

        let modified_text = match self.mode {
            SanitizeMode::Redact => redact(text, &findings),
            SanitizeMode::Replace => REPLACEMENT_BODY.to_string(),
        };

        SanitizeResult {
            modified_text: Some(modified_text),
            findings,
        }
    }

    /// Sanitize a raw body. Non-UTF-8 bodies are returned unchanged.
    pub fn sanitize_bytes(&self, body: &[u8]) -> Option<Vec<u8>> {
        let text = std::str::from_utf8(body).ok()?;
        self.sanitize(text).modified_text.map(String::into_bytes)
    }
}

/// Replace each finding's span left-to-right. Findings overlapping an
/// already replaced span are merged into it.
fn redact(text: &str, findings: &[Finding]) -> String {
    let mut result = String::with_capacity(text.len());
    let mut cursor: usize = 0;

    for finding in findings {
        let end = finding.end();
        if end <= cursor {
            continue;
        }
        if finding.offset < cursor {
            // Overlap: extend the previous redaction.
            cursor = end;
            continue;
        }
        result.push_str(&text[cursor..finding.offset]);
        result.push_str(REDACTED);
        cursor = end;
    }

    result.push_str(&text[cursor..]);
    result
}
