//! Leak pattern library.
//!
//! Static catalogue of regexes describing material that must never reach a
//! browser through the gateway: credentials, private keys, links into the
//! internal network, and server-side stack traces.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad classification of what a pattern protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternCategory {
    /// Tokens, API keys, passwords, session cookies.
    Credential,
    /// PEM blocks and service-account key fields.
    PrivateKey,
    /// Hostnames and addresses of the internal network.
    InternalTopology,
    /// Server-side stack frames and tracebacks.
    StackTrace,
    /// Literal secret values registered by the gateway at startup.
    ConfiguredSecret,
}

impl fmt::Display for PatternCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Credential => write!(f, "Credential"),
            Self::PrivateKey => write!(f, "PrivateKey"),
            Self::InternalTopology => write!(f, "InternalTopology"),
            Self::StackTrace => write!(f, "StackTrace"),
            Self::ConfiguredSecret => write!(f, "ConfiguredSecret"),
        }
    }
}

pub struct LeakPattern {
    /// snake_case identifier used in logs and findings.
    pub name: &'static str,
    pub category: PatternCategory,
    pub pattern: &'static str,
}

pub static PATTERNS: &[LeakPattern] = &[
    // ---- Credentials ----------------------------------------------------
    LeakPattern {
        name: "bearer_token",
        category: PatternCategory::Credential,
        pattern: r"(?i)\bbearer\s+[A-Za-z0-9\-._~+/]+=*",
    },
    LeakPattern {
        name: "basic_auth",
        category: PatternCategory::Credential,
        pattern: r"(?i)\bbasic\s+[A-Za-z0-9+/]{8,}={0,2}",
    },
    LeakPattern {
        name: "secret_assignment",
        category: PatternCategory::Credential,
        pattern: r#"(?i)\b(api[_-]?key|x-n8n-api-key|access[_-]?token|refresh[_-]?token|client[_-]?secret|password|passwd|secret)\b["']?\s*[:=]\s*["']?[^\s"',}]+"#,
    },
    LeakPattern {
        name: "cookie_header",
        category: PatternCategory::Credential,
        pattern: r"(?i)\b(set-)?cookie\s*:\s*[^\r\n]+",
    },
    LeakPattern {
        name: "url_userinfo",
        category: PatternCategory::Credential,
        pattern: r"(?i)\b[a-z][a-z0-9+.\-]*://[^/\s:@]+:[^/\s@]+@",
    },
    // ---- Private keys ---------------------------------------------------
    LeakPattern {
        name: "pem_private_key",
        category: PatternCategory::PrivateKey,
        pattern: r"(?s)-----BEGIN [A-Z ]*PRIVATE KEY-----.*?-----END [A-Z ]*PRIVATE KEY-----",
    },
    LeakPattern {
        name: "private_key_field",
        category: PatternCategory::PrivateKey,
        pattern: r#"(?i)"private_key"\s*:\s*"[^"]*""#,
    },
    // ---- Internal topology ----------------------------------------------
    LeakPattern {
        name: "private_network_url",
        category: PatternCategory::InternalTopology,
        pattern: r#"(?i)\b(https?|wss?)://(localhost|127\.\d{1,3}\.\d{1,3}\.\d{1,3}|10\.\d{1,3}\.\d{1,3}\.\d{1,3}|192\.168\.\d{1,3}\.\d{1,3}|172\.(1[6-9]|2\d|3[01])\.\d{1,3}\.\d{1,3}|[a-z0-9.\-]+\.(internal|local|lan|svc|cluster\.local))(:\d+)?[^\s"'<>]*"#,
    },
    LeakPattern {
        name: "private_ip_port",
        category: PatternCategory::InternalTopology,
        pattern: r"\b(10\.\d{1,3}\.\d{1,3}\.\d{1,3}|192\.168\.\d{1,3}\.\d{1,3}|172\.(1[6-9]|2\d|3[01])\.\d{1,3}\.\d{1,3}):\d{2,5}\b",
    },
    // ---- Stack traces ---------------------------------------------------
    LeakPattern {
        name: "js_stack_frame",
        category: PatternCategory::StackTrace,
        pattern: r"(?m)^\s*at\s+\S[^\n]*:\d+:\d+\)?\s*$",
    },
    LeakPattern {
        name: "python_traceback",
        category: PatternCategory::StackTrace,
        pattern: r"(?m)^Traceback \(most recent call last\):",
    },
    LeakPattern {
        name: "python_frame",
        category: PatternCategory::StackTrace,
        pattern: r#"(?m)^\s*File "[^"]+", line \d+"#,
    },
];
