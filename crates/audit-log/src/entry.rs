use serde::{Deserialize, Serialize};

/// One security-relevant gateway event, serialised as a single JSON line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: uuid::Uuid,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub event_type: AuditEventType,
    pub source: AuditSource,
    pub details: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_decision: Option<PolicyDecisionRecord>,
}

impl AuditEntry {
    /// Create an entry stamped with a fresh UUID v4 and the current UTC time.
    pub fn new(
        event_type: AuditEventType,
        source: AuditSource,
        details: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            event_type,
            source,
            details,
            policy_decision: None,
        }
    }

    /// Attach the origin/transport decision that produced this event.
    pub fn with_policy_decision(mut self, decision: PolicyDecisionRecord) -> Self {
        self.policy_decision = Some(decision);
        self
    }
}

/// The category of gateway event being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    ProcessStarted,
    ProcessStopped,
    CredentialResolved,
    CredentialUnavailable,
    RouteDisabled,
    OriginRejected,
    TlsRedirected,
    RequestForwarded,
    UpstreamRejected,
    UpstreamFailed,
    SettingsDegraded,
}

/// Which component emitted the event, plus the request it concerns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSource {
    pub component: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_addr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl AuditSource {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            origin: None,
            remote_addr: None,
            request_id: None,
        }
    }

    pub fn with_origin(mut self, origin: Option<&str>) -> Self {
        self.origin = origin.map(str::to_string);
        self
    }

    pub fn with_request_id(mut self, request_id: impl ToString) -> Self {
        self.request_id = Some(request_id.to_string());
        self
    }

    pub fn with_remote_addr(mut self, remote_addr: Option<impl ToString>) -> Self {
        self.remote_addr = remote_addr.map(|a| a.to_string());
        self
    }
}

/// Outcome of a policy evaluation attached to an audit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDecisionRecord {
    pub decision: String,
    pub reason: String,
}
