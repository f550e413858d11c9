use std::fmt;

/// Why an origin was let through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowReason {
    /// Development mode trusts everyone.
    Development,
    /// Exact match against the allow-list or the frontend URL.
    Listed,
    /// No `Origin` header, and the route accepts server-to-server calls.
    NoOriginPermitted,
}

/// Why an origin was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NotListed,
    MissingOrigin,
    EmptyOrigin,
}

/// Outcome of checking a request's `Origin` against the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginDecision {
    Allow(AllowReason),
    Deny(DenyReason),
}

impl OriginDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, OriginDecision::Allow(_))
    }

    /// Short machine-readable reason, used in logs and audit records.
    pub fn reason(&self) -> &'static str {
        match self {
            OriginDecision::Allow(AllowReason::Development) => "development",
            OriginDecision::Allow(AllowReason::Listed) => "origin_listed",
            OriginDecision::Allow(AllowReason::NoOriginPermitted) => "no_origin_permitted",
            OriginDecision::Deny(DenyReason::NotListed) => "origin_not_listed",
            OriginDecision::Deny(DenyReason::MissingOrigin) => "origin_missing",
            OriginDecision::Deny(DenyReason::EmptyOrigin) => "origin_empty",
        }
    }
}

impl fmt::Display for OriginDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.is_allowed() { "allow" } else { "deny" };
        write!(f, "{verdict} ({})", self.reason())
    }
}

/// What to do with a request given the transport it arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportDecision {
    Proceed,
    /// Answer with a permanent redirect to the `https://` equivalent.
    Redirect,
}
