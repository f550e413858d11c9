use std::fmt;

/// Lifecycle of one inbound request. Transitions only move forward:
///
/// ```text
/// Received -> PolicyCheck -> Denied
///                         -> Forwarding -> UpstreamOk
///                                       -> UpstreamFailure
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Received,
    PolicyCheck,
    Denied,
    Forwarding,
    UpstreamOk,
    UpstreamFailure,
}

impl RequestPhase {
    pub fn can_advance_to(self, next: RequestPhase) -> bool {
        use RequestPhase::*;
        matches!(
            (self, next),
            (Received, PolicyCheck)
                | (PolicyCheck, Denied)
                | (PolicyCheck, Forwarding)
                | (Forwarding, UpstreamOk)
                | (Forwarding, UpstreamFailure)
        )
    }

    /// Move to `next`. An illegal transition leaves the phase unchanged and
    /// returns `false`.
    pub fn advance(&mut self, next: RequestPhase) -> bool {
        if self.can_advance_to(next) {
            *self = next;
            true
        } else {
            tracing::error!(from = %self, to = %next, "illegal request phase transition");
            false
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestPhase::Denied | RequestPhase::UpstreamOk | RequestPhase::UpstreamFailure
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestPhase::Received => "received",
            RequestPhase::PolicyCheck => "policy_check",
            RequestPhase::Denied => "denied",
            RequestPhase::Forwarding => "forwarding",
            RequestPhase::UpstreamOk => "upstream_ok",
            RequestPhase::UpstreamFailure => "upstream_failure",
        }
    }
}

impl fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
