use std::collections::HashSet;

use tracing::{debug, warn};

use crate::decision::{AllowReason, DenyReason, OriginDecision, TransportDecision};
use crate::error::PolicyConfigError;
use crate::matcher::{canonical_origin, frontend_origin, is_health_path};
use crate::schema::{Environment, OriginPolicy};

/// Whether plaintext requests must be redirected to HTTPS.
pub fn requires_tls_redirect(environment: Environment) -> bool {
    environment.is_production()
}

/// Evaluates origins and transports against a validated [`OriginPolicy`].
///
/// The trusted set (allow-list plus the frontend origin) is computed once at
/// construction. In production an empty set trusts nobody.
pub struct OriginPolicyEngine {
    policy: OriginPolicy,
    trusted: HashSet<String>,
}

impl std::fmt::Debug for OriginPolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OriginPolicyEngine")
            .field("environment", &self.policy.environment)
            .field("num_trusted", &self.trusted.len())
            .finish()
    }
}

impl OriginPolicyEngine {
    pub fn new(policy: OriginPolicy) -> Result<Self, PolicyConfigError> {
        policy.validate()?;

        let mut trusted = HashSet::new();
        for origin in &policy.allowed_origins {
            if origin.trim() == "*" {
                continue;
            }
            trusted.insert(canonical_origin(origin)?);
        }
        if let Some(frontend) = &policy.frontend_url {
            trusted.insert(frontend_origin(frontend)?);
        }

        if policy.environment.is_production() && trusted.is_empty() {
            warn!("production policy trusts no origins; every browser request will be denied");
        }

        Ok(Self { policy, trusted })
    }

    pub fn policy(&self) -> &OriginPolicy {
        &self.policy
    }

    pub fn environment(&self) -> Environment {
        self.policy.environment
    }

    /// Decide whether a request carrying `origin` may proceed.
    ///
    /// `allow_no_origin` is the route's opt-in for callers without an
    /// `Origin` header. Denials are logged with the rejected origin.
    pub fn decide(&self, origin: Option<&str>, allow_no_origin: bool) -> OriginDecision {
        let decision = self.classify(origin, allow_no_origin);
        match decision {
            OriginDecision::Allow(_) => {
                debug!(origin = origin.unwrap_or("-"), %decision, "origin allowed");
            }
            OriginDecision::Deny(_) => {
                warn!(
                    origin = origin.unwrap_or("-"),
                    environment = %self.policy.environment,
                    reason = decision.reason(),
                    "origin rejected"
                );
            }
        }
        decision
    }

    fn classify(&self, origin: Option<&str>, allow_no_origin: bool) -> OriginDecision {
        if !self.policy.environment.is_production() {
            return OriginDecision::Allow(AllowReason::Development);
        }

        match origin {
            None if allow_no_origin => OriginDecision::Allow(AllowReason::NoOriginPermitted),
            None => OriginDecision::Deny(DenyReason::MissingOrigin),
            Some(o) if o.trim().is_empty() => OriginDecision::Deny(DenyReason::EmptyOrigin),
            Some(o) if self.trusted.contains(o) => OriginDecision::Allow(AllowReason::Listed),
            Some(_) => OriginDecision::Deny(DenyReason::NotListed),
        }
    }

    /// Transport check, applied before routing.
    pub fn transport_decision(&self, path: &str, is_plaintext: bool) -> TransportDecision {
        if requires_tls_redirect(self.policy.environment)
            && is_plaintext
            && !is_health_path(&self.policy.health_paths, path)
        {
            TransportDecision::Redirect
        } else {
            TransportDecision::Proceed
        }
    }

    pub fn is_health_path(&self, path: &str) -> bool {
        is_health_path(&self.policy.health_paths, path)
    }

    pub fn trust_forwarded_proto(&self) -> bool {
        self.policy.trust_forwarded_proto
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn production(origins: &[&str], frontend: Option<&str>) -> OriginPolicyEngine {
        OriginPolicyEngine::new(OriginPolicy {
            environment: Environment::Production,
            allowed_origins: origins.iter().map(|s| s.to_string()).collect(),
            frontend_url: frontend.map(str::to_string),
            ..OriginPolicy::default()
        })
        .unwrap()
    }

    #[test]
    fn production_allows_listed_origin() {
        let engine = production(&["https://shop.example.com/"], None);
        assert_eq!(
            engine.decide(Some("https://shop.example.com"), false),
            OriginDecision::Allow(AllowReason::Listed)
        );
    }

    #[test]
    fn production_allows_frontend_origin() {
        let engine = production(&[], Some("https://app.example.com/"));
        assert!(engine.decide(Some("https://app.example.com"), false).is_allowed());
    }

    #[test]
    fn production_denies_unlisted_origins() {
        let engine = production(&["https://shop.example.com"], Some("https://app.example.com"));
        for origin in [
            "https://evil.example.com",
            "https://shop.example.com.evil.io",
            "http://shop.example.com",
            "https://shop.example.com:8443",
            "null",
        ] {
            assert_eq!(
                engine.decide(Some(origin), true),
                OriginDecision::Deny(DenyReason::NotListed),
                "{origin} should be denied"
            );
        }
    }

    #[test]
    fn allow_list_entries_are_normalized_like_browser_origins() {
        let engine = production(
            &["https://Shop.Example.com", "https://pay.example.com:443"],
            Some("https://App.Example.com:443/checkout"),
        );
        for origin in [
            "https://shop.example.com",
            "https://pay.example.com",
            "https://app.example.com",
        ] {
            assert_eq!(
                engine.decide(Some(origin), false),
                OriginDecision::Allow(AllowReason::Listed),
                "{origin} should be allowed"
            );
        }
    }

    #[test]
    fn production_empty_allow_list_fails_closed() {
        let engine = production(&[], None);
        assert!(!engine.decide(Some("https://shop.example.com"), false).is_allowed());
        assert!(!engine.decide(Some("http://localhost:3000"), false).is_allowed());
    }

    #[test]
    fn production_no_origin_depends_on_route() {
        let engine = production(&["https://shop.example.com"], None);
        assert_eq!(
            engine.decide(None, true),
            OriginDecision::Allow(AllowReason::NoOriginPermitted)
        );
        assert_eq!(
            engine.decide(None, false),
            OriginDecision::Deny(DenyReason::MissingOrigin)
        );
    }

    #[test]
    fn production_empty_origin_is_denied() {
        let engine = production(&["https://shop.example.com"], None);
        assert_eq!(
            engine.decide(Some(""), true),
            OriginDecision::Deny(DenyReason::EmptyOrigin)
        );
    }

    #[test]
    fn development_allows_everything() {
        let engine = OriginPolicyEngine::new(OriginPolicy::default()).unwrap();
        for origin in [Some("https://evil.example.com"), Some(""), None] {
            assert_eq!(
                engine.decide(origin, false),
                OriginDecision::Allow(AllowReason::Development)
            );
        }
        assert!(!requires_tls_redirect(engine.environment()));
        assert_eq!(
            engine.transport_decision("/order", true),
            TransportDecision::Proceed
        );
    }

    #[test]
    fn production_redirects_plaintext_except_health() {
        let engine = production(&["https://shop.example.com"], None);
        assert!(requires_tls_redirect(engine.environment()));
        assert_eq!(
            engine.transport_decision("/order", true),
            TransportDecision::Redirect
        );
        assert_eq!(
            engine.transport_decision("/health", true),
            TransportDecision::Proceed
        );
        assert_eq!(
            engine.transport_decision("/order", false),
            TransportDecision::Proceed
        );
    }

    #[test]
    fn invalid_policy_is_rejected_at_construction() {
        let err = OriginPolicyEngine::new(OriginPolicy {
            environment: Environment::Production,
            allowed_origins: vec!["*".into()],
            ..OriginPolicy::default()
        })
        .unwrap_err();
        assert_eq!(err, PolicyConfigError::WildcardInProduction);
    }
}
