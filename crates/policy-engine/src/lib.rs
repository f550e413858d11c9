//! # policy-engine
//!
//! Environment-sensitive cross-origin and transport policy for the secure
//! gateway. Development trusts every origin; production fails closed and
//! trusts only the configured origins and the frontend URL. Production also
//! redirects plaintext traffic to HTTPS, except on health paths.
//!
//! ## Quick start
//!
//! ```rust
//! use policy_engine::{loader, OriginPolicyEngine, TransportDecision};
//!
//! let policy = loader::load_policy_from_str(
//!     "environment: production\nallowed_origins: [\"https://shop.example.com\"]\n",
//! )
//! .unwrap();
//! let engine = OriginPolicyEngine::new(policy).unwrap();
//! assert!(engine.decide(Some("https://shop.example.com"), false).is_allowed());
//! assert!(!engine.decide(Some("https://evil.example.com"), false).is_allowed());
//! assert_eq!(engine.transport_decision("/order", true), TransportDecision::Redirect);
//! ```

mod decision;
mod error;
mod evaluator;
pub mod loader;
pub mod matcher;
mod schema;

pub use decision::{AllowReason, DenyReason, OriginDecision, TransportDecision};
pub use error::PolicyConfigError;
pub use evaluator::{requires_tls_redirect, OriginPolicyEngine};
pub use schema::{Environment, OriginPolicy};
