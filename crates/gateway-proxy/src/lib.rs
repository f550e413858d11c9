//! HTTP surface and request forwarder of the secure gateway.
//!
//! The gateway sits between a browser client and upstream webhook/panel
//! APIs. Each request passes a transport check, a route lookup and the
//! origin policy before the [`Forwarder`] calls the upstream with the
//! server-held secret attached.
//!
//! # Architecture
//!
//! ```text
//! Browser  --HTTP-->  gateway-proxy  --HTTP-->  webhook / panel API
//!                         |
//!            [origin policy] [route table]
//!            [settings store] [body sanitizer]
//!                         |
//!                   [Audit Sink]
//! ```
//!
//! Targets come from configuration only. Client credentials are stripped,
//! upstream response headers are allow-listed, and error bodies are
//! sanitized before they reach the browser.

pub mod error;
pub mod forwarder;
pub mod listener;
pub mod origin;
pub mod phase;
pub mod route;

pub use error::GatewayError;
pub use forwarder::{ForwardedRequest, ForwardedResponse, Forwarder, ForwarderConfig};
pub use listener::{Gateway, GatewayState, DEFAULT_MAX_BODY_BYTES};
pub use phase::RequestPhase;
pub use route::{
    InjectedSecret, MatchKind, RouteMatch, RouteRule, RouteTable, RouteTableError, SecretValue,
    SessionLogin, SettingsSpec,
};
