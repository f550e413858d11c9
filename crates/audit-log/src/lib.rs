//! Append-only structured JSON-lines audit trail for the secure gateway.
//!
//! Every security-relevant decision the gateway makes (rejected origins,
//! TLS redirects, forwarded requests, upstream failures, degraded settings
//! lookups) is recorded as one newline-terminated JSON object. Request
//! handlers submit entries through a cheap, cloneable [`AuditSink`]; a
//! background task owns the file.
//!
//! ```rust,no_run
//! use audit_log::{AuditEntry, AuditEventType, AuditSink, AuditSource};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (sink, _handle) = AuditSink::start("/var/log/secure-gateway/audit.jsonl").await?;
//!
//! sink.log(AuditEntry::new(
//!     AuditEventType::ProcessStarted,
//!     AuditSource::new("secure-gateway"),
//!     serde_json::json!({"version": "0.1.0"}),
//! ))
//! .await;
//! # Ok(())
//! # }
//! ```

pub mod entry;
pub mod sink;
pub mod writer;

pub use entry::{AuditEntry, AuditEventType, AuditSource, PolicyDecisionRecord};
pub use sink::AuditSink;
pub use writer::{AuditWriteError, AuditWriter};
