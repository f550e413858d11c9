//! # body-sanitizer
//!
//! Strips secrets and internal detail from upstream bodies before the
//! gateway relays them to a browser.
//!
//! 1. **[`patterns`]** -- static catalogue of leak patterns grouped by
//!    [`PatternCategory`](patterns::PatternCategory).
//! 2. **[`scanner`]** -- compiles the catalogue into a [`RegexSet`](regex::RegexSet),
//!    adds literal secrets known to the gateway, and produces
//!    [`Finding`](scanner::Finding) values.
//! 3. **[`sanitizer`]** -- applies a [`SanitizeMode`](sanitizer::SanitizeMode)
//!    (redact spans or replace the whole body).

pub mod patterns;
pub mod sanitizer;
pub mod scanner;

pub use patterns::{LeakPattern, PatternCategory, PATTERNS};
pub use sanitizer::{BodySanitizer, SanitizeMode, SanitizeResult, REPLACEMENT_BODY};
pub use scanner::{Finding, Scanner, ScannerError};
