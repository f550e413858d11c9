//! # settings-store
//!
//! Reads dynamic gateway settings (panel endpoints, workflow toggles) from a
//! document store with the operator's elevated credential.
//!
//! The gateway only ever needs single-document lookups, so the surface is one
//! async trait method. [`FirestoreSettingsStore`] talks to the hosted store;
//! [`MemorySettingsStore`] backs local development and tests.

mod error;
mod firestore;
mod store;

pub use error::StoreError;
pub use firestore::{decode_value, FirestoreSettingsStore, DEFAULT_FIRESTORE_URL};
pub use store::{MemorySettingsStore, SettingsStore};
