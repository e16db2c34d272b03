//! Document persistence: query building, formatting, store backends and the
//! container-scoped service used by the API.

pub mod cosmos;
pub mod format;
pub mod memory;
pub mod query;
pub mod service;
pub mod store;

/// A JSON document as stored in a container.
pub type Document = serde_json::Map<String, serde_json::Value>;
