//! HTTP surface: thin read and ingest wrappers over the core engine.

pub mod health;
pub mod notifications;
pub mod pairs;
pub mod stats;
pub mod sync;
