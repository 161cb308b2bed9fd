//! Domain models for the intake desk.
//!
//! This module contains the request record, the in-memory collection that
//! enforces the request lifecycle, and configuration.

/// Request record and related value types.
pub mod request;
pub use request::{Identity, Request, RequestUpdate, SentEmail, Status, Submission};

/// The in-memory collection of requests and its archive.
pub mod collection;
pub use collection::{ArchiveEntry, Collection, Event};

mod config;
pub use config::{Config, ConfigError, Credentials, DuplicatePolicy};
