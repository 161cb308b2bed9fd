//! Internship request intake desk
//!
//! Requesters submit a form; administrators annotate requests and mark them
//! processed, which emails the requester. Requests live in one JSON document
//! and attachments in an upload directory.

pub mod domain;
pub use domain::{Config, Request, Status};

pub mod desk;
pub use desk::{CreateOutcome, Desk, DeskError};

pub mod notify;

pub mod server;

/// Filesystem storage for the request document and uploaded files.
pub mod storage;
pub use storage::{Store, Uploads};
