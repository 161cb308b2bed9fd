mod document;
pub mod store;
pub mod uploads;

pub use document::DocumentError;
pub use store::{Store, StoreError};
pub use uploads::{UploadError, Uploads, sanitize_filename};
