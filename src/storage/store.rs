//! A single-file JSON store for the request collection.
//!
//! Every [`Store::load`] reads the whole document and every [`Store::save`]
//! writes it back. The document carries a revision number: a save is refused
//! if another writer saved since the collection was loaded.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use chrono_tz::Tz;
use tracing::instrument;

use crate::{
    domain::Collection,
    storage::document::{self, DocumentError},
};

/// The JSON document holding every request.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
    timezone: Tz,
}

impl Store {
    /// Creates a store backed by the document at `path`.
    ///
    /// Legacy dates in the document are interpreted in `timezone`. The file
    /// does not need to exist yet.
    #[must_use]
    pub const fn new(path: PathBuf, timezone: Tz) -> Self {
        Self { path, timezone }
    }

    /// Path of the backing document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the whole collection.
    ///
    /// A missing document loads as an empty collection. A legacy document is
    /// upgraded in memory; the file is left untouched until the next save.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be read or decoded.
    #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    pub fn load(&self) -> Result<Collection, StoreError> {
        let Some(bytes) = self.read()? else {
            tracing::debug!("No document yet, starting empty");
            return Ok(Collection::default());
        };

        let decoded = document::decode(&bytes, self.timezone)?;
        if decoded.legacy {
            tracing::debug!("Upgraded legacy document in memory");
        }
        Ok(decoded.collection)
    }

    /// Save the whole collection.
    ///
    /// The containing directory is created if needed. On success the
    /// collection's revision is advanced to the one written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if the document was saved by someone
    /// else since `collection` was loaded, or an error if it cannot be
    /// written.
    #[instrument(level = "debug", skip(self, collection), fields(path = %self.path.display()))]
    pub fn save(&self, collection: &mut Collection) -> Result<(), StoreError> {
        let on_disk = match self.read()? {
            Some(bytes) => document::revision(&bytes)?,
            None => 0,
        };
        if on_disk != collection.revision() {
            return Err(StoreError::Conflict {
                expected: collection.revision(),
                found: on_disk,
            });
        }

        let mut next = collection.clone();
        next.set_revision(on_disk + 1);
        self.write(&next)?;
        collection.set_revision(on_disk + 1);

        tracing::debug!("Saved revision {}", on_disk + 1);
        Ok(())
    }

    /// Rewrite a legacy document in the current shape.
    ///
    /// Returns `true` if the document was rewritten, `false` if it was
    /// missing or already current.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be read, decoded or written.
    #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    pub fn migrate(&self) -> Result<bool, StoreError> {
        let Some(bytes) = self.read()? else {
            return Ok(false);
        };

        let decoded = document::decode(&bytes, self.timezone)?;
        if !decoded.legacy {
            return Ok(false);
        }

        let mut collection = decoded.collection;
        collection.set_revision(1);
        self.write(&collection)?;
        tracing::info!("Migrated {} to the current format", self.path.display());
        Ok(true)
    }

    fn read(&self) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn write(&self, collection: &Collection) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let bytes = document::encode(collection).map_err(DocumentError::from)?;

        // Write beside the target and rename, so readers never see a
        // partially written document.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Errors that can occur when loading or saving the collection.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The document could not be read or written.
    #[error("failed to access request document: {0}")]
    Io(#[from] io::Error),
    /// The document could not be decoded or encoded.
    #[error(transparent)]
    Document(#[from] DocumentError),
    /// The document changed since it was loaded.
    #[error("request document changed since it was loaded (expected revision {expected}, found {found})")]
    Conflict {
        /// Revision the collection was loaded at.
        expected: u64,
        /// Revision currently on disk.
        found: u64,
    },
}
