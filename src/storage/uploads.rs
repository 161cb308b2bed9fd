//! Attachment files on disk.
//!
//! Files are stored flat in one directory under a key built from the owning
//! request's id and the sanitized original filename, so that two requests
//! uploading `cv.pdf` do not overwrite each other.

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use regex::Regex;
use uuid::Uuid;

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_.-]").expect("valid regex"));

/// The directory attachment files live in.
#[derive(Debug, Clone)]
pub struct Uploads {
    root: PathBuf,
}

impl Uploads {
    /// Creates a handle on the upload directory. It is created on first
    /// write.
    #[must_use]
    pub const fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// The upload directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store `contents` for request `id` and return the key it was stored
    /// under.
    ///
    /// An existing file with the same key is replaced.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn store(&self, id: Uuid, filename: &str, contents: &[u8]) -> Result<String, UploadError> {
        let key = storage_key(id, filename);
        fs::create_dir_all(&self.root)?;
        fs::write(self.root.join(&key), contents)?;
        tracing::debug!("Stored upload {key} ({} bytes)", contents.len());
        Ok(key)
    }

    /// Path of the file stored under `key`, if it exists.
    ///
    /// Keys that would escape the upload directory resolve to `None`.
    #[must_use]
    pub fn path(&self, key: &str) -> Option<PathBuf> {
        if !is_plain_key(key) {
            return None;
        }
        let path = self.root.join(key);
        path.is_file().then_some(path)
    }

    /// Read the file stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::NotFound`] if there is no such file.
    pub fn read(&self, key: &str) -> Result<Vec<u8>, UploadError> {
        let path = self.path(key).ok_or(UploadError::NotFound)?;
        Ok(fs::read(path)?)
    }

    /// Delete the file stored under `key`.
    ///
    /// Returns `false` if there was no such file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn remove(&self, key: &str) -> Result<bool, UploadError> {
        let Some(path) = self.path(key) else {
            return Ok(false);
        };
        fs::remove_file(path)?;
        tracing::debug!("Removed upload {key}");
        Ok(true)
    }
}

/// Stem given to files whose name has nothing usable left.
const FALLBACK_STEM: &str = "fichier";

/// Reduce a user-supplied filename to a safe ASCII name.
///
/// Directory components are dropped, whitespace becomes `_`, accents are
/// stripped from common Latin letters, and any other character outside
/// `[A-Za-z0-9_.-]` is removed. Leading dots and underscores are trimmed. A
/// stem with nothing left becomes `fichier`, keeping the extension if it
/// survived.
#[must_use]
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim_start_matches('.');

    let (stem, extension) = base.rsplit_once('.').unwrap_or((base, ""));
    let stem = clean(stem);
    let stem = stem.trim_start_matches(['.', '_']);
    let stem = if stem.is_empty() { FALLBACK_STEM } else { stem };

    match clean(extension).as_str() {
        "" => stem.to_string(),
        extension => format!("{stem}.{extension}"),
    }
}

fn clean(part: &str) -> String {
    let folded: String = part
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { fold_accent(c) })
        .collect();
    UNSAFE_CHARS.replace_all(&folded, "").into_owned()
}

fn storage_key(id: Uuid, filename: &str) -> String {
    format!("{id}_{}", sanitize_filename(filename))
}

fn is_plain_key(key: &str) -> bool {
    !key.is_empty() && !key.starts_with('.') && !UNSAFE_CHARS.is_match(key)
}

const fn fold_accent(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => 'A',
        'ç' => 'c',
        'Ç' => 'C',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'È' | 'É' | 'Ê' | 'Ë' => 'E',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'Ì' | 'Í' | 'Î' | 'Ï' => 'I',
        'ñ' => 'n',
        'Ñ' => 'N',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'Ù' | 'Ú' | 'Û' | 'Ü' => 'U',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}

/// Errors that can occur when handling attachment files.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// No file is stored under the key.
    #[error("no such upload")]
    NotFound,
    /// The file could not be read, written or removed.
    #[error("failed to access upload: {0}")]
    Io(#[from] io::Error),
}
