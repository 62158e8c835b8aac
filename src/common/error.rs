use std::io;

/// The error type for loading and saving the persisted snapshot of a
/// [`sync::Cache`][cache-struct].
///
/// Failures while loading or saving are never fatal to the cache. The
/// [`load`][load-method] and [`save`][save-method] methods log them, and
/// `try_load` and `try_save` hand them back to the caller.
///
/// [cache-struct]: ./sync/struct.Cache.html
/// [load-method]: ./sync/struct.Cache.html#method.load
/// [save-method]: ./sync/struct.Cache.html#method.save
#[derive(thiserror::Error, Debug)]
pub enum PersistError {
    /// The snapshot file could not be read or written.
    #[error("I/O error on the snapshot file: {0}")]
    Io(#[from] io::Error),

    /// The file does not start like a snapshot written by this crate.
    #[error("not a snapshot file")]
    NotASnapshot,

    /// The snapshot could not be encoded or read back, or the file content is
    /// not a valid snapshot for this cache's key and value types.
    #[error("malformed snapshot: {0}")]
    Codec(#[from] bincode::Error),

    /// The snapshot was written with a format version this crate does not read.
    #[error("unsupported snapshot format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    /// The temporary file holding a new snapshot could not be moved into place.
    #[error("could not replace the snapshot file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

impl PersistError {
    /// Returns `true` if the snapshot file simply does not exist yet.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == io::ErrorKind::NotFound)
    }
}
