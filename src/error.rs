use std::io::Error as IoError;

use crate::BoxError;

/// Everything that can go wrong while loading a handle.
///
/// `NotFound`, `Io` and `Decode` are data errors: they are recorded on the handle and logged, never returned to the
/// holder of a [crate::Ptr].  The other two indicate a bug in the cache or in the caller.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("no byte source contains {0:?}")]
    NotFound(String),
    #[error("unable to read {key:?}: {source}")]
    Io {
        key: String,
        #[source]
        source: IoError,
    },
    #[error("unable to decode {key:?}: {source}")]
    Decode {
        key: String,
        #[source]
        source: BoxError,
    },
    #[error("{0:?} already holds a loaded payload")]
    DuplicateInstall(String),
    #[error("reference count of {0:?} dropped below zero")]
    RefCountUnderflow(String),
}

impl CacheError {
    /// Convert an error from a byte source, keeping `NotFound` distinct.
    pub(crate) fn from_read(key: &str, source: IoError) -> CacheError {
        if source.kind() == std::io::ErrorKind::NotFound {
            CacheError::NotFound(key.to_string())
        } else {
            CacheError::Io {
                key: key.to_string(),
                source,
            }
        }
    }

    /// Is this a logic error rather than a problem with the data?
    pub fn is_programmer_error(&self) -> bool {
        matches!(
            self,
            CacheError::DuplicateInstall(_) | CacheError::RefCountUnderflow(_)
        )
    }
}

/// Report a logic error: abort in debug builds, log and carry on otherwise.
pub(crate) fn report_programmer_error(err: &CacheError) {
    log::error!("{}", err);
    debug_assert!(false, "{}", err);
}
