//! The traits callers implement to plug into the cache.
//!
//! A [Resource] is a payload kind: it knows how to build its placeholder and how to get from bytes to a decoded value.
//! A [ByteSource] converts string keys into bytes.  A [Reset] registrant owns state which must be torn down and rebuilt
//! together with everything else when the execution context goes away.
use std::io::Error as IoError;

/// Boxed error returned by reset registrants and carried by decode failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A decoded, usable resource.
///
/// The cache never constructs a resource partially: `load` either returns a complete value or an error, in which case
/// the handle keeps serving the placeholder.
pub trait Resource: Sized + Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Build the always-valid stand-in for this kind.
    ///
    /// Called at most once per manager and kind, on the thread which first requests the kind.
    fn placeholder() -> Self;

    /// Decode bytes read from a [ByteSource].
    fn load(bytes: &[u8]) -> Result<Self, Self::Error>;

    /// Release whatever this resource holds outside of Rust's memory (GPU objects, audio buffers).
    ///
    /// Runs exactly once, when the last reference to the payload goes away: a handle being nullified or removed, the
    /// manager being dropped, or a caller letting go of what [crate::Ptr::get] returned.  The default just drops it.
    fn unload(self) {}
}

/// Something that can hand out the bytes behind a key.
///
/// Sources are only read from the background worker; `contains` is also used by the manager when binding a new
/// handle to the first overlay which knows the key.
pub trait ByteSource: Send + Sync + 'static {
    /// Does this source have data for `key`?
    fn contains(&self, key: &str) -> bool;

    /// Read the whole object.  Missing keys should fail with [std::io::ErrorKind::NotFound].
    fn read(&self, key: &str) -> Result<Vec<u8>, IoError>;
}

/// Objects whose state must be rebuilt when the context is recreated.
pub trait Reset: Send + Sync {
    /// Called with `false` to release everything, then with `true` to rebuild.
    fn reset(&self, initializing: bool) -> Result<(), BoxError>;
}
