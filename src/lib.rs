//! A resource cache for things which are slow to load and must be usable before they are.
//!
//! Games and similar programs want to ask for "the texture at `a.tex`" and start drawing with it on the same frame,
//! without stalling while the file is read and decoded, without loading the same file twice, and without checking
//! whether it is there yet every time they touch it.  On top of that, some payloads (GPU objects, audio buffers) die
//! together with the context they were created in and have to be rebuilt in bulk.  This crate handles that with a few
//! pieces:
//!
//! - A [Resource] is a payload kind.  Each kind has a placeholder: a value which is always valid and is served until
//!   the real one is loaded, or forever if loading fails.
//! - A [Handle] is the cache entry for one (path, kind) pair.  Its [Handle::current_payload] is never empty.
//! - A [Ptr] is what callers hold.  Active pointers count towards the handle's reference count, and the background
//!   worker only loads handles which something is referencing.
//! - The [ResourceManager] maps keys to handles, binds new handles to the first byte source which has their key
//!   (archives before loose files), owns the worker thread, and runs [Reset] passes.
//!
//! Data errors (missing files, bad bytes) never reach the holder of a [Ptr]: it already has a valid placeholder.
//! They are logged through the `log` crate and kept on the handle for diagnostics.
//!
//! To use this crate, implement [Resource] for your payload types, build a [ResourceManager] from a [ManagerConfig],
//! and call [ResourceManager::get_or_create].
mod archive;
mod error;
mod filesystem_source;
mod handle;
mod kind;
mod manager;
mod memory_source;
mod overlay;
mod ptr;
mod reset;
mod traits;
mod worker;

#[cfg(test)]
mod test_support;

pub use archive::*;
pub use error::*;
pub use filesystem_source::*;
pub use handle::*;
pub use kind::{ErasedPayload, Payload};
pub use manager::*;
pub use memory_source::*;
pub use ptr::*;
pub use reset::{ResetFailure, ResetPhase};
pub use traits::*;
