//! A [Handle] is the per-key cache entry.
//!
//! It owns the real payload slot and a reference to the shared placeholder of its kind.  Whatever state the slot is in,
//! [Handle::current_payload] returns something usable, which is what makes [Handle::nullify] safe to call while
//! [crate::Ptr]s are still out there.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::report_programmer_error;
use crate::kind::ResourceKind;
use crate::*;

/// Where a handle is in its load cycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum LoadState {
    /// Waiting for the worker.
    Pending,
    /// The worker is reading or decoding it right now.
    Loading,
    /// The real payload is installed.
    Loaded,
    /// The last attempt failed; the worker won't try again until a reset.
    Failed,
}

struct Slot {
    real: Option<ErasedPayload>,
    state: LoadState,
    failure: Option<Arc<CacheError>>,
}

pub struct Handle {
    key: Arc<str>,
    kind: ResourceKind,
    /// The overlay this handle is bound to, if any knew the key.  Set at creation and again by each reset.
    source: Mutex<Option<Arc<dyn ByteSource>>>,
    /// Managed handles are loaded by the worker and may be nullified; linked ones hold a generated payload forever.
    managed: bool,
    placeholder: ErasedPayload,
    slot: Mutex<Slot>,
    refs: AtomicUsize,
}

impl Handle {
    /// A handle which the worker loads from `source`.
    pub(crate) fn managed(
        key: Arc<str>,
        kind: ResourceKind,
        placeholder: ErasedPayload,
        source: Option<Arc<dyn ByteSource>>,
    ) -> Handle {
        Handle {
            key,
            kind,
            source: Mutex::new(source),
            managed: true,
            placeholder,
            slot: Mutex::new(Slot {
                real: None,
                state: LoadState::Pending,
                failure: None,
            }),
            refs: AtomicUsize::new(0),
        }
    }

    /// A handle around a payload which was generated rather than read from anywhere.
    pub(crate) fn linked(
        key: Arc<str>,
        kind: ResourceKind,
        placeholder: ErasedPayload,
        payload: ErasedPayload,
    ) -> Handle {
        Handle {
            key,
            kind,
            source: Mutex::new(None),
            managed: false,
            placeholder,
            slot: Mutex::new(Slot {
                real: Some(payload),
                state: LoadState::Loaded,
                failure: None,
            }),
            refs: AtomicUsize::new(0),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Name of the payload type, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        self.kind.name()
    }

    pub(crate) fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    pub fn is_managed(&self) -> bool {
        self.managed
    }

    pub fn has_source(&self) -> bool {
        self.source.lock().is_some()
    }

    /// Point a managed handle at a different byte source.  Loads already in flight finish from the old one.
    pub(crate) fn rebind(&self, source: Option<Arc<dyn ByteSource>>) {
        if self.managed {
            *self.source.lock() = source;
        }
    }

    pub fn ref_count(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }

    pub fn state(&self) -> LoadState {
        self.slot.lock().state
    }

    pub fn is_loaded(&self) -> bool {
        self.slot.lock().real.is_some()
    }

    /// The error from the last failed load, if the handle is in [LoadState::Failed].
    pub fn failure(&self) -> Option<Arc<CacheError>> {
        self.slot.lock().failure.clone()
    }

    /// The real payload if one is installed, the placeholder otherwise.
    pub fn current_payload(&self) -> ErasedPayload {
        match &self.slot.lock().real {
            Some(x) => x.clone(),
            None => self.placeholder.clone(),
        }
    }

    /// Put a freshly decoded payload into the empty slot.
    pub(crate) fn install(&self, payload: ErasedPayload) -> Result<(), CacheError> {
        let mut slot = self.slot.lock();
        if slot.real.is_some() {
            return Err(CacheError::DuplicateInstall(self.key.to_string()));
        }

        slot.real = Some(payload);
        slot.state = LoadState::Loaded;
        slot.failure = None;
        Ok(())
    }

    /// Unload the real payload and go back to serving the placeholder.
    ///
    /// Returns whether anything was unloaded.  Linked handles have nothing to reload from and are left alone.  A load
    /// which is in flight is not affected: when it finishes it installs into the now-empty slot as a new cycle.
    pub fn nullify(&self) -> bool {
        if !self.managed {
            return false;
        }

        let old = {
            let mut slot = self.slot.lock();
            let old = slot.real.take();
            if slot.state == LoadState::Loaded {
                slot.state = LoadState::Pending;
            }
            old
        };

        // The payload unloads itself once the last caller holding it lets go.
        match old {
            Some(_) => {
                log::debug!("Unloaded {} ({})", self.key, self.kind.name());
                true
            }
            None => false,
        }
    }

    /// Let a failed handle be tried again.
    pub(crate) fn clear_failure(&self) {
        let mut slot = self.slot.lock();
        if slot.state == LoadState::Failed {
            slot.state = LoadState::Pending;
            slot.failure = None;
        }
    }

    pub(crate) fn ref_increase(&self) {
        self.refs.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn ref_decrease(&self) {
        let res = self
            .refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |x| x.checked_sub(1));
        if res.is_err() {
            report_programmer_error(&CacheError::RefCountUnderflow(self.key.to_string()));
        }
    }

    /// Claim the handle for loading, if it is wanted and nobody else has.
    fn begin_load(&self) -> bool {
        if !self.managed || self.ref_count() == 0 {
            return false;
        }

        let mut slot = self.slot.lock();
        if slot.state != LoadState::Pending || slot.real.is_some() {
            return false;
        }
        slot.state = LoadState::Loading;
        true
    }

    fn fail(&self, err: CacheError) {
        log::warn!("Failed to load {} ({}): {}", self.key, self.kind.name(), err);
        let mut slot = self.slot.lock();
        slot.state = LoadState::Failed;
        slot.failure = Some(Arc::new(err));
    }

    /// Run one load step: read, decode, install.  Returns true if a payload was installed.
    ///
    /// No lock is held while reading or decoding.
    pub(crate) fn update(&self) -> bool {
        if !self.begin_load() {
            return false;
        }

        let source = self.source.lock().clone();
        let source = match source {
            Some(s) => s,
            None => {
                self.fail(CacheError::NotFound(self.key.to_string()));
                return false;
            }
        };

        let bytes = match source.read(&self.key) {
            Ok(b) => b,
            Err(e) => {
                self.fail(CacheError::from_read(&self.key, e));
                return false;
            }
        };

        let payload = match self.kind.decode(&bytes) {
            Ok(p) => p,
            Err(source) => {
                self.fail(CacheError::Decode {
                    key: self.key.to_string(),
                    source,
                });
                return false;
            }
        };

        match self.install(payload) {
            Ok(()) => {
                log::debug!(
                    "Loaded {} ({}, {} bytes)",
                    self.key,
                    self.kind.name(),
                    bytes.len()
                );
                true
            }
            Err(e) => {
                report_programmer_error(&e);
                false
            }
        }
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("managed", &self.managed)
            .field("state", &self.state())
            .field("refs", &self.ref_count())
            .finish()
    }
}
