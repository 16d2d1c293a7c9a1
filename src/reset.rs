//! Bookkeeping for [Reset] registrants.
//!
//! The manager only holds weak references: a registrant which is dropped without unbinding simply disappears from the
//! next pass.
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::*;

/// Which half of a reset pass a failure happened in.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ResetPhase {
    /// `reset(false)`: releasing context-bound state.
    Shutdown,
    /// `reset(true)`: rebuilding it.
    Init,
}

/// A registrant which returned an error.  The rest of the pass ran regardless.
#[derive(Debug, thiserror::Error)]
#[error("{registrant} failed during {phase:?}: {error}")]
pub struct ResetFailure {
    pub registrant: &'static str,
    pub phase: ResetPhase,
    #[source]
    pub error: BoxError,
}

#[derive(Default)]
pub(crate) struct ResetRegistry(Mutex<Vec<(Weak<dyn Reset>, &'static str)>>);

fn addr(weak: &Weak<dyn Reset>) -> *const () {
    weak.as_ptr() as *const ()
}

impl ResetRegistry {
    /// Returns false if the registrant was already bound.
    pub(crate) fn bind<R: Reset + 'static>(&self, registrant: &Arc<R>) -> bool {
        let weak: Weak<dyn Reset> = Arc::downgrade(registrant) as Weak<dyn Reset>;
        let mut guard = self.0.lock();
        if guard.iter().any(|(w, _)| addr(w) == addr(&weak)) {
            return false;
        }
        guard.push((weak, std::any::type_name::<R>()));
        true
    }

    pub(crate) fn unbind<R: Reset + 'static>(&self, registrant: &Arc<R>) -> bool {
        let target = Arc::as_ptr(registrant) as *const ();
        let mut guard = self.0.lock();
        let before = guard.len();
        guard.retain(|(w, _)| addr(w) != target);
        guard.len() != before
    }

    /// Registrants which are still alive, in the order they were bound.  Dead ones are pruned.
    pub(crate) fn live(&self) -> Vec<(Arc<dyn Reset>, &'static str)> {
        let mut guard = self.0.lock();
        guard.retain(|(w, _)| w.strong_count() > 0);
        guard
            .iter()
            .filter_map(|(w, name)| w.upgrade().map(|r| (r, *name)))
            .collect()
    }
}

/// Run one phase over every registrant, collecting failures instead of stopping at them.
pub(crate) fn run_phase(
    registrants: &[(Arc<dyn Reset>, &'static str)],
    initializing: bool,
) -> Vec<ResetFailure> {
    let phase = if initializing {
        ResetPhase::Init
    } else {
        ResetPhase::Shutdown
    };

    let mut failures = vec![];
    for (r, name) in registrants {
        if let Err(error) = r.reset(initializing) {
            let failure = ResetFailure {
                registrant: *name,
                phase,
                error,
            };
            log::error!("{}", failure);
            failures.push(failure);
        }
    }
    failures
}
