//! [Ptr] is the caller-facing reference to a [Handle].
//!
//! Every active `Ptr` counts once towards its handle's reference count, which is what the background worker looks at
//! to decide what to load.  A `Ptr` can be switched inactive to stop asking for the resource without giving up the
//! reference itself.
use std::any::TypeId;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::*;

pub struct Ptr<T: Resource> {
    handle: Arc<Handle>,
    active: bool,
    marker: PhantomData<fn() -> T>,
}

impl<T: Resource> Ptr<T> {
    pub(crate) fn new(handle: Arc<Handle>) -> Ptr<T> {
        debug_assert_eq!(
            handle.kind().id(),
            TypeId::of::<T>(),
            "{} holds a {}, not a {}",
            handle.key(),
            handle.kind_name(),
            std::any::type_name::<T>()
        );
        handle.ref_increase();
        Ptr {
            handle,
            active: true,
            marker: PhantomData,
        }
    }

    /// Get the payload: the real one if it has been loaded, the placeholder otherwise.
    ///
    /// The returned `Arc` stays valid even if the handle is nullified while it is held.  In that case the payload is
    /// unloaded when the caller drops it.
    pub fn get(&self) -> Arc<Payload<T>> {
        match self.handle.current_payload().downcast::<Payload<T>>() {
            Ok(x) => x,
            Err(_) => unreachable!("kind is checked when the Ptr is built"),
        }
    }

    /// Start or stop counting towards the handle's reference count.  Repeating the current value does nothing.
    pub fn set_active(&mut self, active: bool) {
        if self.active == active {
            return;
        }

        if active {
            self.handle.ref_increase();
        } else {
            self.handle.ref_decrease();
        }
        self.active = active;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_loaded(&self) -> bool {
        self.handle.is_loaded()
    }

    pub fn is_managed(&self) -> bool {
        self.handle.is_managed()
    }

    pub fn key(&self) -> &str {
        self.handle.key()
    }

    pub fn handle(&self) -> &Arc<Handle> {
        &self.handle
    }

    /// Do both pointers refer to the same handle?
    pub fn ptr_eq(&self, other: &Ptr<T>) -> bool {
        Arc::ptr_eq(&self.handle, &other.handle)
    }
}

impl<T: Resource> Clone for Ptr<T> {
    /// The clone inherits the active state, and counts if it is active.
    fn clone(&self) -> Self {
        if self.active {
            self.handle.ref_increase();
        }
        Ptr {
            handle: self.handle.clone(),
            active: self.active,
            marker: PhantomData,
        }
    }
}

impl<T: Resource> Drop for Ptr<T> {
    fn drop(&mut self) {
        if self.active {
            self.handle.ref_decrease();
        }
    }
}

impl<T: Resource> std::fmt::Debug for Ptr<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ptr")
            .field("handle", &self.handle)
            .field("active", &self.active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::ResourceKind;
    use crate::test_support::*;

    use proptest::prelude::*;

    fn handle() -> Arc<Handle> {
        Arc::new(Handle::managed(
            "a.tex".into(),
            ResourceKind::of::<Texture>(),
            Payload::erased(Texture::placeholder()),
            None,
        ))
    }

    #[test]
    fn clone_move_and_drop() {
        let h = handle();
        let a = Ptr::<Texture>::new(h.clone());
        assert_eq!(h.ref_count(), 1);

        let b = a.clone();
        assert_eq!(h.ref_count(), 2);
        assert!(a.ptr_eq(&b));

        // Moving doesn't touch the count.
        let moved = b;
        assert_eq!(h.ref_count(), 2);

        let mut ptrs = vec![moved];
        for _ in 0..10 {
            ptrs.push(a.clone());
        }
        assert_eq!(h.ref_count(), 12);
        ptrs.clear();
        assert_eq!(h.ref_count(), 1);

        std::mem::drop(a);
        assert_eq!(h.ref_count(), 0);
    }

    #[test]
    fn set_active_is_idempotent() {
        let h = handle();
        let mut a = Ptr::<Texture>::new(h.clone());

        a.set_active(true);
        a.set_active(true);
        assert_eq!(h.ref_count(), 1);

        a.set_active(false);
        a.set_active(false);
        assert_eq!(h.ref_count(), 0);
        assert!(!a.is_active());

        // Inactive clones stay inactive.
        let b = a.clone();
        assert_eq!(h.ref_count(), 0);
        std::mem::drop(b);
        std::mem::drop(a);
        assert_eq!(h.ref_count(), 0);
    }

    #[test]
    fn get_returns_placeholder_until_installed() {
        let h = handle();
        let a = Ptr::<Texture>::new(h.clone());
        assert!(a.get().is_placeholder);
        assert!(!a.is_loaded());

        h.install(Payload::erased(Texture::from_bytes(&[1, 2])))
            .unwrap();
        let loaded = a.get();
        assert_eq!(loaded.data, vec![1, 2]);

        // What we already got survives a nullify; new reads see the placeholder.
        h.nullify();
        assert_eq!(loaded.data, vec![1, 2]);
        assert!(a.get().is_placeholder);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "not a")]
    fn kind_mismatch_panics() {
        let _ = Ptr::<Sound>::new(handle());
    }

    #[derive(Copy, Clone, Debug)]
    enum PtrCommand {
        Clone(usize),
        Drop(usize),
        SetActive(usize, bool),
    }

    fn ptr_command_strat() -> prop::strategy::BoxedStrategy<PtrCommand> {
        proptest::prop_oneof![
            (0..16usize).prop_map(PtrCommand::Clone),
            (0..16usize).prop_map(PtrCommand::Drop),
            (0..16usize, any::<bool>()).prop_map(|(i, a)| PtrCommand::SetActive(i, a)),
        ]
        .boxed()
    }

    // The count must always equal the number of live, active pointers.
    proptest! {
        #[test]
        fn test_ref_count_matches_active_ptrs(
            commands in prop::collection::vec(ptr_command_strat(), 0..500)
        ) {
            let h = handle();
            let mut ptrs = vec![Ptr::<Texture>::new(h.clone())];

            for c in commands {
                use PtrCommand::*;

                match c {
                    Clone(i) => {
                        if !ptrs.is_empty() {
                            let p = ptrs[i % ptrs.len()].clone();
                            ptrs.push(p);
                        }
                    }
                    Drop(i) => {
                        if !ptrs.is_empty() {
                            let len = ptrs.len();
                            ptrs.swap_remove(i % len);
                        }
                    }
                    SetActive(i, a) => {
                        if !ptrs.is_empty() {
                            let len = ptrs.len();
                            ptrs[i % len].set_active(a);
                        }
                    }
                }

                let expected = ptrs.iter().filter(|p| p.is_active()).count();
                prop_assert_eq!(h.ref_count(), expected);
            }

            ptrs.clear();
            prop_assert_eq!(h.ref_count(), 0);
        }
    }
}
