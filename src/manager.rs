//! The [ResourceManager] owns the handle registry, the placeholders, the byte source overlay, the background worker and
//! the set of [Reset] registrants.
//!
//! Asking for a resource never touches the byte source beyond checking which overlay knows the key: the handle is
//! created empty and the worker loads it once something holds an active [Ptr] to it.  Handles stay resident after
//! their count drops to zero, so asking again later is a cache hit; [ResourceManager::sweep_unused] is the explicit way
//! to give that memory back.
use std::any::TypeId;
use std::collections::HashMap;
use std::io::Error as IoError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::kind::ResourceKind;
use crate::overlay::SourceOverlay;
use crate::reset::{run_phase, ResetRegistry};
use crate::worker::Worker;
use crate::*;

type KeyMap<V> = HashMap<Arc<str>, V, ahash::RandomState>;
type KindMap<V> = HashMap<TypeId, V, ahash::RandomState>;

#[derive(Clone, Debug, derive_builder::Builder)]
pub struct ManagerConfig {
    /// Directory to serve loose files from.
    #[builder(default, setter(into, strip_option))]
    pub root: Option<PathBuf>,
    /// Archives opened at construction, searched in this order.
    #[builder(default)]
    pub archives: Vec<PathBuf>,
    /// How long the worker sleeps between passes when nothing wakes it.
    #[builder(default = "Duration::from_millis(10)")]
    pub poll_interval: Duration,
    /// Run the background worker.  Without one, call [ResourceManager::update] to load things.
    #[builder(default = "true")]
    pub spawn_worker: bool,
    #[builder(default = "\"resource_thread\".to_string()")]
    pub thread_name: String,
}

impl Default for ManagerConfig {
    fn default() -> ManagerConfig {
        ManagerConfig {
            root: None,
            archives: vec![],
            poll_interval: Duration::from_millis(10),
            spawn_worker: true,
            thread_name: "resource_thread".to_string(),
        }
    }
}

/// Counts of handles by state, for diagnostics.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CacheStats {
    pub handles: usize,
    pub loaded: usize,
    pub pending: usize,
    pub loading: usize,
    pub failed: usize,
    /// Handles nothing currently references.
    pub unused: usize,
}

/// Every handle, grouped by kind.  This is the only structure shared with the worker.
#[derive(Default)]
pub(crate) struct Registry {
    handles: RwLock<KindMap<KeyMap<Arc<Handle>>>>,
}

impl Registry {
    fn get(&self, kind: TypeId, key: &str) -> Option<Arc<Handle>> {
        self.handles.read().get(&kind)?.get(key).cloned()
    }

    /// Insert `handle` unless its key is taken.  Returns the resident handle, plus `handle` back if it lost.
    fn insert_or_get(&self, handle: Handle) -> (Arc<Handle>, Option<Handle>) {
        let mut guard = self.handles.write();
        let by_key = guard.entry(handle.kind().id()).or_default();
        if let Some(x) = by_key.get(handle.key()) {
            return (x.clone(), Some(handle));
        }

        let key: Arc<str> = handle.key().into();
        let handle = Arc::new(handle);
        by_key.insert(key, handle.clone());
        (handle, None)
    }

    fn remove(&self, kind: TypeId, key: &str) -> Option<Arc<Handle>> {
        self.handles.write().get_mut(&kind)?.remove(key)
    }

    fn snapshot(&self) -> Vec<Arc<Handle>> {
        self.handles
            .read()
            .values()
            .flat_map(|x| x.values().cloned())
            .collect()
    }

    fn len(&self) -> usize {
        self.handles.read().values().map(|x| x.len()).sum()
    }

    /// Try to load every handle once.  Returns how many were installed.
    ///
    /// The registry lock is only held to take the snapshot.
    pub(crate) fn update_pass(&self) -> usize {
        self.snapshot().iter().filter(|h| h.update()).count()
    }

    fn nullify_all(&self) -> usize {
        self.snapshot().iter().filter(|h| h.nullify()).count()
    }
}

pub struct ResourceManager {
    config: ManagerConfig,
    registry: Arc<Registry>,
    placeholders: Mutex<KindMap<ErasedPayload>>,
    sources: RwLock<SourceOverlay>,
    resets: ResetRegistry,
    worker: Mutex<Option<Worker>>,
    /// Whether resources are currently usable, i.e. not between the halves of a reset.  Also serializes reset passes.
    active: Mutex<bool>,
}

impl ResourceManager {
    /// Build a manager, opening the configured archives and starting the worker if asked to.
    pub fn new(config: ManagerConfig) -> Result<ResourceManager, IoError> {
        let mut sources = SourceOverlay::default();
        for path in config.archives.iter() {
            sources.push_archive(Some(path.clone()), Arc::new(Archive::open(path)?));
        }
        if let Some(root) = &config.root {
            sources.push_loose(Arc::new(FilesystemSource::new(root)));
        }

        let manager = ResourceManager {
            registry: Default::default(),
            placeholders: Default::default(),
            sources: RwLock::new(sources),
            resets: Default::default(),
            worker: Mutex::new(None),
            active: Mutex::new(true),
            config,
        };
        if manager.config.spawn_worker {
            manager.start_worker()?;
        }

        log::info!(
            "Resource manager created ({} byte sources)",
            manager.sources.read().len()
        );
        Ok(manager)
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    fn start_worker(&self) -> Result<(), IoError> {
        let mut guard = self.worker.lock();
        if guard.is_none() {
            *guard = Some(Worker::spawn(
                &self.config.thread_name,
                self.registry.clone(),
                self.config.poll_interval,
            )?);
        }
        Ok(())
    }

    fn stop_worker(&self) {
        let worker = self.worker.lock().take();
        if let Some(w) = worker {
            w.stop();
        }
    }

    fn wake_worker(&self) {
        if let Some(w) = &*self.worker.lock() {
            w.wake();
        }
    }

    /// The shared placeholder for `T`, built on this thread the first time the kind is asked for.
    fn placeholder<T: Resource>(&self) -> ErasedPayload {
        self.placeholders
            .lock()
            .entry(TypeId::of::<T>())
            .or_insert_with(|| {
                log::debug!("Building placeholder for {}", std::any::type_name::<T>());
                Payload::erased(T::placeholder())
            })
            .clone()
    }

    /// Get a pointer to the resource at `key`, creating its handle if this is the first request.
    ///
    /// This never blocks on loading: until the worker gets to it the pointer serves the placeholder.
    pub fn get_or_create<T: Resource>(&self, key: &str) -> Ptr<T> {
        let kind = ResourceKind::of::<T>();
        if let Some(h) = self.registry.get(kind.id(), key) {
            return Ptr::new(h);
        }

        let placeholder = self.placeholder::<T>();
        let source = self.sources.read().resolve(key);
        if source.is_none() {
            log::debug!("No byte source contains {}", key);
        }

        let (handle, lost) =
            self.registry
                .insert_or_get(Handle::managed(key.into(), kind, placeholder, source));
        // The worker skips handles nothing references, so it can't claim this one before the count is taken.
        let ptr = Ptr::new(handle);
        if lost.is_none() {
            log::debug!("Created handle for {} ({})", key, kind.name());
            self.wake_worker();
        }
        ptr
    }

    /// Register a generated resource under `name`.
    ///
    /// The handle is unmanaged: the worker never loads it, and nullifying, sweeping or resetting leaves it alone.  If
    /// `name` is already taken, the existing handle is returned and `value` is unloaded.
    pub fn link<T: Resource>(&self, name: &str, value: T) -> Ptr<T> {
        let kind = ResourceKind::of::<T>();
        let placeholder = self.placeholder::<T>();
        let (handle, lost) = self.registry.insert_or_get(Handle::linked(
            name.into(),
            kind,
            placeholder,
            Payload::erased(value),
        ));
        if lost.is_some() {
            log::debug!("{} ({}) is already linked", name, kind.name());
        }
        Ptr::new(handle)
    }

    /// Drop the handle for `key` from the registry and unload it.
    ///
    /// Pointers to a managed handle keep working and see the placeholder.  A linked payload is unloaded once the last
    /// pointer to it goes away.  Returns false if there was no such handle.
    pub fn remove<T: Resource>(&self, key: &str) -> bool {
        match self.registry.remove(TypeId::of::<T>(), key) {
            Some(h) => {
                h.nullify();
                log::debug!("Removed handle for {} ({})", key, h.kind_name());
                true
            }
            None => false,
        }
    }

    pub fn contains<T: Resource>(&self, key: &str) -> bool {
        self.registry.get(TypeId::of::<T>(), key).is_some()
    }

    pub fn handle_count(&self) -> usize {
        self.registry.len()
    }

    /// Open an archive and search it before loose files for handles created from now on.
    ///
    /// Existing handles stay bound where they are until the next reset.  Returns false if this path was already added.
    pub fn add_archive(&self, path: impl AsRef<Path>) -> Result<bool, IoError> {
        let path = path.as_ref();
        if self.sources.read().has_archive_path(path) {
            return Ok(false);
        }

        let archive = Archive::open(path)?;
        let mut sources = self.sources.write();
        if sources.has_archive_path(path) {
            return Ok(false);
        }
        sources.push_archive(Some(path.to_path_buf()), Arc::new(archive));
        Ok(true)
    }

    /// Add a source to the archive tier.
    pub fn add_archive_source<S: ByteSource>(&self, source: Arc<S>) {
        self.sources.write().push_archive(None, source);
    }

    /// Add a source to the loose-file tier.
    pub fn add_loose_source<S: ByteSource>(&self, source: Arc<S>) {
        self.sources.write().push_loose(source);
    }

    /// Run one loading pass on the calling thread.  Returns how many handles were installed.
    pub fn update(&self) -> usize {
        self.registry.update_pass()
    }

    /// Unload every managed handle nothing references.  Returns how many were unloaded.
    pub fn sweep_unused(&self) -> usize {
        let swept = self
            .registry
            .snapshot()
            .iter()
            .filter(|h| h.ref_count() == 0 && h.nullify())
            .count();
        log::info!("Swept {} unused resources", swept);
        swept
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        for h in self.registry.snapshot() {
            stats.handles += 1;
            match h.state() {
                LoadState::Loaded => stats.loaded += 1,
                LoadState::Pending => stats.pending += 1,
                LoadState::Loading => stats.loading += 1,
                LoadState::Failed => stats.failed += 1,
            }
            if h.ref_count() == 0 {
                stats.unused += 1;
            }
        }
        stats
    }

    /// Bind a registrant to future reset passes.  Only a weak reference is kept.  Returns false if already bound.
    pub fn bind_reset<R: Reset + 'static>(&self, registrant: &Arc<R>) -> bool {
        let bound = self.resets.bind(registrant);
        debug_assert!(bound, "reset registrant bound twice");
        bound
    }

    pub fn unbind_reset<R: Reset + 'static>(&self, registrant: &Arc<R>) -> bool {
        self.resets.unbind(registrant)
    }

    pub fn is_active(&self) -> bool {
        *self.active.lock()
    }

    fn switch(
        &self,
        active: &mut bool,
        initializing: bool,
        registrants: &[(Arc<dyn Reset>, &'static str)],
    ) -> Vec<ResetFailure> {
        if *active == initializing {
            return vec![];
        }

        let failures = if initializing {
            // The context changed and sources may have been added, so bind everything again and retry failures.
            let sources = self.sources.read();
            for h in self.registry.snapshot() {
                h.rebind(sources.resolve(h.key()));
                h.clear_failure();
            }
            std::mem::drop(sources);
            let failures = run_phase(registrants, true);
            if self.config.spawn_worker {
                if let Err(e) = self.start_worker() {
                    log::error!("Unable to restart the resource worker: {}", e);
                }
            }
            log::info!("Resource manager started");
            failures
        } else {
            self.stop_worker();
            let failures = run_phase(registrants, false);
            let unloaded = self.registry.nullify_all();
            log::info!(
                "Resource manager shut down ({} resources unloaded)",
                unloaded
            );
            failures
        };

        *active = initializing;
        failures
    }

    /// Run one half of a reset pass.  Does nothing if the manager is already in the requested state.
    ///
    /// Shutting down stops the worker, calls `reset(false)` on every registrant and unloads every managed handle.
    /// Initializing binds every managed handle to the byte sources again, clears failed loads, calls `reset(true)` on
    /// every registrant and restarts the worker.
    /// Registrants must not start a reset themselves.
    pub fn reset(&self, initializing: bool) -> Vec<ResetFailure> {
        let mut active = self.active.lock();
        let registrants = self.resets.live();
        self.switch(&mut active, initializing, &registrants)
    }

    /// Full reset pass: shut down, run `recreate` (typically rebuilding the context), initialize again.
    ///
    /// Both halves see the same registrants.  A registrant which fails is reported in the result and does not stop the
    /// others.
    pub fn reset_all_with<F: FnOnce()>(&self, recreate: F) -> Vec<ResetFailure> {
        let mut active = self.active.lock();
        let registrants = self.resets.live();
        log::info!("Resetting resources ({} registrants)", registrants.len());

        let mut failures = self.switch(&mut active, false, &registrants);
        recreate();
        failures.extend(self.switch(&mut active, true, &registrants));
        failures
    }

    pub fn reset_all(&self) -> Vec<ResetFailure> {
        self.reset_all_with(|| {})
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        self.stop_worker();

        let bound = self.resets.live().len();
        if bound > 0 {
            log::warn!(
                "Resource manager destroyed with {} reset registrants still bound",
                bound
            );
        }

        self.registry.nullify_all();
        log::info!("Resource manager destroyed");
    }
}
