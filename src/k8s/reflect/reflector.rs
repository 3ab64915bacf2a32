use super::config::ReflectorConfig;
use super::kind::{EventKind, PodKind, ResourceKind};
use super::store::ResourceMirror;
use super::watcher::{FailureCallback, WatchLoop};
use crate::error::{Error, Result};
use crate::k8s::api::ResourceApi;
use k8s_openapi::api::core::v1::{Event, Pod};
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Handle on the background task currently writing the mirror
struct WatchTask {
    generation: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Keeps a `ResourceMirror` in sync with the cluster for one resource kind.
///
/// `start()` lists once, then hands the mirror to a background watch task.
/// Consumers read the mirror through `resources()` (or `pods()` / `events()`)
/// and must tolerate it lagging the cluster while the watch reconnects.
pub struct Reflector<T: ResourceKind> {
    api: Arc<dyn ResourceApi<T::Object>>,
    config: ReflectorConfig,
    mirror: ResourceMirror<T::Object>,
    first_load: Arc<watch::Sender<bool>>,
    on_failure: Option<FailureCallback>,
    task: Mutex<Option<WatchTask>>,
    next_generation: AtomicU64,
    _kind: PhantomData<fn() -> T>,
}

pub type PodReflector = Reflector<PodKind>;
pub type EventReflector = Reflector<EventKind>;

impl<T: ResourceKind> Reflector<T> {
    #[must_use]
    pub fn new(api: Arc<dyn ResourceApi<T::Object>>, config: ReflectorConfig) -> Self {
        let (first_load, _) = watch::channel(false);
        Self {
            api,
            config,
            mirror: ResourceMirror::new(),
            first_load: Arc::new(first_load),
            on_failure: None,
            task: Mutex::new(None),
            next_generation: AtomicU64::new(1),
            _kind: PhantomData,
        }
    }

    /// Run `on_failure` once if the watch is given up as unrecoverable
    #[must_use]
    pub fn with_on_failure(mut self, on_failure: FailureCallback) -> Self {
        self.on_failure = Some(on_failure);
        self
    }

    /// Live view of the mirror; treat it as read-only
    #[must_use]
    pub const fn resources(&self) -> &ResourceMirror<T::Object> {
        &self.mirror
    }

    #[must_use]
    pub const fn config(&self) -> &ReflectorConfig {
        &self.config
    }

    /// True once a full list has populated the mirror
    #[must_use]
    pub fn first_load_done(&self) -> bool {
        *self.first_load.borrow()
    }

    /// Wait until the first full list has populated the mirror
    pub async fn wait_for_first_load(&self) {
        let mut loaded = self.first_load.subscribe();
        if let Err(e) = loaded.wait_for(|done| *done).await {
            debug!("{} first-load signal closed before loading: {}", T::NAME, e);
        }
    }

    /// Generation of the active watch task, `None` when stopped
    pub async fn watch_generation(&self) -> Option<u64> {
        self.task.lock().await.as_ref().map(|task| task.generation)
    }

    /// True while a watch task is alive
    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    fn watch_loop(&self) -> WatchLoop<T> {
        WatchLoop {
            api: Arc::clone(&self.api),
            config: self.config.clone(),
            mirror: self.mirror.clone(),
            first_load: Arc::clone(&self.first_load),
            on_failure: self.on_failure.clone(),
            cancel: CancellationToken::new(),
            generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
        }
    }

    fn spawn(watcher: WatchLoop<T>) -> WatchTask {
        let generation = watcher.generation;
        let cancel = watcher.cancel.clone();
        let handle = tokio::spawn(watcher.run());
        WatchTask {
            generation,
            cancel,
            handle,
        }
    }

    /// List once to populate the mirror, then start the background watch.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyStarted` if a watch task exists (call `stop()` first),
    /// or the list error if the initial list fails
    pub async fn start(&self) -> Result<()> {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return Err(Error::AlreadyStarted(T::NAME));
        }

        let watcher = self.watch_loop();
        watcher.list_and_update().await?;
        info!(
            "🚀 {} reflector started with {} objects in {}",
            T::NAME,
            self.mirror.len(),
            self.config.scope
        );
        *task = Some(Self::spawn(watcher));
        drop(task);
        Ok(())
    }

    /// Signal the watch task to exit. Returns false if nothing was running.
    pub async fn stop(&self) -> bool {
        let Some(task) = self.task.lock().await.take() else {
            return false;
        };
        task.cancel.cancel();
        info!("🛑 {} watcher (generation {}) stopped", T::NAME, task.generation);
        true
    }

    /// Replace the watch task with a fresh one and return its generation.
    ///
    /// The old task is cancelled but not joined: it may still be unwinding
    /// when the new one starts, but it can no longer write to the mirror.
    pub async fn restart(&self) -> u64 {
        let mut task = self.task.lock().await;
        if let Some(old) = task.take() {
            old.cancel.cancel();
            warn!(
                "♻️ Abandoning {} watcher generation {}",
                T::NAME,
                old.generation
            );
        }

        let replacement = Self::spawn(self.watch_loop());
        let generation = replacement.generation;
        *task = Some(replacement);
        drop(task);

        info!("🔍 {} watcher restarted as generation {}", T::NAME, generation);
        generation
    }
}

impl<T: ResourceKind> Drop for Reflector<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.cancel.cancel();
        }
    }
}

impl Reflector<PodKind> {
    #[must_use]
    pub const fn pods(&self) -> &ResourceMirror<Pod> {
        &self.mirror
    }
}

impl Reflector<EventKind> {
    /// Mirrored events, oldest `lastTimestamp` first
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        let mut events = self.mirror.values();
        events.sort_by(|a, b| a.last_timestamp.cmp(&b.last_timestamp));
        events
    }
}
