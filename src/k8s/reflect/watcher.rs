/**
 * Watch loop
 *
 * Body of a reflector's background task: full list, then a bounded watch
 * applied to the mirror, repeated until cancelled or the failure budget is
 * spent.
 */
use super::backoff::WatchBackoff;
use super::config::ReflectorConfig;
use super::kind::{ResourceKey, ResourceKind};
use super::store::ResourceMirror;
use crate::error::{Error, Result};
use crate::k8s::api::ResourceApi;
use futures::StreamExt;
use kube::Resource;
use kube::api::WatchEvent;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Called once when a watch never recovers
pub type FailureCallback = Arc<dyn Fn() + Send + Sync>;

/// How one list+watch cycle ended without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchExit {
    /// Open longer than `restart_after`; relist
    Restart,
    /// Server closed the stream at the end of its timeout
    StreamEnded,
    Cancelled,
}

pub(crate) struct WatchLoop<T: ResourceKind> {
    pub(crate) api: Arc<dyn ResourceApi<T::Object>>,
    pub(crate) config: ReflectorConfig,
    pub(crate) mirror: ResourceMirror<T::Object>,
    pub(crate) first_load: Arc<watch::Sender<bool>>,
    pub(crate) on_failure: Option<FailureCallback>,
    pub(crate) cancel: CancellationToken,
    pub(crate) generation: u64,
}

impl<T: ResourceKind> WatchLoop<T> {
    /// Apply `f` to the mirror unless this loop has been cancelled.
    ///
    /// The cancellation check happens under the write lock, so a replaced
    /// loop can never write after its successor has started.
    fn mutate<F>(&self, f: F) -> Result<bool>
    where
        F: FnOnce(&mut HashMap<ResourceKey, T::Object>),
    {
        let mut objects = self.mirror.write()?;
        if self.cancel.is_cancelled() {
            return Ok(false);
        }
        f(&mut objects);
        drop(objects);
        Ok(true)
    }

    /// Bound one network receive by the request timeout
    async fn bounded<F, R>(&self, fut: F) -> Result<R>
    where
        F: Future<Output = Result<R>>,
    {
        match self.config.request_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| Error::ReadTimeout)?,
            None => fut.await,
        }
    }

    /// Replace the whole mirror with a fresh list and return the new cursor.
    ///
    /// # Errors
    ///
    /// Returns an error if the list call fails or times out
    pub(crate) async fn list_and_update(&self) -> Result<String> {
        let list = self.bounded(self.api.list(&self.config.list_options())).await?;
        let fresh: HashMap<ResourceKey, T::Object> = list
            .items
            .into_iter()
            .map(|object| (T::key(&object), object))
            .collect();
        let count = fresh.len();

        if self.mutate(|objects| *objects = fresh)? {
            self.first_load.send_replace(true);
            debug!(
                "📋 Mirrored {} {} at resourceVersion {}",
                count,
                T::NAME,
                list.resource_version
            );
        }

        Ok(list.resource_version)
    }

    /// Run until cancelled or until the watch is declared unrecoverable
    pub(crate) async fn run(self) {
        let mut backoff = WatchBackoff::new(self.config.initial_backoff, self.config.max_backoff);

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            info!(
                "🔍 Watching {} (generation {}) with label selector={:?} / field selector={:?} in {}",
                T::NAME,
                self.generation,
                self.config.label_selector,
                self.config.field_selector,
                self.config.scope
            );

            match self.watch_and_update(&mut backoff).await {
                Ok(WatchExit::Cancelled) => break,
                Ok(WatchExit::Restart) => {
                    debug!(
                        "🔄 Restarting {} watcher after {}s",
                        T::NAME,
                        self.config.restart_after.as_secs()
                    );
                }
                Ok(WatchExit::StreamEnded) => {
                    debug!("{} watcher timeout", T::NAME);
                }
                Err(Error::ReadTimeout) => {
                    warn!("Read timeout watching {}, reconnecting", T::NAME);
                }
                Err(e) => {
                    let Some(delay) = backoff.next_delay() else {
                        error!(
                            "❌ Watching {} never recovered, giving up: {}",
                            T::NAME,
                            e
                        );
                        if let Some(on_failure) = &self.on_failure {
                            on_failure();
                        }
                        return;
                    };
                    error!(
                        "❌ Error when watching {}, retrying in {:.1}s: {}",
                        T::NAME,
                        delay.as_secs_f64(),
                        e
                    );
                    tokio::select! {
                        () = self.cancel.cancelled() => break,
                        () = sleep(delay) => {}
                    }
                }
            }
        }

        warn!("{} watcher (generation {}) finished", T::NAME, self.generation);
    }

    /// One full list followed by one watch connection.
    ///
    /// The stream is owned by this call, so it is closed on every return path.
    async fn watch_and_update(&self, backoff: &mut WatchBackoff) -> Result<WatchExit> {
        let mut resource_version = self.list_and_update().await?;
        let started = Instant::now();

        let mut stream = self
            .bounded(self.api.watch(&self.config.watch_options(), &resource_version))
            .await?;

        loop {
            let next = tokio::select! {
                () = self.cancel.cancelled() => return Ok(WatchExit::Cancelled),
                next = self.bounded(async { stream.next().await.transpose() }) => next?,
            };
            let Some(event) = next else {
                return Ok(WatchExit::StreamEnded);
            };

            let applied = match event {
                WatchEvent::Added(object) | WatchEvent::Modified(object) => {
                    if let Some(version) = object.meta().resource_version.clone() {
                        resource_version = version;
                    }
                    let key = T::key(&object);
                    self.mutate(|objects| {
                        objects.insert(key, object);
                    })?
                }
                WatchEvent::Deleted(object) => {
                    if let Some(version) = object.meta().resource_version.clone() {
                        resource_version = version;
                    }
                    let key = T::key(&object);
                    self.mutate(|objects| {
                        objects.remove(&key);
                    })?
                }
                WatchEvent::Bookmark(bookmark) => {
                    resource_version = bookmark.metadata.resource_version;
                    true
                }
                WatchEvent::Error(response) => {
                    return Err(Error::Kube(kube::Error::Api(response)));
                }
            };
            if !applied {
                return Ok(WatchExit::Cancelled);
            }
            backoff.reset();

            if started.elapsed() >= self.config.restart_after {
                debug!(
                    "{} watch reached resourceVersion {}",
                    T::NAME,
                    resource_version
                );
                return Ok(WatchExit::Restart);
            }
        }
    }
}
