/**
 * Shared reflectors
 *
 * One pod reflector and one event reflector serve every spawner that holds the
 * same registry. Reflectors are started lazily on first use.
 */
use crate::error::Result;
use crate::k8s::api::{KubeResourceApi, ResourceApi, WatchScope};
use crate::k8s::reflect::{
    EventKind, EventReflector, FailureCallback, PodKind, PodReflector, Reflector,
    ReflectorConfig, ResourceKind,
};
use k8s_openapi::api::core::v1::{Event, Pod};
use kube::Client;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::error;

/// Failure callback used unless one is supplied: a mirror that silently stops
/// updating is worse than a process its supervisor restarts.
#[must_use]
pub fn halt_process(kind: &'static str) -> FailureCallback {
    Arc::new(move || {
        error!("💥 {} reflector failed, halting process", kind);
        std::process::exit(1);
    })
}

pub struct ReflectorRegistry {
    pod_api: Arc<dyn ResourceApi<Pod>>,
    event_api: Arc<dyn ResourceApi<Event>>,
    pod_config: ReflectorConfig,
    event_config: ReflectorConfig,
    on_pod_failure: FailureCallback,
    on_event_failure: FailureCallback,
    pods: Mutex<Option<Arc<PodReflector>>>,
    events: Mutex<Option<Arc<EventReflector>>>,
}

impl ReflectorRegistry {
    #[must_use]
    pub fn new(
        pod_api: Arc<dyn ResourceApi<Pod>>,
        event_api: Arc<dyn ResourceApi<Event>>,
        scope: WatchScope,
    ) -> Self {
        Self {
            pod_api,
            event_api,
            pod_config: ReflectorConfig::for_kind::<PodKind>(scope.clone()),
            event_config: ReflectorConfig::for_kind::<EventKind>(scope),
            on_pod_failure: halt_process(PodKind::NAME),
            on_event_failure: halt_process(EventKind::NAME),
            pods: Mutex::new(None),
            events: Mutex::new(None),
        }
    }

    /// Registry whose reflectors talk to the cluster behind `client`
    #[must_use]
    pub fn from_client(client: Client, scope: WatchScope) -> Self {
        let api = Arc::new(KubeResourceApi::new(client, scope.clone()));
        Self::new(api.clone(), api, scope)
    }

    #[must_use]
    pub fn with_pod_config(mut self, config: ReflectorConfig) -> Self {
        self.pod_config = config;
        self
    }

    #[must_use]
    pub fn with_event_config(mut self, config: ReflectorConfig) -> Self {
        self.event_config = config;
        self
    }

    /// Replace the process-halting default with `on_failure` for both kinds
    #[must_use]
    pub fn with_on_failure(mut self, on_failure: FailureCallback) -> Self {
        self.on_pod_failure = on_failure.clone();
        self.on_event_failure = on_failure;
        self
    }

    async fn get_or_start<T: ResourceKind>(
        slot: &Mutex<Option<Arc<Reflector<T>>>>,
        api: &Arc<dyn ResourceApi<T::Object>>,
        config: &ReflectorConfig,
        on_failure: &FailureCallback,
    ) -> Result<Arc<Reflector<T>>> {
        let mut slot = slot.lock().await;
        if let Some(reflector) = slot.as_ref() {
            return Ok(Arc::clone(reflector));
        }

        let reflector = Arc::new(
            Reflector::new(Arc::clone(api), config.clone()).with_on_failure(on_failure.clone()),
        );
        reflector.start().await?;
        *slot = Some(Arc::clone(&reflector));
        drop(slot);
        Ok(reflector)
    }

    /// The shared pod reflector, started on first use
    ///
    /// # Errors
    ///
    /// Returns an error if the reflector's initial list fails
    pub async fn pods(&self) -> Result<Arc<PodReflector>> {
        Self::get_or_start(&self.pods, &self.pod_api, &self.pod_config, &self.on_pod_failure).await
    }

    /// The shared event reflector, started on first use
    ///
    /// # Errors
    ///
    /// Returns an error if the reflector's initial list fails
    pub async fn events(&self) -> Result<Arc<EventReflector>> {
        Self::get_or_start(
            &self.events,
            &self.event_api,
            &self.event_config,
            &self.on_event_failure,
        )
        .await
    }

    /// Stop every started reflector
    pub async fn shutdown(&self) {
        if let Some(pods) = self.pods.lock().await.take() {
            pods.stop().await;
        }
        if let Some(events) = self.events.lock().await.take() {
            events.stop().await;
        }
    }
}
