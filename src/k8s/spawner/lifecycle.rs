use super::config::{CREATE_RETRY_TIMES, SpawnerConfig};
use super::manifest::{
    BasicPodBuilder, ModifyPodHook, PodManifestBuilder, PodRequest, expand_template,
};
use super::registry::ReflectorRegistry;
use super::state::{PodState, PollOutcome, is_pod_running, pod_ip};
use crate::error::{Error, Result};
use crate::k8s::api::PodApi;
use crate::k8s::reflect::errors::{is_conflict, is_not_found};
use crate::k8s::reflect::ResourceKey;
use crate::retry::{BackoffConfig, exponential_backoff};
use k8s_openapi::api::core::v1::{Event, Pod};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Where a started single-user server can be reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodEndpoint {
    pub ip: String,
    pub port: u16,
}

/// Drives one user's pod through create, poll and delete, reading state from
/// the shared pod reflector instead of the API server.
pub struct Spawner {
    username: String,
    namespace: String,
    pod_name: String,
    config: SpawnerConfig,
    pod_api: Arc<dyn PodApi>,
    registry: Arc<ReflectorRegistry>,
    builder: Arc<dyn PodManifestBuilder>,
    modify_pod_hook: Option<ModifyPodHook>,
    pod_uid: Option<String>,
}

impl Spawner {
    #[must_use]
    pub fn new(
        username: &str,
        config: SpawnerConfig,
        pod_api: Arc<dyn PodApi>,
        registry: Arc<ReflectorRegistry>,
    ) -> Self {
        Self {
            username: username.to_string(),
            namespace: expand_template(&config.namespace, username),
            pod_name: expand_template(&config.pod_name_template, username),
            config,
            pod_api,
            registry,
            builder: Arc::new(BasicPodBuilder),
            modify_pod_hook: None,
            pod_uid: None,
        }
    }

    #[must_use]
    pub fn with_builder(mut self, builder: Arc<dyn PodManifestBuilder>) -> Self {
        self.builder = builder;
        self
    }

    #[must_use]
    pub fn with_modify_pod_hook(mut self, hook: ModifyPodHook) -> Self {
        self.modify_pod_hook = Some(hook);
        self
    }

    #[must_use]
    pub fn pod_name(&self) -> &str {
        &self.pod_name
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Uid of the pod created by the last successful `start()`
    #[must_use]
    pub fn pod_uid(&self) -> Option<&str> {
        self.pod_uid.as_deref()
    }

    /// Mirror key of this user's pod
    #[must_use]
    pub fn key(&self) -> ResourceKey {
        ResourceKey::namespaced(&self.namespace, &self.pod_name)
    }

    fn backoff(&self) -> BackoffConfig {
        BackoffConfig::with_timeout(self.config.start_timeout)
    }

    /// Current lifecycle state as seen through the mirror
    ///
    /// # Errors
    ///
    /// Returns an error if the pod reflector cannot be started
    pub async fn state(&self) -> Result<PodState> {
        let reflector = self.registry.pods().await?;
        let pod = reflector.pods().get(&self.key());
        Ok(match PodState::observe(pod.as_ref(), &self.config.container_name) {
            PodState::Unknown if self.pod_uid.is_none() => PodState::NotStarted,
            state => state,
        })
    }

    /// Exit status of the pod: `None` while starting or running.
    ///
    /// A pod missing from the mirror reports `Some(1)`, the same as a pod
    /// that failed with exit code 1.
    ///
    /// # Errors
    ///
    /// Returns an error if the reflector cannot be started, or if deleting a
    /// stopped pod fails
    pub async fn poll(&self) -> Result<Option<i32>> {
        let reflector = self.registry.pods().await?;
        reflector.wait_for_first_load().await;

        let pod = reflector.pods().get(&self.key());
        let outcome = PollOutcome::observe(pod.as_ref(), &self.config.container_name);
        if let PollOutcome::Terminated(code) = outcome {
            info!(
                "Container {} in pod {} exited with {}",
                self.config.container_name,
                self.key(),
                code
            );
            if self.config.delete_stopped_pods {
                self.stop(true).await?;
            }
        }
        Ok(outcome.exit_code())
    }

    /// Create the pod and wait until the mirror shows it running.
    ///
    /// # Errors
    ///
    /// - `PodAlreadyExists` when every create attempt conflicted
    /// - `Timeout` when the pod is not running within `start_timeout`; the
    ///   pod reflector is restarted first if the pod never showed up at all
    /// - any other API error, unchanged
    pub async fn start(&mut self) -> Result<PodEndpoint> {
        let reflector = self.registry.pods().await?;

        let mut pod = self.builder.build(&PodRequest {
            name: &self.pod_name,
            namespace: &self.namespace,
            username: &self.username,
            config: &self.config,
        });
        if let Some(hook) = &self.modify_pod_hook {
            pod = hook(pod);
        }

        self.create_with_retries(&pod).await?;

        let key = self.key();
        let mirror = reflector.pods().clone();
        let waited = exponential_backoff(
            &self.backoff(),
            &format!(
                "pod {} did not start in {} seconds!",
                key,
                self.config.start_timeout.as_secs()
            ),
            || is_pod_running(mirror.get(&key).as_ref()),
        )
        .await;

        if let Err(e) = waited {
            if mirror.contains_key(&key) {
                error!("⏱️ Pod {} showed up but never became ready", key);
            } else {
                error!(
                    "❌ Pod {} never showed up in reflector, restarting pod reflector",
                    key
                );
                reflector.restart().await;
            }
            return Err(e);
        }

        let running = mirror
            .get(&key)
            .ok_or_else(|| Error::Custom(format!("pod {key} vanished right after starting")))?;
        self.pod_uid.clone_from(&running.metadata.uid);
        let ip = pod_ip(&running)
            .ok_or_else(|| Error::Custom(format!("pod {key} is running without an IP")))?;

        info!("✅ Pod {} running at {}:{}", key, ip, self.config.port);
        Ok(PodEndpoint {
            ip,
            port: self.config.port,
        })
    }

    async fn create_with_retries(&self, pod: &Pod) -> Result<()> {
        for attempt in 1..=CREATE_RETRY_TIMES {
            match self.pod_api.create_pod(&self.namespace, pod).await {
                Ok(_) => {
                    info!("🚀 Created pod {} (attempt {})", self.key(), attempt);
                    return Ok(());
                }
                Err(e) if is_conflict(&e) => {
                    info!("Found existing pod {}, attempting to kill", self.key());
                    self.stop(true).await?;
                    info!(
                        "Killed pod {}, will try starting singleuser pod again",
                        self.key()
                    );
                }
                Err(e) => {
                    error!("❌ Failed to create pod {}: {}", self.key(), e);
                    return Err(e);
                }
            }
        }
        Err(Error::PodAlreadyExists(self.pod_name.clone()))
    }

    /// Delete the pod and wait until it is gone from the mirror.
    ///
    /// `now` deletes with no grace period. A pod that is already gone counts
    /// as deleted.
    ///
    /// # Errors
    ///
    /// - `Timeout` when the pod is still mirrored after `start_timeout`; the
    ///   pod reflector is restarted first
    /// - any API error other than 404, unchanged
    pub async fn stop(&self, now: bool) -> Result<()> {
        let reflector = self.registry.pods().await?;
        let grace_period = if now {
            0
        } else {
            self.config.delete_grace_period
        };

        info!("🗑️ Deleting pod {} (grace period {}s)", self.key(), grace_period);
        match self
            .pod_api
            .delete_pod(&self.namespace, &self.pod_name, grace_period)
            .await
        {
            Ok(()) => {}
            Err(e) if is_not_found(&e) => {
                warn!(
                    "No pod {} to delete. Assuming already deleted.",
                    self.key()
                );
            }
            Err(e) => return Err(e),
        }

        let key = self.key();
        let mirror = reflector.pods().clone();
        let waited = exponential_backoff(
            &self.backoff(),
            &format!(
                "pod {} did not disappear in {} seconds!",
                key,
                self.config.start_timeout.as_secs()
            ),
            || !mirror.contains_key(&key),
        )
        .await;

        if let Err(e) = waited {
            error!(
                "❌ Pod {} did not disappear, restarting pod reflector",
                key
            );
            reflector.restart().await;
            return Err(e);
        }
        Ok(())
    }

    /// Mirrored events about this user's pod, oldest first
    ///
    /// # Errors
    ///
    /// Returns an error if the event reflector cannot be started
    pub async fn events(&self) -> Result<Vec<Event>> {
        let reflector = self.registry.events().await?;
        Ok(reflector
            .events()
            .into_iter()
            .filter(|event| {
                event.involved_object.name.as_deref() == Some(self.pod_name.as_str())
                    && event
                        .involved_object
                        .namespace
                        .as_deref()
                        .is_none_or(|ns| ns == self.namespace)
            })
            .collect())
    }
}
