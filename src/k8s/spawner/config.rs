/**
 * Configuration constants and settings for pod spawners
 */
use std::collections::BTreeMap;
use std::time::Duration;

/// Seconds to wait for a pod to become ready, or to disappear after deletion
pub const DEFAULT_START_TIMEOUT_SECONDS: u64 = 300;

/// Grace period handed to the API server for a non-immediate delete
pub const DEFAULT_DELETE_GRACE_PERIOD_SECONDS: u32 = 25;

/// Create attempts made while a stale pod with the same name is in the way
pub const CREATE_RETRY_TIMES: u32 = 4;

/// Container whose termination ends the user's session
pub const DEFAULT_CONTAINER_NAME: &str = "notebook";

/// Port the single-user server listens on
pub const DEFAULT_PORT: u16 = 8888;

pub const DEFAULT_POD_NAME_TEMPLATE: &str = "jupyter-{username}";

pub const DEFAULT_NAMESPACE: &str = "default";

/// Settings for one user's `Spawner`
#[derive(Debug, Clone)]
pub struct SpawnerConfig {
    /// Namespace template; `{username}` is replaced with the escaped user name
    pub namespace: String,
    /// Pod name template; `{username}` is replaced with the escaped user name
    pub pod_name_template: String,
    pub image: String,
    pub port: u16,
    pub container_name: String,
    /// Extra labels merged into the pod's labels
    pub extra_labels: BTreeMap<String, String>,
    pub start_timeout: Duration,
    pub delete_grace_period: u32,
    /// Delete pods whose main container has terminated when they are polled
    pub delete_stopped_pods: bool,
}

impl Default for SpawnerConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            pod_name_template: DEFAULT_POD_NAME_TEMPLATE.to_string(),
            image: "jupyterhub/singleuser:latest".to_string(),
            port: DEFAULT_PORT,
            container_name: DEFAULT_CONTAINER_NAME.to_string(),
            extra_labels: BTreeMap::new(),
            start_timeout: Duration::from_secs(DEFAULT_START_TIMEOUT_SECONDS),
            delete_grace_period: DEFAULT_DELETE_GRACE_PERIOD_SECONDS,
            delete_stopped_pods: true,
        }
    }
}

impl SpawnerConfig {
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    #[must_use]
    pub const fn with_start_timeout(mut self, start_timeout: Duration) -> Self {
        self.start_timeout = start_timeout;
        self
    }

    #[must_use]
    pub const fn with_delete_grace_period(mut self, seconds: u32) -> Self {
        self.delete_grace_period = seconds;
        self
    }

    #[must_use]
    pub const fn with_delete_stopped_pods(mut self, delete: bool) -> Self {
        self.delete_stopped_pods = delete;
        self
    }
}

/// Validate configuration constants at compile time
const _: () = {
    assert!(CREATE_RETRY_TIMES > 0, "CREATE_RETRY_TIMES must be greater than 0");
    assert!(DEFAULT_START_TIMEOUT_SECONDS > 0, "DEFAULT_START_TIMEOUT_SECONDS must be greater than 0");
    assert!(DEFAULT_PORT > 0, "DEFAULT_PORT must be greater than 0");
};
