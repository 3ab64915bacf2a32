use super::config::SpawnerConfig;
use k8s_openapi::api::core::v1::{Container, ContainerPort, Pod, PodSpec};
use kube::api::ObjectMeta;
use std::fmt::Write as _;
use std::sync::Arc;

/// Label every spawned pod carries; the pod reflector selects on it
pub const COMPONENT_LABEL: (&str, &str) = ("component", "singleuser-server");

/// Label carrying the escaped user name
pub const USERNAME_LABEL: &str = "hub.jupyter.org/username";

/// Last-moment mutation of the manifest before it is submitted
pub type ModifyPodHook = Arc<dyn Fn(Pod) -> Pod + Send + Sync>;

/// Everything a builder needs to describe one user's pod
#[derive(Debug, Clone)]
pub struct PodRequest<'a> {
    pub name: &'a str,
    pub namespace: &'a str,
    pub username: &'a str,
    pub config: &'a SpawnerConfig,
}

/// Produces the create-request body for a user's pod
pub trait PodManifestBuilder: Send + Sync {
    fn build(&self, request: &PodRequest<'_>) -> Pod;
}

/// Single-container pod running `config.image` on `config.port`
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicPodBuilder;

impl PodManifestBuilder for BasicPodBuilder {
    fn build(&self, request: &PodRequest<'_>) -> Pod {
        let mut labels = request.config.extra_labels.clone();
        labels.insert(COMPONENT_LABEL.0.to_string(), COMPONENT_LABEL.1.to_string());
        labels.insert(USERNAME_LABEL.to_string(), safe_name(request.username));

        Pod {
            metadata: ObjectMeta {
                name: Some(request.name.to_string()),
                namespace: Some(request.namespace.to_string()),
                labels: Some(labels),
                ..ObjectMeta::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: request.config.container_name.clone(),
                    image: Some(request.config.image.clone()),
                    ports: Some(vec![ContainerPort {
                        container_port: i32::from(request.config.port),
                        name: Some("notebook-port".to_string()),
                        ..ContainerPort::default()
                    }]),
                    ..Container::default()
                }],
                restart_policy: Some("OnFailure".to_string()),
                ..PodSpec::default()
            }),
            ..Pod::default()
        }
    }
}

/// Escape `raw` into a DNS-label-safe, lowercase string.
///
/// Lowercase ascii letters and digits pass through; every other byte becomes
/// `-` followed by its two-digit hex value, so distinct inputs stay distinct.
#[must_use]
pub fn safe_name(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_lowercase() || byte.is_ascii_digit() {
            escaped.push(char::from(byte));
        } else {
            let _ = write!(escaped, "-{byte:02x}");
        }
    }
    escaped
}

/// Expand `{username}` in `template` with the escaped user name
#[must_use]
pub fn expand_template(template: &str, username: &str) -> String {
    template.replace("{username}", &safe_name(username))
}
