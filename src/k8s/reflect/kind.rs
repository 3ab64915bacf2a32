use k8s_openapi::api::core::v1::{Event, Pod};
use kube::{Resource, ResourceExt};
use std::fmt::{self, Debug, Display};
use std::hash::Hash;

/// Identity of a mirrored object.
///
/// Pods carry their namespace so identically named pods in different
/// namespaces stay distinct when mirroring cluster-wide. Events key on name only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceKey {
    #[must_use]
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }
}

impl Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{ns}/{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A kind of resource a `Reflector` can mirror
pub trait ResourceKind: Send + Sync + 'static {
    type Object: Resource + Clone + Debug + Send + Sync + 'static;

    /// Plural name used in logs
    const NAME: &'static str;
    const DEFAULT_LABEL_SELECTOR: Option<&'static str> = None;
    const DEFAULT_FIELD_SELECTOR: Option<&'static str> = None;

    fn key(object: &Self::Object) -> ResourceKey;
}

/// Single-user server pods, keyed on (namespace, name)
#[derive(Debug, Clone, Copy)]
pub struct PodKind;

impl ResourceKind for PodKind {
    type Object = Pod;

    const NAME: &'static str = "pods";
    const DEFAULT_LABEL_SELECTOR: Option<&'static str> = Some("component=singleuser-server");

    fn key(object: &Pod) -> ResourceKey {
        ResourceKey {
            namespace: object.namespace(),
            name: object.name_any(),
        }
    }
}

/// Events about pods, keyed on event name
#[derive(Debug, Clone, Copy)]
pub struct EventKind;

impl ResourceKind for EventKind {
    type Object = Event;

    const NAME: &'static str = "events";
    const DEFAULT_FIELD_SELECTOR: Option<&'static str> = Some("involvedObject.kind=Pod");

    fn key(object: &Event) -> ResourceKey {
        ResourceKey::named(object.name_any())
    }
}
