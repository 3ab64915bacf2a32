/**
 * Cluster API seam
 *
 * The reflector and spawner only talk to the cluster through these traits so
 * they can run against a real API server or an in-memory stand-in.
 */
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::serde::de::DeserializeOwned;
use kube::api::{Api, DeleteParams, ListParams, PostParams, WatchEvent, WatchParams};
use kube::{Client, Resource};
use std::fmt::Debug;
use tracing::debug;

/// Which namespaces a list/watch covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchScope {
    Namespace(String),
    AllNamespaces,
}

impl WatchScope {
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        match self {
            Self::Namespace(ns) => Some(ns.as_str()),
            Self::AllNamespaces => None,
        }
    }
}

impl std::fmt::Display for WatchScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Namespace(ns) => write!(f, "namespace {ns}"),
            Self::AllNamespaces => write!(f, "all namespaces"),
        }
    }
}

/// Selectors and server-side duration shared by list and watch calls
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
    /// Server-side duration of a watch connection
    pub timeout_seconds: Option<u32>,
}

/// Result of a full list: every item plus the cursor to resume watching from
#[derive(Debug, Clone)]
pub struct ResourceList<K> {
    pub items: Vec<K>,
    pub resource_version: String,
}

/// Stream of incremental changes opened from a `resource_version`
pub type WatchStream<K> = BoxStream<'static, Result<WatchEvent<K>>>;

/// List and watch one resource kind
#[async_trait]
pub trait ResourceApi<K>: Send + Sync
where
    K: Send + 'static,
{
    /// # Errors
    ///
    /// Returns an error if the list call fails
    async fn list(&self, options: &ListOptions) -> Result<ResourceList<K>>;

    /// # Errors
    ///
    /// Returns an error if the watch request cannot be opened
    async fn watch(&self, options: &ListOptions, resource_version: &str)
    -> Result<WatchStream<K>>;
}

/// Pod mutations issued by the spawner
#[async_trait]
pub trait PodApi: Send + Sync {
    /// # Errors
    ///
    /// Returns the API error unchanged, including 409 when the pod already exists
    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod>;

    /// # Errors
    ///
    /// Returns the API error unchanged, including 404 when the pod is gone
    async fn delete_pod(&self, namespace: &str, name: &str, grace_period_seconds: u32)
    -> Result<()>;
}

/// `ResourceApi`/`PodApi` backed by a kube `Client`
#[derive(Clone)]
pub struct KubeResourceApi {
    client: Client,
    scope: WatchScope,
}

impl KubeResourceApi {
    #[must_use]
    pub const fn new(client: Client, scope: WatchScope) -> Self {
        Self { client, scope }
    }

    fn api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        match &self.scope {
            WatchScope::Namespace(ns) => Api::namespaced(self.client.clone(), ns),
            WatchScope::AllNamespaces => Api::all(self.client.clone()),
        }
    }
}

fn list_params(options: &ListOptions) -> ListParams {
    let mut lp = ListParams::default();
    if let Some(labels) = &options.label_selector {
        lp = lp.labels(labels);
    }
    if let Some(fields) = &options.field_selector {
        lp = lp.fields(fields);
    }
    lp
}

fn watch_params(options: &ListOptions) -> WatchParams {
    let mut wp = WatchParams::default();
    if let Some(labels) = &options.label_selector {
        wp = wp.labels(labels);
    }
    if let Some(fields) = &options.field_selector {
        wp = wp.fields(fields);
    }
    if let Some(timeout) = options.timeout_seconds {
        wp = wp.timeout(timeout);
    }
    wp
}

#[async_trait]
impl<K> ResourceApi<K> for KubeResourceApi
where
    K: Resource<Scope = NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static,
    <K as Resource>::DynamicType: Default,
{
    async fn list(&self, options: &ListOptions) -> Result<ResourceList<K>> {
        let list = self.api::<K>().list(&list_params(options)).await?;
        let resource_version = list.metadata.resource_version.ok_or_else(|| {
            Error::Custom(format!(
                "list of {} returned no resourceVersion",
                K::plural(&Default::default())
            ))
        })?;
        debug!(
            "📋 Listed {} {} at resourceVersion {}",
            list.items.len(),
            K::plural(&Default::default()),
            resource_version
        );
        Ok(ResourceList {
            items: list.items,
            resource_version,
        })
    }

    async fn watch(
        &self,
        options: &ListOptions,
        resource_version: &str,
    ) -> Result<WatchStream<K>> {
        let stream = self
            .api::<K>()
            .watch(&watch_params(options), resource_version)
            .await?;
        Ok(stream.map_err(Error::from).boxed())
    }
}

#[async_trait]
impl PodApi for KubeResourceApi {
    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        Ok(pods.create(&PostParams::default(), pod).await?)
    }

    async fn delete_pod(
        &self,
        namespace: &str,
        name: &str,
        grace_period_seconds: u32,
    ) -> Result<()> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let dp = DeleteParams {
            grace_period_seconds: Some(grace_period_seconds),
            ..DeleteParams::default()
        };
        pods.delete(name, &dp).await?;
        Ok(())
    }
}
