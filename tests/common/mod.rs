//! In-memory stand-in for the cluster API used by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc;
use k8s_openapi::api::core::v1::{
    ContainerState, ContainerStateRunning, ContainerStateTerminated, ContainerStatus, Event,
    ObjectReference, Pod, PodStatus,
};
use kube::api::{ObjectMeta, WatchEvent};
use kube::error::ErrorResponse;
use kube::Resource;
use podmirror::k8s::api::{ListOptions, PodApi, ResourceApi, ResourceList, WatchScope, WatchStream};
use podmirror::k8s::reflect::{EventKind, PodKind, ResourceKey, ResourceKind};
use podmirror::k8s::spawner::ReflectorRegistry;
use podmirror::{Error, Result};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const NAMESPACE: &str = "jhub";

enum Change<K> {
    Added(K),
    Modified(K),
    Deleted(K),
}

impl<K: Clone> Change<K> {
    fn event(&self) -> WatchEvent<K> {
        match self {
            Self::Added(object) => WatchEvent::Added(object.clone()),
            Self::Modified(object) => WatchEvent::Modified(object.clone()),
            Self::Deleted(object) => WatchEvent::Deleted(object.clone()),
        }
    }
}

struct StoreState<K> {
    objects: BTreeMap<ResourceKey, K>,
    version: u64,
    /// Every change with the version it produced, replayed to late watchers
    history: Vec<(u64, Change<K>)>,
    watchers: Vec<mpsc::UnboundedSender<Result<WatchEvent<K>>>>,
    fail_lists: bool,
    /// Open watches stay connected but receive nothing
    stalled: bool,
    list_calls: usize,
    watch_calls: usize,
}

/// One resource kind's objects plus the watch streams open on them
pub struct FakeStore<K> {
    state: Mutex<StoreState<K>>,
    key: fn(&K) -> ResourceKey,
}

impl<K> FakeStore<K>
where
    K: Resource + Clone + Send + Sync + 'static,
{
    pub fn new(key: fn(&K) -> ResourceKey) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(StoreState {
                objects: BTreeMap::new(),
                version: 1,
                history: Vec::new(),
                watchers: Vec::new(),
                fail_lists: false,
                stalled: false,
                list_calls: 0,
                watch_calls: 0,
            }),
            key,
        })
    }

    fn broadcast(state: &mut StoreState<K>, make: impl Fn() -> WatchEvent<K>) {
        if state.stalled {
            return;
        }
        state
            .watchers
            .retain(|tx| tx.unbounded_send(Ok(make())).is_ok());
    }

    fn record(state: &mut StoreState<K>, change: Change<K>) {
        Self::broadcast(state, || change.event());
        let version = state.version;
        state.history.push((version, change));
    }

    /// Upsert `object` and send ADDED or MODIFIED to every open watch
    pub fn apply(&self, mut object: K) {
        let mut state = self.state.lock().unwrap();
        state.version += 1;
        object.meta_mut().resource_version = Some(state.version.to_string());
        let key = (self.key)(&object);
        let change = match state.objects.insert(key, object.clone()) {
            Some(_) => Change::Modified(object),
            None => Change::Added(object),
        };
        Self::record(&mut state, change);
    }

    /// Remove `key` and send DELETED to every open watch
    pub fn remove(&self, key: &ResourceKey) -> Option<K> {
        let mut state = self.state.lock().unwrap();
        let removed = state.objects.remove(key)?;
        state.version += 1;
        Self::record(&mut state, Change::Deleted(removed.clone()));
        Some(removed)
    }

    /// Send a raw event without touching the stored objects
    pub fn emit(&self, make: impl Fn() -> WatchEvent<K>) {
        let mut state = self.state.lock().unwrap();
        Self::broadcast(&mut state, make);
    }

    /// End every open watch stream, as the server does at its timeout
    pub fn close_watches(&self) {
        self.state.lock().unwrap().watchers.clear();
    }

    /// Stop delivering changes to watches that are already open
    pub fn stall_watches(&self) {
        self.state.lock().unwrap().stalled = true;
    }

    pub fn set_fail_lists(&self, fail: bool) {
        self.state.lock().unwrap().fail_lists = fail;
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    pub fn watch_calls(&self) -> usize {
        self.state.lock().unwrap().watch_calls
    }

    pub fn open_watches(&self) -> usize {
        let mut state = self.state.lock().unwrap();
        state.watchers.retain(|tx| !tx.is_closed());
        state.watchers.len()
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.state.lock().unwrap().objects.contains_key(key)
    }

    pub fn get(&self, key: &ResourceKey) -> Option<K> {
        self.state.lock().unwrap().objects.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<ResourceKey> {
        self.state.lock().unwrap().objects.keys().cloned().collect()
    }
}

#[async_trait]
impl<K> ResourceApi<K> for FakeStore<K>
where
    K: Resource + Clone + Send + Sync + 'static,
{
    async fn list(&self, _options: &ListOptions) -> Result<ResourceList<K>> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        if state.fail_lists {
            return Err(Error::Custom("injected list failure".to_string()));
        }
        Ok(ResourceList {
            items: state.objects.values().cloned().collect(),
            resource_version: state.version.to_string(),
        })
    }

    async fn watch(
        &self,
        _options: &ListOptions,
        resource_version: &str,
    ) -> Result<WatchStream<K>> {
        let since: u64 = resource_version
            .parse()
            .map_err(|_| Error::Custom(format!("bad resourceVersion {resource_version}")))?;
        let (tx, rx) = mpsc::unbounded();
        let mut state = self.state.lock().unwrap();
        state.watch_calls += 1;
        for (version, change) in &state.history {
            if *version > since {
                let _ = tx.unbounded_send(Ok(change.event()));
            }
        }
        state.watchers.push(tx);
        Ok(rx.boxed())
    }
}

#[derive(Default)]
struct PodBehaviour {
    conflicts_remaining: u32,
    hide_created: bool,
    auto_run: bool,
}

/// Pods and events, plus a `PodApi` whose create/delete feed the pod store
pub struct FakeCluster {
    pub pods: Arc<FakeStore<Pod>>,
    pub events: Arc<FakeStore<Event>>,
    behaviour: Mutex<PodBehaviour>,
    create_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    deleted_grace_periods: Mutex<Vec<u32>>,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            pods: FakeStore::new(PodKind::key),
            events: FakeStore::new(EventKind::key),
            behaviour: Mutex::new(PodBehaviour {
                auto_run: true,
                ..PodBehaviour::default()
            }),
            create_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            deleted_grace_periods: Mutex::new(Vec::new()),
        })
    }

    /// The next `n` creates fail with 409 Conflict
    pub fn conflict_next_creates(&self, n: u32) {
        self.behaviour.lock().unwrap().conflicts_remaining = n;
    }

    /// Creates succeed but the pod never reaches the store
    pub fn hide_created_pods(&self) {
        self.behaviour.lock().unwrap().hide_created = true;
    }

    /// Created pods stay Pending instead of becoming ready
    pub fn leave_created_pending(&self) {
        self.behaviour.lock().unwrap().auto_run = false;
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn deleted_grace_periods(&self) -> Vec<u32> {
        self.deleted_grace_periods.lock().unwrap().clone()
    }

    /// Registry over this cluster whose failure callback counts instead of exiting
    pub fn registry(self: &Arc<Self>) -> (Arc<ReflectorRegistry>, Arc<AtomicUsize>) {
        let failures = Arc::new(AtomicUsize::new(0));
        let counter = failures.clone();
        let registry = ReflectorRegistry::new(
            self.pods.clone(),
            self.events.clone(),
            WatchScope::Namespace(NAMESPACE.to_string()),
        )
        .with_on_failure(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        (Arc::new(registry), failures)
    }
}

pub fn api_error(code: u16, reason: &str) -> Error {
    Error::Kube(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: reason.to_string(),
        reason: reason.to_string(),
        code,
    }))
}

#[async_trait]
impl PodApi for FakeCluster {
    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod> {
        let call = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let (hide, auto_run) = {
            let mut behaviour = self.behaviour.lock().unwrap();
            if behaviour.conflicts_remaining > 0 {
                behaviour.conflicts_remaining -= 1;
                return Err(api_error(409, "AlreadyExists"));
            }
            (behaviour.hide_created, behaviour.auto_run)
        };

        let mut created = pod.clone();
        created.metadata.namespace = Some(namespace.to_string());
        created.metadata.uid = Some(format!("uid-{call}"));
        if hide {
            return Ok(created);
        }
        created.status = Some(if auto_run {
            running_status()
        } else {
            PodStatus {
                phase: Some("Pending".to_string()),
                ..PodStatus::default()
            }
        });
        self.pods.apply(created.clone());
        Ok(created)
    }

    async fn delete_pod(&self, namespace: &str, name: &str, grace_period_seconds: u32) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.deleted_grace_periods
            .lock()
            .unwrap()
            .push(grace_period_seconds);
        match self.pods.remove(&ResourceKey::namespaced(namespace, name)) {
            Some(_) => Ok(()),
            None => Err(api_error(404, "NotFound")),
        }
    }
}

pub fn pod(namespace: &str, name: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..ObjectMeta::default()
        },
        ..Pod::default()
    }
}

pub fn labelled_pod(namespace: &str, name: &str, version: &str) -> Pod {
    let mut pod = pod(namespace, name);
    pod.metadata.labels = Some(BTreeMap::from([("v".to_string(), version.to_string())]));
    pod
}

fn running_status() -> PodStatus {
    PodStatus {
        phase: Some("Running".to_string()),
        pod_ip: Some("10.0.0.7".to_string()),
        container_statuses: Some(vec![ContainerStatus {
            name: "notebook".to_string(),
            ready: true,
            state: Some(ContainerState {
                running: Some(ContainerStateRunning::default()),
                ..ContainerState::default()
            }),
            ..ContainerStatus::default()
        }]),
        ..PodStatus::default()
    }
}

pub fn running_pod(namespace: &str, name: &str) -> Pod {
    let mut pod = pod(namespace, name);
    pod.status = Some(running_status());
    pod
}

pub fn terminated_pod(namespace: &str, name: &str, exit_code: i32) -> Pod {
    let mut pod = pod(namespace, name);
    pod.status = Some(PodStatus {
        phase: Some("Running".to_string()),
        pod_ip: Some("10.0.0.7".to_string()),
        container_statuses: Some(vec![ContainerStatus {
            name: "notebook".to_string(),
            state: Some(ContainerState {
                terminated: Some(ContainerStateTerminated {
                    exit_code,
                    ..ContainerStateTerminated::default()
                }),
                ..ContainerState::default()
            }),
            ..ContainerStatus::default()
        }]),
        ..PodStatus::default()
    });
    pod
}

pub fn pod_event(name: &str, pod_name: &str, message: &str) -> Event {
    Event {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            ..ObjectMeta::default()
        },
        involved_object: ObjectReference {
            kind: Some("Pod".to_string()),
            name: Some(pod_name.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            ..ObjectReference::default()
        },
        message: Some(message.to_string()),
        ..Event::default()
    }
}

/// Poll `condition` until it holds or two seconds pass
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
