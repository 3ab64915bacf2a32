pub mod config;
pub mod lifecycle;
pub mod manifest;
pub mod registry;
pub mod state;

pub use config::SpawnerConfig;
pub use lifecycle::{PodEndpoint, Spawner};
pub use manifest::{BasicPodBuilder, ModifyPodHook, PodManifestBuilder, PodRequest};
pub use registry::{ReflectorRegistry, halt_process};
pub use state::{PodState, PollOutcome, is_pod_running};
