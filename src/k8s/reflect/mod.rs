pub mod backoff;
pub mod config;
pub mod errors;
pub mod kind;
pub mod reflector;
pub mod store;
mod watcher;

pub use backoff::WatchBackoff;
pub use config::ReflectorConfig;
pub use kind::{EventKind, PodKind, ResourceKey, ResourceKind};
pub use reflector::{EventReflector, PodReflector, Reflector};
pub use store::ResourceMirror;
pub use watcher::FailureCallback;
