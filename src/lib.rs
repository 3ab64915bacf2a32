//! Mirror Kubernetes pods and events into memory with a list+watch reflector,
//! and drive per-user pod lifecycles (create, poll, delete) from that mirror.

pub mod error;
pub mod k8s;
pub mod retry;

pub use error::{Error, Result};
