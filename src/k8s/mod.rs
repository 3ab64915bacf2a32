pub mod api;
pub mod client;
pub mod reflect;
pub mod spawner;

/// Default user agent for `podmirror` - automatically uses the package version
///
/// All API clients should be created with `client::new(Some(USER_AGENT))`.
/// The value can be overridden via the `PODMIRROR_USER_AGENT` environment variable.
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
