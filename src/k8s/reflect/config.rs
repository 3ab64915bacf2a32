/**
 * Configuration constants and settings for reflectors
 */
use super::kind::ResourceKind;
use crate::k8s::api::{ListOptions, WatchScope};
use std::time::Duration;

/// First backoff delay after a watch failure, in milliseconds; doubled before each sleep
pub const INITIAL_BACKOFF_MILLIS: u64 = 100;

/// A failing watch gives up once the next backoff delay would exceed this
pub const MAX_BACKOFF_SECONDS: u64 = 30;

/// Network receive timeout for list calls and each watch read
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 60;

/// Server-side duration of one watch connection
pub const DEFAULT_WATCH_TIMEOUT_SECONDS: u32 = 10;

/// A watch connection is trusted this long before a forced list+watch cycle
pub const DEFAULT_RESTART_SECONDS: u64 = 30;

/// Settings for one `Reflector`
#[derive(Debug, Clone)]
pub struct ReflectorConfig {
    pub scope: WatchScope,
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
    /// Bound on each network receive; `None` waits forever
    pub request_timeout: Option<Duration>,
    /// Server-side watch duration; `None` leaves it to the server
    pub timeout_seconds: Option<u32>,
    pub restart_after: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl ReflectorConfig {
    /// Defaults for kind `T`, including its default selectors
    #[must_use]
    pub fn for_kind<T: ResourceKind>(scope: WatchScope) -> Self {
        Self {
            scope,
            label_selector: T::DEFAULT_LABEL_SELECTOR.map(str::to_string),
            field_selector: T::DEFAULT_FIELD_SELECTOR.map(str::to_string),
            request_timeout: Some(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECONDS)),
            timeout_seconds: Some(DEFAULT_WATCH_TIMEOUT_SECONDS),
            restart_after: Duration::from_secs(DEFAULT_RESTART_SECONDS),
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MILLIS),
            max_backoff: Duration::from_secs(MAX_BACKOFF_SECONDS),
        }
    }

    #[must_use]
    pub fn with_label_selector(mut self, selector: Option<String>) -> Self {
        self.label_selector = selector;
        self
    }

    #[must_use]
    pub fn with_field_selector(mut self, selector: Option<String>) -> Self {
        self.field_selector = selector;
        self
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_timeout_seconds(mut self, seconds: Option<u32>) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    #[must_use]
    pub const fn with_restart_after(mut self, restart_after: Duration) -> Self {
        self.restart_after = restart_after;
        self
    }

    /// Options for the full list; the server-side duration only applies to watches
    #[must_use]
    pub fn list_options(&self) -> ListOptions {
        ListOptions {
            label_selector: self.label_selector.clone(),
            field_selector: self.field_selector.clone(),
            timeout_seconds: None,
        }
    }

    #[must_use]
    pub fn watch_options(&self) -> ListOptions {
        ListOptions {
            timeout_seconds: self.timeout_seconds,
            ..self.list_options()
        }
    }
}

/// Validate configuration constants at compile time
const _: () = {
    assert!(INITIAL_BACKOFF_MILLIS > 0, "INITIAL_BACKOFF_MILLIS must be greater than 0");
    assert!(
        MAX_BACKOFF_SECONDS * 1000 > INITIAL_BACKOFF_MILLIS,
        "MAX_BACKOFF_SECONDS must exceed the initial backoff"
    );
    assert!(DEFAULT_WATCH_TIMEOUT_SECONDS < 295, "watch timeout is capped by the API server");
    assert!(DEFAULT_RESTART_SECONDS > 0, "DEFAULT_RESTART_SECONDS must be greater than 0");
};
