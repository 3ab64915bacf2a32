/**
 * Helper functions for inspecting and creating common error types
 */
use crate::error::Error;

/// HTTP status code carried by an API error, if any
#[must_use]
pub const fn status_code(error: &Error) -> Option<u16> {
    match error {
        Error::Kube(kube::Error::Api(response)) => Some(response.code),
        _ => None,
    }
}

/// True for a 404 Not Found API error
#[must_use]
pub const fn is_not_found(error: &Error) -> bool {
    matches!(status_code(error), Some(404))
}

/// True for a 409 Conflict API error
#[must_use]
pub const fn is_conflict(error: &Error) -> bool {
    matches!(status_code(error), Some(409))
}

/// Create a `LockPoisoned` error for mutex/rwlock poisoning (indicates prior panic)
#[must_use]
pub fn lock_poisoned_error(message: &str) -> Error {
    Error::LockPoisoned(format!(
        "{message} - this indicates a prior panic, application may be in an inconsistent state"
    ))
}
