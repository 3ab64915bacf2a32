use derive_more::From;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, From)]
pub enum Error {
    #[from]
    Kube(kube::Error),

    #[from]
    Infer(kube::config::InferConfigError),

    /// `start()` was called on a reflector whose watch task is still running
    AlreadyStarted(&'static str),

    /// A single network receive did not complete within the request timeout
    ReadTimeout,

    /// A bounded wait gave up; carries the reason shown to the caller
    Timeout(String),

    /// Pod creation kept conflicting with a pod that could not be removed
    PodAlreadyExists(String),

    /// A mirror lock was poisoned by a panicking writer
    LockPoisoned(String),

    /// Custom error message
    Custom(String),
}

impl core::fmt::Display for Error {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::result::Result<(), core::fmt::Error> {
        match self {
            Self::Kube(e) => write!(fmt, "kubernetes error: {e}"),
            Self::Infer(e) => write!(fmt, "kubeconfig error: {e}"),
            Self::AlreadyStarted(kind) => write!(fmt, "{kind} watcher is already running"),
            Self::ReadTimeout => write!(fmt, "read timed out"),
            Self::Timeout(message) => write!(fmt, "timeout: {message}"),
            Self::PodAlreadyExists(name) => write!(
                fmt,
                "can not create pod {name}: already exists and could not be deleted"
            ),
            Self::LockPoisoned(message) => write!(fmt, "lock poisoned: {message}"),
            Self::Custom(message) => write!(fmt, "{message}"),
        }
    }
}

impl std::error::Error for Error {}
