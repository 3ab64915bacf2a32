use k8s_openapi::api::core::v1::{ContainerStatus, Pod};

/// Lifecycle of one user's pod as seen through the mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodState {
    NotStarted,
    Starting,
    Running,
    Terminating,
    Stopped { exit_code: i32 },
    /// Started at some point, but the mirror has no entry
    Unknown,
}

impl PodState {
    /// Derive the state of a mirrored pod; `main_container` decides when it has stopped
    #[must_use]
    pub fn observe(pod: Option<&Pod>, main_container: &str) -> Self {
        let Some(pod) = pod else {
            return Self::Unknown;
        };
        if pod.metadata.deletion_timestamp.is_some() {
            return Self::Terminating;
        }
        if let Some(exit_code) = terminated_exit_code(pod, main_container) {
            return Self::Stopped { exit_code };
        }
        if is_pod_running(Some(pod)) {
            return Self::Running;
        }
        match phase(pod) {
            Some("Succeeded") => Self::Stopped { exit_code: 0 },
            Some("Failed") => Self::Stopped { exit_code: 1 },
            _ => Self::Starting,
        }
    }
}

/// What `poll()` found for the pod
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// No mirror entry: never created, or already deleted
    Missing,
    Pending,
    /// Present without container statuses, e.g. deleted out-of-band
    NoContainerStatus,
    /// The main container terminated with this exit code
    Terminated(i32),
    Running,
}

impl PollOutcome {
    #[must_use]
    pub fn observe(pod: Option<&Pod>, main_container: &str) -> Self {
        let Some(pod) = pod else {
            return Self::Missing;
        };
        if phase(pod) == Some("Pending") {
            return Self::Pending;
        }
        let Some(statuses) = container_statuses(pod) else {
            return Self::NoContainerStatus;
        };
        statuses
            .iter()
            .find(|status| status.name == main_container)
            .and_then(terminated_code)
            .map_or(Self::Running, Self::Terminated)
    }

    /// Exit code reported to the caller; `None` while starting or running.
    ///
    /// A missing pod reports 1, the same as a real failure: callers cannot
    /// tell "never existed" from "exited with 1".
    #[must_use]
    pub const fn exit_code(self) -> Option<i32> {
        match self {
            Self::Missing | Self::NoContainerStatus => Some(1),
            Self::Terminated(code) => Some(code),
            Self::Pending | Self::Running => None,
        }
    }
}

/// Running, addressable, not being deleted, and every container ready
#[must_use]
pub fn is_pod_running(pod: Option<&Pod>) -> bool {
    let Some(pod) = pod else {
        return false;
    };
    let Some(status) = pod.status.as_ref() else {
        return false;
    };
    status.phase.as_deref() == Some("Running")
        && status.pod_ip.is_some()
        && pod.metadata.deletion_timestamp.is_none()
        && status
            .container_statuses
            .as_ref()
            .is_none_or(|statuses| statuses.iter().all(|cs| cs.ready))
}

/// IP of a mirrored pod, once assigned
#[must_use]
pub fn pod_ip(pod: &Pod) -> Option<String> {
    pod.status.as_ref().and_then(|status| status.pod_ip.clone())
}

fn phase(pod: &Pod) -> Option<&str> {
    pod.status.as_ref().and_then(|status| status.phase.as_deref())
}

fn container_statuses(pod: &Pod) -> Option<&Vec<ContainerStatus>> {
    pod.status
        .as_ref()
        .and_then(|status| status.container_statuses.as_ref())
}

fn terminated_code(status: &ContainerStatus) -> Option<i32> {
    status
        .state
        .as_ref()
        .and_then(|state| state.terminated.as_ref())
        .map(|terminated| terminated.exit_code)
}

fn terminated_exit_code(pod: &Pod, main_container: &str) -> Option<i32> {
    container_statuses(pod)?
        .iter()
        .find(|status| status.name == main_container)
        .and_then(terminated_code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{
        ContainerState, ContainerStateRunning, ContainerStateTerminated, PodStatus,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    fn container(name: &str, ready: bool, exit_code: Option<i32>) -> ContainerStatus {
        let state = exit_code.map_or_else(
            || ContainerState {
                running: Some(ContainerStateRunning::default()),
                ..ContainerState::default()
            },
            |exit_code| ContainerState {
                terminated: Some(ContainerStateTerminated {
                    exit_code,
                    ..ContainerStateTerminated::default()
                }),
                ..ContainerState::default()
            },
        );
        ContainerStatus {
            name: name.to_string(),
            ready,
            state: Some(state),
            ..ContainerStatus::default()
        }
    }

    fn pod(phase: &str, ip: Option<&str>, statuses: Option<Vec<ContainerStatus>>) -> Pod {
        Pod {
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                pod_ip: ip.map(str::to_string),
                container_statuses: statuses,
                ..PodStatus::default()
            }),
            ..Pod::default()
        }
    }

    #[test]
    fn test_poll_outcomes() {
        assert_eq!(PollOutcome::observe(None, "notebook").exit_code(), Some(1));

        let pending = pod("Pending", None, None);
        assert_eq!(PollOutcome::observe(Some(&pending), "notebook"), PollOutcome::Pending);

        let culled = pod("Running", Some("10.0.0.5"), None);
        assert_eq!(
            PollOutcome::observe(Some(&culled), "notebook").exit_code(),
            Some(1)
        );

        let done = pod("Running", Some("10.0.0.5"), Some(vec![container("notebook", false, Some(3))]));
        assert_eq!(PollOutcome::observe(Some(&done), "notebook"), PollOutcome::Terminated(3));

        // only the main container's termination counts
        let sidecar_done = pod(
            "Running",
            Some("10.0.0.5"),
            Some(vec![container("sidecar", false, Some(0)), container("notebook", true, None)]),
        );
        assert_eq!(
            PollOutcome::observe(Some(&sidecar_done), "notebook").exit_code(),
            None
        );
    }

    #[test]
    fn test_is_pod_running() {
        let ready = pod("Running", Some("10.0.0.5"), Some(vec![container("notebook", true, None)]));
        assert!(is_pod_running(Some(&ready)));
        assert_eq!(PodState::observe(Some(&ready), "notebook"), PodState::Running);

        let no_ip = pod("Running", None, Some(vec![container("notebook", true, None)]));
        assert!(!is_pod_running(Some(&no_ip)));

        let not_ready = pod("Running", Some("10.0.0.5"), Some(vec![container("notebook", false, None)]));
        assert!(!is_pod_running(Some(&not_ready)));
        assert_eq!(PodState::observe(Some(&not_ready), "notebook"), PodState::Starting);

        let mut deleting = ready;
        deleting.metadata.deletion_timestamp = Some(Time(Default::default()));
        assert!(!is_pod_running(Some(&deleting)));
        assert_eq!(PodState::observe(Some(&deleting), "notebook"), PodState::Terminating);

        assert!(!is_pod_running(None));
        assert_eq!(PodState::observe(None, "notebook"), PodState::Unknown);
    }
}
