//! Projection of a worker pod's phase onto ImageBuild status

use k8s_openapi::api::core::v1::Pod;

/// Map a pod phase to the ImageBuild status state.
///
/// The phase is copied verbatim. A pod with no reported phase yet projects
/// to the empty string.
pub fn project_phase(phase: Option<&str>) -> String {
    phase.unwrap_or_default().to_string()
}

/// Current phase of a worker pod, if the kubelet has reported one
pub fn pod_phase(pod: &Pod) -> Option<&str> {
    pod.status.as_ref().and_then(|s| s.phase.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::PodStatus;

    #[test]
    fn phase_passes_through_verbatim() {
        for phase in ["Pending", "Running", "Succeeded", "Failed", "Unknown"] {
            assert_eq!(project_phase(Some(phase)), phase);
        }
    }

    #[test]
    fn unrecognized_phase_is_not_translated() {
        assert_eq!(project_phase(Some("Evicted")), "Evicted");
    }

    #[test]
    fn missing_phase_projects_to_empty_state() {
        assert_eq!(project_phase(None), "");
        assert_eq!(pod_phase(&Pod::default()), None);
    }

    #[test]
    fn reads_phase_from_pod_status() {
        let pod = Pod {
            status: Some(PodStatus {
                phase: Some("Running".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(project_phase(pod_phase(&pod)), "Running");
    }
}
