//! Kubernetes Event recording for the ImageBuild controller
//!
//! Events are fire-and-forget: failures are logged and never propagate. A
//! failed event must never break reconciliation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::{info, warn};

#[cfg(test)]
use mockall::automock;

/// Publishes Kubernetes Events about ImageBuilds
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an Event on the given object
    ///
    /// * `reason` - machine-readable reason, e.g. `ErrResourceExists`
    /// * `action` - what the controller was doing, e.g. `Reconcile`
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Publisher backed by `kube::runtime::events::Recorder`
///
/// Every event is also written to the log, so events remain visible when
/// the Events API is unavailable or filtered.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a publisher reporting as `controller_name`
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        info!(
            object = resource_ref.name.as_deref().unwrap_or_default(),
            namespace = resource_ref.namespace.as_deref().unwrap_or_default(),
            ?type_,
            reason,
            note = note.as_deref().unwrap_or_default(),
            "event"
        );

        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "failed to publish Kubernetes event");
        }
    }
}

/// Publisher that drops every event
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Event reasons, shown under REASON in `kubectl get events`
pub mod reasons {
    /// A same-named pod exists that the ImageBuild does not control
    pub const RESOURCE_EXISTS: &str = "ErrResourceExists";
    /// The ImageBuild spec is missing a required field
    pub const VALIDATION_FAILED: &str = "ValidationFailed";
    /// The worker pod was created
    pub const WORKER_CREATED: &str = "WorkerCreated";
}

/// Event actions, shown under ACTION in `kubectl get events`
pub mod actions {
    /// Standard reconciliation loop
    pub const RECONCILE: &str = "Reconcile";
}

/// Note attached to the ownership-conflict warning
pub fn resource_exists_message(worker: &str) -> String {
    format!(
        "Resource {:?} already exists and is not managed by {}",
        worker,
        crate::CONTROLLER_NAME
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publishers_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoopEventPublisher>();
        assert_send_sync::<KubeEventPublisher>();
    }

    #[test]
    fn resource_exists_message_quotes_worker() {
        assert_eq!(
            resource_exists_message("app"),
            "Resource \"app\" already exists and is not managed by img-controller"
        );
    }

    #[test]
    fn reason_matches_kubernetes_convention() {
        assert_eq!(reasons::RESOURCE_EXISTS, "ErrResourceExists");
        assert_eq!(actions::RECONCILE, "Reconcile");
    }

    #[tokio::test]
    async fn noop_publisher_does_not_panic() {
        NoopEventPublisher
            .publish(
                &ObjectReference::default(),
                EventType::Warning,
                reasons::RESOURCE_EXISTS,
                actions::RECONCILE,
                Some(resource_exists_message("app")),
            )
            .await;
    }
}
