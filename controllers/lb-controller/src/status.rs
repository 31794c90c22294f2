//! Resource status dispatch.
//!
//! The response handler reports apply results per resource kind through a
//! `StatusRegistry`. Kinds without a registered handler are skipped.

use crate::error::ControllerError;
use crate::types::{split_resource_key, ResourceKind};
use async_trait::async_trait;
use crds::{LoadBalancerStatus, TransportServer, VirtualServer};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// State reported for a resource whose partition was accepted by the device
pub const STATUS_OK: &str = "Ok";

/// Writes the apply result of one resource kind
#[async_trait]
pub trait StatusHandler: Send + Sync {
    async fn update_status(
        &self,
        namespace: &str,
        name: &str,
        state: &str,
        message: Option<&str>,
    ) -> Result<(), ControllerError>;
}

/// Status handlers by resource kind
#[derive(Default, Clone)]
pub struct StatusRegistry {
    handlers: HashMap<ResourceKind, Arc<dyn StatusHandler>>,
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: ResourceKind, handler: Arc<dyn StatusHandler>) {
        self.handlers.insert(kind, handler);
    }

    /// Update the status of `resource_key` (`namespace/name`).
    ///
    /// Returns `Ok(false)` when no handler is registered for `kind`.
    pub async fn update(
        &self,
        kind: ResourceKind,
        resource_key: &str,
        state: &str,
        message: Option<&str>,
    ) -> Result<bool, ControllerError> {
        let Some(handler) = self.handlers.get(&kind) else {
            debug!("No status handler for {}, skipping {}", kind, resource_key);
            return Ok(false);
        };
        let (namespace, name) = split_resource_key(resource_key);
        handler.update_status(namespace, name, state, message).await?;
        Ok(true)
    }
}

/// Custom resources carrying a `LoadBalancerStatus`
pub trait HasLoadBalancerStatus {
    fn lb_status(&self) -> Option<&LoadBalancerStatus>;
}

impl HasLoadBalancerStatus for VirtualServer {
    fn lb_status(&self) -> Option<&LoadBalancerStatus> {
        self.status.as_ref()
    }
}

impl HasLoadBalancerStatus for TransportServer {
    fn lb_status(&self) -> Option<&LoadBalancerStatus> {
        self.status.as_ref()
    }
}

/// Merge-patches the status subresource of a namespaced custom resource
pub struct KubeStatusHandler<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeStatusHandler<K> {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }
}

/// Whether the stored status already reports `state` and `message`
fn status_matches(current: Option<&LoadBalancerStatus>, state: &str, message: Option<&str>) -> bool {
    current.is_some_and(|s| s.status.as_deref() == Some(state) && s.error.as_deref() == message)
}

#[async_trait]
impl<K> StatusHandler for KubeStatusHandler<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + HasLoadBalancerStatus
        + Clone
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static,
{
    async fn update_status(
        &self,
        namespace: &str,
        name: &str,
        state: &str,
        message: Option<&str>,
    ) -> Result<(), ControllerError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let Some(resource) = api.get_opt(name).await? else {
            debug!("{} {}/{} no longer exists, skipping status update", K::kind(&()), namespace, name);
            return Ok(());
        };

        let current = resource.lb_status();
        if status_matches(current, state, message) {
            debug!("{} {}/{} already reports {}", K::kind(&()), namespace, name, state);
            return Ok(());
        }

        let vs_address = current.and_then(|s| s.vs_address.clone());
        // An explicit null clears a previous error under merge-patch semantics.
        let status_patch = serde_json::json!({
            "status": {
                "vsAddress": vs_address,
                "status": state,
                "error": message,
                "lastUpdated": chrono::Utc::now(),
            }
        });
        let pp = PatchParams::default();
        api.patch_status(name, &pp, &Patch::Merge(&status_patch))
            .await
            .map_err(|e| ControllerError::Status(format!("{}/{}: {}", namespace, name, e)))?;
        debug!("Updated {} {}/{} status to {}", K::kind(&()), namespace, name, state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::RecordingStatusHandler;

    #[tokio::test]
    async fn test_update_dispatches_by_kind() {
        let ts = Arc::new(RecordingStatusHandler::default());
        let mut registry = StatusRegistry::new();
        registry.register(ResourceKind::TransportServer, ts.clone());

        let handled = registry
            .update(ResourceKind::TransportServer, "ns-a/web", STATUS_OK, None)
            .await
            .unwrap();

        assert!(handled);
        assert_eq!(ts.updates(), vec![("ns-a".to_string(), "web".to_string(), STATUS_OK.to_string())]);
    }

    #[tokio::test]
    async fn test_unregistered_kind_is_skipped() {
        let registry = StatusRegistry::new();
        let handled = registry
            .update(ResourceKind::Route, "ns-a/route", STATUS_OK, None)
            .await
            .unwrap();
        assert!(!handled);
    }

    #[test]
    fn test_status_matches() {
        let current = LoadBalancerStatus {
            vs_address: Some("10.0.0.5".to_string()),
            status: Some(STATUS_OK.to_string()),
            ..Default::default()
        };
        assert!(status_matches(Some(&current), STATUS_OK, None));
        assert!(!status_matches(Some(&current), STATUS_OK, Some("declaration failed")));
        assert!(!status_matches(None, STATUS_OK, None));
    }
}
