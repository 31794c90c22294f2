//! Inbound path: snapshot to queued post request.

use crate::declaration::build_declaration;
use crate::error::ControllerError;
use crate::post_manager::PostManagers;
use crate::request_tracker::RequestTracker;
use crate::types::{AgentConfig, RequestMeta, ResourceConfigRequest};
use std::sync::Arc;
use tracing::info;

/// Records each snapshot as a new generation and queues it on its device.
pub struct RequestHandler {
    tracker: Arc<RequestTracker>,
    post_managers: Arc<PostManagers>,
}

impl RequestHandler {
    pub fn new(tracker: Arc<RequestTracker>, post_managers: Arc<PostManagers>) -> Self {
        Self {
            tracker,
            post_managers,
        }
    }

    /// Build, record and enqueue a snapshot.
    ///
    /// Callers must not run `process` concurrently for the same device, or
    /// generations could be queued out of order.
    pub async fn process(&self, request: ResourceConfigRequest) -> Result<RequestMeta, ControllerError> {
        let handle = self
            .post_managers
            .get(&request.device_key)
            .ok_or_else(|| ControllerError::UnknownDevice(request.device_key.to_string()))?;

        let tenants = build_declaration(&request);
        let meta = self.tracker.record_new_request(&request.device_key, &request);
        info!(
            "Queueing generation {} for {} ({} partitions)",
            meta.id,
            request.device_key,
            tenants.len()
        );
        handle
            .enqueue(AgentConfig::new(request.device_key, meta.clone(), tenants))
            .await?;
        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::post_manager::PostManagerHandle;
    use crate::test_utils::*;
    use crate::types::{DeviceKey, ResourceKind};
    use tokio::sync::mpsc;

    fn handler() -> (RequestHandler, mpsc::Receiver<AgentConfig>) {
        let (post_tx, post_rx) = mpsc::channel(4);
        let post_managers = Arc::new(PostManagers::new());
        post_managers.insert(PostManagerHandle::new(device(), post_tx));
        (RequestHandler::new(Arc::new(RequestTracker::new()), post_managers), post_rx)
    }

    #[tokio::test]
    async fn test_process_records_and_enqueues() {
        let (handler, mut post_rx) = handler();
        let mut request = ResourceConfigRequest::new(device());
        add_resource(&mut request, "ns-a", "ts_web", "ns-a/web", ResourceKind::TransportServer);

        let first = handler.process(request.clone()).await.unwrap();
        let second = handler.process(request).await.unwrap();

        assert_eq!((first.id, second.id), (1, 2));
        let queued = post_rx.recv().await.unwrap();
        assert_eq!(queued.id, 1);
        assert!(queued.tenants.contains_key("ns-a"));
        assert_eq!(queued.req_meta.partition_map["ns-a"]["ns-a/web"], ResourceKind::TransportServer);
        assert!(!queued.has_failures());
        assert_eq!(post_rx.recv().await.unwrap().id, 2);
    }

    #[tokio::test]
    async fn test_unknown_device() {
        let (handler, _post_rx) = handler();
        let request = ResourceConfigRequest::new(DeviceKey::new("https://unknown"));

        let err = handler.process(request).await.unwrap_err();
        assert!(matches!(err, ControllerError::UnknownDevice(_)));
    }
}
