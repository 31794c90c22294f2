//! Main controller implementation.
//!
//! Wires the reconciliation engine together: one post worker for the
//! configured device, the response handler consuming its outcomes, the
//! resource watchers feeding snapshots and the metrics endpoint.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::ipam_cache::{IpamCache, KubeIpamClient};
use crate::metrics::{self, Metrics};
use crate::post_manager::{PostManager, PostManagers};
use crate::priority::PriorityStore;
use crate::request_handler::RequestHandler;
use crate::request_tracker::RequestTracker;
use crate::response_handler::ResponseHandler;
use crate::status::{KubeStatusHandler, StatusRegistry};
use crate::types::{DeviceKey, ResourceKind};
use crate::watcher::Watcher;
use as3_client::{As3Client, DeviceClientTrait};
use crds::{TransportServer, VirtualServer};
use kube::{Api, Client};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Main controller for load-balancer declarations.
pub struct Controller {
    vs_watcher: JoinHandle<Result<(), ControllerError>>,
    ts_watcher: JoinHandle<Result<(), ControllerError>>,
    post_worker: JoinHandle<()>,
    response_handler: JoinHandle<()>,
    metrics_server: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts its tasks.
    pub async fn new(config: ControllerConfig, user_agent: String) -> Result<Self, ControllerError> {
        info!("Initializing load-balancer controller");

        let kube_client = Client::try_default().await?;

        let device_client = As3Client::new(
            config.bigip_url.clone(),
            config.bigip_username.clone(),
            config.bigip_password.clone(),
            config.bigip_insecure,
        )?;
        match device_client.info().await {
            Ok(info) => info!("Device {} runs AS3 {}", config.bigip_url, info.version),
            Err(e) => warn!("Could not query AS3 version on {}: {}", config.bigip_url, e),
        }

        let metrics = Arc::new(Metrics::new()?);
        let device_key = match &config.bigip_label {
            Some(label) => DeviceKey::with_label(config.bigip_url.clone(), label.clone()),
            None => DeviceKey::new(config.bigip_url.clone()),
        };
        let tracker = Arc::new(RequestTracker::new());
        let priorities = Arc::new(PriorityStore::new());
        let post_managers = Arc::new(PostManagers::new());
        let ipam_cache = Arc::new(IpamCache::new());

        let (resp_tx, resp_rx) = mpsc::channel(config.post_queue_capacity);
        let (handle, post_worker) = PostManager::spawn(
            device_key.clone(),
            Arc::new(device_client),
            priorities.clone(),
            resp_tx,
            config.post_queue_capacity,
            user_agent,
            metrics.clone(),
        );
        post_managers.insert(handle);

        let mut status_registry = StatusRegistry::new();
        status_registry.register(
            ResourceKind::VirtualServer,
            Arc::new(KubeStatusHandler::<VirtualServer>::new(kube_client.clone())),
        );
        status_registry.register(
            ResourceKind::TransportServer,
            Arc::new(KubeStatusHandler::<TransportServer>::new(kube_client.clone())),
        );

        let mut response_handler = ResponseHandler::new(
            tracker.clone(),
            post_managers.clone(),
            priorities,
            ipam_cache.clone(),
            metrics.clone(),
        )
        .with_status_registry(status_registry)
        .with_retry_delay(config.retry_delay);
        if let Some(ns) = &config.ipam_namespace {
            info!("IPAM cleanup enabled for {}/{}", ns, config.ipam_name);
            response_handler = response_handler.with_ipam_client(Arc::new(KubeIpamClient::new(
                kube_client.clone(),
                ns,
                config.ipam_name.clone(),
            )));
        }
        let response_handler = tokio::spawn(response_handler.run(resp_rx));

        let (vs_api, ts_api): (Api<VirtualServer>, Api<TransportServer>) = match &config.watch_namespace {
            Some(ns) => (
                Api::namespaced(kube_client.clone(), ns),
                Api::namespaced(kube_client, ns),
            ),
            None => (Api::all(kube_client.clone()), Api::all(kube_client)),
        };
        let request_handler = Arc::new(RequestHandler::new(tracker, post_managers));
        let watcher = Arc::new(Watcher::new(device_key, request_handler, ipam_cache, vs_api, ts_api));

        let vs_watcher = {
            let watcher = watcher.clone();
            tokio::spawn(async move { watcher.watch_virtual_servers().await })
        };
        let ts_watcher = tokio::spawn(async move { watcher.watch_transport_servers().await });
        let metrics_server = tokio::spawn(metrics::serve(config.metrics_addr, metrics));

        Ok(Self {
            vs_watcher,
            ts_watcher,
            post_worker,
            response_handler,
            metrics_server,
        })
    }

    /// Runs the controller until one of its tasks exits.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Load-balancer controller running");

        // Every task is meant to run forever; any exit is fatal.
        tokio::select! {
            result = &mut self.vs_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("VirtualServer watcher panicked: {}", e)))?
            }
            result = &mut self.ts_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("TransportServer watcher panicked: {}", e)))?
            }
            result = &mut self.post_worker => {
                result.map_err(|e| ControllerError::WorkerStopped(format!("post worker panicked: {}", e)))?;
                Err(ControllerError::WorkerStopped("post worker exited".to_string()))
            }
            result = &mut self.response_handler => {
                result.map_err(|e| ControllerError::WorkerStopped(format!("response handler panicked: {}", e)))?;
                Err(ControllerError::WorkerStopped("response handler exited".to_string()))
            }
            result = &mut self.metrics_server => {
                result.map_err(|e| ControllerError::Metrics(format!("metrics server panicked: {}", e)))??;
                Err(ControllerError::Metrics("metrics server exited".to_string()))
            }
        }
    }
}
