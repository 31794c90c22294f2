//! Per-device post workers.
//!
//! Each device gets one `PostManager` task that owns a bounded queue of
//! `AgentConfig`s. Posts to a device are strictly serialized: the worker
//! takes one request, posts it, emits exactly one outcome on the shared
//! response channel and only then takes the next one.

use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::priority::PriorityStore;
use crate::types::{AgentConfig, DeclarationResult, DeviceKey};
use as3_client::{As3Declaration, DeviceClientTrait};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Sending side of a device's post queue.
#[derive(Debug, Clone)]
pub struct PostManagerHandle {
    device_key: DeviceKey,
    post_tx: mpsc::Sender<AgentConfig>,
}

impl PostManagerHandle {
    pub fn new(device_key: DeviceKey, post_tx: mpsc::Sender<AgentConfig>) -> Self {
        Self { device_key, post_tx }
    }

    /// Queue a post request.
    ///
    /// Waits while the queue is full; never drops the request.
    pub async fn enqueue(&self, config: AgentConfig) -> Result<(), ControllerError> {
        self.post_tx
            .send(config)
            .await
            .map_err(|_| ControllerError::WorkerStopped(self.device_key.to_string()))
    }
}

/// Registry of post workers by device.
#[derive(Debug, Default)]
pub struct PostManagers {
    managers: RwLock<HashMap<DeviceKey, PostManagerHandle>>,
}

impl PostManagers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: PostManagerHandle) {
        self.managers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle.device_key.clone(), handle);
    }

    pub fn get(&self, device_key: &DeviceKey) -> Option<PostManagerHandle> {
        self.managers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(device_key)
            .cloned()
    }
}

/// Worker posting declarations to one device.
pub struct PostManager {
    device_key: DeviceKey,
    client: Arc<dyn DeviceClientTrait>,
    priorities: Arc<PriorityStore>,
    resp_tx: mpsc::Sender<AgentConfig>,
    post_rx: mpsc::Receiver<AgentConfig>,
    user_agent: String,
    metrics: Arc<Metrics>,
}

impl PostManager {
    /// Start a worker for `device_key` and return its queue handle.
    pub fn spawn(
        device_key: DeviceKey,
        client: Arc<dyn DeviceClientTrait>,
        priorities: Arc<PriorityStore>,
        resp_tx: mpsc::Sender<AgentConfig>,
        queue_capacity: usize,
        user_agent: String,
        metrics: Arc<Metrics>,
    ) -> (PostManagerHandle, JoinHandle<()>) {
        let (post_tx, post_rx) = mpsc::channel(queue_capacity.max(1));
        let handle = PostManagerHandle::new(device_key.clone(), post_tx);
        let worker = Self {
            device_key,
            client,
            priorities,
            resp_tx,
            post_rx,
            user_agent,
            metrics,
        };
        (handle, tokio::spawn(worker.run()))
    }

    async fn run(mut self) {
        info!("Post worker started for device {}", self.device_key);
        while let Some(config) = self.post_rx.recv().await {
            let outcome = self.post(config).await;
            if self.resp_tx.send(outcome).await.is_err() {
                warn!("Response channel closed, stopping post worker for {}", self.device_key);
                return;
            }
        }
        info!("Post queue closed for device {}", self.device_key);
    }

    /// Post one request and attach its outcome.
    ///
    /// A request that already carries failed tenants is a retry: only those
    /// tenants are posted again.
    async fn post(&self, mut config: AgentConfig) -> AgentConfig {
        let targets: Vec<String> = if config.has_failures() {
            config
                .declaration_result
                .failed_tenants
                .iter()
                .filter(|t| config.tenants.contains_key(*t))
                .cloned()
                .collect()
        } else {
            config.tenants.keys().cloned().collect()
        };
        let ordered = self.priorities.order_tenants(&targets);

        if ordered.is_empty() {
            debug!("Nothing to post for generation {} on {}", config.id, self.device_key);
            config.declaration_result = DeclarationResult::default();
            return config;
        }

        let tenants: BTreeMap<_, _> = ordered
            .iter()
            .filter_map(|t| config.tenants.get(t).map(|decl| (t.clone(), decl.clone())))
            .collect();
        let declaration = As3Declaration::new(tenants, &self.user_agent);

        info!(
            "Posting generation {} to {} for tenants {:?}",
            config.id, self.device_key, ordered
        );
        let result = match self.client.post_declaration(&declaration, &ordered).await {
            Ok(response) => DeclarationResult::from_response(&ordered, response),
            Err(e) => {
                warn!("Post to {} failed: {}", self.device_key, e);
                DeclarationResult::all_failed(&ordered, &e.to_string())
            }
        };

        let outcome = if result.failed_tenants.is_empty() {
            "success"
        } else if result.failed_tenants.len() < ordered.len() {
            "partial"
        } else {
            "failed"
        };
        self.metrics.posts_total.with_label_values(&[outcome]).inc();
        if !result.failed_tenants.is_empty() {
            for tenant in &result.failed_tenants {
                if let Some(resp) = result.tenant_responses.get(tenant) {
                    warn!("Tenant {} failed on {} ({}): {}", tenant, self.device_key, resp.code, resp.message);
                }
            }
        }

        config.declaration_result = result;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use as3_client::{MockDeviceClient, MockResponse};
    use std::collections::BTreeSet;

    fn spawn_worker(
        client: MockDeviceClient,
        priorities: Arc<PriorityStore>,
    ) -> (PostManagerHandle, mpsc::Receiver<AgentConfig>) {
        let (resp_tx, resp_rx) = mpsc::channel(8);
        let (handle, _join) = PostManager::spawn(
            device(),
            Arc::new(client),
            priorities,
            resp_tx,
            4,
            "lb-controller-test".to_string(),
            Arc::new(Metrics::new().unwrap()),
        );
        (handle, resp_rx)
    }

    #[tokio::test]
    async fn test_success_posts_all_tenants() {
        let client = MockDeviceClient::new("https://d1");
        let (handle, mut resp_rx) = spawn_worker(client.clone(), Arc::new(PriorityStore::new()));

        handle.enqueue(agent_config(1, &["a", "b"])).await.unwrap();
        let outcome = resp_rx.recv().await.unwrap();

        assert_eq!(outcome.id, 1);
        assert!(!outcome.has_failures());
        let posts = client.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].tenants, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_partial_failure_reported() {
        let client = MockDeviceClient::new("https://d1");
        client.fail_next(["b"]);
        let (handle, mut resp_rx) = spawn_worker(client, Arc::new(PriorityStore::new()));

        handle.enqueue(agent_config(1, &["a", "b"])).await.unwrap();
        let outcome = resp_rx.recv().await.unwrap();

        assert_eq!(outcome.declaration_result.failed_tenants, BTreeSet::from(["b".to_string()]));
        assert_eq!(outcome.declaration_result.tenant_responses["a"].code, 200);
    }

    #[tokio::test]
    async fn test_transport_error_fails_every_tenant() {
        let client = MockDeviceClient::new("https://d1");
        client.push_response(MockResponse::TransportError("connection refused".to_string()));
        let (handle, mut resp_rx) = spawn_worker(client, Arc::new(PriorityStore::new()));

        handle.enqueue(agent_config(3, &["a", "b"])).await.unwrap();
        let outcome = resp_rx.recv().await.unwrap();

        assert_eq!(outcome.id, 3);
        assert_eq!(outcome.declaration_result.failed_tenants.len(), 2);
    }

    #[tokio::test]
    async fn test_retry_posts_only_failed_tenants() {
        let client = MockDeviceClient::new("https://d1");
        let (handle, mut resp_rx) = spawn_worker(client.clone(), Arc::new(PriorityStore::new()));

        let mut retry = agent_config(1, &["a", "b", "c"]);
        retry.declaration_result.failed_tenants.insert("b".to_string());
        handle.enqueue(retry).await.unwrap();
        let outcome = resp_rx.recv().await.unwrap();

        assert!(!outcome.has_failures());
        let posts = client.posts();
        assert_eq!(posts[0].tenants, vec!["b"]);
        assert_eq!(posts[0].declaration.tenant_names(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_elevated_partitions_posted_first() {
        let client = MockDeviceClient::new("https://d1");
        let priorities = Arc::new(PriorityStore::new());
        priorities.set("z", 3);
        let (handle, mut resp_rx) = spawn_worker(client.clone(), priorities);

        handle.enqueue(agent_config(1, &["a", "m", "z"])).await.unwrap();
        resp_rx.recv().await.unwrap();

        assert_eq!(client.posts()[0].tenants, vec!["z", "a", "m"]);
    }

    #[tokio::test]
    async fn test_posts_are_serialized_in_queue_order() {
        let client = MockDeviceClient::new("https://d1");
        let (handle, mut resp_rx) = spawn_worker(client.clone(), Arc::new(PriorityStore::new()));

        for id in 1..=3 {
            handle.enqueue(agent_config(id, &["a"])).await.unwrap();
        }
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(resp_rx.recv().await.unwrap().id);
        }

        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(client.posts().len(), 3);
    }

    #[tokio::test]
    async fn test_enqueue_after_worker_stops() {
        let (post_tx, post_rx) = mpsc::channel(1);
        drop(post_rx);
        let handle = PostManagerHandle::new(device(), post_tx);

        let err = handle.enqueue(agent_config(1, &["a"])).await.unwrap_err();
        assert!(matches!(err, ControllerError::WorkerStopped(_)));
    }
}
