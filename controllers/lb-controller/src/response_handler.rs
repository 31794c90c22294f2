//! Response reconciliation.
//!
//! Single consumer of post outcomes from every device worker. Each outcome
//! is compared with the latest recorded generation of its device:
//!
//! - failed and still current: report the partitions that did succeed,
//!   elevate emptied partitions and retry the failed tenants after a fixed
//!   delay, unless a newer generation was recorded in the meantime;
//! - successful and current or older: run post-success hooks, reset
//!   priorities, clean up IPAM and report resource status;
//! - anything else is stale and dropped.

use crate::ipam_cache::{IpamCache, IpamClientTrait};
use crate::metrics::Metrics;
use crate::post_manager::PostManagers;
use crate::priority::PriorityStore;
use crate::request_tracker::RequestTracker;
use crate::status::{StatusRegistry, STATUS_OK};
use crate::types::{AgentConfig, DeviceKey};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Default delay before failed tenants are posted again
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Device-global effect run once per successful outcome
#[async_trait]
pub trait PostSuccessHook: Send + Sync {
    async fn on_post_success(&self, device_key: &DeviceKey);
}

/// What the handler did with one outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseAction {
    RetryScheduled,
    Applied,
    Dropped,
}

pub struct ResponseHandler {
    tracker: Arc<RequestTracker>,
    post_managers: Arc<PostManagers>,
    priorities: Arc<PriorityStore>,
    status_registry: StatusRegistry,
    ipam_cache: Arc<IpamCache>,
    ipam_client: Option<Arc<dyn IpamClientTrait>>,
    hooks: Vec<Arc<dyn PostSuccessHook>>,
    retry_delay: Duration,
    metrics: Arc<Metrics>,
}

impl ResponseHandler {
    pub fn new(
        tracker: Arc<RequestTracker>,
        post_managers: Arc<PostManagers>,
        priorities: Arc<PriorityStore>,
        ipam_cache: Arc<IpamCache>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            tracker,
            post_managers,
            priorities,
            status_registry: StatusRegistry::new(),
            ipam_cache,
            ipam_client: None,
            hooks: Vec::new(),
            retry_delay: DEFAULT_RETRY_DELAY,
            metrics,
        }
    }

    pub fn with_status_registry(mut self, registry: StatusRegistry) -> Self {
        self.status_registry = registry;
        self
    }

    pub fn with_ipam_client(mut self, client: Arc<dyn IpamClientTrait>) -> Self {
        self.ipam_client = Some(client);
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn PostSuccessHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Consume outcomes until every worker has dropped its sender.
    pub async fn run(self, mut resp_rx: mpsc::Receiver<AgentConfig>) {
        info!("Response handler started");
        while let Some(config) = resp_rx.recv().await {
            self.handle_response(config).await;
        }
        info!("Response channel closed, response handler stopping");
    }

    pub async fn handle_response(&self, config: AgentConfig) -> ResponseAction {
        let latest = self.tracker.latest(&config.device_key);
        let failed = config.has_failures();

        if failed && latest.id == config.id {
            self.report_partitions(&config, false).await;
            return self.schedule_retry(config);
        }
        if !failed && latest.id >= config.id {
            for hook in &self.hooks {
                hook.on_post_success(&config.device_key).await;
            }
            self.report_partitions(&config, true).await;
            debug!("Applied generation {} for {}", config.id, config.device_key);
            return ResponseAction::Applied;
        }

        debug!(
            "Dropping stale outcome {} for {} (latest {})",
            config.id, config.device_key, latest.id
        );
        self.metrics.stale_responses_total.inc();
        ResponseAction::Dropped
    }

    fn schedule_retry(&self, config: AgentConfig) -> ResponseAction {
        let failed = &config.declaration_result.failed_tenants;
        for partition in failed {
            let emptied = config
                .req_meta
                .partition_map
                .get(partition)
                .is_some_and(|meta| meta.is_empty());
            if emptied {
                let priority = self.priorities.elevate(partition);
                debug!("Elevated partition {} to priority {}", partition, priority);
            }
        }

        let Some(handle) = self.post_managers.get(&config.device_key) else {
            error!(
                "No post worker for device {}, dropping retry of generation {}",
                config.device_key, config.id
            );
            return ResponseAction::Dropped;
        };

        warn!(
            "Retrying tenants {:?} of generation {} on {} in {:?}",
            failed, config.id, config.device_key, self.retry_delay
        );
        self.metrics.retries_total.inc();

        let delay = self.retry_delay;
        let tracker = self.tracker.clone();
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // A generation recorded during the wait supersedes this retry.
            let latest = tracker.latest(&config.device_key);
            if latest.id != config.id {
                debug!(
                    "Dropping retry of generation {} for {} (latest {})",
                    config.id, config.device_key, latest.id
                );
                metrics.stale_responses_total.inc();
                return;
            }
            if let Err(e) = handle.enqueue(config).await {
                error!("Failed to re-enqueue retry: {}", e);
            }
        });
        ResponseAction::RetryScheduled
    }

    /// Reset priorities and report "Ok" for the partitions of `config` that
    /// did not fail. IPAM cleanup only runs for fully successful outcomes.
    async fn report_partitions(&self, config: &AgentConfig, cleanup_ipam: bool) {
        let failed = &config.declaration_result.failed_tenants;
        for (partition, meta) in &config.req_meta.partition_map {
            let partition_failed = failed.contains(partition);
            if !partition_failed && meta.is_empty() {
                self.priorities.reset(partition);
                continue;
            }
            for (resource_key, kind) in meta {
                if cleanup_ipam {
                    self.ipam_cache
                        .remove_unused_entries(*kind, self.ipam_client.as_deref())
                        .await;
                }
                if partition_failed {
                    continue;
                }
                match self.status_registry.update(*kind, resource_key, STATUS_OK, None).await {
                    Ok(true) => self
                        .metrics
                        .status_updates_total
                        .with_label_values(&[kind.as_str()])
                        .inc(),
                    Ok(false) => {}
                    Err(e) => warn!("Failed to update status of {} {}: {}", kind, resource_key, e),
                }
            }
        }
    }
}
