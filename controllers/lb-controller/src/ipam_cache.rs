//! IPAM host spec cache and the one-shot cleanup after a restart.
//!
//! While building snapshots the controller records every host spec it
//! requests. On the first successful post for a kind that owns IPAM entries,
//! host specs in the IPAM resource that nothing requested since the restart
//! are removed. The cleanup runs at most once per process.

use crate::error::ControllerError;
use crate::types::ResourceKind;
use async_trait::async_trait;
use crds::{HostSpec, IPAM};
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, error, info};

/// Access to the authoritative IPAM resource
#[async_trait]
pub trait IpamClientTrait: Send + Sync {
    /// Current host specs of the IPAM resource
    async fn host_specs(&self) -> Result<Vec<HostSpec>, ControllerError>;

    /// Remove the host spec at `index`; `key` identifies the entry in logs
    /// and guards against a concurrent reorder.
    async fn remove_host_spec(&self, key: &str, index: usize) -> Result<(), ControllerError>;
}

/// IPAM client backed by the `IPAM` custom resource
pub struct KubeIpamClient {
    api: Api<IPAM>,
    name: String,
}

impl KubeIpamClient {
    pub fn new(client: Client, namespace: &str, name: impl Into<String>) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            name: name.into(),
        }
    }
}

#[async_trait]
impl IpamClientTrait for KubeIpamClient {
    async fn host_specs(&self) -> Result<Vec<HostSpec>, ControllerError> {
        match self.api.get_opt(&self.name).await? {
            Some(ipam) => Ok(ipam.spec.host_specs),
            None => {
                debug!("IPAM resource {} not found", self.name);
                Ok(Vec::new())
            }
        }
    }

    async fn remove_host_spec(&self, key: &str, index: usize) -> Result<(), ControllerError> {
        let ipam = self
            .api
            .get_opt(&self.name)
            .await?
            .ok_or_else(|| ControllerError::Ipam(format!("IPAM resource {} not found", self.name)))?;

        let mut host_specs = ipam.spec.host_specs;
        if host_specs.get(index).map(|s| s.key.as_str()) != Some(key) {
            return Err(ControllerError::Ipam(format!(
                "host spec {} is no longer at index {}",
                key, index
            )));
        }
        host_specs.remove(index);

        let patch = serde_json::json!({ "spec": { "hostSpecs": host_specs } });
        self.api
            .patch(&self.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        info!("Removed IPAM host spec {} from {}", key, self.name);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct CacheState {
    host_specs: Vec<HostSpec>,
    done: bool,
}

/// Host specs requested since start, consumed by the one-shot cleanup
#[derive(Debug, Default)]
pub struct IpamCache {
    state: Mutex<CacheState>,
}

impl IpamCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a host spec requested by the current snapshot.
    ///
    /// No-op once the cleanup has run.
    pub fn cache_host_spec(&self, spec: HostSpec) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.done && !state.host_specs.contains(&spec) {
            state.host_specs.push(spec);
        }
    }

    /// Whether the cleanup pass has been consumed
    pub fn is_done(&self) -> bool {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).done
    }

    /// Claim the cleanup pass and take the cached snapshot.
    fn claim(&self) -> Option<Vec<HostSpec>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.done {
            return None;
        }
        state.done = true;
        Some(std::mem::take(&mut state.host_specs))
    }

    /// Remove IPAM host specs nothing requested since start.
    ///
    /// Runs once per process, on the first call for a kind that owns IPAM
    /// entries while an IPAM client is configured. Removal errors are
    /// logged and not retried.
    pub async fn remove_unused_entries(&self, kind: ResourceKind, client: Option<&dyn IpamClientTrait>) {
        let Some(client) = client else {
            return;
        };
        if !kind.owns_ipam_entries() {
            return;
        }
        let Some(mut cached) = self.claim() else {
            return;
        };

        let authoritative = match client.host_specs().await {
            Ok(specs) => specs,
            Err(e) => {
                error!("[IPAM] Failed to read IPAM host specs, skipping cleanup: {}", e);
                return;
            }
        };

        let mut unused = Vec::new();
        for spec in authoritative {
            match cached.iter().position(|c| spec.matches(c)) {
                Some(i) => {
                    cached.remove(i);
                }
                None => unused.push(spec),
            }
        }
        if unused.is_empty() {
            debug!("[IPAM] No unused host specs found");
            return;
        }

        for spec in unused {
            // Earlier removals shift indices, so look the entry up again.
            let current = match client.host_specs().await {
                Ok(specs) => specs,
                Err(e) => {
                    error!("[IPAM] Failed to re-read IPAM host specs: {}", e);
                    continue;
                }
            };
            let Some(index) = current.iter().position(|s| s.matches(&spec)) else {
                continue;
            };
            info!(
                "[IPAM] Removing unused host spec host={} key={} label={}",
                spec.host, spec.key, spec.ipam_label
            );
            if let Err(e) = client.remove_host_spec(&spec.key, index).await {
                error!("[IPAM] ipam hostspec update error: {}", e);
            }
        }
    }
}
