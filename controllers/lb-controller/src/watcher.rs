//! Kubernetes resource watchers.
//!
//! Keeps the current `VirtualServer` and `TransportServer` objects in memory
//! and pushes a fresh device snapshot through the request handler whenever
//! they change.

use crate::error::ControllerError;
use crate::ipam_cache::IpamCache;
use crate::request_handler::RequestHandler;
use crate::snapshot::build_snapshot;
use crate::status::HasLoadBalancerStatus;
use crate::types::DeviceKey;
use crds::{TransportServer, VirtualServer};
use futures::StreamExt;
use kube::{Api, Resource, ResourceExt};
use kube_runtime::{watcher, WatchStreamExt};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
struct WatchState {
    virtual_servers: BTreeMap<String, VirtualServer>,
    transport_servers: BTreeMap<String, TransportServer>,
    /// Partitions with resources in the last snapshot sent
    known_partitions: BTreeSet<String>,
    vs_synced: bool,
    ts_synced: bool,
}

fn store_key<K: Resource>(resource: &K) -> String {
    format!("{}/{}", resource.namespace().unwrap_or_default(), resource.name_any())
}

/// Whether an update leaves the snapshot unchanged (status-only writes,
/// including the controller's own).
fn same_desired_state<K: Resource + HasLoadBalancerStatus>(old: Option<&K>, new: &K) -> bool {
    old.is_some_and(|old| {
        old.meta().generation == new.meta().generation
            && old.lb_status().and_then(|s| s.vs_address.as_ref())
                == new.lb_status().and_then(|s| s.vs_address.as_ref())
    })
}

impl WatchState {
    /// Both kinds listed; a re-list of either kind clears this until its
    /// `InitDone`, so a half-listed state is never posted.
    fn ready(&self) -> bool {
        self.vs_synced && self.ts_synced
    }

    /// Apply a VirtualServer event. Returns whether the snapshot may have
    /// changed.
    fn on_virtual_server(&mut self, event: watcher::Event<VirtualServer>) -> bool {
        match event {
            watcher::Event::Apply(vs) => {
                let key = store_key(&vs);
                debug!("VirtualServer applied: {}", key);
                let unchanged = same_desired_state(self.virtual_servers.get(&key), &vs);
                self.virtual_servers.insert(key, vs);
                !unchanged
            }
            watcher::Event::Delete(vs) => {
                let key = store_key(&vs);
                info!("VirtualServer deleted: {}", key);
                self.virtual_servers.remove(&key);
                true
            }
            watcher::Event::Init => {
                debug!("VirtualServer watcher (re)listing");
                self.vs_synced = false;
                self.virtual_servers.clear();
                false
            }
            watcher::Event::InitApply(vs) => {
                self.virtual_servers.insert(store_key(&vs), vs);
                false
            }
            watcher::Event::InitDone => {
                info!("VirtualServer watcher initialization complete");
                self.vs_synced = true;
                true
            }
        }
    }

    /// Apply a TransportServer event. Returns whether the snapshot may have
    /// changed.
    fn on_transport_server(&mut self, event: watcher::Event<TransportServer>) -> bool {
        match event {
            watcher::Event::Apply(ts) => {
                let key = store_key(&ts);
                debug!("TransportServer applied: {}", key);
                let unchanged = same_desired_state(self.transport_servers.get(&key), &ts);
                self.transport_servers.insert(key, ts);
                !unchanged
            }
            watcher::Event::Delete(ts) => {
                let key = store_key(&ts);
                info!("TransportServer deleted: {}", key);
                self.transport_servers.remove(&key);
                true
            }
            watcher::Event::Init => {
                debug!("TransportServer watcher (re)listing");
                self.ts_synced = false;
                self.transport_servers.clear();
                false
            }
            watcher::Event::InitApply(ts) => {
                self.transport_servers.insert(store_key(&ts), ts);
                false
            }
            watcher::Event::InitDone => {
                info!("TransportServer watcher initialization complete");
                self.ts_synced = true;
                true
            }
        }
    }
}

/// Watches load-balancer resources for one device.
pub struct Watcher {
    device_key: DeviceKey,
    request_handler: Arc<RequestHandler>,
    ipam_cache: Arc<IpamCache>,
    vs_api: Api<VirtualServer>,
    ts_api: Api<TransportServer>,
    // Held across `process` so generations are queued in order.
    state: Mutex<WatchState>,
}

impl Watcher {
    pub fn new(
        device_key: DeviceKey,
        request_handler: Arc<RequestHandler>,
        ipam_cache: Arc<IpamCache>,
        vs_api: Api<VirtualServer>,
        ts_api: Api<TransportServer>,
    ) -> Self {
        Self {
            device_key,
            request_handler,
            ipam_cache,
            vs_api,
            ts_api,
            state: Mutex::new(WatchState::default()),
        }
    }

    /// Build and submit a snapshot from `state`.
    ///
    /// Nothing is sent until both watchers have listed their resources, so
    /// a restart or re-list never posts a half-empty device.
    async fn resync(&self, state: &mut WatchState) {
        if !state.ready() {
            return;
        }
        let snapshot = build_snapshot(
            &self.device_key,
            state.virtual_servers.values(),
            state.transport_servers.values(),
            &state.known_partitions,
        );
        for spec in &snapshot.host_specs {
            self.ipam_cache.cache_host_spec(spec.clone());
        }
        let active = snapshot.active_partitions();
        match self.request_handler.process(snapshot.request).await {
            Ok(meta) => {
                debug!("Snapshot generation {} submitted for {}", meta.id, self.device_key);
                state.known_partitions = active;
            }
            Err(e) => error!("Failed to submit snapshot for {}: {}", self.device_key, e),
        }
    }

    /// Starts watching VirtualServer resources.
    pub async fn watch_virtual_servers(&self) -> Result<(), ControllerError> {
        info!("Starting VirtualServer watcher");

        let mut stream = Box::pin(
            watcher(self.vs_api.clone(), watcher::Config::default()).default_backoff(),
        );

        while let Some(event) = stream.next().await {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    warn!("VirtualServer watch error, retrying: {}", e);
                    continue;
                }
            };
            let mut state = self.state.lock().await;
            if state.on_virtual_server(event) {
                self.resync(&mut state).await;
            }
        }

        Err(ControllerError::Watch("VirtualServer stream ended".to_string()))
    }

    /// Starts watching TransportServer resources.
    pub async fn watch_transport_servers(&self) -> Result<(), ControllerError> {
        info!("Starting TransportServer watcher");

        let mut stream = Box::pin(
            watcher(self.ts_api.clone(), watcher::Config::default()).default_backoff(),
        );

        while let Some(event) = stream.next().await {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    warn!("TransportServer watch error, retrying: {}", e);
                    continue;
                }
            };
            let mut state = self.state.lock().await;
            if state.on_transport_server(event) {
                self.resync(&mut state).await;
            }
        }

        Err(ControllerError::Watch("TransportServer stream ended".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::build_snapshot;
    use crate::test_utils::{device, transport_server, virtual_server};
    use crds::LoadBalancerStatus;

    /// Both kinds listed: one VirtualServer in `ns-a`, one TransportServer in `ns-b`
    fn synced_state() -> WatchState {
        let mut state = WatchState::default();
        state.on_virtual_server(watcher::Event::Init);
        state.on_virtual_server(watcher::Event::InitApply(virtual_server("ns-a", "web")));
        state.on_virtual_server(watcher::Event::InitDone);
        state.on_transport_server(watcher::Event::Init);
        state.on_transport_server(watcher::Event::InitApply(transport_server(
            "ns-b",
            "tcp",
            Some("10.1.1.30"),
        )));
        assert!(state.on_transport_server(watcher::Event::InitDone));
        state.known_partitions = BTreeSet::from(["ns-a".to_string(), "ns-b".to_string()]);
        state
    }

    #[test]
    fn test_ready_after_both_initial_lists() {
        let mut state = WatchState::default();
        state.on_virtual_server(watcher::Event::Init);
        assert!(state.on_virtual_server(watcher::Event::InitDone));
        assert!(!state.ready());

        state.on_transport_server(watcher::Event::Init);
        state.on_transport_server(watcher::Event::InitDone);
        assert!(state.ready());
    }

    #[test]
    fn test_relist_holds_snapshots_until_done() {
        let mut state = synced_state();
        assert!(state.ready());

        assert!(!state.on_virtual_server(watcher::Event::Init));
        assert!(!state.ready());

        // An update of the other kind mid re-list must not be posted.
        assert!(state.on_transport_server(watcher::Event::Apply(transport_server(
            "ns-b",
            "udp",
            Some("10.1.1.31"),
        ))));
        assert!(!state.ready());

        state.on_virtual_server(watcher::Event::InitApply(virtual_server("ns-a", "web")));
        assert!(state.on_virtual_server(watcher::Event::InitDone));
        assert!(state.ready());

        let snapshot = build_snapshot(
            &device(),
            state.virtual_servers.values(),
            state.transport_servers.values(),
            &state.known_partitions,
        );
        assert_eq!(snapshot.request.partitions["ns-a"].resources.len(), 1);
        assert_eq!(snapshot.request.partitions["ns-b"].resources.len(), 2);
    }

    #[test]
    fn test_relist_drops_resources_gone_meanwhile() {
        let mut state = synced_state();

        state.on_transport_server(watcher::Event::Init);
        assert!(state.on_transport_server(watcher::Event::InitDone));

        assert!(state.ready());
        assert!(state.transport_servers.is_empty());
        assert_eq!(state.virtual_servers.len(), 1);
    }

    #[test]
    fn test_status_only_update_skipped() {
        let mut state = synced_state();
        let mut ts = transport_server("ns-b", "tcp", Some("10.1.1.30"));
        ts.status = Some(LoadBalancerStatus {
            status: Some("Ok".to_string()),
            ..Default::default()
        });

        assert!(!state.on_transport_server(watcher::Event::Apply(ts.clone())));

        ts.status = Some(LoadBalancerStatus {
            vs_address: Some("10.1.1.99".to_string()),
            ..Default::default()
        });
        assert!(state.on_transport_server(watcher::Event::Apply(ts)));
    }

    #[test]
    fn test_delete_triggers_resync() {
        let mut state = synced_state();
        let ts = transport_server("ns-b", "tcp", Some("10.1.1.30"));

        assert!(state.on_transport_server(watcher::Event::Delete(ts)));
        assert!(state.transport_servers.is_empty());
    }
}
