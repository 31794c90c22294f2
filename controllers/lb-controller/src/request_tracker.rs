//! Request generation tracking.
//!
//! Holds the latest `RequestMeta` per device. This is the single source of
//! truth for "which generation is current": the response handler compares
//! every outcome against it.

use crate::types::{DeviceKey, PartitionMap, RequestMeta, ResourceConfigRequest};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Latest request generation per device.
#[derive(Debug, Default)]
pub struct RequestTracker {
    requests: Mutex<HashMap<DeviceKey, RequestMeta>>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<DeviceKey, RequestMeta>> {
        // Entries are replaced whole, so a poisoned map is still consistent.
        self.requests.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a new generation for `device_key` and return it.
    ///
    /// The id is one more than the previously recorded generation (1 for the
    /// first request). The partition map lists every resource key per
    /// partition; a partition with no resources maps to an empty map.
    pub fn record_new_request(
        &self,
        device_key: &DeviceKey,
        request: &ResourceConfigRequest,
    ) -> RequestMeta {
        let partition_map: PartitionMap = request
            .partitions
            .iter()
            .map(|(partition, config)| {
                let mut meta = BTreeMap::new();
                for resource in config.resources.values() {
                    for (key, kind) in &resource.meta.base_resources {
                        meta.insert(key.clone(), *kind);
                    }
                }
                (partition.clone(), meta)
            })
            .collect();

        let mut requests = self.lock();
        let id = requests.get(device_key).map_or(1, |prev| prev.id + 1);
        let meta = RequestMeta { id, partition_map };
        requests.insert(device_key.clone(), meta.clone());
        drop(requests);

        debug!("Recorded request generation {} for device {}", id, device_key);
        meta
    }

    /// Latest generation for `device_key`, or the zero generation if none.
    pub fn latest(&self, device_key: &DeviceKey) -> RequestMeta {
        self.lock().get(device_key).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use crate::types::ResourceKind;
    use std::sync::Arc;

    #[test]
    fn test_ids_are_sequential_per_device() {
        let tracker = RequestTracker::new();
        let d1 = DeviceKey::new("https://d1");
        let request = ResourceConfigRequest::new(d1.clone());

        let ids: Vec<u64> = (0..5)
            .map(|_| tracker.record_new_request(&d1, &request).id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(tracker.latest(&d1).id, 5);
    }

    #[test]
    fn test_devices_are_independent() {
        let tracker = RequestTracker::new();
        let d1 = DeviceKey::new("https://d1");
        let d2 = DeviceKey::new("https://d2");

        tracker.record_new_request(&d1, &ResourceConfigRequest::new(d1.clone()));
        tracker.record_new_request(&d1, &ResourceConfigRequest::new(d1.clone()));
        let meta = tracker.record_new_request(&d2, &ResourceConfigRequest::new(d2.clone()));

        assert_eq!(meta.id, 1);
        assert_eq!(tracker.latest(&d1).id, 2);
    }

    #[test]
    fn test_latest_without_requests_is_zero() {
        let tracker = RequestTracker::new();
        let latest = tracker.latest(&DeviceKey::new("https://unknown"));
        assert_eq!(latest, RequestMeta::default());
        assert_eq!(latest.id, 0);
    }

    #[test]
    fn test_partition_map_from_resource_meta() {
        let tracker = RequestTracker::new();
        let d1 = DeviceKey::new("https://d1");
        let mut request = ResourceConfigRequest::new(d1.clone());
        add_resource(&mut request, "a", "ts_web", "ns-a/web", ResourceKind::TransportServer);
        add_resource(&mut request, "a", "vs_api", "ns-a/api", ResourceKind::VirtualServer);
        add_empty_partition(&mut request, "gone");

        let meta = tracker.record_new_request(&d1, &request);

        assert_eq!(meta.partition_map["a"].len(), 2);
        assert_eq!(meta.partition_map["a"]["ns-a/web"], ResourceKind::TransportServer);
        assert!(meta.partition_map["gone"].is_empty());
    }

    #[test]
    fn test_concurrent_enqueues_never_reuse_ids() {
        let tracker = Arc::new(RequestTracker::new());
        let d1 = DeviceKey::new("https://d1");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                let d1 = d1.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .map(|_| tracker.record_new_request(&d1, &ResourceConfigRequest::new(d1.clone())).id)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=400).collect::<Vec<u64>>());
    }
}
