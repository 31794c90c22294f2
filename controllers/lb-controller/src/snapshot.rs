//! Desired-state snapshots from custom resources.
//!
//! Every `VirtualServer` and `TransportServer` becomes one virtual service
//! in the partition named after its namespace. Partitions that had
//! resources in the previous snapshot and have none now are emitted empty
//! once, so the device drops their objects.

use crate::declaration::as3_name;
use crate::types::{
    CustomProfile, Certificate, DeviceKey, PartitionConfig, PoolConfig, PoolMember, ProfileContext,
    ResourceConfig, ResourceConfigRequest, ResourceKind, ResourceMeta, SecretKey, ServiceMode,
};
use crds::{HostSpec, TransportMode, TransportServer, VirtualServer};
use kube::ResourceExt;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// A device snapshot plus the IPAM host specs it requests
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub request: ResourceConfigRequest,
    pub host_specs: Vec<HostSpec>,
}

impl Snapshot {
    /// Partitions that carry at least one resource
    pub fn active_partitions(&self) -> BTreeSet<String> {
        self.request
            .partitions
            .iter()
            .filter(|(_, config)| !config.resources.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Build the snapshot of `device_key` from the current resources.
pub fn build_snapshot<'a>(
    device_key: &DeviceKey,
    virtual_servers: impl IntoIterator<Item = &'a VirtualServer>,
    transport_servers: impl IntoIterator<Item = &'a TransportServer>,
    previous_partitions: &BTreeSet<String>,
) -> Snapshot {
    let mut snapshot = Snapshot {
        request: ResourceConfigRequest::new(device_key.clone()),
        host_specs: Vec::new(),
    };

    for vs in virtual_servers {
        add_virtual_server(&mut snapshot, vs);
    }
    for ts in transport_servers {
        add_transport_server(&mut snapshot, ts);
    }

    for partition in previous_partitions {
        let emptied = snapshot
            .request
            .partitions
            .get(partition)
            .is_none_or(|config| config.resources.is_empty());
        if emptied {
            debug!("Partition {} has no resources left", partition);
            snapshot.request.partitions.entry(partition.clone()).or_default();
        }
    }

    snapshot
}

fn resource_key(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

/// Parse an `address:port` pool member. IPv6 addresses may be bracketed.
fn parse_member(member: &str) -> Option<PoolMember> {
    let (address, port) = member.rsplit_once(':')?;
    let port = port.parse().ok()?;
    let address = address.trim_start_matches('[').trim_end_matches(']');
    if address.is_empty() {
        return None;
    }
    Some(PoolMember {
        address: address.to_string(),
        port,
    })
}

fn parse_members<'a>(key: &str, members: impl IntoIterator<Item = &'a String>) -> Vec<PoolMember> {
    members
        .into_iter()
        .filter_map(|m| {
            let parsed = parse_member(m);
            if parsed.is_none() {
                warn!("Ignoring invalid pool member {:?} of {}", m, key);
            }
            parsed
        })
        .collect()
}

fn request_host_spec(snapshot: &mut Snapshot, host: Option<&str>, key: &str, label: Option<&str>) {
    if let Some(label) = label.filter(|l| !l.is_empty()) {
        snapshot.host_specs.push(HostSpec {
            host: host.unwrap_or_default().to_string(),
            key: key.to_string(),
            ipam_label: label.to_string(),
        });
    }
}

fn partition_mut<'a>(snapshot: &'a mut Snapshot, partition: &str) -> &'a mut PartitionConfig {
    snapshot.request.partitions.entry(partition.to_string()).or_default()
}

fn add_virtual_server(snapshot: &mut Snapshot, vs: &VirtualServer) {
    let namespace = vs.namespace().unwrap_or_default();
    let key = resource_key(&namespace, &vs.name_any());
    let spec = &vs.spec;
    request_host_spec(snapshot, spec.host.as_deref(), &key, spec.ipam_label.as_deref());

    let Some(address) = spec
        .virtual_server_address
        .clone()
        .or_else(|| vs.status.as_ref().and_then(|s| s.vs_address.clone()))
    else {
        debug!("VirtualServer {} has no address yet, skipping", key);
        return;
    };

    let name = as3_name(&format!("vs_{}", vs.name_any()));
    let members = parse_members(&key, spec.pools.iter().flat_map(|p| p.members.iter()));
    let mut meta = ResourceMeta::default();
    meta.base_resources.insert(key, ResourceKind::VirtualServer);

    let partition = partition_mut(snapshot, &namespace);
    partition.resources.insert(
        name.clone(),
        ResourceConfig {
            name: name.clone(),
            mode: ServiceMode::Http,
            virtual_address: Some(address),
            virtual_port: spec.virtual_server_http_port,
            pool: (!spec.pools.is_empty()).then_some(PoolConfig { members }),
            meta,
        },
    );

    if let Some(tls) = &spec.server_tls {
        partition.custom_profiles.insert(
            SecretKey {
                name: tls.profile_name.clone(),
                resource_name: name,
            },
            CustomProfile {
                name: tls.profile_name.clone(),
                partition: namespace.clone(),
                context: ProfileContext::Serverside,
                certificates: vec![Certificate {
                    cert: tls.ca_certificate.clone(),
                    key: String::new(),
                }],
                ciphers: tls.ciphers.clone(),
                cipher_group: tls.cipher_group.clone(),
                tls1_3_enabled: !tls.cipher_group.is_empty(),
            },
        );
    }
}

fn add_transport_server(snapshot: &mut Snapshot, ts: &TransportServer) {
    let namespace = ts.namespace().unwrap_or_default();
    let key = resource_key(&namespace, &ts.name_any());
    let spec = &ts.spec;
    request_host_spec(snapshot, None, &key, spec.ipam_label.as_deref());

    let Some(address) = spec
        .virtual_server_address
        .clone()
        .or_else(|| ts.status.as_ref().and_then(|s| s.vs_address.clone()))
    else {
        debug!("TransportServer {} has no address yet, skipping", key);
        return;
    };

    let name = as3_name(&format!("ts_{}", ts.name_any()));
    let members = parse_members(&key, spec.pool.members.iter());
    let mut meta = ResourceMeta::default();
    meta.base_resources.insert(key, ResourceKind::TransportServer);

    partition_mut(snapshot, &namespace).resources.insert(
        name.clone(),
        ResourceConfig {
            name,
            mode: match spec.mode {
                TransportMode::Tcp => ServiceMode::Tcp,
                TransportMode::Udp => ServiceMode::Udp,
            },
            virtual_address: Some(address),
            virtual_port: spec.virtual_server_port,
            pool: Some(PoolConfig { members }),
            meta,
        },
    );
}
