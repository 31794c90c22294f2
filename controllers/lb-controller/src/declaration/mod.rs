//! Declaration builder.
//!
//! Turns a device snapshot into one AS3 tenant per partition. Pure: no I/O,
//! and the same snapshot always yields the same tenants.

pub mod tls;

pub use tls::{create_ca_bundle, create_tls_client, create_tls_server, sorted_custom_profile_keys};

use crate::types::{PartitionConfig, ProfileContext, ResourceConfig, ResourceConfigRequest, ServiceMode};
use as3_client::{
    As3Object, As3Pool, As3PoolMember, As3Service, As3Tenant, SharedApp, SERVICE_HTTP, SERVICE_TCP,
    SERVICE_UDP,
};
use std::collections::BTreeMap;
use tracing::debug;

/// Build the tenants of every partition in the snapshot.
///
/// A partition without resources yields an empty tenant, which removes
/// the partition's objects from the device.
pub fn build_declaration(request: &ResourceConfigRequest) -> BTreeMap<String, As3Tenant> {
    request
        .partitions
        .iter()
        .map(|(partition, config)| (partition.clone(), build_tenant(partition, config)))
        .collect()
}

pub fn build_tenant(partition: &str, config: &PartitionConfig) -> As3Tenant {
    let mut tenant = As3Tenant::new();
    let shared_app = &mut tenant.shared_mut().objects;

    for resource in config.resources.values() {
        add_resource(resource, shared_app);
    }

    for key in sorted_custom_profile_keys(&config.custom_profiles) {
        let Some(profile) = config.custom_profiles.get(&key) else {
            continue;
        };
        let svc_name = as3_name(&key.resource_name);
        match profile.context {
            ProfileContext::Serverside => {
                let Some(bundle) = create_ca_bundle(profile, shared_app) else {
                    continue;
                };
                if create_tls_client(profile, &svc_name, &bundle, shared_app).is_none() {
                    debug!(
                        "Profile {} in {} does not yield a TLS client for {}",
                        profile.name, partition, svc_name
                    );
                }
            }
            ProfileContext::Clientside => {
                if create_tls_server(profile, &svc_name, shared_app).is_none() {
                    debug!(
                        "Profile {} in {} does not yield a TLS server for {}",
                        profile.name, partition, svc_name
                    );
                }
            }
        }
    }

    tenant
}

fn add_resource(resource: &ResourceConfig, shared_app: &mut SharedApp) {
    let name = as3_name(&resource.name);
    let class = match resource.mode {
        ServiceMode::Http => SERVICE_HTTP,
        ServiceMode::Tcp => SERVICE_TCP,
        ServiceMode::Udp => SERVICE_UDP,
    };

    let mut service = As3Service {
        class: class.to_string(),
        virtual_addresses: resource.virtual_address.iter().cloned().collect(),
        virtual_port: resource.virtual_port,
        snat: Some("auto".to_string()),
        ..Default::default()
    };

    if let Some(pool) = &resource.pool {
        let pool_name = format!("{}_pool", name);
        // One member entry per port, addresses in snapshot order.
        let mut by_port: BTreeMap<u16, Vec<String>> = BTreeMap::new();
        for member in &pool.members {
            by_port.entry(member.port).or_default().push(member.address.clone());
        }
        let members = by_port
            .into_iter()
            .map(|(service_port, server_addresses)| As3PoolMember {
                service_port,
                server_addresses,
                share_nodes: true,
            })
            .collect();
        shared_app.insert(
            pool_name.clone(),
            As3Object::Pool(As3Pool {
                class: "Pool".to_string(),
                members,
            }),
        );
        service.pool = Some(pool_name);
    }

    shared_app.insert(name, As3Object::Service(service));
}

/// Make a name valid as an AS3 object name.
///
/// Characters other than ASCII letters, digits and `_` become `_`; a name
/// starting with a digit gets a `_` prefix.
pub fn as3_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}
