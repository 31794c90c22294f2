//! Test utilities for unit testing the reconciliation engine
//!
//! Builders for snapshots and outcomes, plus in-memory status and IPAM
//! collaborators that record what the engine did.

#[cfg(test)]
use crate::error::ControllerError;
#[cfg(test)]
use crate::ipam_cache::IpamClientTrait;
#[cfg(test)]
use crate::status::StatusHandler;
#[cfg(test)]
use crate::types::*;
#[cfg(test)]
use as3_client::{As3Service, As3Tenant, SERVICE_HTTP};
#[cfg(test)]
use async_trait::async_trait;
#[cfg(test)]
use crds::{
    HostSpec, LoadBalancerStatus, ServerTls, TransportMode, TransportPool, TransportServer,
    TransportServerSpec, VirtualServer, VirtualServerPool, VirtualServerSpec,
};
#[cfg(test)]
use std::collections::BTreeMap;
#[cfg(test)]
use std::sync::Mutex;

/// Device used by most tests
#[cfg(test)]
pub fn device() -> DeviceKey {
    DeviceKey::new("https://d1")
}

/// Add a TCP resource `resource_name` built from cluster resource `key`
#[cfg(test)]
pub fn add_resource(
    request: &mut ResourceConfigRequest,
    partition: &str,
    resource_name: &str,
    key: &str,
    kind: ResourceKind,
) {
    let mut meta = ResourceMeta::default();
    meta.base_resources.insert(key.to_string(), kind);
    request
        .partitions
        .entry(partition.to_string())
        .or_default()
        .resources
        .insert(
            resource_name.to_string(),
            ResourceConfig {
                name: resource_name.to_string(),
                mode: ServiceMode::Tcp,
                virtual_address: Some("10.1.1.10".to_string()),
                virtual_port: 443,
                pool: None,
                meta,
            },
        );
}

/// Add a partition without resources (a partition being emptied)
#[cfg(test)]
pub fn add_empty_partition(request: &mut ResourceConfigRequest, partition: &str) {
    request.partitions.entry(partition.to_string()).or_default();
}

/// Post request for generation `id` with one empty tenant per name
#[cfg(test)]
pub fn agent_config(id: u64, tenants: &[&str]) -> AgentConfig {
    let req_meta = RequestMeta {
        id,
        partition_map: tenants.iter().map(|t| (t.to_string(), BTreeMap::new())).collect(),
    };
    let tenants = tenants
        .iter()
        .map(|t| (t.to_string(), As3Tenant::new()))
        .collect();
    AgentConfig::new(device(), req_meta, tenants)
}

/// Plain HTTP service object
#[cfg(test)]
pub fn http_service() -> As3Service {
    As3Service {
        class: SERVICE_HTTP.to_string(),
        virtual_addresses: vec!["10.1.1.10".to_string()],
        virtual_port: 80,
        ..Default::default()
    }
}

/// Profile with a single CA certificate and no key
#[cfg(test)]
pub fn custom_profile(name: &str, context: ProfileContext) -> CustomProfile {
    CustomProfile {
        name: name.to_string(),
        partition: "ns-a".to_string(),
        context,
        certificates: vec![Certificate {
            cert: "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----".to_string(),
            key: String::new(),
        }],
        ciphers: String::new(),
        cipher_group: String::new(),
        tls1_3_enabled: false,
    }
}

#[cfg(test)]
pub fn host_spec(host: &str, key: &str, label: &str) -> HostSpec {
    HostSpec {
        host: host.to_string(),
        key: key.to_string(),
        ipam_label: label.to_string(),
    }
}

/// Status handler recording `(namespace, name, state)` per update
#[cfg(test)]
#[derive(Default)]
pub struct RecordingStatusHandler {
    updates: Mutex<Vec<(String, String, String)>>,
}

#[cfg(test)]
impl RecordingStatusHandler {
    pub fn updates(&self) -> Vec<(String, String, String)> {
        self.updates.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl StatusHandler for RecordingStatusHandler {
    async fn update_status(
        &self,
        namespace: &str,
        name: &str,
        state: &str,
        _message: Option<&str>,
    ) -> Result<(), ControllerError> {
        self.updates
            .lock()
            .unwrap()
            .push((namespace.to_string(), name.to_string(), state.to_string()));
        Ok(())
    }
}

/// IPAM client over an in-memory host spec list
#[cfg(test)]
#[derive(Default)]
pub struct InMemoryIpamClient {
    specs: Mutex<Vec<HostSpec>>,
    removals: Mutex<usize>,
}

#[cfg(test)]
impl InMemoryIpamClient {
    pub fn new(specs: Vec<HostSpec>) -> Self {
        Self {
            specs: Mutex::new(specs),
            removals: Mutex::new(0),
        }
    }

    pub fn specs(&self) -> Vec<HostSpec> {
        self.specs.lock().unwrap().clone()
    }

    pub fn push(&self, spec: HostSpec) {
        self.specs.lock().unwrap().push(spec);
    }

    pub fn removals(&self) -> usize {
        *self.removals.lock().unwrap()
    }
}

#[cfg(test)]
#[async_trait]
impl IpamClientTrait for InMemoryIpamClient {
    async fn host_specs(&self) -> Result<Vec<HostSpec>, ControllerError> {
        Ok(self.specs())
    }

    async fn remove_host_spec(&self, key: &str, index: usize) -> Result<(), ControllerError> {
        let mut specs = self.specs.lock().unwrap();
        if specs.get(index).map(|s| s.key.as_str()) != Some(key) {
            return Err(ControllerError::Ipam(format!("{} not at index {}", key, index)));
        }
        specs.remove(index);
        *self.removals.lock().unwrap() += 1;
        Ok(())
    }
}

/// TCP TransportServer with two members, one of them malformed
#[cfg(test)]
pub fn transport_server(namespace: &str, name: &str, address: Option<&str>) -> TransportServer {
    let mut ts = TransportServer::new(
        name,
        TransportServerSpec {
            virtual_server_address: address.map(str::to_string),
            virtual_server_port: 443,
            mode: TransportMode::Tcp,
            pool: TransportPool {
                service: "web".to_string(),
                service_port: 8443,
                service_namespace: None,
                members: vec!["10.244.0.5:8443".to_string(), "bogus".to_string()],
            },
            ipam_label: Some("prod".to_string()),
        },
    );
    ts.metadata.namespace = Some(namespace.to_string());
    ts
}

/// VirtualServer addressed through its status, with server-side TLS
#[cfg(test)]
pub fn virtual_server(namespace: &str, name: &str) -> VirtualServer {
    let mut vs = VirtualServer::new(
        name,
        VirtualServerSpec {
            host: Some("web.example.com".to_string()),
            virtual_server_address: None,
            virtual_server_http_port: 80,
            pools: vec![VirtualServerPool {
                path: "/".to_string(),
                service: "web".to_string(),
                service_port: 8080,
                members: vec!["[fd00::5]:8080".to_string()],
            }],
            server_tls: Some(ServerTls {
                profile_name: "backend".to_string(),
                ca_certificate: "-----BEGIN CERTIFICATE-----".to_string(),
                ..Default::default()
            }),
            ipam_label: Some("prod".to_string()),
        },
    );
    vs.metadata.namespace = Some(namespace.to_string());
    vs.status = Some(LoadBalancerStatus {
        vs_address: Some("10.1.1.20".to_string()),
        ..Default::default()
    });
    vs
}
