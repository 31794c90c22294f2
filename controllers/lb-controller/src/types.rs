//! Core data model shared by the reconciliation engine.
//!
//! A `ResourceConfigRequest` is the desired state of one device. Recording it
//! produces a `RequestMeta` generation; posting it produces `AgentConfig`
//! outcomes that the response handler matches against the latest generation.

use as3_client::{As3Tenant, PostResponse};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Identity of one device the controller posts to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceKey {
    /// Management URL of the device
    pub address: String,
    /// Optional label distinguishing devices behind the same address
    pub label: Option<String>,
}

impl DeviceKey {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            label: None,
        }
    }

    pub fn with_label(address: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            label: Some(label.into()),
        }
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{}@{}", label, self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

/// Kind of cluster resource a piece of configuration was derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    VirtualServer,
    TransportServer,
    IngressLink,
    Route,
    Service,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::VirtualServer => "VirtualServer",
            ResourceKind::TransportServer => "TransportServer",
            ResourceKind::IngressLink => "IngressLink",
            ResourceKind::Route => "Route",
            ResourceKind::Service => "Service",
        }
    }

    /// Kinds whose addresses can be allocated through IPAM
    pub fn owns_ipam_entries(&self) -> bool {
        matches!(self, ResourceKind::VirtualServer | ResourceKind::TransportServer)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Split a `namespace/name` resource key.
///
/// A key without a separator is treated as a name in the empty namespace.
pub fn split_resource_key(key: &str) -> (&str, &str) {
    key.split_once('/').unwrap_or(("", key))
}

/// Cluster resources that contributed to one resource config
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceMeta {
    /// `namespace/name` -> kind
    pub base_resources: BTreeMap<String, ResourceKind>,
}

/// Protocol handled by a virtual service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ServiceMode {
    #[default]
    Http,
    Tcp,
    Udp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolMember {
    pub address: String,
    pub port: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolConfig {
    pub members: Vec<PoolMember>,
}

/// Desired state of one virtual service on the device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceConfig {
    /// Object name inside the partition
    pub name: String,
    pub mode: ServiceMode,
    pub virtual_address: Option<String>,
    pub virtual_port: u16,
    pub pool: Option<PoolConfig>,
    pub meta: ResourceMeta,
}

/// Which side of the device a TLS profile applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileContext {
    /// Terminates client connections
    Clientside,
    /// Validates the backend
    Serverside,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Certificate {
    pub cert: String,
    pub key: String,
}

/// Identifies a custom profile: the secret it came from and the service it
/// attaches to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SecretKey {
    pub name: String,
    pub resource_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomProfile {
    pub name: String,
    pub partition: String,
    pub context: ProfileContext,
    pub certificates: Vec<Certificate>,
    pub ciphers: String,
    pub cipher_group: String,
    pub tls1_3_enabled: bool,
}

/// Desired state of one partition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionConfig {
    pub resources: BTreeMap<String, ResourceConfig>,
    pub custom_profiles: BTreeMap<SecretKey, CustomProfile>,
}

/// Desired-state snapshot for one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceConfigRequest {
    pub device_key: DeviceKey,
    pub partitions: BTreeMap<String, PartitionConfig>,
}

impl ResourceConfigRequest {
    pub fn new(device_key: DeviceKey) -> Self {
        Self {
            device_key,
            partitions: BTreeMap::new(),
        }
    }
}

/// partition -> (`namespace/name` -> kind)
pub type PartitionMap = BTreeMap<String, BTreeMap<String, ResourceKind>>;

/// One recorded generation of a device's desired state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    pub id: u64,
    pub partition_map: PartitionMap,
}

/// Device answer for one tenant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantResponse {
    pub code: u16,
    pub message: String,
}

/// Outcome of one post attempt, per tenant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclarationResult {
    pub failed_tenants: BTreeSet<String>,
    pub tenant_responses: BTreeMap<String, TenantResponse>,
}

impl DeclarationResult {
    /// Map a device response onto the posted tenants.
    ///
    /// A posted tenant missing from the response counts as failed.
    pub fn from_response(posted: &[String], response: PostResponse) -> Self {
        let mut result = Self::default();
        for r in response.results {
            if !r.is_success() {
                result.failed_tenants.insert(r.tenant.clone());
            }
            result.tenant_responses.insert(
                r.tenant,
                TenantResponse {
                    code: r.code,
                    message: r.message,
                },
            );
        }
        for tenant in posted {
            if !result.tenant_responses.contains_key(tenant) {
                result.failed_tenants.insert(tenant.clone());
            }
        }
        result
    }

    /// Every posted tenant failed without reaching the device.
    pub fn all_failed(posted: &[String], message: &str) -> Self {
        Self {
            failed_tenants: posted.iter().cloned().collect(),
            tenant_responses: posted
                .iter()
                .map(|t| {
                    (
                        t.clone(),
                        TenantResponse {
                            code: 0,
                            message: message.to_string(),
                        },
                    )
                })
                .collect(),
        }
    }
}

/// A post request and, once posted, its outcome
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub device_key: DeviceKey,
    /// Generation this config was built from
    pub id: u64,
    /// Full declaration of the generation, per tenant
    pub tenants: BTreeMap<String, As3Tenant>,
    pub declaration_result: DeclarationResult,
    pub req_meta: RequestMeta,
}

impl AgentConfig {
    pub fn new(device_key: DeviceKey, req_meta: RequestMeta, tenants: BTreeMap<String, As3Tenant>) -> Self {
        Self {
            device_key,
            id: req_meta.id,
            tenants,
            declaration_result: DeclarationResult::default(),
            req_meta,
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.declaration_result.failed_tenants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use as3_client::TenantResult;

    #[test]
    fn test_split_resource_key() {
        assert_eq!(split_resource_key("default/web"), ("default", "web"));
        assert_eq!(split_resource_key("web"), ("", "web"));
    }

    #[test]
    fn test_device_key_display() {
        assert_eq!(DeviceKey::new("https://10.1.1.4").to_string(), "https://10.1.1.4");
        assert_eq!(
            DeviceKey::with_label("https://10.1.1.4", "primary").to_string(),
            "primary@https://10.1.1.4"
        );
    }

    #[test]
    fn test_result_missing_tenant_counts_as_failed() {
        let posted = vec!["a".to_string(), "b".to_string()];
        let response = PostResponse {
            results: vec![TenantResult {
                tenant: "a".to_string(),
                code: 200,
                message: "success".to_string(),
            }],
        };
        let result = DeclarationResult::from_response(&posted, response);
        assert_eq!(result.failed_tenants, BTreeSet::from(["b".to_string()]));
    }

    #[test]
    fn test_all_failed() {
        let posted = vec!["a".to_string(), "b".to_string()];
        let result = DeclarationResult::all_failed(&posted, "connection refused");
        assert_eq!(result.failed_tenants.len(), 2);
        assert_eq!(result.tenant_responses["a"].message, "connection refused");
    }

    #[test]
    fn test_ipam_owning_kinds() {
        assert!(ResourceKind::VirtualServer.owns_ipam_entries());
        assert!(ResourceKind::TransportServer.owns_ipam_entries());
        assert!(!ResourceKind::Route.owns_ipam_entries());
    }
}
