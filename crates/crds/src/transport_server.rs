//! TransportServer CRD
//!
//! Layer 4 (TCP/UDP) virtual server backed by a single Kubernetes service.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use crate::status::LoadBalancerStatus;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "cis.f5.com",
    version = "v1",
    kind = "TransportServer",
    namespaced,
    status = "LoadBalancerStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct TransportServerSpec {
    /// Virtual address on the device (omit when allocated through IPAM)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_server_address: Option<String>,

    /// Virtual port on the device
    pub virtual_server_port: u16,

    /// Layer 4 protocol
    #[serde(default)]
    pub mode: TransportMode,

    /// Backend pool
    pub pool: TransportPool,

    /// IPAM label used to request an address when no address is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipam_label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    #[default]
    Tcp,
    Udp,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransportPool {
    /// Backend service name
    pub service: String,

    /// Backend service port
    pub service_port: u16,

    /// Namespace of the service (defaults to the resource namespace)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_namespace: Option<String>,

    /// Static pool members ("address:port")
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
}
