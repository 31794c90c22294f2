//! VirtualServer CRD
//!
//! HTTP virtual server, optionally re-encrypting towards the backend.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use crate::status::LoadBalancerStatus;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "cis.f5.com",
    version = "v1",
    kind = "VirtualServer",
    namespaced,
    status = "LoadBalancerStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServerSpec {
    /// Host name served by this virtual server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Virtual address on the device (omit when allocated through IPAM)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_server_address: Option<String>,

    /// Virtual HTTP port
    #[serde(default = "default_http_port")]
    pub virtual_server_http_port: u16,

    /// Backend pools
    #[serde(default)]
    pub pools: Vec<VirtualServerPool>,

    /// Backend TLS settings (re-encryption towards the pool)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_tls: Option<ServerTls>,

    /// IPAM label used to request an address when no address is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipam_label: Option<String>,
}

fn default_http_port() -> u16 {
    80
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServerPool {
    /// URL path routed to this pool
    #[serde(default)]
    pub path: String,

    /// Backend service name
    pub service: String,

    /// Backend service port
    pub service_port: u16,

    /// Static pool members ("address:port")
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
}

/// TLS settings used to validate the backend
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerTls {
    /// Name of the profile on the device
    pub profile_name: String,

    /// PEM bundle of the certificate authorities trusted for the backend
    pub ca_certificate: String,

    /// Explicit cipher string
    #[serde(default)]
    pub ciphers: String,

    /// Cipher group on the device (takes precedence over `ciphers`)
    #[serde(default)]
    pub cipher_group: String,
}
