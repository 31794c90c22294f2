//! IPAM CRD
//!
//! Address-management record shared with the IPAM controller. The
//! load-balancer controller writes host specs into `spec.hostSpecs`, the
//! IPAM controller answers with allocations in `status.ipStatus`.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "fic.f5.com",
    version = "v1",
    kind = "IPAM",
    namespaced,
    status = "IPAMStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct IPAMSpec {
    /// Address requests
    #[serde(default)]
    pub host_specs: Vec<HostSpec>,
}

/// One address request
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HostSpec {
    /// Host name the address is requested for
    #[serde(default)]
    pub host: String,

    /// Resource key the address is requested for (used when there is no host)
    #[serde(default)]
    pub key: String,

    /// IPAM label selecting the address range
    #[serde(default, rename = "ipamLabel")]
    pub ipam_label: String,
}

impl HostSpec {
    /// Whether two specs describe the same allocation.
    ///
    /// Same label and either the same host or the same key.
    pub fn matches(&self, other: &HostSpec) -> bool {
        self.ipam_label == other.ipam_label && (self.host == other.host || self.key == other.key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct IPAMStatus {
    /// Allocated addresses
    #[serde(default, rename = "IPStatus")]
    pub ip_status: Vec<IPSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct IPSpec {
    #[serde(default)]
    pub host: String,

    #[serde(default)]
    pub key: String,

    #[serde(default, rename = "ipamLabel")]
    pub ipam_label: String,

    /// Allocated address
    #[serde(default)]
    pub ip: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(label: &str, host: &str, key: &str) -> HostSpec {
        HostSpec {
            host: host.to_string(),
            key: key.to_string(),
            ipam_label: label.to_string(),
        }
    }

    #[test]
    fn test_host_spec_matches_on_label_and_host() {
        let a = spec("prod", "app.example.com", "ns/a");
        let b = spec("prod", "app.example.com", "ns/b");
        assert!(a.matches(&b));
    }

    #[test]
    fn test_host_spec_matches_on_label_and_key() {
        let a = spec("prod", "", "ns/ts");
        let b = spec("prod", "other.example.com", "ns/ts");
        assert!(a.matches(&b));
    }

    #[test]
    fn test_host_spec_label_mismatch() {
        let a = spec("prod", "app.example.com", "ns/a");
        let b = spec("test", "app.example.com", "ns/a");
        assert!(!a.matches(&b));
    }

    #[test]
    fn test_host_spec_wire_names() {
        let json = serde_json::to_value(spec("prod", "h", "k")).unwrap();
        assert_eq!(json["ipamLabel"], "prod");
        assert_eq!(json["host"], "h");
    }
}
