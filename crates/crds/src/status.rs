//! Shared status block for load-balancer custom resources
//!
//! Both `VirtualServer` and `TransportServer` report the outcome of the last
//! declaration post through the same status shape.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Apply result reported back onto a load-balancer custom resource
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerStatus {
    /// Virtual address assigned to the resource on the device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vs_address: Option<String>,

    /// Apply state ("Ok" once the owning partition was accepted by the device)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Error detail for the last failed apply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Timestamp of the last status change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<chrono::DateTime<chrono::Utc>>,
}
