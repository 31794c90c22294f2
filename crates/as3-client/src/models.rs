//! AS3 declaration models
//!
//! Typed subset of the AS3 schema used by the load-balancer controller.
//! Every object carries its AS3 `class` explicitly so that a service can be
//! switched between variants (e.g. HTTP to HTTPS) in place.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// AS3 schema version stamped into every declaration
pub const SCHEMA_VERSION: &str = "3.0.0";

/// Declaration id, stable across posts so the device diffs declarations
pub const DECLARATION_ID: &str = "urn:uuid:85626792-9ee7-46bb-8fc8-4ba708cfdc1d";

/// Name of the shared application inside every tenant
pub const SHARED_APP: &str = "Shared";

pub const SERVICE_HTTP: &str = "Service_HTTP";
pub const SERVICE_HTTPS: &str = "Service_HTTPS";
pub const SERVICE_TCP: &str = "Service_TCP";
pub const SERVICE_UDP: &str = "Service_UDP";

/// Top-level AS3 request body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct As3Declaration {
    pub class: String,
    pub action: String,
    pub persist: bool,
    pub declaration: As3Adc,
}

impl As3Declaration {
    /// Wrap tenants into a deployable declaration.
    pub fn new(tenants: BTreeMap<String, As3Tenant>, user_agent: &str) -> Self {
        Self {
            class: "AS3".to_string(),
            action: "deploy".to_string(),
            persist: true,
            declaration: As3Adc {
                class: "ADC".to_string(),
                schema_version: SCHEMA_VERSION.to_string(),
                id: DECLARATION_ID.to_string(),
                label: "LB Controller Declaration".to_string(),
                remark: "Auto-generated by the load-balancer controller".to_string(),
                controls: As3Controls {
                    class: "Controls".to_string(),
                    user_agent: user_agent.to_string(),
                },
                tenants,
            },
        }
    }

    /// Tenant names carried by this declaration
    pub fn tenant_names(&self) -> Vec<String> {
        self.declaration.tenants.keys().cloned().collect()
    }
}

/// The `ADC` document inside the AS3 envelope
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct As3Adc {
    pub class: String,
    pub schema_version: String,
    pub id: String,
    pub label: String,
    pub remark: String,
    pub controls: As3Controls,
    #[serde(flatten)]
    pub tenants: BTreeMap<String, As3Tenant>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct As3Controls {
    pub class: String,
    pub user_agent: String,
}

/// One partition on the device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct As3Tenant {
    pub class: String,
    #[serde(flatten)]
    pub applications: BTreeMap<String, As3Application>,
}

impl As3Tenant {
    /// Tenant with an empty shared application.
    ///
    /// Posting an empty tenant removes everything the controller owns in
    /// that partition.
    pub fn new() -> Self {
        let mut applications = BTreeMap::new();
        applications.insert(SHARED_APP.to_string(), As3Application::shared());
        Self {
            class: "Tenant".to_string(),
            applications,
        }
    }

    /// Mutable access to the shared application, creating it if absent
    pub fn shared_mut(&mut self) -> &mut As3Application {
        self.applications
            .entry(SHARED_APP.to_string())
            .or_insert_with(As3Application::shared)
    }

    /// The shared application, if present
    pub fn shared(&self) -> Option<&As3Application> {
        self.applications.get(SHARED_APP)
    }
}

impl Default for As3Tenant {
    fn default() -> Self {
        Self::new()
    }
}

/// Application inside a tenant: a flat map of named AS3 objects
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct As3Application {
    pub class: String,
    pub template: String,
    #[serde(flatten)]
    pub objects: SharedApp,
}

impl As3Application {
    pub fn shared() -> Self {
        Self {
            class: "Application".to_string(),
            template: "shared".to_string(),
            objects: SharedApp::new(),
        }
    }
}

/// Named objects of one application
pub type SharedApp = BTreeMap<String, As3Object>;

/// Any AS3 object the controller emits
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum As3Object {
    Service(As3Service),
    Pool(As3Pool),
    TlsClient(As3TlsClient),
    TlsServer(As3TlsServer),
    Certificate(As3Certificate),
    CaBundle(As3CaBundle),
}

/// `Service_HTTP`, `Service_HTTPS`, `Service_TCP` or `Service_UDP`
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct As3Service {
    pub class: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub virtual_addresses: Vec<String>,
    pub virtual_port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
    #[serde(rename = "clientTLS", skip_serializing_if = "Option::is_none")]
    pub client_tls: Option<String>,
    #[serde(rename = "serverTLS", skip_serializing_if = "Option::is_none")]
    pub server_tls: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect80: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snat: Option<String>,
}

impl As3Service {
    /// Switch an HTTP service to its TLS-terminating variant.
    ///
    /// TCP and UDP services keep their class.
    pub fn make_https(&mut self) {
        if self.class != SERVICE_HTTP {
            return;
        }
        self.class = SERVICE_HTTPS.to_string();
        self.redirect80 = Some(false);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct As3Pool {
    pub class: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<As3PoolMember>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct As3PoolMember {
    pub service_port: u16,
    pub server_addresses: Vec<String>,
    pub share_nodes: bool,
}

/// Reference to another declaration object (`use`) or a device object (`bigip`)
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct As3ResourcePointer {
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub use_: Option<String>,
    #[serde(rename = "bigip", skip_serializing_if = "Option::is_none")]
    pub bigip: Option<String>,
}

/// Server-side TLS profile: validates the backend
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct As3TlsClient {
    pub class: String,
    #[serde(rename = "trustCA", skip_serializing_if = "Option::is_none")]
    pub trust_ca: Option<As3ResourcePointer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cipher_group: Option<As3ResourcePointer>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ciphers: String,
    #[serde(rename = "tls1_3Enabled", skip_serializing_if = "std::ops::Not::not")]
    pub tls1_3_enabled: bool,
}

/// Client-side TLS profile: terminates client connections
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct As3TlsServer {
    pub class: String,
    pub certificates: Vec<As3TlsServerCertificate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cipher_group: Option<As3ResourcePointer>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ciphers: String,
    #[serde(rename = "tls1_3Enabled", skip_serializing_if = "std::ops::Not::not")]
    pub tls1_3_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct As3TlsServerCertificate {
    pub certificate: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct As3Certificate {
    pub class: String,
    pub certificate: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct As3CaBundle {
    pub class: String,
    pub bundle: String,
}

/// Body returned by the declare endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PostResponse {
    #[serde(default)]
    pub results: Vec<TenantResult>,
}

/// Per-tenant outcome of a post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantResult {
    #[serde(default)]
    pub tenant: String,
    pub code: u16,
    #[serde(default)]
    pub message: String,
}

impl TenantResult {
    pub fn is_success(&self) -> bool {
        self.code == 200
    }
}

/// Body returned by the info endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct As3Info {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub schema_current: String,
}
