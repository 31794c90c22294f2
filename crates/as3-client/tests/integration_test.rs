//! Integration tests for the AS3 client
//!
//! These tests require a reachable device with AS3 installed.
//! Set BIGIP_URL, BIGIP_USERNAME and BIGIP_PASSWORD to run.

use as3_client::{As3Client, As3Declaration, As3Tenant, DeviceClientTrait};
use std::collections::BTreeMap;

fn client_from_env() -> As3Client {
    let url = std::env::var("BIGIP_URL")
        .unwrap_or_else(|_| "https://localhost:8443".to_string());
    let username = std::env::var("BIGIP_USERNAME")
        .unwrap_or_else(|_| "admin".to_string());
    let password = std::env::var("BIGIP_PASSWORD")
        .expect("BIGIP_PASSWORD environment variable must be set");

    As3Client::new(url, username, password, true).expect("Failed to create client")
}

#[tokio::test]
#[ignore] // Requires a running device
async fn test_info() {
    let client = client_from_env();
    let info = client.info().await.expect("Failed to query AS3 info");
    println!("AS3 version {}", info.version);
}

#[tokio::test]
#[ignore] // Requires a running device
async fn test_post_empty_tenant() {
    let client = client_from_env();

    let mut tenants = BTreeMap::new();
    tenants.insert("lb_controller_it".to_string(), As3Tenant::new());
    let declaration = As3Declaration::new(tenants, "lb-controller-it");

    let response = client
        .post_declaration(&declaration, &["lb_controller_it".to_string()])
        .await
        .expect("Failed to post declaration");

    assert!(response.results.iter().all(|r| r.tenant == "lb_controller_it"));
}
