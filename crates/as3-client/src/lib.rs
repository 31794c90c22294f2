//! AS3 Device Client
//!
//! Models and transport for posting AS3 declarations to load-balancing
//! devices.
//!
//! # Example
//!
//! ```no_run
//! use as3_client::{As3Client, As3Declaration, As3Tenant, DeviceClientTrait};
//! use std::collections::BTreeMap;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = As3Client::new(
//!     "https://10.1.1.4".to_string(),
//!     "admin".to_string(),
//!     "secret".to_string(),
//!     false,
//! )?;
//!
//! let mut tenants = BTreeMap::new();
//! tenants.insert("team_a".to_string(), As3Tenant::new());
//! let declaration = As3Declaration::new(tenants, "lb-controller");
//!
//! let response = client.post_declaration(&declaration, &["team_a".to_string()]).await?;
//! for result in response.results {
//!     println!("{}: {}", result.tenant, result.code);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod device_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::As3Client;
pub use error::DeviceError;
pub use models::*;
pub use device_trait::DeviceClientTrait;
#[cfg(feature = "test-util")]
pub use mock::{MockDeviceClient, MockResponse, RecordedPost};
