//! DeviceClient trait for mocking
//!
//! Abstracts the AS3 transport so the controller can be unit tested without
//! a device. The concrete `As3Client` implements this trait, tests use
//! `MockDeviceClient`.

use crate::error::DeviceError;
use crate::models::{As3Declaration, As3Info, PostResponse};

/// Trait for device transport operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait DeviceClientTrait: Send + Sync {
    /// Get the base URL
    fn base_url(&self) -> &str;

    /// Check credentials and connectivity, returning the AS3 version info
    async fn info(&self) -> Result<As3Info, DeviceError>;

    /// Post a declaration targeting the given tenants, in order
    async fn post_declaration(
        &self,
        declaration: &As3Declaration,
        tenants: &[String],
    ) -> Result<PostResponse, DeviceError>;
}
