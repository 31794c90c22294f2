//! Controller-specific error types.
//!
//! Errors that are not covered by the device client or kube errors.

use thiserror::Error;
use kube::Error as KubeError;
use as3_client::DeviceError;

/// Errors that can occur in the load-balancer controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Device transport error
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Post worker for a device is gone
    #[error("Post worker stopped for device {0}")]
    WorkerStopped(String),

    /// No post worker registered for a device
    #[error("No post worker registered for device {0}")]
    UnknownDevice(String),

    /// IPAM resource could not be updated
    #[error("IPAM error: {0}")]
    Ipam(String),

    /// Status update failed
    #[error("Status update failed: {0}")]
    Status(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Metrics registry or endpoint failure
    #[error("Metrics error: {0}")]
    Metrics(String),
}

impl From<prometheus::Error> for ControllerError {
    fn from(e: prometheus::Error) -> Self {
        ControllerError::Metrics(e.to_string())
    }
}
