//! Load-balancer CRD Definitions
//!
//! Kubernetes Custom Resource Definitions consumed by the load-balancer
//! controller: the virtual server resources it reconciles onto devices and
//! the IPAM record it shares with the address-management controller.

pub mod status;
pub mod virtual_server;
pub mod transport_server;
pub mod ipam;

pub use status::*;
pub use virtual_server::*;
pub use transport_server::*;
pub use ipam::*;
