//! Google Compute Engine gateway for Gantry
//!
//! - [`ComputeGateway`] - the narrow set of Compute Engine calls the actuator makes
//! - [`ComputeError`] - failures classified once at this boundary
//! - [`ComputeClient`] - REST implementation backed by reqwest
//! - [`types`] - the REST resources exchanged with the API

mod client;
mod error;
mod gateway;
pub mod types;

pub use client::{
    ComputeClient, ComputeClientConfig, StaticToken, TokenSource, DEFAULT_COMPUTE_ENDPOINT,
    DEFAULT_REQUEST_TIMEOUT,
};
pub use error::ComputeError;
pub use gateway::ComputeGateway;
#[cfg(any(test, feature = "mock"))]
pub use gateway::MockComputeGateway;
pub use types::Instance;

/// Base of instance self links
pub const SELF_LINK_BASE: &str = "https://www.googleapis.com/compute/v1";

/// Self link of an instance, as used by target pools and instance groups
pub fn fmt_instance_self_link(project: &str, zone: &str, name: &str) -> String {
    format!(
        "{}/projects/{}/zones/{}/instances/{}",
        SELF_LINK_BASE, project, zone, name
    )
}
