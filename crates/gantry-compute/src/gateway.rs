//! Narrow Compute Engine surface used by the actuator
//!
//! Trait-based so the reconciler can be driven by mocks in tests while
//! production code talks to the REST API through [`ComputeClient`](crate::ComputeClient).

use async_trait::async_trait;

#[cfg(any(test, feature = "mock"))]
use mockall::automock;

use crate::error::ComputeError;
use crate::types::{Instance, InstanceGroup, Operation};

/// Compute Engine operations needed to manage one machine
#[cfg_attr(any(test, feature = "mock"), automock)]
#[async_trait]
pub trait ComputeGateway: Send + Sync {
    /// Create an instance in a zone
    async fn insert_instance(
        &self,
        project: &str,
        zone: &str,
        instance: &Instance,
    ) -> Result<Operation, ComputeError>;

    /// Fetch an instance; a missing instance is [`ComputeError::NotFound`]
    async fn get_instance(
        &self,
        project: &str,
        zone: &str,
        name: &str,
    ) -> Result<Instance, ComputeError>;

    /// Request deletion of an instance
    async fn delete_instance(
        &self,
        project: &str,
        zone: &str,
        name: &str,
    ) -> Result<Operation, ComputeError>;

    /// Self links of the running instances of an unmanaged instance group
    async fn list_group_instances(
        &self,
        project: &str,
        zone: &str,
        group: &str,
    ) -> Result<Vec<String>, ComputeError>;

    /// Add instances (by self link) to an instance group
    async fn add_group_instances(
        &self,
        project: &str,
        zone: &str,
        group: &str,
        instances: &[String],
    ) -> Result<Operation, ComputeError>;

    /// Remove instances (by self link) from an instance group
    async fn remove_group_instances(
        &self,
        project: &str,
        zone: &str,
        group: &str,
        instances: &[String],
    ) -> Result<Operation, ComputeError>;

    /// Create an unmanaged instance group
    async fn insert_group(
        &self,
        project: &str,
        zone: &str,
        group: &InstanceGroup,
    ) -> Result<Operation, ComputeError>;

    /// Self links of the members of a regional target pool
    async fn target_pool_instances(
        &self,
        project: &str,
        region: &str,
        pool: &str,
    ) -> Result<Vec<String>, ComputeError>;

    /// Add an instance (by self link) to a target pool
    async fn add_target_pool_instance(
        &self,
        project: &str,
        region: &str,
        pool: &str,
        instance: &str,
    ) -> Result<Operation, ComputeError>;

    /// Remove an instance (by self link) from a target pool
    async fn remove_target_pool_instance(
        &self,
        project: &str,
        region: &str,
        pool: &str,
        instance: &str,
    ) -> Result<Operation, ComputeError>;
}
