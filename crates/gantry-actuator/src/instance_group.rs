//! Control plane instance group registration
//!
//! Control plane instances are members of an unmanaged zonal instance group
//! named `{cluster}-master-{zone}` that backs the internal API load balancer.

use tracing::{debug, info};

use gantry_common::{Error, Result};
use gantry_compute::types::InstanceGroup;
use gantry_compute::ComputeGateway;

/// Name of the control plane instance group of a cluster in a zone
pub fn control_plane_group_name(cluster_id: &str, zone: &str) -> String {
    format!("{}-master-{}", cluster_id, zone)
}

/// The control plane instance group of one zone, seen from one instance
pub struct ControlPlaneGroup<'a> {
    compute: &'a dyn ComputeGateway,
    project: &'a str,
    zone: &'a str,
    name: String,
    instance_link: &'a str,
}

impl<'a> ControlPlaneGroup<'a> {
    /// Group of `cluster_id` in `zone`, for the instance at `instance_link`
    pub fn new(
        compute: &'a dyn ComputeGateway,
        project: &'a str,
        zone: &'a str,
        cluster_id: &str,
        instance_link: &'a str,
    ) -> Self {
        Self {
            compute,
            project,
            zone,
            name: control_plane_group_name(cluster_id, zone),
            instance_link,
        }
    }

    async fn is_member(&self) -> Result<bool> {
        let members = self
            .compute
            .list_group_instances(self.project, self.zone, &self.name)
            .await
            .map_err(|e| {
                let resource = format!("running instances in instance group {}", self.name);
                let message = format!("instanceGroupsListInstances request failed: {}", e);
                if e.is_not_found() {
                    Error::fetch_not_found(resource, message)
                } else {
                    Error::fetch(resource, message)
                }
            })?;
        Ok(members.iter().any(|m| m == self.instance_link))
    }

    /// Add the instance unless already listed
    pub async fn register(&self) -> Result<()> {
        if self.is_member().await? {
            debug!(group = %self.name, "Instance already registered in instance group");
            return Ok(());
        }

        self.compute
            .add_group_instances(
                self.project,
                self.zone,
                &self.name,
                &[self.instance_link.to_string()],
            )
            .await
            .map_err(|e| Error::gateway(format!("InstanceGroupsAddInstances request failed: {}", e)))?;

        info!(group = %self.name, instance = %self.instance_link, "Registered instance in instance group");
        Ok(())
    }

    /// Remove the instance if listed
    pub async fn unregister(&self) -> Result<()> {
        if !self.is_member().await? {
            debug!(group = %self.name, "Instance not registered in instance group");
            return Ok(());
        }

        self.compute
            .remove_group_instances(
                self.project,
                self.zone,
                &self.name,
                &[self.instance_link.to_string()],
            )
            .await
            .map_err(|e| {
                Error::gateway(format!("InstanceGroupsRemoveInstances request failed: {}", e))
            })?;

        info!(group = %self.name, instance = %self.instance_link, "Unregistered instance from instance group");
        Ok(())
    }

    /// Create the group, attached to `network` when given
    pub async fn create(&self, network: Option<String>) -> Result<()> {
        let group = InstanceGroup {
            name: self.name.clone(),
            description: String::new(),
            network: network.unwrap_or_default(),
        };

        self.compute
            .insert_group(self.project, self.zone, &group)
            .await
            .map_err(|e| Error::gateway(format!("instanceGroupInsert request failed: {}", e)))?;

        info!(group = %self.name, zone = %self.zone, "Created instance group");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_compute::types::Operation;
    use gantry_compute::{ComputeError, MockComputeGateway};
    use mockall::predicate::eq;

    const LINK: &str =
        "https://www.googleapis.com/compute/v1/projects/proj/zones/us-east1-b/instances/master-0";
    const GROUP: &str = "infra-abc12-master-us-east1-b";

    fn group(compute: &MockComputeGateway) -> ControlPlaneGroup<'_> {
        ControlPlaneGroup::new(compute, "proj", "us-east1-b", "infra-abc12", LINK)
    }

    #[test]
    fn group_name_is_cluster_and_zone_scoped() {
        assert_eq!(control_plane_group_name("infra-abc12", "us-east1-b"), GROUP);
    }

    #[tokio::test]
    async fn register_adds_missing_instance() {
        let mut compute = MockComputeGateway::new();
        compute
            .expect_list_group_instances()
            .with(eq("proj"), eq("us-east1-b"), eq(GROUP))
            .returning(|_, _, _| Ok(vec![]));
        compute
            .expect_add_group_instances()
            .with(
                eq("proj"),
                eq("us-east1-b"),
                eq(GROUP),
                eq(vec![LINK.to_string()]),
            )
            .times(1)
            .returning(|_, _, _, _| Ok(Operation::default()));

        group(&compute).register().await.expect("register");
    }

    #[tokio::test]
    async fn register_is_a_noop_when_already_listed() {
        let mut compute = MockComputeGateway::new();
        compute
            .expect_list_group_instances()
            .returning(|_, _, _| Ok(vec![LINK.to_string()]));
        compute.expect_add_group_instances().never();

        group(&compute).register().await.expect("register");
    }

    #[tokio::test]
    async fn missing_group_is_a_not_found_fetch_error() {
        let mut compute = MockComputeGateway::new();
        compute
            .expect_list_group_instances()
            .returning(|_, _, _| Err(ComputeError::NotFound("instanceGroupNotFound".into())));

        let err = group(&compute).register().await.expect_err("should fail");
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            format!(
                "failed to fetch running instances in instance group {}: instanceGroupsListInstances request failed: googleapi: Error 404: instanceGroupNotFound",
                GROUP
            )
        );
    }

    #[tokio::test]
    async fn add_failure_is_wrapped() {
        let mut compute = MockComputeGateway::new();
        compute
            .expect_list_group_instances()
            .returning(|_, _, _| Ok(vec![]));
        compute
            .expect_add_group_instances()
            .returning(|_, _, _, _| Err(ComputeError::Transient("backend error".into())));

        let err = group(&compute).register().await.expect_err("should fail");
        assert_eq!(
            err.to_string(),
            "InstanceGroupsAddInstances request failed: backend error"
        );
    }

    #[tokio::test]
    async fn unregister_removes_listed_instance() {
        let mut compute = MockComputeGateway::new();
        compute
            .expect_list_group_instances()
            .returning(|_, _, _| Ok(vec![LINK.to_string()]));
        compute
            .expect_remove_group_instances()
            .with(
                eq("proj"),
                eq("us-east1-b"),
                eq(GROUP),
                eq(vec![LINK.to_string()]),
            )
            .times(1)
            .returning(|_, _, _, _| Ok(Operation::default()));

        group(&compute).unregister().await.expect("unregister");
    }

    #[tokio::test]
    async fn unregister_skips_absent_instance() {
        let mut compute = MockComputeGateway::new();
        compute
            .expect_list_group_instances()
            .returning(|_, _, _| Ok(vec!["someone-else".to_string()]));
        compute.expect_remove_group_instances().never();

        group(&compute).unregister().await.expect("unregister");
    }

    #[tokio::test]
    async fn unregister_failure_is_wrapped() {
        let mut compute = MockComputeGateway::new();
        compute
            .expect_list_group_instances()
            .returning(|_, _, _| Ok(vec![LINK.to_string()]));
        compute.expect_remove_group_instances().returning(|_, _, _, _| {
            Err(ComputeError::Permanent {
                code: 403,
                message: "forbidden".into(),
            })
        });

        let err = group(&compute).unregister().await.expect_err("should fail");
        assert_eq!(
            err.to_string(),
            "InstanceGroupsRemoveInstances request failed: googleapi: Error 403: forbidden"
        );
    }

    #[tokio::test]
    async fn create_inserts_group_on_network() {
        let mut compute = MockComputeGateway::new();
        compute
            .expect_insert_group()
            .withf(|project, zone, group| {
                project == "proj"
                    && zone == "us-east1-b"
                    && group.name == GROUP
                    && group.network == "projects/proj/global/networks/net"
            })
            .times(1)
            .returning(|_, _, _| Ok(Operation::default()));

        group(&compute)
            .create(Some("projects/proj/global/networks/net".into()))
            .await
            .expect("create");
    }

    #[tokio::test]
    async fn create_failure_is_wrapped() {
        let mut compute = MockComputeGateway::new();
        compute
            .expect_insert_group()
            .returning(|_, _, _| Err(ComputeError::Transient("timeout".into())));

        let err = group(&compute).create(None).await.expect_err("should fail");
        assert_eq!(err.to_string(), "instanceGroupInsert request failed: timeout");
    }
}
