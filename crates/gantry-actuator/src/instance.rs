//! Provider spec to Compute Engine instance mapping

use std::collections::BTreeMap;

use gantry_common::crd::{GcpDisk, GcpMachineProviderSpec, GcpNetworkInterface};
use gantry_common::MACHINE_CLUSTER_ID_LABEL;
use gantry_compute::types::{
    AcceleratorConfig, AccessConfig, AttachedDisk, AttachedDiskInitializeParams,
    CustomerEncryptionKey, Metadata, MetadataItem, NetworkInterface, Scheduling, ServiceAccount,
    Tags,
};
use gantry_compute::Instance;

use crate::userdata::user_data_metadata_key;

const ON_HOST_MAINTENANCE_TERMINATE: &str = "TERMINATE";
const ON_HOST_MAINTENANCE_MIGRATE: &str = "MIGRATE";
const RESTART_POLICY_ALWAYS: &str = "Always";
const RESTART_POLICY_NEVER: &str = "Never";

/// Builds the instance request for one machine.
///
/// The mapping is pure: the same inputs always yield the same instance.
pub struct InstanceBuilder<'a> {
    name: &'a str,
    project_id: &'a str,
    spec: &'a GcpMachineProviderSpec,
    machine_labels: &'a BTreeMap<String, String>,
}

impl<'a> InstanceBuilder<'a> {
    /// Create a builder for the machine `name` with the given labels
    pub fn new(
        name: &'a str,
        project_id: &'a str,
        spec: &'a GcpMachineProviderSpec,
        machine_labels: &'a BTreeMap<String, String>,
    ) -> Self {
        Self {
            name,
            project_id,
            spec,
            machine_labels,
        }
    }

    /// Produce the instance, placing `user_data` under the os-specific
    /// metadata key unless an explicit entry already owns that key
    pub fn build(&self, user_data: Option<&str>) -> Instance {
        let spec = self.spec;
        let preemptible = spec.preemptible;

        let on_host_maintenance = if preemptible || !spec.gpus.is_empty() {
            ON_HOST_MAINTENANCE_TERMINATE.to_string()
        } else {
            spec.on_host_maintenance
                .clone()
                .unwrap_or_else(|| ON_HOST_MAINTENANCE_MIGRATE.to_string())
        };

        let automatic_restart = match spec.restart_policy.as_deref() {
            _ if preemptible => Some(false),
            Some(RESTART_POLICY_NEVER) => Some(false),
            Some(RESTART_POLICY_ALWAYS) => Some(true),
            _ => None,
        };

        Instance {
            name: self.name.to_string(),
            machine_type: format!("zones/{}/machineTypes/{}", spec.zone, spec.machine_type),
            network_interfaces: spec
                .network_interfaces
                .iter()
                .map(|nic| self.network_interface(nic))
                .collect(),
            disks: spec.disks.iter().map(|disk| self.disk(disk)).collect(),
            metadata: Some(self.metadata(user_data)),
            guest_accelerators: spec
                .gpus
                .iter()
                .map(|gpu| AcceleratorConfig {
                    accelerator_type: format!("zones/{}/acceleratorTypes/{}", spec.zone, gpu.type_),
                    accelerator_count: gpu.count,
                })
                .collect(),
            scheduling: Some(Scheduling {
                preemptible,
                automatic_restart,
                on_host_maintenance,
            }),
            labels: self.labels(),
            tags: (!spec.tags.is_empty()).then(|| Tags {
                items: spec.tags.clone(),
            }),
            service_accounts: spec
                .service_accounts
                .iter()
                .map(|sa| ServiceAccount {
                    email: sa.email.clone(),
                    scopes: sa.scopes.clone(),
                })
                .collect(),
            can_ip_forward: spec.can_ip_forward,
            deletion_protection: spec.deletion_protection,
            ..Default::default()
        }
    }

    fn network_interface(&self, nic: &GcpNetworkInterface) -> NetworkInterface {
        let project = nic.project_id.as_deref().unwrap_or(self.project_id);

        let subnetwork = if nic.subnetwork.is_empty() {
            String::new()
        } else {
            format!(
                "projects/{}/regions/{}/networks/{}",
                project, self.spec.region, nic.network
            )
        };

        let access_configs = if nic.public_ip {
            vec![AccessConfig {
                name: "External NAT".to_string(),
                type_: "ONE_TO_ONE_NAT".to_string(),
                ..Default::default()
            }]
        } else {
            Vec::new()
        };

        NetworkInterface {
            network: format!("projects/{}/global/networks/{}", project, nic.network),
            subnetwork,
            access_configs,
            ..Default::default()
        }
    }

    fn disk(&self, disk: &GcpDisk) -> AttachedDisk {
        let source_image = if disk.image.contains('/') {
            disk.image.clone()
        } else {
            format!("projects/{}/global/images/{}", self.project_id, disk.image)
        };

        let disk_encryption_key = disk.encryption_key.as_ref().map(|key| {
            let kms_key_name = key
                .kms_key
                .as_ref()
                .map(|kms| {
                    format!(
                        "projects/{}/locations/{}/keyRings/{}/cryptoKeys/{}",
                        kms.project_id.as_deref().unwrap_or(self.project_id),
                        kms.location,
                        kms.key_ring,
                        kms.name
                    )
                })
                .unwrap_or_default();
            CustomerEncryptionKey {
                kms_key_name,
                kms_key_service_account: key.kms_key_service_account.clone().unwrap_or_default(),
            }
        });

        AttachedDisk {
            auto_delete: disk.auto_delete,
            boot: disk.boot,
            initialize_params: Some(AttachedDiskInitializeParams {
                // unset size lets the API size the disk from the image
                disk_size_gb: (disk.size_gb > 0).then_some(disk.size_gb),
                disk_type: format!("zones/{}/diskTypes/{}", self.spec.zone, disk.type_),
                source_image,
                labels: disk.labels.clone(),
            }),
            disk_encryption_key,
        }
    }

    fn metadata(&self, user_data: Option<&str>) -> Metadata {
        let key = user_data_metadata_key(self.machine_labels);

        let mut items: Vec<MetadataItem> = self
            .spec
            .metadata
            .iter()
            .map(|m| MetadataItem {
                key: m.key.clone(),
                value: m.value.clone(),
            })
            .collect();

        // an explicit entry owns its key
        if let Some(blob) = user_data {
            if !items.iter().any(|item| item.key == key) {
                items.push(MetadataItem {
                    key: key.to_string(),
                    value: Some(blob.to_string()),
                });
            }
        }

        Metadata { items }
    }

    fn labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.spec.labels.clone();
        if let Some(cluster_id) = self.machine_labels.get(MACHINE_CLUSTER_ID_LABEL) {
            labels.insert(
                format!("kubernetes-io-cluster-{}", cluster_id),
                "owned".to_string(),
            );
        }
        labels
    }
}
