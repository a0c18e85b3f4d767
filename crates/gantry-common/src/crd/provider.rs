//! GCP provider spec and status carried inside a Machine
//!
//! These are the decoded forms of `spec.providerSpec.value` and
//! `status.providerStatus`.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Condition;

/// Desired GCE instance configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GcpMachineProviderSpec {
    /// Machine type (e.g., n1-standard-4)
    #[serde(default)]
    pub machine_type: String,

    /// Zone the instance runs in
    #[serde(default)]
    pub zone: String,

    /// Region containing the zone
    #[serde(default)]
    pub region: String,

    /// Project owning the instance
    #[serde(rename = "projectID", default)]
    pub project_id: String,

    /// Network interfaces, in attachment order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub network_interfaces: Vec<GcpNetworkInterface>,

    /// Attached disks
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disks: Vec<GcpDisk>,

    /// Guest accelerators
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gpus: Vec<GcpGpuConfig>,

    /// Load balancer target pools the instance belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_pools: Option<Vec<String>>,

    /// Explicit instance metadata entries
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metadata: Vec<GcpMetadata>,

    /// Secret holding the bootstrap user data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data_secret: Option<LocalObjectReference>,

    /// Secret holding cloud credentials (consumed outside the actuator)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_secret: Option<LocalObjectReference>,

    /// Run as a preemptible instance
    #[serde(default)]
    pub preemptible: bool,

    /// Network tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Instance labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Service accounts attached to the instance
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_accounts: Vec<GcpServiceAccount>,

    /// Allow the instance to send packets with foreign source addresses
    #[serde(rename = "canIPForward", default)]
    pub can_ip_forward: bool,

    /// Protect the instance against deletion
    #[serde(default)]
    pub deletion_protection: bool,

    /// Maintenance behaviour: Migrate or Terminate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_host_maintenance: Option<String>,

    /// Restart behaviour: Always or Never
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_policy: Option<String>,
}

/// A network interface of the instance
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GcpNetworkInterface {
    /// Project owning the network; defaults to the machine's project
    #[serde(rename = "projectID", default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    /// Network name
    #[serde(default)]
    pub network: String,

    /// Subnetwork name
    #[serde(default)]
    pub subnetwork: String,

    /// Attach an ephemeral external address
    #[serde(rename = "publicIP", default)]
    pub public_ip: bool,
}

/// A disk attached to the instance
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GcpDisk {
    /// Delete the disk with the instance
    #[serde(default)]
    pub auto_delete: bool,

    /// Use as boot disk
    #[serde(default)]
    pub boot: bool,

    /// Size in GB
    #[serde(default)]
    pub size_gb: i64,

    /// Disk type (e.g., pd-ssd)
    #[serde(rename = "type", default)]
    pub type_: String,

    /// Source image, either a bare name or a resource path
    #[serde(default)]
    pub image: String,

    /// Disk labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Customer-managed encryption key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<GcpEncryptionKeyReference>,
}

/// Customer-managed encryption key for a disk
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GcpEncryptionKeyReference {
    /// KMS key location
    #[serde(rename = "kmsKey", default, skip_serializing_if = "Option::is_none")]
    pub kms_key: Option<GcpKmsKeyReference>,

    /// Service account used to access the key
    #[serde(rename = "kmsKeyServiceAccount", default, skip_serializing_if = "Option::is_none")]
    pub kms_key_service_account: Option<String>,
}

/// Cloud KMS key coordinates
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GcpKmsKeyReference {
    /// Key name
    pub name: String,

    /// Key ring name
    pub key_ring: String,

    /// Project owning the key ring; defaults to the machine's project
    #[serde(rename = "projectID", default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    /// Key ring location
    pub location: String,
}

/// Accelerator request
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct GcpGpuConfig {
    /// Number of accelerators
    pub count: i32,

    /// Accelerator type (e.g., nvidia-tesla-v100)
    #[serde(rename = "type")]
    pub type_: String,
}

/// Explicit instance metadata entry
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct GcpMetadata {
    /// Metadata key
    pub key: String,

    /// Metadata value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Service account attached to the instance
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct GcpServiceAccount {
    /// Service account email
    pub email: String,

    /// OAuth scopes
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Reference to a secret in the machine's namespace
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct LocalObjectReference {
    /// Secret name
    pub name: String,
}

/// Last observed GCE instance state
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GcpMachineProviderStatus {
    /// Instance identifier (the instance name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,

    /// Raw GCE instance status (PROVISIONING, RUNNING, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_state: Option<String>,

    /// Ordered conditions, at most one per type
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}
