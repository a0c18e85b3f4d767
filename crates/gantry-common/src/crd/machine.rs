//! Machine resource (`machine.openshift.io/v1beta1`)
//!
//! The Machine is owned by the outer control loop. Gantry reads its provider
//! spec and writes observed state back into status, labels and annotations.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{MACHINE_CLUSTER_ID_LABEL, MACHINE_ROLE_LABEL, MASTER_MACHINE_ROLE};

/// Desired state of a single cloud compute instance.
///
/// Example:
/// ```yaml
/// apiVersion: machine.openshift.io/v1beta1
/// kind: Machine
/// metadata:
///   name: infra-abc12-worker-a-x7k2p
///   namespace: openshift-machine-api
///   labels:
///     machine.openshift.io/cluster-api-cluster: infra-abc12
/// spec:
///   providerSpec:
///     value:
///       machineType: n1-standard-4
///       zone: us-east1-b
///       region: us-east1
///       projectID: my-project
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "machine.openshift.io",
    version = "v1beta1",
    kind = "Machine",
    namespaced,
    status = "MachineStatus",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".metadata.annotations['machine\\.openshift\\.io/instance-state']"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    /// Labels and annotations propagated to the Node backed by this machine
    #[serde(default)]
    pub metadata: NodeMetadata,

    /// Provider-specific desired configuration
    #[serde(default)]
    pub provider_spec: ProviderSpec,

    /// Provider id of the backing instance (`gce://project/zone/name`)
    #[serde(rename = "providerID", default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
}

/// Metadata copied onto the Node
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct NodeMetadata {
    /// Node labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Node annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Opaque provider configuration, decoded by the actuator
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ProviderSpec {
    /// Raw provider spec document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

/// Observed state of a Machine
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatus {
    /// Addresses assigned to the instance, in provider order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<MachineAddress>,

    /// Opaque provider status, encoded by the actuator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_status: Option<serde_json::Value>,

    /// Machine-readable terminal error reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,

    /// Human-readable terminal error message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Lifecycle phase as reported by the outer control loop
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// Last time the status was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Address of a machine, in Kubernetes NodeAddress form
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct MachineAddress {
    /// Address type (InternalIP, ExternalIP, InternalDNS, Hostname)
    #[serde(rename = "type")]
    pub type_: String,

    /// The address itself
    pub address: String,
}

impl MachineAddress {
    /// Create an address of the given type
    pub fn new(type_: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            type_: type_.into(),
            address: address.into(),
        }
    }
}

impl Machine {
    /// Cluster id from the cluster label, if set
    pub fn cluster_id(&self) -> Option<&str> {
        self.labels()
            .get(MACHINE_CLUSTER_ID_LABEL)
            .map(String::as_str)
    }

    /// Whether this machine belongs to the control plane
    pub fn is_control_plane(&self) -> bool {
        self.labels().get(MACHINE_ROLE_LABEL).map(String::as_str) == Some(MASTER_MACHINE_ROLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine_with_labels(labels: &[(&str, &str)]) -> Machine {
        let mut machine = Machine::new("m", MachineSpec::default());
        machine.metadata.labels = Some(
            labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        machine
    }

    #[test]
    fn role_and_cluster_helpers() {
        let machine = machine_with_labels(&[
            (MACHINE_ROLE_LABEL, MASTER_MACHINE_ROLE),
            (MACHINE_CLUSTER_ID_LABEL, "infra"),
        ]);
        assert!(machine.is_control_plane());
        assert_eq!(machine.cluster_id(), Some("infra"));

        let worker = machine_with_labels(&[(MACHINE_ROLE_LABEL, "worker")]);
        assert!(!worker.is_control_plane());
        assert_eq!(worker.cluster_id(), None);
    }

    #[test]
    fn spec_round_trips_provider_id() {
        let json = serde_json::json!({
            "providerSpec": {"value": {"zone": "us-east1-b"}},
            "providerID": "gce://p/us-east1-b/m",
            "metadata": {"labels": {"a": "b"}}
        });
        let spec: MachineSpec = serde_json::from_value(json).expect("spec should parse");
        assert_eq!(spec.provider_id.as_deref(), Some("gce://p/us-east1-b/m"));
        assert_eq!(spec.metadata.labels.get("a").map(String::as_str), Some("b"));
        assert!(spec.provider_spec.value.is_some());
    }
}
