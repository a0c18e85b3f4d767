//! Common types for Gantry: CRDs, errors, and utilities

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod kube_utils;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Machine API labels and annotations
// =============================================================================

/// Label carrying the cluster id; required on every machine
pub const MACHINE_CLUSTER_ID_LABEL: &str = "machine.openshift.io/cluster-api-cluster";

/// Label carrying the machine role
pub const MACHINE_ROLE_LABEL: &str = "machine.openshift.io/cluster-api-machine-role";

/// Role value marking control plane machines
pub const MASTER_MACHINE_ROLE: &str = "master";

/// Label carrying the operating system of the machine
pub const MACHINE_OS_ID_LABEL: &str = "machine.openshift.io/os-id";

/// OS id value for Windows machines
pub const WINDOWS_OS_ID: &str = "Windows";

/// Annotation holding the raw provider instance status
pub const MACHINE_INSTANCE_STATE_ANNOTATION: &str = "machine.openshift.io/instance-state";

/// Label holding the machine type
pub const MACHINE_INSTANCE_TYPE_LABEL: &str = "machine.openshift.io/instance-type";

/// Label holding the region
pub const MACHINE_REGION_LABEL: &str = "machine.openshift.io/region";

/// Label holding the zone
pub const MACHINE_AZ_LABEL: &str = "machine.openshift.io/zone";

/// Node label present on machines backed by preemptible instances
pub const MACHINE_INTERRUPTIBLE_INSTANCE_LABEL: &str = "machine.openshift.io/interruptible-instance";

/// Condition type recording the outcome of the last create attempt
pub const MACHINE_CREATED_CONDITION: &str = "MachineCreated";
