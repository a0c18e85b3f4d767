//! Resource types shared by the actuator and the termination handler
//!
//! The Machine CRD itself is owned by the machine API; these definitions
//! cover the fields Gantry reads and writes.

mod machine;
mod provider;
mod types;

pub use machine::{
    Machine, MachineAddress, MachineSpec, MachineStatus, NodeMetadata, ProviderSpec,
};
pub use provider::{
    GcpDisk, GcpEncryptionKeyReference, GcpGpuConfig, GcpKmsKeyReference, GcpMachineProviderSpec,
    GcpMachineProviderStatus, GcpMetadata, GcpNetworkInterface, GcpServiceAccount,
    LocalObjectReference,
};
pub use types::{find_condition, set_condition, Condition, ConditionStatus};
