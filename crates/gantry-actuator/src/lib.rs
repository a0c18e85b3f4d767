//! Machine lifecycle actuator for Google Compute Engine
//!
//! Drives the instance behind a `Machine` through create, observe and
//! delete, keeping load balancer membership in step:
//!
//! - [`Reconciler`] - create / exists / delete / reconcile_machine_with_cloud_state
//! - [`InstanceBuilder`] - provider spec to instance request mapping
//! - [`TargetPoolMembership`] - regional target pool membership
//! - [`ControlPlaneGroup`] - control plane instance group registration
//! - [`SecretStore`] - user data secret access

#![deny(missing_docs)]

pub mod instance;
pub mod instance_group;
pub mod reconciler;
pub mod scope;
pub mod store;
pub mod target_pool;
pub mod userdata;

pub use instance::InstanceBuilder;
pub use instance_group::{control_plane_group_name, ControlPlaneGroup};
pub use reconciler::{Reconciler, DELETE_REQUEUE_DELAY};
pub use scope::{fmt_provider_id, MachineScope};
pub use store::{KubeSecretStore, SecretStore};
pub use target_pool::{
    add_instance_to_target_pool, remove_instance_from_target_pool, TargetPoolMembership,
};
pub use userdata::{resolve_user_data, user_data_metadata_key};
