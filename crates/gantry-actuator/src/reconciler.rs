//! Machine lifecycle reconciliation
//!
//! The [`Reconciler`] drives one machine's instance through creation,
//! observation and deletion. Each operation is invoked once per pass by the
//! outer control loop; the reconciler never loops or sleeps itself. Observed
//! state is written into the [`MachineScope`] and persisted by the caller.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use kube::ResourceExt;
use tracing::{debug, info, warn};

use gantry_common::crd::{
    set_condition, Condition, ConditionStatus, GcpMachineProviderSpec, Machine, MachineAddress,
};
use gantry_common::{
    Error, Result, MACHINE_AZ_LABEL, MACHINE_CLUSTER_ID_LABEL, MACHINE_CREATED_CONDITION,
    MACHINE_INSTANCE_STATE_ANNOTATION, MACHINE_INSTANCE_TYPE_LABEL,
    MACHINE_INTERRUPTIBLE_INSTANCE_LABEL, MACHINE_REGION_LABEL,
};
use gantry_compute::{fmt_instance_self_link, ComputeError, ComputeGateway, Instance};

use crate::instance::InstanceBuilder;
use crate::instance_group::ControlPlaneGroup;
use crate::scope::MachineScope;
use crate::store::SecretStore;
use crate::target_pool::{
    add_instance_to_target_pool, remove_instance_from_target_pool, TargetPoolMembership,
};
use crate::userdata::resolve_user_data;

/// Delay before the caller re-checks a machine whose instance is being deleted
pub const DELETE_REQUEUE_DELAY: Duration = Duration::from_secs(20);

/// Condition reason when the instance was created
pub const MACHINE_CREATION_SUCCEEDED_REASON: &str = "MachineCreationSucceeded";
/// Condition message when the instance was created
pub const MACHINE_CREATION_SUCCEEDED_MESSAGE: &str = "Machine successfully created";
/// Condition reason when instance creation failed
pub const MACHINE_CREATION_FAILED_REASON: &str = "MachineCreationFailed";
/// Condition reason when the machine failed validation
pub const MACHINE_VALIDATION_FAILED_REASON: &str = "MachineValidationFailed";

const INTERNAL_IP: &str = "InternalIP";
const EXTERNAL_IP: &str = "ExternalIP";
const INTERNAL_DNS: &str = "InternalDNS";

/// Reconciles one machine against Compute Engine
pub struct Reconciler {
    scope: MachineScope,
    compute: Arc<dyn ComputeGateway>,
    secrets: Arc<dyn SecretStore>,
}

impl Reconciler {
    /// Create a reconciler for the machine in `scope`
    pub fn new(
        scope: MachineScope,
        compute: Arc<dyn ComputeGateway>,
        secrets: Arc<dyn SecretStore>,
    ) -> Self {
        Self {
            scope,
            compute,
            secrets,
        }
    }

    /// The machine scope, including state written by previous operations
    pub fn scope(&self) -> &MachineScope {
        &self.scope
    }

    /// Release the scope so the caller can persist it
    pub fn into_scope(self) -> MachineScope {
        self.scope
    }

    /// Create the instance backing the machine.
    ///
    /// Every outcome is recorded in the `MachineCreated` condition. Membership
    /// is left to the next observation.
    pub async fn create(&mut self) -> Result<()> {
        let name = self.scope.name();
        let zone = self.scope.provider_spec.zone.clone();
        info!(machine = %name, zone = %zone, "Creating machine");

        if let Err(message) = validate_machine(&self.scope.machine, &self.scope.provider_spec) {
            let err = Error::validation_for(&name, message);
            warn!(machine = %name, error = %err, "Machine failed validation");
            self.set_created_condition(
                ConditionStatus::False,
                MACHINE_VALIDATION_FAILED_REASON,
                err.to_string(),
            );
            return Err(err);
        }

        let user_data = match resolve_user_data(
            self.secrets.as_ref(),
            &self.scope.machine,
            &self.scope.provider_spec,
        )
        .await
        {
            Ok(user_data) => user_data,
            Err(e) => {
                let err = Error::invalid_configuration(
                    &name,
                    format!("error getting custom user data: {}", e),
                );
                warn!(machine = %name, error = %err, "Failed to resolve user data");
                self.set_created_condition(
                    ConditionStatus::False,
                    MACHINE_CREATION_FAILED_REASON,
                    err.to_string(),
                );
                return Err(err);
            }
        };

        let instance = InstanceBuilder::new(
            &name,
            &self.scope.project_id,
            &self.scope.provider_spec,
            self.scope.machine.labels(),
        )
        .build(user_data.as_deref());

        let result = self
            .compute
            .insert_instance(&self.scope.project_id, &zone, &instance)
            .await;

        match result {
            Ok(operation) => {
                info!(machine = %name, operation = %operation.name, "Instance creation requested");
                self.set_created_condition(
                    ConditionStatus::True,
                    MACHINE_CREATION_SUCCEEDED_REASON,
                    MACHINE_CREATION_SUCCEEDED_MESSAGE,
                );
                Ok(())
            }
            Err(e) => {
                let text = e.to_string();
                warn!(machine = %name, error = %text, "Instance creation failed");
                self.set_created_condition(
                    ConditionStatus::False,
                    MACHINE_CREATION_FAILED_REASON,
                    text.clone(),
                );
                match e.code() {
                    Some(code) => Err(Error::invalid_configuration_with_code(
                        &name,
                        code,
                        format!("error launching instance: {}", text),
                    )),
                    None => Err(Error::gateway(format!(
                        "failed to create instance via compute service: {}",
                        text
                    ))),
                }
            }
        }
    }

    /// Whether the instance backing the machine exists
    pub async fn exists(&self) -> Result<bool> {
        let name = self.scope.name();
        let result = self
            .compute
            .get_instance(&self.scope.project_id, &self.scope.provider_spec.zone, &name)
            .await;

        match result {
            Ok(instance) => {
                debug!(machine = %name, status = %instance.status, "Instance exists");
                Ok(true)
            }
            Err(e) if e.is_not_found() => {
                info!(machine = %name, "Instance does not exist");
                Ok(false)
            }
            Err(e) => Err(Error::gateway(format!(
                "error getting running instances: {}",
                e
            ))),
        }
    }

    /// Tear the instance down.
    ///
    /// Membership is removed before deletion is requested. A requested
    /// deletion is reported as [`Error::RequeueAfter`] since it completes
    /// asynchronously.
    pub async fn delete(&mut self) -> Result<()> {
        let name = self.scope.name();
        let zone = self.scope.provider_spec.zone.clone();

        let result = self
            .compute
            .get_instance(&self.scope.project_id, &zone, &name)
            .await;
        let instance = match result {
            Ok(instance) => instance,
            Err(e) if e.is_not_found() => {
                info!(machine = %name, "Instance already gone, nothing to delete");
                return Ok(());
            }
            Err(e) => {
                return Err(Error::gateway(format!(
                    "error getting running instances: {}",
                    e
                )))
            }
        };
        info!(machine = %name, status = %instance.status, "Deleting machine");

        {
            let compute = self.compute.as_ref();
            let project = self.scope.project_id.as_str();
            let region = self.scope.provider_spec.region.as_str();
            self.process_target_pools(false, move |pool, link| async move {
                remove_instance_from_target_pool(compute, project, region, &pool, &link).await
            })
            .await?;
        }

        match self.unregister_instance_from_control_plane_instance_group().await {
            Err(e) if e.is_not_found() => {
                debug!(machine = %name, "Instance group not found, nothing to unregister");
            }
            other => other?,
        }

        match self
            .compute
            .delete_instance(&self.scope.project_id, &zone, &name)
            .await
        {
            Ok(operation) => {
                info!(machine = %name, operation = %operation.name, "Instance deletion requested");
                Err(Error::requeue_after(DELETE_REQUEUE_DELAY))
            }
            Err(ComputeError::NotFound(_)) => {
                info!(machine = %name, "Instance already gone");
                Ok(())
            }
            Err(e) => Err(Error::gateway(format!(
                "failed to delete instance via compute service: {}",
                e
            ))),
        }
    }

    /// Copy observed instance state into the machine and converge membership.
    ///
    /// The instance is fetched when not supplied. Membership is reconciled on
    /// every observation regardless of the instance state.
    pub async fn reconcile_machine_with_cloud_state(
        &mut self,
        instance: Option<Instance>,
    ) -> Result<()> {
        let name = self.scope.name();
        let zone = self.scope.provider_spec.zone.clone();

        let instance = match instance {
            Some(instance) => instance,
            None => self
                .compute
                .get_instance(&self.scope.project_id, &zone, &name)
                .await
                .map_err(|e| {
                    let resource = format!("instance {}", name);
                    if e.is_not_found() {
                        Error::fetch_not_found(resource, e.to_string())
                    } else {
                        Error::fetch(resource, e.to_string())
                    }
                })?,
        };

        let addresses = node_addresses(&instance, &name, &zone, &self.scope.project_id);
        debug!(machine = %name, addresses = addresses.len(), status = %instance.status, "Observed instance");

        self.scope
            .machine
            .status
            .get_or_insert_with(Default::default)
            .addresses = addresses;
        self.scope.machine.spec.provider_id = Some(self.scope.provider_id.clone());
        self.scope.provider_status.instance_state = Some(instance.status.clone());
        self.scope.provider_status.instance_id = Some(instance.name.clone());
        self.set_machine_cloud_provider_specifics(&instance);

        {
            let compute = self.compute.as_ref();
            let project = self.scope.project_id.as_str();
            let region = self.scope.provider_spec.region.as_str();
            self.process_target_pools(true, move |pool, link| async move {
                add_instance_to_target_pool(compute, project, region, &pool, &link).await
            })
            .await?;
        }

        if self.scope.machine.is_control_plane() && instance.status != "RUNNING" {
            // group listings only show running members
            debug!(
                machine = %name,
                status = %instance.status,
                "Instance not running yet, group registration repeats until it is"
            );
        }

        match self.register_instance_to_control_plane_instance_group().await {
            Err(e) if e.is_not_found() => {
                info!(machine = %name, "Control plane instance group missing, creating it");
                self.register_new_instance_group().await?;
                self.register_instance_to_control_plane_instance_group().await
            }
            other => other,
        }
    }

    /// Drive target pool membership towards `desired` using `apply`
    pub async fn process_target_pools<F, Fut>(&self, desired: bool, apply: F) -> Result<()>
    where
        F: FnMut(String, String) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let link = self.instance_self_link();
        TargetPoolMembership::new(
            self.compute.as_ref(),
            &self.scope.project_id,
            &self.scope.provider_spec.region,
            self.scope.provider_spec.target_pools.as_deref(),
            &link,
        )
        .process(desired, apply)
        .await
    }

    /// Add a control plane instance to its zone's instance group
    pub async fn register_instance_to_control_plane_instance_group(&self) -> Result<()> {
        let link = self.instance_self_link();
        match self.control_plane_group(&link) {
            Some(group) => group.register().await,
            None => Ok(()),
        }
    }

    /// Remove a control plane instance from its zone's instance group
    pub async fn unregister_instance_from_control_plane_instance_group(&self) -> Result<()> {
        let link = self.instance_self_link();
        match self.control_plane_group(&link) {
            Some(group) => group.unregister().await,
            None => Ok(()),
        }
    }

    /// Create the control plane instance group of the machine's zone
    pub async fn register_new_instance_group(&self) -> Result<()> {
        let link = self.instance_self_link();
        let Some(group) = self.control_plane_group(&link) else {
            return Ok(());
        };

        let network = self.scope.provider_spec.network_interfaces.first().map(|nic| {
            format!(
                "projects/{}/global/networks/{}",
                nic.project_id.as_deref().unwrap_or(&self.scope.project_id),
                nic.network
            )
        });
        group.create(network).await
    }

    /// Sync instance state and placement onto the machine's labels and annotations
    fn set_machine_cloud_provider_specifics(&mut self, instance: &Instance) {
        let spec = &self.scope.provider_spec;
        let machine = &mut self.scope.machine;

        machine.annotations_mut().insert(
            MACHINE_INSTANCE_STATE_ANNOTATION.to_string(),
            instance.status.clone(),
        );

        let labels = machine.labels_mut();
        labels.insert(MACHINE_INSTANCE_TYPE_LABEL.to_string(), spec.machine_type.clone());
        labels.insert(MACHINE_REGION_LABEL.to_string(), spec.region.clone());
        labels.insert(MACHINE_AZ_LABEL.to_string(), spec.zone.clone());

        if spec.preemptible {
            machine
                .spec
                .metadata
                .labels
                .insert(MACHINE_INTERRUPTIBLE_INSTANCE_LABEL.to_string(), String::new());
        }
    }

    fn set_created_condition(
        &mut self,
        status: ConditionStatus,
        reason: &str,
        message: impl Into<String>,
    ) {
        set_condition(
            &mut self.scope.provider_status.conditions,
            Condition::new(MACHINE_CREATED_CONDITION, status, reason, message),
        );
    }

    fn instance_self_link(&self) -> String {
        fmt_instance_self_link(
            &self.scope.project_id,
            &self.scope.provider_spec.zone,
            &self.scope.name(),
        )
    }

    fn control_plane_group<'a>(&'a self, link: &'a str) -> Option<ControlPlaneGroup<'a>> {
        if !self.scope.machine.is_control_plane() {
            return None;
        }
        Some(ControlPlaneGroup::new(
            self.compute.as_ref(),
            &self.scope.project_id,
            &self.scope.provider_spec.zone,
            self.scope.machine.cluster_id().unwrap_or_default(),
            link,
        ))
    }
}

/// Check the machine before any cloud call
fn validate_machine(
    machine: &Machine,
    spec: &GcpMachineProviderSpec,
) -> std::result::Result<(), String> {
    if spec.target_pools.iter().flatten().any(|pool| pool.is_empty()) {
        return Err("all target pools must have valid name".to_string());
    }

    match machine.cluster_id() {
        Some(id) if !id.is_empty() => Ok(()),
        _ => Err(format!(
            "machine is missing \"{}\" label",
            MACHINE_CLUSTER_ID_LABEL
        )),
    }
}

/// Node addresses of an instance, in interface order
fn node_addresses(instance: &Instance, name: &str, zone: &str, project: &str) -> Vec<MachineAddress> {
    let mut addresses = Vec::new();

    for nic in &instance.network_interfaces {
        if !nic.network_ip.is_empty() {
            addresses.push(MachineAddress::new(INTERNAL_IP, &nic.network_ip));
        }
        for access in &nic.access_configs {
            if !access.nat_ip.is_empty() {
                addresses.push(MachineAddress::new(EXTERNAL_IP, &access.nat_ip));
            }
        }
    }

    addresses.push(MachineAddress::new(INTERNAL_DNS, name));
    addresses.push(MachineAddress::new(
        INTERNAL_DNS,
        format!("{}.{}.c.{}.internal", name, zone, project),
    ));

    addresses
}
