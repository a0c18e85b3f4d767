//! Per-invocation view of one machine
//!
//! A scope decodes the provider spec and status once, lets the reconciler
//! mutate them, and encodes the status back when the invocation ends.

use chrono::Utc;
use kube::ResourceExt;

use gantry_common::crd::{GcpMachineProviderSpec, GcpMachineProviderStatus, Machine};
use gantry_common::{Error, Result};

/// Provider id of a GCE instance
pub fn fmt_provider_id(project: &str, zone: &str, name: &str) -> String {
    format!("gce://{}/{}/{}", project, zone, name)
}

/// A machine together with its decoded provider spec and status
#[derive(Clone, Debug)]
pub struct MachineScope {
    /// The machine being reconciled
    pub machine: Machine,
    /// Decoded desired configuration (never mutated)
    pub provider_spec: GcpMachineProviderSpec,
    /// Decoded observed state
    pub provider_status: GcpMachineProviderStatus,
    /// Project the instance lives in
    pub project_id: String,
    /// `gce://{project}/{zone}/{name}`
    pub provider_id: String,
}

impl MachineScope {
    /// Decode the provider spec and status carried by `machine`
    pub fn new(machine: Machine) -> Result<Self> {
        let name = machine.name_any();

        let provider_spec: GcpMachineProviderSpec = match machine.spec.provider_spec.value {
            Some(ref value) => serde_json::from_value(value.clone()).map_err(|e| {
                Error::serialization_for_kind(
                    "GcpMachineProviderSpec",
                    format!("failed to decode provider spec of machine {}: {}", name, e),
                )
            })?,
            None => {
                return Err(Error::invalid_configuration(
                    &name,
                    format!("machine {} has no provider spec", name),
                ))
            }
        };

        let provider_status: GcpMachineProviderStatus = match machine
            .status
            .as_ref()
            .and_then(|s| s.provider_status.as_ref())
        {
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                Error::serialization_for_kind(
                    "GcpMachineProviderStatus",
                    format!("failed to decode provider status of machine {}: {}", name, e),
                )
            })?,
            None => GcpMachineProviderStatus::default(),
        };

        Ok(Self::from_parts(machine, provider_spec, provider_status))
    }

    /// Build a scope from already decoded parts
    pub fn from_parts(
        machine: Machine,
        provider_spec: GcpMachineProviderSpec,
        provider_status: GcpMachineProviderStatus,
    ) -> Self {
        let project_id = provider_spec.project_id.clone();
        let provider_id = fmt_provider_id(&project_id, &provider_spec.zone, &machine.name_any());
        Self {
            machine,
            provider_spec,
            provider_status,
            project_id,
            provider_id,
        }
    }

    /// Machine (and instance) name
    pub fn name(&self) -> String {
        self.machine.name_any()
    }

    /// Machine namespace, empty for cluster-scoped test fixtures
    pub fn namespace(&self) -> String {
        self.machine.namespace().unwrap_or_default()
    }

    /// Encode the provider status back into the machine and return it
    pub fn finalize(mut self) -> Result<Machine> {
        let encoded = serde_json::to_value(&self.provider_status).map_err(|e| {
            Error::serialization_for_kind("GcpMachineProviderStatus", e.to_string())
        })?;
        let status = self.machine.status.get_or_insert_with(Default::default);
        status.provider_status = Some(encoded);
        status.last_updated = Some(Utc::now());
        Ok(self.machine)
    }
}
