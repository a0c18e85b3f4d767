//! Bootstrap user data resolution

use std::collections::BTreeMap;

use gantry_common::crd::{GcpMachineProviderSpec, Machine};
use gantry_common::{Error, Result, MACHINE_OS_ID_LABEL, WINDOWS_OS_ID};
use kube::ResourceExt;

use crate::store::SecretStore;

/// Key holding the bootstrap blob inside the user data secret
pub const USER_DATA_SECRET_KEY: &str = "userData";

/// Instance metadata key consumed by Linux images
pub const USER_DATA_METADATA_KEY: &str = "user-data";

/// Instance metadata key consumed by Windows images
pub const WINDOWS_SCRIPT_METADATA_KEY: &str = "sysprep-specialize-script-ps1";

/// Metadata key under which the resolved user data is placed, chosen by the
/// machine's `os-id` label
pub fn user_data_metadata_key(labels: &BTreeMap<String, String>) -> &'static str {
    if labels.get(MACHINE_OS_ID_LABEL).map(String::as_str) == Some(WINDOWS_OS_ID) {
        WINDOWS_SCRIPT_METADATA_KEY
    } else {
        USER_DATA_METADATA_KEY
    }
}

/// Read the bootstrap blob referenced by the provider spec.
///
/// Returns `None` when the provider spec references no secret. Every failure
/// is a configuration error.
pub async fn resolve_user_data(
    secrets: &dyn SecretStore,
    machine: &Machine,
    spec: &GcpMachineProviderSpec,
) -> Result<Option<String>> {
    let Some(reference) = spec.user_data_secret.as_ref() else {
        return Ok(None);
    };

    let name = machine.name_any();
    let namespace = machine.namespace().unwrap_or_default();

    let data = match secrets.get_secret(&reference.name, &namespace).await {
        Ok(Some(data)) => data,
        Ok(None) => {
            return Err(Error::invalid_configuration(
                &name,
                format!(
                    "error getting user data secret {} in namespace {}: secret not found",
                    reference.name, namespace
                ),
            ))
        }
        Err(e) => {
            return Err(Error::invalid_configuration(
                &name,
                format!(
                    "error getting user data secret {} in namespace {}: {}",
                    reference.name, namespace, e
                ),
            ))
        }
    };

    let Some(blob) = data.get(USER_DATA_SECRET_KEY) else {
        return Err(Error::invalid_configuration(
            &name,
            format!(
                "secret {}/{} does not have \"{}\" field set. Thus, no user data applied when creating an instance",
                namespace, reference.name, USER_DATA_SECRET_KEY
            ),
        ));
    };

    String::from_utf8(blob.clone()).map(Some).map_err(|e| {
        Error::invalid_configuration(
            &name,
            format!(
                "user data in secret {}/{} is not valid UTF-8: {}",
                namespace, reference.name, e
            ),
        )
    })
}
