//! Compute Engine v1 REST resources
//!
//! Only the fields Gantry reads or writes are modelled. Field names follow
//! the REST API; unknown fields are ignored on input.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A VM instance
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub machine_type: String,

    /// PROVISIONING, STAGING, RUNNING, STOPPING, STOPPED, SUSPENDED, TERMINATED
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub self_link: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub network_interfaces: Vec<NetworkInterface>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disks: Vec<AttachedDisk>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub guest_accelerators: Vec<AcceleratorConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduling: Option<Scheduling>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Tags>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_accounts: Vec<ServiceAccount>,

    #[serde(default)]
    pub can_ip_forward: bool,

    #[serde(default)]
    pub deletion_protection: bool,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub network: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subnetwork: String,

    /// Primary internal address, assigned by the provider
    #[serde(rename = "networkIP", default, skip_serializing_if = "String::is_empty")]
    pub network_ip: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_configs: Vec<AccessConfig>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccessConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub type_: String,

    /// External address, assigned by the provider
    #[serde(rename = "natIP", default, skip_serializing_if = "String::is_empty")]
    pub nat_ip: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttachedDisk {
    #[serde(default)]
    pub auto_delete: bool,

    #[serde(default)]
    pub boot: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initialize_params: Option<AttachedDiskInitializeParams>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_encryption_key: Option<CustomerEncryptionKey>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttachedDiskInitializeParams {
    /// int64 fields travel as JSON strings in the Compute API
    #[serde(default, with = "int64_string", skip_serializing_if = "Option::is_none")]
    pub disk_size_gb: Option<i64>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub disk_type: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source_image: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CustomerEncryptionKey {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kms_key_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kms_key_service_account: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<MetadataItem>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct MetadataItem {
    pub key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AcceleratorConfig {
    pub accelerator_type: String,
    pub accelerator_count: i32,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Scheduling {
    #[serde(default)]
    pub preemptible: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automatic_restart: Option<bool>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub on_host_maintenance: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Tags {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ServiceAccount {
    pub email: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
}

/// Long running operation handle returned by mutating calls
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(default)]
    pub name: String,

    /// PENDING, RUNNING or DONE
    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub operation_type: String,

    #[serde(default)]
    pub target_link: String,
}

/// Unmanaged zonal instance group
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct InstanceGroup {
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub network: String,
}

/// Target pool (network load balancer backend)
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct TargetPool {
    #[serde(default)]
    pub name: String,

    /// Self links of member instances
    #[serde(default)]
    pub instances: Vec<String>,
}

/// Reference to an instance by self link
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct InstanceReference {
    pub instance: String,
}

/// Instance entry in an instance group listing
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct InstanceWithNamedPorts {
    pub instance: String,

    #[serde(default)]
    pub status: String,
}

mod int64_string {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<i64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_str(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Str(String),
            Num(i64),
        }

        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Raw::Num(n)) => Ok(Some(n)),
            Some(Raw::Str(s)) => s.parse().map(Some).map_err(de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_parses_rest_payload() {
        let json = serde_json::json!({
            "name": "worker-a",
            "status": "RUNNING",
            "id": "1234567890",
            "selfLink": "https://www.googleapis.com/compute/v1/projects/p/zones/z/instances/worker-a",
            "networkInterfaces": [{
                "network": "projects/p/global/networks/default",
                "networkIP": "10.0.0.15",
                "accessConfigs": [{"name": "External NAT", "type": "ONE_TO_ONE_NAT", "natIP": "35.243.147.143"}]
            }],
            "disks": [{"boot": true, "autoDelete": true, "kind": "compute#attachedDisk"}]
        });

        let instance: Instance = serde_json::from_value(json).expect("instance should parse");
        assert_eq!(instance.network_interfaces[0].network_ip, "10.0.0.15");
        assert_eq!(
            instance.network_interfaces[0].access_configs[0].nat_ip,
            "35.243.147.143"
        );
        assert!(instance.disks[0].boot);
    }

    #[test]
    fn disk_size_travels_as_string() {
        let params = AttachedDiskInitializeParams {
            disk_size_gb: Some(128),
            ..Default::default()
        };
        let value = serde_json::to_value(&params).expect("serialize");
        assert_eq!(value["diskSizeGb"], serde_json::json!("128"));

        let back: AttachedDiskInitializeParams =
            serde_json::from_value(serde_json::json!({"diskSizeGb": 64})).expect("numeric size");
        assert_eq!(back.disk_size_gb, Some(64));
    }
}
