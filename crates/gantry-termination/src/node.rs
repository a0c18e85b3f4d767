//! Node termination condition and node access

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::core::v1::{Node, NodeCondition};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::{Api, PostParams};
use kube::Client;

#[cfg(test)]
use mockall::automock;

use gantry_common::{Error, Result};

/// Node condition type set when the instance is scheduled for termination
pub const TERMINATING_CONDITION_TYPE: &str = "Terminating";

/// Reason of the terminating condition
pub const TERMINATION_REQUESTED_REASON: &str = "TerminationRequested";

/// Message of the terminating condition
pub const TERMINATION_REQUESTED_MESSAGE: &str =
    "The cloud provider has marked this instance for termination";

/// Mark `node` as terminating.
///
/// A `Terminating` condition that is already `True` is left untouched so its
/// timestamps survive repeated calls. Any other status is replaced by a fresh
/// `True` condition; a missing condition is appended.
pub fn add_node_termination_condition(node: &mut Node) {
    let now = Time(Utc::now());
    let condition = NodeCondition {
        type_: TERMINATING_CONDITION_TYPE.to_string(),
        status: "True".to_string(),
        last_heartbeat_time: Some(now.clone()),
        last_transition_time: Some(now),
        reason: Some(TERMINATION_REQUESTED_REASON.to_string()),
        message: Some(TERMINATION_REQUESTED_MESSAGE.to_string()),
    };

    let conditions = node
        .status
        .get_or_insert_with(Default::default)
        .conditions
        .get_or_insert_with(Vec::new);

    match conditions
        .iter_mut()
        .find(|c| c.type_ == TERMINATING_CONDITION_TYPE)
    {
        Some(existing) if existing.status == "True" => {}
        Some(existing) => *existing = condition,
        None => conditions.push(condition),
    }
}

/// Node reads and status writes
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Fetch a node by name
    async fn get_node(&self, name: &str) -> Result<Node>;

    /// Replace the status of a node
    async fn update_node_status(&self, node: &Node) -> Result<()>;
}

/// [`NodeStore`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeNodeStore {
    client: Client,
}

impl KubeNodeStore {
    /// Create a store using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NodeStore for KubeNodeStore {
    async fn get_node(&self, name: &str) -> Result<Node> {
        let api: Api<Node> = Api::all(self.client.clone());
        api.get(name).await.map_err(|e| {
            let resource = format!("node {}", name);
            match e {
                kube::Error::Api(ref ae) if ae.code == 404 => {
                    Error::fetch_not_found(resource, e.to_string())
                }
                _ => Error::fetch(resource, e.to_string()),
            }
        })
    }

    async fn update_node_status(&self, node: &Node) -> Result<()> {
        let name = node
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| Error::internal_with_context("termination", "node has no name"))?;
        let data = serde_json::to_vec(node)
            .map_err(|e| Error::serialization_for_kind("Node", e.to_string()))?;

        let api: Api<Node> = Api::all(self.client.clone());
        api.replace_status(name, &PostParams::default(), data)
            .await
            .map_err(|e| {
                Error::internal_with_context(
                    "termination",
                    format!("error updating node {} status: {}", name, e),
                )
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use k8s_openapi::api::core::v1::NodeStatus;

    fn node_with(conditions: Vec<NodeCondition>) -> Node {
        Node {
            status: Some(NodeStatus {
                conditions: Some(conditions),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn condition(type_: &str, status: &str, at: Time) -> NodeCondition {
        NodeCondition {
            type_: type_.to_string(),
            status: status.to_string(),
            last_heartbeat_time: Some(at.clone()),
            last_transition_time: Some(at),
            reason: Some("Old".to_string()),
            message: Some("old".to_string()),
        }
    }

    fn conditions(node: &Node) -> &[NodeCondition] {
        node.status
            .as_ref()
            .and_then(|s| s.conditions.as_deref())
            .unwrap_or_default()
    }

    #[test]
    fn appends_condition_to_bare_node() {
        let mut node = Node::default();
        add_node_termination_condition(&mut node);

        let conditions = conditions(&node);
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].type_, "Terminating");
        assert_eq!(conditions[0].status, "True");
        assert_eq!(conditions[0].reason.as_deref(), Some("TerminationRequested"));
        assert_eq!(
            conditions[0].message.as_deref(),
            Some("The cloud provider has marked this instance for termination")
        );
    }

    #[test]
    fn keeps_other_conditions() {
        let at = Time(Utc::now() - Duration::hours(1));
        let mut node = node_with(vec![condition("Ready", "True", at)]);
        add_node_termination_condition(&mut node);

        let conditions = conditions(&node);
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0].type_, "Ready");
        assert_eq!(conditions[1].type_, "Terminating");
    }

    #[test]
    fn true_condition_is_never_rewritten() {
        let at = Time(Utc::now() - Duration::hours(1));
        let mut node = node_with(vec![condition("Terminating", "True", at.clone())]);

        add_node_termination_condition(&mut node);
        add_node_termination_condition(&mut node);

        let conditions = conditions(&node);
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].last_transition_time, Some(at));
        assert_eq!(conditions[0].reason.as_deref(), Some("Old"));
    }

    #[test]
    fn false_condition_is_replaced() {
        let at = Time(Utc::now() - Duration::hours(1));
        let mut node = node_with(vec![condition("Terminating", "False", at.clone())]);

        add_node_termination_condition(&mut node);

        let conditions = conditions(&node);
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].status, "True");
        assert_eq!(conditions[0].reason.as_deref(), Some("TerminationRequested"));
        assert_ne!(conditions[0].last_transition_time, Some(at));
    }
}
