//! Preemption monitor
//!
//! Polls the metadata server until the instance is scheduled for
//! termination, then marks the node with a `Terminating` condition so the
//! machine controllers can replace it.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use gantry_common::kube_utils::poll_until;
use gantry_common::{Error, Result};

use crate::node::{add_node_termination_condition, NodeStore};

/// Metadata server endpoint reporting whether the instance was preempted
pub const TERMINATION_ENDPOINT_URL: &str =
    "http://169.254.169.254/computeMetadata/v1/instance/preempted";

/// Default interval between endpoint checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Budget for marking the node once termination is seen
pub const DEFAULT_MARK_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between node marking attempts
pub const DEFAULT_MARK_INTERVAL: Duration = Duration::from_secs(1);

const METADATA_FLAVOR_HEADER: &str = "Metadata-Flavor";
const METADATA_FLAVOR: &str = "Google";

/// Settings of a [`TerminationHandler`]
#[derive(Clone, Debug)]
pub struct TerminationConfig {
    /// Node backed by this instance
    pub node_name: String,
    /// Namespace of the machine objects, carried for log context
    pub namespace: String,
    /// Interval between endpoint checks
    pub poll_interval: Duration,
    /// Termination endpoint
    pub poll_url: String,
    /// Budget for marking the node
    pub mark_timeout: Duration,
    /// Interval between marking attempts
    pub mark_interval: Duration,
}

impl TerminationConfig {
    /// Defaults for monitoring `node_name`
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            namespace: String::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_url: TERMINATION_ENDPOINT_URL.to_string(),
            mark_timeout: DEFAULT_MARK_TIMEOUT,
            mark_interval: DEFAULT_MARK_INTERVAL,
        }
    }
}

/// Watches the termination endpoint and marks the node when it fires
#[derive(Clone)]
pub struct TerminationHandler {
    node_store: Arc<dyn NodeStore>,
    http: reqwest::Client,
    config: TerminationConfig,
}

impl TerminationHandler {
    /// Create a handler writing node status through `node_store`
    pub fn new(node_store: Arc<dyn NodeStore>, config: TerminationConfig) -> Result<Self> {
        let http = reqwest::Client::builder().build().map_err(|e| {
            Error::internal_with_context("termination", format!("error creating client: {}", e))
        })?;
        Ok(Self {
            node_store,
            http,
            config,
        })
    }

    /// Run until the node has been marked or `stop` is cancelled.
    ///
    /// The polling runs on its own task. When `stop` fires first the task is
    /// cancelled and awaited, and its outcome is discarded.
    pub async fn run(&self, stop: CancellationToken) -> Result<()> {
        let token = CancellationToken::new();
        let handler = self.clone();
        let task_token = token.clone();
        let mut task = tokio::spawn(async move { handler.poll(task_token).await });

        tokio::select! {
            _ = stop.cancelled() => {
                debug!(node = %self.config.node_name, "Stop requested, waiting for poll task");
                token.cancel();
                if let Err(e) = task.await {
                    warn!(error = %e, "Termination poll task did not finish cleanly");
                }
                Ok(())
            }
            result = &mut task => {
                token.cancel();
                result.map_err(|e| {
                    Error::internal_with_context("termination", format!("poll task failed: {}", e))
                })?
            }
        }
    }

    async fn poll(&self, token: CancellationToken) -> Result<()> {
        let node = self.config.node_name.as_str();
        info!(node = %node, namespace = %self.config.namespace, "Monitoring node termination");

        let mut terminated = false;
        while !token.is_cancelled() {
            match self.check_termination_endpoint().await {
                Ok(true) => {
                    terminated = true;
                    break;
                }
                Ok(false) => debug!(node = %node, "Instance not marked for termination"),
                Err(e) => {
                    return Err(Error::gateway(format!(
                        "error polling termination endpoint: {}",
                        e
                    )))
                }
            }

            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        // cancelled before a clean signal: confirm once more
        if !terminated && !self.check_termination_endpoint().await? {
            return Ok(());
        }

        info!(node = %node, "Instance marked for termination, marking node for deletion");
        let this = self;
        poll_until(
            self.config.mark_timeout,
            self.config.mark_interval,
            "error marking node",
            move || async move {
                match this.mark_node_for_deletion().await {
                    Ok(()) => Ok(true),
                    Err(e) => {
                        warn!(
                            node = %this.config.node_name,
                            error = %e,
                            "Failed to mark node for termination"
                        );
                        Ok(false)
                    }
                }
            },
        )
        .await?;

        info!(node = %node, "Node marked as terminating");
        Ok(())
    }

    /// Whether the metadata server reports the instance as terminated.
    ///
    /// Only a body of exactly `TRUE` counts.
    pub async fn check_termination_endpoint(&self) -> Result<bool> {
        let url = self.config.poll_url.as_str();
        let response = self
            .http
            .get(url)
            .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR)
            .send()
            .await
            .map_err(|e| Error::http(url, format!("could not get URL: {}", e)))?;

        let body = response
            .text()
            .await
            .map_err(|e| Error::http(url, format!("failed to read response body: {}", e)))?;

        Ok(body == "TRUE")
    }

    async fn mark_node_for_deletion(&self) -> Result<()> {
        let mut node = self.node_store.get_node(&self.config.node_name).await?;
        add_node_termination_condition(&mut node);
        self.node_store.update_node_status(&node).await
    }
}
