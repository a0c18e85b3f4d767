//! Preemption handling for GCE nodes
//!
//! Runs on every node as a small daemon. When the metadata server reports
//! that the instance is being preempted, the node gets a `Terminating`
//! condition so the machine can be drained and replaced.

#![deny(missing_docs)]

pub mod handler;
pub mod node;

pub use handler::{
    TerminationConfig, TerminationHandler, DEFAULT_MARK_INTERVAL, DEFAULT_MARK_TIMEOUT,
    DEFAULT_POLL_INTERVAL, TERMINATION_ENDPOINT_URL,
};
pub use node::{add_node_termination_condition, KubeNodeStore, NodeStore};
