//! Error types for the volume topology

use thiserror::Error;

use crate::topology::{NodeHandle, NodeKind};

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while maintaining or querying the topology
///
/// Expected absences (no capacity, unknown child id, duplicate attach) are
/// reported through `Option`/`bool` results instead. The variants below are
/// programmer errors or bad input.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Tree Structure Errors
    // =========================================================================
    /// Handle does not refer to a live node
    #[error("Node not found: {0}")]
    NodeNotFound(NodeHandle),

    /// A leaf-only operation was invoked on a group node
    #[error("Node {node} is not a data node")]
    NotADataNode { node: String },

    /// A child was attached under a leaf
    #[error("Node {node} cannot hold children")]
    NotAGroup { node: String },

    /// A child kind is not allowed under its parent's kind
    #[error("{child_kind} {child} cannot be placed under {parent_kind} {parent}")]
    UnexpectedNodeKind {
        parent: String,
        parent_kind: NodeKind,
        child: String,
        child_kind: NodeKind,
    },

    /// The node is already linked under some parent
    #[error("Node {node} is already attached to {parent}")]
    AlreadyAttached { node: String, parent: String },

    /// Linking would make a node its own ancestor
    #[error("Linking {node} under {parent} would create a cycle")]
    WouldCreateCycle { node: String, parent: String },

    /// Only detached, non-root subtrees can be released
    #[error("Node {node} is still attached and cannot be released")]
    StillAttached { node: String },

    // =========================================================================
    // Configuration / Input Errors
    // =========================================================================
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// YAML parse error
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // =========================================================================
    // Metrics Errors
    // =========================================================================
    /// Prometheus registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
