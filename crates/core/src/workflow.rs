//! ComfyUI workflow graph model and per-request materialization types.
//!
//! A workflow is an ordered mapping from node id to [`NodeDefinition`],
//! matching the ComfyUI API-format JSON document. The shared template is
//! never mutated; every request operates on a [`MaterializedJob`] deep
//! copy carrying its own [`OutputTag`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Node identifier within a workflow graph (ComfyUI uses numeric strings).
pub type NodeId = String;

/// An ordered workflow graph, keyed by node id.
pub type WorkflowGraph = BTreeMap<NodeId, NodeDefinition>;

/// Input key on the prompt node that receives the caller's text.
pub const PROMPT_INPUT: &str = "text";

/// Input key on the save node that controls artifact file naming.
pub const FILENAME_PREFIX_INPUT: &str = "filename_prefix";

/// A single node in the workflow graph.
///
/// `inputs` values may be scalars or `[node_id, slot]` references to other
/// nodes' outputs; both pass through untouched. Unknown sibling fields
/// (such as ComfyUI's `_meta`) are preserved via `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// The typed operation this node performs (e.g. `CLIPTextEncode`).
    pub class_type: String,
    /// Named inputs for the operation.
    #[serde(default)]
    pub inputs: serde_json::Map<String, Value>,
    /// Fields outside the node contract, carried through verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Unique correlator between a request and the artifact its job produces.
///
/// Rendered as 32 lowercase hex characters (a v4 UUID without hyphens),
/// collision-resistant across all concurrently in-flight requests within
/// any realistic artifact-retention window.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputTag(String);

impl OutputTag {
    /// Generate a fresh, globally unique tag.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OutputTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A request-scoped instantiation of the workflow template.
///
/// Owns an independent copy of the graph with the caller's parameters and
/// the request's [`OutputTag`] written in. Never aliases the shared
/// template or any other in-flight job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterializedJob {
    #[serde(flatten)]
    graph: WorkflowGraph,
}

impl MaterializedJob {
    pub(crate) fn new(graph: WorkflowGraph) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    /// Serialize to the engine's job-description format (the same JSON
    /// layout the template was loaded from).
    pub fn to_json_bytes(&self) -> Vec<u8> {
        // A BTreeMap of plain JSON values cannot fail to serialize.
        serde_json::to_vec(&self.graph).unwrap_or_default()
    }
}
