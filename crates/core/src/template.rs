//! Workflow template store: loading, node role discovery, and
//! per-request parameter injection.
//!
//! The template is a ComfyUI API-format JSON document loaded once at
//! startup. Two node roles are required: a prompt-injection node (a
//! `CLIPTextEncode` with a `text` input) and an output-naming node (a
//! `SaveImage` with a `filename_prefix` input). Role discovery is by
//! class type, with explicit node-id overrides for templates that carry
//! more than one candidate.

use std::path::Path;

use serde_json::Value;

use crate::error::CoreError;
use crate::workflow::{
    MaterializedJob, NodeId, OutputTag, WorkflowGraph, FILENAME_PREFIX_INPUT, PROMPT_INPUT,
};

/// Class type of the prompt-injection node.
pub const PROMPT_CLASS: &str = "CLIPTextEncode";

/// Class type of the output-naming node.
pub const SAVE_CLASS: &str = "SaveImage";

/// The single required request parameter.
pub const PROMPT_PARAM: &str = "prompt";

/// Explicit node-id assignments for templates where class-type discovery
/// is ambiguous (e.g. separate positive and negative prompt encoders).
#[derive(Debug, Clone, Default)]
pub struct RoleOverrides {
    pub prompt_node: Option<NodeId>,
    pub save_node: Option<NodeId>,
}

/// The canonical workflow template, shared read-only across all requests.
///
/// Loaded once at process start and held behind an `Arc`; all per-request
/// changes happen on the deep copy produced by [`WorkflowTemplate::materialize`].
#[derive(Debug, Clone)]
pub struct WorkflowTemplate {
    graph: WorkflowGraph,
    prompt_node: NodeId,
    save_node: NodeId,
}

impl WorkflowTemplate {
    /// Read and validate the template document at `path`.
    pub fn load(path: &Path, roles: &RoleOverrides) -> Result<Self, CoreError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Configuration(format!(
                "Cannot read workflow template {}: {e}",
                path.display()
            ))
        })?;

        let graph: WorkflowGraph = serde_json::from_str(&raw).map_err(|e| {
            CoreError::Configuration(format!(
                "Workflow template {} is not valid workflow JSON: {e}",
                path.display()
            ))
        })?;

        let template = Self::from_graph(graph, roles)?;
        tracing::info!(
            path = %path.display(),
            nodes = template.graph.len(),
            prompt_node = %template.prompt_node,
            save_node = %template.save_node,
            "Workflow template loaded",
        );
        Ok(template)
    }

    /// Validate a parsed graph and resolve its node roles.
    pub fn from_graph(graph: WorkflowGraph, roles: &RoleOverrides) -> Result<Self, CoreError> {
        let prompt_node = resolve_role(
            &graph,
            roles.prompt_node.as_deref(),
            PROMPT_CLASS,
            PROMPT_INPUT,
            "PROMPT_NODE_ID",
        )?;
        let save_node = resolve_role(
            &graph,
            roles.save_node.as_deref(),
            SAVE_CLASS,
            FILENAME_PREFIX_INPUT,
            "SAVE_NODE_ID",
        )?;

        Ok(Self {
            graph,
            prompt_node,
            save_node,
        })
    }

    /// Node id receiving the caller's prompt text.
    pub fn prompt_node(&self) -> &str {
        &self.prompt_node
    }

    /// Node id whose `filename_prefix` input names the artifact.
    pub fn save_node(&self) -> &str {
        &self.save_node
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    /// Produce a request-scoped job from caller parameters.
    ///
    /// Validates the parameter set (exactly `prompt`, a non-empty string),
    /// generates a fresh [`OutputTag`], and returns an independent copy of
    /// the graph with the prompt and tag written into their slots. The
    /// template itself is untouched.
    pub fn materialize(
        &self,
        params: &serde_json::Map<String, Value>,
    ) -> Result<(MaterializedJob, OutputTag), CoreError> {
        let prompt = validate_params(params)?;
        let tag = OutputTag::generate();

        let mut graph = self.graph.clone();

        // Role resolution guarantees both nodes exist.
        if let Some(node) = graph.get_mut(&self.prompt_node) {
            node.inputs
                .insert(PROMPT_INPUT.to_string(), Value::String(prompt.to_string()));
        }
        if let Some(node) = graph.get_mut(&self.save_node) {
            node.inputs.insert(
                FILENAME_PREFIX_INPUT.to_string(),
                Value::String(tag.as_str().to_string()),
            );
        }

        Ok((MaterializedJob::new(graph), tag))
    }
}

/// Check the caller's parameter map against the template contract and
/// return the prompt text.
///
/// Missing and unexpected keys are both rejected, listed by name, so
/// template slots and request bodies cannot drift apart silently.
fn validate_params(params: &serde_json::Map<String, Value>) -> Result<&str, CoreError> {
    let missing: Vec<&str> = if params.contains_key(PROMPT_PARAM) {
        Vec::new()
    } else {
        vec![PROMPT_PARAM]
    };
    let mut extra: Vec<&str> = params
        .keys()
        .filter(|k| k.as_str() != PROMPT_PARAM)
        .map(String::as_str)
        .collect();
    extra.sort_unstable();

    if !missing.is_empty() || !extra.is_empty() {
        let mut parts = Vec::new();
        if !missing.is_empty() {
            parts.push(format!("missing parameters: {}", missing.join(", ")));
        }
        if !extra.is_empty() {
            parts.push(format!("unexpected parameters: {}", extra.join(", ")));
        }
        return Err(CoreError::Validation(parts.join("; ")));
    }

    match params.get(PROMPT_PARAM) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s),
        Some(Value::String(_)) => Err(CoreError::Validation(
            "Parameter 'prompt' must not be empty".to_string(),
        )),
        _ => Err(CoreError::Validation(
            "Parameter 'prompt' must be a string".to_string(),
        )),
    }
}

/// Resolve a node role either from an explicit override or by scanning
/// for a unique node with the given class type and input key.
fn resolve_role(
    graph: &WorkflowGraph,
    override_id: Option<&str>,
    class_type: &str,
    input_key: &str,
    override_var: &str,
) -> Result<NodeId, CoreError> {
    if let Some(id) = override_id {
        let node = graph.get(id).ok_or_else(|| {
            CoreError::Configuration(format!(
                "{override_var} points at node '{id}', which is not in the template"
            ))
        })?;
        if node.class_type != class_type {
            return Err(CoreError::Configuration(format!(
                "{override_var} points at node '{id}' of class '{}', expected '{class_type}'",
                node.class_type
            )));
        }
        return Ok(id.to_string());
    }

    let mut candidates: Vec<&NodeId> = graph
        .iter()
        .filter(|(_, node)| node.class_type == class_type && node.inputs.contains_key(input_key))
        .map(|(id, _)| id)
        .collect();

    match candidates.len() {
        1 => Ok(candidates.remove(0).clone()),
        0 => Err(CoreError::Configuration(format!(
            "Template has no '{class_type}' node with a '{input_key}' input"
        ))),
        n => Err(CoreError::Configuration(format!(
            "Template has {n} '{class_type}' nodes; set {override_var} to disambiguate"
        ))),
    }
}
