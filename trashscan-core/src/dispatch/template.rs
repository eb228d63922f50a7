use std::collections::BTreeMap;
use std::path::Path;

use serde_json::{Map, Value};

use crate::config::EngineNodes;
use crate::error::{PipelineError, Result};
use crate::viewpoint::ViewpointSet;

/// A filled job ready for submission.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderJob {
    /// Session folder the job was built from.
    pub folder: String,
    /// Output-name slot value written into the template.
    pub output_prefix: String,
    pub workflow: Value,
}

impl RenderJob {
    /// Request body expected by the engine's submission endpoint.
    pub fn body(&self) -> Value {
        serde_json::json!({ "prompt": self.workflow })
    }
}

/// Job template whose configured node ids were checked at load time.
#[derive(Clone, Debug)]
pub struct JobTemplate {
    workflow: Map<String, Value>,
    /// Viewpoint name -> node id, restricted to the active viewpoints.
    image_nodes: BTreeMap<String, String>,
    output_node: String,
    image_key: String,
    prefix_key: String,
}

impl JobTemplate {
    pub fn load(path: &Path, nodes: &EngineNodes, views: &ViewpointSet) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| PipelineError::io_at(path, err))?;
        let value: Value = serde_json::from_str(&raw).map_err(|err| {
            PipelineError::Template(format!("{} is not valid JSON: {err}", path.display()))
        })?;
        Self::from_value(value, nodes, views)
    }

    pub fn from_value(value: Value, nodes: &EngineNodes, views: &ViewpointSet) -> Result<Self> {
        let Value::Object(workflow) = value else {
            return Err(PipelineError::Template(
                "top level must map node ids to node definitions".into(),
            ));
        };

        let mut image_nodes = BTreeMap::new();
        for view in views {
            let node = nodes.images.get(&view.name).ok_or_else(|| {
                PipelineError::Template(format!("no image node configured for viewpoint {view}"))
            })?;
            require_inputs(&workflow, node)?;
            image_nodes.insert(view.name.clone(), node.clone());
        }
        require_inputs(&workflow, &nodes.output)?;

        Ok(Self {
            workflow,
            image_nodes,
            output_node: nodes.output.clone(),
            image_key: nodes.image_key.clone(),
            prefix_key: nodes.prefix_key.clone(),
        })
    }

    /// Fill the image slots and the output-name slot.
    ///
    /// `images` maps viewpoint name to the file name the engine will read.
    pub fn render(
        &self,
        folder: &str,
        images: &BTreeMap<String, String>,
        output_prefix: &str,
    ) -> Result<RenderJob> {
        let mut workflow = self.workflow.clone();

        for (view, node) in &self.image_nodes {
            let file = images.get(view).ok_or_else(|| {
                PipelineError::Internal(format!("no image supplied for viewpoint {view}"))
            })?;
            set_input(&mut workflow, node, &self.image_key, file)?;
        }
        set_input(&mut workflow, &self.output_node, &self.prefix_key, output_prefix)?;

        Ok(RenderJob {
            folder: folder.to_string(),
            output_prefix: output_prefix.to_string(),
            workflow: Value::Object(workflow),
        })
    }
}

fn require_inputs(workflow: &Map<String, Value>, node: &str) -> Result<()> {
    match workflow.get(node) {
        None => Err(PipelineError::Template(format!("node {node} not found"))),
        Some(def) if def.get("inputs").is_some_and(Value::is_object) => Ok(()),
        Some(_) => Err(PipelineError::Template(format!(
            "node {node} has no inputs object"
        ))),
    }
}

fn set_input(workflow: &mut Map<String, Value>, node: &str, key: &str, value: &str) -> Result<()> {
    let inputs = workflow
        .get_mut(node)
        .and_then(|def| def.get_mut("inputs"))
        .and_then(Value::as_object_mut)
        .ok_or_else(|| PipelineError::Template(format!("node {node} has no inputs object")))?;
    inputs.insert(key.to_string(), Value::String(value.to_string()));
    Ok(())
}
