use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::geometry::Point;

pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("failed to parse workflow YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to parse workflow JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown step type: {0}")]
    UnknownStepType(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub variables: Vec<Variable>,
}

impl Default for WorkflowDefinition {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            steps: Vec::new(),
            edges: Vec::new(),
            variables: Vec::new(),
        }
    }
}

impl WorkflowDefinition {
    pub fn from_yaml_str(input: &str) -> Result<Self, DefinitionError> {
        Ok(serde_yaml::from_str(input)?)
    }

    pub fn to_yaml_string(&self) -> Result<String, DefinitionError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn from_json_str(input: &str) -> Result<Self, DefinitionError> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn to_json_string_pretty(&self) -> Result<String, DefinitionError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// JSON Schema for the on-the-wire shape, for external validators and editors.
    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(WorkflowDefinition)
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|step| step.id == id)
    }

    pub fn contains_step(&self, id: &str) -> bool {
        self.step(id).is_some()
    }

    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.edges
            .iter()
            .any(|edge| edge.from_step_id == from && edge.to_step_id == to)
    }

    /// Edges leaving `id`, in insertion order.
    pub fn outgoing<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |edge| edge.from_step_id == id)
    }

    pub fn incoming<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |edge| edge.to_step_id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    AgentTask,
    Script,
    Condition,
    HttpRequest,
    Delay,
}

/// Which configuration controls are meaningful for a step type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepFields {
    pub agent: bool,
    pub timeout: bool,
    pub retries: bool,
    pub fallback: bool,
}

impl StepType {
    pub const ALL: [StepType; 5] = [
        StepType::AgentTask,
        StepType::Script,
        StepType::Condition,
        StepType::HttpRequest,
        StepType::Delay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::AgentTask => "agent_task",
            StepType::Script => "script",
            StepType::Condition => "condition",
            StepType::HttpRequest => "http_request",
            StepType::Delay => "delay",
        }
    }

    pub fn default_name(&self) -> &'static str {
        match self {
            StepType::AgentTask => "Agent task",
            StepType::Script => "Script",
            StepType::Condition => "Condition",
            StepType::HttpRequest => "HTTP request",
            StepType::Delay => "Delay",
        }
    }

    pub fn fields(&self) -> StepFields {
        match self {
            StepType::AgentTask => StepFields {
                agent: true,
                timeout: true,
                retries: true,
                fallback: true,
            },
            StepType::Script | StepType::HttpRequest => StepFields {
                agent: false,
                timeout: true,
                retries: true,
                fallback: true,
            },
            StepType::Condition => StepFields {
                agent: false,
                timeout: false,
                retries: false,
                fallback: true,
            },
            StepType::Delay => StepFields {
                agent: false,
                timeout: true,
                retries: false,
                fallback: false,
            },
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepType {
    type Err = DefinitionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        StepType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value.trim())
            .ok_or_else(|| DefinitionError::UnknownStepType(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub name: String,
    #[serde(default)]
    pub position: Point,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bindings: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_step_id: Option<String>,
}

impl Step {
    pub fn new(id: impl Into<String>, step_type: StepType) -> Self {
        Self {
            id: id.into(),
            step_type,
            name: step_type.default_name().to_string(),
            position: Point::ORIGIN,
            bindings: BTreeMap::new(),
            timeout_seconds: None,
            retries: None,
            agent_id: None,
            fallback_step_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    #[default]
    Dependency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub from_step_id: String,
    pub to_step_id: String,
    #[serde(default)]
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

impl Variable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value_type: None,
            description: None,
            default_value: None,
        }
    }
}
