//! Step configuration panel state.
//!
//! Scalar fields commit straight to the graph store. Bindings are edited as
//! raw JSON through a draft buffer: the draft always holds what the user
//! typed, and only a JSON object ever reaches the step.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::service::AgentDefinition;
use crate::workflow::{Step, StepPatch, WorkflowDefinition};

#[derive(Debug, Error)]
pub enum BindingsError {
    #[error("bindings are not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("bindings must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// Parses a bindings document. Non-string values are stored as their JSON text.
pub fn parse_bindings(text: &str) -> Result<BTreeMap<String, String>, BindingsError> {
    let value: Value = serde_json::from_str(text)?;
    let map = match value {
        Value::Object(map) => map,
        Value::Array(_) => return Err(BindingsError::NotAnObject("an array")),
        Value::String(_) => return Err(BindingsError::NotAnObject("a string")),
        Value::Number(_) => return Err(BindingsError::NotAnObject("a number")),
        Value::Bool(_) => return Err(BindingsError::NotAnObject("a boolean")),
        Value::Null => return Err(BindingsError::NotAnObject("null")),
    };
    Ok(map
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(text) => text,
                other => other.to_string(),
            };
            (key, value)
        })
        .collect())
}

pub fn render_bindings(bindings: &BTreeMap<String, String>) -> String {
    serde_json::to_string_pretty(bindings).unwrap_or_else(|_| "{}".to_string())
}

/// Two-stage buffer behind the bindings editor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingsDraft {
    step_id: Option<String>,
    text: String,
    error: Option<String>,
}

impl BindingsDraft {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Stores the keystroke and returns the bindings to commit, if any.
    pub fn edit(&mut self, text: impl Into<String>) -> Option<BTreeMap<String, String>> {
        self.text = text.into();
        match parse_bindings(&self.text) {
            Ok(bindings) => {
                self.error = None;
                Some(bindings)
            }
            Err(err) => {
                self.error = Some(err.to_string());
                None
            }
        }
    }

    fn load(&mut self, step: Option<&Step>) {
        self.step_id = step.map(|step| step.id.clone());
        self.text = step
            .map(|step| render_bindings(&step.bindings))
            .unwrap_or_default();
        self.error = None;
    }
}

/// A single typed control on the panel. Each commits immediately.
#[derive(Debug, Clone, PartialEq)]
pub enum PanelEdit {
    Name(String),
    TimeoutSeconds(Option<u32>),
    Retries(Option<u32>),
    Agent(Option<String>),
    Fallback(Option<String>),
}

impl PanelEdit {
    pub fn into_patch(self) -> StepPatch {
        let patch = StepPatch::default();
        match self {
            PanelEdit::Name(name) => patch.name(name),
            PanelEdit::TimeoutSeconds(timeout) => patch.timeout_seconds(timeout),
            PanelEdit::Retries(retries) => patch.retries(retries),
            PanelEdit::Agent(agent) => patch.agent_id(agent),
            PanelEdit::Fallback(fallback) => patch.fallback_step_id(fallback),
        }
    }
}

/// Reads a numeric text control: empty clears the value, anything that is
/// not a non-negative integer is rejected (`None`).
pub fn parse_count_input(text: &str) -> Option<Option<u32>> {
    let text = text.trim();
    if text.is_empty() {
        return Some(None);
    }
    text.parse::<u32>().ok().map(Some)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub id: String,
    pub label: String,
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentSelector {
    Choices(Vec<Choice>),
    /// No agent directory available; the id is typed by hand.
    FreeText,
}

impl AgentSelector {
    pub fn from_directory(agents: Option<&[AgentDefinition]>) -> Self {
        match agents {
            Some(agents) if !agents.is_empty() => AgentSelector::Choices(
                agents
                    .iter()
                    .map(|agent| Choice {
                        id: agent.id.clone(),
                        label: agent.name.clone(),
                    })
                    .collect(),
            ),
            _ => AgentSelector::FreeText,
        }
    }
}

/// Every other step, as targets for the fallback selector.
pub fn fallback_candidates(definition: &WorkflowDefinition, step_id: &str) -> Vec<Choice> {
    definition
        .steps
        .iter()
        .filter(|step| step.id != step_id)
        .map(|step| Choice {
            id: step.id.clone(),
            label: format!("{} ({})", step.name, step.id),
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct StepPanel {
    draft: BindingsDraft,
}

impl StepPanel {
    pub fn step_id(&self) -> Option<&str> {
        self.draft.step_id.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.draft.step_id.is_some()
    }

    pub fn bindings(&self) -> &BindingsDraft {
        &self.draft
    }

    /// Follows the selection. The draft is reloaded only when the open step
    /// changes, so an invalid draft survives unrelated re-renders.
    pub fn sync(&mut self, selected: Option<&Step>) {
        let selected_id = selected.map(|step| step.id.as_str());
        if self.step_id() != selected_id {
            self.draft.load(selected);
        }
    }

    pub fn edit_bindings(&mut self, text: impl Into<String>) -> Option<StepPatch> {
        self.draft
            .edit(text)
            .map(|bindings| StepPatch::default().bindings(bindings))
    }

    pub fn close(&mut self) {
        self.draft.load(None);
    }
}
