pub mod builder;
pub mod config;
pub mod error;
pub mod geometry;
pub mod interaction;
pub mod panel;
pub mod rules;
pub mod service;
pub mod validation;
pub mod workflow;

pub use builder::{Notice, NoticeLevel, SaveRequest, ValidationRequest, WorkflowBuilder};
pub use error::ServiceError;
pub use geometry::{CanvasView, Point};
pub use interaction::{CanvasInteraction, DropData, InteractionMode, Outcome, STEP_TYPE_MIME};
pub use panel::{AgentSelector, BindingsDraft, BindingsError, PanelEdit, StepPanel};
pub use service::{
    AgentDefinition, ApiResponse, HttpWorkflowService, Workflow, WorkflowPayload, WorkflowService,
};
pub use validation::{IssueOverlay, Severity, ValidationIssue, ValidationResult};
pub use workflow::{
    DefinitionError, Edge, EdgeKind, GraphStore, Step, StepPatch, StepType, Variable,
    WorkflowDefinition,
};
pub use schemars::JsonSchema;
