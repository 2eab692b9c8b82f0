//! Top-level editor state: the workflow being edited, the canvas view,
//! selection/linking, the last validation result and save/validate status.
//!
//! Every graph mutation goes through this type so the stored validation
//! result can be dropped the moment the graph it describes changes.
//!
//! `validate` and `save` have split forms (`begin_*` / `finish_*`) for front
//! ends that run the collaborator future on their own executor. Each
//! validation request carries a ticket and the store revision it was
//! issued for; a response is applied only when it answers the latest
//! request and the graph has not changed since.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::ServiceError;
use crate::geometry::{CanvasView, Point};
use crate::interaction::{CanvasInteraction, DropData, Outcome};
use crate::panel::{AgentSelector, PanelEdit, StepPanel};
use crate::service::{AgentDefinition, Workflow, WorkflowPayload, WorkflowService};
use crate::validation::{IssueOverlay, ValidationResult};
use crate::workflow::{GraphStore, Step, StepPatch, StepType, Variable, WorkflowDefinition};

pub const NAME_REQUIRED: &str = "Workflow name is required";

/// Undrained notices beyond this are discarded oldest first.
pub const MAX_PENDING_NOTICES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// Transient notification (toast).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationRequest {
    ticket: u64,
    revision: u64,
    pub definition: Arc<WorkflowDefinition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaveRequest {
    ticket: u64,
    /// `None` creates a new workflow, `Some` updates it.
    pub workflow_id: Option<String>,
    pub payload: WorkflowPayload,
}

#[derive(Debug, Default)]
pub struct WorkflowBuilder {
    workflow_id: Option<String>,
    name: String,
    description: String,
    store: GraphStore,
    view: CanvasView,
    interaction: CanvasInteraction,
    panel: StepPanel,
    agents: Option<Vec<AgentDefinition>>,
    validation: Option<ValidationResult>,
    validating: bool,
    saving: bool,
    name_error: Option<String>,
    notices: VecDeque<Notice>,
    issued_validations: u64,
    issued_saves: u64,
}

impl WorkflowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_definition(name: impl Into<String>, definition: WorkflowDefinition) -> Self {
        Self {
            name: name.into(),
            store: GraphStore::new(definition),
            ..Self::default()
        }
    }

    /// Opens a stored workflow; subsequent saves update it.
    pub fn open(&mut self, workflow: Workflow) {
        info!(workflow = %workflow.id, "opened workflow");
        // A save still in flight belongs to the previous record.
        self.issued_saves += 1;
        self.saving = false;
        self.workflow_id = Some(workflow.id);
        self.name = workflow.name;
        self.description = workflow.description.unwrap_or_default();
        self.store.replace(workflow.definition);
        self.interaction.reset();
        self.panel.close();
        self.validation = None;
        self.name_error = None;
    }

    /// Replaces the graph, e.g. from an imported file. The workflow record
    /// (id, name) is kept so the next save overwrites it.
    pub fn import_definition(&mut self, definition: WorkflowDefinition) {
        self.store.replace(definition);
        self.interaction.reset();
        self.panel.close();
        self.invalidate_validation();
    }

    pub fn workflow_id(&self) -> Option<&str> {
        self.workflow_id.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        if !self.name.trim().is_empty() {
            self.name_error = None;
        }
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn name_error(&self) -> Option<&str> {
        self.name_error.as_deref()
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn definition(&self) -> &WorkflowDefinition {
        self.store.definition()
    }

    pub fn view(&self) -> &CanvasView {
        &self.view
    }

    pub fn interaction(&self) -> &CanvasInteraction {
        &self.interaction
    }

    pub fn panel(&self) -> &StepPanel {
        &self.panel
    }

    pub fn selected_step(&self) -> Option<&Step> {
        self.interaction
            .selected()
            .and_then(|id| self.store.step(id))
    }

    pub fn linking_from(&self) -> Option<&str> {
        self.interaction.linking_from()
    }

    pub fn validation(&self) -> Option<&ValidationResult> {
        self.validation.as_ref()
    }

    pub fn is_validating(&self) -> bool {
        self.validating
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    /// Issue badges and lists for the current result and selection.
    pub fn overlay(&self) -> IssueOverlay<'_> {
        IssueOverlay::derive(self.validation.as_ref(), self.interaction.selected())
    }

    pub fn agent_selector(&self) -> AgentSelector {
        AgentSelector::from_directory(self.agents.as_deref())
    }

    pub fn set_agents(&mut self, agents: Option<Vec<AgentDefinition>>) {
        self.agents = agents;
    }

    pub fn notices(&self) -> impl Iterator<Item = &Notice> {
        self.notices.iter()
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        self.notices.drain(..).collect()
    }

    // Graph mutations. Each one drops the stored validation result.

    /// Palette click: adds a step at the staggered default position and selects it.
    pub fn add_step(&mut self, step_type: StepType) -> Step {
        let step = self.store.add_step(step_type, None);
        self.invalidate_validation();
        self.interaction.select(Some(step.id.clone()));
        self.sync_panel();
        step
    }

    pub fn drop_step(&mut self, data: &DropData, screen: Point) -> Option<Step> {
        let step = self
            .interaction
            .drop_payload(data, screen, &mut self.store, &self.view)?;
        self.invalidate_validation();
        Some(step)
    }

    pub fn update_step(&mut self, id: &str, patch: StepPatch) -> bool {
        let changed = self.store.update_step(id, patch);
        self.invalidate_validation();
        changed
    }

    pub fn move_step(&mut self, id: &str, position: Point) -> bool {
        let changed = self.store.move_step(id, position);
        self.invalidate_validation();
        changed
    }

    pub fn delete_step(&mut self, id: &str) -> bool {
        let deleted = self.store.delete_step(id);
        self.interaction.forget_step(id);
        self.invalidate_validation();
        self.sync_panel();
        deleted
    }

    pub fn delete_selected(&mut self) -> bool {
        match self.interaction.selected().map(str::to_string) {
            Some(id) => self.delete_step(&id),
            None => false,
        }
    }

    pub fn create_edge(&mut self, from: &str, to: &str) -> bool {
        let created = self.store.create_edge(from, to).is_some();
        self.invalidate_validation();
        created
    }

    pub fn delete_edge(&mut self, id: &str) -> bool {
        let deleted = self.store.delete_edge(id);
        self.invalidate_validation();
        deleted
    }

    pub fn add_variable(&mut self, variable: Variable) {
        self.store.add_variable(variable);
        self.invalidate_validation();
    }

    pub fn update_variable(&mut self, index: usize, variable: Variable) -> bool {
        let updated = self.store.update_variable(index, variable);
        self.invalidate_validation();
        updated
    }

    pub fn remove_variable(&mut self, index: usize) -> Option<Variable> {
        let removed = self.store.remove_variable(index);
        self.invalidate_validation();
        removed
    }

    // Canvas events.

    pub fn pointer_down(&mut self, screen: Point) -> Outcome {
        let outcome = self
            .interaction
            .pointer_down(screen, &mut self.store, &self.view);
        self.apply(outcome)
    }

    pub fn pointer_move(&mut self, screen: Point) -> Outcome {
        let outcome = self
            .interaction
            .pointer_move(screen, &mut self.store, &mut self.view);
        self.apply(outcome)
    }

    pub fn pointer_up(&mut self) -> Outcome {
        let outcome = self.interaction.pointer_up();
        self.apply(outcome)
    }

    pub fn wheel(&mut self, delta_y: f32) -> Outcome {
        self.interaction.wheel(delta_y, &mut self.view)
    }

    pub fn select(&mut self, step_id: Option<String>) {
        self.interaction.select(step_id);
        self.sync_panel();
    }

    // Panel affordances.

    /// "Link from this step" on the open step.
    pub fn start_linking(&mut self) -> bool {
        match self.panel.step_id().map(str::to_string) {
            Some(id) => self.interaction.start_linking(&id, &self.store),
            None => false,
        }
    }

    pub fn cancel_linking(&mut self) -> bool {
        self.interaction.cancel_linking()
    }

    /// Commits a scalar field of the open step.
    pub fn edit_step(&mut self, edit: PanelEdit) -> bool {
        let Some(id) = self.panel.step_id().map(str::to_string) else {
            return false;
        };
        self.update_step(&id, edit.into_patch())
    }

    /// Feeds a keystroke to the bindings editor; commits only JSON objects.
    pub fn edit_bindings(&mut self, text: impl Into<String>) -> bool {
        let Some(id) = self.panel.step_id().map(str::to_string) else {
            return false;
        };
        match self.panel.edit_bindings(text) {
            Some(patch) => self.update_step(&id, patch),
            None => false,
        }
    }

    // Collaborators.

    pub fn begin_validate(&mut self) -> ValidationRequest {
        self.issued_validations += 1;
        self.validating = true;
        ValidationRequest {
            ticket: self.issued_validations,
            revision: self.store.revision(),
            definition: self.store.snapshot(),
        }
    }

    pub fn finish_validate(
        &mut self,
        request: &ValidationRequest,
        result: Result<ValidationResult, ServiceError>,
    ) {
        if request.ticket != self.issued_validations {
            warn!(ticket = request.ticket, latest = self.issued_validations, "dropping superseded validation response");
            return;
        }
        self.validating = false;

        match result {
            Ok(_) if request.revision != self.store.revision() => {
                warn!("dropping validation response for an outdated graph");
                self.push_notice(
                    NoticeLevel::Info,
                    "Workflow changed while validating; validate again",
                );
            }
            Ok(result) => {
                info!(valid = result.valid, issues = result.issues.len(), "validation finished");
                if result.valid {
                    self.push_notice(NoticeLevel::Success, "Workflow is valid");
                } else {
                    self.push_notice(
                        NoticeLevel::Error,
                        format!("Validation found {} issue(s)", result.issues.len()),
                    );
                }
                self.validation = Some(result);
            }
            Err(err) => {
                warn!(error = %err, "validation request failed");
                self.push_notice(NoticeLevel::Error, format!("Validation failed: {err}"));
            }
        }
    }

    pub async fn validate(&mut self, service: &dyn WorkflowService) {
        let request = self.begin_validate();
        let result = service.validate(&request.definition).await;
        self.finish_validate(&request, result);
    }

    /// `None` when the name is blank; the inline error is set instead.
    pub fn begin_save(&mut self) -> Option<SaveRequest> {
        let name = self.name.trim();
        if name.is_empty() {
            self.name_error = Some(NAME_REQUIRED.to_string());
            return None;
        }
        self.name_error = None;
        self.saving = true;
        self.issued_saves += 1;

        let description = self.description.trim();
        Some(SaveRequest {
            ticket: self.issued_saves,
            workflow_id: self.workflow_id.clone(),
            payload: WorkflowPayload {
                name: name.to_string(),
                description: (!description.is_empty()).then(|| description.to_string()),
                definition: self.store.definition().clone(),
            },
        })
    }

    /// A response for a request issued before the latest save or `open` is
    /// reported but never re-points the editor at its workflow.
    pub fn finish_save(&mut self, request: &SaveRequest, result: Result<Workflow, ServiceError>) {
        let current = request.ticket == self.issued_saves;
        if current {
            self.saving = false;
        }
        match result {
            Ok(workflow) if !current => {
                warn!(workflow = %workflow.id, ticket = request.ticket, "save finished for a workflow no longer being edited");
                self.push_notice(NoticeLevel::Success, format!("Saved {}", request.payload.name));
            }
            Ok(workflow) => {
                let created = request.workflow_id.is_none();
                info!(workflow = %workflow.id, created, "workflow saved");
                self.workflow_id = Some(workflow.id);
                let message = if created {
                    "Workflow created"
                } else {
                    "Workflow saved"
                };
                self.push_notice(NoticeLevel::Success, message);
            }
            Err(err) => {
                warn!(error = %err, "saving workflow failed");
                self.push_notice(NoticeLevel::Error, format!("Save failed: {err}"));
            }
        }
    }

    pub async fn save(&mut self, service: &dyn WorkflowService) {
        let Some(request) = self.begin_save() else {
            return;
        };
        let result = match &request.workflow_id {
            Some(id) => service.update_workflow(id, &request.payload).await,
            None => service.create_workflow(&request.payload).await,
        };
        self.finish_save(&request, result);
    }

    /// Fills the agent selector. Failure leaves it in free-text mode.
    pub async fn load_agents(&mut self, service: &dyn WorkflowService) {
        match service.list_agent_definitions().await {
            Ok(agents) => {
                debug!(count = agents.len(), "loaded agent directory");
                self.agents = Some(agents);
            }
            Err(err) => {
                debug!(error = %err, "agent directory unavailable");
                self.agents = None;
            }
        }
    }

    fn apply(&mut self, outcome: Outcome) -> Outcome {
        if outcome.graph_changed {
            self.invalidate_validation();
        }
        if outcome.selection_changed || outcome.graph_changed {
            self.sync_panel();
        }
        outcome
    }

    fn sync_panel(&mut self) {
        let selected = self
            .interaction
            .selected()
            .and_then(|id| self.store.step(id));
        self.panel.sync(selected);
    }

    fn invalidate_validation(&mut self) {
        if self.validation.take().is_some() {
            debug!("cleared validation result for changed graph");
        }
    }

    fn push_notice(&mut self, level: NoticeLevel, message: impl Into<String>) {
        if self.notices.len() == MAX_PENDING_NOTICES {
            self.notices.pop_front();
        }
        self.notices.push_back(Notice::new(level, message));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::validation::ValidationIssue;
    use crate::workflow::{Edge, EdgeKind};

    #[derive(Default)]
    struct ScriptedService {
        results: Mutex<Vec<Result<ValidationResult, ServiceError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedService {
        fn with_results(results: Vec<Result<ValidationResult, ServiceError>>) -> Self {
            Self {
                results: Mutex::new(results),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl WorkflowService for ScriptedService {
        async fn validate(
            &self,
            _definition: &WorkflowDefinition,
        ) -> Result<ValidationResult, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.results.lock().unwrap().remove(0)
        }

        async fn create_workflow(&self, payload: &WorkflowPayload) -> Result<Workflow, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Workflow {
                id: "wf_1".to_string(),
                name: payload.name.clone(),
                description: payload.description.clone(),
                definition: payload.definition.clone(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
        }

        async fn update_workflow(
            &self,
            _id: &str,
            _payload: &WorkflowPayload,
        ) -> Result<Workflow, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ServiceError::Api {
                status: 503,
                message: "store offline".to_string(),
            })
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn failing_result() -> ValidationResult {
        ValidationResult {
            valid: false,
            issues: vec![ValidationIssue::error("missing agent").for_step("step_1")],
        }
    }

    #[tokio::test]
    async fn validate_stores_result_and_notifies() {
        let service = ScriptedService::with_results(vec![Ok(failing_result())]);
        let mut builder = WorkflowBuilder::new();
        builder.add_step(StepType::AgentTask);

        builder.validate(&service).await;
        assert!(!builder.is_validating());
        assert_eq!(builder.overlay().badge("step_1"), Some(1));
        let notices = builder.drain_notices();
        assert_eq!(notices[0].level, NoticeLevel::Error);
        assert!(notices[0].message.contains("1 issue"));
    }

    #[tokio::test]
    async fn transport_failure_keeps_previous_result() {
        let service = ScriptedService::with_results(vec![
            Ok(failing_result()),
            Err(ServiceError::InvalidResponse("boom")),
        ]);
        let mut builder = WorkflowBuilder::new();
        builder.add_step(StepType::AgentTask);

        builder.validate(&service).await;
        builder.validate(&service).await;
        assert_eq!(builder.validation(), Some(&failing_result()));
        let last = builder.drain_notices().pop().unwrap();
        assert_eq!(last.level, NoticeLevel::Error);
        assert!(last.message.starts_with("Validation failed"));
    }

    #[tokio::test]
    async fn mutations_clear_stored_validation() {
        let mut builder = WorkflowBuilder::new();
        let a = builder.add_step(StepType::AgentTask);
        let b = builder.add_step(StepType::Script);

        let mutations: Vec<Box<dyn Fn(&mut WorkflowBuilder)>> = vec![
            Box::new(|b: &mut WorkflowBuilder| {
                b.update_step("step_1", StepPatch::default().name("renamed"));
            }),
            Box::new(|b: &mut WorkflowBuilder| {
                b.move_step("step_1", Point::new(600.0, 600.0));
            }),
            Box::new(|b: &mut WorkflowBuilder| {
                b.create_edge("step_1", "step_2");
            }),
            Box::new(|b: &mut WorkflowBuilder| {
                b.delete_step("step_2");
            }),
        ];
        assert_eq!((a.id.as_str(), b.id.as_str()), ("step_1", "step_2"));

        for mutate in mutations {
            let service = ScriptedService::with_results(vec![Ok(failing_result())]);
            builder.validate(&service).await;
            assert!(builder.validation().is_some());
            mutate(&mut builder);
            assert!(builder.validation().is_none());
            assert!(builder.overlay().by_step.is_empty());
        }
    }

    #[test]
    fn superseded_and_outdated_responses_are_dropped() {
        let mut builder = WorkflowBuilder::new();
        builder.add_step(StepType::Script);

        let first = builder.begin_validate();
        let second = builder.begin_validate();
        builder.finish_validate(&second, Ok(ValidationResult::from_issues(vec![])));
        builder.finish_validate(&first, Ok(failing_result()));
        assert_eq!(builder.validation().map(|r| r.valid), Some(true));

        let third = builder.begin_validate();
        builder.move_step("step_1", Point::new(500.0, 500.0));
        builder.finish_validate(&third, Ok(failing_result()));
        assert!(builder.validation().is_none());
        assert!(!builder.is_validating());
        assert_eq!(
            builder.drain_notices().last().map(|n| n.level),
            Some(NoticeLevel::Info)
        );
    }

    #[tokio::test]
    async fn save_requires_a_name() {
        let service = ScriptedService::default();
        let mut builder = WorkflowBuilder::new();
        builder.set_name("   ");

        builder.save(&service).await;
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
        assert_eq!(builder.name_error(), Some(NAME_REQUIRED));
        assert!(builder.drain_notices().is_empty());
        assert!(!builder.is_saving());

        builder.set_name("Triage");
        assert_eq!(builder.name_error(), None);
    }

    #[tokio::test]
    async fn save_creates_then_updates() {
        let service = ScriptedService::default();
        let mut builder = WorkflowBuilder::new();
        builder.set_name(" Triage ");
        builder.set_description("  ");

        let request = builder.begin_save().expect("request");
        assert_eq!(request.workflow_id, None);
        assert_eq!(request.payload.name, "Triage");
        assert_eq!(request.payload.description, None);
        builder.finish_save(&request, Err(ServiceError::InvalidResponse("reset")));
        assert_eq!(builder.workflow_id(), None);

        builder.save(&service).await;
        assert_eq!(builder.workflow_id(), Some("wf_1"));

        builder.save(&service).await;
        let notices = builder.drain_notices();
        assert_eq!(notices.len(), 3);
        assert_eq!(notices[1].message, "Workflow created");
        assert_eq!(notices[2].level, NoticeLevel::Error);
        assert!(notices[2].message.contains("store offline"));
        assert_eq!(service.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_agent_directory_degrades_to_free_text() {
        let service = ScriptedService::default();
        let mut builder = WorkflowBuilder::new();
        builder.load_agents(&service).await;
        assert_eq!(builder.agent_selector(), AgentSelector::FreeText);
    }

    #[test]
    fn panel_follows_selection_and_deletion() {
        let mut builder = WorkflowBuilder::new();
        let step = builder.add_step(StepType::AgentTask);
        assert_eq!(builder.panel().step_id(), Some(step.id.as_str()));

        assert!(builder.edit_step(PanelEdit::Agent(Some("triage".to_string()))));
        assert!(!builder.edit_bindings(r#"{"ticket":"#));
        assert!(builder.panel().bindings().error().is_some());
        assert!(builder.selected_step().unwrap().bindings.is_empty());

        assert!(builder.edit_bindings(r#"{"ticket": 42}"#));
        let selected = builder.selected_step().unwrap();
        assert_eq!(selected.bindings["ticket"], "42");
        assert_eq!(selected.agent_id.as_deref(), Some("triage"));

        assert!(builder.delete_selected());
        assert!(!builder.panel().is_open());
        assert!(builder.selected_step().is_none());
        assert!(!builder.edit_step(PanelEdit::Name("x".to_string())));
    }

    #[test]
    fn linking_through_the_panel() {
        let mut builder = WorkflowBuilder::new();
        let a = builder.add_step(StepType::AgentTask);
        let b = builder.add_step(StepType::Script);
        builder.select(Some(a.id.clone()));
        assert!(builder.start_linking());
        assert_eq!(builder.linking_from(), Some(a.id.as_str()));

        // Step b sits at (220, 180) with the default view.
        builder.pointer_down(Point::new(230.0, 190.0));
        builder.pointer_up();
        assert!(builder.definition().has_edge(&a.id, &b.id));
        assert_eq!(builder.linking_from(), None);
        assert_eq!(builder.panel().step_id(), Some(b.id.as_str()));

        builder.select(Some(b.id.clone()));
        builder.start_linking();
        assert!(builder.cancel_linking());
        assert_eq!(builder.definition().edges.len(), 1);
    }

    fn stored(id: &str, name: &str, definition: WorkflowDefinition) -> Workflow {
        Workflow {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            definition,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn save_finishing_after_open_keeps_the_opened_record() {
        let mut builder = WorkflowBuilder::new();
        builder.set_name("A");
        let request = builder.begin_save().expect("request");
        assert_eq!(request.workflow_id, None);

        builder.open(stored("wf_b", "B", WorkflowDefinition::default()));
        assert!(!builder.is_saving());
        builder.finish_save(&request, Ok(stored("wf_a", "A", WorkflowDefinition::default())));

        assert_eq!(builder.workflow_id(), Some("wf_b"));
        assert_eq!(builder.name(), "B");
        let next = builder.begin_save().expect("request");
        assert_eq!(next.workflow_id.as_deref(), Some("wf_b"));
        assert_eq!(builder.drain_notices().last().map(|n| n.message.as_str()), Some("Saved A"));

        // The superseded response must not clear the flag of the live save.
        builder.finish_save(&request, Ok(stored("wf_a", "A", WorkflowDefinition::default())));
        assert!(builder.is_saving());
        builder.finish_save(&next, Ok(stored("wf_b", "B", WorkflowDefinition::default())));
        assert!(!builder.is_saving());
    }

    #[test]
    fn opening_a_damaged_definition_repairs_it() {
        let mut definition = WorkflowDefinition::default();
        let mut step = Step::new("step_1", StepType::Script);
        step.position = Point::new(-900.0, 99999.0);
        definition.steps.push(step);
        definition.edges.push(Edge {
            id: "edge_1".to_string(),
            from_step_id: "step_1".to_string(),
            to_step_id: "step_1".to_string(),
            kind: EdgeKind::Dependency,
        });
        definition.edges.push(Edge {
            id: "edge_2".to_string(),
            from_step_id: "step_1".to_string(),
            to_step_id: "ghost".to_string(),
            kind: EdgeKind::Dependency,
        });

        let mut builder = WorkflowBuilder::new();
        builder.open(stored("wf_1", "Damaged", definition.clone()));
        assert!(builder.definition().edges.is_empty());
        let position = builder.definition().step("step_1").unwrap().position;
        assert!(position.x >= 0.0 && position.y < 99999.0);

        builder.import_definition(definition);
        assert!(builder.definition().edges.is_empty());
        assert_eq!(builder.definition().step("step_1").unwrap().position, position);
    }

    #[test]
    fn undrained_notices_are_capped() {
        let mut builder = WorkflowBuilder::new();
        builder.add_step(StepType::Script);
        for _ in 0..MAX_PENDING_NOTICES + 5 {
            let request = builder.begin_validate();
            builder.finish_validate(&request, Ok(ValidationResult::from_issues(vec![])));
        }
        assert_eq!(builder.drain_notices().len(), MAX_PENDING_NOTICES);
    }

    #[test]
    fn import_keeps_the_workflow_record() {
        let mut builder = WorkflowBuilder::from_definition("triage", WorkflowDefinition::default());
        let step = builder.add_step(StepType::Script);
        builder.start_linking();

        let mut imported = WorkflowDefinition::default();
        imported.steps.push(Step::new("step_7", StepType::Delay));
        builder.import_definition(imported);

        assert_eq!(builder.name(), "triage");
        assert!(builder.selected_step().is_none());
        assert!(builder.linking_from().is_none());
        assert!(!builder.panel().is_open());
        assert!(builder.definition().step(&step.id).is_none());
        assert_eq!(builder.add_step(StepType::Script).id, "step_8");
    }
}
