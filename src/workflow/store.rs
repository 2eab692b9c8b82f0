//! Authoritative in-memory workflow definition and its mutation API.
//!
//! The store hands out `Arc` snapshots. Mutations go through
//! `Arc::make_mut`, so a snapshot held by an observer (the canvas, an
//! in-flight validation request) is never changed underneath it. The
//! `revision` counter is the definition's identity: it moves on every
//! effective mutation and nowhere else.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tracing::{debug, trace};

use super::definition::{Edge, EdgeKind, Step, StepType, Variable, WorkflowDefinition};
use crate::geometry::{clamp_position, Point};

const STEP_ID_PREFIX: &str = "step_";
const EDGE_ID_PREFIX: &str = "edge_";

/// Partial update for a step. `None` leaves a field untouched; for optional
/// fields `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepPatch {
    pub name: Option<String>,
    pub position: Option<Point>,
    pub bindings: Option<BTreeMap<String, String>>,
    pub timeout_seconds: Option<Option<u32>>,
    pub retries: Option<Option<u32>>,
    pub agent_id: Option<Option<String>>,
    pub fallback_step_id: Option<Option<String>>,
}

impl StepPatch {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn position(mut self, position: Point) -> Self {
        self.position = Some(position);
        self
    }

    pub fn bindings(mut self, bindings: BTreeMap<String, String>) -> Self {
        self.bindings = Some(bindings);
        self
    }

    pub fn timeout_seconds(mut self, timeout: Option<u32>) -> Self {
        // Timeouts are positive; zero means "no timeout".
        self.timeout_seconds = Some(timeout.filter(|value| *value > 0));
        self
    }

    pub fn retries(mut self, retries: Option<u32>) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn agent_id(mut self, agent: Option<String>) -> Self {
        self.agent_id = Some(agent.filter(|value| !value.trim().is_empty()));
        self
    }

    pub fn fallback_step_id(mut self, fallback: Option<String>) -> Self {
        self.fallback_step_id = Some(fallback.filter(|value| !value.is_empty()));
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == StepPatch::default()
    }

    fn apply(self, step: &mut Step) {
        if let Some(name) = self.name {
            step.name = name;
        }
        if let Some(position) = self.position {
            step.position = clamp_position(position);
        }
        if let Some(bindings) = self.bindings {
            step.bindings = bindings;
        }
        if let Some(timeout) = self.timeout_seconds {
            step.timeout_seconds = timeout;
        }
        if let Some(retries) = self.retries {
            step.retries = retries;
        }
        if let Some(agent) = self.agent_id {
            step.agent_id = agent;
        }
        if let Some(fallback) = self.fallback_step_id {
            step.fallback_step_id = fallback;
        }
    }
}

#[derive(Debug, Clone)]
pub struct GraphStore {
    definition: Arc<WorkflowDefinition>,
    revision: u64,
    next_step: u64,
    next_edge: u64,
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new(WorkflowDefinition::default())
    }
}

impl GraphStore {
    pub fn new(definition: WorkflowDefinition) -> Self {
        let mut store = Self {
            definition: Arc::new(WorkflowDefinition::default()),
            revision: 0,
            next_step: 1,
            next_edge: 1,
        };
        store.replace(definition);
        store.revision = 0;
        store
    }

    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }

    /// Cheap immutable handle on the current definition.
    pub fn snapshot(&self) -> Arc<WorkflowDefinition> {
        Arc::clone(&self.definition)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.definition.step(id)
    }

    /// Swaps in a loaded definition. Id counters are moved past every id
    /// already present so generated ids never collide with loaded ones.
    ///
    /// Loaded graphs get the same guarantees as edited ones: positions are
    /// clamped onto the canvas, and self loops, repeated pairs and edges to
    /// unknown steps are dropped.
    pub fn replace(&mut self, mut definition: WorkflowDefinition) {
        let max_step = max_suffix(definition.steps.iter().map(|s| s.id.as_str()), STEP_ID_PREFIX);
        let max_edge = max_suffix(definition.edges.iter().map(|e| e.id.as_str()), EDGE_ID_PREFIX);
        self.next_step = self.next_step.max(max_step + 1);
        self.next_edge = self.next_edge.max(max_edge + 1);
        normalize(&mut definition);
        self.definition = Arc::new(definition);
        self.bump();
        debug!(
            steps = self.definition.steps.len(),
            edges = self.definition.edges.len(),
            "loaded workflow definition"
        );
    }

    pub fn add_step(&mut self, step_type: StepType, position: Option<Point>) -> Step {
        let count = self.definition.steps.len() as f32;
        let position = position
            .unwrap_or_else(|| Point::new(180.0 + 40.0 * count, 140.0 + 40.0 * count));

        let id = self.fresh_step_id();
        let mut step = Step::new(id, step_type);
        step.position = clamp_position(position);

        Arc::make_mut(&mut self.definition).steps.push(step.clone());
        self.bump();
        debug!(step = %step.id, kind = %step_type, "added step");
        step
    }

    /// Returns whether a step matched.
    pub fn update_step(&mut self, id: &str, patch: StepPatch) -> bool {
        if !self.definition.contains_step(id) {
            trace!(step = id, "update ignored for unknown step");
            return false;
        }
        if let Some(step) = Arc::make_mut(&mut self.definition)
            .steps
            .iter_mut()
            .find(|step| step.id == id)
        {
            patch.apply(step);
        }
        self.bump();
        trace!(step = id, "updated step");
        true
    }

    /// Drag path. Kept separate from `update_step` so high-frequency moves
    /// only touch the position.
    pub fn move_step(&mut self, id: &str, position: Point) -> bool {
        let position = clamp_position(position);
        match self.definition.step(id) {
            None => return false,
            Some(step) if step.position == position => return false,
            Some(_) => {}
        }
        if let Some(step) = Arc::make_mut(&mut self.definition)
            .steps
            .iter_mut()
            .find(|step| step.id == id)
        {
            step.position = position;
        }
        self.bump();
        true
    }

    /// Removes the step and every edge touching it.
    pub fn delete_step(&mut self, id: &str) -> bool {
        if !self.definition.contains_step(id) {
            return false;
        }
        let definition = Arc::make_mut(&mut self.definition);
        definition.steps.retain(|step| step.id != id);
        let before = definition.edges.len();
        definition
            .edges
            .retain(|edge| edge.from_step_id != id && edge.to_step_id != id);
        let cascaded = before - definition.edges.len();
        self.bump();
        debug!(step = id, cascaded, "deleted step");
        true
    }

    /// Adds a dependency edge. Self loops, duplicate pairs and unknown
    /// endpoints are ignored and yield `None`.
    pub fn create_edge(&mut self, from: &str, to: &str) -> Option<Edge> {
        if from == to {
            trace!(step = from, "ignored self loop");
            return None;
        }
        if self.definition.has_edge(from, to) {
            trace!(from, to, "ignored duplicate edge");
            return None;
        }
        if !self.definition.contains_step(from) || !self.definition.contains_step(to) {
            trace!(from, to, "ignored edge with unknown endpoint");
            return None;
        }

        let edge = Edge {
            id: self.fresh_edge_id(),
            from_step_id: from.to_string(),
            to_step_id: to.to_string(),
            kind: EdgeKind::Dependency,
        };
        Arc::make_mut(&mut self.definition).edges.push(edge.clone());
        self.bump();
        debug!(edge = %edge.id, from, to, "created edge");
        Some(edge)
    }

    pub fn delete_edge(&mut self, id: &str) -> bool {
        if !self.definition.edges.iter().any(|edge| edge.id == id) {
            return false;
        }
        Arc::make_mut(&mut self.definition)
            .edges
            .retain(|edge| edge.id != id);
        self.bump();
        true
    }

    pub fn add_variable(&mut self, variable: Variable) {
        Arc::make_mut(&mut self.definition).variables.push(variable);
        self.bump();
    }

    pub fn update_variable(&mut self, index: usize, variable: Variable) -> bool {
        if index >= self.definition.variables.len() {
            return false;
        }
        Arc::make_mut(&mut self.definition).variables[index] = variable;
        self.bump();
        true
    }

    pub fn remove_variable(&mut self, index: usize) -> Option<Variable> {
        if index >= self.definition.variables.len() {
            return None;
        }
        let removed = Arc::make_mut(&mut self.definition).variables.remove(index);
        self.bump();
        Some(removed)
    }

    fn bump(&mut self) {
        self.revision += 1;
    }

    fn fresh_step_id(&mut self) -> String {
        loop {
            let id = format!("{STEP_ID_PREFIX}{}", self.next_step);
            self.next_step += 1;
            if !self.definition.contains_step(&id) {
                return id;
            }
        }
    }

    fn fresh_edge_id(&mut self) -> String {
        loop {
            let id = format!("{EDGE_ID_PREFIX}{}", self.next_edge);
            self.next_edge += 1;
            if !self.definition.edges.iter().any(|edge| edge.id == id) {
                return id;
            }
        }
    }
}

fn max_suffix<'a>(ids: impl Iterator<Item = &'a str>, prefix: &str) -> u64 {
    ids.filter_map(|id| id.strip_prefix(prefix))
        .filter_map(|suffix| suffix.parse::<u64>().ok())
        .max()
        .unwrap_or(0)
}

fn normalize(definition: &mut WorkflowDefinition) {
    for step in &mut definition.steps {
        let position = clamp_position(step.position);
        if position != step.position {
            debug!(step = %step.id, "clamped loaded position onto the canvas");
            step.position = position;
        }
    }

    let known: HashSet<String> = definition.steps.iter().map(|s| s.id.clone()).collect();
    let mut pairs = HashSet::new();
    definition.edges.retain(|edge| {
        let from = edge.from_step_id.as_str();
        let to = edge.to_step_id.as_str();
        if from == to {
            debug!(edge = %edge.id, step = from, "dropped self loop");
            false
        } else if !known.contains(from) || !known.contains(to) {
            debug!(edge = %edge.id, from, to, "dropped edge to unknown step");
            false
        } else if !pairs.insert((from.to_string(), to.to_string())) {
            debug!(edge = %edge.id, from, to, "dropped repeated edge");
            false
        } else {
            true
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{CANVAS_SIZE, NODE_HEIGHT, NODE_WIDTH};

    #[test]
    fn add_step_staggers_default_positions() {
        let mut store = GraphStore::default();
        let first = store.add_step(StepType::AgentTask, None);
        let second = store.add_step(StepType::Script, None);

        assert_eq!(first.id, "step_1");
        assert_eq!(first.name, "Agent task");
        assert_eq!(first.position, Point::new(180.0, 140.0));
        assert_eq!(second.position, Point::new(220.0, 180.0));
        assert_eq!(store.definition().steps.len(), 2);
    }

    #[test]
    fn move_step_always_lands_inside_canvas() {
        let mut store = GraphStore::default();
        let step = store.add_step(StepType::Delay, None);
        let requests = [
            Point::new(-5000.0, 20.0),
            Point::new(1.0e9, -1.0e9),
            Point::new(CANVAS_SIZE, CANVAS_SIZE),
            Point::new(f32::NEG_INFINITY, 12.0),
        ];
        for request in requests {
            store.move_step(&step.id, request);
            let position = store.step(&step.id).unwrap().position;
            assert!((0.0..=CANVAS_SIZE - NODE_WIDTH).contains(&position.x));
            assert!((0.0..=CANVAS_SIZE - NODE_HEIGHT).contains(&position.y));
        }
    }

    #[test]
    fn create_edge_rejects_self_loops_and_duplicates() {
        let mut store = GraphStore::default();
        let a = store.add_step(StepType::Script, None);
        let b = store.add_step(StepType::Script, None);

        assert!(store.create_edge(&a.id, &a.id).is_none());
        assert!(store.definition().edges.is_empty());

        let edge = store.create_edge(&a.id, &b.id).expect("edge");
        assert_eq!(edge.kind, EdgeKind::Dependency);
        assert!(store.create_edge(&a.id, &b.id).is_none());
        assert_eq!(store.definition().edges.len(), 1);

        // The reverse direction is a different pair.
        assert!(store.create_edge(&b.id, &a.id).is_some());
        assert!(store.create_edge(&a.id, "missing").is_none());
    }

    #[test]
    fn delete_step_cascades_edges() {
        let mut store = GraphStore::default();
        let a = store.add_step(StepType::Script, None);
        let b = store.add_step(StepType::Script, None);
        let c = store.add_step(StepType::Script, None);
        store.create_edge(&a.id, &b.id);
        store.create_edge(&b.id, &c.id);
        store.create_edge(&a.id, &c.id);

        assert!(store.delete_step(&b.id));
        let definition = store.definition();
        assert!(definition
            .edges
            .iter()
            .all(|edge| edge.from_step_id != b.id && edge.to_step_id != b.id));
        assert_eq!(definition.edges.len(), 1);
        assert!(!store.delete_step(&b.id));
    }

    #[test]
    fn update_step_merges_patch_and_ignores_unknown_ids() {
        let mut store = GraphStore::default();
        let step = store.add_step(StepType::AgentTask, None);
        let revision = store.revision();

        assert!(!store.update_step("nope", StepPatch::default().name("x")));
        assert_eq!(store.revision(), revision);

        store.update_step(
            &step.id,
            StepPatch::default()
                .name("Summarise")
                .timeout_seconds(Some(0))
                .retries(Some(2))
                .agent_id(Some("  ".to_string())),
        );
        let updated = store.step(&step.id).unwrap();
        assert_eq!(updated.name, "Summarise");
        assert_eq!(updated.timeout_seconds, None);
        assert_eq!(updated.retries, Some(2));
        assert_eq!(updated.agent_id, None);
        assert_eq!(updated.step_type, StepType::AgentTask);
    }

    #[test]
    fn snapshots_are_not_mutated_in_place() {
        let mut store = GraphStore::default();
        let step = store.add_step(StepType::Script, None);
        let before = store.snapshot();
        store.move_step(&step.id, Point::new(900.0, 900.0));

        assert_eq!(before.steps[0].position, Point::new(180.0, 140.0));
        assert!(!Arc::ptr_eq(&before, &store.snapshot()));
    }

    #[test]
    fn loaded_ids_are_never_reused() {
        let mut definition = WorkflowDefinition::default();
        definition.steps.push(Step::new("step_7", StepType::Script));
        definition.steps.push(Step::new("custom", StepType::Script));
        let mut store = GraphStore::new(definition);
        assert_eq!(store.revision(), 0);

        let added = store.add_step(StepType::Delay, None);
        assert_eq!(added.id, "step_8");
        assert_eq!(added.position, Point::new(260.0, 220.0));
    }

    #[test]
    fn loading_repairs_structural_damage() {
        let mut definition = WorkflowDefinition::default();
        let mut a = Step::new("a", StepType::Script);
        a.position = Point::new(-900.0, 99999.0);
        definition.steps.push(a);
        definition.steps.push(Step::new("b", StepType::Script));
        let edge = |id: &str, from: &str, to: &str| Edge {
            id: id.to_string(),
            from_step_id: from.to_string(),
            to_step_id: to.to_string(),
            kind: EdgeKind::Dependency,
        };
        definition.edges = vec![
            edge("edge_1", "a", "a"),
            edge("edge_2", "a", "ghost"),
            edge("edge_3", "a", "b"),
            edge("edge_4", "a", "b"),
            edge("edge_5", "b", "a"),
        ];

        let mut store = GraphStore::default();
        store.replace(definition);

        let ids: Vec<&str> = store.definition().edges.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["edge_3", "edge_5"]);
        let position = store.step("a").unwrap().position;
        assert_eq!(position, Point::new(0.0, CANVAS_SIZE - NODE_HEIGHT));

        // Ids of dropped edges are not handed out again.
        store.add_step(StepType::Script, None);
        assert_eq!(store.create_edge("step_1", "a").unwrap().id, "edge_6");
    }

    #[test]
    fn variables_can_be_edited() {
        let mut store = GraphStore::default();
        store.add_variable(Variable::new("ticket"));
        assert!(store.update_variable(0, Variable::new("ticket_id")));
        assert!(!store.update_variable(3, Variable::new("x")));
        assert_eq!(store.remove_variable(0).map(|v| v.name), Some("ticket_id".to_string()));
        assert!(store.definition().variables.is_empty());
    }
}
