//! Reference semantic checks for workflow definitions.
//!
//! The editor never runs these itself; they back the companion server's
//! validation endpoint and the CLI `check` command.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::validation::{ValidationIssue, ValidationResult};
use crate::workflow::{StepType, WorkflowDefinition};

static RE_STEP_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*steps\.([A-Za-z0-9_\-]+)").expect("step reference pattern")
});

static RE_VAR_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*(?:vars|variables)\.([A-Za-z0-9_\-]+)").expect("variable reference pattern")
});

pub fn check_definition(definition: &WorkflowDefinition) -> ValidationResult {
    let mut issues = Vec::new();

    if definition.steps.is_empty() {
        issues.push(ValidationIssue::error("Workflow has no steps"));
        return ValidationResult::from_issues(issues);
    }

    check_step_ids(definition, &mut issues);
    check_edges(definition, &mut issues);
    check_cycles(definition, &mut issues);
    check_steps(definition, &mut issues);
    check_isolated(definition, &mut issues);
    check_variables(definition, &mut issues);

    ValidationResult::from_issues(issues)
}

fn check_step_ids(definition: &WorkflowDefinition, issues: &mut Vec<ValidationIssue>) {
    let mut seen = HashSet::new();
    for step in &definition.steps {
        if step.id.trim().is_empty() {
            issues.push(ValidationIssue::error("Step with an empty id"));
        } else if !seen.insert(step.id.as_str()) {
            issues.push(
                ValidationIssue::error(format!("Duplicate step id '{}'", step.id)).for_step(&step.id),
            );
        }
    }
}

fn check_edges(definition: &WorkflowDefinition, issues: &mut Vec<ValidationIssue>) {
    let mut pairs = HashSet::new();
    for edge in &definition.edges {
        for endpoint in [&edge.from_step_id, &edge.to_step_id] {
            if !definition.contains_step(endpoint) {
                issues.push(ValidationIssue::error(format!(
                    "Edge '{}' references unknown step '{}'",
                    edge.id, endpoint
                )));
            }
        }
        if edge.from_step_id == edge.to_step_id {
            issues.push(
                ValidationIssue::error(format!("Step '{}' depends on itself", edge.from_step_id))
                    .for_step(&edge.from_step_id),
            );
        }
        if !pairs.insert((edge.from_step_id.as_str(), edge.to_step_id.as_str())) {
            issues.push(ValidationIssue::warning(format!(
                "Duplicate dependency from '{}' to '{}'",
                edge.from_step_id, edge.to_step_id
            )));
        }
    }
}

/// Reports one step per dependency cycle.
fn check_cycles(definition: &WorkflowDefinition, issues: &mut Vec<ValidationIssue>) {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        Active,
        Done,
    }

    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &definition.edges {
        if edge.from_step_id != edge.to_step_id {
            adjacency
                .entry(edge.from_step_id.as_str())
                .or_default()
                .push(edge.to_step_id.as_str());
        }
    }

    let mut marks: HashMap<&str, Mark> = definition
        .steps
        .iter()
        .map(|step| (step.id.as_str(), Mark::Unvisited))
        .collect();

    for step in &definition.steps {
        let root = step.id.as_str();
        if marks.get(root) != Some(&Mark::Unvisited) {
            continue;
        }
        // Iterative DFS: (node, index of next child to visit).
        let mut stack: Vec<(&str, usize)> = vec![(root, 0)];
        marks.insert(root, Mark::Active);
        while let Some((node, child)) = stack.last_mut() {
            let children = adjacency.get(*node).map(Vec::as_slice).unwrap_or(&[]);
            if let Some(next) = children.get(*child).copied() {
                *child += 1;
                match marks.get(next).copied() {
                    Some(Mark::Unvisited) => {
                        marks.insert(next, Mark::Active);
                        stack.push((next, 0));
                    }
                    Some(Mark::Active) => issues.push(
                        ValidationIssue::error(format!(
                            "Dependency cycle through step '{next}'"
                        ))
                        .for_step(next),
                    ),
                    _ => {}
                }
            } else {
                marks.insert(*node, Mark::Done);
                stack.pop();
            }
        }
    }
}

fn check_steps(definition: &WorkflowDefinition, issues: &mut Vec<ValidationIssue>) {
    let step_ids: Vec<&str> = definition.steps.iter().map(|step| step.id.as_str()).collect();

    for step in &definition.steps {
        if step.name.trim().is_empty() {
            issues.push(ValidationIssue::warning("Step has no name").for_step(&step.id));
        }

        if step.step_type == StepType::AgentTask && step.agent_id.is_none() {
            issues.push(
                ValidationIssue::error(format!("'{}' has no agent assigned", step.name))
                    .for_step(&step.id),
            );
        }

        if step.timeout_seconds == Some(0) {
            issues.push(
                ValidationIssue::error("Timeout must be a positive number of seconds")
                    .for_step(&step.id),
            );
        }

        if let Some(fallback) = &step.fallback_step_id {
            if fallback == &step.id {
                issues.push(
                    ValidationIssue::error("A step cannot be its own fallback").for_step(&step.id),
                );
            } else if !definition.contains_step(fallback) {
                issues.push(
                    ValidationIssue::error(format!("Fallback step '{fallback}' does not exist"))
                        .for_step(&step.id),
                );
            }
        }

        for (field, expression) in &step.bindings {
            for capture in RE_STEP_REF.captures_iter(expression) {
                let referenced = &capture[1];
                if step_ids.contains(&referenced) {
                    continue;
                }
                let mut message =
                    format!("Binding '{field}' references unknown step '{referenced}'");
                if let Some(suggestion) = closest(referenced, &step_ids) {
                    message.push_str(&format!(" (did you mean '{suggestion}'?)"));
                }
                issues.push(ValidationIssue::error(message).for_step(&step.id));
            }

            for capture in RE_VAR_REF.captures_iter(expression) {
                let referenced = &capture[1];
                if !definition.variables.iter().any(|v| v.name == referenced) {
                    issues.push(
                        ValidationIssue::warning(format!(
                            "Binding '{field}' references undeclared variable '{referenced}'"
                        ))
                        .for_step(&step.id),
                    );
                }
            }
        }
    }
}

fn check_isolated(definition: &WorkflowDefinition, issues: &mut Vec<ValidationIssue>) {
    if definition.steps.len() < 2 {
        return;
    }
    for step in &definition.steps {
        let connected = definition.outgoing(&step.id).next().is_some()
            || definition.incoming(&step.id).next().is_some();
        if !connected {
            issues.push(
                ValidationIssue::warning(format!("'{}' is not connected to any step", step.name))
                    .for_step(&step.id),
            );
        }
    }
}

fn check_variables(definition: &WorkflowDefinition, issues: &mut Vec<ValidationIssue>) {
    let mut seen = HashSet::new();
    for variable in &definition.variables {
        if variable.name.trim().is_empty() {
            issues.push(ValidationIssue::error("Variable with an empty name"));
        } else if !seen.insert(variable.name.as_str()) {
            issues.push(ValidationIssue::warning(format!(
                "Variable '{}' is declared more than once",
                variable.name
            )));
        }
    }
}

fn closest<'a>(want: &str, candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .map(|candidate| (strsim::levenshtein(want, candidate), *candidate))
        .filter(|(distance, _)| *distance <= 2)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, candidate)| candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::Severity;
    use crate::workflow::{Edge, EdgeKind, Step, Variable};

    fn edge(id: &str, from: &str, to: &str) -> Edge {
        Edge {
            id: id.to_string(),
            from_step_id: from.to_string(),
            to_step_id: to.to_string(),
            kind: EdgeKind::Dependency,
        }
    }

    fn script(id: &str) -> Step {
        Step::new(id, StepType::Script)
    }

    #[test]
    fn empty_workflow_is_invalid() {
        let result = check_definition(&WorkflowDefinition::default());
        assert!(!result.valid);
        assert_eq!(result.issues.len(), 1);
        assert!(result.issues[0].step_id.is_none());
    }

    #[test]
    fn detects_cycles() {
        let mut definition = WorkflowDefinition::default();
        definition.steps = vec![script("a"), script("b"), script("c")];
        definition.edges = vec![edge("e1", "a", "b"), edge("e2", "b", "c"), edge("e3", "c", "a")];

        let result = check_definition(&definition);
        assert!(!result.valid);
        let cycles: Vec<_> = result
            .issues
            .iter()
            .filter(|issue| issue.message.starts_with("Dependency cycle"))
            .collect();
        assert_eq!(cycles.len(), 1);
    }

    #[test]
    fn accepts_a_simple_chain() {
        let mut definition = WorkflowDefinition::default();
        definition.steps = vec![script("a"), script("b")];
        definition.edges = vec![edge("e1", "a", "b")];
        let result = check_definition(&definition);
        assert!(result.valid, "{:?}", result.issues);
        assert!(result.issues.is_empty());
    }

    #[test]
    fn flags_fallback_and_agent_problems() {
        let mut agent = Step::new("a", StepType::AgentTask);
        agent.fallback_step_id = Some("a".to_string());
        let mut other = script("b");
        other.fallback_step_id = Some("zzz".to_string());

        let mut definition = WorkflowDefinition::default();
        definition.steps = vec![agent, other];
        definition.edges = vec![edge("e1", "a", "b")];

        let result = check_definition(&definition);
        let for_a: Vec<_> = result
            .issues
            .iter()
            .filter(|issue| issue.step_id.as_deref() == Some("a"))
            .collect();
        assert_eq!(for_a.len(), 2);
        assert!(result
            .issues
            .iter()
            .any(|issue| issue.message.contains("'zzz' does not exist")));
    }

    #[test]
    fn suggests_close_step_ids_in_bindings() {
        let mut consumer = script("step_2");
        consumer
            .bindings
            .insert("input".to_string(), "{{ steps.step_1.output }}".to_string());
        consumer
            .bindings
            .insert("other".to_string(), "{{steps.stpe_1.output}}".to_string());
        consumer
            .bindings
            .insert("ticket".to_string(), "{{ vars.ticket }}".to_string());

        let mut definition = WorkflowDefinition::default();
        definition.steps = vec![script("step_1"), consumer];
        definition.edges = vec![edge("e1", "step_1", "step_2")];
        definition.variables = vec![Variable::new("ticket")];

        let result = check_definition(&definition);
        assert_eq!(result.issues.len(), 1, "{:?}", result.issues);
        assert!(result.issues[0].message.contains("did you mean 'step_1'"));
        assert_eq!(result.issues[0].severity, Severity::Error);
    }

    #[test]
    fn warns_about_isolated_steps_and_duplicate_variables() {
        let mut definition = WorkflowDefinition::default();
        definition.steps = vec![script("a"), script("b")];
        definition.variables = vec![Variable::new("x"), Variable::new("x")];

        let result = check_definition(&definition);
        assert!(result.valid);
        assert_eq!(result.warning_count(), 3);
    }
}
