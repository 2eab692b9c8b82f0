use werkbank::rules::check_definition;
use werkbank::validation::issues_by_step_id;
use werkbank::{Severity, WorkflowDefinition};

fn load(yaml: &str) -> WorkflowDefinition {
    WorkflowDefinition::from_yaml_str(yaml).expect("fixture parses")
}

#[test]
fn triage_workflow_is_clean() {
    let result = check_definition(&load(include_str!("fixtures/ticket_triage.yaml")));
    assert!(result.valid, "{:?}", result.issues);
    assert!(result.issues.is_empty());
}

#[test]
fn broken_workflow_reports_every_problem() {
    let result = check_definition(&load(include_str!("fixtures/broken_bindings.yaml")));
    assert!(!result.valid);
    assert_eq!(result.error_count(), 4, "{:?}", result.issues);
    assert!(result
        .issues
        .iter()
        .all(|issue| issue.severity == Severity::Error));

    let counts = issues_by_step_id(&result.issues);
    assert_eq!(counts.get("step_1"), Some(&2));
    assert_eq!(counts.get("step_2"), Some(&2));

    let messages: Vec<&str> = result.issues.iter().map(|i| i.message.as_str()).collect();
    assert!(messages.iter().any(|m| m.contains("did you mean 'step_1'")));
    assert!(messages.iter().any(|m| m.contains("'step_9' does not exist")));
    assert!(messages.iter().any(|m| m.starts_with("Dependency cycle")));
}

#[test]
fn dangling_edges_are_workflow_level_errors() {
    let yaml = r#"
steps:
  - id: a
    type: script
    name: A
edges:
  - id: e1
    fromStepId: a
    toStepId: ghost
"#;
    let result = check_definition(&load(yaml));
    assert!(!result.valid);
    let dangling: Vec<_> = result
        .issues
        .iter()
        .filter(|issue| issue.message.contains("unknown step 'ghost'"))
        .collect();
    assert_eq!(dangling.len(), 1);
    assert!(dangling[0].step_id.is_none());
}
