use werkbank::{StepType, WorkflowDefinition};

const TRIAGE: &str = include_str!("fixtures/ticket_triage.yaml");

#[test]
fn triage_fixture_roundtrips_through_yaml() {
    let definition =
        WorkflowDefinition::from_yaml_str(TRIAGE).expect("failed to parse triage workflow");

    let yaml = definition
        .to_yaml_string()
        .expect("failed to serialize workflow back to yaml");
    let round_trip =
        WorkflowDefinition::from_yaml_str(&yaml).expect("failed to parse round-trip yaml");

    assert_eq!(definition, round_trip);
    assert_eq!(definition.schema_version, 1);
    assert_eq!(definition.steps.len(), 3);
    assert_eq!(definition.steps[0].step_type, StepType::AgentTask);
    assert_eq!(definition.steps[0].agent_id.as_deref(), Some("triage"));
    assert_eq!(definition.steps[1].timeout_seconds, Some(30));
    assert_eq!(definition.variables[1].default_value, Some(serde_json::json!(3)));
}

#[test]
fn json_uses_camel_case_field_names() {
    let definition = WorkflowDefinition::from_yaml_str(TRIAGE).unwrap();
    let json = definition.to_json_string_pretty().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(value["schemaVersion"], 1);
    assert_eq!(value["steps"][0]["type"], "agent_task");
    assert_eq!(value["steps"][0]["fallbackStepId"], "step_3");
    assert_eq!(value["edges"][1]["kind"], "dependency");
    assert!(value["steps"][2].get("bindings").is_none());

    let back = WorkflowDefinition::from_json_str(&json).unwrap();
    assert_eq!(back, definition);
}

#[test]
fn schema_describes_steps() {
    let schema = serde_json::to_value(WorkflowDefinition::json_schema()).unwrap();
    assert!(schema["properties"]["steps"].is_object());
    assert!(schema["definitions"]["Step"].is_object());
}

#[test]
fn rejects_unknown_step_types() {
    let yaml = "steps:\n  - id: a\n    type: teleport\n    name: A\n";
    assert!(WorkflowDefinition::from_yaml_str(yaml).is_err());
}
