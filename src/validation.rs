use std::collections::HashMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub message: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
}

impl ValidationIssue {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Error,
            step_id: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Warning,
            step_id: None,
        }
    }

    pub fn for_step(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = Some(step_id.into());
        self
    }
}

/// Result returned by the external validator. `valid` is authoritative;
/// severities are advisory.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(default)]
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// `valid` follows from the absence of error-severity issues.
    pub fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        let valid = !issues.iter().any(|issue| issue.severity == Severity::Error);
        Self { valid, issues }
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    fn count(&self, severity: Severity) -> usize {
        self.issues
            .iter()
            .filter(|issue| issue.severity == severity)
            .count()
    }
}

pub fn issues_by_step_id(issues: &[ValidationIssue]) -> HashMap<String, usize> {
    issues
        .iter()
        .filter_map(|issue| issue.step_id.as_deref())
        .fold(HashMap::new(), |mut counts, step_id| {
            *counts.entry(step_id.to_string()).or_insert(0) += 1;
            counts
        })
}

pub fn workflow_issues(issues: &[ValidationIssue]) -> Vec<&ValidationIssue> {
    issues.iter().filter(|issue| issue.step_id.is_none()).collect()
}

pub fn selected_issues<'a>(
    issues: &'a [ValidationIssue],
    selected_step_id: Option<&str>,
) -> Vec<&'a ValidationIssue> {
    let Some(selected) = selected_step_id else {
        return Vec::new();
    };
    issues
        .iter()
        .filter(|issue| issue.step_id.as_deref() == Some(selected))
        .collect()
}

/// Read-only view over a validation result, derived on demand.
#[derive(Debug, Clone, Default)]
pub struct IssueOverlay<'a> {
    pub by_step: HashMap<String, usize>,
    pub workflow: Vec<&'a ValidationIssue>,
    pub selected: Vec<&'a ValidationIssue>,
}

impl<'a> IssueOverlay<'a> {
    pub fn derive(result: Option<&'a ValidationResult>, selected_step_id: Option<&str>) -> Self {
        let Some(result) = result else {
            return Self::default();
        };
        Self {
            by_step: issues_by_step_id(&result.issues),
            workflow: workflow_issues(&result.issues),
            selected: selected_issues(&result.issues, selected_step_id),
        }
    }

    pub fn badge(&self, step_id: &str) -> Option<usize> {
        self.by_step.get(step_id).copied().filter(|count| *count > 0)
    }
}
