//! Contracts the editor consumes but does not implement: validation,
//! workflow persistence and the agent directory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ServiceError;
use crate::validation::ValidationResult;
use crate::workflow::WorkflowDefinition;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowPayload {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub definition: WorkflowDefinition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub definition: WorkflowDefinition,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDefinition {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// JSON envelope used by every workflow endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub success: bool,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data,
            message: None,
            success: true,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl ApiResponse<()> {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            data: (),
            message: Some(message.into()),
            success: false,
        }
    }
}

#[async_trait]
pub trait WorkflowService: Send + Sync {
    async fn validate(
        &self,
        definition: &WorkflowDefinition,
    ) -> Result<ValidationResult, ServiceError>;

    async fn create_workflow(&self, payload: &WorkflowPayload) -> Result<Workflow, ServiceError>;

    async fn update_workflow(
        &self,
        id: &str,
        payload: &WorkflowPayload,
    ) -> Result<Workflow, ServiceError>;

    async fn get_workflow(&self, _id: &str) -> Result<Workflow, ServiceError> {
        Err(ServiceError::Unsupported("workflow lookup"))
    }

    async fn list_agent_definitions(&self) -> Result<Vec<AgentDefinition>, ServiceError> {
        Err(ServiceError::Unsupported("agent directory"))
    }

    fn name(&self) -> &'static str;
}

/// `WorkflowService` over the JSON HTTP API served by `werkbank-server`.
#[derive(Debug, Clone)]
pub struct HttpWorkflowService {
    client: Client,
    base_url: String,
}

impl HttpWorkflowService {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ServiceError> {
        let client = Client::builder().build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ServiceError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        debug!(status = status.as_u16(), bytes = body.len(), "workflow service responded");

        let envelope: ApiResponse<Option<T>> = match serde_json::from_slice(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(ServiceError::Api {
                    status: status.as_u16(),
                    message: String::from_utf8_lossy(&body).into_owned(),
                })
            }
            Err(err) => return Err(ServiceError::Serialization(err)),
        };

        if !status.is_success() || !envelope.success {
            return Err(ServiceError::Api {
                status: status.as_u16(),
                message: envelope
                    .message
                    .unwrap_or_else(|| "request failed".to_string()),
            });
        }

        envelope
            .data
            .ok_or(ServiceError::InvalidResponse("missing data"))
    }
}

#[async_trait]
impl WorkflowService for HttpWorkflowService {
    async fn validate(
        &self,
        definition: &WorkflowDefinition,
    ) -> Result<ValidationResult, ServiceError> {
        let request = self
            .request(Method::POST, "/api/workflows/validate")
            .json(definition);
        self.send(request).await
    }

    async fn create_workflow(&self, payload: &WorkflowPayload) -> Result<Workflow, ServiceError> {
        let request = self.request(Method::POST, "/api/workflows").json(payload);
        self.send(request).await
    }

    async fn update_workflow(
        &self,
        id: &str,
        payload: &WorkflowPayload,
    ) -> Result<Workflow, ServiceError> {
        let request = self
            .request(Method::PUT, &format!("/api/workflows/{id}"))
            .json(payload);
        self.send(request).await
    }

    async fn get_workflow(&self, id: &str) -> Result<Workflow, ServiceError> {
        self.send(self.request(Method::GET, &format!("/api/workflows/{id}")))
            .await
    }

    async fn list_agent_definitions(&self) -> Result<Vec<AgentDefinition>, ServiceError> {
        self.send(self.request(Method::GET, "/api/agents")).await
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
