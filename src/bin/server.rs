use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Serialize;
use std::{
    fs,
    path::{Path as FsPath, PathBuf},
    sync::Arc,
};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use werkbank::config::{self, ServerConfig};
use werkbank::rules::check_definition;
use werkbank::{AgentDefinition, ApiResponse, Workflow, WorkflowDefinition, WorkflowPayload};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    config::init_tracing("info,werkbank=debug,werkbank_server=debug");
    let config = ServerConfig::from_env()?;

    fs::create_dir_all(&config.data_dir)?;
    let state = Arc::new(AppState {
        data_dir: config.data_dir.clone(),
        agents_file: config.agents_file.clone(),
        write_lock: Mutex::new(()),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/workflows", get(list_workflows).post(create_workflow))
        .route("/api/workflows/validate", post(validate_workflow))
        .route("/api/workflows/{id}", get(get_workflow).put(update_workflow))
        .route("/api/agents", get(list_agents))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!(data_dir = %config.data_dir.display(), "serving workflows");
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!("listening on {}", config.bind);
    axum::serve(listener, app).await?;
    Ok(())
}

struct AppState {
    data_dir: PathBuf,
    agents_file: Option<PathBuf>,
    write_lock: Mutex<()>,
}

impl AppState {
    fn path_for(&self, id: &str) -> PathBuf {
        self.data_dir.join(format!("{id}.yaml"))
    }

    /// Appends `-2`, `-3`, ... until `base` names no stored workflow.
    /// Callers hold the write lock.
    fn unused_id(&self, base: String) -> String {
        if !self.path_for(&base).exists() {
            return base;
        }
        (2u32..)
            .map(|n| format!("{base}-{n}"))
            .find(|id| !self.path_for(id).exists())
            .unwrap_or(base)
    }

    fn read(&self, id: &str) -> Result<Option<Workflow>, String> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(None);
        }
        read_workflow(&path).map(Some)
    }

    fn write(&self, workflow: &Workflow) -> Result<(), String> {
        let yaml = serde_yaml::to_string(workflow)
            .map_err(|e| format!("Failed to serialize workflow: {e}"))?;
        fs::write(self.path_for(&workflow.id), yaml)
            .map_err(|e| format!("Failed to write workflow: {e}"))
    }
}

fn read_workflow(path: &FsPath) -> Result<Workflow, String> {
    let content = fs::read_to_string(path).map_err(|e| format!("Failed to read workflow: {e}"))?;
    serde_yaml::from_str(&content).map_err(|e| format!("Failed to parse workflow: {e}"))
}

fn ok<T: Serialize>(data: T) -> Response {
    Json(ApiResponse::ok(data)).into_response()
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ApiResponse::<()>::failure(message))).into_response()
}

/// Ids are `<slug>-<millis>`; collisions are resolved by `AppState::unused_id`.
fn workflow_id(name: &str) -> String {
    let mut slug = String::new();
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    let slug = if slug.is_empty() { "workflow" } else { slug };
    format!("{slug}-{}", Utc::now().timestamp_millis())
}

fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
}

async fn list_workflows(State(state): State<Arc<AppState>>) -> Response {
    let mut workflows = Vec::new();

    if let Ok(entries) = fs::read_dir(&state.data_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "yaml" || ext == "yml") {
                match read_workflow(&path) {
                    Ok(workflow) => workflows.push(workflow),
                    Err(e) => tracing::warn!(path = %path.display(), "skipping workflow: {}", e),
                }
            }
        }
    }

    workflows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    ok(workflows)
}

async fn get_workflow(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    if !is_safe_id(&id) {
        return failure(StatusCode::BAD_REQUEST, "Invalid workflow id");
    }
    match state.read(&id) {
        Ok(Some(workflow)) => ok(workflow),
        Ok(None) => failure(StatusCode::NOT_FOUND, "Workflow not found"),
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

async fn create_workflow(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<WorkflowPayload>,
) -> Response {
    if payload.name.trim().is_empty() {
        return failure(StatusCode::BAD_REQUEST, "Workflow name is required");
    }

    let _guard = state.write_lock.lock().await;
    let now = Utc::now();
    let workflow = Workflow {
        id: state.unused_id(workflow_id(&payload.name)),
        name: payload.name.trim().to_string(),
        description: payload.description,
        definition: payload.definition,
        created_at: now,
        updated_at: now,
    };

    match state.write(&workflow) {
        Ok(()) => {
            tracing::info!(workflow = %workflow.id, "created workflow");
            (StatusCode::CREATED, Json(ApiResponse::ok(workflow).with_message("Workflow created")))
                .into_response()
        }
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

async fn update_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<WorkflowPayload>,
) -> Response {
    if !is_safe_id(&id) {
        return failure(StatusCode::BAD_REQUEST, "Invalid workflow id");
    }
    if payload.name.trim().is_empty() {
        return failure(StatusCode::BAD_REQUEST, "Workflow name is required");
    }

    let _guard = state.write_lock.lock().await;
    let existing = match state.read(&id) {
        Ok(Some(workflow)) => workflow,
        Ok(None) => return failure(StatusCode::NOT_FOUND, "Workflow not found"),
        Err(e) => return failure(StatusCode::INTERNAL_SERVER_ERROR, e),
    };

    let workflow = Workflow {
        id: existing.id,
        name: payload.name.trim().to_string(),
        description: payload.description,
        definition: payload.definition,
        created_at: existing.created_at,
        updated_at: Utc::now(),
    };

    match state.write(&workflow) {
        Ok(()) => {
            tracing::info!(workflow = %workflow.id, "updated workflow");
            Json(ApiResponse::ok(workflow).with_message("Workflow saved")).into_response()
        }
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

async fn validate_workflow(Json(definition): Json<WorkflowDefinition>) -> Response {
    let result = check_definition(&definition);
    tracing::debug!(
        valid = result.valid,
        errors = result.error_count(),
        warnings = result.warning_count(),
        "validated workflow"
    );
    ok(result)
}

async fn list_agents(State(state): State<Arc<AppState>>) -> Response {
    let Some(path) = &state.agents_file else {
        return failure(StatusCode::NOT_FOUND, "No agent directory configured");
    };

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            return failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to read agents: {e}"),
            )
        }
    };

    match serde_yaml::from_str::<Vec<AgentDefinition>>(&content) {
        Ok(agents) => ok(agents),
        Err(e) => failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to parse agents: {e}"),
        ),
    }
}
