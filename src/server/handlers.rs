//! Route handlers.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

use crate::cluster::{ClusterConfig, ContextDescriptor};
use crate::exec::{CommandRequest, ExecutionTarget};
use crate::history::{CommandRecord, NewCommandRecord};
use crate::server::AppState;
use crate::server::error::{ApiError, ApiResult, MessageBody};

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub command: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub pod: Option<String>,
}

impl From<ExecuteRequest> for CommandRequest {
    fn from(req: ExecuteRequest) -> Self {
        Self {
            raw_command: req.command,
            namespace: req.namespace.unwrap_or_default(),
            context: req.context.unwrap_or_default(),
            pod: req.pod,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub output: String,
    pub error: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ContextsQuery {
    #[serde(default, alias = "useKubeconfig")]
    pub live: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct NamespacesQuery {
    pub context: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PodsQuery {
    pub namespace: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Run a command through the pipeline and record it in history.
pub async fn execute_command(
    State(state): State<AppState>,
    body: Result<Json<ExecuteRequest>, JsonRejection>,
) -> ApiResult<Json<ExecuteResponse>> {
    let Json(body) = body?;
    if body.command.trim().is_empty() {
        return Err(ApiError::BadRequest("Command is required".to_string()));
    }

    let request = CommandRequest::from(body);
    let target = ExecutionTarget::from_request(&request, state.pipeline.defaults());
    let result = state.pipeline.execute(&request).await;

    state
        .history
        .record(NewCommandRecord {
            command: request.raw_command,
            target,
            result: result.clone(),
        })
        .await;

    Ok(Json(ExecuteResponse {
        output: result.stdout,
        error: result.stderr,
    }))
}

pub async fn list_contexts(
    State(state): State<AppState>,
    query: Result<Query<ContextsQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<ContextDescriptor>>> {
    let Query(query) = query?;
    Ok(Json(state.cache.list_contexts(query.live).await))
}

/// Namespaces for a context; a missing context means the default one.
pub async fn list_namespaces(
    State(state): State<AppState>,
    query: Result<Query<NamespacesQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<String>>> {
    let Query(query) = query?;
    let context = query
        .context
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| state.pipeline.defaults().context.clone());
    Ok(Json(state.cache.list_namespaces(&context).await))
}

pub async fn list_pods(
    State(state): State<AppState>,
    query: Result<Query<PodsQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<String>>> {
    let Query(query) = query?;
    let namespace = query.namespace.filter(|v| !v.trim().is_empty());
    let context = query.context.filter(|v| !v.trim().is_empty());
    let (Some(namespace), Some(context)) = (namespace, context) else {
        return Err(ApiError::BadRequest(
            "Namespace and context are required".to_string(),
        ));
    };
    Ok(Json(state.cache.list_pods(&namespace, &context).await))
}

pub async fn list_history(State(state): State<AppState>) -> Json<Vec<CommandRecord>> {
    Json(state.history.list().await)
}

pub async fn clear_history(State(state): State<AppState>) -> Json<MessageBody> {
    state.history.clear().await;
    tracing::info!("command history cleared");
    Json(MessageBody::new("History cleared"))
}

pub async fn get_cluster_config(State(state): State<AppState>) -> Json<ClusterConfig> {
    Json(state.cache.current_config().await)
}

pub async fn put_cluster_config(
    State(state): State<AppState>,
    config: Result<Json<ClusterConfig>, JsonRejection>,
) -> ApiResult<Json<ClusterConfig>> {
    let Json(config) = config?;
    let snapshot = state.cache.save_config(&config).await?;
    tracing::info!(contexts = snapshot.config.contexts.len(), "cluster config updated");
    Ok(Json(snapshot.config.clone()))
}

pub async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
