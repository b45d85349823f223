//! HTTP surface — routes, shared state and the background tasks that keep
//! cluster metadata fresh while the server runs.
//!
//! Every handler shares one `AppState`. The pipeline is stateless per request,
//! the metadata cache swaps snapshots atomically, and history is behind its
//! own lock, so handlers run fully in parallel.

pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cluster::{ClusterMetadataCache, KubectlQueries, run_config_watch, run_periodic_refresh};
use crate::config::{ClusterSourceConfig, GatewayConfig};
use crate::exec::{CommandRunner, ExecutionPipeline, ShellRunner};
use crate::history::{HistoryStore, MemoryHistory};

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: ExecutionPipeline,
    pub cache: Arc<ClusterMetadataCache>,
    pub history: Arc<dyn HistoryStore>,
}

impl AppState {
    pub fn new(
        pipeline: ExecutionPipeline,
        cache: Arc<ClusterMetadataCache>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            pipeline,
            cache,
            history,
        }
    }

    /// Wire the production state: shell runner, file-backed metadata cache
    /// (read once here) and in-memory history.
    pub async fn from_config(config: &GatewayConfig) -> crate::Result<Self> {
        let pipeline = ExecutionPipeline::from_config(config)?;

        let runner: Arc<dyn CommandRunner> = Arc::new(ShellRunner::new(&config.executor.shell));
        let queries = KubectlQueries::new(
            &config.executor.kubectl,
            runner,
            config.cluster.probe_timeout(),
        );
        let cache =
            Arc::new(ClusterMetadataCache::load(config.cluster.config_path.clone(), queries).await);

        let history: Arc<dyn HistoryStore> = Arc::new(MemoryHistory::new(config.history.limit));

        Ok(Self::new(pipeline, cache, history))
    }

    /// Start the refresh tasks enabled in `cluster`. All of them stop when
    /// `cancel` fires.
    pub fn spawn_background(
        &self,
        cluster: &ClusterSourceConfig,
        cancel: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::new();

        if cluster.watch {
            tasks.push(tokio::spawn(run_config_watch(self.cache.clone(), cancel.clone())));
        }

        if let Some(interval) = cluster.refresh_interval() {
            tasks.push(tokio::spawn(run_periodic_refresh(
                self.cache.clone(),
                interval,
                cancel.clone(),
            )));
        }

        if cluster.probe_on_start {
            let cache = self.cache.clone();
            tasks.push(tokio::spawn(async move {
                tokio::select! {
                    _ = cache.probe_contexts() => {}
                    _ = cancel.cancelled() => {
                        tracing::debug!("startup context probe cancelled");
                    }
                }
            }));
        }

        tasks
    }
}

/// Build the router. Paths are relative; callers mount it where they like.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/commands/execute", post(handlers::execute_command))
        .route("/execute", post(handlers::execute_command))
        .route("/contexts", get(handlers::list_contexts))
        .route("/namespaces", get(handlers::list_namespaces))
        .route("/pods", get(handlers::list_pods))
        .route(
            "/history",
            get(handlers::list_history).delete(handlers::clear_history),
        )
        .route(
            "/cluster-config",
            get(handlers::get_cluster_config).put(handlers::put_cluster_config),
        )
        .route(
            "/config",
            get(handlers::get_cluster_config)
                .put(handlers::put_cluster_config)
                .post(handlers::put_cluster_config),
        )
        .route("/healthz", get(handlers::healthz))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::kubectl::tests::ScriptedRunner;
    use crate::exec::{ExecutionResult, PolicyValidator, REJECTION_MESSAGE};
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode, header};
    use serde_json::{Value, json};
    use std::path::PathBuf;
    use std::time::Duration;
    use tower::ServiceExt;

    fn state_with(runner: ScriptedRunner, config_path: Option<PathBuf>) -> (AppState, Arc<ScriptedRunner>) {
        let runner = Arc::new(runner);
        let pipeline = ExecutionPipeline::new(PolicyValidator::default(), runner.clone());
        let queries = KubectlQueries::new("kubectl", runner.clone(), Duration::from_secs(1));
        let cache = Arc::new(ClusterMetadataCache::new(config_path, queries));
        let history: Arc<dyn HistoryStore> = Arc::new(MemoryHistory::new(100));
        (AppState::new(pipeline, cache, history), runner)
    }

    async fn send(state: &AppState, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("build request");
        dispatch(state, request).await
    }

    /// Send a raw JSON-typed body, valid or not.
    async fn send_raw(state: &AppState, method: Method, uri: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("build request");
        dispatch(state, request).await
    }

    async fn dispatch(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
        let response = router(state.clone())
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_execute_end_to_end() {
        let (state, runner) = state_with(
            ScriptedRunner::default().respond(
                "kubectl get pods --namespace=default --context=minikube",
                ExecutionResult::completed("NAME    READY\nweb-0   1/1\n", ""),
            ),
            None,
        );

        let (status, body) = send(
            &state,
            Method::POST,
            "/commands/execute",
            Some(json!({ "command": "kubectl get pods" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["output"], "NAME    READY\nweb-0   1/1\n");
        assert_eq!(body["error"], "");
        assert_eq!(
            runner.calls(),
            vec!["kubectl get pods --namespace=default --context=minikube"]
        );

        let (_, history) = send(&state, Method::GET, "/history", None).await;
        assert_eq!(history[0]["command"], "kubectl get pods");
        assert_eq!(history[0]["status"], "success");
        assert_eq!(history[0]["namespace"], "default");
        assert_eq!(history[0]["context"], "minikube");
    }

    #[tokio::test]
    async fn test_execute_in_pod() {
        let (state, _) = state_with(
            ScriptedRunner::default().respond(
                "kubectl exec -i p1 --namespace=ns1 --context=ctx1 -- kubectl get files",
                ExecutionResult::completed("files\n", ""),
            ),
            None,
        );
        let (status, body) = send(
            &state,
            Method::POST,
            "/commands/execute",
            Some(json!({
                "command": "kubectl get files",
                "namespace": "ns1",
                "context": "ctx1",
                "pod": "p1"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["output"], "files\n");
    }

    #[tokio::test]
    async fn test_execute_rejected_command() {
        let (state, runner) = state_with(ScriptedRunner::default(), None);
        let (status, body) = send(
            &state,
            Method::POST,
            "/commands/execute",
            Some(json!({ "command": "kubectl get pods; rm -rf /" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["output"], "");
        assert_eq!(body["error"], REJECTION_MESSAGE);
        assert!(runner.calls().is_empty());

        let (_, history) = send(&state, Method::GET, "/history", None).await;
        assert_eq!(history[0]["status"], "error");
    }

    #[tokio::test]
    async fn test_execute_empty_command_is_bad_request() {
        let (state, runner) = state_with(ScriptedRunner::default(), None);
        let (status, body) = send(
            &state,
            Method::POST,
            "/commands/execute",
            Some(json!({ "command": "  " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Command is required");
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_contexts_from_defaults() {
        let (state, _) = state_with(ScriptedRunner::default(), None);
        let (status, body) = send(&state, Method::GET, "/contexts", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!([
                { "name": "minikube", "available": false },
                { "name": "docker-desktop", "available": false },
                { "name": "production", "available": false }
            ])
        );
    }

    #[tokio::test]
    async fn test_contexts_live_alias() {
        let (state, _) = state_with(
            ScriptedRunner::default().respond(
                "kubectl config get-contexts -o name",
                ExecutionResult::completed("kind-dev\n", ""),
            ),
            None,
        );
        let (_, body) = send(&state, Method::GET, "/contexts?useKubeconfig=true", None).await;
        assert_eq!(body, json!([{ "name": "kind-dev", "available": false }]));

        let (_, body) = send(&state, Method::GET, "/contexts?live=true", None).await;
        assert_eq!(body, json!([{ "name": "kind-dev", "available": false }]));
    }

    #[tokio::test]
    async fn test_namespaces_fall_back_to_defaults() {
        let (state, _) = state_with(ScriptedRunner::default(), None);
        let (_, body) = send(&state, Method::GET, "/namespaces?context=unknown", None).await;
        assert_eq!(body, json!(["default", "kube-system", "kube-public"]));

        let (status, body) = send(&state, Method::GET, "/namespaces", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(["default", "kube-system", "kube-public"]));
    }

    #[tokio::test]
    async fn test_namespaces_from_cluster_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cluster.json");
        std::fs::write(
            &path,
            r#"{"contexts": ["minikube"], "namespaces": {"minikube": ["apps", "default"]}}"#,
        )
        .expect("write cluster config");

        let (state, _) = state_with(ScriptedRunner::default(), Some(path));
        state.cache.reload().await;
        let (_, body) = send(&state, Method::GET, "/namespaces", None).await;
        assert_eq!(body, json!(["apps", "default"]));
    }

    #[tokio::test]
    async fn test_pods_require_namespace_and_context() {
        let (state, runner) = state_with(ScriptedRunner::default(), None);
        for uri in ["/pods", "/pods?namespace=apps", "/pods?context=kind-dev", "/pods?namespace=&context=kind-dev"] {
            let (status, body) = send(&state, Method::GET, uri, None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["message"], "Namespace and context are required");
        }
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_pods() {
        let (state, _) = state_with(
            ScriptedRunner::default().respond(
                "kubectl get pods --namespace=apps --context=kind-dev -o name",
                ExecutionResult::completed("pod/api-0\npod/api-1\n", ""),
            ),
            None,
        );
        let (status, body) =
            send(&state, Method::GET, "/pods?namespace=apps&context=kind-dev", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(["api-0", "api-1"]));
    }

    #[tokio::test]
    async fn test_clear_history() {
        let (state, _) = state_with(ScriptedRunner::default(), None);
        send(
            &state,
            Method::POST,
            "/commands/execute",
            Some(json!({ "command": "kubectl version" })),
        )
        .await;

        let (status, body) = send(&state, Method::DELETE, "/history", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "History cleared");

        let (_, history) = send(&state, Method::GET, "/history", None).await;
        assert_eq!(history, json!([]));
    }

    #[tokio::test]
    async fn test_put_cluster_config_without_file_conflicts() {
        let (state, _) = state_with(ScriptedRunner::default(), None);
        let (status, body) = send(
            &state,
            Method::PUT,
            "/cluster-config",
            Some(json!({ "contexts": ["kind-dev"] })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "no cluster config file is configured");
    }

    #[tokio::test]
    async fn test_put_then_get_cluster_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cluster.json");
        let (state, _) = state_with(ScriptedRunner::default(), Some(path.clone()));

        let config = json!({ "contexts": ["kind-dev"], "namespaces": { "kind-dev": ["apps"] } });
        let (status, body) = send(&state, Method::PUT, "/cluster-config", Some(config.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, config);
        assert!(path.exists());

        let (_, body) = send(&state, Method::GET, "/cluster-config", None).await;
        assert_eq!(body, config);
    }

    #[tokio::test]
    async fn test_put_cluster_config_rejects_unsafe_context() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (state, _) = state_with(ScriptedRunner::default(), Some(dir.path().join("cluster.json")));
        let (status, _) = send(
            &state,
            Method::PUT,
            "/cluster-config",
            Some(json!({ "contexts": ["prod; rm -rf /"] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_healthz() {
        let (state, _) = state_with(ScriptedRunner::default(), None);
        let (status, body) = send(&state, Method::GET, "/healthz", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_background_tasks_stop_on_cancel() {
        let (state, _) = state_with(ScriptedRunner::default(), None);
        let cluster = ClusterSourceConfig {
            watch: true,
            refresh_interval_secs: 1,
            probe_on_start: true,
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        let tasks = state.spawn_background(&cluster, cancel.clone());
        assert_eq!(tasks.len(), 3);

        cancel.cancel();
        for task in tasks {
            tokio::time::timeout(Duration::from_secs(2), task)
                .await
                .expect("task stops after cancel")
                .expect("task did not panic");
        }
    }

    #[tokio::test]
    async fn test_execute_missing_command_is_json_bad_request() {
        let (state, runner) = state_with(ScriptedRunner::default(), None);
        let (status, body) = send_raw(
            &state,
            Method::POST,
            "/commands/execute",
            r#"{"namespace":"default"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(
            body["message"].as_str().is_some_and(|m| m.contains("command")),
            "message should name the missing field: {body}"
        );
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_execute_malformed_body_is_json_bad_request() {
        let (state, _) = state_with(ScriptedRunner::default(), None);
        let (status, body) = send_raw(&state, Method::POST, "/commands/execute", "not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn test_bad_query_is_json_bad_request() {
        let (state, _) = state_with(ScriptedRunner::default(), None);
        let (status, body) = send(&state, Method::GET, "/contexts?live=yes", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn test_malformed_cluster_config_is_json_bad_request() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (state, _) = state_with(ScriptedRunner::default(), Some(dir.path().join("cluster.json")));
        let (status, body) = send_raw(&state, Method::PUT, "/cluster-config", "{ nope").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn test_browser_client_aliases() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (state, _) = state_with(
            ScriptedRunner::default().respond(
                "kubectl get ns --namespace=default --context=minikube",
                ExecutionResult::completed("default\n", ""),
            ),
            Some(dir.path().join("cluster.json")),
        );

        let (status, body) = send(
            &state,
            Method::POST,
            "/execute",
            Some(json!({ "command": "kubectl get ns" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["output"], "default\n");

        let config = json!({ "contexts": ["kind-dev"], "namespaces": {} });
        let (status, _) = send(&state, Method::POST, "/config", Some(config.clone())).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = send(&state, Method::GET, "/config", None).await;
        assert_eq!(body, config);
    }
}
