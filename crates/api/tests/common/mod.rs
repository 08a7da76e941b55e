//! Shared test harness: a full application router wired to a stub
//! engine, mirroring the construction in `main.rs` so integration tests
//! exercise the same middleware stack that production uses.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, Request, Response, StatusCode};
use axum::Router;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use renderbox_api::config::ServerConfig;
use renderbox_api::routes;
use renderbox_api::state::AppState;
use renderbox_comfyui::command::{CommandError, EngineCommand};
use renderbox_comfyui::config::EngineConfig;
use renderbox_comfyui::engine::EngineLifecycle;
use renderbox_core::template::{RoleOverrides, WorkflowTemplate};
use renderbox_core::workflow::{NodeDefinition, WorkflowGraph};

/// How the stub engine behaves when a job is run.
#[derive(Clone)]
pub enum EngineBehavior {
    /// Parse the job file's save node prefix and write
    /// `<prefix>_00001.png` with the given payload.
    Produce(Vec<u8>),
    /// Exit non-zero with a diagnostic.
    FailRun,
    /// Never complete (exercises the dispatch timeout).
    HangRun,
    /// Fail the launch command (exercises terminal engine failure).
    FailLaunch,
    /// Complete successfully but write nothing (post-success
    /// correlation failure).
    ProduceNothing,
}

/// Stub implementation of the engine command seam with call counting.
pub struct StubEngine {
    behavior: EngineBehavior,
    output_dir: PathBuf,
    pub launches: Arc<AtomicUsize>,
    pub runs: Arc<AtomicUsize>,
}

#[async_trait]
impl EngineCommand for StubEngine {
    async fn launch(&self) -> Result<(), CommandError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            EngineBehavior::FailLaunch => Err(CommandError::Exit {
                exit_code: 1,
                stderr: "model checkpoint missing".to_string(),
            }),
            _ => Ok(()),
        }
    }

    async fn is_ready(&self) -> bool {
        true
    }

    async fn run_job(&self, job_path: &Path) -> Result<(), CommandError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            EngineBehavior::Produce(payload) => {
                let prefix = save_prefix(job_path);
                std::fs::write(self.output_dir.join(format!("{prefix}_00001.png")), payload)
                    .expect("write artifact");
                Ok(())
            }
            EngineBehavior::ProduceNothing => Ok(()),
            EngineBehavior::FailRun => Err(CommandError::Exit {
                exit_code: 1,
                stderr: "CUDA out of memory".to_string(),
            }),
            EngineBehavior::HangRun => {
                tokio::time::sleep(Duration::from_secs(120)).await;
                Ok(())
            }
            EngineBehavior::FailLaunch => Ok(()),
        }
    }
}

/// Extract the save node's `filename_prefix` from a submitted job file,
/// the same way the real engine names its outputs.
fn save_prefix(job_path: &Path) -> String {
    let raw = std::fs::read_to_string(job_path).expect("read job file");
    let graph: serde_json::Value = serde_json::from_str(&raw).expect("parse job file");
    graph
        .as_object()
        .expect("job is an object")
        .values()
        .find(|node| node["class_type"] == "SaveImage")
        .and_then(|node| node["inputs"]["filename_prefix"].as_str())
        .expect("save node has a filename_prefix")
        .to_string()
}

/// A fully wired application plus handles for assertions.
pub struct TestApp {
    pub router: Router,
    pub launches: Arc<AtomicUsize>,
    pub runs: Arc<AtomicUsize>,
    pub output_dir: PathBuf,
    pub jobs_dir: PathBuf,
    // Held so the temp dirs outlive the test.
    _dirs: Vec<tempfile::TempDir>,
}

/// Template in the shape of the original text-to-image workflow:
/// prompt encoder at node "6", save node at "9".
pub fn sample_graph() -> WorkflowGraph {
    fn node(class_type: &str, inputs: serde_json::Value) -> NodeDefinition {
        NodeDefinition {
            class_type: class_type.to_string(),
            inputs: inputs.as_object().cloned().unwrap_or_default(),
            extra: serde_json::Map::new(),
        }
    }

    let mut graph = WorkflowGraph::new();
    graph.insert(
        "6".to_string(),
        node(
            "CLIPTextEncode",
            serde_json::json!({ "text": "placeholder", "clip": ["4", 1] }),
        ),
    );
    graph.insert(
        "9".to_string(),
        node(
            "SaveImage",
            serde_json::json!({ "filename_prefix": "ComfyUI", "images": ["8", 0] }),
        ),
    );
    graph
}

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        template_path: PathBuf::from("unused-in-tests.json"),
        audit_dir: None,
        roles: RoleOverrides::default(),
    }
}

/// Build the full application router with all middleware layers, backed
/// by a stub engine with the given behaviour.
///
/// The dispatch timeout is one second so timeout tests stay fast.
pub fn build_test_app(behavior: EngineBehavior) -> TestApp {
    let jobs_tmp = tempfile::tempdir().expect("jobs dir");
    let output_tmp = tempfile::tempdir().expect("output dir");
    let jobs_dir = jobs_tmp.path().to_path_buf();
    let output_dir = output_tmp.path().to_path_buf();

    let launches = Arc::new(AtomicUsize::new(0));
    let runs = Arc::new(AtomicUsize::new(0));

    let stub = Arc::new(StubEngine {
        behavior,
        output_dir: output_dir.clone(),
        launches: Arc::clone(&launches),
        runs: Arc::clone(&runs),
    });

    let engine_config = EngineConfig {
        comfy_bin: "comfy".to_string(),
        api_url: "http://127.0.0.1:8188".to_string(),
        output_dir: output_dir.clone(),
        jobs_dir: jobs_dir.clone(),
        startup_timeout_secs: 5,
        dispatch_timeout_secs: 1,
    };

    let template = WorkflowTemplate::from_graph(sample_graph(), &RoleOverrides::default())
        .expect("sample template is valid");

    let engine = Arc::new(EngineLifecycle::new(
        stub as Arc<dyn EngineCommand>,
        engine_config.startup_timeout(),
    ));

    let state = AppState {
        config: Arc::new(test_config()),
        engine_config: Arc::new(engine_config),
        template: Arc::new(template),
        engine,
    };

    let request_id_header = HeaderName::from_static("x-request-id");

    let router = Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .with_state(state);

    TestApp {
        router,
        launches,
        runs,
        output_dir,
        jobs_dir,
        _dirs: vec![jobs_tmp, output_tmp],
    }
}

/// Issue a GET request against the app.
pub async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("build request"),
    )
    .await
    .expect("request")
}

/// Issue a POST request with a JSON body against the app.
pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("build request"),
    )
    .await
    .expect("request")
}

/// Collect a response body as raw bytes.
pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    use http_body_util::BodyExt;
    response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes()
        .to_vec()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).expect("body is JSON")
}
