//! SmartDB Architect HTTP API.
//!
//! A small hyper server exposing the describe → synthesize → execute
//! pipeline as JSON endpoints:
//! - `POST /api/nl-to-sql` and `POST /api/er-to-sql` turn a text description
//!   or an uploaded ER diagram into DDL,
//! - `POST /api/execute-sql` runs a script in one transaction,
//! - `GET /api/schema` and `GET /api/schema/graph` introspect a database.
//!
//! Every request gets its own executor; SQLite work runs on the blocking pool.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, CONTENT_TYPE,
};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use url::form_urlencoded;

use smartdb_ddl::{synthesize, DdlSynthesizer, ER_DIAGRAM_HEADER};
use smartdb_describe::{DescribeError, SchemaDescriber};
use smartdb_exec::{DbEngine, QueryResult, SchemaGraph, SqlErrorInfo, SqlExecutor, TableInfo};

use crate::config::AppConfig;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub(crate) struct ServerState {
    config: AppConfig,
    describer: SchemaDescriber,
}

impl ServerState {
    pub(crate) fn new(config: AppConfig) -> Result<Self> {
        let describer = SchemaDescriber::from_config(&config.llm)
            .map_err(|e| anyhow!("failed to set up describer: {e}"))?;
        Ok(Self { config, describer })
    }
}

pub(crate) fn cmd_serve(config: AppConfig) -> Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow!("failed to initialize tokio runtime: {e}"))?;

    rt.block_on(async move { serve_async(config).await })
}

async fn serve_async(config: AppConfig) -> Result<()> {
    if let Some(dir) = config.data_dir.as_ref() {
        std::fs::create_dir_all(dir)
            .map_err(|e| anyhow!("serve: failed to create data dir {}: {e}", dir.display()))?;
    }

    let state = Arc::new(ServerState::new(config.clone())?);

    let listener = TcpListener::bind(config.listen)
        .await
        .map_err(|e| anyhow!("serve: failed to bind {}: {e}", config.listen))?;
    let bound = listener
        .local_addr()
        .map_err(|e| anyhow!("serve: failed to read bound addr: {e}"))?;

    tracing::info!(
        addr = %bound,
        describer = ?state.describer.backend(),
        "listening on http://{bound}"
    );
    if let Some(path) = config.ready_file.as_ref() {
        write_ready_file(path, bound);
    }

    loop {
        let (stream, _peer) = listener
            .accept()
            .await
            .map_err(|e| anyhow!("serve: accept failed: {e}"))?;
        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| handle_request(req, state.clone()));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::debug!(error = %e, "connection error");
            }
        });
    }
}

// ============================================================================
// Errors
// ============================================================================

/// A failure that already knows its HTTP status.
#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    fn into_response(self) -> Response<Full<Bytes>> {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.message, "request failed");
        } else {
            tracing::debug!(status = %self.status, error = %self.message, "request rejected");
        }
        json_error(self.status, &self.message)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self::internal(e.to_string())
    }
}

impl From<smartdb_exec::ExecError> for ApiError {
    fn from(e: smartdb_exec::ExecError) -> Self {
        Self::internal(e.to_string())
    }
}

impl From<DescribeError> for ApiError {
    fn from(e: DescribeError) -> Self {
        match e {
            DescribeError::EmptyInput => Self::bad_request(e.to_string()),
            other => Self::internal(other.to_string()),
        }
    }
}

// ============================================================================
// Routing
// ============================================================================

pub(crate) async fn handle_request<B>(
    req: Request<B>,
    state: Arc<ServerState>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);
    tracing::debug!(%method, %path, "request");

    let result = match (&method, path.as_str()) {
        (&Method::OPTIONS, _) => Ok(preflight_response()),
        (&Method::GET, "/") => Ok(json_response(
            StatusCode::OK,
            &serde_json::json!({ "message": "Welcome to SmartDB Architect API" }),
        )),
        (&Method::GET, "/healthz") => Ok(text_response(StatusCode::OK, "ok\n")),
        (&Method::POST, "/api/nl-to-sql") => match read_body(req, &state).await {
            Ok(body) => handle_nl_to_sql(&state, &body)
                .await
                .map(|v| json_response(StatusCode::OK, &v)),
            Err(e) => Err(e),
        },
        (&Method::POST, "/api/er-to-sql") => {
            let content_type = req
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            match read_body(req, &state).await {
                Ok(body) => handle_er_to_sql(&state, content_type.as_deref(), body)
                    .await
                    .map(|v| json_response(StatusCode::OK, &v)),
                Err(e) => Err(e),
            }
        }
        (&Method::POST, "/api/execute-sql") => match read_body(req, &state).await {
            Ok(body) => handle_execute_sql(&state, &body)
                .await
                .map(|v| json_response(StatusCode::OK, &v)),
            Err(e) => Err(e),
        },
        (&Method::GET, "/api/schema") => handle_schema(&state, query.as_deref())
            .await
            .map(|v| json_response(StatusCode::OK, &v)),
        (&Method::GET, "/api/schema/graph") => handle_schema_graph(&state, query.as_deref())
            .await
            .map(|v| json_response(StatusCode::OK, &v)),
        _ => Ok(json_error(StatusCode::NOT_FOUND, "not found")),
    };

    let mut resp = result.unwrap_or_else(ApiError::into_response);
    with_cors(&mut resp);
    Ok(resp)
}

async fn read_body<B>(req: Request<B>, state: &ServerState) -> Result<Bytes, ApiError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let limited = Limited::new(req.into_body(), state.config.max_body_bytes);
    match limited.collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(ApiError {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            message: format!(
                "request body exceeds {} bytes",
                state.config.max_body_bytes
            ),
        }),
        Err(e) => Err(ApiError::bad_request(format!(
            "failed to read request body: {e}"
        ))),
    }
}

fn parse_json<'a, T: Deserialize<'a>>(body: &'a [u8], what: &str) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("failed to parse {what} request JSON: {e}")))
}

fn parse_query_params(query: Option<&str>) -> HashMap<String, String> {
    let mut out = HashMap::new();
    let Some(q) = query else {
        return out;
    };
    for (k, v) in form_urlencoded::parse(q.as_bytes()) {
        out.insert(k.into_owned(), v.into_owned());
    }
    out
}

fn parse_engine(name: Option<&str>) -> Result<DbEngine, ApiError> {
    Ok(DbEngine::parse(name.unwrap_or("sqlite"))?)
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Debug, Deserialize)]
struct NlToSqlRequest {
    text_description: String,
    #[serde(default)]
    db_engine: Option<String>,
}

#[derive(Debug, Serialize)]
struct SqlCodeResponse {
    sql_code: String,
}

async fn handle_nl_to_sql(state: &ServerState, body: &[u8]) -> Result<SqlCodeResponse, ApiError> {
    let req: NlToSqlRequest = parse_json(body, "nl-to-sql")?;
    parse_engine(req.db_engine.as_deref())?;

    let schema = state.describer.describe_text(&req.text_description).await?;
    tracing::info!(
        entities = schema.entities.len(),
        relationships = schema.relationships.len(),
        "described text"
    );
    Ok(SqlCodeResponse {
        sql_code: synthesize(&schema),
    })
}

/// The `file` part and optional `db_engine` field of an ER upload.
struct ErUpload {
    file: Bytes,
    db_engine: Option<String>,
}

async fn read_er_upload(content_type: Option<&str>, body: Bytes) -> Result<ErUpload, ApiError> {
    let content_type =
        content_type.ok_or_else(|| ApiError::bad_request("expected multipart/form-data body"))?;
    let boundary = multer::parse_boundary(content_type)
        .map_err(|e| ApiError::bad_request(format!("expected multipart/form-data body: {e}")))?;

    let stream = futures_util::stream::once(async move { Ok::<Bytes, Infallible>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut file = None;
    let mut db_engine = None;
    loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(format!("malformed multipart body: {e}")))?;
        let Some(field) = field else {
            break;
        };
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("failed to read `file`: {e}")))?;
                file = Some(bytes);
            }
            Some("db_engine") => {
                let text = field.text().await.map_err(|e| {
                    ApiError::bad_request(format!("failed to read `db_engine`: {e}"))
                })?;
                db_engine = Some(text);
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| ApiError::bad_request("missing `file` part"))?;
    Ok(ErUpload { file, db_engine })
}

async fn handle_er_to_sql(
    state: &ServerState,
    content_type: Option<&str>,
    body: Bytes,
) -> Result<SqlCodeResponse, ApiError> {
    let upload = read_er_upload(content_type, body).await?;
    parse_engine(upload.db_engine.as_deref())?;

    let schema = state.describer.describe_image(&upload.file).await?;
    tracing::info!(
        bytes = upload.file.len(),
        entities = schema.entities.len(),
        "described ER diagram"
    );
    let sql_code = DdlSynthesizer::new()
        .with_header(ER_DIAGRAM_HEADER)
        .synthesize(&schema);
    Ok(SqlCodeResponse { sql_code })
}

#[derive(Debug, Deserialize)]
struct ExecuteSqlRequest {
    sql_code: String,
    #[serde(default)]
    db_engine: Option<String>,
    #[serde(default)]
    database: Option<String>,
}

#[derive(Debug, Serialize)]
struct ExecuteSqlResponse {
    sql_code: String,
    execution_log: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    results: Option<Vec<QueryResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_details: Option<SqlErrorInfo>,
}

/// Open an executor on the requested database, or on a fresh temporary one.
fn open_executor(
    state: &ServerState,
    engine: DbEngine,
    database: Option<&str>,
) -> Result<SqlExecutor, ApiError> {
    let path = state.config.database_path(database)?;
    let mut executor = SqlExecutor::new(engine);
    executor.try_connect(path.as_deref())?;
    Ok(executor)
}

/// Announce the bound address; failures are logged, never fatal.
fn write_ready_file(path: &Path, addr: SocketAddr) -> bool {
    let payload = serde_json::json!({
        "version": "smartdb_server_ready_v1",
        "addr": addr.to_string(),
        "pid": std::process::id(),
    });
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!(
                path = %parent.display(),
                error = %e,
                "failed to create ready file directory"
            );
            return false;
        }
    }
    match std::fs::write(path, payload.to_string()) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to write ready file");
            false
        }
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::internal(format!("database task failed: {e}")))?
}

async fn handle_execute_sql(
    state: &Arc<ServerState>,
    body: &[u8],
) -> Result<ExecuteSqlResponse, ApiError> {
    let req: ExecuteSqlRequest = parse_json(body, "execute-sql")?;
    let engine = parse_engine(req.db_engine.as_deref())?;

    let state = state.clone();
    run_blocking(move || {
        let mut executor = open_executor(&state, engine, req.database.as_deref())?;
        let outcome = executor.execute(&req.sql_code);
        executor.disconnect();

        tracing::info!(
            success = outcome.success,
            statements = outcome.log.len(),
            "executed script"
        );
        let execution_log = outcome.log_text();
        let results = (!outcome.results.is_empty()).then_some(outcome.results);
        let (error, error_details) = if outcome.success {
            (None, None)
        } else {
            (Some(outcome.message), outcome.error)
        };
        Ok(ExecuteSqlResponse {
            sql_code: req.sql_code,
            execution_log,
            results,
            error,
            error_details,
        })
    })
    .await
}

#[derive(Debug, Serialize)]
struct SchemaResponse {
    success: bool,
    tables: Vec<TableInfo>,
}

async fn load_schema(
    state: &Arc<ServerState>,
    query: Option<&str>,
) -> Result<smartdb_exec::DatabaseSchema, ApiError> {
    let params = parse_query_params(query);
    let engine = parse_engine(params.get("db_engine").map(String::as_str))?;
    let database = params.get("database").cloned();

    let state = state.clone();
    run_blocking(move || {
        let mut executor = open_executor(&state, engine, database.as_deref())?;
        let schema = executor.get_schema()?;
        executor.disconnect();
        Ok(schema)
    })
    .await
}

async fn handle_schema(
    state: &Arc<ServerState>,
    query: Option<&str>,
) -> Result<SchemaResponse, ApiError> {
    let schema = load_schema(state, query).await?;
    Ok(SchemaResponse {
        success: true,
        tables: schema.tables,
    })
}

async fn handle_schema_graph(
    state: &Arc<ServerState>,
    query: Option<&str>,
) -> Result<SchemaGraph, ApiError> {
    let schema = load_schema(state, query).await?;
    Ok(SchemaGraph::from_schema(&schema))
}

// ============================================================================
// Responses
// ============================================================================

fn with_cors(resp: &mut Response<Full<Bytes>>) {
    let headers = resp.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
}

fn preflight_response() -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::new()));
    *resp.status_mut() = StatusCode::NO_CONTENT;
    resp.headers_mut()
        .insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("600"));
    resp
}

fn text_response(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"internal error"))))
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{\"error\":\"serialize\"}".to_vec());
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"{\"error\":\"internal\"}"))))
}

fn json_error(status: StatusCode, msg: &str) -> Response<Full<Bytes>> {
    let v = serde_json::json!({ "error": msg });
    json_response(status, &v)
}
