//! In-memory stand-in for the Domo dataset and stream APIs.
//!
//! Issues bearer tokens for the client-credentials grant, keeps datasets with
//! their CSV rows, and runs stream executions through
//! `ACTIVE -> SUCCESS | ABORTED`. Error bodies follow the platform's
//! `{status, statusReason, message}` shape.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    #[serde(rename = "type")]
    pub column_type: String,
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub columns: Vec<Column>,
}

impl Schema {
    fn header_line(&self) -> String {
        self.columns
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSet {
    pub id: String,
    pub name: String,
    pub description: String,
    pub rows: usize,
    pub columns: usize,
    pub schema: Schema,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stream {
    pub id: u64,
    pub data_set: DataSet,
    pub update_method: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub id: u64,
    pub current_state: String,
    pub update_method: String,
}

#[derive(Deserialize)]
pub struct CreateDataSet {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub schema: Schema,
}

#[derive(Deserialize)]
pub struct UpdateDataSet {
    pub name: Option<String>,
    pub description: Option<String>,
    pub schema: Option<Schema>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStream {
    pub data_set: CreateDataSet,
    #[serde(default = "default_update_method")]
    pub update_method: String,
}

fn default_update_method() -> String {
    "APPEND".to_string()
}

/// A dataset plus the rows it holds.
#[derive(Debug, Clone)]
pub struct StoredDataSet {
    pub meta: DataSet,
    pub data: Vec<String>,
}

impl StoredDataSet {
    fn new(id: String, input: CreateDataSet) -> Self {
        let mut stored = Self {
            meta: DataSet {
                id,
                name: input.name,
                description: input.description,
                rows: 0,
                columns: 0,
                schema: input.schema,
            },
            data: Vec::new(),
        };
        stored.refresh_counts();
        stored
    }

    fn refresh_counts(&mut self) {
        self.meta.rows = self.data.len();
        self.meta.columns = self.meta.schema.columns.len();
    }

    /// Load CSV text, dropping blank lines and a leading line that repeats
    /// the schema header.
    fn import(&mut self, csv: &str, replace: bool) {
        let header = self.meta.schema.header_line();
        let mut lines = csv.lines().filter(|l| !l.trim().is_empty()).peekable();
        if lines.peek().is_some_and(|first| !header.is_empty() && *first == header) {
            lines.next();
        }
        let rows: Vec<String> = lines.map(str::to_string).collect();
        if replace {
            self.data = rows;
        } else {
            self.data.extend(rows);
        }
        self.refresh_counts();
    }

    fn export(&self, include_header: bool) -> String {
        let mut out = String::new();
        if include_header {
            out.push_str(&self.meta.schema.header_line());
            out.push('\n');
        }
        for row in &self.data {
            out.push_str(row);
            out.push('\n');
        }
        out
    }
}

/// An execution plus the parts uploaded so far, keyed by part number.
#[derive(Debug, Clone)]
pub struct StoredExecution {
    pub stream_id: u64,
    pub execution: Execution,
    pub parts: BTreeMap<u32, String>,
}

#[derive(Debug, Default)]
pub struct Store {
    /// When set, the token endpoint only accepts this id/secret pair.
    pub client: Option<(String, String)>,
    /// Number of tokens issued so far.
    pub token_requests: u64,
    pub tokens: HashSet<String>,
    pub datasets: HashMap<String, StoredDataSet>,
    pub streams: HashMap<u64, Stream>,
    pub executions: HashMap<u64, StoredExecution>,
    next_id: u64,
}

impl Store {
    pub fn with_client(client_id: &str, client_secret: &str) -> Self {
        Self {
            client: Some((client_id.to_string(), client_secret.to_string())),
            ..Self::default()
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

pub type Db = Arc<RwLock<Store>>;

type ApiResult<T> = Result<T, (StatusCode, Json<Value>)>;

fn error(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (
        status,
        Json(json!({
            "status": status.as_u16(),
            "statusReason": status.canonical_reason().unwrap_or_default(),
            "message": message,
        })),
    )
}

pub fn app() -> Router {
    app_with(Db::default())
}

pub fn app_with(db: Db) -> Router {
    Router::new()
        .route("/oauth/token", post(issue_token))
        .route("/v1/datasets", get(list_datasets).post(create_dataset))
        .route(
            "/v1/datasets/{id}",
            get(get_dataset).put(update_dataset).delete(delete_dataset),
        )
        .route("/v1/datasets/{id}/data", get(export_data).put(import_data))
        .route("/v1/streams", post(create_stream))
        .route("/v1/streams/{stream_id}/executions", post(create_execution))
        .route(
            "/v1/streams/{stream_id}/executions/{execution_id}/part/{part}",
            put(upload_part),
        )
        .route(
            "/v1/streams/{stream_id}/executions/{execution_id}/commit",
            put(commit_execution),
        )
        .route(
            "/v1/streams/{stream_id}/executions/{execution_id}/abort",
            put(abort_execution),
        )
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    serve(listener, Db::default()).await
}

/// Serve with a caller-held store so tests can inspect it.
pub async fn serve(listener: TcpListener, db: Db) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with(db)).await
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct TokenParams {
    grant_type: Option<String>,
    scope: Option<String>,
}

fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = String::from_utf8(BASE64.decode(encoded).ok()?).ok()?;
    let (id, secret) = decoded.split_once(':')?;
    Some((id.to_string(), secret.to_string()))
}

async fn issue_token(
    State(db): State<Db>,
    Query(params): Query<TokenParams>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    if params.grant_type.as_deref() != Some("client_credentials") {
        return Err(error(StatusCode::BAD_REQUEST, "unsupported grant_type"));
    }
    let (id, secret) = basic_credentials(&headers)
        .filter(|(id, secret)| !id.is_empty() && !secret.is_empty())
        .ok_or_else(|| error(StatusCode::UNAUTHORIZED, "Full authentication is required"))?;

    let mut store = db.write().await;
    if let Some((expected_id, expected_secret)) = &store.client {
        if *expected_id != id || *expected_secret != secret {
            return Err(error(StatusCode::UNAUTHORIZED, "Bad credentials"));
        }
    }
    let token = Uuid::new_v4().to_string();
    store.tokens.insert(token.clone());
    store.token_requests += 1;
    tracing::info!(client_id = %id, "issued access token");

    Ok(Json(json!({
        "access_token": token,
        "token_type": "bearer",
        "expires_in": 3599,
        "scope": params.scope.unwrap_or_default(),
        "customer": "mock",
        "jti": Uuid::new_v4().to_string(),
    })))
}

fn authorize(headers: &HeaderMap, store: &Store) -> ApiResult<()> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match token {
        Some(token) if store.tokens.contains(token) => Ok(()),
        _ => Err(error(StatusCode::UNAUTHORIZED, "Full authentication is required")),
    }
}

// ---------------------------------------------------------------------------
// Datasets
// ---------------------------------------------------------------------------

async fn list_datasets(State(db): State<Db>, headers: HeaderMap) -> ApiResult<Json<Vec<DataSet>>> {
    let store = db.read().await;
    authorize(&headers, &store)?;
    Ok(Json(store.datasets.values().map(|d| d.meta.clone()).collect()))
}

async fn create_dataset(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(input): Json<CreateDataSet>,
) -> ApiResult<(StatusCode, Json<DataSet>)> {
    let mut store = db.write().await;
    authorize(&headers, &store)?;
    let id = Uuid::new_v4().to_string();
    let stored = StoredDataSet::new(id.clone(), input);
    let meta = stored.meta.clone();
    store.datasets.insert(id, stored);
    Ok((StatusCode::CREATED, Json(meta)))
}

fn not_found() -> (StatusCode, Json<Value>) {
    error(StatusCode::NOT_FOUND, "Not Found")
}

async fn get_dataset(
    State(db): State<Db>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<DataSet>> {
    let store = db.read().await;
    authorize(&headers, &store)?;
    store
        .datasets
        .get(&id)
        .map(|d| Json(d.meta.clone()))
        .ok_or_else(not_found)
}

async fn update_dataset(
    State(db): State<Db>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<UpdateDataSet>,
) -> ApiResult<Json<DataSet>> {
    let mut store = db.write().await;
    authorize(&headers, &store)?;
    let dataset = store.datasets.get_mut(&id).ok_or_else(not_found)?;
    if let Some(name) = input.name {
        dataset.meta.name = name;
    }
    if let Some(description) = input.description {
        dataset.meta.description = description;
    }
    if let Some(schema) = input.schema {
        dataset.meta.schema = schema;
    }
    dataset.refresh_counts();
    Ok(Json(dataset.meta.clone()))
}

async fn delete_dataset(
    State(db): State<Db>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let mut store = db.write().await;
    authorize(&headers, &store)?;
    store
        .datasets
        .remove(&id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(not_found)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportParams {
    update_method: Option<String>,
}

async fn import_data(
    State(db): State<Db>,
    Path(id): Path<String>,
    Query(params): Query<ImportParams>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<StatusCode> {
    let mut store = db.write().await;
    authorize(&headers, &store)?;
    let replace = match params.update_method.as_deref() {
        None | Some("REPLACE") => true,
        Some("APPEND") => false,
        Some(_) => return Err(error(StatusCode::BAD_REQUEST, "Invalid updateMethod")),
    };
    let dataset = store.datasets.get_mut(&id).ok_or_else(not_found)?;
    dataset.import(&body, replace);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportParams {
    #[serde(default)]
    include_header: bool,
    file_name: Option<String>,
}

async fn export_data(
    State(db): State<Db>,
    Path(id): Path<String>,
    Query(params): Query<ExportParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let store = db.read().await;
    authorize(&headers, &store)?;
    let dataset = store.datasets.get(&id).ok_or_else(not_found)?;
    let file_name = params.file_name.unwrap_or_else(|| format!("{id}.csv"));
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        dataset.export(params.include_header),
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// Streams
// ---------------------------------------------------------------------------

async fn create_stream(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(input): Json<CreateStream>,
) -> ApiResult<(StatusCode, Json<Stream>)> {
    let mut store = db.write().await;
    authorize(&headers, &store)?;
    if !matches!(input.update_method.as_str(), "APPEND" | "REPLACE") {
        return Err(error(StatusCode::BAD_REQUEST, "Invalid updateMethod"));
    }
    let dataset_id = Uuid::new_v4().to_string();
    let stored = StoredDataSet::new(dataset_id.clone(), input.data_set);
    let stream = Stream {
        id: store.next_id(),
        data_set: stored.meta.clone(),
        update_method: input.update_method,
    };
    store.datasets.insert(dataset_id, stored);
    store.streams.insert(stream.id, stream.clone());
    Ok((StatusCode::CREATED, Json(stream)))
}

async fn create_execution(
    State(db): State<Db>,
    Path(stream_id): Path<u64>,
    headers: HeaderMap,
) -> ApiResult<(StatusCode, Json<Execution>)> {
    let mut store = db.write().await;
    authorize(&headers, &store)?;
    let update_method = store
        .streams
        .get(&stream_id)
        .map(|s| s.update_method.clone())
        .ok_or_else(not_found)?;
    let execution = Execution {
        id: store.next_id(),
        current_state: "ACTIVE".to_string(),
        update_method,
    };
    store.executions.insert(
        execution.id,
        StoredExecution {
            stream_id,
            execution: execution.clone(),
            parts: BTreeMap::new(),
        },
    );
    Ok((StatusCode::CREATED, Json(execution)))
}

/// The execution addressed by the path, if it belongs to that stream and is
/// still accepting work.
fn active_execution(
    store: &mut Store,
    stream_id: u64,
    execution_id: u64,
) -> ApiResult<&mut StoredExecution> {
    let stored = store
        .executions
        .get_mut(&execution_id)
        .filter(|e| e.stream_id == stream_id)
        .ok_or_else(not_found)?;
    if stored.execution.current_state != "ACTIVE" {
        return Err(error(
            StatusCode::BAD_REQUEST,
            &format!("Execution is {}", stored.execution.current_state),
        ));
    }
    Ok(stored)
}

async fn upload_part(
    State(db): State<Db>,
    Path((stream_id, execution_id, part)): Path<(u64, u64, u32)>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<Json<Execution>> {
    let mut store = db.write().await;
    authorize(&headers, &store)?;
    if part == 0 {
        return Err(error(StatusCode::BAD_REQUEST, "Part numbers start at 1"));
    }
    let stored = active_execution(&mut store, stream_id, execution_id)?;
    stored.parts.insert(part, body);
    Ok(Json(stored.execution.clone()))
}

async fn commit_execution(
    State(db): State<Db>,
    Path((stream_id, execution_id)): Path<(u64, u64)>,
    headers: HeaderMap,
) -> ApiResult<Json<Execution>> {
    let mut store = db.write().await;
    authorize(&headers, &store)?;
    let dataset_id = store
        .streams
        .get(&stream_id)
        .map(|s| s.data_set.id.clone())
        .ok_or_else(not_found)?;

    let stored = active_execution(&mut store, stream_id, execution_id)?;
    stored.execution.current_state = "SUCCESS".to_string();
    let replace = stored.execution.update_method == "REPLACE";
    let csv: Vec<String> = std::mem::take(&mut stored.parts).into_values().collect();
    let execution = stored.execution.clone();

    if let Some(dataset) = store.datasets.get_mut(&dataset_id) {
        dataset.import(&csv.join("\n"), replace);
    }
    Ok(Json(execution))
}

async fn abort_execution(
    State(db): State<Db>,
    Path((stream_id, execution_id)): Path<(u64, u64)>,
    headers: HeaderMap,
) -> ApiResult<Json<Execution>> {
    let mut store = db.write().await;
    authorize(&headers, &store)?;
    let stored = active_execution(&mut store, stream_id, execution_id)?;
    stored.execution.current_state = "ABORTED".to_string();
    stored.parts.clear();
    Ok(Json(stored.execution.clone()))
}
