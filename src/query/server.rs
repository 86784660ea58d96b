use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::core::Record;
use crate::error::StoreError;
use crate::service::{DeleteRequest, ListRequest, ReadRequest, Store, WriteRequest};
use crate::stats::{RebuildStats, StatusReport};

#[derive(Serialize, Deserialize)]
pub struct ReadResponse {
    pub records: Vec<Record>,
}

#[derive(Serialize, Deserialize)]
pub struct ListResponse {
    pub keys: Vec<String>,
}

#[derive(Serialize, Deserialize)]
pub struct DatabasesResponse {
    pub databases: Vec<String>,
}

#[derive(Serialize, Deserialize)]
pub struct TablesResponse {
    pub tables: Vec<String>,
}

#[derive(Serialize, Deserialize)]
pub struct Empty {}

#[derive(Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

pub struct ApiError(StoreError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            StoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.0.kind().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// 请求体解析失败也按统一的错误体返回
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(StoreError::InvalidArgument(rejection.body_text()))
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// 协调器是阻塞的，统一放到 blocking 线程池执行
async fn blocking<T, F>(store: Arc<Store>, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Store) -> crate::error::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&store))
        .await
        .map_err(|e| ApiError(StoreError::internal(e)))?
        .map_err(ApiError)
}

pub struct QueryServer {
    pub store: Arc<Store>,
}

impl QueryServer {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/read", post(read_handler))
            .route("/write", post(write_handler))
            .route("/delete", post(delete_handler))
            .route("/list", post(list_handler))
            .route("/databases", get(databases_handler))
            .route("/tables/:database", get(tables_handler))
            .route("/reindex", post(reindex_handler))
            .route("/status", get(status_handler))
            .with_state(self.store.clone())
    }

    pub async fn run(
        self,
        addr: SocketAddr,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("HTTP store server listening on {}", listener.local_addr()?);
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

async fn read_handler(
    State(store): State<Arc<Store>>,
    body: Result<Json<ReadRequest>, JsonRejection>,
) -> ApiResult<ReadResponse> {
    let Json(req) = body?;
    let records = blocking(store, move |s| s.read(&req)).await?;
    Ok(Json(ReadResponse { records }))
}

async fn write_handler(
    State(store): State<Arc<Store>>,
    body: Result<Json<WriteRequest>, JsonRejection>,
) -> ApiResult<Empty> {
    let Json(req) = body?;
    blocking(store, move |s| s.write(&req.database, &req.table, &req.record)).await?;
    Ok(Json(Empty {}))
}

async fn delete_handler(
    State(store): State<Arc<Store>>,
    body: Result<Json<DeleteRequest>, JsonRejection>,
) -> ApiResult<Empty> {
    let Json(req) = body?;
    blocking(store, move |s| s.delete(&req.database, &req.table, &req.key)).await?;
    Ok(Json(Empty {}))
}

async fn list_handler(
    State(store): State<Arc<Store>>,
    body: Result<Json<ListRequest>, JsonRejection>,
) -> ApiResult<ListResponse> {
    let Json(req) = body?;
    let keys = blocking(store, move |s| s.list(&req)).await?;
    Ok(Json(ListResponse { keys }))
}

async fn databases_handler(State(store): State<Arc<Store>>) -> ApiResult<DatabasesResponse> {
    let databases = blocking(store, |s| s.databases()).await?;
    Ok(Json(DatabasesResponse { databases }))
}

async fn tables_handler(
    State(store): State<Arc<Store>>,
    Path(database): Path<String>,
) -> ApiResult<TablesResponse> {
    let tables = blocking(store, move |s| s.tables(&database)).await?;
    Ok(Json(TablesResponse { tables }))
}

async fn reindex_handler(State(store): State<Arc<Store>>) -> ApiResult<RebuildStats> {
    let stats = blocking(store, |s| s.reindex()).await?;
    Ok(Json(stats))
}

async fn status_handler(State(store): State<Arc<Store>>) -> ApiResult<StatusReport> {
    let report = blocking(store, |s| Ok(s.status())).await?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::Field;
    use serde_json::json;

    async fn spawn_server(datapath: &std::path::Path) -> String {
        let store = Arc::new(Store::open(&Config::with_datapath(datapath)).unwrap());
        let app = QueryServer::new(store).router();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn write_read_delete_over_http() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_server(dir.path()).await;
        let client = reqwest::Client::new();

        let record = Record::new("k1").with_field("email", Field::string("a@x.com"));
        let resp = client
            .post(format!("{base}/write"))
            .json(&json!({ "record": record, "database": "d", "table": "t" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);

        let found: ReadResponse = client
            .post(format!("{base}/read"))
            .json(&json!({
                "database": "d",
                "table": "t",
                "where": { "email": { "type": "string", "value": "a@x.com" } }
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(found.records, vec![record]);

        let resp = client
            .post(format!("{base}/delete"))
            .json(&json!({ "key": "k1", "database": "d", "table": "t" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);

        let resp = client
            .post(format!("{base}/read"))
            .json(&json!({ "database": "d", "table": "t", "key": "k1" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
        let body: ErrorBody = resp.json().await.unwrap();
        assert_eq!(body.error, "not_found");
    }

    #[tokio::test]
    async fn error_kinds_map_to_status_codes() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_server(dir.path()).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}/write"))
            .json(&json!({ "record": { "key": "../x" }, "database": "d", "table": "t" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

        let resp = client
            .post(format!("{base}/read"))
            .json(&json!({ "database": "d", "table": "t" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

        let resp = client
            .post(format!("{base}/read"))
            .json(&json!({ "database": "d", "table": "t", "where": {} }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

        let resp = client.get(format!("{base}/tables/nope")).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_body_gets_error_body() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_server(dir.path()).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}/write"))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body("{\"record\": ")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: ErrorBody = resp.json().await.unwrap();
        assert_eq!(body.error, "invalid_argument");

        // 字段类型不对同样是 400
        let resp = client
            .post(format!("{base}/delete"))
            .json(&json!({ "key": 7, "database": "d", "table": "t" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: ErrorBody = resp.json().await.unwrap();
        assert_eq!(body.error, "invalid_argument");
    }

    #[tokio::test]
    async fn catalog_reindex_and_status() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_server(dir.path()).await;
        let client = reqwest::Client::new();

        for (db, table, key) in [("d1", "t1", "a"), ("d1", "t2", "b"), ("d2", "t1", "c")] {
            client
                .post(format!("{base}/write"))
                .json(&json!({ "record": { "key": key }, "database": db, "table": table }))
                .send()
                .await
                .unwrap()
                .error_for_status()
                .unwrap();
        }

        let dbs: DatabasesResponse = client
            .get(format!("{base}/databases"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(dbs.databases, vec!["d1", "d2"]);

        let tables: TablesResponse = client
            .get(format!("{base}/tables/d1"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(tables.tables, vec!["t1", "t2"]);

        let list: ListResponse = client
            .post(format!("{base}/list"))
            .json(&json!({ "database": "d1", "table": "t1" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(list.keys.is_empty());

        let stats: RebuildStats = client
            .post(format!("{base}/reindex"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stats.indexed, 3);

        let status: StatusReport = client
            .get(format!("{base}/status"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status.index.doc_count, 3);
    }
}
