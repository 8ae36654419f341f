//! HTTP surface for docpipe.
//!
//! - `POST /documents` – Register an uploaded file and queue it for processing.
//! - `GET /documents` – Paginated listing with optional organization and folder filters.
//! - `GET /documents/jobs` – In-memory job records of this process.
//! - `GET /documents/jobs/:job_id` – Durable status of one job (document).
//! - `DELETE /documents/:document_id` – Remove a document and its index collections.
//! - `POST /documents/:document_id/reprocess` – Resubmit a document still waiting in `queued`.
//! - `POST /folders` – Create a folder.
//! - `GET /search` – One retry-aware hybrid search.
//! - `GET /metrics` – Worker pool counters.
//! - `GET /health` – Relational store liveness.
//! - `GET /commands` – Catalog of the routes above with example payloads.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::documents::{DocumentInfo, Folder};
use crate::ingest::{FolderRequest, IngestApi, IngestError, ListRequest, UploadOutcome, UploadRequest};
use crate::jobs::JobSnapshot;
use crate::metrics::PoolMetricsSnapshot;
use crate::search::{CollectionId, SearchError, SearchMode, SearchOutcome, SearchRequest};

const DEFAULT_PAGE_LIMIT: u32 = 20;
const MAX_PAGE_LIMIT: u32 = 100;

/// Build the HTTP router over an ingestion service.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: IngestApi + 'static,
{
    Router::new()
        .route(
            "/documents",
            post(upload_document::<S>).get(list_documents::<S>),
        )
        .route("/documents/jobs", get(list_jobs::<S>))
        .route("/documents/jobs/:job_id", get(get_job_status::<S>))
        .route("/documents/:document_id", delete(delete_document::<S>))
        .route(
            "/documents/:document_id/reprocess",
            post(reprocess_document::<S>),
        )
        .route("/folders", post(create_folder::<S>))
        .route("/search", get(search::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/health", get(health::<S>))
        .route("/commands", get(get_commands))
        .with_state(service)
}

async fn upload_document<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<UploadRequest>,
) -> Result<(StatusCode, Json<UploadOutcome>), AppError>
where
    S: IngestApi,
{
    let outcome = service.upload_document(request).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Query string for `GET /documents`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    #[serde(default)]
    organization_id: Option<Uuid>,
    #[serde(default)]
    folder_id: Option<String>,
    #[serde(default)]
    page: Option<i64>,
    #[serde(default)]
    limit: Option<i64>,
}

/// Response body for `GET /documents`.
#[derive(Serialize)]
struct DocumentsResponse {
    documents: Vec<DocumentInfo>,
    page: u32,
    limit: u32,
}

/// Out-of-range pages fall back to the first page; limits are clamped to `1..=100`.
fn sanitize_page(page: Option<i64>, limit: Option<i64>) -> (u32, u32) {
    let page = page
        .filter(|page| *page >= 1)
        .and_then(|page| u32::try_from(page).ok())
        .unwrap_or(1);
    let limit = limit
        .map(|limit| limit.clamp(1, i64::from(MAX_PAGE_LIMIT)))
        .and_then(|limit| u32::try_from(limit).ok())
        .unwrap_or(DEFAULT_PAGE_LIMIT);
    (page, limit)
}

async fn list_documents<S>(
    State(service): State<Arc<S>>,
    Query(params): Query<ListParams>,
) -> Result<Json<DocumentsResponse>, AppError>
where
    S: IngestApi,
{
    let (page, limit) = sanitize_page(params.page, params.limit);
    let documents = service
        .list_documents(ListRequest {
            organization_id: params.organization_id,
            folder_id: params.folder_id,
            page,
            limit,
        })
        .await?;
    Ok(Json(DocumentsResponse {
        documents,
        page,
        limit,
    }))
}

/// Response body for `GET /documents/jobs`.
#[derive(Serialize)]
struct JobsResponse {
    jobs: Vec<JobSnapshot>,
}

async fn list_jobs<S>(State(service): State<Arc<S>>) -> Json<JobsResponse>
where
    S: IngestApi,
{
    Json(JobsResponse {
        jobs: service.list_jobs().await,
    })
}

async fn get_job_status<S>(
    State(service): State<Arc<S>>,
    Path(job_id): Path<String>,
) -> Result<Json<DocumentInfo>, AppError>
where
    S: IngestApi,
{
    Ok(Json(service.get_job_status(&job_id).await?))
}

async fn delete_document<S>(
    State(service): State<Arc<S>>,
    Path(document_id): Path<String>,
) -> Result<StatusCode, AppError>
where
    S: IngestApi,
{
    let document_id = crate::ingest::parse_job_id(&document_id)?;
    service.delete_document(document_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn reprocess_document<S>(
    State(service): State<Arc<S>>,
    Path(document_id): Path<String>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError>
where
    S: IngestApi,
{
    let document_id = crate::ingest::parse_job_id(&document_id)?;
    let job_id = service.reprocess_document(document_id).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "jobId": job_id }))))
}

async fn create_folder<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<FolderRequest>,
) -> Result<(StatusCode, Json<Folder>), AppError>
where
    S: IngestApi,
{
    let folder = service.create_folder(request).await?;
    Ok((StatusCode::CREATED, Json(folder)))
}

/// Query string for `GET /search`.
#[derive(Deserialize)]
struct SearchParams {
    query: String,
    #[serde(alias = "collection_id")]
    collection: String,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    alpha: Option<f64>,
}

async fn search<S>(
    State(service): State<Arc<S>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchOutcome>, AppError>
where
    S: IngestApi,
{
    let collection: CollectionId = params.collection.parse().map_err(IngestError::from)?;
    let mode = match params.mode.as_deref() {
        Some(raw) => raw
            .parse::<SearchMode>()
            .map_err(|err| IngestError::from(SearchError::InvalidMode(err)))?,
        None => SearchMode::Text,
    };
    let outcome = service
        .search(SearchRequest {
            query: params.query,
            collection,
            mode,
            score: params.score,
            alpha: params.alpha,
        })
        .await?;
    Ok(Json(outcome))
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsResponse>
where
    S: IngestApi,
{
    let snapshot = service.metrics_snapshot();
    Json(MetricsResponse {
        in_flight: snapshot.in_flight(),
        pool: snapshot,
    })
}

/// Response body for `GET /metrics`.
#[derive(Serialize)]
struct MetricsResponse {
    #[serde(flatten)]
    pool: PoolMetricsSnapshot,
    in_flight: u64,
}

async fn health<S>(State(service): State<Arc<S>>) -> Result<Json<serde_json::Value>, AppError>
where
    S: IngestApi,
{
    service.health().await?;
    Ok(Json(json!({ "status": "ok" })))
}

/// One entry of the `GET /commands` catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// List every route with a short description and, for writes, an example body.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "upload_document",
                method: "POST",
                path: "/documents",
                description: "Register a file already stored under the resources root and queue it for processing. Returns { \"documentId\", \"filename\", \"status\", \"jobId\", \"elapsed\" }.",
                request_example: Some(json!({
                    "organizationId": "5b0c9a59-3a61-4c3c-9a57-4b7f2b7f0c11",
                    "userId": "0e7c5a1f-2d0b-4f4f-8f0e-6a0b4d9f3e22",
                    "filePath": "acme/q3/board-pack.pdf",
                    "folderId": null,
                    "metadata": { "source": "upload" }
                })),
            },
            CommandDescriptor {
                name: "list_documents",
                method: "GET",
                path: "/documents?organizationId=&folderId=&page=1&limit=20",
                description: "List documents newest first. Without folderId every document of the organization is returned.",
                request_example: None,
            },
            CommandDescriptor {
                name: "list_jobs",
                method: "GET",
                path: "/documents/jobs",
                description: "Return the in-memory job records held by this process.",
                request_example: None,
            },
            CommandDescriptor {
                name: "job_status",
                method: "GET",
                path: "/documents/jobs/:job_id",
                description: "Return the persisted status of a job; the job id is the document id.",
                request_example: None,
            },
            CommandDescriptor {
                name: "delete_document",
                method: "DELETE",
                path: "/documents/:document_id",
                description: "Delete a document. Index cleanup failures are logged and do not fail the request.",
                request_example: None,
            },
            CommandDescriptor {
                name: "reprocess_document",
                method: "POST",
                path: "/documents/:document_id/reprocess",
                description: "Resubmit a document whose job never started (status still queued).",
                request_example: None,
            },
            CommandDescriptor {
                name: "create_folder",
                method: "POST",
                path: "/folders",
                description: "Create a folder at the root or under a parent folder of the same organization.",
                request_example: Some(json!({
                    "organizationId": "5b0c9a59-3a61-4c3c-9a57-4b7f2b7f0c11",
                    "userId": "0e7c5a1f-2d0b-4f4f-8f0e-6a0b4d9f3e22",
                    "name": "Reports",
                    "parentId": null
                })),
            },
            CommandDescriptor {
                name: "search",
                method: "GET",
                path: "/search?query=&collection=&mode=text",
                description: "Hybrid search over one document set. Empty results carry a retry hint with looser parameters.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return worker pool counters (submitted, rejected, completed, failed, in_flight).",
                request_example: None,
            },
            CommandDescriptor {
                name: "health",
                method: "GET",
                path: "/health",
                description: "Report whether the relational store answers.",
                request_example: None,
            },
        ],
    })
}

struct AppError(IngestError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            err if err.is_validation() => StatusCode::BAD_REQUEST,
            err if err.is_not_found() => StatusCode::NOT_FOUND,
            IngestError::Conflict(_) => StatusCode::CONFLICT,
            IngestError::Queue(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl From<IngestError> for AppError {
    fn from(inner: IngestError) -> Self {
        Self(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::{create_router, get_commands, sanitize_page};
    use crate::documents::{DocumentInfo, DocumentStatus, Folder};
    use crate::ingest::{
        FolderRequest, IngestApi, IngestError, ListRequest, UploadOutcome, UploadRequest,
    };
    use crate::jobs::{JobSnapshot, PoolError};
    use crate::metrics::PoolMetricsSnapshot;
    use crate::search::{SearchOutcome, SearchRequest};
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use serde_json::{Value, json};
    use std::sync::Arc;
    use time::OffsetDateTime;
    use tokio::sync::Mutex;
    use tower::ServiceExt;
    use uuid::Uuid;

    #[tokio::test]
    async fn commands_catalog_exposes_upload_endpoint() {
        let response = get_commands().await;
        let commands = response.0.commands;
        let upload = commands
            .iter()
            .find(|cmd| cmd.name == "upload_document")
            .expect("upload command present");

        assert_eq!(upload.method, "POST");
        assert_eq!(upload.path, "/documents");
        assert!(commands.iter().any(|cmd| cmd.name == "search"));
    }

    #[test]
    fn page_parameters_are_clamped() {
        assert_eq!(sanitize_page(None, None), (1, 20));
        assert_eq!(sanitize_page(Some(0), Some(0)), (1, 1));
        assert_eq!(sanitize_page(Some(-4), Some(500)), (1, 100));
        assert_eq!(sanitize_page(Some(3), Some(50)), (3, 50));
    }

    #[tokio::test]
    async fn upload_route_returns_camel_case_outcome() {
        let service = Arc::new(StubIngestService::default());
        let app = create_router(service.clone());
        let payload = json!({
            "organizationId": Uuid::nil(),
            "userId": Uuid::nil(),
            "filePath": "acme/report.pdf",
            "metadata": { "source": "test" }
        });

        let response = app
            .oneshot(json_request(Method::POST, "/documents", payload))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = read_json(response).await;
        assert_eq!(body["documentId"], 11);
        assert_eq!(body["filename"], "report.pdf");
        assert_eq!(body["status"], "queued");
        assert_eq!(body["jobId"], 11);
        assert!(body.get("elapsed").is_some());

        let calls = service.uploads.lock().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].file_path, "acme/report.pdf");
        assert_eq!(calls[0].metadata["source"], json!("test"));
    }

    #[tokio::test]
    async fn list_route_clamps_pagination_before_calling_service() {
        let service = Arc::new(StubIngestService::default());
        let app = create_router(service.clone());

        let response = app
            .oneshot(empty_request(Method::GET, "/documents?page=0&limit=1000"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["page"], 1);
        assert_eq!(body["limit"], 100);
        assert_eq!(body["documents"][0]["documentId"], 11);

        let lists = service.lists.lock().await;
        assert_eq!(lists[0].page, 1);
        assert_eq!(lists[0].limit, 100);
    }

    #[tokio::test]
    async fn invalid_job_id_maps_to_bad_request() {
        let app = create_router(Arc::new(StubIngestService::default()));
        let response = app
            .oneshot(empty_request(Method::GET, "/documents/jobs/not-a-number"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("invalid job id"));
    }

    #[tokio::test]
    async fn missing_document_maps_to_not_found() {
        let app = create_router(Arc::new(StubIngestService::default()));
        let response = app
            .oneshot(empty_request(Method::DELETE, "/documents/404"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn full_queue_on_reprocess_maps_to_service_unavailable() {
        let app = create_router(Arc::new(StubIngestService::default()));
        let response = app
            .oneshot(empty_request(Method::POST, "/documents/5/reprocess"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn search_route_rejects_bad_collection() {
        let app = create_router(Arc::new(StubIngestService::default()));
        let response = app
            .oneshot(empty_request(
                Method::GET,
                "/search?query=revenue&collection=abc&mode=table",
            ))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn search_route_parses_numeric_string_collection() {
        let service = Arc::new(StubIngestService::default());
        let app = create_router(service.clone());
        let response = app
            .oneshot(empty_request(
                Method::GET,
                "/search?query=revenue&collection=4&mode=table",
            ))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let searches = service.searches.lock().await;
        assert_eq!(searches[0].collection.get(), 4);
        assert_eq!(searches[0].mode, crate::search::SearchMode::Table);
    }

    #[tokio::test]
    async fn search_route_accepts_collection_id_and_defaults_mode() {
        let service = Arc::new(StubIngestService::default());
        let app = create_router(service.clone());
        let response = app
            .oneshot(empty_request(
                Method::GET,
                "/search?query=revenue&collection_id=12",
            ))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let searches = service.searches.lock().await;
        assert_eq!(searches[0].collection.get(), 12);
        assert_eq!(searches[0].mode, crate::search::SearchMode::Text);
    }

    #[tokio::test]
    async fn health_and_metrics_report_service_state() {
        let service = Arc::new(StubIngestService::default());

        let health = create_router(service.clone())
            .oneshot(empty_request(Method::GET, "/health"))
            .await
            .expect("router response");
        assert_eq!(health.status(), StatusCode::OK);
        assert_eq!(read_json(health).await["status"], "ok");

        let metrics = create_router(service)
            .oneshot(empty_request(Method::GET, "/metrics"))
            .await
            .expect("router response");
        assert_eq!(metrics.status(), StatusCode::OK);
        let body = read_json(metrics).await;
        assert_eq!(body["submitted"], 0);
        assert_eq!(body["in_flight"], 0);
    }

    fn json_request(method: Method, uri: &str, payload: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .expect("request")
    }

    fn empty_request(method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    async fn read_json(response: axum::response::Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&body).expect("json body")
    }

    fn sample_info() -> DocumentInfo {
        DocumentInfo {
            document_id: 11,
            name: "report.pdf".into(),
            file_path: "acme/report.pdf".into(),
            folder_id: None,
            metadata: Default::default(),
            status: DocumentStatus::Queued,
            error_message: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
            uploaded_at: None,
            processed_at: None,
        }
    }

    #[derive(Default)]
    struct StubIngestService {
        uploads: Mutex<Vec<UploadRequest>>,
        lists: Mutex<Vec<ListRequest>>,
        searches: Mutex<Vec<SearchRequest>>,
    }

    #[async_trait]
    impl IngestApi for StubIngestService {
        async fn upload_document(
            &self,
            request: UploadRequest,
        ) -> Result<UploadOutcome, IngestError> {
            self.uploads.lock().await.push(request);
            Ok(UploadOutcome {
                document_id: 11,
                filename: "report.pdf".into(),
                status: DocumentStatus::Queued,
                job_id: Some(11),
                elapsed_ms: 3,
            })
        }

        async fn get_job_status(&self, job_id: &str) -> Result<DocumentInfo, IngestError> {
            crate::ingest::parse_job_id(job_id)?;
            Ok(sample_info())
        }

        async fn list_documents(
            &self,
            request: ListRequest,
        ) -> Result<Vec<DocumentInfo>, IngestError> {
            self.lists.lock().await.push(request);
            Ok(vec![sample_info()])
        }

        async fn delete_document(&self, document_id: i64) -> Result<(), IngestError> {
            Err(IngestError::NotFound(format!("document {document_id}")))
        }

        async fn reprocess_document(&self, _document_id: i64) -> Result<i64, IngestError> {
            Err(IngestError::Queue(PoolError::QueueFull { capacity: 1 }))
        }

        async fn create_folder(&self, request: FolderRequest) -> Result<Folder, IngestError> {
            Ok(Folder {
                id: Uuid::new_v4(),
                organization_id: request.organization_id,
                parent_id: None,
                path: format!("/{}", request.name),
                name: request.name,
                created_by: request.user_id,
                created_at: OffsetDateTime::UNIX_EPOCH,
            })
        }

        async fn list_jobs(&self) -> Vec<JobSnapshot> {
            Vec::new()
        }

        async fn search(&self, request: SearchRequest) -> Result<SearchOutcome, IngestError> {
            self.searches.lock().await.push(request.clone());
            Ok(SearchOutcome {
                query: request.query,
                collection_id: request.collection.get(),
                collection: format!("Document_{}", request.collection),
                mode: request.mode,
                score_threshold: 0.5,
                alpha: 0.3,
                results: Vec::new(),
                retry: None,
            })
        }

        async fn health(&self) -> Result<(), IngestError> {
            Ok(())
        }

        fn metrics_snapshot(&self) -> PoolMetricsSnapshot {
            PoolMetricsSnapshot::default()
        }
    }
}
