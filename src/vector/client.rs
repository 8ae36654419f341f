//! HTTP client wrapper for the hybrid vector index (Weaviate REST + GraphQL).

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::config::{Config, DEFAULT_INDEX_BATCH_SIZE, SearchConfig};
use crate::vector::types::{
    ArtifactChunk, Chunk, ContentMode, GraphQlHit, GraphQlResponse, IndexSummary, VectorError,
    collection_name,
};

/// Operations the pipeline and the search protocol need from the vector index.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Run one hybrid query against `collection`, returning chunks scoring at least
    /// `score_threshold`, best first. `alpha` blends keyword (0.0) and semantic (1.0) scoring.
    async fn query_hybrid_with_collection(
        &self,
        query: &str,
        collection: &str,
        score_threshold: f64,
        alpha: f64,
    ) -> Result<Vec<Chunk>, VectorError>;

    /// Write a document's chunks, split into its text and table collections.
    async fn index_document_chunks(
        &self,
        document_id: i64,
        chunks: &[ArtifactChunk],
    ) -> Result<IndexSummary, VectorError>;

    /// Remove both collections of a document. Missing collections are not an error.
    async fn delete_document_classes(&self, document_id: i64) -> Result<(), VectorError>;
}

/// Connection and query settings for [`WeaviateService`].
#[derive(Debug, Clone)]
pub struct VectorSettings {
    /// Index base URL.
    pub url: String,
    /// Optional bearer key.
    pub api_key: Option<String>,
    /// Objects per batch write.
    pub batch_size: usize,
    /// Maximum hits per query.
    pub result_limit: usize,
    /// Autocut value for hybrid queries.
    pub autocut: u32,
}

impl VectorSettings {
    /// Extract index settings from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            url: config.weaviate_url.clone(),
            api_key: config.weaviate_api_key.clone(),
            batch_size: config.index_batch_size,
            result_limit: config.search_result_limit,
            autocut: config.search_autocut,
        }
    }

    /// Extract query settings for a search-only process. Batch writes keep their default size.
    pub fn from_search_config(config: &SearchConfig) -> Self {
        Self {
            url: config.weaviate_url.clone(),
            api_key: config.weaviate_api_key.clone(),
            batch_size: DEFAULT_INDEX_BATCH_SIZE,
            result_limit: config.search_result_limit,
            autocut: config.search_autocut,
        }
    }
}

/// Lightweight HTTP client for the vector index.
pub struct WeaviateService {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    pub(crate) batch_size: usize,
    pub(crate) result_limit: usize,
    pub(crate) autocut: u32,
}

impl WeaviateService {
    /// Construct a client from explicit settings.
    pub fn new(settings: VectorSettings) -> Result<Self, VectorError> {
        let client = Client::builder().user_agent("docpipe/0.1").build()?;
        let base_url = normalize_base_url(&settings.url).map_err(VectorError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_api_key = settings.api_key.as_deref().is_some_and(|key| !key.is_empty()),
            "Initialized vector index client"
        );

        Ok(Self {
            client,
            base_url,
            api_key: settings.api_key,
            batch_size: settings.batch_size.max(1),
            result_limit: settings.result_limit.max(1),
            autocut: settings.autocut,
        })
    }

    /// Create a collection unless it already exists.
    pub async fn ensure_class(&self, class_name: &str) -> Result<(), VectorError> {
        validate_collection(class_name)?;
        let body = json!({
            "class": class_name,
            "vectorConfig": {
                "details_vector": {
                    "vectorizer": {
                        "text2vec-transformers": {
                            "properties": ["content", "section_title"]
                        }
                    },
                    "vectorIndexType": "hnsw"
                }
            }
        });

        let response = self.request(Method::POST, "v1/schema").json(&body).send().await?;
        if response.status().is_success() {
            tracing::debug!(collection = class_name, "Collection created");
            return Ok(());
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if self.class_exists(class_name).await? {
            tracing::debug!(collection = class_name, "Collection already present");
            return Ok(());
        }
        let error = VectorError::UnexpectedStatus { status, body };
        tracing::error!(collection = class_name, error = %error, "Failed to create collection");
        Err(error)
    }

    async fn class_exists(&self, class_name: &str) -> Result<bool, VectorError> {
        let response = self
            .request(Method::GET, &format!("v1/schema/{class_name}"))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = VectorError::UnexpectedStatus { status, body };
                tracing::error!(collection = class_name, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    async fn delete_class(&self, class_name: &str) -> Result<(), VectorError> {
        let response = self
            .request(Method::DELETE, &format!("v1/schema/{class_name}"))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            tracing::debug!(collection = class_name, %status, "Collection removed");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if !self.class_exists(class_name).await? {
            return Ok(());
        }
        Err(VectorError::UnexpectedStatus { status, body })
    }

    async fn write_batch(&self, objects: Vec<Value>) -> Result<(), VectorError> {
        let count = objects.len();
        let response = self
            .request(Method::POST, "v1/batch/objects")
            .json(&json!({ "objects": objects }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = VectorError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Batch write failed");
            return Err(error);
        }

        let results: Value = response.json().await?;
        if let Some(message) = first_batch_error(&results) {
            tracing::error!(objects = count, error = %message, "Batch write rejected objects");
            return Err(VectorError::Batch(message));
        }
        tracing::debug!(objects = count, "Batch written");
        Ok(())
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.bearer_auth(api_key);
        }
        req
    }
}

#[async_trait]
impl VectorIndex for WeaviateService {
    async fn query_hybrid_with_collection(
        &self,
        query: &str,
        collection: &str,
        score_threshold: f64,
        alpha: f64,
    ) -> Result<Vec<Chunk>, VectorError> {
        validate_collection(collection)?;
        let graphql = build_hybrid_query(query, collection, alpha, self.autocut, self.result_limit);

        let response = self
            .request(Method::POST, "v1/graphql")
            .json(&json!({ "query": graphql }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = VectorError::UnexpectedStatus { status, body };
            tracing::error!(collection, error = %error, "Hybrid query failed");
            return Err(error);
        }

        let payload: GraphQlResponse = response.json().await?;
        if let Some(errors) = payload.errors.filter(|errors| !errors.is_empty()) {
            let message = errors
                .into_iter()
                .map(|error| error.message)
                .collect::<Vec<_>>()
                .join("; ");
            tracing::warn!(collection, error = %message, "Hybrid query returned errors");
            return Err(VectorError::Query(message));
        }

        let hits = payload
            .data
            .and_then(|mut data| data.get.remove(collection))
            .unwrap_or(Value::Null);
        let hits: Vec<GraphQlHit> = match hits {
            Value::Null => Vec::new(),
            other => serde_json::from_value(other)
                .map_err(|err| VectorError::Query(format!("malformed hits: {err}")))?,
        };

        let mut chunks: Vec<Chunk> = hits
            .into_iter()
            .filter_map(|hit| {
                let score = hit.additional.as_ref()?.score.as_ref()?.as_f64()?;
                Some(Chunk {
                    score,
                    section_title: hit.section_title.unwrap_or_default(),
                    content_type: hit.content_type.unwrap_or_default(),
                    page_number: hit.page_number.map(|page| page as i64).unwrap_or_default(),
                    content: hit.content.unwrap_or_default(),
                })
            })
            .filter(|chunk| chunk.score >= score_threshold)
            .collect();
        chunks.sort_by(|a, b| b.score.total_cmp(&a.score));

        tracing::debug!(collection, alpha, score_threshold, hits = chunks.len(), "Hybrid query completed");
        Ok(chunks)
    }

    async fn index_document_chunks(
        &self,
        document_id: i64,
        chunks: &[ArtifactChunk],
    ) -> Result<IndexSummary, VectorError> {
        let text_class = collection_name(document_id, ContentMode::Text);
        let table_class = collection_name(document_id, ContentMode::Table);
        self.ensure_class(&text_class).await?;
        self.ensure_class(&table_class).await?;

        let mut summary = IndexSummary::default();
        for batch in chunks.chunks(self.batch_size) {
            let objects = batch
                .iter()
                .map(|chunk| {
                    let class = match ContentMode::classify(&chunk.content_type) {
                        ContentMode::Text => {
                            summary.text_chunks += 1;
                            &text_class
                        }
                        ContentMode::Table => {
                            summary.table_chunks += 1;
                            &table_class
                        }
                    };
                    json!({
                        "class": class,
                        "id": Uuid::new_v4().to_string(),
                        "properties": {
                            "content": chunk.content,
                            "section_title": chunk.section_title,
                            "page_number": chunk.page_number,
                            "content_type": chunk.content_type,
                        }
                    })
                })
                .collect();
            self.write_batch(objects).await?;
            summary.batches += 1;
        }

        tracing::info!(
            document_id,
            text_chunks = summary.text_chunks,
            table_chunks = summary.table_chunks,
            batches = summary.batches,
            "Indexed document chunks"
        );
        Ok(summary)
    }

    async fn delete_document_classes(&self, document_id: i64) -> Result<(), VectorError> {
        let mut failures = Vec::new();
        for mode in [ContentMode::Text, ContentMode::Table] {
            let class_name = collection_name(document_id, mode);
            if let Err(err) = self.delete_class(&class_name).await {
                tracing::warn!(collection = %class_name, error = %err, "Failed to delete collection");
                failures.push(format!("{class_name}: {err}"));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(VectorError::Query(failures.join("; ")))
        }
    }
}

/// Render the GraphQL hybrid query. The query text is embedded as a JSON string literal, which
/// is also a valid GraphQL string.
pub(crate) fn build_hybrid_query(
    query: &str,
    collection: &str,
    alpha: f64,
    autocut: u32,
    limit: usize,
) -> String {
    let quoted = serde_json::to_string(query).unwrap_or_else(|_| "\"\"".into());
    format!(
        "{{ Get {{ {collection}(hybrid: {{query: {quoted}, alpha: {alpha}, fusionType: relativeScoreFusion}}, autocut: {autocut}, limit: {limit}) {{ content section_title page_number content_type _additional {{ score }} }} }} }}"
    )
}

fn validate_collection(name: &str) -> Result<(), VectorError> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|first| first.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(VectorError::InvalidCollection(name.to_string()))
    }
}

fn first_batch_error(results: &Value) -> Option<String> {
    results.as_array()?.iter().find_map(|item| {
        let errors = item.pointer("/result/errors/error")?.as_array()?;
        errors
            .iter()
            .filter_map(|error| error.get("message").and_then(Value::as_str))
            .next()
            .map(str::to_string)
    })
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::DELETE, Method::GET, Method::POST, MockServer};

    fn service(server: &MockServer, batch_size: usize) -> WeaviateService {
        WeaviateService {
            client: Client::builder()
                .user_agent("docpipe-test")
                .build()
                .expect("client"),
            base_url: server.base_url(),
            api_key: None,
            batch_size,
            result_limit: 20,
            autocut: 2,
        }
    }

    fn artifact(content: &str, content_type: &str) -> ArtifactChunk {
        ArtifactChunk {
            chunk_id: None,
            content: content.into(),
            content_type: content_type.into(),
            page_number: 1,
            section_title: "Summary".into(),
            chunk_index: 0,
        }
    }

    #[tokio::test]
    async fn hybrid_query_filters_and_orders_by_score() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/graphql")
                    .body_contains("Document_4_table")
                    .body_contains("alpha: 0.3")
                    .body_contains("relativeScoreFusion");
                then.status(200).json_body(json!({
                    "data": {
                        "Get": {
                            "Document_4_table": [
                                {
                                    "content": "| Q1 | 10 |",
                                    "section_title": "Revenue",
                                    "page_number": 3,
                                    "content_type": "table",
                                    "_additional": { "score": "0.55" }
                                },
                                {
                                    "content": "| Q2 | 12 |",
                                    "section_title": "Revenue",
                                    "page_number": 4,
                                    "content_type": "table",
                                    "_additional": { "score": 0.91 }
                                },
                                {
                                    "content": "noise",
                                    "_additional": { "score": "0.2" }
                                }
                            ]
                        }
                    }
                }));
            })
            .await;

        let chunks = service(&server, 10)
            .query_hybrid_with_collection("revenue by quarter", "Document_4_table", 0.5, 0.3)
            .await
            .expect("query");

        mock.assert_async().await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "| Q2 | 12 |");
        assert!((chunks[0].score - 0.91).abs() < f64::EPSILON);
        assert_eq!(chunks[1].page_number, 3);
    }

    #[tokio::test]
    async fn graphql_errors_are_surfaced() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/graphql");
                then.status(200).json_body(json!({
                    "data": { "Get": null },
                    "errors": [{ "message": "Cannot query field \"Document_9\"" }]
                }));
            })
            .await;

        let err = service(&server, 10)
            .query_hybrid_with_collection("q", "Document_9", 0.5, 0.6)
            .await
            .expect_err("query error");
        assert!(matches!(err, VectorError::Query(ref message) if message.contains("Document_9")));
    }

    #[tokio::test]
    async fn collection_names_are_validated() {
        let server = MockServer::start_async().await;
        let err = service(&server, 10)
            .query_hybrid_with_collection("q", "Document_1) { x }", 0.5, 0.6)
            .await
            .expect_err("rejected");
        assert!(matches!(err, VectorError::InvalidCollection(_)));
    }

    #[tokio::test]
    async fn indexing_partitions_and_batches_chunks() {
        let server = MockServer::start_async().await;
        let schema = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/schema");
                then.status(200).json_body(json!({}));
            })
            .await;
        let batch = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/batch/objects");
                then.status(200).json_body(json!([{ "result": {} }]));
            })
            .await;

        let chunks = vec![
            artifact("intro", "text"),
            artifact("| a | b |", "table"),
            artifact("conclusion", "text"),
        ];
        let summary = service(&server, 2)
            .index_document_chunks(7, &chunks)
            .await
            .expect("index");

        schema.assert_hits_async(2).await;
        batch.assert_hits_async(2).await;
        assert_eq!(
            summary,
            IndexSummary {
                text_chunks: 2,
                table_chunks: 1,
                batches: 2
            }
        );
    }

    #[tokio::test]
    async fn existing_classes_are_reused() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/schema");
                then.status(422).body("class already exists");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/schema/Document_3");
                then.status(200).json_body(json!({ "class": "Document_3" }));
            })
            .await;

        service(&server, 10)
            .ensure_class("Document_3")
            .await
            .expect("existing class accepted");
    }

    #[tokio::test]
    async fn batch_object_errors_fail_the_write() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/schema");
                then.status(200).json_body(json!({}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/batch/objects");
                then.status(200).json_body(json!([
                    { "result": { "errors": { "error": [{ "message": "vectorizer offline" }] } } }
                ]));
            })
            .await;

        let err = service(&server, 10)
            .index_document_chunks(1, &[artifact("x", "text")])
            .await
            .expect_err("batch error");
        assert!(matches!(err, VectorError::Batch(ref message) if message == "vectorizer offline"));
    }

    #[tokio::test]
    async fn deleting_absent_classes_succeeds() {
        let server = MockServer::start_async().await;
        let delete = server
            .mock_async(|when, then| {
                when.method(DELETE).path_contains("/v1/schema/Document_12");
                then.status(404);
            })
            .await;

        service(&server, 10)
            .delete_document_classes(12)
            .await
            .expect("absent classes are fine");
        delete.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn delete_failure_counts_only_when_class_remains() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(DELETE).path_contains("/v1/schema/Document_5");
                then.status(500).body("boom");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/schema/Document_5");
                then.status(404);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/schema/Document_5_table");
                then.status(200).json_body(json!({ "class": "Document_5_table" }));
            })
            .await;

        let err = service(&server, 10)
            .delete_document_classes(5)
            .await
            .expect_err("table class still present");
        assert!(err.to_string().contains("Document_5_table"));
        assert!(!err.to_string().contains("Document_5:"));
    }

    #[test]
    fn hybrid_query_escapes_text() {
        let query = build_hybrid_query("say \"hi\"", "Document_1", 0.6, 2, 20);
        assert!(query.contains(r#"query: "say \"hi\"""#));
        assert!(query.contains("autocut: 2, limit: 20"));
    }
}
