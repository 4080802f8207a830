//! Vector search client
//!
//! Talks to the vector database for collection introspection and to the
//! embedding proxy for query embedding and reranked search.

pub mod repl;

pub use repl::{SearchSession, run_session};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Field in the point payload holding the indexed file path
pub const FILE_PATH_FIELD: &str = "filePath";

/// Search client errors
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Embedding request failed with status {status}: {body}")]
    EmbeddingRequest { status: u16, body: String },

    #[error("Search request failed with status {status}: {body}")]
    SearchRequest { status: u16, body: String },

    #[error("Collection listing failed with status {status}: {body}")]
    Introspection { status: u16, body: String },

    #[error("Embedding response contained no vectors")]
    EmptyEmbedding,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A collection and its indexed point count
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionInfo {
    pub name: String,
    pub points_count: Option<u64>,
}

/// Payload stored with each indexed code chunk
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChunkPayload {
    pub file_path: Option<String>,
    pub start_line: Option<u64>,
    pub end_line: Option<u64>,
    pub code_chunk: Option<String>,
}

/// A ranked search hit
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchHit {
    pub score: f64,
    #[serde(default)]
    pub payload: ChunkPayload,
}

/// Parameters of one vector search
#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    pub collection: &'a str,
    pub vector: &'a [f32],
    pub limit: usize,
    pub file_path: Option<&'a str>,
}

impl SearchRequest<'_> {
    fn body(&self) -> serde_json::Value {
        let mut body = json!({
            "vector": self.vector,
            "limit": self.limit,
            "with_payload": true,
        });
        if let Some(path) = self.file_path {
            body["filter"] = json!({
                "must": [{ "key": FILE_PATH_FIELD, "match": { "value": path } }]
            });
        }
        body
    }
}

#[derive(Deserialize)]
struct QdrantResponse<T> {
    result: T,
}

#[derive(Deserialize)]
struct CollectionList {
    collections: Vec<CollectionName>,
}

#[derive(Deserialize)]
struct CollectionName {
    name: String,
}

#[derive(Deserialize)]
struct CollectionDetails {
    points_count: Option<u64>,
    vectors_count: Option<u64>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// HTTP client for the vector database and embedding proxy
#[derive(Debug, Clone)]
pub struct SearchClient {
    http: reqwest::Client,
    db_url: String,
    proxy_url: String,
}

impl SearchClient {
    pub fn new(db_url: &str, proxy_url: &str, timeout: Duration) -> Result<Self, SearchError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            db_url: db_url.trim_end_matches('/').to_string(),
            proxy_url: proxy_url.trim_end_matches('/').to_string(),
        })
    }

    /// List collections with their point counts
    ///
    /// Counts are fetched concurrently; a collection whose details can't be
    /// read is listed without a count.
    pub async fn list_collections(&self) -> Result<Vec<CollectionInfo>, SearchError> {
        let response = self
            .http
            .get(format!("{}/collections", self.db_url))
            .send()
            .await?;
        let list: QdrantResponse<CollectionList> = introspection_json(response).await?;

        let mut names: Vec<String> = list.result.collections.into_iter().map(|c| c.name).collect();
        names.sort();

        let details = names.iter().map(|name| self.points_count(name));
        let counts = join_all(details).await;

        Ok(names
            .into_iter()
            .zip(counts)
            .map(|(name, count)| {
                let points_count = match count {
                    Ok(count) => count,
                    Err(e) => {
                        tracing::warn!(collection = %name, error = %e, "Failed to read collection details");
                        None
                    }
                };
                CollectionInfo { name, points_count }
            })
            .collect())
    }

    async fn points_count(&self, collection: &str) -> Result<Option<u64>, SearchError> {
        let response = self
            .http
            .get(format!(
                "{}/collections/{}",
                self.db_url,
                urlencoding::encode(collection)
            ))
            .send()
            .await?;
        let details: QdrantResponse<CollectionDetails> = introspection_json(response).await?;
        Ok(details.result.points_count.or(details.result.vectors_count))
    }

    /// Embed query text through the proxy
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        let response = self
            .http
            .post(format!("{}/v1/embeddings", self.proxy_url))
            .json(&json!({ "input": text }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::EmbeddingRequest {
                status: status.as_u16(),
                body,
            });
        }

        let embeddings: EmbeddingResponse = response.json().await?;
        embeddings
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or(SearchError::EmptyEmbedding)
    }

    /// Run a vector search through the proxy
    pub async fn search(&self, request: &SearchRequest<'_>) -> Result<Vec<SearchHit>, SearchError> {
        let response = self
            .http
            .post(format!(
                "{}/collections/{}/points/search",
                self.proxy_url,
                urlencoding::encode(request.collection)
            ))
            .json(&request.body())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::SearchRequest {
                status: status.as_u16(),
                body,
            });
        }

        let hits: QdrantResponse<Vec<SearchHit>> = response.json().await?;
        Ok(hits.result)
    }
}

async fn introspection_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, SearchError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SearchError::Introspection {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json().await?)
}
