//! Documentation retrieval: nearest-neighbor lookup of symbol docs over a
//! Qdrant collection, plus the offline ingestion path that builds it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sketch_ai::{EmbeddingModel, providers::OpenAIProvider};

use crate::catalog::SymbolDocument;
use crate::error::{Error, Result};

/// Documentation retriever contract: map an error message to the most
/// relevant indexed symbol identifiers, joined into one text block.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn lookup(&self, error: &str) -> Result<String>;
}

/// Retriever over the Qdrant REST API
pub struct QdrantRetriever {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    collection: String,
    provider: Arc<OpenAIProvider>,
    embedding_model: EmbeddingModel,
    top_k: usize,
    score_threshold: f32,
}

impl QdrantRetriever {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        collection: impl Into<String>,
        provider: Arc<OpenAIProvider>,
        embedding_model: EmbeddingModel,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            collection: collection.into(),
            provider,
            embedding_model,
            top_k: 3,
            score_threshold: 0.0,
        }
    }

    /// Set how many neighbors a lookup returns
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Set the minimum similarity score for a match to count
    pub fn with_score_threshold(mut self, score_threshold: f32) -> Self {
        self.score_threshold = score_threshold;
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(ref key) = self.api_key {
            builder = builder.header("api-key", key);
        }
        builder
    }

    /// Create the collection if it does not exist yet. Idempotent.
    pub async fn ensure_collection(&self) -> Result<()> {
        let path = format!("/collections/{}", self.collection);
        let response = self.request(reqwest::Method::GET, &path).send().await?;
        if response.status().is_success() {
            return Ok(());
        }

        let body = CreateCollection {
            vectors: VectorParams {
                size: self.embedding_model.dimensions,
                distance: "Cosine".to_string(),
            },
        };
        let response = self
            .request(reqwest::Method::PUT, &path)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::VectorStore(format!(
                "failed to create collection '{}': {}",
                self.collection, text
            )));
        }
        tracing::info!(collection = %self.collection, "created vector collection");
        Ok(())
    }

    /// Embed and bulk-upsert catalog documents into the collection.
    /// Offline ingestion path; not called during a turn.
    pub async fn upsert(&self, documents: &[SymbolDocument]) -> Result<()> {
        let mut points = Vec::with_capacity(documents.len());
        for document in documents {
            let vector = self
                .provider
                .embed(&self.embedding_model, &document.text)
                .await?;
            points.push(Point {
                id: uuid::Uuid::new_v4().to_string(),
                vector,
                payload: Payload {
                    module: document.module.clone(),
                    service: document.service.clone(),
                    section: document.section.clone(),
                },
            });
        }

        let path = format!("/collections/{}/points", self.collection);
        let response = self
            .request(reqwest::Method::PUT, &path)
            .json(&UpsertPoints { points })
            .send()
            .await?;
        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::VectorStore(format!(
                "failed to upsert points: {}",
                text
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Retriever for QdrantRetriever {
    async fn lookup(&self, error: &str) -> Result<String> {
        let vector = self.provider.embed(&self.embedding_model, error).await?;

        let path = format!("/collections/{}/points/search", self.collection);
        let response = self
            .request(reqwest::Method::POST, &path)
            .json(&SearchRequest {
                vector,
                limit: self.top_k,
                score_threshold: self.score_threshold,
                with_payload: true,
            })
            .send()
            .await?;
        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::VectorStore(format!("search failed: {}", text)));
        }

        let body: SearchResponse = response.json().await?;
        let modules: Vec<String> = body
            .result
            .into_iter()
            .filter_map(|hit| hit.payload.map(|p| p.module))
            .collect();

        tracing::debug!(query = error, matches = modules.len(), "documentation lookup");
        Ok(modules.join("\n"))
    }
}

// Qdrant wire types

#[derive(Debug, Serialize)]
struct CreateCollection {
    vectors: VectorParams,
}

#[derive(Debug, Serialize)]
struct VectorParams {
    size: u32,
    distance: String,
}

#[derive(Debug, Serialize)]
struct UpsertPoints {
    points: Vec<Point>,
}

#[derive(Debug, Serialize)]
struct Point {
    id: String,
    vector: Vec<f32>,
    payload: Payload,
}

#[derive(Debug, Serialize, Deserialize)]
struct Payload {
    module: String,
    service: String,
    section: String,
}

#[derive(Debug, Serialize)]
struct SearchRequest {
    vector: Vec<f32>,
    limit: usize,
    score_threshold: f32,
    with_payload: bool,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[allow(dead_code)]
    #[serde(default)]
    score: f32,
    payload: Option<Payload>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn embedding_mock() -> Mock {
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "embedding": [0.1, 0.2, 0.3] }]
            })))
    }

    fn retriever(openai_url: String, qdrant_url: String) -> QdrantRetriever {
        QdrantRetriever::new(
            qdrant_url,
            Some("qdrant-key".to_string()),
            "diagram_generator",
            Arc::new(OpenAIProvider::new("test-key")),
            EmbeddingModel::new("text-embedding-3-small", openai_url, 3),
        )
    }

    #[tokio::test]
    async fn test_lookup_joins_matched_modules() {
        let openai = MockServer::start().await;
        let qdrant = MockServer::start().await;
        embedding_mock().mount(&openai).await;
        Mock::given(method("POST"))
            .and(path("/collections/diagram_generator/points/search"))
            .and(header("api-key", "qdrant-key"))
            .and(body_partial_json(json!({ "limit": 3, "with_payload": true })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": [
                    { "score": 0.91, "payload": { "module": "diagrams.aws.network.ELB", "service": "aws", "section": "network" } },
                    { "score": 0.72, "payload": { "module": "diagrams.aws.network.ALB", "service": "aws", "section": "network" } }
                ]
            })))
            .mount(&qdrant)
            .await;

        let retriever = retriever(openai.uri(), qdrant.uri());
        let docs = retriever
            .lookup("No module named 'diagrams.aws.network.ELBB'")
            .await
            .unwrap();
        assert_eq!(docs, "diagrams.aws.network.ELB\ndiagrams.aws.network.ALB");
    }

    #[tokio::test]
    async fn test_lookup_with_no_matches_is_empty() {
        let openai = MockServer::start().await;
        let qdrant = MockServer::start().await;
        embedding_mock().mount(&openai).await;
        Mock::given(method("POST"))
            .and(path("/collections/diagram_generator/points/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": [] })))
            .mount(&qdrant)
            .await;

        let retriever = retriever(openai.uri(), qdrant.uri());
        let docs = retriever.lookup("some error").await.unwrap();
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn test_search_failure_surfaces_as_vector_store_error() {
        let openai = MockServer::start().await;
        let qdrant = MockServer::start().await;
        embedding_mock().mount(&openai).await;
        Mock::given(method("POST"))
            .and(path("/collections/diagram_generator/points/search"))
            .respond_with(ResponseTemplate::new(404).set_body_string("collection not found"))
            .mount(&qdrant)
            .await;

        let retriever = retriever(openai.uri(), qdrant.uri());
        let err = retriever.lookup("some error").await.unwrap_err();
        assert!(matches!(err, Error::VectorStore(_)));
    }

    #[tokio::test]
    async fn test_ensure_collection_creates_when_missing() {
        let openai = MockServer::start().await;
        let qdrant = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections/diagram_generator"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&qdrant)
            .await;
        Mock::given(method("PUT"))
            .and(path("/collections/diagram_generator"))
            .and(body_partial_json(json!({
                "vectors": { "size": 3, "distance": "Cosine" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": true })))
            .expect(1)
            .mount(&qdrant)
            .await;

        let retriever = retriever(openai.uri(), qdrant.uri());
        retriever.ensure_collection().await.unwrap();
    }

    #[tokio::test]
    async fn test_upsert_embeds_each_document() {
        let openai = MockServer::start().await;
        let qdrant = MockServer::start().await;
        embedding_mock().expect(2).mount(&openai).await;
        Mock::given(method("PUT"))
            .and(path("/collections/diagram_generator/points"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": true })))
            .expect(1)
            .mount(&qdrant)
            .await;

        let retriever = retriever(openai.uri(), qdrant.uri());
        let documents = vec![
            SymbolDocument {
                text: "EC2".to_string(),
                module: "diagrams.aws.compute.EC2".to_string(),
                service: "aws".to_string(),
                section: "compute".to_string(),
            },
            SymbolDocument {
                text: "aws EC2".to_string(),
                module: "diagrams.aws.compute.EC2".to_string(),
                service: "aws".to_string(),
                section: "compute".to_string(),
            },
        ];
        retriever.upsert(&documents).await.unwrap();
    }
}
