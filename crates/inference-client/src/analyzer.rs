//! Client for the document layout-analysis service.

use crate::error::{ClientError, Result};
use crate::types::{AnalyzeRequest, AnalyzeResponse, RawBlockType};
use base64::Engine as _;
use locdet_core::analysis::{AnalysisResult, LayoutBlock, LayoutKind, TextBlock};
use std::time::Duration;

const SERVICE: &str = "analyzer";

#[derive(Debug, Clone)]
pub struct AnalyzerClient {
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl AnalyzerClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .expect("reqwest client"),
        }
    }

    /// Analyze a blueprint document, returning partitioned text and layout
    /// blocks.
    pub async fn analyze(&self, document: &[u8], format: &str) -> Result<AnalysisResult> {
        let url = format!("{}/v1/analyze", self.base_url.trim_end_matches('/'));
        let body = AnalyzeRequest {
            document: base64::engine::general_purpose::STANDARD.encode(document),
            format: format.to_string(),
            features: vec!["tables".to_string(), "forms".to_string()],
        };

        tracing::info!(url = %url, format, bytes = document.len(), "analyzing document");

        let mut req = self.http.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await.map_err(|source| ClientError::Http {
            service: SERVICE.to_string(),
            source,
        })?;

        let resp = check_status(SERVICE, resp).await?;
        let parsed: AnalyzeResponse =
            resp.json().await.map_err(|source| ClientError::Decode {
                service: SERVICE.to_string(),
                source,
            })?;

        let mut text_blocks = Vec::new();
        let mut layout_blocks = Vec::new();
        for block in parsed.blocks {
            match block.block_type {
                RawBlockType::Word | RawBlockType::Line => text_blocks.push(TextBlock {
                    id: block.id,
                    text: block.text.unwrap_or_default(),
                    geometry: block.geometry.into(),
                }),
                RawBlockType::Page => layout_blocks.push(LayoutBlock {
                    id: block.id,
                    kind: LayoutKind::Page,
                    geometry: block.geometry.into(),
                }),
                RawBlockType::Table => layout_blocks.push(LayoutBlock {
                    id: block.id,
                    kind: LayoutKind::Table,
                    geometry: block.geometry.into(),
                }),
                RawBlockType::Cell => layout_blocks.push(LayoutBlock {
                    id: block.id,
                    kind: LayoutKind::Cell,
                    geometry: block.geometry.into(),
                }),
                RawBlockType::SelectionElement => layout_blocks.push(LayoutBlock {
                    id: block.id,
                    kind: LayoutKind::SelectionElement,
                    geometry: block.geometry.into(),
                }),
            }
        }

        tracing::info!(
            text_blocks = text_blocks.len(),
            layout_blocks = layout_blocks.len(),
            pages = parsed.metadata.pages,
            "analysis completed"
        );

        Ok(AnalysisResult {
            text_blocks,
            layout_blocks,
            metadata: parsed.metadata.into_metadata(),
        })
    }
}

/// Map non-success statuses onto the retryable/permanent error split.
pub(crate) async fn check_status(
    service: &str,
    resp: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let retry_after = resp
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());
    if status.as_u16() == 429 || status.is_server_error() {
        return Err(ClientError::Unavailable {
            service: service.to_string(),
            status: status.as_u16(),
            retry_after,
        });
    }
    let message = resp.text().await.unwrap_or_default();
    Err(ClientError::Rejected {
        service: service.to_string(),
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn analyze_partitions_blocks() {
        let mut server = mockito::Server::new_async().await;
        let body = serde_json::json!({
            "blocks": [
                { "id": "w1", "block_type": "word", "text": "Kitchen",
                  "geometry": { "bounding_box": { "left": 0.1, "top": 0.1, "width": 0.05, "height": 0.02 } } },
                { "id": "t1", "block_type": "table",
                  "geometry": { "bounding_box": { "left": 0.0, "top": 0.0, "width": 0.5, "height": 0.5 } } },
                { "id": "p1", "block_type": "page", "geometry": {} }
            ],
            "metadata": { "pages": 2 }
        });
        let mock = server
            .mock("POST", "/v1/analyze")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;

        let client = AnalyzerClient::new(server.url(), None);
        let result = client.analyze(b"\x89PNGdata", "png").await.unwrap();
        mock.assert_async().await;

        assert_eq!(result.text_blocks.len(), 1);
        assert_eq!(result.text_blocks[0].text, "Kitchen");
        assert_eq!(result.layout_blocks.len(), 2);
        assert_eq!(result.layout_blocks[0].kind, LayoutKind::Table);
        assert_eq!(result.metadata.pages, 2);
    }

    #[tokio::test]
    async fn server_error_maps_to_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/analyze")
            .with_status(503)
            .with_header("retry-after", "5")
            .create_async()
            .await;

        let client = AnalyzerClient::new(server.url(), None);
        let err = client.analyze(b"data", "png").await.unwrap_err();
        match err {
            ClientError::Unavailable {
                status, retry_after, ..
            } => {
                assert_eq!(status, 503);
                assert_eq!(retry_after, Some(5));
            }
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn client_error_maps_to_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/analyze")
            .with_status(422)
            .with_body("unsupported document")
            .create_async()
            .await;

        let client = AnalyzerClient::new(server.url(), None);
        let err = client.analyze(b"data", "png").await.unwrap_err();
        assert!(matches!(err, ClientError::Rejected { status: 422, .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn sends_bearer_token_when_configured() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/analyze")
            .match_header("authorization", "Bearer sekrit")
            .with_status(200)
            .with_body(r#"{"blocks":[]}"#)
            .create_async()
            .await;

        let client = AnalyzerClient::new(server.url(), Some("sekrit".into()));
        client.analyze(b"data", "pdf").await.unwrap();
        mock.assert_async().await;
    }
}
