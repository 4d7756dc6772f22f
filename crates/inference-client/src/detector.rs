//! Client for room-detection model endpoints.
//!
//! Both the intermediate and final models speak the same invocation
//! protocol; one client is constructed per endpoint URL.

use crate::analyzer::check_status;
use crate::error::{ClientError, Result};
use crate::types::{DetectResponse, ModelInput};
use locdet_core::postprocess::Detection;
use std::time::Duration;

const SERVICE: &str = "detector";

#[derive(Debug, Clone)]
pub struct DetectorClient {
    endpoint_url: String,
    model_version: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl DetectorClient {
    pub fn new(
        endpoint_url: impl Into<String>,
        model_version: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            model_version: model_version.into(),
            api_key,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .expect("reqwest client"),
        }
    }

    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }

    /// Invoke the model endpoint and return its raw detections.
    pub async fn invoke(&self, input: &ModelInput) -> Result<Vec<Detection>> {
        let url = format!("{}/invocations", self.endpoint_url.trim_end_matches('/'));

        tracing::info!(
            url = %url,
            model_version = %self.model_version,
            text_blocks = input.text_blocks.len(),
            layout_blocks = input.layout_blocks.len(),
            "invoking detector endpoint"
        );

        let mut req = self
            .http
            .post(&url)
            .header("x-model-version", &self.model_version)
            .json(input);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await.map_err(|source| ClientError::Http {
            service: SERVICE.to_string(),
            source,
        })?;

        let resp = check_status(SERVICE, resp).await?;
        let parsed: DetectResponse =
            resp.json().await.map_err(|source| ClientError::Decode {
                service: SERVICE.to_string(),
                source,
            })?;

        tracing::info!(detections = parsed.detections.len(), "detector invocation completed");
        Ok(parsed.detections)
    }
}
