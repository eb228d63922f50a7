use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::template::RenderJob;
use crate::error::{PipelineError, Result};

/// What the engine said about an accepted job.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubmitReceipt {
    pub status: u16,
    /// Engine-assigned job identifier, when the response carried one.
    pub prompt_id: Option<String>,
}

/// External rendering engine accepting filled job templates.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    /// Submit one job. Any non-success answer is an error; nothing is retried.
    async fn submit(&self, job: &RenderJob) -> Result<SubmitReceipt>;
}

#[derive(Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    prompt_id: Option<String>,
}

/// Engine reached through its HTTP submission endpoint.
#[derive(Clone, Debug)]
pub struct HttpRenderEngine {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpRenderEngine {
    /// `timeout` of `None` leaves the request unbounded.
    pub fn new(endpoint: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RenderEngine for HttpRenderEngine {
    async fn submit(&self, job: &RenderJob) -> Result<SubmitReceipt> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&job.body())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(PipelineError::Dispatch {
                status: status.as_u16(),
                body,
            });
        }

        // A 2xx without a parseable body is still an accepted job.
        let prompt_id = serde_json::from_str::<SubmitResponse>(&body)
            .map_err(|err| debug!(error = %err, "submission response carried no job id"))
            .ok()
            .and_then(|parsed| parsed.prompt_id);

        Ok(SubmitReceipt {
            status: status.as_u16(),
            prompt_id,
        })
    }
}
