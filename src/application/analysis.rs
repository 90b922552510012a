//! Summary generation over a parsed specification.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::{
    application::prompts::{SYSTEM_PROMPT, create_endpoint_prompt, create_overview_prompt},
    domain::{
        entities::ProgressEntry,
        openapi::ParsedSpec,
        summary::{EndpointSummary, SpecInfo, SpecSummary},
    },
};

pub const ANALYSIS_STAGE: &str = "analysis";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: SYSTEM_PROMPT.to_string(),
            prompt: prompt.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Transport(String),
    #[error("completion service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("completion response could not be decoded: {0}")]
    Decode(String),
    #[error("completion response contained no choices")]
    Empty,
    #[error("completion client misconfigured: {0}")]
    Configuration(String),
}

impl CompletionError {
    /// Whether a retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            CompletionError::Transport(_) => true,
            CompletionError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// External text completion service.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError>;

    /// Model identifier recorded alongside generated summaries.
    fn model(&self) -> &str;
}

/// Receives progress updates while an analysis runs.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, entry: ProgressEntry);
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("overview generation failed")]
    Overview(#[source] CompletionError),
    #[error("analysis of {method} {path} failed")]
    Endpoint {
        method: String,
        path: String,
        #[source]
        source: CompletionError,
    },
}

impl AnalysisError {
    /// Message stored on the failed job.
    pub fn detail(&self) -> String {
        match self {
            AnalysisError::Overview(source) => format!("{self}: {source}"),
            AnalysisError::Endpoint { source, .. } => format!("{self}: {source}"),
        }
    }
}

pub struct SpecAnalyzer {
    client: Arc<dyn CompletionClient>,
    endpoint_concurrency: usize,
}

impl SpecAnalyzer {
    pub fn new(client: Arc<dyn CompletionClient>, endpoint_concurrency: usize) -> Self {
        Self {
            client,
            endpoint_concurrency: endpoint_concurrency.max(1),
        }
    }

    /// Produce an overview followed by one analysis per endpoint.
    ///
    /// Endpoint completions run concurrently up to the configured bound; the
    /// result keeps document order.
    pub async fn analyze(
        &self,
        spec: &ParsedSpec,
        progress: &dyn ProgressSink,
    ) -> Result<SpecSummary, AnalysisError> {
        let total = spec.endpoints.len() + 1;

        progress
            .report(ProgressEntry::now(
                ANALYSIS_STAGE,
                0.0,
                "Generating API overview",
            ))
            .await;

        let overview = self
            .client
            .complete(CompletionRequest::new(create_overview_prompt(spec)))
            .await
            .map_err(AnalysisError::Overview)?
            .trim()
            .to_string();

        progress
            .report(ProgressEntry::now(
                ANALYSIS_STAGE,
                percent(1, total),
                "Generated API overview",
            ))
            .await;

        info!(
            target = "application::analysis::SpecAnalyzer",
            title = %spec.title,
            endpoints = spec.endpoints.len(),
            "analyzing endpoints"
        );

        let mut results = stream::iter(spec.endpoints.clone())
            .map(|endpoint| {
                let client = Arc::clone(&self.client);
                async move {
                    debug!(
                        target = "application::analysis::SpecAnalyzer",
                        method = %endpoint.method,
                        path = %endpoint.path,
                        "requesting endpoint analysis"
                    );
                    let analysis = client
                        .complete(CompletionRequest::new(create_endpoint_prompt(&endpoint)))
                        .await
                        .map_err(|source| AnalysisError::Endpoint {
                            method: endpoint.method.clone(),
                            path: endpoint.path.clone(),
                            source,
                        })?;
                    Ok::<_, AnalysisError>(EndpointSummary {
                        method: endpoint.method.clone(),
                        path: endpoint.path.clone(),
                        summary: endpoint.summary.clone(),
                        analysis: analysis.trim().to_string(),
                    })
                }
            })
            .buffered(self.endpoint_concurrency);

        let mut endpoints = Vec::with_capacity(spec.endpoints.len());
        while let Some(result) = results.next().await {
            let summary = result?;
            let message = format!("Analyzed {} {}", summary.method, summary.path);
            endpoints.push(summary);
            progress
                .report(ProgressEntry::now(
                    ANALYSIS_STAGE,
                    percent(endpoints.len() + 1, total),
                    message,
                ))
                .await;
        }

        Ok(SpecSummary {
            spec_info: SpecInfo {
                title: spec.title.clone(),
                version: spec.version.clone(),
                description: spec.description.clone(),
            },
            overview,
            endpoints,
            model: self.client.model().to_string(),
            generated_at: OffsetDateTime::now_utc(),
        })
    }
}

fn percent(done: usize, total: usize) -> f32 {
    if total == 0 {
        return 100.0;
    }
    ((done as f32 / total as f32) * 100.0).round()
}
