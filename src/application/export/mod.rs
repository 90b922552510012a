//! Rendering of completed summaries into downloadable documents.

mod docx;
mod html;
mod markdown;

use thiserror::Error;
use uuid::Uuid;

use crate::domain::{summary::SpecSummary, types::ExportFormat};

pub use docx::render_docx;
pub use html::render_html;
pub use markdown::render_markdown;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("markdown conversion failed: {message}")]
    Markdown { message: String },
    #[error("html template rendering failed")]
    Template(#[from] askama::Error),
    #[error("docx packaging failed: {message}")]
    Docx { message: String },
}

/// Render the summary into the requested format.
pub fn render(summary: &SpecSummary, format: ExportFormat) -> Result<Vec<u8>, ExportError> {
    match format {
        ExportFormat::Markdown => Ok(render_markdown(summary).into_bytes()),
        ExportFormat::Html => render_html(summary).map(String::into_bytes),
        ExportFormat::Docx => render_docx(summary),
    }
}

/// Name of the cached artifact inside the job directory.
pub fn artifact_name(format: ExportFormat) -> String {
    format!("summary.{}", format.extension())
}

/// Filename offered to the client in `Content-Disposition`.
pub fn download_filename(job_id: Uuid, format: ExportFormat) -> String {
    format!("api-summary-{job_id}.{}", format.extension())
}
