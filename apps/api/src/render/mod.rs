//! Artifact Generator — turns a (resume, content) pair into a PDF or DOCX
//! file on disk.
//!
//! The orchestrator only sees the `ResumeRenderer` trait; `AppState` carries
//! an `Arc<dyn ResumeRenderer>` so tests can substitute a stub without
//! touching the processing pipeline.

pub mod docx;
pub mod markup;
pub mod pdf;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::export::ExportFormat;
use crate::models::resume::{ResumeContent, ResumeRow};

/// Rendering backend seam. Implementations may fail on malformed input;
/// the orchestrator's retry loop owns recovery.
#[async_trait]
pub trait ResumeRenderer: Send + Sync {
    async fn render(
        &self,
        resume: &ResumeRow,
        content: &ResumeContent,
        format: ExportFormat,
        output: &Path,
    ) -> Result<()>;
}

/// Default renderer: single-page SVG layout converted to vector PDF, or a
/// minimal OOXML package for DOCX.
pub struct ArtifactRenderer;

#[async_trait]
impl ResumeRenderer for ArtifactRenderer {
    async fn render(
        &self,
        resume: &ResumeRow,
        content: &ResumeContent,
        format: ExportFormat,
        output: &Path,
    ) -> Result<()> {
        match format {
            ExportFormat::Pdf => pdf::render_pdf(resume, content, output),
            ExportFormat::Docx => docx::render_docx(resume, content, output),
        }
    }
}
