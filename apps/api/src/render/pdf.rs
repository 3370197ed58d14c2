//! SVG → PDF conversion. The page markup from `markup` is parsed into a
//! usvg tree and converted with svg2pdf, keeping the output fully vector.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::models::resume::{ResumeContent, ResumeRow};
use crate::render::markup::resume_svg;

pub fn render_pdf(resume: &ResumeRow, content: &ResumeContent, output: &Path) -> Result<()> {
    let svg = resume_svg(resume, content);

    let tree = usvg::Tree::from_str(&svg, &usvg::Options::default())
        .context("Failed to parse resume SVG markup")?;

    let size = tree.size();
    if size.width() <= 0.0 || size.height() <= 0.0 {
        anyhow::bail!("Invalid page dimensions: {}x{}", size.width(), size.height());
    }

    let pdf_data = svg2pdf::to_pdf(
        &tree,
        svg2pdf::ConversionOptions::default(),
        svg2pdf::PageOptions::default(),
    );

    std::fs::write(output, &pdf_data)
        .with_context(|| format!("Failed to write PDF to {}", output.display()))?;

    debug!(
        "Rendered PDF for resume {}: {} bytes",
        resume.id,
        pdf_data.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::resume::ResumeProfile;
    use chrono::Utc;
    use sqlx::types::Json;
    use uuid::Uuid;

    fn sample_resume() -> ResumeRow {
        ResumeRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "Resume".to_string(),
            profile: Json(ResumeProfile {
                name: "Test Person".to_string(),
                ..ResumeProfile::default()
            }),
            content: Json(ResumeContent::default()),
            export_status: None,
            last_exported_at: None,
            deleted_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_render_pdf_writes_pdf_magic_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.pdf");
        let content = ResumeContent {
            summary: Some("A summary.".to_string()),
            experience: vec![],
            skills: vec!["Rust".to_string()],
        };

        render_pdf(&sample_resume(), &content, &out).unwrap();

        let bytes = std::fs::read(&out).unwrap();
        assert!(bytes.starts_with(b"%PDF"), "output must be a PDF document");
        assert!(bytes.len() > 100);
    }
}
