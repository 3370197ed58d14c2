//! Minimal DOCX writer. A .docx file is a zip container of OOXML parts;
//! this produces the three required parts ([Content_Types].xml, the package
//! relationships, and word/document.xml) with the resume laid out as
//! headed paragraphs.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::models::resume::{split_bullet_points, ResumeContent, ResumeRow};
use crate::render::markup::escape_xml;

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
</Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
</Relationships>"#;

pub fn render_docx(resume: &ResumeRow, content: &ResumeContent, output: &Path) -> Result<()> {
    let document = document_xml(resume, content);

    let file = std::fs::File::create(output)
        .with_context(|| format!("Failed to create DOCX at {}", output.display()))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("[Content_Types].xml", options)?;
    zip.write_all(CONTENT_TYPES.as_bytes())?;
    zip.start_file("_rels/.rels", options)?;
    zip.write_all(PACKAGE_RELS.as_bytes())?;
    zip.start_file("word/document.xml", options)?;
    zip.write_all(document.as_bytes())?;
    zip.finish().context("Failed to finalize DOCX container")?;

    Ok(())
}

fn document_xml(resume: &ResumeRow, content: &ResumeContent) -> String {
    let profile = &resume.profile.0;
    let mut body = String::with_capacity(8 * 1024);

    let display_name = if profile.name.is_empty() {
        resume.title.as_str()
    } else {
        profile.name.as_str()
    };
    body.push_str(&heading(display_name, 36, true));

    let contact: Vec<&str> = [
        profile.email.as_deref(),
        profile.phone.as_deref(),
        profile.linkedin.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect();
    if !contact.is_empty() {
        body.push_str(&paragraph(&contact.join(" | "), false));
    }

    if let Some(summary) = content.summary.as_deref().filter(|s| !s.is_empty()) {
        body.push_str(&heading("Professional Summary", 28, false));
        body.push_str(&paragraph(summary, false));
    }

    if !profile.experience.is_empty() {
        body.push_str(&heading("Experience", 28, false));
        for (i, job) in profile.experience.iter().enumerate() {
            body.push_str(&paragraph(&format!("{}, {}", job.title, job.company), true));
            body.push_str(&paragraph(&job.date_range(), false));
            if let Some(block) = content.experience.get(i) {
                for bullet in split_bullet_points(block) {
                    body.push_str(&paragraph(&format!("• {bullet}"), false));
                }
            }
        }
    }

    if !content.skills.is_empty() {
        body.push_str(&heading("Skills", 28, false));
        body.push_str(&paragraph(&content.skills.join(", "), false));
    }

    if !profile.education.is_empty() {
        body.push_str(&heading("Education", 28, false));
        for edu in &profile.education {
            body.push_str(&paragraph(&format!("{}, {}", edu.degree, edu.institution), true));
            let years = format!(
                "{} - {}",
                edu.start_year.as_deref().unwrap_or(""),
                edu.end_year.as_deref().unwrap_or("")
            );
            body.push_str(&paragraph(&years, false));
        }
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
    )
}

/// A paragraph whose run uses a half-point font size (`sz` of 36 = 18 pt).
fn heading(text: &str, half_points: u32, bold: bool) -> String {
    let bold_tag = if bold { "<w:b/>" } else { "" };
    format!(
        r#"<w:p><w:r><w:rPr>{bold_tag}<w:sz w:val="{half_points}"/></w:rPr><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
        escape_xml(text)
    )
}

fn paragraph(text: &str, bold: bool) -> String {
    let bold_tag = if bold { "<w:rPr><w:b/></w:rPr>" } else { "" };
    format!(
        r#"<w:p><w:r>{bold_tag}<w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
        escape_xml(text)
    )
}
