//! SVG page markup for the PDF pipeline. Produces a US-letter page
//! (612 × 792 pt) with a simple top-down text layout: name, contact line,
//! then summary / experience / skills / education sections.

use crate::models::resume::{split_bullet_points, ResumeContent, ResumeRow};

const PAGE_WIDTH: f32 = 612.0;
const PAGE_HEIGHT: f32 = 792.0;
const MARGIN: f32 = 54.0;
const LINE_HEIGHT: f32 = 14.0;
const BODY_WRAP_CHARS: usize = 92;

/// Builds the full SVG document for one resume page. Content overflowing the
/// page height is clipped by the viewport rather than flowed onto a second
/// page; layout fidelity is out of scope here.
pub fn resume_svg(resume: &ResumeRow, content: &ResumeContent) -> String {
    let profile = &resume.profile.0;
    let mut svg = String::with_capacity(8 * 1024);
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{PAGE_WIDTH}" height="{PAGE_HEIGHT}" viewBox="0 0 {PAGE_WIDTH} {PAGE_HEIGHT}">"#
    ));
    svg.push_str(&format!(
        r#"<rect width="{PAGE_WIDTH}" height="{PAGE_HEIGHT}" fill="white"/>"#
    ));

    let mut y = MARGIN + 10.0;

    // Name, centered
    let display_name = if profile.name.is_empty() {
        resume.title.as_str()
    } else {
        profile.name.as_str()
    };
    push_text(&mut svg, PAGE_WIDTH / 2.0, y, 22.0, "middle", true, display_name);
    y += 2.0 * LINE_HEIGHT;

    // Contact line
    let contact: Vec<&str> = [
        profile.email.as_deref(),
        profile.phone.as_deref(),
        profile.linkedin.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect();
    if !contact.is_empty() {
        push_text(&mut svg, PAGE_WIDTH / 2.0, y, 10.0, "middle", false, &contact.join(" | "));
        y += 1.5 * LINE_HEIGHT;
    }

    if let Some(summary) = content.summary.as_deref().filter(|s| !s.is_empty()) {
        y = push_section(&mut svg, y, "Professional Summary");
        for line in wrap_text(summary, BODY_WRAP_CHARS) {
            push_text(&mut svg, MARGIN, y, 10.0, "start", false, &line);
            y += LINE_HEIGHT;
        }
    }

    if !profile.experience.is_empty() {
        y = push_section(&mut svg, y, "Experience");
        for (i, job) in profile.experience.iter().enumerate() {
            push_text(
                &mut svg,
                MARGIN,
                y,
                11.0,
                "start",
                true,
                &format!("{}, {}", job.title, job.company),
            );
            push_text(&mut svg, PAGE_WIDTH - MARGIN, y, 9.0, "end", false, &job.date_range());
            y += LINE_HEIGHT;

            if let Some(block) = content.experience.get(i) {
                for bullet in split_bullet_points(block) {
                    for (j, line) in wrap_text(&bullet, BODY_WRAP_CHARS - 4).into_iter().enumerate() {
                        let prefix = if j == 0 { "• " } else { "  " };
                        push_text(
                            &mut svg,
                            MARGIN + 10.0,
                            y,
                            10.0,
                            "start",
                            false,
                            &format!("{prefix}{line}"),
                        );
                        y += LINE_HEIGHT;
                    }
                }
            }
            y += 0.5 * LINE_HEIGHT;
        }
    }

    if !content.skills.is_empty() {
        y = push_section(&mut svg, y, "Skills");
        for line in wrap_text(&content.skills.join(", "), BODY_WRAP_CHARS) {
            push_text(&mut svg, MARGIN, y, 10.0, "start", false, &line);
            y += LINE_HEIGHT;
        }
    }

    if !profile.education.is_empty() {
        y = push_section(&mut svg, y, "Education");
        for edu in &profile.education {
            push_text(
                &mut svg,
                MARGIN,
                y,
                11.0,
                "start",
                true,
                &format!("{}, {}", edu.degree, edu.institution),
            );
            let years = format!(
                "{} - {}",
                edu.start_year.as_deref().unwrap_or(""),
                edu.end_year.as_deref().unwrap_or("")
            );
            push_text(&mut svg, PAGE_WIDTH - MARGIN, y, 9.0, "end", false, &years);
            y += LINE_HEIGHT;
        }
    }

    svg.push_str("</svg>");
    svg
}

fn push_section(svg: &mut String, y: f32, title: &str) -> f32 {
    let y = y + LINE_HEIGHT;
    push_text(svg, MARGIN, y, 13.0, "start", true, title);
    svg.push_str(&format!(
        r##"<line x1="{MARGIN}" y1="{}" x2="{}" y2="{}" stroke="#3498db" stroke-width="1"/>"##,
        y + 4.0,
        PAGE_WIDTH - MARGIN,
        y + 4.0
    ));
    y + 1.5 * LINE_HEIGHT
}

fn push_text(svg: &mut String, x: f32, y: f32, size: f32, anchor: &str, bold: bool, text: &str) {
    let weight = if bold { " font-weight=\"bold\"" } else { "" };
    svg.push_str(&format!(
        r#"<text x="{x}" y="{y}" font-family="Helvetica, Arial, sans-serif" font-size="{size}" text-anchor="{anchor}"{weight}>{}</text>"#,
        escape_xml(text)
    ));
}

/// Greedy word wrap at `width` characters. Words longer than the width get
/// their own line rather than being split.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if current.is_empty() {
            current = word.to_string();
        } else if current.chars().count() + 1 + word.chars().count() <= width {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Escapes the five XML-reserved characters. Shared with the DOCX writer.
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::resume::{EducationItem, ExperienceItem, ResumeProfile};
    use chrono::Utc;
    use sqlx::types::Json;
    use uuid::Uuid;

    fn sample_resume() -> ResumeRow {
        ResumeRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "Backend Engineer".to_string(),
            profile: Json(ResumeProfile {
                name: "Ada Lovelace".to_string(),
                email: Some("ada@example.com".to_string()),
                phone: None,
                linkedin: Some("linkedin.com/in/ada".to_string()),
                experience: vec![ExperienceItem {
                    title: "Engineer <3".to_string(),
                    company: "Analytical & Co".to_string(),
                    start_date: Some("2020".to_string()),
                    end_date: None,
                    current: true,
                }],
                education: vec![EducationItem {
                    degree: "BSc Mathematics".to_string(),
                    institution: "University".to_string(),
                    start_year: Some("2014".to_string()),
                    end_year: Some("2018".to_string()),
                }],
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
    fn test_resume_svg_contains_name_and_sections() {
        let resume = sample_resume();
        let content = ResumeContent {
            summary: Some("Engineer of engines.".to_string()),
            experience: vec!["• Built the first program".to_string()],
            skills: vec!["Rust".to_string(), "Mathematics".to_string()],
        };
        let svg = resume_svg(&resume, &content);
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert!(svg.contains("Ada Lovelace"));
        assert!(svg.contains("Professional Summary"));
        assert!(svg.contains("Experience"));
        assert!(svg.contains("Skills"));
        assert!(svg.contains("Education"));
        assert!(svg.contains("Built the first program"));
    }

    #[test]
    fn test_resume_svg_escapes_markup_in_fields() {
        let resume = sample_resume();
        let svg = resume_svg(&resume, &ResumeContent::default());
        assert!(svg.contains("Engineer &lt;3"));
        assert!(svg.contains("Analytical &amp; Co"));
        assert!(!svg.contains("Engineer <3"));
    }

    #[test]
    fn test_resume_svg_falls_back_to_title_without_name() {
        let mut resume = sample_resume();
        resume.profile.0.name.clear();
        let svg = resume_svg(&resume, &ResumeContent::default());
        assert!(svg.contains("Backend Engineer"));
    }

    #[test]
    fn test_wrap_text_respects_width() {
        let lines = wrap_text("one two three four five six seven", 10);
        assert!(lines.iter().all(|l| l.chars().count() <= 10));
        assert_eq!(lines.join(" "), "one two three four five six seven");
    }

    #[test]
    fn test_wrap_text_keeps_long_words_whole() {
        let lines = wrap_text("short reallyreallylongword end", 8);
        assert!(lines.contains(&"reallyreallylongword".to_string()));
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("a<b>&\"c'"), "a&lt;b&gt;&amp;&quot;c&apos;");
        assert_eq!(escape_xml("plain"), "plain");
    }
}
