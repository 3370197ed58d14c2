#![allow(dead_code)]

//! Resume rows and the typed profile/content structures rendered into
//! artifacts. All optional fields default explicitly at deserialization —
//! there are no call-site fallbacks for missing document fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResumeRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub profile: Json<ResumeProfile>,
    /// Generated resume content, used when the caller does not supply one
    /// (bulk exports render from this).
    pub content: Json<ResumeContent>,
    /// Cached tier string ("subscribed" | "paid") refreshed on each export.
    pub export_status: Option<String>,
    pub last_exported_at: Option<DateTime<Utc>>,
    /// Soft-delete tombstone. A non-NULL value excludes the resume from
    /// every export path.
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResumeRow {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Contact and career profile backing the rendered document header and the
/// experience/education sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResumeProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub linkedin: Option<String>,
    #[serde(default)]
    pub experience: Vec<ExperienceItem>,
    #[serde(default)]
    pub education: Vec<EducationItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExperienceItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub current: bool,
}

impl ExperienceItem {
    /// "start - end" with "Present" substituted for current positions.
    pub fn date_range(&self) -> String {
        let start = self.start_date.as_deref().unwrap_or("");
        let end = if self.current {
            "Present"
        } else {
            self.end_date.as_deref().unwrap_or("")
        };
        format!("{start} - {end}")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EducationItem {
    #[serde(default)]
    pub degree: String,
    #[serde(default)]
    pub institution: String,
    #[serde(default)]
    pub start_year: Option<String>,
    #[serde(default)]
    pub end_year: Option<String>,
}

/// Section text rendered into the artifact body. `experience` holds one
/// multi-line bullet block per profile experience entry, in the same order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResumeContent {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub experience: Vec<String>,
    #[serde(default)]
    pub skills: Vec<String>,
}

/// Splits a free-text block into individual bullet lines, stripping any
/// leading bullet markers the caller already included.
pub fn split_bullet_points(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.trim_start_matches(['•', '-', '*'])
                .trim_start()
                .to_string()
        })
        .collect()
}
