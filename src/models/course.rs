use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::CourseType;

/// Placeholder shown until the user names a course.
pub const DEFAULT_COURSE_NAME: &str = "未设置";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseEntry {
    pub id: String,
    pub course_type: CourseType,
    pub display_name: String,
    pub added_at: DateTime<Utc>,
    pub name_updated_at: Option<DateTime<Utc>>,
}

impl CourseEntry {
    pub fn new(id: String, course_type: CourseType) -> Self {
        Self {
            id,
            course_type,
            display_name: DEFAULT_COURSE_NAME.to_string(),
            added_at: Utc::now(),
            name_updated_at: None,
        }
    }
}

/// Per-course attempt state. `success` only ever flips false -> true.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CourseStatus {
    pub success: bool,
    pub fallback_ready: bool,
    pub fallback_attempt_index: usize,
}

/// The persisted part of a course's status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    #[serde(default)]
    pub success: bool,
}

/// What a load hands back per course, and what `data.loaded` carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseDetails {
    pub name: String,
    pub course_type: CourseType,
    pub added_time: DateTime<Utc>,
    pub name_updated_time: Option<DateTime<Utc>>,
    pub status: StatusRecord,
}

/// Trims and checks a user-supplied course id against `^[A-Za-z0-9_-]+$`.
pub fn validate_course_id(raw: &str) -> Result<String, AppError> {
    let id = raw.trim();
    if id.is_empty() {
        return Err(AppError::InvalidCourseId(raw.to_string()));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(AppError::InvalidCourseId(raw.to_string()));
    }
    Ok(id.to_string())
}
