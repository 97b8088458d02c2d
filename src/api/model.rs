//! Wire shapes for the attendance backend.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::{AttendanceRecord, AttendanceStatus, PageMeta};

/// Standard response envelope: `{ data, message, success, meta }`.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub meta: Option<PageMeta>,
}

/// Structured error body; anything without one is a transport failure.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}

/// `GET /attendances/status/{sessionId}` payload for roster hydration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionAttendance {
    #[serde(rename = "hasAttendance", default)]
    pub has_attendance: bool,
    #[serde(default)]
    pub attendances: Vec<AttendanceRecord>,
}

/// `DELETE /attendances/reset/{sessionId}` outcome (external reset back to
/// Unrecorded).
#[derive(Debug, Clone, Deserialize)]
pub struct ResetOutcome {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "deletedCount", default)]
    pub deleted_count: u64,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest {
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthTokens {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken", default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Entity collections served through the generic paginated listing
/// endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Students,
    Subjects,
    Teachers,
    Majors,
    Classes,
}

impl EntityKind {
    pub fn path(&self) -> &'static str {
        match self {
            EntityKind::Students => "students",
            EntityKind::Subjects => "subjects",
            EntityKind::Teachers => "teachers",
            EntityKind::Majors => "majors",
            EntityKind::Classes => "classes",
        }
    }
}

/// Query-string builder honoring the filter contract: an empty or absent
/// value removes its key instead of sending an empty string.
#[derive(Debug, Clone, Default)]
pub struct QueryPairs(Vec<(String, String)>);

impl QueryPairs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if !value.is_empty() {
            self.0.push((key.to_string(), value));
        }
    }

    pub fn push_opt<T: ToString>(&mut self, key: &str, value: Option<T>) {
        if let Some(value) = value {
            self.push(key, value.to_string());
        }
    }

    pub fn as_slice(&self) -> &[(String, String)] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Server-side filters for the history listing endpoint. Free-text search
/// over resolved names is not supported here and stays client-side.
#[derive(Debug, Clone)]
pub struct HistoryQuery {
    pub class_id: Option<String>,
    pub student_id: Option<String>,
    pub status: Option<AttendanceStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub page: u32,
    pub limit: u32,
    pub sort: Option<String>,
    pub order: Option<SortOrder>,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        HistoryQuery {
            class_id: None,
            student_id: None,
            status: None,
            start_date: None,
            end_date: None,
            page: 1,
            limit: 20,
            sort: Some("sessionDate".to_string()),
            order: Some(SortOrder::Desc),
        }
    }
}

impl HistoryQuery {
    pub fn query_pairs(&self) -> QueryPairs {
        let mut pairs = QueryPairs::new();
        pairs.push_opt("classId", self.class_id.clone());
        pairs.push_opt("studentId", self.student_id.clone());
        pairs.push_opt("status", self.status.map(|s| s.as_str().to_string()));
        pairs.push_opt("startDate", self.start_date.map(|d| d.format("%Y-%m-%d").to_string()));
        pairs.push_opt("endDate", self.end_date.map(|d| d.format("%Y-%m-%d").to_string()));
        pairs.push("page", self.page.to_string());
        pairs.push("limit", self.limit.to_string());
        pairs.push_opt("sort", self.sort.clone());
        pairs.push_opt("order", self.order.map(|o| o.as_str().to_string()));
        pairs
    }
}
