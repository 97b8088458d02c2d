use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Per-student attendance status for one session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "PRESENT",
            AttendanceStatus::Absent => "ABSENT",
            AttendanceStatus::Late => "LATE",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
        }
    }
}

/// One of the six fixed teaching time slots.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Shift {
    #[serde(rename = "1")]
    One,
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "4")]
    Four,
    #[serde(rename = "5")]
    Five,
    #[serde(rename = "6")]
    Six,
}

impl Shift {
    pub fn code(&self) -> &'static str {
        match self {
            Shift::One => "1",
            Shift::Two => "2",
            Shift::Three => "3",
            Shift::Four => "4",
            Shift::Five => "5",
            Shift::Six => "6",
        }
    }

    pub fn time_range(&self) -> &'static str {
        match self {
            Shift::One => "07:15 - 09:15",
            Shift::Two => "09:25 - 11:25",
            Shift::Three => "12:00 - 14:00",
            Shift::Four => "14:10 - 16:10",
            Shift::Five => "16:20 - 18:20",
            Shift::Six => "18:30 - 20:30",
        }
    }
}

/// Scheduled weekdays of a class, wire-encoded as comma-separated
/// single-digit codes (0=Sunday .. 6=Saturday), e.g. "1,3,5".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct DaysOfWeek(String);

impl DaysOfWeek {
    pub fn new(raw: impl Into<String>) -> Self {
        DaysOfWeek(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decodes the codes, silently skipping anything malformed.
    pub fn days(&self) -> Vec<Weekday> {
        self.0
            .split(',')
            .filter_map(|code| match code.trim() {
                "0" => Some(Weekday::Sun),
                "1" => Some(Weekday::Mon),
                "2" => Some(Weekday::Tue),
                "3" => Some(Weekday::Wed),
                "4" => Some(Weekday::Thu),
                "5" => Some(Weekday::Fri),
                "6" => Some(Weekday::Sat),
                _ => None,
            })
            .collect()
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.days().contains(&day)
    }
}

/// Anything with a server-assigned identifier.
pub trait Entity {
    fn entity_id(&self) -> &str;
}

/// A foreign-key field that arrives either as a bare identifier or as an
/// embedded object carrying enough fields to render without another fetch.
/// Variant order matters for untagged deserialization: a JSON string can
/// only be an `Id`, everything else falls through to `Embedded`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Ref<T> {
    Id(String),
    Embedded(T),
}

impl<T: Entity> Ref<T> {
    pub fn id(&self) -> &str {
        match self {
            Ref::Id(id) => id,
            Ref::Embedded(obj) => obj.entity_id(),
        }
    }
}

impl<T> Ref<T> {
    pub fn as_embedded(&self) -> Option<&T> {
        match self {
            Ref::Id(_) => None,
            Ref::Embedded(obj) => Some(obj),
        }
    }
}

/// Session dates are day-granular; the backend sends either a bare
/// `YYYY-MM-DD` or a full ISO timestamp depending on the endpoint, so we
/// parse the day prefix and ignore any time-of-day part.
pub fn parse_day(raw: &str) -> Option<NaiveDate> {
    let day = raw.get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

pub mod day_format {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&date.format("%Y-%m-%d").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(de)?;
        super::parse_day(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid session date: {raw}")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StudentSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub fullname: String,
    /// The human-facing student code, distinct from the database id.
    #[serde(rename = "studentId", default)]
    pub student_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Entity for StudentSummary {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubjectSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl Entity for SubjectSummary {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeacherSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub fullname: String,
}

impl Entity for TeacherSummary {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MajorSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
}

impl Entity for MajorSummary {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

/// The class shape embedded inside session references. Subject and teacher
/// are themselves reference fields and may be bare one level deeper.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(rename = "subjectId", default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Ref<SubjectSummary>>,
    #[serde(rename = "teacherId", default, skip_serializing_if = "Option::is_none")]
    pub teacher: Option<Ref<TeacherSummary>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shift: Option<Shift>,
}

impl Entity for ClassSummary {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

/// Full class record as returned by the class detail endpoint; owns the
/// enrolled roster used as the universe of attendance entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassDetail {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(rename = "subjectId")]
    pub subject: Ref<SubjectSummary>,
    #[serde(rename = "majorId", default, skip_serializing_if = "Option::is_none")]
    pub major: Option<Ref<MajorSummary>>,
    #[serde(rename = "teacherId")]
    pub teacher: Ref<TeacherSummary>,
    #[serde(rename = "studentIds", default)]
    pub students: Vec<StudentSummary>,
    #[serde(rename = "startDate", default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(rename = "totalSessions", default)]
    pub total_sessions: u32,
    pub shift: Shift,
    #[serde(default)]
    pub room: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "maxStudents", default)]
    pub max_students: u32,
    #[serde(rename = "daysOfWeek", default)]
    pub days_of_week: DaysOfWeek,
    #[serde(rename = "linkOnline", default, skip_serializing_if = "Option::is_none")]
    pub link_online: Option<String>,
    #[serde(rename = "deletedAt", default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for ClassDetail {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

/// One scheduled meeting of a class on a specific date. Also the shape
/// embedded inside attendance references, where the audit fields are absent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "classId")]
    pub class: Ref<ClassSummary>,
    #[serde(rename = "sessionDate", with = "day_format")]
    pub session_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for Session {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

/// Creation payload for a session; identifiers and audit fields are
/// server-assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSession {
    #[serde(rename = "classId")]
    pub class_id: String,
    #[serde(rename = "sessionDate", with = "day_format")]
    pub session_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// A committed attendance entry. At most one non-deleted record exists per
/// (session, student) pair; `deleted_at` marks a soft delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "sessionId")]
    pub session: Ref<Session>,
    #[serde(rename = "studentId")]
    pub student: Ref<StudentSummary>,
    pub status: AttendanceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(rename = "deletedAt", default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl AttendanceRecord {
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// One item of a bulk commit/amend payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttendanceEntry {
    #[serde(rename = "studentId")]
    pub student_id: String,
    pub status: AttendanceStatus,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageMeta {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub limit: u32,
    #[serde(rename = "totalPages", default)]
    pub total_pages: u32,
}

/// One page of a listing response.
#[derive(Debug, Clone)]
pub struct Paged<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}
