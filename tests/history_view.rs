//! History window fetch and aggregation against a paging mock backend.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use rollcall::api::{AttendanceApi, HistoryQuery, ResetOutcome, SessionAttendance};
use rollcall::error::{Error, Result};
use rollcall::history::{self, HistoryFilter, FETCH_MAX_PAGES, FETCH_PAGE_LIMIT};
use rollcall::model::{
    AttendanceEntry, AttendanceRecord, AttendanceStatus, ClassDetail, PageMeta, Paged, Session,
};
use rollcall::resolve::{Directory, DirectoryEntry};

fn embedded_record(id: &str, day: &str, status: AttendanceStatus) -> AttendanceRecord {
    serde_json::from_value(json!({
        "_id": id,
        "sessionId": {
            "_id": format!("sess-{id}"),
            "sessionDate": day,
            "classId": { "_id": "c1", "name": "CS101" }
        },
        "studentId": { "_id": "s1", "fullname": "An Nguyen", "studentId": "SV001" },
        "status": status.as_str(),
        "createdAt": Utc::now().to_rfc3339(),
        "updatedAt": Utc::now().to_rfc3339()
    }))
    .unwrap()
}

/// Record whose session and student arrive as bare ids, resolvable only
/// through the directory.
fn bare_record(id: &str, session_id: &str, student_id: &str) -> AttendanceRecord {
    serde_json::from_value(json!({
        "_id": id,
        "sessionId": session_id,
        "studentId": student_id,
        "status": "PRESENT",
        "createdAt": Utc::now().to_rfc3339(),
        "updatedAt": Utc::now().to_rfc3339()
    }))
    .unwrap()
}

struct PagingApi {
    records: Vec<AttendanceRecord>,
    calls: AtomicU32,
    queries: Mutex<Vec<HistoryQuery>>,
}

impl PagingApi {
    fn new(records: Vec<AttendanceRecord>) -> Self {
        PagingApi {
            records,
            calls: AtomicU32::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl AttendanceApi for PagingApi {
    async fn class_detail(&self, _class_id: &str) -> Result<ClassDetail> {
        Err(Error::NotFound("not scripted".into()))
    }

    async fn sessions_by_class(&self, _class_id: &str, _unrecorded_only: bool) -> Result<Vec<Session>> {
        Err(Error::NotFound("not scripted".into()))
    }

    async fn attendance_status(&self, _session_id: &str) -> Result<SessionAttendance> {
        Err(Error::NotFound("not scripted".into()))
    }

    async fn create_attendances(&self, _s: &str, _e: &[AttendanceEntry]) -> Result<Vec<AttendanceRecord>> {
        Err(Error::NotFound("not scripted".into()))
    }

    async fn update_attendances(&self, _s: &str, _e: &[AttendanceEntry]) -> Result<Vec<AttendanceRecord>> {
        Err(Error::NotFound("not scripted".into()))
    }

    async fn list_attendances(&self, query: &HistoryQuery) -> Result<Paged<AttendanceRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.clone());
        let start = ((query.page - 1) * query.limit) as usize;
        let end = (start + query.limit as usize).min(self.records.len());
        let data = self.records.get(start..end).unwrap_or(&[]).to_vec();
        let total = self.records.len() as u64;
        Ok(Paged {
            data,
            meta: PageMeta {
                total,
                page: query.page,
                limit: query.limit,
                total_pages: total.div_ceil(query.limit as u64) as u32,
            },
        })
    }

    async fn reset_attendance(&self, _session_id: &str) -> Result<ResetOutcome> {
        Err(Error::NotFound("not scripted".into()))
    }
}

#[tokio::test]
async fn window_fetch_walks_every_server_page() {
    let total = FETCH_PAGE_LIMIT as usize * 2 + 30;
    let records: Vec<_> = (0..total)
        .map(|i| embedded_record(&format!("r{i:04}"), "2024-05-01", AttendanceStatus::Present))
        .collect();
    let api = PagingApi::new(records);

    let fetched = history::fetch_window(&api, &HistoryQuery::default()).await.unwrap();
    assert_eq!(fetched.len(), total);
    assert_eq!(api.calls.load(Ordering::SeqCst), 3);

    // Server-side filters ride along unchanged on every page request.
    let queries = api.queries.lock().unwrap();
    assert!(queries.iter().all(|q| q.limit == FETCH_PAGE_LIMIT));
    assert_eq!(queries[0].page, 1);
    assert_eq!(queries[2].page, 3);
}

/// Always serves a full page with empty meta, like a backend that ignores
/// pagination parameters.
struct EndlessApi {
    calls: AtomicU32,
}

#[async_trait]
impl AttendanceApi for EndlessApi {
    async fn class_detail(&self, _class_id: &str) -> Result<ClassDetail> {
        Err(Error::NotFound("not scripted".into()))
    }

    async fn sessions_by_class(&self, _class_id: &str, _unrecorded_only: bool) -> Result<Vec<Session>> {
        Err(Error::NotFound("not scripted".into()))
    }

    async fn attendance_status(&self, _session_id: &str) -> Result<SessionAttendance> {
        Err(Error::NotFound("not scripted".into()))
    }

    async fn create_attendances(&self, _s: &str, _e: &[AttendanceEntry]) -> Result<Vec<AttendanceRecord>> {
        Err(Error::NotFound("not scripted".into()))
    }

    async fn update_attendances(&self, _s: &str, _e: &[AttendanceEntry]) -> Result<Vec<AttendanceRecord>> {
        Err(Error::NotFound("not scripted".into()))
    }

    async fn list_attendances(&self, query: &HistoryQuery) -> Result<Paged<AttendanceRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let template = embedded_record("r", "2024-05-01", AttendanceStatus::Present);
        Ok(Paged {
            data: vec![template; query.limit as usize],
            meta: PageMeta::default(),
        })
    }

    async fn reset_attendance(&self, _session_id: &str) -> Result<ResetOutcome> {
        Err(Error::NotFound("not scripted".into()))
    }
}

#[tokio::test]
async fn window_fetch_stops_at_the_page_cap() {
    let api = EndlessApi {
        calls: AtomicU32::new(0),
    };
    let fetched = history::fetch_window(&api, &HistoryQuery::default()).await.unwrap();
    assert_eq!(api.calls.load(Ordering::SeqCst), FETCH_MAX_PAGES);
    assert_eq!(fetched.len(), (FETCH_MAX_PAGES * FETCH_PAGE_LIMIT) as usize);
}

#[tokio::test]
async fn window_fetch_preserves_base_filters() {
    let api = PagingApi::new(vec![embedded_record("r1", "2024-05-01", AttendanceStatus::Late)]);
    let base = HistoryQuery {
        class_id: Some("c1".into()),
        status: Some(AttendanceStatus::Late),
        ..HistoryQuery::default()
    };
    history::fetch_window(&api, &base).await.unwrap();
    let queries = api.queries.lock().unwrap();
    assert_eq!(queries[0].class_id.as_deref(), Some("c1"));
    assert_eq!(queries[0].status, Some(AttendanceStatus::Late));
}

#[tokio::test]
async fn bare_references_resolve_through_the_directory() {
    let api = PagingApi::new(vec![
        embedded_record("r1", "2024-05-02", AttendanceStatus::Present),
        bare_record("r2", "sess-known", "s2"),
        bare_record("r3", "sess-unknown", "s-unknown"),
    ]);

    let mut dir = Directory::new();
    let session: Session = serde_json::from_value(json!({
        "_id": "sess-known",
        "sessionDate": "2024-05-01",
        "classId": { "_id": "c2", "name": "CS202" }
    }))
    .unwrap();
    session.store(&mut dir);
    let student: rollcall::model::StudentSummary = serde_json::from_value(json!({
        "_id": "s2",
        "fullname": "Binh Tran",
        "studentId": "SV002"
    }))
    .unwrap();
    student.store(&mut dir);

    let records = history::fetch_window(&api, &HistoryQuery::default()).await.unwrap();
    let view = history::aggregate(&records, &dir, &HistoryFilter::default(), 1, 20);

    assert_eq!(view.stats.total, 3);

    let known = view.items.iter().find(|r| r.id == "r2").unwrap();
    assert!(known.student.resolved);
    assert_eq!(known.student.name, "Binh Tran");
    assert_eq!(known.session.class.name, "CS202");
    assert_eq!(known.session.date, rollcall::model::parse_day("2024-05-01"));

    // Unknown ids degrade to placeholders instead of failing.
    let unknown = view.items.iter().find(|r| r.id == "r3").unwrap();
    assert!(!unknown.student.resolved);
    assert_eq!(unknown.student.name, "unresolved (s-unknown)");
    assert_eq!(unknown.session.date, None);

    // Date-less records sort after dated ones.
    assert_eq!(view.items.last().unwrap().id, "r3");
}

#[tokio::test]
async fn class_filter_and_search_compose_over_the_window() {
    let api = PagingApi::new(vec![
        embedded_record("r1", "2024-05-01", AttendanceStatus::Present),
        embedded_record("r2", "2024-05-02", AttendanceStatus::Absent),
        bare_record("r3", "sess-other", "s2"),
    ]);
    let mut dir = Directory::new();
    let session: Session = serde_json::from_value(json!({
        "_id": "sess-other",
        "sessionDate": "2024-05-03",
        "classId": { "_id": "c2", "name": "CS202" }
    }))
    .unwrap();
    session.store(&mut dir);

    let records = history::fetch_window(&api, &HistoryQuery::default()).await.unwrap();
    let filter = HistoryFilter {
        class_id: Some("c1".into()),
        ..HistoryFilter::default()
    };
    let view = history::aggregate(&records, &dir, &filter, 1, 20);
    assert_eq!(view.stats.total, 2);
    assert!((view.stats.attendance_rate - 50.0).abs() < f64::EPSILON);

    let filter = HistoryFilter {
        search: Some("cs202".into()),
        ..HistoryFilter::default()
    };
    let view = history::aggregate(&records, &dir, &filter, 1, 20);
    assert_eq!(view.stats.total, 1);
    assert_eq!(view.items[0].id, "r3");
}
