//! End-to-end roll-call lifecycle against a recording mock backend.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use rollcall::api::{AttendanceApi, HistoryQuery, ResetOutcome, SessionAttendance};
use rollcall::error::{Error, Result};
use rollcall::model::{
    AttendanceEntry, AttendanceRecord, AttendanceStatus, ClassDetail, Paged, Session,
};
use rollcall::resolve::Directory;
use rollcall::roster::{RecordingState, SessionRoster};

fn class_detail(students: &[(&str, &str)]) -> ClassDetail {
    let students: Vec<_> = students
        .iter()
        .map(|(id, name)| {
            json!({ "_id": id, "fullname": name, "studentId": format!("SV-{id}") })
        })
        .collect();
    serde_json::from_value(json!({
        "_id": "c1",
        "name": "CS101",
        "subjectId": { "_id": "sub1", "name": "Algorithms" },
        "teacherId": { "_id": "t1", "fullname": "Dr. Minh" },
        "studentIds": students,
        "shift": "2",
        "daysOfWeek": "1,3,5"
    }))
    .unwrap()
}

fn record(id: &str, student_id: &str, status: AttendanceStatus, note: &str) -> AttendanceRecord {
    serde_json::from_value(json!({
        "_id": id,
        "sessionId": "sess1",
        "studentId": student_id,
        "status": status.as_str(),
        "note": note,
        "createdAt": Utc::now().to_rfc3339(),
        "updatedAt": Utc::now().to_rfc3339()
    }))
    .unwrap()
}

/// Scripted backend that records every write it receives. Each call to the
/// status endpoint pops the next scripted response, so tests can model other
/// clients committing in between.
struct MockApi {
    class: ClassDetail,
    statuses: Mutex<Vec<SessionAttendance>>,
    creates: Mutex<Vec<(String, Vec<AttendanceEntry>)>>,
    updates: Mutex<Vec<(String, Vec<AttendanceEntry>)>>,
    reject_create_with_conflict: bool,
}

impl MockApi {
    fn new(class: ClassDetail, statuses: Vec<SessionAttendance>) -> Self {
        MockApi {
            class,
            statuses: Mutex::new(statuses),
            creates: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
            reject_create_with_conflict: false,
        }
    }
}

fn status(records: Vec<AttendanceRecord>) -> SessionAttendance {
    serde_json::from_value(json!({
        "hasAttendance": !records.is_empty(),
        "attendances": serde_json::to_value(records).unwrap()
    }))
    .unwrap()
}

#[async_trait]
impl AttendanceApi for MockApi {
    async fn class_detail(&self, _class_id: &str) -> Result<ClassDetail> {
        Ok(self.class.clone())
    }

    async fn sessions_by_class(&self, _class_id: &str, _unrecorded_only: bool) -> Result<Vec<Session>> {
        Ok(Vec::new())
    }

    async fn attendance_status(&self, _session_id: &str) -> Result<SessionAttendance> {
        let mut statuses = self.statuses.lock().unwrap();
        if statuses.len() > 1 {
            Ok(statuses.remove(0))
        } else {
            Ok(statuses[0].clone())
        }
    }

    async fn create_attendances(
        &self,
        session_id: &str,
        entries: &[AttendanceEntry],
    ) -> Result<Vec<AttendanceRecord>> {
        if self.reject_create_with_conflict {
            return Err(Error::Conflict(
                "attendance already exists for session".into(),
            ));
        }
        self.creates
            .lock()
            .unwrap()
            .push((session_id.to_string(), entries.to_vec()));
        Ok(Vec::new())
    }

    async fn update_attendances(
        &self,
        session_id: &str,
        entries: &[AttendanceEntry],
    ) -> Result<Vec<AttendanceRecord>> {
        self.updates
            .lock()
            .unwrap()
            .push((session_id.to_string(), entries.to_vec()));
        Ok(Vec::new())
    }

    async fn list_attendances(&self, _query: &HistoryQuery) -> Result<Paged<AttendanceRecord>> {
        Err(Error::NotFound("not scripted".into()))
    }

    async fn reset_attendance(&self, _session_id: &str) -> Result<ResetOutcome> {
        Err(Error::NotFound("not scripted".into()))
    }
}

#[tokio::test]
async fn first_recording_defaults_absent_and_commits_every_student() {
    let api = MockApi::new(
        class_detail(&[("s1", "An Nguyen"), ("s2", "Binh Tran"), ("s3", "Chi Le")]),
        vec![status(Vec::new())],
    );
    let mut dir = Directory::new();
    let mut roster = SessionRoster::load(&api, &mut dir, "sess1", "c1").await.unwrap();

    assert_eq!(roster.state(), RecordingState::Unrecorded);
    assert!(roster.entries().iter().all(|e| e.status == AttendanceStatus::Absent));

    assert!(roster.set_status("s1", AttendanceStatus::Present));
    assert!(roster.set_status("s2", AttendanceStatus::Late));
    assert!(roster.set_note("s2", "bus delay"));

    let state = roster.save(&api).await.unwrap();
    assert_eq!(state, RecordingState::Recorded);
    assert!(roster.is_recorded());
    assert!(!roster.has_changes());

    let creates = api.creates.lock().unwrap();
    assert_eq!(creates.len(), 1);
    let (session_id, entries) = &creates[0];
    assert_eq!(session_id, "sess1");
    // One entry per enrolled student, including the untouched absentee.
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].status, AttendanceStatus::Present);
    assert_eq!(entries[1].status, AttendanceStatus::Late);
    assert_eq!(entries[1].note, "bus delay");
    assert_eq!(entries[2].status, AttendanceStatus::Absent);
    assert!(api.updates.lock().unwrap().is_empty());
}

#[tokio::test]
async fn double_commit_surfaces_conflict_and_leaves_roster_intact() {
    let mut api = MockApi::new(
        class_detail(&[("s1", "An Nguyen")]),
        vec![status(Vec::new())],
    );
    api.reject_create_with_conflict = true;

    let mut dir = Directory::new();
    let mut roster = SessionRoster::load(&api, &mut dir, "sess1", "c1").await.unwrap();
    roster.set_status("s1", AttendanceStatus::Present);

    let err = roster.commit(&api).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
    assert_eq!(err.to_string(), "attendance already exists for session");

    // Local edits survive the failed round-trip.
    assert_eq!(roster.state(), RecordingState::Unrecorded);
    assert!(roster.has_changes());
    assert_eq!(roster.entries()[0].status, AttendanceStatus::Present);
}

#[tokio::test]
async fn loading_a_recorded_session_overlays_existing_records() {
    let api = MockApi::new(
        class_detail(&[("s1", "An Nguyen"), ("s2", "Binh Tran")]),
        vec![status(vec![
            record("r1", "s1", AttendanceStatus::Late, "overslept"),
        ])],
    );
    let mut dir = Directory::new();
    let roster = SessionRoster::load(&api, &mut dir, "sess1", "c1").await.unwrap();

    assert_eq!(roster.state(), RecordingState::Recorded);
    assert_eq!(roster.entries()[0].status, AttendanceStatus::Late);
    assert_eq!(roster.entries()[0].note, "overslept");
    // Student without a record stays at the absent default.
    assert_eq!(roster.entries()[1].status, AttendanceStatus::Absent);
}

#[tokio::test]
async fn amend_flow_uses_the_update_path() {
    let api = MockApi::new(
        class_detail(&[("s1", "An Nguyen")]),
        vec![status(vec![record("r1", "s1", AttendanceStatus::Absent, "")])],
    );
    let mut dir = Directory::new();
    let mut roster = SessionRoster::load(&api, &mut dir, "sess1", "c1").await.unwrap();

    // Guarded until amend mode is explicit.
    assert!(!roster.set_status("s1", AttendanceStatus::Present));
    roster.begin_amend();
    assert!(roster.set_status("s1", AttendanceStatus::Present));

    roster.save(&api).await.unwrap();
    assert!(api.creates.lock().unwrap().is_empty());
    let updates = api.updates.lock().unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].1[0].status, AttendanceStatus::Present);
    assert!(!roster.amend_mode());
}

#[tokio::test]
async fn save_rederives_state_when_someone_else_recorded_meanwhile() {
    // Loaded while unrecorded; by save time another client has committed.
    let api = MockApi::new(
        class_detail(&[("s1", "An Nguyen")]),
        vec![
            status(Vec::new()),
            status(vec![record("r1", "s1", AttendanceStatus::Present, "")]),
        ],
    );
    let mut dir = Directory::new();
    let mut roster = SessionRoster::load(&api, &mut dir, "sess1", "c1").await.unwrap();
    assert_eq!(roster.state(), RecordingState::Unrecorded);
    roster.set_status("s1", AttendanceStatus::Late);

    let state = roster.save(&api).await.unwrap();
    assert_eq!(state, RecordingState::Recorded);
    // Dispatched as an amend, not a double create.
    assert!(api.creates.lock().unwrap().is_empty());
    assert_eq!(api.updates.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn empty_roster_is_rejected_before_any_network_call() {
    let api = MockApi::new(class_detail(&[]), vec![status(Vec::new())]);
    let mut dir = Directory::new();
    let mut roster = SessionRoster::load(&api, &mut dir, "sess1", "c1").await.unwrap();

    let err = roster.save(&api).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(api.creates.lock().unwrap().is_empty());
    assert!(api.updates.lock().unwrap().is_empty());
}

#[tokio::test]
async fn soft_deleted_records_do_not_count_as_recorded() {
    let mut dead = record("r1", "s1", AttendanceStatus::Present, "");
    dead.deleted_at = Some(Utc::now());
    let api = MockApi::new(
        class_detail(&[("s1", "An Nguyen")]),
        vec![SessionAttendance {
            has_attendance: false,
            attendances: vec![dead],
        }],
    );
    let mut dir = Directory::new();
    let roster = SessionRoster::load(&api, &mut dir, "sess1", "c1").await.unwrap();
    assert_eq!(roster.state(), RecordingState::Unrecorded);
    assert_eq!(roster.entries()[0].status, AttendanceStatus::Absent);
}
