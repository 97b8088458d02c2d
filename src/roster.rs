//! Per-session attendance lifecycle.
//!
//! A session is `Unrecorded` until its first bulk commit and `Recorded`
//! afterwards; there is no way back except the external reset endpoint.
//! Edits on a recorded roster are rejected until the caller explicitly
//! enters amend mode, so a stale screen cannot silently overwrite a
//! committed roll call.

use tracing::{info, instrument, warn};

use crate::api::AttendanceApi;
use crate::error::{Error, Result};
use crate::model::{AttendanceEntry, AttendanceStatus, Entity};
use crate::resolve::Directory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Unrecorded,
    Recorded,
}

/// One row of the roll-call sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub student_id: String,
    pub student_name: String,
    pub status: AttendanceStatus,
    pub note: String,
}

/// Editable roll-call sheet for one session.
#[derive(Debug, Clone)]
pub struct SessionRoster {
    session_id: String,
    class_id: String,
    state: RecordingState,
    amend_mode: bool,
    dirty: bool,
    entries: Vec<RosterEntry>,
}

impl SessionRoster {
    /// Hydrates the roster: every enrolled student of the session's class,
    /// overlaid with any existing live attendance records. Students without
    /// a record default to absent with an empty note. The recording state
    /// is derived from the lookup, never from cached UI state.
    #[instrument(skip(api, dir))]
    pub async fn load(
        api: &dyn AttendanceApi,
        dir: &mut Directory,
        session_id: &str,
        class_id: &str,
    ) -> Result<Self> {
        let class = api.class_detail(class_id).await?;
        dir.absorb_class_detail(&class);

        let status = api.attendance_status(session_id).await?;
        let existing: Vec<_> = status
            .attendances
            .iter()
            .filter(|r| r.is_live())
            .collect();

        let entries: Vec<RosterEntry> = class
            .students
            .iter()
            .map(|student| {
                let record = existing
                    .iter()
                    .find(|r| r.student.id() == student.id);
                RosterEntry {
                    student_id: student.id.clone(),
                    student_name: student.fullname.clone(),
                    status: record.map(|r| r.status).unwrap_or(AttendanceStatus::Absent),
                    note: record
                        .and_then(|r| r.note.clone())
                        .unwrap_or_default(),
                }
            })
            .collect();

        let state = if existing.is_empty() {
            RecordingState::Unrecorded
        } else {
            RecordingState::Recorded
        };
        info!(session_id, ?state, students = entries.len(), "roster loaded");

        Ok(SessionRoster {
            session_id: session_id.to_string(),
            class_id: class_id.to_string(),
            state,
            amend_mode: false,
            dirty: false,
            entries,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn class_id(&self) -> &str {
        &self.class_id
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn is_recorded(&self) -> bool {
        self.state == RecordingState::Recorded
    }

    pub fn amend_mode(&self) -> bool {
        self.amend_mode
    }

    pub fn has_changes(&self) -> bool {
        self.dirty
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    /// Explicit intent to edit an already-recorded session.
    pub fn begin_amend(&mut self) {
        if self.state == RecordingState::Recorded {
            self.amend_mode = true;
        }
    }

    fn editable(&self) -> bool {
        self.state == RecordingState::Unrecorded || self.amend_mode
    }

    /// In-memory edit; returns false (roster unchanged) when the session is
    /// recorded and amend mode has not been entered.
    pub fn set_status(&mut self, student_id: &str, status: AttendanceStatus) -> bool {
        if !self.editable() {
            warn!(session_id = %self.session_id, "edit rejected: attendance already recorded");
            return false;
        }
        match self.entries.iter_mut().find(|e| e.student_id == student_id) {
            Some(entry) => {
                entry.status = status;
                self.dirty = true;
                true
            }
            None => false,
        }
    }

    pub fn set_note(&mut self, student_id: &str, note: &str) -> bool {
        if !self.editable() {
            warn!(session_id = %self.session_id, "edit rejected: attendance already recorded");
            return false;
        }
        match self.entries.iter_mut().find(|e| e.student_id == student_id) {
            Some(entry) => {
                entry.note = note.to_string();
                self.dirty = true;
                true
            }
            None => false,
        }
    }

    /// Applies one status to every entry in one pass; same guard as
    /// `set_status`.
    pub fn bulk_set_status(&mut self, status: AttendanceStatus) -> bool {
        if !self.editable() {
            warn!(session_id = %self.session_id, "bulk edit rejected: attendance already recorded");
            return false;
        }
        for entry in &mut self.entries {
            entry.status = status;
        }
        self.dirty = !self.entries.is_empty();
        self.dirty
    }

    /// One payload item per roster entry.
    pub fn payload(&self) -> Vec<AttendanceEntry> {
        self.entries
            .iter()
            .map(|e| AttendanceEntry {
                student_id: e.student_id.clone(),
                status: e.status,
                note: e.note.clone(),
            })
            .collect()
    }

    fn require_nonempty(&self) -> Result<()> {
        if self.entries.is_empty() {
            return Err(Error::validation("cannot record attendance for an empty roster"));
        }
        Ok(())
    }

    /// Create path: first recording of the session. A conflict here means
    /// someone recorded it in the meantime; the caller must reload rather
    /// than trust this instance.
    #[instrument(skip(self, api), fields(session_id = %self.session_id))]
    pub async fn commit(&mut self, api: &dyn AttendanceApi) -> Result<()> {
        self.require_nonempty()?;
        api.create_attendances(&self.session_id, &self.payload()).await?;
        info!(entries = self.entries.len(), "attendance committed");
        self.after_save();
        Ok(())
    }

    /// Amend path for an already-recorded session.
    #[instrument(skip(self, api), fields(session_id = %self.session_id))]
    pub async fn amend(&mut self, api: &dyn AttendanceApi) -> Result<()> {
        self.require_nonempty()?;
        api.update_attendances(&self.session_id, &self.payload()).await?;
        info!(entries = self.entries.len(), "attendance amended");
        self.after_save();
        Ok(())
    }

    /// Commit-or-amend dispatch. Re-derives "already recorded?" from a
    /// fresh status lookup instead of the state this instance was loaded
    /// with, so a roster held open across someone else's commit does not
    /// double-create.
    pub async fn save(&mut self, api: &dyn AttendanceApi) -> Result<RecordingState> {
        self.require_nonempty()?;
        let fresh = api.attendance_status(&self.session_id).await?;
        if fresh.has_attendance {
            self.state = RecordingState::Recorded;
            self.amend(api).await?;
        } else {
            self.commit(api).await?;
        }
        Ok(self.state)
    }

    fn after_save(&mut self) {
        self.state = RecordingState::Recorded;
        self.amend_mode = false;
        self.dirty = false;
    }
}
