//! Reference resolution against an opportunistically filled directory.
//!
//! Foreign-key fields arrive either as bare identifiers or as embedded
//! objects. Resolution normalizes both shapes into display-ready views and
//! never fails: a bare id the directory has not seen yet degrades to a
//! placeholder label carrying the identifier.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::model::{
    AttendanceRecord, AttendanceStatus, ClassDetail, ClassSummary, Entity, MajorSummary, Ref,
    Session, StudentSummary, SubjectSummary, TeacherSummary,
};

/// Human-readable marker for a reference the directory cannot resolve yet.
pub fn placeholder_label(id: &str) -> String {
    format!("unresolved ({id})")
}

/// Local cache of previously seen entities, keyed by identifier. Listing
/// calls and the search list write embedded objects in as they observe
/// them. Not a source of truth: staleness is acceptable and a miss is
/// never an error.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    sessions: HashMap<String, Session>,
    classes: HashMap<String, ClassSummary>,
    subjects: HashMap<String, SubjectSummary>,
    teachers: HashMap<String, TeacherSummary>,
    students: HashMap<String, StudentSummary>,
    majors: HashMap<String, MajorSummary>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_session(&mut self, session: Session) {
        // An embedded class rides along for free.
        if let Some(class) = session.class.as_embedded() {
            self.insert_class(class.clone());
        }
        self.sessions.insert(session.id.clone(), session);
    }

    pub fn insert_class(&mut self, class: ClassSummary) {
        if let Some(subject) = class.subject.as_ref().and_then(|s| s.as_embedded()) {
            self.insert_subject(subject.clone());
        }
        if let Some(teacher) = class.teacher.as_ref().and_then(|t| t.as_embedded()) {
            self.insert_teacher(teacher.clone());
        }
        self.classes.insert(class.id.clone(), class);
    }

    pub fn insert_subject(&mut self, subject: SubjectSummary) {
        self.subjects.insert(subject.id.clone(), subject);
    }

    pub fn insert_teacher(&mut self, teacher: TeacherSummary) {
        self.teachers.insert(teacher.id.clone(), teacher);
    }

    pub fn insert_student(&mut self, student: StudentSummary) {
        self.students.insert(student.id.clone(), student);
    }

    pub fn insert_major(&mut self, major: MajorSummary) {
        self.majors.insert(major.id.clone(), major);
    }

    /// A class detail response carries its subject, teacher and the whole
    /// enrolled roster; absorb all of them.
    pub fn absorb_class_detail(&mut self, class: &ClassDetail) {
        self.classes.insert(
            class.id.clone(),
            ClassSummary {
                id: class.id.clone(),
                name: class.name.clone(),
                subject: Some(class.subject.clone()),
                teacher: Some(class.teacher.clone()),
                shift: Some(class.shift),
            },
        );
        if let Some(subject) = class.subject.as_embedded() {
            self.insert_subject(subject.clone());
        }
        if let Some(teacher) = class.teacher.as_embedded() {
            self.insert_teacher(teacher.clone());
        }
        if let Some(major) = class.major.as_ref().and_then(|m| m.as_embedded()) {
            self.insert_major(major.clone());
        }
        for student in &class.students {
            self.insert_student(student.clone());
        }
    }

    pub fn session(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn class(&self, id: &str) -> Option<&ClassSummary> {
        self.classes.get(id)
    }

    pub fn subject(&self, id: &str) -> Option<&SubjectSummary> {
        self.subjects.get(id)
    }

    pub fn teacher(&self, id: &str) -> Option<&TeacherSummary> {
        self.teachers.get(id)
    }

    pub fn student(&self, id: &str) -> Option<&StudentSummary> {
        self.students.get(id)
    }

    pub fn major(&self, id: &str) -> Option<&MajorSummary> {
        self.majors.get(id)
    }
}

/// Implemented by every entity shape the search list can page through, so
/// observed items end up in the directory regardless of type.
pub trait DirectoryEntry {
    fn store(&self, dir: &mut Directory);
}

impl DirectoryEntry for StudentSummary {
    fn store(&self, dir: &mut Directory) {
        dir.insert_student(self.clone());
    }
}

impl DirectoryEntry for SubjectSummary {
    fn store(&self, dir: &mut Directory) {
        dir.insert_subject(self.clone());
    }
}

impl DirectoryEntry for TeacherSummary {
    fn store(&self, dir: &mut Directory) {
        dir.insert_teacher(self.clone());
    }
}

impl DirectoryEntry for MajorSummary {
    fn store(&self, dir: &mut Directory) {
        dir.insert_major(self.clone());
    }
}

impl DirectoryEntry for ClassSummary {
    fn store(&self, dir: &mut Directory) {
        dir.insert_class(self.clone());
    }
}

impl DirectoryEntry for Session {
    fn store(&self, dir: &mut Directory) {
        dir.insert_session(self.clone());
    }
}

/// Display-ready student view. `resolved` is false when only the bare id
/// was available.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStudent {
    pub id: String,
    pub name: String,
    pub code: String,
    pub resolved: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedClass {
    pub id: String,
    pub name: String,
    pub subject_name: String,
    pub subject_code: Option<String>,
    pub teacher_name: String,
    pub resolved: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSession {
    pub id: String,
    pub date: Option<NaiveDate>,
    pub note: Option<String>,
    pub class: ResolvedClass,
    pub resolved: bool,
}

/// A fully resolved attendance row, ready to render.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAttendance {
    pub id: String,
    pub student: ResolvedStudent,
    pub session: ResolvedSession,
    pub status: AttendanceStatus,
    pub note: Option<String>,
    pub recorded_at: chrono::DateTime<chrono::Utc>,
}

pub fn resolve_student(reference: &Ref<StudentSummary>, dir: &Directory) -> ResolvedStudent {
    let from_summary = |s: &StudentSummary| ResolvedStudent {
        id: s.id.clone(),
        name: s.fullname.clone(),
        code: s.student_code.clone(),
        resolved: true,
    };
    match reference {
        Ref::Embedded(student) => from_summary(student),
        Ref::Id(id) => match dir.student(id) {
            Some(student) => from_summary(student),
            None => ResolvedStudent {
                id: id.clone(),
                name: placeholder_label(id),
                code: String::new(),
                resolved: false,
            },
        },
    }
}

fn resolve_subject(
    reference: Option<&Ref<SubjectSummary>>,
    dir: &Directory,
) -> (String, Option<String>) {
    match reference {
        Some(Ref::Embedded(subject)) => (subject.name.clone(), subject.code.clone()),
        Some(Ref::Id(id)) => match dir.subject(id) {
            Some(subject) => (subject.name.clone(), subject.code.clone()),
            None => (placeholder_label(id), None),
        },
        None => (placeholder_label(""), None),
    }
}

fn resolve_teacher(reference: Option<&Ref<TeacherSummary>>, dir: &Directory) -> String {
    match reference {
        Some(Ref::Embedded(teacher)) => teacher.fullname.clone(),
        Some(Ref::Id(id)) => dir
            .teacher(id)
            .map(|t| t.fullname.clone())
            .unwrap_or_else(|| placeholder_label(id)),
        None => placeholder_label(""),
    }
}

/// Subject and teacher are resolved independently of whether the class
/// itself arrived embedded, since they may still be bare one level deeper.
pub fn resolve_class(reference: &Ref<ClassSummary>, dir: &Directory) -> ResolvedClass {
    let from_summary = |class: &ClassSummary| {
        let (subject_name, subject_code) = resolve_subject(class.subject.as_ref(), dir);
        ResolvedClass {
            id: class.id.clone(),
            name: class.name.clone(),
            subject_name,
            subject_code,
            teacher_name: resolve_teacher(class.teacher.as_ref(), dir),
            resolved: true,
        }
    };
    match reference {
        Ref::Embedded(class) => from_summary(class),
        Ref::Id(id) => match dir.class(id) {
            Some(class) => from_summary(class),
            None => ResolvedClass {
                id: id.clone(),
                name: placeholder_label(id),
                subject_name: placeholder_label(""),
                subject_code: None,
                teacher_name: placeholder_label(""),
                resolved: false,
            },
        },
    }
}

pub fn resolve_session(reference: &Ref<Session>, dir: &Directory) -> ResolvedSession {
    let from_session = |session: &Session| ResolvedSession {
        id: session.id.clone(),
        date: Some(session.session_date),
        note: session.note.clone(),
        class: resolve_class(&session.class, dir),
        resolved: true,
    };
    match reference {
        Ref::Embedded(session) => from_session(session),
        Ref::Id(id) => match dir.session(id) {
            Some(session) => from_session(session),
            None => ResolvedSession {
                id: id.clone(),
                date: None,
                note: None,
                class: ResolvedClass {
                    id: String::new(),
                    name: placeholder_label(id),
                    subject_name: placeholder_label(""),
                    subject_code: None,
                    teacher_name: placeholder_label(""),
                    resolved: false,
                },
                resolved: false,
            },
        },
    }
}

pub fn resolve_attendance(record: &AttendanceRecord, dir: &Directory) -> ResolvedAttendance {
    ResolvedAttendance {
        id: record.id.clone(),
        student: resolve_student(&record.student, dir),
        session: resolve_session(&record.session, dir),
        status: record.status,
        note: record.note.clone(),
        recorded_at: record.created_at,
    }
}
