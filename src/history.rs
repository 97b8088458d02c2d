//! History aggregation over committed attendance records.
//!
//! Records are reference-resolved first, then filtered, counted, grouped
//! for the calendar and paginated. Aggregation never fails: partial data
//! degrades to placeholders and an empty set yields zeroed stats, so the
//! reporting view stays navigable.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::{debug, instrument, warn};

use crate::api::{AttendanceApi, HistoryQuery};
use crate::error::Result;
use crate::model::{AttendanceRecord, AttendanceStatus, PageMeta};
use crate::resolve::{resolve_attendance, Directory, ResolvedAttendance};

/// Calendar cells have limited rendering space; buckets expose this many
/// records up front plus an overflow counter.
pub const CALENDAR_PREVIEW: usize = 2;

/// Per-request page size when pre-fetching the full query window from the
/// server before client-side filtering.
pub const FETCH_PAGE_LIMIT: u32 = 200;

/// Hard stop for the window walk. A server that keeps returning full pages
/// with zeroed meta must not spin the loop forever; the window is truncated
/// here instead.
pub const FETCH_MAX_PAGES: u32 = 50;

/// Conjunctive filters over resolved records. Date bounds are inclusive on
/// both ends: a record on exactly `start_date` or `end_date` is kept.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub class_id: Option<String>,
    pub status: Option<AttendanceStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Case-insensitive substring over resolved class/subject/teacher/
    /// student names and the student code. Applied client-side; the
    /// backend cannot search across resolved names.
    pub search: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HistoryStats {
    pub total: u64,
    pub present: u64,
    pub absent: u64,
    pub late: u64,
    /// Percentage of filtered records with status PRESENT or LATE. Late
    /// arrivals count as attended by policy.
    pub attendance_rate: f64,
}

/// Records of one calendar day for one class.
#[derive(Debug, Clone)]
pub struct CalendarBucket {
    pub date: NaiveDate,
    pub class_id: String,
    pub class_name: String,
    pub records: Vec<ResolvedAttendance>,
}

impl CalendarBucket {
    /// Truncated view for the calendar cell; `records` stays complete so
    /// callers can expand.
    pub fn preview(&self) -> &[ResolvedAttendance] {
        let n = self.records.len().min(CALENDAR_PREVIEW);
        &self.records[..n]
    }

    pub fn overflow(&self) -> usize {
        self.records.len().saturating_sub(CALENDAR_PREVIEW)
    }
}

/// One aggregated, paginated view over a set of attendance records.
#[derive(Debug, Clone)]
pub struct HistoryView {
    /// The requested page of the filtered, sorted set.
    pub items: Vec<ResolvedAttendance>,
    /// Computed over the whole filtered set, not just the page.
    pub stats: HistoryStats,
    pub page: PageMeta,
    pub calendar: Vec<CalendarBucket>,
}

fn matches(record: &ResolvedAttendance, filter: &HistoryFilter) -> bool {
    if let Some(class_id) = &filter.class_id {
        if &record.session.class.id != class_id {
            return false;
        }
    }
    if let Some(status) = filter.status {
        if record.status != status {
            return false;
        }
    }
    if filter.start_date.is_some() || filter.end_date.is_some() {
        // A record whose date cannot be resolved cannot satisfy a range.
        let Some(date) = record.session.date else {
            return false;
        };
        if let Some(start) = filter.start_date {
            if date < start {
                return false;
            }
        }
        if let Some(end) = filter.end_date {
            if date > end {
                return false;
            }
        }
    }
    if let Some(needle) = filter.search.as_deref().filter(|s| !s.is_empty()) {
        let needle = needle.to_lowercase();
        let haystacks = [
            record.session.class.name.as_str(),
            record.session.class.subject_name.as_str(),
            record.session.class.teacher_name.as_str(),
            record.student.name.as_str(),
            record.student.code.as_str(),
        ];
        if !haystacks.iter().any(|h| h.to_lowercase().contains(&needle)) {
            return false;
        }
    }
    true
}

fn stats_of(records: &[ResolvedAttendance]) -> HistoryStats {
    let total = records.len() as u64;
    let mut stats = HistoryStats {
        total,
        ..HistoryStats::default()
    };
    for record in records {
        match record.status {
            AttendanceStatus::Present => stats.present += 1,
            AttendanceStatus::Absent => stats.absent += 1,
            AttendanceStatus::Late => stats.late += 1,
        }
    }
    if total > 0 {
        stats.attendance_rate = (stats.present + stats.late) as f64 / total as f64 * 100.0;
    }
    stats
}

/// Default order: session date descending, ties by class name ascending,
/// then record id so the order is total.
fn sort_records(records: &mut [ResolvedAttendance]) {
    records.sort_by(|a, b| {
        b.session
            .date
            .cmp(&a.session.date)
            .then_with(|| a.session.class.name.cmp(&b.session.class.name))
            .then_with(|| a.id.cmp(&b.id))
    });
}

fn calendar_of(records: &[ResolvedAttendance]) -> Vec<CalendarBucket> {
    let mut buckets: BTreeMap<(NaiveDate, String), CalendarBucket> = BTreeMap::new();
    for record in records {
        let Some(date) = record.session.date else {
            continue;
        };
        let key = (date, record.session.class.id.clone());
        buckets
            .entry(key)
            .or_insert_with(|| CalendarBucket {
                date,
                class_id: record.session.class.id.clone(),
                class_name: record.session.class.name.clone(),
                records: Vec::new(),
            })
            .records
            .push(record.clone());
    }
    buckets.into_values().collect()
}

/// Offset pagination over the already-filtered set. `page` is 1-based and
/// clamped into the valid range, so the reported page never exceeds
/// `total_pages` and an empty set still reads as page 1 of 1.
fn paginate(records: Vec<ResolvedAttendance>, page: u32, limit: u32) -> (Vec<ResolvedAttendance>, PageMeta) {
    let total = records.len() as u64;
    let limit = limit.max(1);
    let total_pages = (total.div_ceil(limit as u64) as u32).max(1);
    let page = page.clamp(1, total_pages);
    let start = ((page - 1) as usize).saturating_mul(limit as usize);
    let items = records
        .into_iter()
        .skip(start)
        .take(limit as usize)
        .collect();
    (
        items,
        PageMeta {
            total,
            page,
            limit,
            total_pages,
        },
    )
}

/// Resolves, filters, counts, groups and paginates in one pass. Soft-deleted
/// records are invisible to every view.
pub fn aggregate(
    records: &[AttendanceRecord],
    dir: &Directory,
    filter: &HistoryFilter,
    page: u32,
    limit: u32,
) -> HistoryView {
    let mut filtered: Vec<ResolvedAttendance> = records
        .iter()
        .filter(|r| r.is_live())
        .map(|r| resolve_attendance(r, dir))
        .filter(|r| matches(r, filter))
        .collect();

    let stats = stats_of(&filtered);
    sort_records(&mut filtered);
    let calendar = calendar_of(&filtered);
    let (items, page) = paginate(filtered, page, limit);
    debug!(total = stats.total, pages = page.total_pages, "history aggregated");

    HistoryView {
        items,
        stats,
        page,
        calendar,
    }
}

/// Fetches every server page of the query window up front. The backend
/// filters by class/student/status/date range; free-text search happens
/// afterwards in `aggregate`, which is why the window must be complete
/// before counting.
#[instrument(skip(api))]
pub async fn fetch_window(
    api: &dyn AttendanceApi,
    base: &HistoryQuery,
) -> Result<Vec<AttendanceRecord>> {
    let mut out = Vec::new();
    let mut page = 1u32;
    loop {
        let query = HistoryQuery {
            page,
            limit: FETCH_PAGE_LIMIT,
            ..base.clone()
        };
        let batch = api.list_attendances(&query).await?;
        let fetched = batch.data.len();
        out.extend(batch.data);
        let last = fetched < FETCH_PAGE_LIMIT as usize
            || (batch.meta.total_pages > 0 && page >= batch.meta.total_pages);
        if last {
            break;
        }
        if page >= FETCH_MAX_PAGES {
            warn!(page, records = out.len(), "history window truncated at page cap");
            break;
        }
        page += 1;
    }
    debug!(records = out.len(), "history window fetched");
    Ok(out)
}
