//! Bulk import of spreadsheet attendance.
//!
//! Teaching rows are loaded in a single pass keyed on (teacher, date, class label, subject
//! label). Student rows take two passes: the first folds every row for the same
//! (date, class, student) into one status by priority, the second applies that status to every
//! teaching session the class had that day, upgrading stored rows only when the new status
//! outranks them. Both importers share the run's transaction, so a dry run performs the same
//! writes and counts and then rolls them back.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};

use chrono::{Duration, NaiveDate};
use tracing::{debug, info, warn};

use crate::apply::{ApplyMode, Outcome, Scope};
use crate::dates::parse_timestamp;
use crate::error::{Error, Result};
use crate::models::{
    EntityCatalog, NewTeachingAttendance, RecurringSchedule, StudentRow, TeachingKey, TeachingRow,
};
use crate::occurrence::DayOfWeek;
use crate::repo::{Database, Repository};
use crate::resolver::Resolvers;
use crate::status::AttendanceStatus;

#[derive(Debug, Clone, Copy)]
pub struct ImportOptions {
    pub mode: ApplyMode,
    pub skip_students: bool,
    pub snap_to_schedule_day: bool,
    pub min_substring_len: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        ImportOptions {
            mode: ApplyMode::Commit,
            skip_students: false,
            snap_to_schedule_day: false,
            min_substring_len: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportCounts {
    pub imported: usize,
    pub skipped: usize,
    pub errors: usize,
    /// Student rows whose name or class matched nothing.
    pub unmatched: usize,
    /// Student rows folded into an earlier row for the same day.
    pub merged: usize,
    /// Teaching rows moved onto their schedule's weekday.
    pub dates_corrected: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub teaching: ImportCounts,
    pub students: ImportCounts,
    pub sessions_refreshed: usize,
}

impl ImportSummary {
    pub fn errors(&self) -> usize {
        self.teaching.errors + self.students.errors
    }
}

/// Rows read from the tabular sources for one run.
#[derive(Debug, Clone, Default)]
pub struct ImportBatch {
    pub teaching: Vec<TeachingRow>,
    pub students: Vec<StudentRow>,
}

/// Lookup state shared by both importers for one run.
pub struct ImportContext<'a> {
    pub catalog: &'a EntityCatalog,
    pub resolvers: &'a Resolvers,
    pub schedules: &'a [RecurringSchedule],
    pub snap_to_schedule_day: bool,
}

pub async fn run_import<D: Database>(
    db: &D,
    batch: &ImportBatch,
    options: ImportOptions,
) -> Result<Outcome<ImportSummary>> {
    let mut scope = Scope::begin(db, options.mode).await?;
    match import_all(scope.repo(), batch, options).await {
        Ok(summary) => {
            info!(
                teaching = summary.teaching.imported,
                students = summary.students.imported,
                errors = summary.errors(),
                "import finished"
            );
            scope.finish(summary).await
        }
        Err(err) => {
            scope.abort().await?;
            Err(err)
        }
    }
}

async fn import_all<R: Repository>(
    repo: &mut R,
    batch: &ImportBatch,
    options: ImportOptions,
) -> Result<ImportSummary> {
    let term = repo
        .active_term()
        .await?
        .ok_or_else(|| Error::Precondition("no active academic term".to_string()))?;
    info!(term_id = term.id, term = %term.name, "using academic term");

    let catalog = repo.load_catalog().await?;
    let resolvers = Resolvers::build(&catalog, options.min_substring_len);
    info!(
        teachers = resolvers.teachers.table().len(),
        students = resolvers.students.table().len(),
        classes = resolvers.classes.table().len(),
        subjects = resolvers.subjects.table().len(),
        "lookup tables built"
    );
    if resolvers.teachers.table().is_empty() && !batch.teaching.is_empty() {
        warn!("teacher catalog is empty; every teaching row will be rejected");
    }
    let schedules = repo.active_schedules().await?;
    let ctx = ImportContext {
        catalog: &catalog,
        resolvers: &resolvers,
        schedules: &schedules,
        snap_to_schedule_day: options.snap_to_schedule_day,
    };

    let mut summary = ImportSummary {
        teaching: import_teaching(repo, &batch.teaching, &ctx).await?,
        ..ImportSummary::default()
    };
    if !options.skip_students {
        let pass = import_students(repo, &batch.students, &ctx).await?;
        summary.students = pass.counts;
        summary.sessions_refreshed =
            refresh_session_tallies(repo, &pass.touched, ctx.catalog).await?;
    }
    Ok(summary)
}

pub async fn import_teaching<R: Repository>(
    repo: &mut R,
    rows: &[TeachingRow],
    ctx: &ImportContext<'_>,
) -> Result<ImportCounts> {
    let mut counts = ImportCounts::default();

    for row in rows {
        if row.raw_teacher_name.trim().is_empty() {
            continue;
        }
        let timestamp = match parse_timestamp(&row.raw_timestamp) {
            Ok(timestamp) => timestamp,
            Err(err) => {
                warn!(row = row.row_number, error = %err, "invalid date");
                counts.errors += 1;
                continue;
            }
        };
        let Some(teacher) = ctx.resolvers.teachers.resolve(&row.raw_teacher_name) else {
            warn!(row = row.row_number, teacher = %row.raw_teacher_name, "teacher not found");
            counts.errors += 1;
            continue;
        };
        let Some(class) = ctx.resolvers.classes.resolve(&row.raw_class_name) else {
            warn!(row = row.row_number, class = %row.raw_class_name, "class not found");
            counts.errors += 1;
            continue;
        };
        let subject = ctx.resolvers.subjects.resolve(&row.raw_subject_name);
        let subject_id = subject.map(|s| s.entity.id);
        let subject_label = match subject {
            Some(found) => found.entity.name.clone(),
            None => row.raw_subject_name.trim().to_string(),
        };

        let candidates: Vec<&RecurringSchedule> = ctx
            .schedules
            .iter()
            .filter(|s| {
                s.teacher_id == Some(teacher.entity.id)
                    && s.class_id == Some(class.entity.id)
                    && s.subject_id == subject_id
            })
            .collect();
        let schedule = link_schedule(&candidates, timestamp.date, ctx.snap_to_schedule_day);

        let mut date = timestamp.date;
        if ctx.snap_to_schedule_day {
            if let Some(schedule) = schedule {
                if let Some(snapped) = snap_to_schedule_day(schedule, date, row.row_number) {
                    date = snapped;
                    counts.dates_corrected += 1;
                }
            }
        }

        let key = TeachingKey {
            teacher_id: teacher.entity.id,
            date,
            class_label: class.entity.name.clone(),
            subject_label: subject_label.clone(),
        };
        if repo.teaching_attendance_exists_by_key(&key).await? {
            counts.skipped += 1;
            continue;
        }

        let record = NewTeachingAttendance {
            schedule_id: schedule.map(|s| s.id),
            teacher_id: teacher.entity.id,
            class_id: Some(class.entity.id),
            date,
            teacher_label: Some(teacher.entity.name.clone()),
            class_label: Some(key.class_label),
            subject_label: Some(subject_label),
            day_label: Some(DayOfWeek::of(date).local_name().to_string()),
            period_label: Some(format!(
                "Jam ke-{} s/d {}",
                row.period_start.trim(),
                row.period_end.trim()
            )),
            summary: non_empty(&row.summary),
            minutes: non_empty(&row.minutes),
            teacher_status: AttendanceStatus::Present,
            annotation: None,
            recorded_at: timestamp.date_time(),
        };
        repo.insert_teaching_attendance(&record).await?;
        counts.imported += 1;
    }

    info!(
        imported = counts.imported,
        skipped = counts.skipped,
        errors = counts.errors,
        "teaching rows processed"
    );
    Ok(counts)
}

/// Schedule a teaching row belongs to among those for its teacher, class and subject: the one
/// held on the row's weekday, else the nearest weekday when snapping, else the first.
fn link_schedule<'s>(
    candidates: &[&'s RecurringSchedule],
    date: NaiveDate,
    snap: bool,
) -> Option<&'s RecurringSchedule> {
    let day_of = |schedule: &RecurringSchedule| schedule.day_name.parse::<DayOfWeek>().ok();
    let weekday = DayOfWeek::of(date);
    if let Some(same_day) = candidates.iter().find(|s| day_of(s) == Some(weekday)) {
        return Some(*same_day);
    }
    if snap {
        let nearest = candidates
            .iter()
            .filter_map(|s| day_of(s).map(|day| (day.nearest_shift_from(date).abs(), *s)))
            .min_by_key(|(distance, _)| *distance);
        if let Some((_, schedule)) = nearest {
            return Some(schedule);
        }
    }
    candidates.first().copied()
}

/// Date moved onto the schedule's weekday, or `None` when no move is needed or possible.
fn snap_to_schedule_day(
    schedule: &RecurringSchedule,
    date: NaiveDate,
    row_number: usize,
) -> Option<NaiveDate> {
    let day = match schedule.day_name.parse::<DayOfWeek>() {
        Ok(day) => day,
        Err(err) => {
            warn!(row = row_number, schedule_id = schedule.id, error = %err, "cannot snap date");
            return None;
        }
    };
    let shift = day.nearest_shift_from(date);
    if shift == 0 {
        return None;
    }
    let snapped = date + Duration::days(shift);
    debug!(row = row_number, from = %date, to = %snapped, "date moved to schedule day");
    Some(snapped)
}

fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Status held for one (date, class, student) after pass 1.
#[derive(Debug, Clone, PartialEq)]
struct PendingStatus {
    status: AttendanceStatus,
    note: Option<String>,
}

/// Result of the student importer: counts plus the sessions it wrote to, by class.
#[derive(Debug, Clone, Default)]
pub struct StudentPass {
    pub counts: ImportCounts,
    pub touched: BTreeMap<i64, i64>,
}

pub async fn import_students<R: Repository>(
    repo: &mut R,
    rows: &[StudentRow],
    ctx: &ImportContext<'_>,
) -> Result<StudentPass> {
    let mut pass = StudentPass::default();
    let pending = collect_students(rows, ctx, &mut pass.counts);
    info!(entries = pending.len(), "student rows collected");

    let mut sessions: HashMap<(NaiveDate, i64), Vec<i64>> = HashMap::new();
    for ((date, class_id, student_id), entry) in &pending {
        let session_ids = match sessions.entry((*date, *class_id)) {
            std::collections::hash_map::Entry::Occupied(found) => found.into_mut(),
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(repo.teaching_sessions_on(*date, *class_id).await?)
            }
        };
        if session_ids.is_empty() {
            debug!(%date, class_id, student_id, "no teaching session for student entry");
            pass.counts.skipped += 1;
            continue;
        }

        for session_id in session_ids.iter().copied() {
            match repo.student_attendance(session_id, *student_id).await? {
                Some(stored) if entry.status.outranks(stored.status) => {
                    repo.update_student_attendance(stored.id, entry.status, entry.note.as_deref())
                        .await?;
                    pass.counts.imported += 1;
                    pass.touched.insert(session_id, *class_id);
                }
                Some(_) => pass.counts.skipped += 1,
                None => {
                    repo.insert_student_attendance(
                        session_id,
                        *student_id,
                        entry.status,
                        entry.note.as_deref(),
                    )
                    .await?;
                    pass.counts.imported += 1;
                    pass.touched.insert(session_id, *class_id);
                }
            }
        }
    }

    info!(
        imported = pass.counts.imported,
        skipped = pass.counts.skipped,
        unmatched = pass.counts.unmatched,
        merged = pass.counts.merged,
        "student rows applied"
    );
    Ok(pass)
}

/// Pass 1: one status per (date, class, student), the most severe one seen.
fn collect_students(
    rows: &[StudentRow],
    ctx: &ImportContext<'_>,
    counts: &mut ImportCounts,
) -> BTreeMap<(NaiveDate, i64, i64), PendingStatus> {
    let mut pending = BTreeMap::new();

    for row in rows {
        if row.raw_participant_name.trim().is_empty() {
            continue;
        }
        let date = match parse_timestamp(&row.raw_timestamp) {
            Ok(timestamp) => timestamp.date,
            Err(err) => {
                warn!(row = row.row_number, error = %err, "invalid date");
                counts.errors += 1;
                continue;
            }
        };
        let Some(student) = ctx.resolvers.students.resolve(&row.raw_participant_name) else {
            debug!(row = row.row_number, student = %row.raw_participant_name, "student not found");
            counts.unmatched += 1;
            continue;
        };
        let class_id = ctx
            .resolvers
            .classes
            .resolve(&row.raw_class_name)
            .map(|class| class.entity.id)
            .or(student.entity.class_id);
        let Some(class_id) = class_id else {
            debug!(row = row.row_number, class = %row.raw_class_name, "class not found");
            counts.unmatched += 1;
            continue;
        };

        let incoming = PendingStatus {
            status: AttendanceStatus::from_import_code(&row.status_code),
            note: non_empty(&row.note),
        };
        match pending.entry((date, class_id, student.entity.id)) {
            Entry::Vacant(slot) => {
                slot.insert(incoming);
            }
            Entry::Occupied(mut slot) => {
                counts.merged += 1;
                let kept = slot.get().status;
                if kept.merge(incoming.status) != kept {
                    slot.insert(incoming);
                }
            }
        }
    }
    pending
}

/// Recomputes per-status student counts of the given sessions (session id to class id).
pub async fn refresh_session_tallies<R: Repository>(
    repo: &mut R,
    sessions: &BTreeMap<i64, i64>,
    catalog: &EntityCatalog,
) -> Result<usize> {
    for (session_id, class_id) in sessions {
        let tally = repo
            .session_student_tally(*session_id)
            .await?
            .with_roster(catalog.roster_size(*class_id));
        repo.update_session_tally(*session_id, tally).await?;
    }
    if !sessions.is_empty() {
        info!(sessions = sessions.len(), "session tallies refreshed");
    }
    Ok(sessions.len())
}
