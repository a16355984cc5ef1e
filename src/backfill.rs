//! Gap detection and "absent" backfill for teaching sessions, activities and meetings.
//!
//! A record is created only when none exists for its (subject, date) pair, so re-running a
//! backfill over the same window creates nothing new. A record that cannot be built (bad day
//! name, malformed clock, malformed participant list) is logged, counted and skipped.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use tracing::{debug, info, warn};

use crate::apply::{ApplyMode, Outcome, Scope};
use crate::dates::parse_clock;
use crate::config::MAX_LOOKBACK_DAYS;
use crate::error::{Error, Result};
use crate::models::{
    Activity, Meeting, NewActivityAttendance, NewMeetingAttendance, NewTeachingAttendance,
    ParticipantStatus, RecurringSchedule,
};
use crate::occurrence::{expand, DayOfWeek};
use crate::repo::{Database, Repository};
use crate::status::AttendanceStatus;

pub const AUTO_ANNOTATION: &str = "auto-recorded — no submission";
pub const AUTO_PARTICIPANT_NOTE: &str = "auto-recorded";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindTally {
    pub created: usize,
    /// Occurrences that already had a record.
    pub existing: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillSummary {
    pub teaching: KindTally,
    pub activities: KindTally,
    pub meetings: KindTally,
}

impl BackfillSummary {
    pub fn created(&self) -> usize {
        self.teaching.created + self.activities.created + self.meetings.created
    }

    pub fn errors(&self) -> usize {
        self.teaching.errors + self.activities.errors + self.meetings.errors
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackfillOptions {
    pub lookback_days: i64,
    pub now: NaiveDateTime,
    pub mode: ApplyMode,
}

/// Midnight `lookback_days` before `now`. Windows outside `0..=MAX_LOOKBACK_DAYS` are refused.
pub fn cutoff_for(now: NaiveDateTime, lookback_days: i64) -> Result<NaiveDateTime> {
    if !(0..=MAX_LOOKBACK_DAYS).contains(&lookback_days) {
        return Err(Error::Precondition(format!(
            "lookback of {lookback_days} days is outside 0..={MAX_LOOKBACK_DAYS}"
        )));
    }
    Duration::try_days(lookback_days)
        .and_then(|window| now.date().checked_sub_signed(window))
        .map(|start| start.and_time(NaiveTime::MIN))
        .ok_or_else(|| Error::Precondition(format!("lookback of {lookback_days} days underflows")))
}

/// Runs all three backfills inside one transaction.
pub async fn run_backfill<D: Database>(
    db: &D,
    options: BackfillOptions,
) -> Result<Outcome<BackfillSummary>> {
    let cutoff = cutoff_for(options.now, options.lookback_days)?;
    info!(%cutoff, now = %options.now, "starting backfill");

    let mut scope = Scope::begin(db, options.mode).await?;
    match backfill_all(scope.repo(), cutoff, options.now).await {
        Ok(summary) => {
            info!(
                created = summary.created(),
                errors = summary.errors(),
                "backfill finished"
            );
            scope.finish(summary).await
        }
        Err(err) => {
            scope.abort().await?;
            Err(err)
        }
    }
}

async fn backfill_all<R: Repository>(
    repo: &mut R,
    cutoff: NaiveDateTime,
    now: NaiveDateTime,
) -> Result<BackfillSummary> {
    Ok(BackfillSummary {
        teaching: backfill_teaching(repo, cutoff.date(), now).await?,
        activities: backfill_activities(repo, cutoff).await?,
        meetings: backfill_meetings(repo, cutoff.date(), now).await?,
    })
}

/// Propagates storage failures; counts record-level failures.
fn recover<T>(result: Result<T>, tally: &mut KindTally, context: &str) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_record_level() => {
            warn!(%context, error = %err, "skipping record");
            tally.errors += 1;
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

fn schedule_slot(schedule: &RecurringSchedule) -> Result<(DayOfWeek, NaiveTime)> {
    let day = schedule.day_name.parse::<DayOfWeek>()?;
    let end = parse_clock(&schedule.end_time)?;
    Ok((day, end))
}

pub async fn backfill_teaching<R: Repository>(
    repo: &mut R,
    lookback_start: NaiveDate,
    now: NaiveDateTime,
) -> Result<KindTally> {
    let mut tally = KindTally::default();

    for schedule in repo.active_schedules().await? {
        let Some(teacher_id) = schedule.teacher_id else {
            continue;
        };
        let context = format!("schedule {}", schedule.id);
        let Some((day, end_time)) = recover(schedule_slot(&schedule), &mut tally, &context)?
        else {
            continue;
        };

        for occurrence in expand(schedule.id, day, end_time, lookback_start, now) {
            if repo
                .teaching_attendance_exists(schedule.id, occurrence.date)
                .await?
            {
                tally.existing += 1;
                continue;
            }
            let record = NewTeachingAttendance {
                schedule_id: Some(schedule.id),
                teacher_id,
                class_id: schedule.class_id,
                date: occurrence.date,
                teacher_label: schedule.teacher_name.clone(),
                class_label: schedule.class_name.clone(),
                subject_label: schedule.subject_name.clone(),
                day_label: Some(day.local_name().to_string()),
                period_label: Some(format!("{}-{}", schedule.start_time, schedule.end_time)),
                summary: None,
                minutes: None,
                teacher_status: AttendanceStatus::Absent,
                annotation: Some(AUTO_ANNOTATION.to_string()),
                recorded_at: Some(occurrence.ends_at),
            };
            repo.insert_teaching_attendance(&record).await?;
            debug!(
                schedule_id = schedule.id,
                date = %occurrence.date,
                "teaching session backfilled"
            );
            tally.created += 1;
        }
    }

    info!(
        created = tally.created,
        errors = tally.errors,
        "teaching sessions processed"
    );
    Ok(tally)
}

fn auto_absent(participant_id: i64) -> ParticipantStatus {
    ParticipantStatus {
        participant_id,
        status: AttendanceStatus::Absent,
        note: Some(AUTO_PARTICIPANT_NOTE.to_string()),
        self_attended: false,
        attended_at: None,
    }
}

fn activity_record(activity: &Activity, date: NaiveDate) -> Result<NewActivityAttendance> {
    let participant_statuses = activity
        .co_participant_ids()?
        .into_iter()
        .map(auto_absent)
        .collect();
    Ok(NewActivityAttendance {
        activity_id: activity.id,
        date,
        responsible_id: activity.responsible_id,
        responsible_status: AttendanceStatus::Absent,
        responsible_note: Some(AUTO_ANNOTATION.to_string()),
        participant_statuses,
    })
}

pub async fn backfill_activities<R: Repository>(
    repo: &mut R,
    cutoff: NaiveDateTime,
) -> Result<KindTally> {
    let mut tally = KindTally::default();

    for activity in repo.closed_activities(cutoff).await? {
        let Some(starts_at) = activity.starts_at else {
            continue;
        };
        let date = starts_at.date();
        if repo.activity_attendance_exists(activity.id, date).await? {
            tally.existing += 1;
            continue;
        }
        let context = format!("activity {}", activity.id);
        let Some(record) = recover(activity_record(&activity, date), &mut tally, &context)?
        else {
            continue;
        };
        repo.insert_activity_attendance(&record).await?;
        debug!(
            activity = %activity.name,
            %date,
            ended = %activity.ends_at,
            "activity backfilled"
        );
        tally.created += 1;
    }

    info!(
        created = tally.created,
        errors = tally.errors,
        "activities processed"
    );
    Ok(tally)
}

/// End of a meeting; a missing end time means the start of its day.
fn meeting_end(meeting: &Meeting, date: NaiveDate) -> Result<NaiveDateTime> {
    let end = match meeting.end_time.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => parse_clock(raw)?,
        _ => NaiveTime::MIN,
    };
    Ok(date.and_time(end))
}

fn meeting_record(meeting: &Meeting, date: NaiveDate) -> Result<NewMeetingAttendance> {
    let participant_statuses = meeting
        .invitee_ids()?
        .into_iter()
        .map(auto_absent)
        .collect();
    Ok(NewMeetingAttendance {
        meeting_id: meeting.id,
        date,
        chair_id: meeting.chair_id,
        secretary_id: meeting.secretary_id,
        chair_status: AttendanceStatus::Absent,
        chair_note: Some(AUTO_PARTICIPANT_NOTE.to_string()),
        chair_self_attended: false,
        chair_attended_at: None,
        secretary_status: AttendanceStatus::Absent,
        secretary_note: Some(AUTO_PARTICIPANT_NOTE.to_string()),
        participant_statuses,
    })
}

pub async fn backfill_meetings<R: Repository>(
    repo: &mut R,
    cutoff: NaiveDate,
    now: NaiveDateTime,
) -> Result<KindTally> {
    let mut tally = KindTally::default();

    for meeting in repo.past_meetings(cutoff).await? {
        let Some(date) = meeting.date else {
            continue;
        };
        let context = format!("meeting {}", meeting.id);
        let Some(ends_at) = recover(meeting_end(&meeting, date), &mut tally, &context)? else {
            continue;
        };
        if ends_at > now {
            continue;
        }
        if repo.meeting_attendance_exists(meeting.id, date).await? {
            tally.existing += 1;
            continue;
        }
        let Some(record) = recover(meeting_record(&meeting, date), &mut tally, &context)? else {
            continue;
        };
        repo.insert_meeting_attendance(&record).await?;
        debug!(agenda = %meeting.agenda, %date, "meeting backfilled");
        tally.created += 1;
    }

    info!(
        created = tally.created,
        errors = tally.errors,
        "meetings processed"
    );
    Ok(tally)
}
