//! Storage seams of the engine. The Postgres store in `db` and the in-memory store used by
//! tests both implement these traits; every pipeline works against a [`Transaction`].

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

use crate::error::Result;
use crate::models::{
    AcademicTerm, Activity, EntityCatalog, Meeting, NewActivityAttendance, NewMeetingAttendance,
    NewTeachingAttendance, RecurringSchedule, StudentAttendance, TeachingKey,
};
use crate::status::{AttendanceStatus, StatusTally};

#[async_trait]
pub trait ScheduleSource {
    async fn active_schedules(&mut self) -> Result<Vec<RecurringSchedule>>;

    /// Active activities with a start time whose end lies before `cutoff`.
    async fn closed_activities(&mut self, cutoff: NaiveDateTime) -> Result<Vec<Activity>>;

    /// Active meetings with a date before `cutoff`.
    async fn past_meetings(&mut self, cutoff: NaiveDate) -> Result<Vec<Meeting>>;
}

#[async_trait]
pub trait AttendanceStore {
    async fn teaching_attendance_exists(&mut self, schedule_id: i64, date: NaiveDate)
        -> Result<bool>;

    async fn teaching_attendance_exists_by_key(&mut self, key: &TeachingKey) -> Result<bool>;

    async fn insert_teaching_attendance(&mut self, record: &NewTeachingAttendance) -> Result<i64>;

    /// Ids of teaching attendance records held for `class_id` on `date`.
    async fn teaching_sessions_on(&mut self, date: NaiveDate, class_id: i64) -> Result<Vec<i64>>;

    async fn update_session_tally(&mut self, session_id: i64, tally: StatusTally) -> Result<()>;

    async fn activity_attendance_exists(&mut self, activity_id: i64, date: NaiveDate)
        -> Result<bool>;

    async fn insert_activity_attendance(&mut self, record: &NewActivityAttendance) -> Result<i64>;

    async fn meeting_attendance_exists(&mut self, meeting_id: i64, date: NaiveDate)
        -> Result<bool>;

    async fn insert_meeting_attendance(&mut self, record: &NewMeetingAttendance) -> Result<i64>;

    async fn student_attendance(
        &mut self,
        session_id: i64,
        student_id: i64,
    ) -> Result<Option<StudentAttendance>>;

    async fn insert_student_attendance(
        &mut self,
        session_id: i64,
        student_id: i64,
        status: AttendanceStatus,
        note: Option<&str>,
    ) -> Result<i64>;

    async fn update_student_attendance(
        &mut self,
        id: i64,
        status: AttendanceStatus,
        note: Option<&str>,
    ) -> Result<()>;

    /// Counts of stored student rows under one session, by status.
    async fn session_student_tally(&mut self, session_id: i64) -> Result<StatusTally>;
}

#[async_trait]
pub trait EntitySource {
    async fn active_term(&mut self) -> Result<Option<AcademicTerm>>;

    /// Every teacher, student, class and subject, for in-memory lookup tables.
    async fn load_catalog(&mut self) -> Result<EntityCatalog>;
}

pub trait Repository: ScheduleSource + AttendanceStore + EntitySource + Send {}

impl<T> Repository for T where T: ScheduleSource + AttendanceStore + EntitySource + Send {}

#[async_trait]
pub trait Transaction: Repository + Sized {
    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}

#[async_trait]
pub trait Database: Send + Sync {
    type Tx: Transaction;

    async fn begin(&self) -> Result<Self::Tx>;
}
