//! In-memory store with the same transaction semantics as Postgres: a transaction works on a
//! private copy that replaces the shared state on commit and is dropped on rollback.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{Error, Result};
use crate::models::{
    AcademicTerm, Activity, EntityCatalog, Meeting, NewActivityAttendance, NewMeetingAttendance,
    NewTeachingAttendance, RecurringSchedule, StudentAttendance, TeachingKey,
};
use crate::repo::{AttendanceStore, Database, EntitySource, ScheduleSource, Transaction};
use crate::status::{AttendanceStatus, StatusTally};

#[derive(Debug, Clone, PartialEq)]
pub struct StoredTeaching {
    pub id: i64,
    pub record: NewTeachingAttendance,
    pub tally: StatusTally,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub term: Option<AcademicTerm>,
    pub catalog: EntityCatalog,
    pub schedules: Vec<RecurringSchedule>,
    pub activities: Vec<Activity>,
    pub meetings: Vec<Meeting>,
    pub teaching_attendance: Vec<StoredTeaching>,
    pub activity_attendance: Vec<(i64, NewActivityAttendance)>,
    pub meeting_attendance: Vec<(i64, NewMeetingAttendance)>,
    pub student_attendance: Vec<StudentAttendance>,
    next_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Unique-constraint violations surface as database errors, like they do in Postgres.
    fn conflict(what: &str) -> Error {
        Error::Database(sqlx::Error::Protocol(format!("duplicate key value violates {what}")))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    shared: Arc<Mutex<MemoryState>>,
}

impl MemoryDatabase {
    pub fn new(state: MemoryState) -> Self {
        MemoryDatabase {
            shared: Arc::new(Mutex::new(state)),
        }
    }

    pub fn snapshot(&self) -> MemoryState {
        self.shared.lock().expect("memory store lock").clone()
    }
}

pub struct MemoryTx {
    state: MemoryState,
    shared: Arc<Mutex<MemoryState>>,
}

#[async_trait]
impl Database for MemoryDatabase {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx> {
        Ok(MemoryTx {
            state: self.snapshot(),
            shared: Arc::clone(&self.shared),
        })
    }
}

#[async_trait]
impl Transaction for MemoryTx {
    async fn commit(self) -> Result<()> {
        *self.shared.lock().expect("memory store lock") = self.state;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl ScheduleSource for MemoryTx {
    async fn active_schedules(&mut self) -> Result<Vec<RecurringSchedule>> {
        Ok(self.state.schedules.clone())
    }

    async fn closed_activities(&mut self, cutoff: NaiveDateTime) -> Result<Vec<Activity>> {
        Ok(self
            .state
            .activities
            .iter()
            .filter(|a| a.starts_at.is_some() && a.ends_at < cutoff)
            .cloned()
            .collect())
    }

    async fn past_meetings(&mut self, cutoff: NaiveDate) -> Result<Vec<Meeting>> {
        Ok(self
            .state
            .meetings
            .iter()
            .filter(|m| m.date.is_some_and(|d| d < cutoff))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AttendanceStore for MemoryTx {
    async fn teaching_attendance_exists(
        &mut self,
        schedule_id: i64,
        date: NaiveDate,
    ) -> Result<bool> {
        Ok(self
            .state
            .teaching_attendance
            .iter()
            .any(|t| t.record.schedule_id == Some(schedule_id) && t.record.date == date))
    }

    async fn teaching_attendance_exists_by_key(&mut self, key: &TeachingKey) -> Result<bool> {
        Ok(self.state.teaching_attendance.iter().any(|t| {
            t.record.teacher_id == key.teacher_id
                && t.record.date == key.date
                && t.record.class_label.as_deref() == Some(key.class_label.as_str())
                && t.record.subject_label.as_deref() == Some(key.subject_label.as_str())
        }))
    }

    async fn insert_teaching_attendance(&mut self, record: &NewTeachingAttendance) -> Result<i64> {
        if let Some(schedule_id) = record.schedule_id {
            if self.teaching_attendance_exists(schedule_id, record.date).await? {
                return Err(MemoryState::conflict("teaching_attendance_schedule_date_key"));
            }
        }
        let id = self.state.next_id();
        self.state.teaching_attendance.push(StoredTeaching {
            id,
            record: record.clone(),
            tally: StatusTally::default(),
        });
        Ok(id)
    }

    async fn teaching_sessions_on(&mut self, date: NaiveDate, class_id: i64) -> Result<Vec<i64>> {
        Ok(self
            .state
            .teaching_attendance
            .iter()
            .filter(|t| t.record.date == date && t.record.class_id == Some(class_id))
            .map(|t| t.id)
            .collect())
    }

    async fn update_session_tally(&mut self, session_id: i64, tally: StatusTally) -> Result<()> {
        if let Some(stored) = self
            .state
            .teaching_attendance
            .iter_mut()
            .find(|t| t.id == session_id)
        {
            stored.tally = tally;
        }
        Ok(())
    }

    async fn activity_attendance_exists(
        &mut self,
        activity_id: i64,
        date: NaiveDate,
    ) -> Result<bool> {
        Ok(self
            .state
            .activity_attendance
            .iter()
            .any(|(_, a)| a.activity_id == activity_id && a.date == date))
    }

    async fn insert_activity_attendance(&mut self, record: &NewActivityAttendance) -> Result<i64> {
        if self.activity_attendance_exists(record.activity_id, record.date).await? {
            return Err(MemoryState::conflict("activity_attendance_activity_date_key"));
        }
        let id = self.state.next_id();
        self.state.activity_attendance.push((id, record.clone()));
        Ok(id)
    }

    async fn meeting_attendance_exists(
        &mut self,
        meeting_id: i64,
        date: NaiveDate,
    ) -> Result<bool> {
        Ok(self
            .state
            .meeting_attendance
            .iter()
            .any(|(_, m)| m.meeting_id == meeting_id && m.date == date))
    }

    async fn insert_meeting_attendance(&mut self, record: &NewMeetingAttendance) -> Result<i64> {
        if self.meeting_attendance_exists(record.meeting_id, record.date).await? {
            return Err(MemoryState::conflict("meeting_attendance_meeting_date_key"));
        }
        let id = self.state.next_id();
        self.state.meeting_attendance.push((id, record.clone()));
        Ok(id)
    }

    async fn student_attendance(
        &mut self,
        session_id: i64,
        student_id: i64,
    ) -> Result<Option<StudentAttendance>> {
        Ok(self
            .state
            .student_attendance
            .iter()
            .find(|s| s.teaching_attendance_id == session_id && s.student_id == student_id)
            .cloned())
    }

    async fn insert_student_attendance(
        &mut self,
        session_id: i64,
        student_id: i64,
        status: AttendanceStatus,
        note: Option<&str>,
    ) -> Result<i64> {
        if self.student_attendance(session_id, student_id).await?.is_some() {
            return Err(MemoryState::conflict("student_attendance_session_student_key"));
        }
        let id = self.state.next_id();
        self.state.student_attendance.push(StudentAttendance {
            id,
            teaching_attendance_id: session_id,
            student_id,
            status,
            note: note.map(str::to_string),
        });
        Ok(id)
    }

    async fn update_student_attendance(
        &mut self,
        id: i64,
        status: AttendanceStatus,
        note: Option<&str>,
    ) -> Result<()> {
        if let Some(row) = self.state.student_attendance.iter_mut().find(|s| s.id == id) {
            row.status = status;
            row.note = note.map(str::to_string);
        }
        Ok(())
    }

    async fn session_student_tally(&mut self, session_id: i64) -> Result<StatusTally> {
        let mut tally = StatusTally::default();
        self.state
            .student_attendance
            .iter()
            .filter(|s| s.teaching_attendance_id == session_id)
            .for_each(|s| tally.record(s.status));
        Ok(tally)
    }
}

#[async_trait]
impl EntitySource for MemoryTx {
    async fn active_term(&mut self) -> Result<Option<AcademicTerm>> {
        Ok(self.state.term.clone())
    }

    async fn load_catalog(&mut self) -> Result<EntityCatalog> {
        Ok(self.state.catalog.clone())
    }
}
