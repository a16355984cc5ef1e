use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::status::AttendanceStatus;

#[derive(Debug, Clone)]
pub struct AcademicTerm {
    pub id: i64,
    pub name: String,
}

/// A weekly teaching slot. Day and clock fields are kept as stored so that a malformed value
/// fails one schedule, not the whole run.
#[derive(Debug, Clone)]
pub struct RecurringSchedule {
    pub id: i64,
    pub day_name: String,
    pub start_time: String,
    pub end_time: String,
    pub teacher_id: Option<i64>,
    pub class_id: Option<i64>,
    pub subject_id: Option<i64>,
    pub teacher_name: Option<String>,
    pub class_name: Option<String>,
    pub subject_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Activity {
    pub id: i64,
    pub name: String,
    pub starts_at: Option<NaiveDateTime>,
    pub ends_at: NaiveDateTime,
    pub responsible_id: Option<i64>,
    /// JSON array of teacher ids, as stored.
    pub co_participants: serde_json::Value,
}

impl Activity {
    pub fn co_participant_ids(&self) -> Result<Vec<i64>> {
        participant_ids(&self.co_participants)
    }
}

#[derive(Debug, Clone)]
pub struct Meeting {
    pub id: i64,
    pub agenda: String,
    pub date: Option<NaiveDate>,
    pub end_time: Option<String>,
    pub chair_id: Option<i64>,
    pub secretary_id: Option<i64>,
    /// JSON array of teacher ids, as stored.
    pub invitees: serde_json::Value,
}

impl Meeting {
    pub fn invitee_ids(&self) -> Result<Vec<i64>> {
        participant_ids(&self.invitees)
    }
}

/// Reads a stored id list: a JSON array of numbers or numeric strings. `null` is empty.
pub fn participant_ids(value: &serde_json::Value) -> Result<Vec<i64>> {
    let items = match value {
        serde_json::Value::Null => return Ok(Vec::new()),
        serde_json::Value::Array(items) => items,
        other => {
            return Err(Error::InvalidRecord(format!(
                "participant list is not an array: {other}"
            )))
        }
    };
    items
        .iter()
        .map(|item| {
            item.as_i64()
                .or_else(|| item.as_str().and_then(|s| s.trim().parse().ok()))
                .ok_or_else(|| Error::InvalidRecord(format!("bad participant id {item}")))
        })
        .collect()
}

/// One entry of a participant list column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantStatus {
    pub participant_id: i64,
    pub status: AttendanceStatus,
    pub note: Option<String>,
    #[serde(default)]
    pub self_attended: bool,
    #[serde(default)]
    pub attended_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTeachingAttendance {
    pub schedule_id: Option<i64>,
    pub teacher_id: i64,
    pub class_id: Option<i64>,
    pub date: NaiveDate,
    pub teacher_label: Option<String>,
    pub class_label: Option<String>,
    pub subject_label: Option<String>,
    pub day_label: Option<String>,
    pub period_label: Option<String>,
    pub summary: Option<String>,
    pub minutes: Option<String>,
    pub teacher_status: AttendanceStatus,
    pub annotation: Option<String>,
    pub recorded_at: Option<NaiveDateTime>,
}

/// Natural key used by the teaching import to detect rows that were already loaded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TeachingKey {
    pub teacher_id: i64,
    pub date: NaiveDate,
    pub class_label: String,
    pub subject_label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewActivityAttendance {
    pub activity_id: i64,
    pub date: NaiveDate,
    pub responsible_id: Option<i64>,
    pub responsible_status: AttendanceStatus,
    pub responsible_note: Option<String>,
    pub participant_statuses: Vec<ParticipantStatus>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMeetingAttendance {
    pub meeting_id: i64,
    pub date: NaiveDate,
    pub chair_id: Option<i64>,
    pub secretary_id: Option<i64>,
    pub chair_status: AttendanceStatus,
    pub chair_note: Option<String>,
    pub chair_self_attended: bool,
    pub chair_attended_at: Option<NaiveDateTime>,
    pub secretary_status: AttendanceStatus,
    pub secretary_note: Option<String>,
    pub participant_statuses: Vec<ParticipantStatus>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudentAttendance {
    pub id: i64,
    pub teaching_attendance_id: i64,
    pub student_id: i64,
    pub status: AttendanceStatus,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalEntity {
    pub id: i64,
    pub name: String,
    /// Class membership, set for students only.
    pub class_id: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct EntityCatalog {
    pub teachers: Vec<CanonicalEntity>,
    pub students: Vec<CanonicalEntity>,
    pub classes: Vec<CanonicalEntity>,
    pub subjects: Vec<CanonicalEntity>,
}

impl EntityCatalog {
    pub fn roster_size(&self, class_id: i64) -> i32 {
        self.students
            .iter()
            .filter(|s| s.class_id == Some(class_id))
            .count() as i32
    }
}

/// A teacher-led session row from the teaching attendance sheet.
#[derive(Debug, Clone, Default)]
pub struct TeachingRow {
    pub row_number: usize,
    pub raw_timestamp: String,
    pub raw_teacher_name: String,
    pub raw_subject_name: String,
    pub period_start: String,
    pub period_end: String,
    pub summary: String,
    pub raw_class_name: String,
    pub minutes: String,
}

/// A per-student status row from the student attendance sheet.
#[derive(Debug, Clone, Default)]
pub struct StudentRow {
    pub row_number: usize,
    pub raw_timestamp: String,
    pub raw_participant_name: String,
    pub raw_class_name: String,
    pub status_code: String,
    pub note: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn participant_ids_accept_numbers_and_numeric_strings() {
        assert_eq!(participant_ids(&json!([3, "7", " 9 "])).unwrap(), vec![3, 7, 9]);
        assert!(participant_ids(&json!(null)).unwrap().is_empty());
        assert!(participant_ids(&json!([])).unwrap().is_empty());
    }

    #[test]
    fn participant_ids_reject_other_shapes() {
        assert!(participant_ids(&json!({"guru_id": 3})).is_err());
        assert!(participant_ids(&json!(["budi"])).is_err());
        assert!(participant_ids(&json!([1.5])).is_err());
    }

    #[test]
    fn participant_status_uses_stored_codes() {
        let entry = ParticipantStatus {
            participant_id: 4,
            status: AttendanceStatus::Absent,
            note: Some("auto-recorded".to_string()),
            self_attended: false,
            attended_at: None,
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["status"], "A");
        let back: ParticipantStatus =
            serde_json::from_value(json!({"participant_id": 4, "status": "A", "note": null}))
                .unwrap();
        assert_eq!(back.participant_id, 4);
        assert!(!back.self_attended);
    }
}
