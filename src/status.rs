use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Attendance status as stored: single-letter codes `H`, `S`, `I`, `A`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttendanceStatus {
    #[serde(rename = "H")]
    Present,
    #[serde(rename = "S")]
    Sick,
    #[serde(rename = "I")]
    Leave,
    #[serde(rename = "A")]
    Absent,
}

impl AttendanceStatus {
    #[cfg(test)]
    pub const ALL: [AttendanceStatus; 4] = [
        AttendanceStatus::Absent,
        AttendanceStatus::Sick,
        AttendanceStatus::Leave,
        AttendanceStatus::Present,
    ];

    /// Merge rank: lower wins. Absent(1) > Sick(2) > Leave(3) > Present(4).
    pub fn rank(self) -> u8 {
        match self {
            AttendanceStatus::Absent => 1,
            AttendanceStatus::Sick => 2,
            AttendanceStatus::Leave => 3,
            AttendanceStatus::Present => 4,
        }
    }

    pub fn outranks(self, other: AttendanceStatus) -> bool {
        self.rank() < other.rank()
    }

    /// Keeps the more severe of two conflicting statuses.
    pub fn merge(self, other: AttendanceStatus) -> AttendanceStatus {
        if other.outranks(self) {
            other
        } else {
            self
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "H",
            AttendanceStatus::Sick => "S",
            AttendanceStatus::Leave => "I",
            AttendanceStatus::Absent => "A",
        }
    }

    /// Strict decoding of a stored code.
    pub fn from_code(code: &str) -> Result<Self> {
        match code.trim() {
            "H" => Ok(AttendanceStatus::Present),
            "S" => Ok(AttendanceStatus::Sick),
            "I" => Ok(AttendanceStatus::Leave),
            "A" => Ok(AttendanceStatus::Absent),
            other => Err(Error::InvalidRecord(format!(
                "unknown attendance status code '{other}'"
            ))),
        }
    }

    /// Lenient decoding of spreadsheet status cells. Unrecognized or empty codes map to
    /// `Absent`.
    pub fn from_import_code(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "HADIR" | "H" | "PRESENT" => AttendanceStatus::Present,
            "SAKIT" | "S" | "SICK" => AttendanceStatus::Sick,
            "IZIN" | "I" | "LEAVE" => AttendanceStatus::Leave,
            _ => AttendanceStatus::Absent,
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Per-status counters, used for session tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusTally {
    pub present: i32,
    pub sick: i32,
    pub leave: i32,
    pub absent: i32,
}

impl StatusTally {
    #[cfg(test)]
    pub fn record(&mut self, status: AttendanceStatus) {
        self.add(status, 1);
    }

    pub fn add(&mut self, status: AttendanceStatus, count: i32) {
        match status {
            AttendanceStatus::Present => self.present += count,
            AttendanceStatus::Sick => self.sick += count,
            AttendanceStatus::Leave => self.leave += count,
            AttendanceStatus::Absent => self.absent += count,
        }
    }

    /// Students without a stored row are assumed present.
    pub fn with_roster(mut self, roster_size: i32) -> Self {
        self.present = (roster_size - self.sick - self.leave - self.absent).max(0);
        self
    }
}
