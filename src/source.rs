//! CSV exports of the attendance spreadsheets. Columns are positional; the header row is
//! skipped whatever it says, and short rows read as blank cells.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};

use crate::error::Result;
use crate::models::{StudentRow, TeachingRow};

/// First data row; row 1 is the header.
const FIRST_ROW: usize = 2;

fn cell(record: &StringRecord, idx: usize) -> String {
    record.get(idx).unwrap_or_default().to_string()
}

fn records<R: Read>(reader: R) -> Result<Vec<StringRecord>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);
    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?);
    }
    Ok(rows)
}

/// `timestamp, teacher, subject, period_start, period_end, summary, class, minutes`
pub fn read_teaching_rows<R: Read>(reader: R) -> Result<Vec<TeachingRow>> {
    Ok(records(reader)?
        .iter()
        .enumerate()
        .map(|(idx, record)| TeachingRow {
            row_number: idx + FIRST_ROW,
            raw_timestamp: cell(record, 0),
            raw_teacher_name: cell(record, 1),
            raw_subject_name: cell(record, 2),
            period_start: cell(record, 3),
            period_end: cell(record, 4),
            summary: cell(record, 5),
            raw_class_name: cell(record, 6),
            minutes: cell(record, 7),
        })
        .collect())
}

/// `timestamp, student, class, status, note`
pub fn read_student_rows<R: Read>(reader: R) -> Result<Vec<StudentRow>> {
    Ok(records(reader)?
        .iter()
        .enumerate()
        .map(|(idx, record)| StudentRow {
            row_number: idx + FIRST_ROW,
            raw_timestamp: cell(record, 0),
            raw_participant_name: cell(record, 1),
            raw_class_name: cell(record, 2),
            status_code: cell(record, 3),
            note: cell(record, 4),
        })
        .collect())
}

pub fn teaching_rows_from_path(path: &Path) -> Result<Vec<TeachingRow>> {
    read_teaching_rows(File::open(path)?)
}

pub fn student_rows_from_path(path: &Path) -> Result<Vec<StudentRow>> {
    read_student_rows(File::open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teaching_columns_are_positional() {
        let data = "\
Waktu,Nama Guru,Mapel,Jam Mulai,Jam Selesai,Ringkasan,Kelas,Berita Acara
16/03/2026 07:15:00, Budi Santoso ,Matematika,1,2,\"Persamaan, linear\",X-A,Lancar
17/03/2026,Sri Wahyuni,Fisika,3,4
";
        let rows = read_teaching_rows(data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row_number, 2);
        assert_eq!(rows[0].raw_teacher_name, "Budi Santoso");
        assert_eq!(rows[0].summary, "Persamaan, linear");
        assert_eq!(rows[0].raw_class_name, "X-A");
        assert_eq!(rows[0].minutes, "Lancar");
        assert_eq!(rows[1].row_number, 3);
        assert_eq!(rows[1].period_end, "4");
        assert_eq!(rows[1].raw_class_name, "");
    }

    #[test]
    fn student_columns_are_positional() {
        let data = "\
Timestamp,Nama,Kelas,Status,Keterangan
16/03/2026,Ani Lestari,X-A,S,Demam
45854,Beni Saputra,X-A,A
";
        let rows = read_student_rows(data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].status_code, "S");
        assert_eq!(rows[0].note, "Demam");
        assert_eq!(rows[1].raw_timestamp, "45854");
        assert_eq!(rows[1].note, "");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = teaching_rows_from_path(Path::new("/nonexistent/mengajar.csv")).unwrap_err();
        assert!(matches!(err, crate::error::Error::Io(_)));
    }
}
