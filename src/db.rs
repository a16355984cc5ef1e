use anyhow::Context;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::types::Json;
use sqlx::{Postgres, Row};

use crate::error::Result;
use crate::models::{
    AcademicTerm, Activity, CanonicalEntity, EntityCatalog, Meeting, NewActivityAttendance,
    NewMeetingAttendance, NewTeachingAttendance, RecurringSchedule, StudentAttendance, TeachingKey,
};
use crate::repo::{AttendanceStore, Database, EntitySource, ScheduleSource, Transaction};
use crate::status::{AttendanceStatus, StatusTally};

pub async fn init_db(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed store; every pipeline run gets its own transaction.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }
}

pub struct PgTx {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl Database for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx> {
        Ok(PgTx {
            tx: self.pool.begin().await?,
        })
    }
}

#[async_trait]
impl Transaction for PgTx {
    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn status_column(row: &PgRow, column: &str) -> Result<AttendanceStatus> {
    let code: String = row.try_get(column)?;
    AttendanceStatus::from_code(&code)
}

fn entity_row(row: &PgRow) -> Result<CanonicalEntity> {
    Ok(CanonicalEntity {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        class_id: row.try_get("class_id")?,
    })
}

impl PgTx {
    async fn entities(&mut self, sql: &str) -> Result<Vec<CanonicalEntity>> {
        let rows = sqlx::query(sql).fetch_all(&mut *self.tx).await?;
        rows.iter().map(entity_row).collect()
    }

    async fn exists(&mut self, sql: &str, id: i64, date: NaiveDate) -> Result<bool> {
        let row = sqlx::query(sql)
            .bind(id)
            .bind(date)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(row.try_get(0)?)
    }
}

#[async_trait]
impl ScheduleSource for PgTx {
    async fn active_schedules(&mut self) -> Result<Vec<RecurringSchedule>> {
        let rows = sqlx::query(
            r#"
            SELECT s.id, s.day_name, s.start_time::text AS start_time,
                   s.end_time::text AS end_time, s.teacher_id, s.class_id, s.subject_id,
                   t.name AS teacher_name, c.name AS class_name, m.name AS subject_name
            FROM school_ops.schedules s
            LEFT JOIN school_ops.teachers t ON t.id = s.teacher_id
            LEFT JOIN school_ops.class_groups c ON c.id = s.class_id
            LEFT JOIN school_ops.subjects m ON m.id = s.subject_id
            WHERE s.active
            ORDER BY s.id
            "#,
        )
        .fetch_all(&mut *self.tx)
        .await?;

        let mut schedules = Vec::with_capacity(rows.len());
        for row in rows {
            schedules.push(RecurringSchedule {
                id: row.try_get("id")?,
                day_name: row.try_get("day_name")?,
                start_time: row.try_get("start_time")?,
                end_time: row.try_get("end_time")?,
                teacher_id: row.try_get("teacher_id")?,
                class_id: row.try_get("class_id")?,
                subject_id: row.try_get("subject_id")?,
                teacher_name: row.try_get("teacher_name")?,
                class_name: row.try_get("class_name")?,
                subject_name: row.try_get("subject_name")?,
            });
        }
        Ok(schedules)
    }

    async fn closed_activities(&mut self, cutoff: NaiveDateTime) -> Result<Vec<Activity>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, starts_at, ends_at, responsible_id, co_participants
            FROM school_ops.activities
            WHERE active AND starts_at IS NOT NULL AND ends_at < $1
            ORDER BY id
            "#,
        )
        .bind(cutoff)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut activities = Vec::with_capacity(rows.len());
        for row in rows {
            activities.push(Activity {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                starts_at: row.try_get("starts_at")?,
                ends_at: row.try_get("ends_at")?,
                responsible_id: row.try_get("responsible_id")?,
                co_participants: row.try_get("co_participants")?,
            });
        }
        Ok(activities)
    }

    async fn past_meetings(&mut self, cutoff: NaiveDate) -> Result<Vec<Meeting>> {
        let rows = sqlx::query(
            r#"
            SELECT id, agenda, date, end_time::text AS end_time, chair_id, secretary_id,
                   invitees
            FROM school_ops.meetings
            WHERE active AND date IS NOT NULL AND date < $1
            ORDER BY date, id
            "#,
        )
        .bind(cutoff)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut meetings = Vec::with_capacity(rows.len());
        for row in rows {
            meetings.push(Meeting {
                id: row.try_get("id")?,
                agenda: row.try_get("agenda")?,
                date: row.try_get("date")?,
                end_time: row.try_get("end_time")?,
                chair_id: row.try_get("chair_id")?,
                secretary_id: row.try_get("secretary_id")?,
                invitees: row.try_get("invitees")?,
            });
        }
        Ok(meetings)
    }
}

#[async_trait]
impl AttendanceStore for PgTx {
    async fn teaching_attendance_exists(
        &mut self,
        schedule_id: i64,
        date: NaiveDate,
    ) -> Result<bool> {
        self.exists(
            "SELECT EXISTS (SELECT 1 FROM school_ops.teaching_attendance \
             WHERE schedule_id = $1 AND date = $2)",
            schedule_id,
            date,
        )
        .await
    }

    async fn teaching_attendance_exists_by_key(&mut self, key: &TeachingKey) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM school_ops.teaching_attendance
                WHERE teacher_id = $1 AND date = $2 AND class_label = $3 AND subject_label = $4
            )
            "#,
        )
        .bind(key.teacher_id)
        .bind(key.date)
        .bind(&key.class_label)
        .bind(&key.subject_label)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.try_get(0)?)
    }

    async fn insert_teaching_attendance(&mut self, record: &NewTeachingAttendance) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO school_ops.teaching_attendance
            (schedule_id, teacher_id, class_id, date, teacher_label, class_label, subject_label,
             day_label, period_label, summary, minutes, teacher_status, annotation, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING id
            "#,
        )
        .bind(record.schedule_id)
        .bind(record.teacher_id)
        .bind(record.class_id)
        .bind(record.date)
        .bind(&record.teacher_label)
        .bind(&record.class_label)
        .bind(&record.subject_label)
        .bind(&record.day_label)
        .bind(&record.period_label)
        .bind(&record.summary)
        .bind(&record.minutes)
        .bind(record.teacher_status.code())
        .bind(&record.annotation)
        .bind(record.recorded_at)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn teaching_sessions_on(&mut self, date: NaiveDate, class_id: i64) -> Result<Vec<i64>> {
        let rows = sqlx::query(
            "SELECT id FROM school_ops.teaching_attendance \
             WHERE date = $1 AND class_id = $2 ORDER BY id",
        )
        .bind(date)
        .bind(class_id)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter()
            .map(|row| row.try_get("id").map_err(Into::into))
            .collect()
    }

    async fn update_session_tally(&mut self, session_id: i64, tally: StatusTally) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE school_ops.teaching_attendance
            SET students_present = $2, students_sick = $3, students_leave = $4,
                students_absent = $5
            WHERE id = $1
            "#,
        )
        .bind(session_id)
        .bind(tally.present)
        .bind(tally.sick)
        .bind(tally.leave)
        .bind(tally.absent)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn activity_attendance_exists(
        &mut self,
        activity_id: i64,
        date: NaiveDate,
    ) -> Result<bool> {
        self.exists(
            "SELECT EXISTS (SELECT 1 FROM school_ops.activity_attendance \
             WHERE activity_id = $1 AND date = $2)",
            activity_id,
            date,
        )
        .await
    }

    async fn insert_activity_attendance(&mut self, record: &NewActivityAttendance) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO school_ops.activity_attendance
            (activity_id, date, responsible_id, responsible_status, responsible_note,
             participant_statuses)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(record.activity_id)
        .bind(record.date)
        .bind(record.responsible_id)
        .bind(record.responsible_status.code())
        .bind(&record.responsible_note)
        .bind(Json(&record.participant_statuses))
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn meeting_attendance_exists(
        &mut self,
        meeting_id: i64,
        date: NaiveDate,
    ) -> Result<bool> {
        self.exists(
            "SELECT EXISTS (SELECT 1 FROM school_ops.meeting_attendance \
             WHERE meeting_id = $1 AND date = $2)",
            meeting_id,
            date,
        )
        .await
    }

    async fn insert_meeting_attendance(&mut self, record: &NewMeetingAttendance) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO school_ops.meeting_attendance
            (meeting_id, date, chair_id, chair_status, chair_note, chair_self_attended,
             chair_attended_at, secretary_id, secretary_status, secretary_note,
             participant_statuses)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id
            "#,
        )
        .bind(record.meeting_id)
        .bind(record.date)
        .bind(record.chair_id)
        .bind(record.chair_status.code())
        .bind(&record.chair_note)
        .bind(record.chair_self_attended)
        .bind(record.chair_attended_at)
        .bind(record.secretary_id)
        .bind(record.secretary_status.code())
        .bind(&record.secretary_note)
        .bind(Json(&record.participant_statuses))
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn student_attendance(
        &mut self,
        session_id: i64,
        student_id: i64,
    ) -> Result<Option<StudentAttendance>> {
        let row = sqlx::query(
            r#"
            SELECT id, teaching_attendance_id, student_id, status, note
            FROM school_ops.student_attendance
            WHERE teaching_attendance_id = $1 AND student_id = $2
            "#,
        )
        .bind(session_id)
        .bind(student_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(StudentAttendance {
            id: row.try_get("id")?,
            teaching_attendance_id: row.try_get("teaching_attendance_id")?,
            student_id: row.try_get("student_id")?,
            status: status_column(&row, "status")?,
            note: row.try_get("note")?,
        }))
    }

    async fn insert_student_attendance(
        &mut self,
        session_id: i64,
        student_id: i64,
        status: AttendanceStatus,
        note: Option<&str>,
    ) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO school_ops.student_attendance
            (teaching_attendance_id, student_id, status, note)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(session_id)
        .bind(student_id)
        .bind(status.code())
        .bind(note)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn update_student_attendance(
        &mut self,
        id: i64,
        status: AttendanceStatus,
        note: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE school_ops.student_attendance
            SET status = $2, note = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.code())
        .bind(note)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn session_student_tally(&mut self, session_id: i64) -> Result<StatusTally> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*)::int AS total
            FROM school_ops.student_attendance
            WHERE teaching_attendance_id = $1
            GROUP BY status
            "#,
        )
        .bind(session_id)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut tally = StatusTally::default();
        for row in rows {
            tally.add(status_column(&row, "status")?, row.try_get("total")?);
        }
        Ok(tally)
    }
}

#[async_trait]
impl EntitySource for PgTx {
    async fn active_term(&mut self) -> Result<Option<AcademicTerm>> {
        let row = sqlx::query(
            "SELECT id, name FROM school_ops.academic_terms WHERE is_active ORDER BY id LIMIT 1",
        )
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(AcademicTerm {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
        }))
    }

    async fn load_catalog(&mut self) -> Result<EntityCatalog> {
        Ok(EntityCatalog {
            teachers: self
                .entities(
                    "SELECT id, name, NULL::bigint AS class_id FROM school_ops.teachers \
                     ORDER BY id",
                )
                .await?,
            students: self
                .entities("SELECT id, name, class_id FROM school_ops.students ORDER BY id")
                .await?,
            classes: self
                .entities(
                    "SELECT id, name, NULL::bigint AS class_id FROM school_ops.class_groups \
                     ORDER BY id",
                )
                .await?,
            subjects: self
                .entities(
                    "SELECT id, name, NULL::bigint AS class_id FROM school_ops.subjects \
                     ORDER BY id",
                )
                .await?,
        })
    }
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO school_ops.academic_terms (name, is_active)
        VALUES ($1, TRUE)
        ON CONFLICT (name) DO UPDATE SET is_active = TRUE
        "#,
    )
    .bind("2025/2026 Genap")
    .execute(pool)
    .await
    .context("failed to seed academic term")?;

    for (table, names) in [
        (
            "teachers",
            vec!["Budi Santoso, S.Pd", "Sri Wahyuni, M.Pd", "Ahmad Fauzi, S.Ag"],
        ),
        ("class_groups", vec!["X-A", "XI-B", "XII-IPA"]),
        ("subjects", vec!["Matematika", "Fisika", "Pendidikan Agama Islam"]),
    ] {
        for name in names {
            sqlx::query(&format!(
                "INSERT INTO school_ops.{table} (name) VALUES ($1) ON CONFLICT (name) DO NOTHING"
            ))
            .bind(name)
            .execute(pool)
            .await
            .with_context(|| format!("failed to seed {table}"))?;
        }
    }

    let students = vec![
        ("Ani Lestari", "X-A"),
        ("Beni Saputra", "X-A"),
        ("Citra Dewi", "XI-B"),
        ("Dimas Pratama", "XI-B"),
        ("Eka Rahmawati", "XII-IPA"),
        ("Fajar Nugroho", "XII-IPA"),
    ];
    for (name, class) in students {
        sqlx::query(
            r#"
            INSERT INTO school_ops.students (name, class_id)
            SELECT $1, id FROM school_ops.class_groups WHERE name = $2
            ON CONFLICT (name, class_id) DO NOTHING
            "#,
        )
        .bind(name)
        .bind(class)
        .execute(pool)
        .await
        .context("failed to seed students")?;
    }

    let schedules = vec![
        ("Senin", "07:00", "08:30", "Budi Santoso, S.Pd", "X-A", "Matematika"),
        ("Selasa", "09:00", "10:30", "Sri Wahyuni, M.Pd", "XI-B", "Fisika"),
        ("Kamis", "10:45", "12:15", "Ahmad Fauzi, S.Ag", "XII-IPA", "Pendidikan Agama Islam"),
    ];
    for (day, start, end, teacher, class, subject) in schedules {
        sqlx::query(
            r#"
            INSERT INTO school_ops.schedules
            (day_name, start_time, end_time, teacher_id, class_id, subject_id, active)
            SELECT $1, $2::time, $3::time, t.id, c.id, m.id, TRUE
            FROM school_ops.teachers t, school_ops.class_groups c, school_ops.subjects m
            WHERE t.name = $4 AND c.name = $5 AND m.name = $6
            ON CONFLICT (day_name, start_time, class_id) DO NOTHING
            "#,
        )
        .bind(day)
        .bind(start)
        .bind(end)
        .bind(teacher)
        .bind(class)
        .bind(subject)
        .execute(pool)
        .await
        .context("failed to seed schedules")?;
    }

    sqlx::query(
        r#"
        INSERT INTO school_ops.activities
        (name, starts_at, ends_at, responsible_id, co_participants, active)
        SELECT $1, $2, $3, t.id,
               (SELECT COALESCE(jsonb_agg(o.id ORDER BY o.id), '[]'::jsonb)
                FROM school_ops.teachers o WHERE o.name = ANY($5)),
               TRUE
        FROM school_ops.teachers t WHERE t.name = $4
        ON CONFLICT (name) DO NOTHING
        "#,
    )
    .bind("Latihan Pramuka")
    .bind(seed_time(2026, 2, 14, 8, 0)?)
    .bind(seed_time(2026, 2, 14, 11, 0)?)
    .bind("Ahmad Fauzi, S.Ag")
    .bind(vec!["Sri Wahyuni, M.Pd".to_string()])
    .execute(pool)
    .await
    .context("failed to seed activity")?;

    sqlx::query(
        r#"
        INSERT INTO school_ops.meetings
        (agenda, date, end_time, chair_id, secretary_id, invitees, active)
        SELECT $1, $2, $3::time, c.id, s.id,
               (SELECT COALESCE(jsonb_agg(o.id ORDER BY o.id), '[]'::jsonb)
                FROM school_ops.teachers o WHERE o.name NOT IN ($4, $5)),
               TRUE
        FROM school_ops.teachers c, school_ops.teachers s
        WHERE c.name = $4 AND s.name = $5
        ON CONFLICT (agenda) DO NOTHING
        "#,
    )
    .bind("Rapat evaluasi tengah semester")
    .bind(NaiveDate::from_ymd_opt(2026, 2, 20).context("invalid date")?)
    .bind("14:00")
    .bind("Budi Santoso, S.Pd")
    .bind("Sri Wahyuni, M.Pd")
    .execute(pool)
    .await
    .context("failed to seed meeting")?;

    Ok(())
}

fn seed_time(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
) -> anyhow::Result<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, 0))
        .context("invalid seed timestamp")
}
