//! PostgreSQL implementation of [`CourseStore`].

use async_trait::async_trait;
use sqlx::PgPool;

use crate::data::models::{
    CourseWrite, NewSubject, Period, StoredCourse, TeacherRef, Term,
};
use crate::data::store::{CourseStore, StoreError};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CourseStore for PgStore {
    async fn find_term(&self, year: i32, period: Period) -> Result<Option<Term>, StoreError> {
        let term = sqlx::query_as::<_, Term>(
            "SELECT id, year, period FROM terms WHERE year = $1 AND period = $2",
        )
        .bind(year)
        .bind(period)
        .fetch_optional(&self.pool)
        .await?;
        Ok(term)
    }

    async fn create_term(&self, year: i32, period: Period) -> Result<Term, StoreError> {
        // The no-op update makes RETURNING yield the row on conflict too.
        let term = sqlx::query_as::<_, Term>(
            r#"
            INSERT INTO terms (year, period)
            VALUES ($1, $2)
            ON CONFLICT (year, period) DO UPDATE SET year = EXCLUDED.year
            RETURNING id, year, period
            "#,
        )
        .bind(year)
        .bind(period)
        .fetch_one(&self.pool)
        .await?;
        Ok(term)
    }

    async fn find_subject_id(&self, code: &str) -> Result<Option<i32>, StoreError> {
        let id = sqlx::query_scalar::<_, i32>("SELECT id FROM subjects WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    async fn upsert_subject(&self, subject: &NewSubject) -> Result<i32, StoreError> {
        let id = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO subjects (
                code, name, credits, school, academic_level,
                prerequisites_raw, requirements_relation, restrictions, equivalences_raw
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (code)
            DO UPDATE SET
                name = EXCLUDED.name,
                credits = EXCLUDED.credits,
                school = EXCLUDED.school,
                academic_level = EXCLUDED.academic_level,
                prerequisites_raw = EXCLUDED.prerequisites_raw,
                requirements_relation = EXCLUDED.requirements_relation,
                restrictions = EXCLUDED.restrictions,
                equivalences_raw = EXCLUDED.equivalences_raw,
                updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(&subject.code)
        .bind(&subject.name)
        .bind(subject.credits)
        .bind(subject.school.as_deref())
        .bind(subject.academic_level.as_deref())
        .bind(&subject.prerequisites_raw)
        .bind(subject.requirements_relation)
        .bind(&subject.restrictions)
        .bind(&subject.equivalences_raw)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn get_or_create_campus(&self, name: &str) -> Result<i32, StoreError> {
        let id = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO campuses (name) VALUES ($1)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn get_or_create_teacher(&self, name: &str) -> Result<i32, StoreError> {
        let id = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO teachers (name) VALUES ($1)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn find_course(
        &self,
        term_id: i32,
        subject_code: &str,
        section: i32,
    ) -> Result<Option<StoredCourse>, StoreError> {
        let row = sqlx::query_as::<_, (i32, String)>(
            r#"
            SELECT c.id, c.schedule_summary
            FROM courses c
            JOIN subjects s ON s.id = c.subject_id
            WHERE c.term_id = $1 AND s.code = $2 AND c.section = $3
            "#,
        )
        .bind(term_id)
        .bind(subject_code)
        .bind(section)
        .fetch_optional(&self.pool)
        .await?;

        let Some((id, schedule_summary)) = row else {
            return Ok(None);
        };

        let teachers = sqlx::query_as::<_, TeacherRef>(
            r#"
            SELECT t.id, t.name
            FROM course_teachers ct
            JOIN teachers t ON t.id = ct.teacher_id
            WHERE ct.course_id = $1
            ORDER BY ct.position, t.id
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(StoredCourse {
            id,
            schedule_summary: Some(schedule_summary),
            teachers,
        }))
    }

    async fn save_course(&self, write: &CourseWrite) -> Result<i32, StoreError> {
        let record = &write.record;
        // Dropping the transaction without commit rolls it back.
        let mut tx = self.pool.begin().await?;

        let course_id = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO courses (
                term_id, subject_id, campus_id, section, nrc, format, category, fg_area,
                is_removable, is_english, need_special_approval,
                total_quota, available_quota, schedule_summary
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT ON CONSTRAINT uq_courses_term_subject_section
            DO UPDATE SET
                campus_id = EXCLUDED.campus_id,
                nrc = EXCLUDED.nrc,
                format = EXCLUDED.format,
                category = EXCLUDED.category,
                fg_area = EXCLUDED.fg_area,
                is_removable = EXCLUDED.is_removable,
                is_english = EXCLUDED.is_english,
                need_special_approval = EXCLUDED.need_special_approval,
                total_quota = EXCLUDED.total_quota,
                available_quota = EXCLUDED.available_quota,
                schedule_summary = EXCLUDED.schedule_summary,
                updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(record.term_id)
        .bind(record.subject_id)
        .bind(record.campus_id)
        .bind(record.section)
        .bind(&record.nrc)
        .bind(&record.format)
        .bind(&record.category)
        .bind(&record.fg_area)
        .bind(record.is_removable)
        .bind(record.is_english)
        .bind(record.need_special_approval)
        .bind(record.total_quota)
        .bind(record.available_quota)
        .bind(&record.schedule_summary)
        .fetch_one(&mut *tx)
        .await?;

        if !write.teachers.detached.is_empty() {
            sqlx::query(
                "DELETE FROM course_teachers WHERE course_id = $1 AND teacher_id = ANY($2::int4[])",
            )
            .bind(course_id)
            .bind(&write.teachers.detached)
            .execute(&mut *tx)
            .await?;
        }

        // Attaches new teachers and renumbers kept ones in roster order.
        if !write.teachers.roster.is_empty() {
            sqlx::query(
                r#"
                INSERT INTO course_teachers (course_id, teacher_id, position)
                SELECT $1, r.teacher_id, r.position::int4
                FROM UNNEST($2::int4[]) WITH ORDINALITY AS r(teacher_id, position)
                ON CONFLICT (course_id, teacher_id)
                DO UPDATE SET position = EXCLUDED.position
                "#,
            )
            .bind(course_id)
            .bind(&write.teachers.roster)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(slots) = &write.schedule {
            sqlx::query("DELETE FROM class_schedules WHERE course_id = $1")
                .bind(course_id)
                .execute(&mut *tx)
                .await?;

            if !slots.is_empty() {
                let days: Vec<&str> = slots.iter().map(|s| s.day.symbol()).collect();
                let modules: Vec<i16> = slots.iter().map(|s| s.module).collect();
                let classrooms: Vec<&str> = slots.iter().map(|s| s.classroom.as_str()).collect();
                let kinds: Vec<&str> = slots.iter().map(|s| s.kind.as_str()).collect();

                sqlx::query(
                    r#"
                    INSERT INTO class_schedules (course_id, day, module, classroom, kind)
                    SELECT $1, v.day, v.module, v.classroom, v.kind
                    FROM UNNEST($2::text[], $3::int2[], $4::text[], $5::text[])
                        AS v(day, module, classroom, kind)
                    "#,
                )
                .bind(course_id)
                .bind(&days)
                .bind(&modules)
                .bind(&classrooms)
                .bind(&kinds)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(course_id)
    }
}
