use anyhow::Context;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::average::compute_average;
use crate::error::GradeError;
use crate::models::{
    Course, CourseGrades, Enrollment, Evaluation, GradeMode, NewSimulation, SimulatedEntry,
    SimulationRecord, Student,
};
use crate::store::{GradeSource, SimulationHistory};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed store. The pool is owned by the caller, which opens it
/// at startup and closes it on shutdown.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    history_limit: i64,
}

impl PgStore {
    pub fn new(pool: PgPool, history_limit: i64) -> Self {
        Self {
            pool,
            history_limit,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn lookup_error(what: &str) -> impl FnOnce(sqlx::Error) -> GradeError + '_ {
    move |err| match err {
        sqlx::Error::RowNotFound => GradeError::not_found(what),
        other => GradeError::Unavailable(other),
    }
}

impl GradeSource for PgStore {
    async fn enrolled_courses(&self, external_id: &str) -> Result<Enrollment, GradeError> {
        if external_id.trim().is_empty() {
            return Err(GradeError::validation("student external id is required"));
        }

        debug!(external_id, "looking up student");
        let row = sqlx::query(
            "SELECT id, external_id, code, full_name, email \
             FROM grade_simulator.students WHERE external_id = $1",
        )
        .bind(external_id)
        .fetch_one(&self.pool)
        .await
        .map_err(lookup_error("student"))?;

        let student = Student {
            id: row.get("id"),
            external_id: row.get("external_id"),
            code: row.get("code"),
            name: row.get("full_name"),
            email: row.get("email"),
        };

        let rows = sqlx::query(
            "SELECT c.id, c.code, c.name \
             FROM grade_simulator.registrations r \
             JOIN grade_simulator.courses c ON c.id = r.course_id \
             WHERE r.student_id = $1 \
             ORDER BY c.code",
        )
        .bind(student.id)
        .fetch_all(&self.pool)
        .await?;

        let courses: Vec<Course> = rows
            .into_iter()
            .map(|row| Course {
                id: row.get("id"),
                code: row.get("code"),
                name: row.get("name"),
            })
            .collect();

        info!(student_id = %student.id, courses = courses.len(), "enrollment loaded");
        Ok(Enrollment { student, courses })
    }

    async fn grades(&self, student_id: Uuid, course_id: Uuid) -> Result<CourseGrades, GradeError> {
        let grade_book_id: Uuid = sqlx::query(
            "SELECT id FROM grade_simulator.grade_books \
             WHERE student_id = $1 AND course_id = $2",
        )
        .bind(student_id)
        .bind(course_id)
        .fetch_one(&self.pool)
        .await
        .map_err(lookup_error("grade record"))?
        .get("id");

        let rows = sqlx::query(
            "SELECT name, weight, actual_grade FROM grade_simulator.evaluations \
             WHERE grade_book_id = $1 ORDER BY position",
        )
        .bind(grade_book_id)
        .fetch_all(&self.pool)
        .await?;

        let evaluations: Vec<Evaluation> = rows
            .into_iter()
            .map(|row| {
                Evaluation::new(
                    row.get::<String, _>("name"),
                    row.get("weight"),
                    row.get("actual_grade"),
                )
            })
            .collect();

        let course = sqlx::query("SELECT id, code, name FROM grade_simulator.courses WHERE id = $1")
            .bind(course_id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| Course {
                id: row.get("id"),
                code: row.get("code"),
                name: row.get("name"),
            })
            .unwrap_or_else(|| Course::placeholder(course_id));

        let current_average = compute_average(&evaluations, GradeMode::Actual);
        info!(
            %student_id,
            %course_id,
            evaluations = evaluations.len(),
            current_average,
            "grades loaded"
        );

        Ok(CourseGrades {
            evaluations,
            current_average,
            course,
        })
    }
}

impl SimulationHistory for PgStore {
    async fn list_simulations(
        &self,
        student_id: Uuid,
        course_id: Uuid,
    ) -> Result<Vec<SimulationRecord>, GradeError> {
        let rows = sqlx::query(
            "SELECT id, student_id, course_id, created_at, simulated_entries, \
             current_average, simulated_average \
             FROM grade_simulator.simulations \
             WHERE student_id = $1 AND course_id = $2 \
             ORDER BY created_at DESC \
             LIMIT $3",
        )
        .bind(student_id)
        .bind(course_id)
        .bind(self.history_limit)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let Json(simulated_entries): Json<Vec<SimulatedEntry>> =
                row.try_get("simulated_entries")?;
            records.push(SimulationRecord {
                id: row.get("id"),
                student_id: row.get("student_id"),
                course_id: row.get("course_id"),
                created_at: row.get("created_at"),
                simulated_entries,
                current_average: row.get("current_average"),
                simulated_average: row.get("simulated_average"),
            });
        }

        debug!(%student_id, %course_id, count = records.len(), "history loaded");
        Ok(records)
    }

    async fn create_simulation(&self, simulation: NewSimulation) -> Result<Uuid, GradeError> {
        let id: Uuid = sqlx::query(
            r#"
            INSERT INTO grade_simulator.simulations
            (id, student_id, course_id, simulated_entries, current_average, simulated_average)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(simulation.student_id)
        .bind(simulation.course_id)
        .bind(Json(&simulation.simulated_entries))
        .bind(simulation.current_average)
        .bind(simulation.simulated_average)
        .fetch_one(&self.pool)
        .await?
        .get("id");

        info!(simulation_id = %id, "simulation stored");
        Ok(id)
    }

    async fn delete_simulation(&self, simulation_id: Uuid) -> Result<(), GradeError> {
        let result = sqlx::query("DELETE FROM grade_simulator.simulations WHERE id = $1")
            .bind(simulation_id)
            .execute(&self.pool)
            .await?;

        info!(%simulation_id, removed = result.rows_affected(), "simulation deleted");
        Ok(())
    }
}

/// A flat grade row, as found in the seed data and in imported CSV files.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct GradeRow {
    pub external_id: String,
    pub student_code: String,
    pub student_name: String,
    pub email: String,
    pub course_code: String,
    pub course_name: String,
    pub evaluation: String,
    pub weight: f64,
    pub grade: Option<f64>,
}

impl GradeRow {
    #[allow(clippy::too_many_arguments)]
    fn new(
        external_id: &str,
        student_code: &str,
        student_name: &str,
        email: &str,
        course_code: &str,
        course_name: &str,
        evaluation: &str,
        weight: f64,
        grade: Option<f64>,
    ) -> Self {
        Self {
            external_id: external_id.to_string(),
            student_code: student_code.to_string(),
            student_name: student_name.to_string(),
            email: email.to_string(),
            course_code: course_code.to_string(),
            course_name: course_name.to_string(),
            evaluation: evaluation.to_string(),
            weight,
            grade,
        }
    }
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<usize> {
    let avery = ("seed-uid-avery", "20231001", "Avery Lee", "avery.lee@example.edu");
    let jules = ("seed-uid-jules", "20231002", "Jules Moreno", "jules.moreno@example.edu");
    let programming = ("CS1100", "Intro to Programming");
    let calculus = ("MA1200", "Calculus I");

    let mut rows = Vec::new();
    for (evaluation, weight, grade) in [
        ("P1", 30.0, Some(14.0)),
        ("P2", 30.0, None),
        ("Final", 40.0, None),
    ] {
        rows.push(GradeRow::new(
            avery.0, avery.1, avery.2, avery.3, programming.0, programming.1, evaluation, weight,
            grade,
        ));
    }
    for (evaluation, weight, grade) in [
        ("Quiz 1", 10.0, Some(16.0)),
        ("Quiz 2", 10.0, Some(11.5)),
        ("Midterm", 35.0, Some(9.0)),
        ("Final", 45.0, None),
    ] {
        rows.push(GradeRow::new(
            avery.0, avery.1, avery.2, avery.3, calculus.0, calculus.1, evaluation, weight, grade,
        ));
        rows.push(GradeRow::new(
            jules.0,
            jules.1,
            jules.2,
            jules.3,
            calculus.0,
            calculus.1,
            evaluation,
            weight,
            grade.map(|value| (value + 2.0_f64).min(20.0)),
        ));
    }

    upsert_rows(pool, &rows).await.context("failed to write seed grades")
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut rows = Vec::new();

    for result in reader.deserialize::<GradeRow>() {
        rows.push(result?);
    }

    upsert_rows(pool, &rows).await
}

/// Writes grade rows, creating students, courses, registrations and grade
/// books as needed. Returns the number of evaluations written.
async fn upsert_rows(pool: &PgPool, rows: &[GradeRow]) -> anyhow::Result<usize> {
    let mut tx = pool.begin().await?;
    let mut written = 0usize;

    for row in rows {
        if row.weight < 0.0 {
            anyhow::bail!("evaluation '{}' has a negative weight", row.evaluation);
        }

        let student_id: Uuid = sqlx::query(
            r#"
            INSERT INTO grade_simulator.students (id, external_id, code, full_name, email)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (external_id) DO UPDATE
            SET code = EXCLUDED.code, full_name = EXCLUDED.full_name, email = EXCLUDED.email
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&row.external_id)
        .bind(&row.student_code)
        .bind(&row.student_name)
        .bind(&row.email)
        .fetch_one(&mut *tx)
        .await?
        .get("id");

        let course_id: Uuid = sqlx::query(
            r#"
            INSERT INTO grade_simulator.courses (id, code, name)
            VALUES ($1, $2, $3)
            ON CONFLICT (code) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&row.course_code)
        .bind(&row.course_name)
        .fetch_one(&mut *tx)
        .await?
        .get("id");

        sqlx::query(
            "INSERT INTO grade_simulator.registrations (student_id, course_id) \
             VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(student_id)
        .bind(course_id)
        .execute(&mut *tx)
        .await?;

        let grade_book_id: Uuid = sqlx::query(
            r#"
            INSERT INTO grade_simulator.grade_books (id, student_id, course_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (student_id, course_id) DO UPDATE SET student_id = EXCLUDED.student_id
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(course_id)
        .fetch_one(&mut *tx)
        .await?
        .get("id");

        let slot = sqlx::query(
            r#"
            SELECT
                (SELECT position FROM grade_simulator.evaluations
                 WHERE grade_book_id = $1 AND name = $2) AS existing,
                (SELECT COALESCE(MAX(position) + 1, 0) FROM grade_simulator.evaluations
                 WHERE grade_book_id = $1) AS next_free
            "#,
        )
        .bind(grade_book_id)
        .bind(&row.evaluation)
        .fetch_one(&mut *tx)
        .await?;
        let position = evaluation_position(slot.get("existing"), slot.get("next_free"));

        sqlx::query(
            r#"
            INSERT INTO grade_simulator.evaluations
            (grade_book_id, position, name, weight, actual_grade)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (grade_book_id, name) DO UPDATE
            SET weight = EXCLUDED.weight, actual_grade = EXCLUDED.actual_grade
            "#,
        )
        .bind(grade_book_id)
        .bind(position)
        .bind(&row.evaluation)
        .bind(row.weight)
        .bind(row.grade)
        .execute(&mut *tx)
        .await?;

        written += 1;
    }

    tx.commit().await?;
    Ok(written)
}

/// Evaluations already in a grade book keep their slot; new ones go last.
fn evaluation_position(existing: Option<i32>, next_free: i32) -> i32 {
    existing.unwrap_or(next_free)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn updated_evaluations_keep_their_position() {
        // P1, P2, Final stored at 0, 1, 2; a later file only regrades Final.
        assert_eq!(evaluation_position(Some(2), 3), 2);
    }

    #[test]
    fn new_evaluations_are_appended() {
        assert_eq!(evaluation_position(None, 3), 3);
        assert_eq!(evaluation_position(None, 0), 0);
    }

    #[test]
    fn csv_rows_with_blank_grades_are_ungraded() {
        let data = "external_id,student_code,student_name,email,course_code,course_name,evaluation,weight,grade\n\
                    uid-1,20231001,Avery Lee,avery@example.edu,CS1100,Intro,P1,30,14\n\
                    uid-1,20231001,Avery Lee,avery@example.edu,CS1100,Intro,Final,40,\n";
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let rows: Vec<GradeRow> = reader.deserialize().collect::<Result<_, _>>().unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].grade, Some(14.0));
        assert_eq!(rows[1].evaluation, "Final");
        assert_eq!(rows[1].grade, None);
    }
}
