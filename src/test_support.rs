use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::average::compute_average;
use crate::config::DEFAULT_HISTORY_LIMIT;
use crate::error::GradeError;
use crate::models::{
    Course, CourseGrades, Enrollment, Evaluation, GradeMode, NewSimulation, SimulationRecord,
    Student,
};
use crate::store::{GradeSource, SimulationHistory};

// P1 graded at 14, P2 and Final pending; recorded average 14.00.
pub fn sample_grades() -> CourseGrades {
    let evaluations = vec![
        Evaluation::new("P1", 30.0, Some(14.0)),
        Evaluation::new("P2", 30.0, None),
        Evaluation::new("Final", 40.0, None),
    ];
    CourseGrades {
        current_average: compute_average(&evaluations, GradeMode::Actual),
        evaluations,
        course: Course {
            id: Uuid::new_v4(),
            code: "CS1100".to_string(),
            name: "Intro to Programming".to_string(),
        },
    }
}

#[derive(Default)]
struct Inner {
    students: Vec<Student>,
    enrollments: HashMap<Uuid, Vec<Course>>,
    grade_books: HashMap<(Uuid, Uuid), (Course, Vec<Evaluation>)>,
    simulations: Vec<SimulationRecord>,
}

/// In-memory stand-in for the Postgres store.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    history_limit: i64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }
}

impl MemoryStore {
    pub fn with_history_limit(history_limit: i64) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            history_limit,
        }
    }

    /// Registers a fresh student in the course and returns `(student, course)`.
    pub fn insert_grades(&self, grades: CourseGrades) -> (Uuid, Uuid) {
        let student_id = Uuid::new_v4();
        let course_id = grades.course.id;
        let mut inner = self.inner.lock().unwrap();
        inner.students.push(Student {
            id: student_id,
            external_id: format!("uid-{student_id}"),
            code: "20231234".to_string(),
            name: "Avery Lee".to_string(),
            email: "avery.lee@example.com".to_string(),
        });
        inner
            .enrollments
            .entry(student_id)
            .or_default()
            .push(grades.course.clone());
        inner
            .grade_books
            .insert((student_id, course_id), (grades.course, grades.evaluations));
        (student_id, course_id)
    }

    pub fn set_actual_grade(&self, student_id: Uuid, course_id: Uuid, name: &str, grade: f64) {
        let mut inner = self.inner.lock().unwrap();
        let (_, evaluations) = inner
            .grade_books
            .get_mut(&(student_id, course_id))
            .unwrap();
        for evaluation in evaluations.iter_mut() {
            if evaluation.name == name {
                evaluation.actual_grade = Some(grade);
            }
        }
    }

    pub fn simulation_count(&self) -> usize {
        self.inner.lock().unwrap().simulations.len()
    }
}

impl GradeSource for MemoryStore {
    async fn enrolled_courses(&self, external_id: &str) -> Result<Enrollment, GradeError> {
        let inner = self.inner.lock().unwrap();
        let student = inner
            .students
            .iter()
            .find(|student| student.external_id == external_id)
            .cloned()
            .ok_or_else(|| GradeError::not_found("student"))?;
        let courses = inner
            .enrollments
            .get(&student.id)
            .cloned()
            .unwrap_or_default();
        Ok(Enrollment { student, courses })
    }

    async fn grades(&self, student_id: Uuid, course_id: Uuid) -> Result<CourseGrades, GradeError> {
        let inner = self.inner.lock().unwrap();
        let (course, evaluations) = inner
            .grade_books
            .get(&(student_id, course_id))
            .cloned()
            .ok_or_else(|| GradeError::not_found("grade record"))?;
        Ok(CourseGrades {
            current_average: compute_average(&evaluations, GradeMode::Actual),
            evaluations,
            course,
        })
    }
}

impl SimulationHistory for MemoryStore {
    async fn list_simulations(
        &self,
        student_id: Uuid,
        course_id: Uuid,
    ) -> Result<Vec<SimulationRecord>, GradeError> {
        let inner = self.inner.lock().unwrap();
        let mut records: Vec<SimulationRecord> = inner
            .simulations
            .iter()
            .filter(|record| record.student_id == student_id && record.course_id == course_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(self.history_limit as usize);
        Ok(records)
    }

    async fn create_simulation(&self, simulation: NewSimulation) -> Result<Uuid, GradeError> {
        let mut inner = self.inner.lock().unwrap();
        let id = Uuid::new_v4();
        // Spread timestamps so ordering is deterministic within a test.
        let created_at = Utc::now() + Duration::milliseconds(inner.simulations.len() as i64);
        inner.simulations.push(SimulationRecord {
            id,
            student_id: simulation.student_id,
            course_id: simulation.course_id,
            created_at,
            simulated_entries: simulation.simulated_entries,
            current_average: simulation.current_average,
            simulated_average: simulation.simulated_average,
        });
        Ok(id)
    }

    async fn delete_simulation(&self, simulation_id: Uuid) -> Result<(), GradeError> {
        let mut inner = self.inner.lock().unwrap();
        inner.simulations.retain(|record| record.id != simulation_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SimulatedEntry;

    fn new_simulation(student_id: Uuid, course_id: Uuid, average: f64) -> NewSimulation {
        NewSimulation {
            student_id,
            course_id,
            simulated_entries: vec![SimulatedEntry {
                name: "Final".to_string(),
                simulated_grade: average,
            }],
            current_average: 14.0,
            simulated_average: average,
        }
    }

    #[tokio::test]
    async fn unknown_student_and_grade_book_are_not_found() {
        let store = MemoryStore::default();
        assert!(matches!(
            store.enrolled_courses("missing").await,
            Err(GradeError::NotFound { .. })
        ));
        assert!(matches!(
            store.grades(Uuid::new_v4(), Uuid::new_v4()).await,
            Err(GradeError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn history_is_newest_first_and_capped() {
        let store = MemoryStore::default();
        let (student_id, course_id) = store.insert_grades(sample_grades());
        for step in 0..12 {
            store
                .create_simulation(new_simulation(student_id, course_id, step as f64))
                .await
                .unwrap();
        }

        let history = store.list_simulations(student_id, course_id).await.unwrap();

        assert_eq!(history.len(), 10);
        assert_eq!(history[0].simulated_average, 11.0);
        assert_eq!(history[9].simulated_average, 2.0);
    }

    #[tokio::test]
    async fn history_follows_a_configured_limit() {
        let store = MemoryStore::with_history_limit(3);
        let (student_id, course_id) = store.insert_grades(sample_grades());
        for step in 0..5 {
            store
                .create_simulation(new_simulation(student_id, course_id, step as f64))
                .await
                .unwrap();
        }

        let history = store.list_simulations(student_id, course_id).await.unwrap();

        let averages: Vec<f64> = history.iter().map(|record| record.simulated_average).collect();
        assert_eq!(averages, vec![4.0, 3.0, 2.0]);
    }

    #[tokio::test]
    async fn deleting_twice_is_harmless() {
        let store = MemoryStore::default();
        let (student_id, course_id) = store.insert_grades(sample_grades());
        let id = store
            .create_simulation(new_simulation(student_id, course_id, 12.0))
            .await
            .unwrap();

        store.delete_simulation(id).await.unwrap();
        store.delete_simulation(id).await.unwrap();

        assert_eq!(store.simulation_count(), 0);
    }
}
