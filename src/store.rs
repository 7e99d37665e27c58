use uuid::Uuid;

use crate::error::GradeError;
use crate::models::{CourseGrades, Enrollment, NewSimulation, SimulationRecord};

/// Read side for students, courses and recorded grades.
pub trait GradeSource {
    /// Fails with `NotFound` when no student carries `external_id`.
    async fn enrolled_courses(&self, external_id: &str) -> Result<Enrollment, GradeError>;

    /// Fails with `NotFound` when the student has no grade book for the course.
    async fn grades(&self, student_id: Uuid, course_id: Uuid) -> Result<CourseGrades, GradeError>;
}

/// Saved simulations, scoped to a student and course.
pub trait SimulationHistory {
    /// Most recent first, capped by the store.
    async fn list_simulations(
        &self,
        student_id: Uuid,
        course_id: Uuid,
    ) -> Result<Vec<SimulationRecord>, GradeError>;

    async fn create_simulation(&self, simulation: NewSimulation) -> Result<Uuid, GradeError>;

    /// Removing an unknown id is not an error.
    async fn delete_simulation(&self, simulation_id: Uuid) -> Result<(), GradeError>;
}
