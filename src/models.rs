use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: Uuid,
    pub external_id: String,
    pub code: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: Uuid,
    pub code: String,
    pub name: String,
}

impl Course {
    /// Stand-in used when a grade book outlives its course row.
    pub fn placeholder(id: Uuid) -> Self {
        Self {
            id,
            code: "N/A".to_string(),
            name: "Untitled course".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub student: Student,
    pub courses: Vec<Course>,
}

/// One weighted, gradeable component of a course.
///
/// `simulated_grade` of `None` is the unset placeholder shown while a
/// simulation is in progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub name: String,
    pub weight: f64,
    pub actual_grade: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulated_grade: Option<f64>,
}

impl Evaluation {
    pub fn new(name: impl Into<String>, weight: f64, actual_grade: Option<f64>) -> Self {
        Self {
            name: name.into(),
            weight,
            actual_grade,
            simulated_grade: None,
        }
    }

    pub fn is_graded(&self) -> bool {
        self.actual_grade.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradeMode {
    Actual,
    Simulated,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseGrades {
    pub evaluations: Vec<Evaluation>,
    pub current_average: f64,
    pub course: Course,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatedEntry {
    pub name: String,
    pub simulated_grade: f64,
}

/// A simulation snapshot that has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSimulation {
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub simulated_entries: Vec<SimulatedEntry>,
    pub current_average: f64,
    pub simulated_average: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationRecord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub simulated_entries: Vec<SimulatedEntry>,
    pub current_average: f64,
    pub simulated_average: f64,
}
