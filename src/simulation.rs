use tracing::{debug, info};
use uuid::Uuid;

use crate::average::compute_average;
use crate::error::GradeError;
use crate::models::{Course, CourseGrades, Evaluation, GradeMode, NewSimulation, SimulatedEntry};
use crate::store::{GradeSource, SimulationHistory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Actual,
    Simulated,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Saved(Uuid),
    NothingToSave,
}

/// Grades for one student and course, plus any hypothetical grades the
/// student is trying out.
#[derive(Debug, Clone)]
pub struct SimulationSession {
    student_id: Uuid,
    course_id: Uuid,
    course: Course,
    evaluations: Vec<Evaluation>,
    current_average: f64,
    simulated_average: f64,
    state: SessionState,
}

impl SimulationSession {
    pub async fn load<S: GradeSource>(
        source: &S,
        student_id: Uuid,
        course_id: Uuid,
    ) -> Result<Self, GradeError> {
        let grades = source.grades(student_id, course_id).await?;
        Ok(Self::from_grades(student_id, course_id, grades))
    }

    pub fn from_grades(student_id: Uuid, course_id: Uuid, grades: CourseGrades) -> Self {
        Self {
            student_id,
            course_id,
            course: grades.course,
            evaluations: grades.evaluations,
            current_average: grades.current_average,
            simulated_average: grades.current_average,
            state: SessionState::Actual,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn course(&self) -> &Course {
        &self.course
    }

    pub fn evaluations(&self) -> &[Evaluation] {
        &self.evaluations
    }

    pub fn current_average(&self) -> f64 {
        self.current_average
    }

    pub fn simulated_average(&self) -> f64 {
        self.simulated_average
    }

    /// Seeds every simulated grade from the recorded one. Ungraded
    /// evaluations start unset.
    pub fn begin(&mut self) {
        self.evaluations = self
            .evaluations
            .iter()
            .map(|evaluation| Evaluation {
                simulated_grade: evaluation.actual_grade,
                ..evaluation.clone()
            })
            .collect();
        self.state = SessionState::Simulated;
        self.simulated_average = compute_average(&self.evaluations, GradeMode::Simulated);

        info!(
            student_id = %self.student_id,
            course_id = %self.course_id,
            "simulation started"
        );
    }

    pub fn edit(&mut self, name: &str, grade: Option<f64>) -> Result<f64, GradeError> {
        let index = self
            .evaluations
            .iter()
            .position(|evaluation| evaluation.name == name)
            .ok_or_else(|| GradeError::validation(format!("unknown evaluation '{name}'")))?;
        self.edit_at(index, grade)
    }

    /// Sets (or clears, with `None`) the simulated grade of an ungraded
    /// evaluation and returns the recomputed simulated average.
    pub fn edit_at(&mut self, index: usize, grade: Option<f64>) -> Result<f64, GradeError> {
        self.require_simulating("edit")?;

        let target = self
            .evaluations
            .get(index)
            .ok_or_else(|| GradeError::validation(format!("no evaluation at position {index}")))?;
        if target.is_graded() {
            return Err(GradeError::validation(format!(
                "'{}' already has a recorded grade",
                target.name
            )));
        }

        self.evaluations = with_simulated_grade(&self.evaluations, index, grade);
        self.simulated_average = compute_average(&self.evaluations, GradeMode::Simulated);

        debug!(
            evaluation = %self.evaluations[index].name,
            grade = ?grade,
            simulated_average = self.simulated_average,
            "simulated grade updated"
        );
        Ok(self.simulated_average)
    }

    /// Entries worth persisting: ungraded evaluations with a simulated value.
    pub fn simulated_entries(&self) -> Vec<SimulatedEntry> {
        self.evaluations
            .iter()
            .filter(|evaluation| !evaluation.is_graded())
            .filter_map(|evaluation| {
                evaluation.simulated_grade.map(|grade| SimulatedEntry {
                    name: evaluation.name.clone(),
                    simulated_grade: grade,
                })
            })
            .collect()
    }

    pub async fn save<H: SimulationHistory>(
        &mut self,
        history: &H,
    ) -> Result<SaveOutcome, GradeError> {
        self.require_simulating("save")?;

        let simulated_entries = self.simulated_entries();
        if simulated_entries.is_empty() {
            info!(
                student_id = %self.student_id,
                course_id = %self.course_id,
                "nothing to save"
            );
            return Ok(SaveOutcome::NothingToSave);
        }

        let simulation_id = history
            .create_simulation(NewSimulation {
                student_id: self.student_id,
                course_id: self.course_id,
                simulated_entries,
                current_average: self.current_average,
                simulated_average: self.simulated_average,
            })
            .await?;

        info!(%simulation_id, "simulation saved");
        self.reset();
        Ok(SaveOutcome::Saved(simulation_id))
    }

    /// Drops local edits and reloads the recorded grades. Edits are gone
    /// even when the reload fails.
    pub async fn cancel<S: GradeSource>(&mut self, source: &S) -> Result<(), GradeError> {
        self.require_simulating("cancel")?;
        self.reset();

        let grades = source.grades(self.student_id, self.course_id).await?;
        *self = Self::from_grades(self.student_id, self.course_id, grades);

        info!(
            student_id = %self.student_id,
            course_id = %self.course_id,
            "simulation cancelled"
        );
        Ok(())
    }

    fn reset(&mut self) {
        self.evaluations = self
            .evaluations
            .iter()
            .map(|evaluation| Evaluation {
                simulated_grade: None,
                ..evaluation.clone()
            })
            .collect();
        self.simulated_average = self.current_average;
        self.state = SessionState::Actual;
    }

    fn require_simulating(&self, action: &str) -> Result<(), GradeError> {
        if self.state == SessionState::Simulated {
            Ok(())
        } else {
            Err(GradeError::validation(format!(
                "cannot {action} outside of a simulation"
            )))
        }
    }
}

fn with_simulated_grade(
    evaluations: &[Evaluation],
    index: usize,
    grade: Option<f64>,
) -> Vec<Evaluation> {
    evaluations
        .iter()
        .enumerate()
        .map(|(position, evaluation)| {
            if position == index {
                Evaluation {
                    simulated_grade: grade,
                    ..evaluation.clone()
                }
            } else {
                evaluation.clone()
            }
        })
        .collect()
}

/// Empty input clears the simulated grade. Range is not checked.
pub fn parse_grade_input(input: &str) -> Result<Option<f64>, GradeError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let value: f64 = trimmed
        .parse()
        .map_err(|_| GradeError::validation(format!("'{trimmed}' is not a number")))?;
    if !value.is_finite() {
        return Err(GradeError::validation(format!("'{trimmed}' is not a finite grade")));
    }
    Ok(Some(value))
}
