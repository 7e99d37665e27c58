use crate::models::{Evaluation, GradeMode};

pub const PASSING_AVERAGE: f64 = 10.5;

/// Weighted average over the evaluations that have a grade in `mode`.
///
/// Ungraded entries are left out of both sums. With nothing graded the
/// result is `0.0`. The value is not rounded.
pub fn compute_average(evaluations: &[Evaluation], mode: GradeMode) -> f64 {
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;

    for evaluation in evaluations {
        let grade = match mode {
            GradeMode::Actual => evaluation.actual_grade,
            GradeMode::Simulated => evaluation.simulated_grade,
        };

        if let Some(grade) = grade {
            weighted_sum += grade * evaluation.weight;
            total_weight += evaluation.weight;
        }
    }

    if total_weight > 0.0 {
        weighted_sum / total_weight
    } else {
        0.0
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn is_passing(average: f64) -> bool {
    average >= PASSING_AVERAGE
}
