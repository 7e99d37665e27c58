use std::fmt::Write;

use crate::average::{is_passing, round2, PASSING_AVERAGE};
use crate::models::{CourseGrades, SimulatedEntry, SimulationRecord};

pub fn pending_weight(grades: &CourseGrades) -> f64 {
    grades
        .evaluations
        .iter()
        .filter(|evaluation| !evaluation.is_graded())
        .map(|evaluation| evaluation.weight)
        .sum()
}

pub fn standing_label(average: f64) -> &'static str {
    if is_passing(average) {
        "passing"
    } else {
        "below passing"
    }
}

pub fn format_entries(entries: &[SimulatedEntry]) -> String {
    entries
        .iter()
        .map(|entry| format!("{}: {}", entry.name, entry.simulated_grade))
        .collect::<Vec<_>>()
        .join(" • ")
}

pub fn build_report(grades: &CourseGrades, history: &[SimulationRecord]) -> String {
    let mut output = String::new();
    let current = round2(grades.current_average);

    let _ = writeln!(output, "# Grade Report: {}", grades.course.name);
    let _ = writeln!(output, "Course code {}", grades.course.code);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Evaluations");

    if grades.evaluations.is_empty() {
        let _ = writeln!(output, "No evaluations recorded for this course.");
    } else {
        let _ = writeln!(output, "| Evaluation | Weight (%) | Grade |");
        let _ = writeln!(output, "|---|---|---|");
        for evaluation in grades.evaluations.iter() {
            let grade = evaluation
                .actual_grade
                .map(|value| value.to_string())
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(
                output,
                "| {} | {} | {} |",
                evaluation.name, evaluation.weight, grade
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "Current average {:.2} ({}, threshold {:.1})",
        current,
        standing_label(current),
        PASSING_AVERAGE
    );
    let _ = writeln!(output, "Weight still ungraded: {}%", pending_weight(grades));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Simulation History");

    if history.is_empty() {
        let _ = writeln!(output, "No simulations saved yet.");
    } else {
        for record in history.iter() {
            let _ = writeln!(
                output,
                "- {}: simulated average {:.2} ({})",
                record.created_at.format("%Y-%m-%d %H:%M"),
                round2(record.simulated_average),
                format_entries(&record.simulated_entries)
            );
        }
    }

    output
}
