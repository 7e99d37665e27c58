use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod average;
mod config;
mod db;
mod error;
mod models;
mod report;
mod simulation;
mod store;
#[cfg(test)]
mod test_support;

use crate::average::round2;
use crate::config::Config;
use crate::db::PgStore;
use crate::simulation::{parse_grade_input, SaveOutcome, SimulationSession};
use crate::store::{GradeSource, SimulationHistory};

#[derive(Parser)]
#[command(name = "grade-simulator")]
#[command(about = "Review course grades and project averages from hypothetical ones", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load demo students, courses and grades
    Seed,
    /// Import grade rows from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// List the courses a student is enrolled in
    Courses {
        /// External (identity provider) id of the student
        #[arg(long)]
        uid: String,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Show recorded grades and the current average
    Grades {
        #[arg(long)]
        student: Uuid,
        #[arg(long)]
        course: Uuid,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Project an average from hypothetical grades
    Simulate {
        #[arg(long)]
        student: Uuid,
        #[arg(long)]
        course: Uuid,
        /// Simulated grade as NAME=VALUE; an empty VALUE clears it
        #[arg(long = "set", value_parser = parse_assignment)]
        assignments: Vec<(String, String)>,
        /// Store the simulation in the history
        #[arg(long)]
        save: bool,
    },
    /// Show saved simulations, newest first
    History {
        #[arg(long)]
        student: Uuid,
        #[arg(long)]
        course: Uuid,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Delete a saved simulation
    Delete {
        #[arg(long)]
        simulation: Uuid,
    },
    /// Write a markdown grade report
    Report {
        #[arg(long)]
        student: Uuid,
        #[arg(long)]
        course: Uuid,
        #[arg(long, default_value = "grades.md")]
        out: PathBuf,
    },
}

fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing evaluation name in '{raw}'"));
    }
    Ok((name.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_filter))
        .with_writer(std::io::stderr)
        .init();

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;
    let store = PgStore::new(pool, config.history_limit);

    let result = run(cli.command, &store).await;
    store.pool().close().await;
    result
}

async fn run(command: Commands, store: &PgStore) -> anyhow::Result<()> {
    match command {
        Commands::InitDb => {
            db::init_db(store.pool()).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let written = db::seed(store.pool()).await?;
            println!("Seed data inserted ({written} evaluations).");
        }
        Commands::Import { csv } => {
            let written = db::import_csv(store.pool(), &csv).await?;
            println!("Imported {written} evaluations from {}.", csv.display());
        }
        Commands::Courses { uid, json } => {
            let enrollment = store.enrolled_courses(&uid).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&enrollment)?);
                return Ok(());
            }

            println!(
                "{} ({}, {}) id {}",
                enrollment.student.name,
                enrollment.student.code,
                enrollment.student.email,
                enrollment.student.id
            );

            if enrollment.courses.is_empty() {
                println!("No enrolled courses.");
            }
            for course in enrollment.courses.iter() {
                println!("- {} {} (id {})", course.code, course.name, course.id);
            }
        }
        Commands::Grades {
            student,
            course,
            json,
        } => {
            let grades = store.grades(student, course).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&grades)?);
                return Ok(());
            }

            println!("{} ({})", grades.course.name, grades.course.code);

            if grades.evaluations.is_empty() {
                println!("No evaluations recorded.");
            }
            for evaluation in grades.evaluations.iter() {
                let grade = evaluation
                    .actual_grade
                    .map(|value| value.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("- {} ({}%): {}", evaluation.name, evaluation.weight, grade);
            }
            println!(
                "Current average {:.2} ({})",
                round2(grades.current_average),
                report::standing_label(round2(grades.current_average))
            );
        }
        Commands::Simulate {
            student,
            course,
            assignments,
            save,
        } => {
            let mut session = SimulationSession::load(store, student, course).await?;
            session.begin();

            for (name, raw) in assignments.iter() {
                let grade = parse_grade_input(raw)?;
                session.edit(name, grade)?;
            }

            println!("{} ({})", session.course().name, session.course().code);
            for evaluation in session.evaluations().iter() {
                let shown = match (evaluation.actual_grade, evaluation.simulated_grade) {
                    (Some(actual), _) => actual.to_string(),
                    (None, Some(simulated)) => format!("{simulated} (simulated)"),
                    (None, None) => "-".to_string(),
                };
                println!("- {} ({}%): {}", evaluation.name, evaluation.weight, shown);
            }
            println!("Current average {:.2}", round2(session.current_average()));
            println!(
                "Simulated average {:.2} ({})",
                round2(session.simulated_average()),
                report::standing_label(round2(session.simulated_average()))
            );

            if save {
                match session.save(store).await? {
                    SaveOutcome::Saved(id) => println!("Simulation saved with id {id}."),
                    SaveOutcome::NothingToSave => println!("No simulated grades to save."),
                }
            }
        }
        Commands::History {
            student,
            course,
            json,
        } => {
            let history = store.list_simulations(student, course).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&history)?);
                return Ok(());
            }


            if history.is_empty() {
                println!("No simulations saved yet.");
                return Ok(());
            }

            for record in history.iter() {
                println!(
                    "- {} [{}] simulated average {:.2} (current {:.2}): {}",
                    record.created_at.format("%Y-%m-%d %H:%M"),
                    record.id,
                    round2(record.simulated_average),
                    round2(record.current_average),
                    report::format_entries(&record.simulated_entries)
                );
            }
        }
        Commands::Delete { simulation } => {
            store.delete_simulation(simulation).await?;
            println!("Simulation {simulation} deleted.");
        }
        Commands::Report {
            student,
            course,
            out,
        } => {
            let grades = store.grades(student, course).await?;
            let history = store.list_simulations(student, course).await?;
            let report = report::build_report(&grades, &history);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
