//! Worker/Task Assignment Solver
//!
//! This library assigns tasks to workers under capacity, coverage,
//! availability and deadline rules, using a small finite-domain
//! constraint engine with propagation and backtracking search.

pub mod config;
pub mod csp;
pub mod scheduling;
pub mod utils;

pub use config::Settings;
pub use scheduling::{AssignmentProblem, ProblemInstance, SchedulingError, Solution, SolveOutcome};

use anyhow::{Context, Result};

/// Main entry point: load the configured instance and search for solutions.
///
/// An empty vector means the instance is infeasible.
pub fn solve_assignment(settings: &Settings) -> Result<Vec<Solution>> {
    let instance = ProblemInstance::from_file(&settings.input.instance_file)?;
    let mut problem = AssignmentProblem::new(instance).context("Failed to build assignment model")?;
    let solutions = problem
        .solve_multiple(settings.solver.max_solutions, settings.solver.termination())
        .context("Failed to solve assignment problem")?;
    Ok(solutions)
}
