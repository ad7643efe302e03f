//! Worker/task assignment on top of the constraint engine

pub mod error;
pub mod instance;
pub mod problem;
pub mod solution;
pub mod validator;

pub use error::SchedulingError;
pub use instance::ProblemInstance;
pub use problem::{
    solve_batch, AssignmentProblem, FeasibilityEstimate, FeasibilityLikelihood, ModelStatistics,
    SolveOutcome,
};
pub use solution::{AssignmentMatrix, Solution, SolutionMetadata, SolutionSummary};
pub use validator::{SolutionValidator, ValidationResult, Violation};
