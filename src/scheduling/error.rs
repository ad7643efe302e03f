//! Errors surfaced to callers of the scheduling layer

use crate::csp::ModelError;
use thiserror::Error;

/// Failures of [`AssignmentProblem`](super::AssignmentProblem).
///
/// Infeasibility is not an error: it is reported as
/// [`SolveOutcome::Infeasible`](super::SolveOutcome::Infeasible).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulingError {
    /// Malformed input, rejected before any search starts
    #[error("invalid problem: {0}")]
    InvalidProblem(String),

    /// The search was stopped externally before it could decide
    #[error("search aborted after {nodes} nodes without reaching a verdict")]
    Aborted { nodes: u64 },

    /// The engine reported a solution that breaks a scheduling rule
    #[error("solution {index} failed validation: {reason}")]
    UnsoundSolution { index: usize, reason: String },

    #[error(transparent)]
    Model(#[from] ModelError),
}
