//! Error types of the constraint engine

use super::VariableId;
use thiserror::Error;

/// The current partial assignment cannot be extended to a solution.
///
/// This is the expected signal that a branch of the search is dead. It is
/// consumed by the search engine and never returned to callers of the
/// problem builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Contradiction {
    #[error("domain of variable {variable} was wiped out")]
    WipeOut { variable: VariableId },

    #[error("no values within the current bounds can satisfy the constraint")]
    Unsatisfiable,
}

/// Misuse of the modelling API
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("cannot create a variable with empty range [{lower}, {upper}]")]
    EmptyDomain { lower: i64, upper: i64 },

    #[error("constraint references unknown variable {variable} (store holds {count} variables)")]
    UnknownVariable { variable: VariableId, count: usize },
}
