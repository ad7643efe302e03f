//! Finite-domain constraint engine: domains, constraints, propagation and search

pub mod constraints;
pub mod domain;
pub mod error;
pub mod propagation;
pub mod search;
pub mod termination;

pub use constraints::{
    Arithmetic, Conjunction, Constraint, ConstraintId, ConstraintRegistry, Implication, LinearSum,
    Operand, PropagationStatus, RegistryStatistics, Relation,
};
pub use domain::{Assignment, Domain, DomainStore, VariableId};
pub use error::{Contradiction, ModelError};
pub use propagation::PropagationEngine;
pub use search::{SearchStatistics, SearchStatus, Solver};
pub use termination::{Combined, Indefinite, NodeLimit, StopFlag, Termination, TimeLimit};
