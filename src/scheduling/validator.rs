//! Engine-independent checking of assignments against the scheduling rules

use super::{AssignmentMatrix, ProblemInstance, SchedulingError};
use std::fmt;

/// Validates assignments directly against a problem instance
pub struct SolutionValidator {
    instance: ProblemInstance,
}

/// A rule broken by an assignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    DimensionMismatch {
        workers: usize,
        tasks: usize,
        expected_workers: usize,
        expected_tasks: usize,
    },
    /// The cell vector does not match the stated dimensions
    CellCountMismatch {
        cells: usize,
        expected: usize,
    },
    CapacityExceeded {
        worker: usize,
        assigned: usize,
        capacity: i64,
    },
    TaskUncovered {
        task: usize,
    },
    InsufficientAvailability {
        worker: usize,
        task: usize,
        availability: i64,
        duration: i64,
    },
    DeadlineBeyondHorizon {
        worker: usize,
        task: usize,
        deadline: i64,
        horizon: i64,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::DimensionMismatch {
                workers,
                tasks,
                expected_workers,
                expected_tasks,
            } => write!(
                f,
                "Matrix is {}x{}, expected {}x{}",
                workers, tasks, expected_workers, expected_tasks
            ),
            Violation::CellCountMismatch { cells, expected } => write!(
                f,
                "Matrix has {} cells, expected {}",
                cells, expected
            ),
            Violation::CapacityExceeded {
                worker,
                assigned,
                capacity,
            } => write!(
                f,
                "Worker {} has {} tasks, capacity is {}",
                worker, assigned, capacity
            ),
            Violation::TaskUncovered { task } => write!(f, "Task {} has no worker", task),
            Violation::InsufficientAvailability {
                worker,
                task,
                availability,
                duration,
            } => write!(
                f,
                "Worker {} is available for {} but task {} takes {}",
                worker, availability, task, duration
            ),
            Violation::DeadlineBeyondHorizon {
                worker,
                task,
                deadline,
                horizon,
            } => write!(
                f,
                "Worker {} assigned to task {} whose deadline {} is beyond the horizon {}",
                worker, task, deadline, horizon
            ),
        }
    }
}

/// Result of validating an assignment
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub violations: Vec<Violation>,
    pub error_message: Option<String>,
}

impl SolutionValidator {
    /// Rejects a malformed instance up front
    pub fn new(instance: ProblemInstance) -> Result<Self, SchedulingError> {
        instance.validate()?;
        Ok(Self { instance })
    }

    /// Check every scheduling rule and collect all violations
    pub fn validate(&self, assignment: &AssignmentMatrix) -> ValidationResult {
        let instance = &self.instance;

        if assignment.workers != instance.workers || assignment.tasks != instance.tasks {
            return ValidationResult::from_violations(vec![Violation::DimensionMismatch {
                workers: assignment.workers,
                tasks: assignment.tasks,
                expected_workers: instance.workers,
                expected_tasks: instance.tasks,
            }]);
        }

        if !assignment.is_well_formed() {
            return ValidationResult::from_violations(vec![Violation::CellCountMismatch {
                cells: assignment.cells.len(),
                expected: assignment.workers * assignment.tasks,
            }]);
        }

        let mut violations = Vec::new();

        for worker in 0..instance.workers {
            let assigned = assignment.row_sum(worker);
            if assigned as i64 > instance.capacity_per_worker {
                violations.push(Violation::CapacityExceeded {
                    worker,
                    assigned,
                    capacity: instance.capacity_per_worker,
                });
            }
        }

        for task in 0..instance.tasks {
            if assignment.column_sum(task) == 0 {
                violations.push(Violation::TaskUncovered { task });
            }
        }

        for worker in 0..instance.workers {
            for task in assignment.tasks_of(worker) {
                let availability = instance.worker_availability[worker];
                let duration = instance.task_duration[task];
                if availability < duration {
                    violations.push(Violation::InsufficientAvailability {
                        worker,
                        task,
                        availability,
                        duration,
                    });
                }

                let deadline = instance.task_deadline[task];
                if deadline > instance.horizon {
                    violations.push(Violation::DeadlineBeyondHorizon {
                        worker,
                        task,
                        deadline,
                        horizon: instance.horizon,
                    });
                }
            }
        }

        ValidationResult::from_violations(violations)
    }
}

impl ValidationResult {
    fn from_violations(violations: Vec<Violation>) -> Self {
        let is_valid = violations.is_empty();
        let error_message = if is_valid {
            None
        } else {
            Some(Self::generate_error_message(&violations))
        };

        Self {
            is_valid,
            violations,
            error_message,
        }
    }

    fn generate_error_message(violations: &[Violation]) -> String {
        let mut message = format!("Found {} violations. ", violations.len());

        for (i, violation) in violations.iter().take(3).enumerate() {
            if i == 0 {
                message.push_str("Examples: ");
            }
            message.push_str(&format!("{}; ", violation));
        }

        if violations.len() > 3 {
            message.push_str(&format!("... and {} more", violations.len() - 3));
        }

        message
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Validation Result:")?;
        writeln!(f, "  Valid: {}", self.is_valid)?;
        writeln!(f, "  Violations: {}", self.violations.len())?;
        for violation in &self.violations {
            writeln!(f, "    - {}", violation)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance() -> ProblemInstance {
        ProblemInstance {
            workers: 2,
            tasks: 3,
            capacity_per_worker: 2,
            horizon: 10,
            worker_availability: vec![5, 3],
            task_duration: vec![4, 3, 2],
            task_deadline: vec![8, 10, 12],
        }
    }

    #[test]
    fn test_valid_assignment() {
        let validator = SolutionValidator::new(ProblemInstance {
            task_deadline: vec![8, 10, 9],
            ..instance()
        })
        .unwrap();
        let matrix = AssignmentMatrix::from_rows(&[vec![1, 0, 1], vec![0, 1, 0]]).unwrap();

        let result = validator.validate(&matrix);
        assert!(result.is_valid, "{}", result);
        assert!(result.error_message.is_none());
    }

    #[test]
    fn test_detects_every_rule() {
        let validator = SolutionValidator::new(instance()).unwrap();
        // Worker 1 takes task 0 (too long) and task 2 (deadline 12 > 10),
        // worker 0 is idle, so task 1 is uncovered.
        let matrix = AssignmentMatrix::from_rows(&[vec![0, 0, 0], vec![1, 0, 1]]).unwrap();

        let result = validator.validate(&matrix);
        assert!(!result.is_valid);
        assert_eq!(
            result.violations,
            vec![
                Violation::TaskUncovered { task: 1 },
                Violation::InsufficientAvailability {
                    worker: 1,
                    task: 0,
                    availability: 3,
                    duration: 4
                },
                Violation::DeadlineBeyondHorizon {
                    worker: 1,
                    task: 2,
                    deadline: 12,
                    horizon: 10
                },
            ]
        );
        assert!(result.error_message.unwrap().starts_with("Found 3 violations"));
    }

    #[test]
    fn test_capacity() {
        let validator = SolutionValidator::new(ProblemInstance {
            capacity_per_worker: 1,
            task_deadline: vec![8, 10, 9],
            ..instance()
        })
        .unwrap();
        let matrix = AssignmentMatrix::from_rows(&[vec![1, 1, 1], vec![0, 0, 0]]).unwrap();

        let result = validator.validate(&matrix);
        assert!(result.violations.contains(&Violation::CapacityExceeded {
            worker: 0,
            assigned: 3,
            capacity: 1
        }));
    }

    #[test]
    fn test_dimension_mismatch() {
        let validator = SolutionValidator::new(instance()).unwrap();
        let result = validator.validate(&AssignmentMatrix::new(3, 3));
        assert!(!result.is_valid);
        assert!(matches!(
            result.violations[0],
            Violation::DimensionMismatch { workers: 3, .. }
        ));
    }

    #[test]
    fn test_malformed_instance_rejected() {
        let result = SolutionValidator::new(ProblemInstance {
            workers: 5,
            ..ProblemInstance::default()
        });
        assert!(matches!(result, Err(SchedulingError::InvalidProblem(_))));
    }

    #[test]
    fn test_short_cell_vector_is_a_violation() {
        let validator = SolutionValidator::new(ProblemInstance::default()).unwrap();
        let matrix = AssignmentMatrix {
            workers: 4,
            tasks: 5,
            cells: vec![],
        };

        let result = validator.validate(&matrix);
        assert!(!result.is_valid);
        assert_eq!(
            result.violations,
            vec![Violation::CellCountMismatch {
                cells: 0,
                expected: 20
            }]
        );
    }
}
