//! Solved assignments and their metadata

use anyhow::Result;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A workers x tasks grid of 0/1 assignment decisions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssignmentMatrix {
    pub workers: usize,
    pub tasks: usize,
    pub cells: Vec<bool>,
}

impl AssignmentMatrix {
    /// A matrix with nothing assigned
    pub fn new(workers: usize, tasks: usize) -> Self {
        Self {
            workers,
            tasks,
            cells: vec![false; workers * tasks],
        }
    }

    /// Build from rows of 0/1 values, one row per worker
    pub fn from_rows(rows: &[Vec<u8>]) -> Result<Self> {
        let workers = rows.len();
        let tasks = rows.first().map_or(0, Vec::len);
        let mut matrix = Self::new(workers, tasks);

        for (worker, row) in rows.iter().enumerate() {
            if row.len() != tasks {
                anyhow::bail!("Row {} has length {}, expected {}", worker, row.len(), tasks);
            }
            for (task, &value) in row.iter().enumerate() {
                match value {
                    0 => {}
                    1 => matrix.set(worker, task, true),
                    _ => anyhow::bail!(
                        "Invalid value {} at ({}, {}). Only 0 and 1 are allowed",
                        value, worker, task
                    ),
                }
            }
        }

        Ok(matrix)
    }

    /// Whether `cells` holds exactly one entry per (worker, task) pair
    pub fn is_well_formed(&self) -> bool {
        self.workers.checked_mul(self.tasks) == Some(self.cells.len())
    }

    #[inline]
    fn index(&self, worker: usize, task: usize) -> usize {
        worker * self.tasks + task
    }

    pub fn get(&self, worker: usize, task: usize) -> bool {
        self.cells[self.index(worker, task)]
    }

    pub fn set(&mut self, worker: usize, task: usize, assigned: bool) {
        let index = self.index(worker, task);
        self.cells[index] = assigned;
    }

    /// Number of tasks assigned to `worker`
    pub fn row_sum(&self, worker: usize) -> usize {
        (0..self.tasks).filter(|&t| self.get(worker, t)).count()
    }

    /// Number of workers assigned to `task`
    pub fn column_sum(&self, task: usize) -> usize {
        (0..self.workers).filter(|&w| self.get(w, task)).count()
    }

    pub fn tasks_of(&self, worker: usize) -> Vec<usize> {
        (0..self.tasks).filter(|&t| self.get(worker, t)).collect()
    }

    pub fn workers_of(&self, task: usize) -> Vec<usize> {
        (0..self.workers).filter(|&w| self.get(w, task)).collect()
    }

    pub fn total_assigned(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }

    /// The matrix as rows of 0/1 values
    pub fn to_rows(&self) -> Vec<Vec<u8>> {
        (0..self.workers)
            .map(|w| (0..self.tasks).map(|t| u8::from(self.get(w, t))).collect())
            .collect()
    }
}

impl fmt::Display for AssignmentMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for worker in 0..self.workers {
            let row = (0..self.tasks)
                .map(|t| if self.get(worker, t) { '1' } else { '0' })
                .join(" ");
            writeln!(f, "{}", row)?;
        }
        Ok(())
    }
}

/// A feasible assignment found by the search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    pub assignment: AssignmentMatrix,
    /// Time from the start of the search until this solution
    #[serde(skip)]
    pub solve_time: Duration,
    pub metadata: SolutionMetadata,
}

/// Metadata about a solution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolutionMetadata {
    /// Identifier derived from the assignment itself
    pub id: String,
    /// Position in search order, starting at 0
    pub index: usize,
    /// Tasks per worker
    pub workload: Vec<usize>,
    /// Workers per task
    pub coverage: Vec<usize>,
    pub total_assignments: usize,
    pub nodes_explored: u64,
    pub backtracks: u64,
}

/// Condensed form used for summary files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolutionSummary {
    pub id: String,
    pub index: usize,
    pub total_assignments: usize,
    pub max_workload: usize,
    pub solve_time_ms: u64,
}

impl Solution {
    pub fn new(
        assignment: AssignmentMatrix,
        index: usize,
        solve_time: Duration,
        nodes_explored: u64,
        backtracks: u64,
    ) -> Self {
        let metadata = SolutionMetadata {
            id: SolutionMetadata::generate_id(&assignment),
            index,
            workload: (0..assignment.workers).map(|w| assignment.row_sum(w)).collect(),
            coverage: (0..assignment.tasks).map(|t| assignment.column_sum(t)).collect(),
            total_assignments: assignment.total_assigned(),
            nodes_explored,
            backtracks,
        };

        Self {
            assignment,
            solve_time,
            metadata,
        }
    }

    pub fn summary(&self) -> SolutionSummary {
        SolutionSummary {
            id: self.metadata.id.clone(),
            index: self.metadata.index,
            total_assignments: self.metadata.total_assignments,
            max_workload: self.metadata.workload.iter().copied().max().unwrap_or(0),
            solve_time_ms: self.solve_time.as_millis() as u64,
        }
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Create from JSON string, rejecting a matrix whose cells do not match its dimensions
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let solution: Solution = serde_json::from_str(json)?;
        let matrix = &solution.assignment;
        if !matrix.is_well_formed() {
            return Err(serde::de::Error::custom(format!(
                "assignment is {}x{} but has {} cells",
                matrix.workers,
                matrix.tasks,
                matrix.cells.len()
            )));
        }
        Ok(solution)
    }

    /// Save to file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&content)?)
    }
}

impl SolutionMetadata {
    fn generate_id(assignment: &AssignmentMatrix) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        assignment.hash(&mut hasher);

        format!("sol_{:x}", hasher.finish())
    }
}
