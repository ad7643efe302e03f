//! Input data of an assignment problem

use super::SchedulingError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Workers, tasks and the limits an assignment has to respect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemInstance {
    pub workers: usize,
    pub tasks: usize,
    /// Maximum number of tasks per worker
    pub capacity_per_worker: i64,
    /// Latest allowed deadline
    pub horizon: i64,
    /// Time each worker has available, one entry per worker
    pub worker_availability: Vec<i64>,
    /// Time each task takes, one entry per task
    pub task_duration: Vec<i64>,
    pub task_deadline: Vec<i64>,
}

impl Default for ProblemInstance {
    /// Four workers, five tasks
    fn default() -> Self {
        Self {
            workers: 4,
            tasks: 5,
            capacity_per_worker: 2,
            horizon: 12,
            worker_availability: vec![8, 7, 6, 9],
            task_duration: vec![4, 6, 8, 5, 7],
            task_deadline: vec![8, 9, 12, 10, 11],
        }
    }
}

impl ProblemInstance {
    /// Check the instance before any model is built
    pub fn validate(&self) -> Result<(), SchedulingError> {
        if self.capacity_per_worker < 0 {
            return Err(SchedulingError::InvalidProblem(format!(
                "capacity per worker must not be negative (got {})",
                self.capacity_per_worker
            )));
        }
        if self.horizon < 0 {
            return Err(SchedulingError::InvalidProblem(format!(
                "horizon must not be negative (got {})",
                self.horizon
            )));
        }

        check_length("worker availability", self.worker_availability.len(), self.workers)?;
        check_length("task duration", self.task_duration.len(), self.tasks)?;
        check_length("task deadline", self.task_deadline.len(), self.tasks)?;

        if let Some((worker, &availability)) =
            self.worker_availability.iter().enumerate().find(|(_, &a)| a < 0)
        {
            return Err(SchedulingError::InvalidProblem(format!(
                "worker {} has negative availability {}",
                worker, availability
            )));
        }
        if let Some((task, &duration)) =
            self.task_duration.iter().enumerate().find(|(_, &d)| d <= 0)
        {
            return Err(SchedulingError::InvalidProblem(format!(
                "task {} has non-positive duration {}",
                task, duration
            )));
        }
        if let Some((task, &deadline)) =
            self.task_deadline.iter().enumerate().find(|(_, &d)| d < 0)
        {
            return Err(SchedulingError::InvalidProblem(format!(
                "task {} has negative deadline {}",
                task, deadline
            )));
        }

        Ok(())
    }

    /// Whether `worker` may take `task` at all
    pub fn is_eligible(&self, worker: usize, task: usize) -> bool {
        self.worker_availability[worker] >= self.task_duration[task]
            && self.task_deadline[task] <= self.horizon
    }

    /// Workers that may take `task`, in ascending order
    pub fn eligible_workers(&self, task: usize) -> Vec<usize> {
        (0..self.workers)
            .filter(|&worker| self.is_eligible(worker, task))
            .collect()
    }

    /// Load an instance from a YAML or JSON file (chosen by extension)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read instance file: {}", path.display()))?;

        let instance: ProblemInstance = if is_json(path) {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse instance file: {}", path.display()))?
        } else {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse instance file: {}", path.display()))?
        };

        Ok(instance)
    }

    /// Save the instance as YAML or JSON (chosen by extension)
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = if is_json(path) {
            serde_json::to_string_pretty(self).context("Failed to serialize instance")?
        } else {
            serde_yaml::to_string(self).context("Failed to serialize instance")?
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write instance file: {}", path.display()))?;

        Ok(())
    }
}

fn check_length(what: &str, actual: usize, expected: usize) -> Result<(), SchedulingError> {
    if actual != expected {
        return Err(SchedulingError::InvalidProblem(format!(
            "{} has {} entries, expected {}",
            what, actual, expected
        )));
    }
    Ok(())
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}
