//! Display and output formatting utilities

use crate::config::OutputFormat;
use crate::scheduling::{AssignmentMatrix, ProblemInstance, Solution};
use anyhow::{Context, Result};
use itertools::Itertools;
use std::path::Path;

/// Format solutions for display
pub struct SolutionFormatter;

impl SolutionFormatter {
    /// Format a single solution for console output
    pub fn format_solution(solution: &Solution, instance: &ProblemInstance) -> String {
        let mut output = String::new();

        output.push_str(&format!("=== Solution {} ===\n", solution.metadata.id));
        output.push_str(&format!("Solve Time: {:.3}s\n", solution.solve_time.as_secs_f64()));
        output.push_str(&format!(
            "Search: {} nodes, {} backtracks\n",
            solution.metadata.nodes_explored, solution.metadata.backtracks
        ));
        output.push('\n');

        output.push_str(&Self::format_assignments(&solution.assignment));
        output.push('\n');
        output.push_str(&Self::format_matrix(&solution.assignment, instance));

        output
    }

    /// One line per worker listing its tasks
    pub fn format_assignments(assignment: &AssignmentMatrix) -> String {
        let mut output = String::new();
        for worker in 0..assignment.workers {
            let tasks = assignment.tasks_of(worker);
            if tasks.is_empty() {
                output.push_str(&format!("Worker {} has no tasks\n", worker));
            } else {
                output.push_str(&format!(
                    "Worker {} works on tasks: {}\n",
                    worker,
                    tasks.iter().join(" ")
                ));
            }
        }
        output
    }

    /// The matrix with worker availability and task duration headers
    pub fn format_matrix(assignment: &AssignmentMatrix, instance: &ProblemInstance) -> String {
        let mut output = String::new();

        output.push_str("          ");
        for task in 0..assignment.tasks {
            output.push_str(&format!(" T{:<3}", task));
        }
        output.push('\n');

        output.push_str("  dur     ");
        for task in 0..assignment.tasks {
            let duration = instance.task_duration.get(task).copied().unwrap_or_default();
            output.push_str(&format!(" {:<4}", duration));
        }
        output.push('\n');

        for worker in 0..assignment.workers {
            let availability = instance
                .worker_availability
                .get(worker)
                .copied()
                .unwrap_or_default();
            output.push_str(&format!("W{:<3} ({:>3})", worker, availability));
            for task in 0..assignment.tasks {
                output.push_str(if assignment.get(worker, task) { " ■   " } else { " ·   " });
            }
            output.push('\n');
        }

        output
    }

    /// Format multiple solutions as a summary table
    pub fn format_solution_summary(solutions: &[Solution]) -> String {
        let mut output = String::new();

        output.push_str("Solutions Summary:\n");
        output.push_str("#   | ID       | Time(ms) | Assigned | Max load | Nodes\n");
        output.push_str("----|----------|----------|----------|----------|--------\n");

        for solution in solutions {
            let summary = solution.summary();
            output.push_str(&format!(
                "{:3} | {:8} | {:8} | {:8} | {:8} | {}\n",
                summary.index,
                &summary.id[..8.min(summary.id.len())],
                summary.solve_time_ms,
                summary.total_assignments,
                summary.max_workload,
                solution.metadata.nodes_explored
            ));
        }

        output
    }

    /// Save solutions to files based on output format
    pub fn save_solutions<P: AsRef<Path>>(
        solutions: &[Solution],
        instance: &ProblemInstance,
        output_dir: P,
        format: &OutputFormat,
    ) -> Result<()> {
        let output_dir = output_dir.as_ref();
        std::fs::create_dir_all(output_dir)
            .with_context(|| format!("Failed to create directory: {}", output_dir.display()))?;

        match format {
            OutputFormat::Text => {
                for (i, solution) in solutions.iter().enumerate() {
                    let filename = format!("solution_{:03}.txt", i + 1);
                    let content = Self::format_solution(solution, instance);
                    std::fs::write(output_dir.join(filename), content)?;
                }
            }
            OutputFormat::Json => {
                for (i, solution) in solutions.iter().enumerate() {
                    let filename = format!("solution_{:03}.json", i + 1);
                    solution.save_to_file(output_dir.join(filename))?;
                }

                let summaries: Vec<_> = solutions.iter().map(|s| s.summary()).collect();
                let summary_json = serde_json::to_string_pretty(&summaries)?;
                std::fs::write(output_dir.join("solutions_summary.json"), summary_json)?;
            }
        }

        Ok(())
    }
}

/// Color output utilities
pub struct ColorOutput;

impl ColorOutput {
    /// Format text with color (if terminal supports it)
    pub fn colored(text: &str, color: Color) -> String {
        if Self::supports_color() {
            format!("\x1b[{}m{}\x1b[0m", color.code(), text)
        } else {
            text.to_string()
        }
    }

    fn supports_color() -> bool {
        std::env::var("NO_COLOR").is_err()
            && (std::env::var("TERM").unwrap_or_default() != "dumb")
    }

    pub fn success(text: &str) -> String {
        Self::colored(text, Color::Green)
    }

    pub fn error(text: &str) -> String {
        Self::colored(text, Color::Red)
    }

    pub fn warning(text: &str) -> String {
        Self::colored(text, Color::Yellow)
    }

    pub fn info(text: &str) -> String {
        Self::colored(text, Color::Blue)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Color {
    Red,
    Green,
    Yellow,
    Blue,
}

impl Color {
    fn code(self) -> u8 {
        match self {
            Color::Red => 31,
            Color::Green => 32,
            Color::Yellow => 33,
            Color::Blue => 34,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn sample() -> Solution {
        let rows = [vec![1, 0, 1], vec![0, 1, 0], vec![0, 0, 0]];
        let matrix = AssignmentMatrix::from_rows(&rows).unwrap();
        Solution::new(matrix, 0, Duration::from_millis(3), 7, 1)
    }

    fn instance() -> ProblemInstance {
        ProblemInstance {
            workers: 3,
            tasks: 3,
            capacity_per_worker: 2,
            horizon: 10,
            worker_availability: vec![5, 3, 1],
            task_duration: vec![4, 3, 2],
            task_deadline: vec![8, 10, 9],
        }
    }

    #[test]
    fn test_assignment_lines() {
        let lines = SolutionFormatter::format_assignments(&sample().assignment);
        assert_eq!(
            lines,
            "Worker 0 works on tasks: 0 2\nWorker 1 works on tasks: 1\nWorker 2 has no tasks\n"
        );
    }

    #[test]
    fn test_matrix_formatting() {
        let matrix = SolutionFormatter::format_matrix(&sample().assignment, &instance());
        assert!(matrix.contains("T0"));
        assert!(matrix.contains('■'));
        assert!(matrix.contains('·'));
        assert_eq!(matrix.lines().count(), 2 + 3);
    }

    #[test]
    fn test_summary_table() {
        let table = SolutionFormatter::format_solution_summary(&[sample()]);
        assert!(table.contains("Solutions Summary"));
        assert_eq!(table.lines().count(), 4);
    }

    #[test]
    fn test_save_solutions() {
        let dir = tempdir().unwrap();
        let solutions = vec![sample()];

        SolutionFormatter::save_solutions(&solutions, &instance(), dir.path(), &OutputFormat::Json)
            .unwrap();
        assert!(dir.path().join("solution_001.json").exists());
        assert!(dir.path().join("solutions_summary.json").exists());

        SolutionFormatter::save_solutions(&solutions, &instance(), dir.path(), &OutputFormat::Text)
            .unwrap();
        let text = std::fs::read_to_string(dir.path().join("solution_001.txt")).unwrap();
        assert!(text.contains("Worker 0 works on tasks: 0 2"));
    }

    #[test]
    fn test_color_output() {
        let colored = ColorOutput::colored("test", Color::Red);
        assert!(colored.contains("test"));
        assert!(ColorOutput::success("OK").contains("OK"));
    }
}
