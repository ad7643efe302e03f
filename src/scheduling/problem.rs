//! The worker/task assignment model built on the constraint engine

use super::{AssignmentMatrix, ProblemInstance, SchedulingError, Solution, SolutionValidator};
use crate::csp::{
    Assignment, Conjunction, Constraint, ConstraintRegistry, DomainStore, RegistryStatistics,
    Relation, SearchStatus, Solver, Termination, VariableId,
};
use itertools::iproduct;
use rayon::prelude::*;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Outcome of a search that ran to a verdict
#[derive(Debug, Clone)]
pub enum SolveOutcome {
    Solved(Solution),
    /// Proven: no assignment satisfies all constraints
    Infeasible,
}

impl SolveOutcome {
    pub fn solution(&self) -> Option<&Solution> {
        match self {
            SolveOutcome::Solved(solution) => Some(solution),
            SolveOutcome::Infeasible => None,
        }
    }

    pub fn is_infeasible(&self) -> bool {
        matches!(self, SolveOutcome::Infeasible)
    }
}

/// A solved assignment with the search counters at the time it was found
struct FoundAssignment {
    assignment: Assignment,
    solve_time: Duration,
    nodes: u64,
    backtracks: u64,
}

/// Binary assignment model: `x[w][t] = 1` iff worker `w` takes task `t`.
///
/// Posted constraints:
/// - per worker, `sum(x[w][*]) <= capacity`
/// - per task, `sum(x[*][t]) >= 1`
/// - per pair, `x[w][t] = 1 => availability[w] >= duration[t] and deadline[t] <= horizon`
///
/// Assignment variables are created first, row by row, so the search
/// branches on them in (worker, task) order.
pub struct AssignmentProblem {
    instance: ProblemInstance,
    store: DomainStore,
    registry: ConstraintRegistry,
    matrix: Vec<Vec<VariableId>>,
    validator: SolutionValidator,
}

impl AssignmentProblem {
    /// Validate the instance and build the model
    pub fn new(instance: ProblemInstance) -> Result<Self, SchedulingError> {
        instance.validate()?;

        let mut store = DomainStore::new();
        let mut registry = ConstraintRegistry::new();

        let mut matrix = Vec::with_capacity(instance.workers);
        for worker in 0..instance.workers {
            let row = (0..instance.tasks)
                .map(|task| {
                    store.create_named_variable(format!("assign_{}_{}", worker, task), 0, 1)
                })
                .collect::<Result<Vec<_>, _>>()?;
            matrix.push(row);
        }

        let availability: Vec<_> = instance
            .worker_availability
            .iter()
            .enumerate()
            .map(|(w, &a)| store.create_constant(format!("availability_{}", w), a))
            .collect();
        let duration: Vec<_> = instance
            .task_duration
            .iter()
            .enumerate()
            .map(|(t, &d)| store.create_constant(format!("duration_{}", t), d))
            .collect();
        let deadline: Vec<_> = instance
            .task_deadline
            .iter()
            .enumerate()
            .map(|(t, &d)| store.create_constant(format!("deadline_{}", t), d))
            .collect();

        for row in &matrix {
            registry.post(
                Constraint::linear_sum(row.clone(), Relation::LessEq, instance.capacity_per_worker),
                &store,
            )?;
        }

        for task in 0..instance.tasks {
            let column = matrix.iter().map(|row| row[task]).collect();
            registry.post(Constraint::linear_sum(column, Relation::GreaterEq, 1), &store)?;
        }

        for (worker, task) in iproduct!(0..instance.workers, 0..instance.tasks) {
            let consequence = Conjunction::new(vec![
                Constraint::arithmetic(availability[worker], Relation::GreaterEq, duration[task]),
                Constraint::arithmetic(deadline[task], Relation::LessEq, instance.horizon),
            ]);
            registry.post(
                Constraint::implication(matrix[worker][task], 1, consequence),
                &store,
            )?;
        }

        let validator = SolutionValidator::new(instance.clone())?;

        Ok(Self {
            instance,
            store,
            registry,
            matrix,
            validator,
        })
    }

    pub fn instance(&self) -> &ProblemInstance {
        &self.instance
    }

    pub fn store(&self) -> &DomainStore {
        &self.store
    }

    pub fn registry(&self) -> &ConstraintRegistry {
        &self.registry
    }

    /// The decision variable of `(worker, task)`
    pub fn assignment_variable(&self, worker: usize, task: usize) -> VariableId {
        self.matrix[worker][task]
    }

    /// Find the first assignment in search order
    pub fn solve<T: Termination>(
        &mut self,
        termination: T,
    ) -> Result<SolveOutcome, SchedulingError> {
        let mut solutions = self.solve_multiple(1, termination)?;
        Ok(match solutions.pop() {
            Some(solution) => SolveOutcome::Solved(solution),
            None => SolveOutcome::Infeasible,
        })
    }

    /// Find up to `max_solutions` assignments in search order.
    ///
    /// An empty result means the instance is infeasible. If the search is
    /// stopped before the first solution this is [`SchedulingError::Aborted`];
    /// if it is stopped later, the solutions found so far are returned.
    pub fn solve_multiple<T: Termination>(
        &mut self,
        max_solutions: usize,
        termination: T,
    ) -> Result<Vec<Solution>, SchedulingError> {
        let max_solutions = max_solutions.max(1);
        let start_time = Instant::now();

        info!(
            workers = self.instance.workers,
            tasks = self.instance.tasks,
            variables = self.store.len(),
            constraints = self.registry.len(),
            "solving assignment problem"
        );

        let mut found = Vec::new();
        let mut solver = Solver::new(&mut self.store, &self.registry, termination);
        let aborted = loop {
            if found.len() >= max_solutions {
                break false;
            }
            match solver.next_solution() {
                SearchStatus::Solved(assignment) => {
                    let stats = solver.statistics();
                    found.push(FoundAssignment {
                        assignment,
                        solve_time: start_time.elapsed(),
                        nodes: stats.nodes,
                        backtracks: stats.backtracks,
                    });
                }
                SearchStatus::Infeasible => break false,
                SearchStatus::Aborted => break true,
            }
        };
        let statistics = solver.statistics().clone();
        drop(solver);

        info!(
            solutions = found.len(),
            nodes = statistics.nodes,
            backtracks = statistics.backtracks,
            propagations = statistics.propagations,
            elapsed_ms = statistics.elapsed.as_millis() as u64,
            "search finished"
        );

        if aborted {
            if found.is_empty() {
                return Err(SchedulingError::Aborted {
                    nodes: statistics.nodes,
                });
            }
            warn!(
                solutions = found.len(),
                "search aborted, returning the solutions found so far"
            );
        }

        found
            .into_iter()
            .enumerate()
            .map(|(index, found)| self.checked_solution(index, found))
            .collect()
    }

    /// Convert a search result into a [`Solution`], re-checking it against
    /// the scheduling rules independently of the engine
    fn checked_solution(
        &self,
        index: usize,
        found: FoundAssignment,
    ) -> Result<Solution, SchedulingError> {
        let matrix = self.extract_matrix(&found.assignment);
        let validation = self.validator.validate(&matrix);
        if let Some(reason) = validation.error_message {
            error!(index, %reason, "solution failed validation");
            return Err(SchedulingError::UnsoundSolution { index, reason });
        }
        Ok(Solution::new(
            matrix,
            index,
            found.solve_time,
            found.nodes,
            found.backtracks,
        ))
    }

    fn extract_matrix(&self, assignment: &Assignment) -> AssignmentMatrix {
        let mut matrix = AssignmentMatrix::new(self.instance.workers, self.instance.tasks);
        for (worker, task) in iproduct!(0..self.instance.workers, 0..self.instance.tasks) {
            matrix.set(worker, task, assignment.value(self.matrix[worker][task]) == 1);
        }
        matrix
    }

    pub fn model_statistics(&self) -> ModelStatistics {
        let decision_variables = self.instance.workers * self.instance.tasks;
        ModelStatistics {
            total_variables: self.store.len(),
            decision_variables,
            constant_variables: self.store.len() - decision_variables,
            constraints: self.registry.statistics(),
        }
    }

    /// Cheap necessary conditions checked without search
    pub fn estimate_feasibility(&self) -> FeasibilityEstimate {
        let instance = &self.instance;
        let eligible_workers: Vec<usize> = (0..instance.tasks)
            .map(|task| instance.eligible_workers(task).len())
            .collect();
        let uncoverable_tasks: Vec<usize> = eligible_workers
            .iter()
            .enumerate()
            .filter(|(_, &count)| count == 0)
            .map(|(task, _)| task)
            .collect();
        let total_capacity = instance.workers as i64 * instance.capacity_per_worker;

        let short_of_capacity = total_capacity < instance.tasks as i64;
        let likelihood = if !uncoverable_tasks.is_empty() || short_of_capacity {
            FeasibilityLikelihood::Infeasible
        } else if eligible_workers.iter().any(|&count| count == 1) {
            FeasibilityLikelihood::Tight
        } else {
            FeasibilityLikelihood::Likely
        };

        let recommendations = self.generate_recommendations(&uncoverable_tasks, total_capacity);

        FeasibilityEstimate {
            likelihood,
            total_capacity,
            eligible_workers,
            uncoverable_tasks,
            recommendations,
        }
    }

    fn generate_recommendations(
        &self,
        uncoverable_tasks: &[usize],
        total_capacity: i64,
    ) -> Vec<String> {
        let instance = &self.instance;
        let mut recommendations = Vec::new();

        for &task in uncoverable_tasks {
            if instance.task_deadline[task] > instance.horizon {
                recommendations.push(format!(
                    "Task {} has deadline {} beyond the horizon {}; extend the horizon",
                    task, instance.task_deadline[task], instance.horizon
                ));
            } else {
                recommendations.push(format!(
                    "No worker has {} time units available for task {}",
                    instance.task_duration[task], task
                ));
            }
        }

        if total_capacity < instance.tasks as i64 {
            recommendations.push(format!(
                "Total capacity {} is below the {} tasks to cover; raise the capacity per worker",
                total_capacity, instance.tasks
            ));
        }

        if recommendations.is_empty() {
            recommendations.push("Problem looks reasonable to solve".to_string());
        }

        recommendations
    }
}

/// Solve independent instances in parallel.
///
/// Every instance gets its own store and registry; `termination` is called
/// once per instance.
pub fn solve_batch<T, F>(
    instances: &[ProblemInstance],
    termination: F,
) -> Vec<Result<SolveOutcome, SchedulingError>>
where
    T: Termination,
    F: Fn() -> T + Sync,
{
    instances
        .par_iter()
        .map(|instance| {
            let mut problem = AssignmentProblem::new(instance.clone())?;
            problem.solve(termination())
        })
        .collect()
}

/// Size of the generated model
#[derive(Debug, Clone)]
pub struct ModelStatistics {
    pub total_variables: usize,
    pub decision_variables: usize,
    pub constant_variables: usize,
    pub constraints: RegistryStatistics,
}

impl fmt::Display for ModelStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Model Statistics:")?;
        writeln!(f, "  Total variables: {}", self.total_variables)?;
        writeln!(f, "  Decision variables: {}", self.decision_variables)?;
        writeln!(f, "  Constant variables: {}", self.constant_variables)?;
        write!(f, "{}", self.constraints)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeasibilityLikelihood {
    /// A necessary condition fails; search will report infeasible
    Infeasible,
    /// Some task has a single eligible worker
    Tight,
    Likely,
}

/// Estimate of whether an assignment exists
#[derive(Debug, Clone)]
pub struct FeasibilityEstimate {
    pub likelihood: FeasibilityLikelihood,
    pub total_capacity: i64,
    /// Eligible workers per task
    pub eligible_workers: Vec<usize>,
    pub uncoverable_tasks: Vec<usize>,
    pub recommendations: Vec<String>,
}

impl fmt::Display for FeasibilityEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Feasibility Estimate:")?;
        writeln!(f, "  Likelihood: {:?}", self.likelihood)?;
        writeln!(f, "  Total capacity: {}", self.total_capacity)?;
        writeln!(f, "  Eligible workers per task: {:?}", self.eligible_workers)?;
        writeln!(f, "  Recommendations:")?;
        for rec in &self.recommendations {
            writeln!(f, "    - {}", rec)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csp::{Indefinite, NodeLimit, StopFlag};
    use proptest::prelude::*;

    fn infeasible_instance() -> ProblemInstance {
        ProblemInstance {
            workers: 1,
            tasks: 2,
            capacity_per_worker: 2,
            horizon: 12,
            worker_availability: vec![1],
            task_duration: vec![5, 5],
            task_deadline: vec![5, 5],
        }
    }

    fn assert_valid(instance: &ProblemInstance, matrix: &AssignmentMatrix) {
        for worker in 0..instance.workers {
            assert!(matrix.row_sum(worker) as i64 <= instance.capacity_per_worker);
        }
        for task in 0..instance.tasks {
            assert!(matrix.column_sum(task) >= 1);
        }
        for (worker, task) in iproduct!(0..instance.workers, 0..instance.tasks) {
            if matrix.get(worker, task) {
                assert!(instance.worker_availability[worker] >= instance.task_duration[task]);
                assert!(instance.task_deadline[task] <= instance.horizon);
            }
        }
    }

    /// Exhaustive check over every 0/1 matrix
    fn brute_force_feasible(instance: &ProblemInstance) -> bool {
        let cells = instance.workers * instance.tasks;
        let validator = SolutionValidator::new(instance.clone()).unwrap();
        (0u32..1 << cells).any(|bits| {
            let mut matrix = AssignmentMatrix::new(instance.workers, instance.tasks);
            for (worker, task) in iproduct!(0..instance.workers, 0..instance.tasks) {
                let bit = worker * instance.tasks + task;
                matrix.set(worker, task, bits & (1 << bit) != 0);
            }
            validator.validate(&matrix).is_valid
        })
    }

    #[test]
    fn test_model_shape() {
        let problem = AssignmentProblem::new(ProblemInstance::default()).unwrap();
        let stats = problem.model_statistics();

        assert_eq!(stats.decision_variables, 20);
        assert_eq!(stats.constant_variables, 4 + 5 + 5);
        assert_eq!(stats.constraints.linear_sums, 4 + 5);
        assert_eq!(stats.constraints.implications, 20);
        assert_eq!(problem.assignment_variable(1, 2).index(), 7);
        assert_eq!(problem.store().name(problem.assignment_variable(3, 4)), "assign_3_4");
    }

    #[test]
    fn test_concrete_scenario() {
        let instance = ProblemInstance::default();
        let mut problem = AssignmentProblem::new(instance.clone()).unwrap();

        let outcome = problem.solve(Indefinite).unwrap();
        let solution = outcome.solution().expect("scenario is feasible");
        assert_valid(&instance, &solution.assignment);
    }

    #[test]
    fn test_infeasible_scenario() {
        let mut problem = AssignmentProblem::new(infeasible_instance()).unwrap();
        let outcome = problem.solve(Indefinite).unwrap();
        assert!(outcome.is_infeasible());
    }

    #[test]
    fn test_invalid_problem_fails_before_search() {
        let instance = ProblemInstance {
            task_duration: vec![5, -1],
            ..infeasible_instance()
        };
        assert!(matches!(
            AssignmentProblem::new(instance),
            Err(SchedulingError::InvalidProblem(_))
        ));
    }

    #[test]
    fn test_deterministic() {
        let first = AssignmentProblem::new(ProblemInstance::default())
            .unwrap()
            .solve_multiple(5, Indefinite)
            .unwrap();
        let second = AssignmentProblem::new(ProblemInstance::default())
            .unwrap()
            .solve_multiple(5, Indefinite)
            .unwrap();

        let first: Vec<_> = first.iter().map(|s| s.to_json().unwrap()).collect();
        let second: Vec<_> = second.iter().map(|s| s.to_json().unwrap()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_solutions_are_distinct_and_sound() {
        let instance = ProblemInstance::default();
        let mut problem = AssignmentProblem::new(instance.clone()).unwrap();
        let solutions = problem.solve_multiple(10, Indefinite).unwrap();

        assert_eq!(solutions.len(), 10);
        for (i, solution) in solutions.iter().enumerate() {
            assert_eq!(solution.metadata.index, i);
            assert_valid(&instance, &solution.assignment);
        }
        let mut ids: Vec<_> = solutions.iter().map(|s| s.metadata.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 10);
    }

    #[test]
    fn test_resolving_gives_same_answer() {
        let mut problem = AssignmentProblem::new(ProblemInstance::default()).unwrap();
        let first = problem.solve(Indefinite).unwrap();
        let second = problem.solve(Indefinite).unwrap();
        assert_eq!(
            first.solution().map(|s| s.assignment.clone()),
            second.solution().map(|s| s.assignment.clone())
        );
    }

    #[test]
    fn test_abort_is_distinct_from_infeasible() {
        let mut problem = AssignmentProblem::new(ProblemInstance::default()).unwrap();
        let flag = StopFlag::new();
        flag.raise();

        assert!(matches!(
            problem.solve(flag),
            Err(SchedulingError::Aborted { nodes: 0 })
        ));
    }

    #[test]
    fn test_abort_leaves_model_usable() {
        let mut problem = AssignmentProblem::new(ProblemInstance::default()).unwrap();
        let before = problem.store().snapshot();

        let result = problem.solve(NodeLimit::new(2));
        assert!(matches!(result, Err(SchedulingError::Aborted { .. })));
        assert_eq!(problem.store().checkpoint(), 0);
        // Only root-level propagation may remain
        for (after, before) in problem.store().snapshot().iter().zip(&before) {
            assert!(after.iter().all(|v| before.contains(v)));
        }

        assert!(problem.solve(Indefinite).unwrap().solution().is_some());
    }

    #[test]
    fn test_soundness_against_registry() {
        let mut problem = AssignmentProblem::new(ProblemInstance::default()).unwrap();
        let solution = problem.solve(Indefinite).unwrap().solution().cloned().unwrap();

        let mut values = Vec::new();
        for (worker, task) in iproduct!(0..4, 0..5) {
            values.push(i64::from(solution.assignment.get(worker, task)));
        }
        values.extend(problem.instance().worker_availability.iter().copied());
        values.extend(problem.instance().task_duration.iter().copied());
        values.extend(problem.instance().task_deadline.iter().copied());

        let assignment = Assignment::new(values);
        assert!(problem.registry().is_satisfied_by(&assignment));
    }

    #[test]
    fn test_unsound_assignment_is_an_error() {
        let problem = AssignmentProblem::new(ProblemInstance::default()).unwrap();
        let found = FoundAssignment {
            // Nothing assigned: every task is uncovered
            assignment: Assignment::new(vec![0; problem.store().len()]),
            solve_time: Duration::ZERO,
            nodes: 1,
            backtracks: 0,
        };

        match problem.checked_solution(2, found) {
            Err(SchedulingError::UnsoundSolution { index, reason }) => {
                assert_eq!(index, 2);
                assert!(reason.contains("Task 0 has no worker"), "{}", reason);
            }
            other => panic!("expected an unsound solution error, got {:?}", other),
        }
    }

    #[test]
    fn test_sound_assignment_is_accepted() {
        let problem = AssignmentProblem::new(ProblemInstance::default()).unwrap();
        let rows = [
            vec![1, 0, 1, 0, 0],
            vec![0, 1, 0, 0, 1],
            vec![0, 0, 0, 1, 0],
            vec![0, 0, 0, 0, 0],
        ];
        let mut values: Vec<i64> = rows.iter().flatten().copied().collect();
        values.resize(problem.store().len(), 0);
        let found = FoundAssignment {
            assignment: Assignment::new(values),
            solve_time: Duration::ZERO,
            nodes: 1,
            backtracks: 0,
        };

        let solution = problem.checked_solution(0, found).unwrap();
        assert_eq!(solution.metadata.workload, vec![2, 2, 1, 0]);
    }

    #[test]
    fn test_feasibility_estimate() {
        let problem = AssignmentProblem::new(ProblemInstance::default()).unwrap();
        let estimate = problem.estimate_feasibility();
        assert_eq!(estimate.eligible_workers, vec![4, 4, 2, 4, 3]);
        assert_eq!(estimate.likelihood, FeasibilityLikelihood::Likely);
        assert_eq!(estimate.total_capacity, 8);

        let problem = AssignmentProblem::new(infeasible_instance()).unwrap();
        let estimate = problem.estimate_feasibility();
        assert_eq!(estimate.likelihood, FeasibilityLikelihood::Infeasible);
        assert_eq!(estimate.uncoverable_tasks, vec![0, 1]);
        assert_eq!(estimate.recommendations.len(), 2);
    }

    #[test]
    fn test_zero_tasks_is_trivially_solved() {
        let instance = ProblemInstance {
            workers: 2,
            tasks: 0,
            capacity_per_worker: 0,
            horizon: 0,
            worker_availability: vec![1, 1],
            task_duration: vec![],
            task_deadline: vec![],
        };
        let mut problem = AssignmentProblem::new(instance).unwrap();
        let outcome = problem.solve(Indefinite).unwrap();
        assert_eq!(outcome.solution().unwrap().assignment.total_assigned(), 0);
    }

    #[test]
    fn test_solve_batch() {
        let instances = vec![
            ProblemInstance::default(),
            infeasible_instance(),
            ProblemInstance {
                workers: 7,
                ..ProblemInstance::default()
            },
        ];

        let results = solve_batch(&instances, || Indefinite);
        assert_eq!(results.len(), 3);
        assert!(results[0].as_ref().unwrap().solution().is_some());
        assert!(results[1].as_ref().unwrap().is_infeasible());
        assert!(matches!(results[2], Err(SchedulingError::InvalidProblem(_))));
    }

    fn small_instance() -> impl Strategy<Value = ProblemInstance> {
        (1usize..=3, 1usize..=3, 0i64..=2, 3i64..=8).prop_flat_map(
            |(workers, tasks, capacity, horizon)| {
                (
                    prop::collection::vec(0i64..=8, workers),
                    prop::collection::vec(1i64..=8, tasks),
                    prop::collection::vec(0i64..=10, tasks),
                )
                    .prop_map(move |(availability, duration, deadline)| ProblemInstance {
                        workers,
                        tasks,
                        capacity_per_worker: capacity,
                        horizon,
                        worker_availability: availability,
                        task_duration: duration,
                        task_deadline: deadline,
                    })
            },
        )
    }

    proptest! {
        #[test]
        fn prop_verdict_matches_exhaustive_enumeration(instance in small_instance()) {
            let expected = brute_force_feasible(&instance);
            let mut problem = AssignmentProblem::new(instance.clone()).unwrap();
            let outcome = problem.solve(Indefinite).unwrap();

            prop_assert_eq!(outcome.solution().is_some(), expected);
            if let Some(solution) = outcome.solution() {
                let validator = SolutionValidator::new(instance).unwrap();
                prop_assert!(validator.validate(&solution.assignment).is_valid);
            }
        }

        #[test]
        fn prop_enumeration_finds_every_solution_once(instance in small_instance()) {
            let cells = instance.workers * instance.tasks;
            let validator = SolutionValidator::new(instance.clone()).unwrap();
            let expected = (0u32..1 << cells)
                .filter(|bits| {
                    let mut matrix = AssignmentMatrix::new(instance.workers, instance.tasks);
                    for (worker, task) in iproduct!(0..instance.workers, 0..instance.tasks) {
                        let bit = worker * instance.tasks + task;
                        matrix.set(worker, task, bits & (1 << bit) != 0);
                    }
                    validator.validate(&matrix).is_valid
                })
                .count();

            let mut problem = AssignmentProblem::new(instance).unwrap();
            let solutions = problem.solve_multiple(1 << cells, Indefinite).unwrap();
            prop_assert_eq!(solutions.len(), expected);
        }
    }
}
