//! Depth-first backtracking search

use super::{
    Assignment, ConstraintRegistry, DomainStore, PropagationEngine, Termination, VariableId,
};
use std::time::{Duration, Instant};
use tracing::debug;

/// Counters describing a search run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchStatistics {
    /// Search nodes entered, the root included
    pub nodes: u64,
    /// Values tried on branching variables
    pub decisions: u64,
    /// Decisions undone after a contradiction
    pub backtracks: u64,
    pub solutions: u64,
    /// Individual constraint propagations
    pub propagations: u64,
    pub max_depth: usize,
    pub elapsed: Duration,
}

impl std::fmt::Display for SearchStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Search Statistics:")?;
        writeln!(f, "  Nodes: {}", self.nodes)?;
        writeln!(f, "  Decisions: {}", self.decisions)?;
        writeln!(f, "  Backtracks: {}", self.backtracks)?;
        writeln!(f, "  Solutions: {}", self.solutions)?;
        writeln!(f, "  Propagations: {}", self.propagations)?;
        writeln!(f, "  Max depth: {}", self.max_depth)?;
        writeln!(f, "  Elapsed: {:.3}s", self.elapsed.as_secs_f64())?;
        Ok(())
    }
}

/// Terminal state of a call to [`Solver::next_solution`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchStatus {
    /// Every variable is fixed and every constraint holds
    Solved(Assignment),
    /// The search space is exhausted
    Infeasible,
    /// The termination condition fired before a solution was reached
    Aborted,
}

/// A search node: the branching variable and the last value tried on it.
///
/// The next value is read from the variable's domain whenever the store
/// is back at this node's state, so wide domains are never materialised.
#[derive(Debug)]
struct Frame {
    variable: VariableId,
    last_tried: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Root,
    Searching,
    /// The top frame's decision led to a solution that was handed out
    Resume,
    Exhausted,
    Aborted,
}

/// Backtracking search over a domain store and constraint registry.
///
/// Branches on the lowest-index unfixed variable and tries its values in
/// ascending order, propagating to a fixed point after every decision.
/// Each decision opens a trail checkpoint in the store, so undoing a branch
/// is a single [`DomainStore::backtrack`]. Nodes live on an explicit stack
/// rather than the call stack.
///
/// The solver can be resumed after a solution to enumerate further ones in
/// the same deterministic order.
#[derive(Debug)]
pub struct Solver<'a, T: Termination> {
    store: &'a mut DomainStore,
    registry: &'a ConstraintRegistry,
    termination: T,
    engine: PropagationEngine,
    stack: Vec<Frame>,
    root_level: usize,
    phase: Phase,
    statistics: SearchStatistics,
}

impl<'a, T: Termination> Solver<'a, T> {
    pub fn new(
        store: &'a mut DomainStore,
        registry: &'a ConstraintRegistry,
        termination: T,
    ) -> Self {
        let root_level = store.checkpoint();
        Self {
            store,
            registry,
            termination,
            engine: PropagationEngine::new(),
            stack: Vec::new(),
            root_level,
            phase: Phase::Root,
            statistics: SearchStatistics::default(),
        }
    }

    pub fn statistics(&self) -> &SearchStatistics {
        &self.statistics
    }

    /// The store as the search left it: a solution's state after `Solved`
    pub fn store(&self) -> &DomainStore {
        &*self.store
    }

    /// Search for the next solution in search order
    pub fn next_solution(&mut self) -> SearchStatus {
        let start = Instant::now();
        let status = self.run();
        self.statistics.elapsed += start.elapsed();
        self.statistics.propagations = self.engine.propagations();
        status
    }

    fn run(&mut self) -> SearchStatus {
        match self.phase {
            Phase::Exhausted => return SearchStatus::Infeasible,
            Phase::Aborted => return SearchStatus::Aborted,
            Phase::Root => {
                if self.termination.should_stop(&self.statistics) {
                    return self.abort();
                }
                self.phase = Phase::Searching;

                // Root propagation is kept: it holds for every solution.
                self.engine.enqueue_all(self.registry);
                if self.engine.propagate(self.store, self.registry).is_err() {
                    debug!("root propagation failed");
                    return self.exhaust();
                }
                if let Some(status) = self.expand() {
                    return status;
                }
            }
            Phase::Resume => {
                self.phase = Phase::Searching;
                if self.stack.is_empty() {
                    // The root itself was the only solution
                    return self.exhaust();
                }
                self.store.backtrack();
            }
            Phase::Searching => {}
        }

        loop {
            let Some(frame) = self.stack.last_mut() else {
                return self.exhaust();
            };
            let variable = frame.variable;
            let next = self.store.domain(variable).next_value(frame.last_tried);
            frame.last_tried = next;

            let Some(value) = next else {
                self.stack.pop();
                if self.stack.is_empty() {
                    return self.exhaust();
                }
                // Undo the parent's decision before trying its next value
                self.store.backtrack();
                continue;
            };

            self.statistics.decisions += 1;
            self.store.new_checkpoint();

            let consistent = self.store.restrict_to(variable, value).is_ok()
                && self.engine.propagate(self.store, self.registry).is_ok();
            if !consistent {
                self.statistics.backtracks += 1;
                self.store.backtrack();
                continue;
            }

            if let Some(status) = self.expand() {
                return status;
            }
        }
    }

    /// Enter a new node below the current state.
    ///
    /// Returns a terminal status if the node is a solution or the search
    /// must stop; otherwise pushes a frame and lets the main loop branch.
    fn expand(&mut self) -> Option<SearchStatus> {
        if self.termination.should_stop(&self.statistics) {
            return Some(self.abort());
        }
        self.statistics.nodes += 1;

        let Some(variable) = self.store.first_unfixed() else {
            self.statistics.solutions += 1;
            self.phase = Phase::Resume;
            debug!(
                depth = self.stack.len(),
                nodes = self.statistics.nodes,
                "solution found"
            );
            // Every domain is a singleton here, so its lower bound is its value
            let values = self
                .store
                .variables()
                .map(|id| self.store.lower_bound(id))
                .collect();
            return Some(SearchStatus::Solved(Assignment::new(values)));
        };

        self.stack.push(Frame {
            variable,
            last_tried: None,
        });
        self.statistics.max_depth = self.statistics.max_depth.max(self.stack.len());
        None
    }

    fn abort(&mut self) -> SearchStatus {
        debug!(nodes = self.statistics.nodes, "search aborted");
        self.stack.clear();
        self.store.backtrack_to(self.root_level);
        self.phase = Phase::Aborted;
        SearchStatus::Aborted
    }

    fn exhaust(&mut self) -> SearchStatus {
        self.stack.clear();
        self.store.backtrack_to(self.root_level);
        self.phase = Phase::Exhausted;
        SearchStatus::Infeasible
    }
}

/// Leaves the store at the state it had when the solver was created, plus
/// root propagation.
impl<'a, T: Termination> Drop for Solver<'a, T> {
    fn drop(&mut self) {
        self.store.backtrack_to(self.root_level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csp::{Conjunction, Constraint, Domain, Indefinite, NodeLimit, Relation, StopFlag};

    fn exactly_one_of(count: usize) -> (DomainStore, ConstraintRegistry, Vec<VariableId>) {
        let mut store = DomainStore::new();
        let vars: Vec<_> = (0..count).map(|_| store.create_variable(0, 1).unwrap()).collect();
        let mut registry = ConstraintRegistry::new();
        registry
            .post(Constraint::linear_sum(vars.clone(), Relation::Equal, 1), &store)
            .unwrap();
        (store, registry, vars)
    }

    #[test]
    fn test_finds_first_solution_in_ascending_order() {
        let (mut store, registry, _) = exactly_one_of(3);
        let mut solver = Solver::new(&mut store, &registry, Indefinite);

        // x0 = 0, x1 = 0 forces x2 = 1
        assert_eq!(
            solver.next_solution(),
            SearchStatus::Solved(Assignment::new(vec![0, 0, 1]))
        );
    }

    #[test]
    fn test_enumerates_all_solutions_then_infeasible() {
        let (mut store, registry, _) = exactly_one_of(3);
        let mut solver = Solver::new(&mut store, &registry, Indefinite);

        let mut solutions = Vec::new();
        while let SearchStatus::Solved(assignment) = solver.next_solution() {
            solutions.push(assignment.values().to_vec());
        }

        assert_eq!(solutions, vec![vec![0, 0, 1], vec![0, 1, 0], vec![1, 0, 0]]);
        assert_eq!(solver.statistics().solutions, 3);
        assert_eq!(solver.next_solution(), SearchStatus::Infeasible);
    }

    #[test]
    fn test_dropping_after_solution_restores_root() {
        let (mut store, registry, vars) = exactly_one_of(3);
        let mut solver = Solver::new(&mut store, &registry, Indefinite);
        assert!(matches!(solver.next_solution(), SearchStatus::Solved(_)));
        drop(solver);

        assert_eq!(store.checkpoint(), 0);
        assert!(vars.iter().all(|&v| !store.is_fixed(v)));
    }

    #[test]
    fn test_infeasible_restores_root_state() {
        let mut store = DomainStore::new();
        let x = store.create_variable(0, 2).unwrap();
        let y = store.create_variable(0, 2).unwrap();
        let mut registry = ConstraintRegistry::new();
        registry
            .post(Constraint::linear_sum(vec![x, y], Relation::Equal, 3), &store)
            .unwrap();
        registry
            .post(Constraint::arithmetic(x, Relation::Equal, y), &store)
            .unwrap();
        let before = store.snapshot();

        let mut solver = Solver::new(&mut store, &registry, Indefinite);
        assert_eq!(solver.next_solution(), SearchStatus::Infeasible);
        assert!(solver.statistics().backtracks > 0);
        drop(solver);

        assert_eq!(store.checkpoint(), 0);
        // Only root propagation remains; it never removes a value that some
        // branch could have used.
        assert_eq!(store.domain(x).iter().collect::<Vec<_>>(), vec![1, 2]);
        assert_ne!(store.snapshot(), before);
    }

    #[test]
    fn test_root_contradiction_is_infeasible() {
        let mut store = DomainStore::new();
        let x = store.create_variable(0, 1).unwrap();
        let mut registry = ConstraintRegistry::new();
        registry
            .post(Constraint::arithmetic(x, Relation::GreaterEq, 2), &store)
            .unwrap();

        let mut solver = Solver::new(&mut store, &registry, Indefinite);
        assert_eq!(solver.next_solution(), SearchStatus::Infeasible);
        assert_eq!(solver.statistics().decisions, 0);
    }

    #[test]
    fn test_already_fixed_problem_has_one_solution() {
        let mut store = DomainStore::new();
        store.create_constant("c", 4);
        let registry = ConstraintRegistry::new();

        let mut solver = Solver::new(&mut store, &registry, Indefinite);
        assert_eq!(
            solver.next_solution(),
            SearchStatus::Solved(Assignment::new(vec![4]))
        );
        assert_eq!(solver.next_solution(), SearchStatus::Infeasible);
    }

    #[test]
    fn test_abort_before_search() {
        let (mut store, registry, _) = exactly_one_of(4);
        let before = store.snapshot();
        let flag = StopFlag::new();
        flag.raise();

        let mut solver = Solver::new(&mut store, &registry, flag);
        assert_eq!(solver.next_solution(), SearchStatus::Aborted);
        assert_eq!(solver.next_solution(), SearchStatus::Aborted);
        assert_eq!(solver.statistics().nodes, 0);
        drop(solver);

        assert_eq!(store.snapshot(), before);
        assert_eq!(store.checkpoint(), 0);
    }

    #[test]
    fn test_abort_mid_search_leaves_store_restorable() {
        let (mut store, registry, vars) = exactly_one_of(6);
        let mut solver = Solver::new(&mut store, &registry, NodeLimit::new(3));

        assert_eq!(solver.next_solution(), SearchStatus::Aborted);
        assert_eq!(solver.statistics().nodes, 3);
        drop(solver);

        assert_eq!(store.checkpoint(), 0);
        assert!(vars.iter().all(|&v| store.domain(v).len() == 2));

        // The same store can be searched again from scratch
        let mut solver = Solver::new(&mut store, &registry, Indefinite);
        assert!(matches!(solver.next_solution(), SearchStatus::Solved(_)));
    }

    #[test]
    fn test_backtracking_restores_decision_state() {
        // x0 = 0 fails only after propagation, so the store must return to
        // exactly the node state before x0 = 1 is tried.
        let mut store = DomainStore::new();
        let x = store.create_variable(0, 1).unwrap();
        let y = store.create_variable(0, 3).unwrap();
        let mut registry = ConstraintRegistry::new();
        registry
            .post(
                Constraint::implication(
                    x,
                    0,
                    Conjunction::new(vec![
                        Constraint::arithmetic(y, Relation::GreaterEq, 2),
                        Constraint::arithmetic(y, Relation::LessEq, 1),
                    ]),
                ),
                &store,
            )
            .unwrap();

        let mut solver = Solver::new(&mut store, &registry, Indefinite);
        assert_eq!(
            solver.next_solution(),
            SearchStatus::Solved(Assignment::new(vec![1, 0]))
        );
        assert_eq!(solver.statistics().backtracks, 1);
    }

    #[test]
    fn test_failed_decision_leaves_no_trace() {
        // x = 0 prunes w and z before failing on z; after it is undone the
        // search must continue from exactly the state it had before x = 0.
        let mut store = DomainStore::new();
        let x = store.create_variable(0, 1).unwrap();
        let z = store.create_variable(0, 3).unwrap();
        let w = store.create_variable(0, 5).unwrap();
        let mut registry = ConstraintRegistry::new();
        registry
            .post(
                Constraint::implication(
                    x,
                    0,
                    Conjunction::new(vec![
                        Constraint::arithmetic(w, Relation::GreaterEq, 3),
                        Constraint::arithmetic(z, Relation::GreaterEq, 2),
                        Constraint::arithmetic(z, Relation::LessEq, 1),
                    ]),
                ),
                &store,
            )
            .unwrap();
        let before = store.snapshot();

        let mut solver = Solver::new(&mut store, &registry, Indefinite);
        assert_eq!(
            solver.next_solution(),
            SearchStatus::Solved(Assignment::new(vec![1, 0, 0]))
        );
        assert_eq!(solver.statistics().backtracks, 1);

        // The state is the pre-decision snapshot plus the three successful
        // decisions, and the trail holds only those decisions.
        let mut expected = before.clone();
        expected[x.index()] = Domain::singleton(1);
        expected[z.index()] = Domain::singleton(0);
        expected[w.index()] = Domain::singleton(0);
        assert_eq!(solver.store().snapshot(), expected);
        assert_eq!(solver.store().checkpoint(), 3);
        assert_eq!(solver.store().trail_len(), 3);
        drop(solver);

        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_branches_on_wide_domain_lazily() {
        let mut store = DomainStore::new();
        let x = store.create_variable(0, i64::MAX).unwrap();
        let mut registry = ConstraintRegistry::new();
        registry
            .post(Constraint::arithmetic(x, Relation::GreaterEq, 1_000_000), &store)
            .unwrap();

        let mut solver = Solver::new(&mut store, &registry, Indefinite);
        assert_eq!(
            solver.next_solution(),
            SearchStatus::Solved(Assignment::new(vec![1_000_000]))
        );
        assert_eq!(
            solver.next_solution(),
            SearchStatus::Solved(Assignment::new(vec![1_000_001]))
        );
    }

    #[test]
    fn test_solutions_satisfy_every_constraint() {
        let mut store = DomainStore::new();
        let vars: Vec<_> = (0..5).map(|_| store.create_variable(0, 3).unwrap()).collect();
        let mut registry = ConstraintRegistry::new();
        registry
            .post(Constraint::linear_sum(vars.clone(), Relation::Equal, 7), &store)
            .unwrap();
        registry
            .post(Constraint::arithmetic(vars[0], Relation::GreaterEq, vars[4]), &store)
            .unwrap();
        registry
            .post(Constraint::arithmetic(vars[2], Relation::Equal, vars[3]), &store)
            .unwrap();

        let mut solver = Solver::new(&mut store, &registry, Indefinite);
        let mut count = 0;
        while let SearchStatus::Solved(assignment) = solver.next_solution() {
            assert!(registry.is_satisfied_by(&assignment));
            count += 1;
        }

        // Brute-force count for comparison
        let expected = itertools::iproduct!(0..4, 0..4, 0..4, 0..4, 0..4)
            .filter(|&(a, b, c, d, e)| a + b + c + d + e == 7 && a >= e && c == d)
            .count();
        assert_eq!(count, expected);
    }
}
