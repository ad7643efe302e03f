//! Constraint kinds and the registry they are posted into

use super::{Assignment, Contradiction, DomainStore, ModelError, VariableId};
use itertools::Itertools;
use std::fmt;

/// Comparison used by linear sums and arithmetic constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    LessEq,
    GreaterEq,
    Equal,
}

impl Relation {
    pub fn holds(self, left: i64, right: i64) -> bool {
        match self {
            Relation::LessEq => left <= right,
            Relation::GreaterEq => left >= right,
            Relation::Equal => left == right,
        }
    }

    fn bounds_above(self) -> bool {
        matches!(self, Relation::LessEq | Relation::Equal)
    }

    fn bounds_below(self) -> bool {
        matches!(self, Relation::GreaterEq | Relation::Equal)
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Relation::LessEq => "<=",
            Relation::GreaterEq => ">=",
            Relation::Equal => "=",
        };
        write!(f, "{}", symbol)
    }
}

/// Outcome of a propagation step that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationStatus {
    NoChange,
    Changed,
}

impl PropagationStatus {
    fn from_changed(changed: bool) -> Self {
        if changed {
            PropagationStatus::Changed
        } else {
            PropagationStatus::NoChange
        }
    }

    pub fn is_changed(self) -> bool {
        self == PropagationStatus::Changed
    }
}

/// Right-hand side of an arithmetic constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Variable(VariableId),
    Constant(i64),
}

impl From<VariableId> for Operand {
    fn from(variable: VariableId) -> Self {
        Operand::Variable(variable)
    }
}

impl From<i64> for Operand {
    fn from(value: i64) -> Self {
        Operand::Constant(value)
    }
}

/// `sum(variables) <relation> bound`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearSum {
    variables: Vec<VariableId>,
    relation: Relation,
    bound: i64,
}

impl LinearSum {
    pub fn new(variables: Vec<VariableId>, relation: Relation, bound: i64) -> Self {
        Self {
            variables,
            relation,
            bound,
        }
    }

    pub fn evaluate(&self, assignment: &Assignment) -> bool {
        let sum: i64 = self.variables.iter().map(|&v| assignment.value(v)).sum();
        self.relation.holds(sum, self.bound)
    }

    pub fn propagate(&self, store: &mut DomainStore) -> Result<PropagationStatus, Contradiction> {
        let mut changed = false;
        if self.relation.bounds_above() {
            changed |= self.propagate_upper(store)?;
        }
        if self.relation.bounds_below() {
            changed |= self.propagate_lower(store)?;
        }
        Ok(PropagationStatus::from_changed(changed))
    }

    /// `sum <= bound`: each variable may use at most what the others leave
    fn propagate_upper(&self, store: &mut DomainStore) -> Result<bool, Contradiction> {
        let bound = i128::from(self.bound);
        let min_sum: i128 = self
            .variables
            .iter()
            .map(|&v| i128::from(store.lower_bound(v)))
            .sum();
        if min_sum > bound {
            return Err(Contradiction::Unsatisfiable);
        }

        let mut changed = false;
        for &variable in &self.variables {
            let slack = bound - (min_sum - i128::from(store.lower_bound(variable)));
            changed |= store.tighten_upper(variable, saturate(slack))?;
        }
        Ok(changed)
    }

    /// `sum >= bound`: each variable must cover what the others cannot reach
    fn propagate_lower(&self, store: &mut DomainStore) -> Result<bool, Contradiction> {
        let bound = i128::from(self.bound);
        let max_sum: i128 = self
            .variables
            .iter()
            .map(|&v| i128::from(store.upper_bound(v)))
            .sum();
        if max_sum < bound {
            return Err(Contradiction::Unsatisfiable);
        }

        let mut changed = false;
        for &variable in &self.variables {
            let required = bound - (max_sum - i128::from(store.upper_bound(variable)));
            changed |= store.tighten_lower(variable, saturate(required))?;
        }
        Ok(changed)
    }

    pub fn variables(&self) -> &[VariableId] {
        &self.variables
    }
}

/// Sums are computed in i128 so wide domains cannot overflow
fn saturate(value: i128) -> i64 {
    value.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

/// `left <relation> right`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arithmetic {
    left: VariableId,
    relation: Relation,
    right: Operand,
}

impl Arithmetic {
    pub fn new(left: VariableId, relation: Relation, right: impl Into<Operand>) -> Self {
        Self {
            left,
            relation,
            right: right.into(),
        }
    }

    pub fn evaluate(&self, assignment: &Assignment) -> bool {
        let right = match self.right {
            Operand::Variable(v) => assignment.value(v),
            Operand::Constant(c) => c,
        };
        self.relation.holds(assignment.value(self.left), right)
    }

    pub fn propagate(&self, store: &mut DomainStore) -> Result<PropagationStatus, Contradiction> {
        let left = self.left;
        let changed = match (self.relation, self.right) {
            (Relation::Equal, Operand::Constant(c)) => store.restrict_to(left, c)?,
            (Relation::Equal, Operand::Variable(right)) => {
                let right_domain = store.domain(right).clone();
                let mut changed = store.intersect(left, &right_domain)?;
                let left_domain = store.domain(left).clone();
                changed |= store.intersect(right, &left_domain)?;
                changed
            }
            (Relation::LessEq, Operand::Constant(c)) => store.tighten_upper(left, c)?,
            (Relation::LessEq, Operand::Variable(right)) => {
                let mut changed = store.tighten_upper(left, store.upper_bound(right))?;
                changed |= store.tighten_lower(right, store.lower_bound(left))?;
                changed
            }
            (Relation::GreaterEq, Operand::Constant(c)) => store.tighten_lower(left, c)?,
            (Relation::GreaterEq, Operand::Variable(right)) => {
                let mut changed = store.tighten_lower(left, store.lower_bound(right))?;
                changed |= store.tighten_upper(right, store.upper_bound(left))?;
                changed
            }
        };
        Ok(PropagationStatus::from_changed(changed))
    }
}

/// Satisfied iff every member is
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Conjunction {
    members: Vec<Constraint>,
}

impl Conjunction {
    pub fn new(members: Vec<Constraint>) -> Self {
        Self { members }
    }

    pub fn members(&self) -> &[Constraint] {
        &self.members
    }

    pub fn evaluate(&self, assignment: &Assignment) -> bool {
        self.members.iter().all(|c| c.evaluate(assignment))
    }

    pub fn propagate(&self, store: &mut DomainStore) -> Result<PropagationStatus, Contradiction> {
        let mut changed = false;
        for member in &self.members {
            changed |= member.propagate(store)?.is_changed();
        }
        Ok(PropagationStatus::from_changed(changed))
    }
}

/// `trigger = value  =>  consequence`
///
/// Directional: the consequence is only propagated once the trigger
/// variable is fixed to the triggering value, and the trigger variable is
/// never pruned from the consequence side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Implication {
    trigger: VariableId,
    value: i64,
    consequence: Conjunction,
}

impl Implication {
    pub fn new(trigger: VariableId, value: i64, consequence: Conjunction) -> Self {
        Self {
            trigger,
            value,
            consequence,
        }
    }

    pub fn trigger(&self) -> VariableId {
        self.trigger
    }

    pub fn consequence(&self) -> &Conjunction {
        &self.consequence
    }

    pub fn evaluate(&self, assignment: &Assignment) -> bool {
        assignment.value(self.trigger) != self.value || self.consequence.evaluate(assignment)
    }

    pub fn propagate(&self, store: &mut DomainStore) -> Result<PropagationStatus, Contradiction> {
        match store.value(self.trigger) {
            Some(value) if value == self.value => self.consequence.propagate(store),
            _ => Ok(PropagationStatus::NoChange),
        }
    }
}

/// A constraint posted into the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    LinearSum(LinearSum),
    Arithmetic(Arithmetic),
    Implication(Implication),
    Conjunction(Conjunction),
}

impl Constraint {
    pub fn linear_sum(variables: Vec<VariableId>, relation: Relation, bound: i64) -> Self {
        Constraint::LinearSum(LinearSum::new(variables, relation, bound))
    }

    pub fn arithmetic(left: VariableId, relation: Relation, right: impl Into<Operand>) -> Self {
        Constraint::Arithmetic(Arithmetic::new(left, relation, right))
    }

    pub fn implication(trigger: VariableId, value: i64, consequence: Conjunction) -> Self {
        Constraint::Implication(Implication::new(trigger, value, consequence))
    }

    pub fn conjunction(members: Vec<Constraint>) -> Self {
        Constraint::Conjunction(Conjunction::new(members))
    }

    /// Check the constraint against a complete assignment
    pub fn evaluate(&self, assignment: &Assignment) -> bool {
        match self {
            Constraint::LinearSum(c) => c.evaluate(assignment),
            Constraint::Arithmetic(c) => c.evaluate(assignment),
            Constraint::Implication(c) => c.evaluate(assignment),
            Constraint::Conjunction(c) => c.evaluate(assignment),
        }
    }

    /// Shrink domains that cannot take part in a solution
    pub fn propagate(&self, store: &mut DomainStore) -> Result<PropagationStatus, Contradiction> {
        match self {
            Constraint::LinearSum(c) => c.propagate(store),
            Constraint::Arithmetic(c) => c.propagate(store),
            Constraint::Implication(c) => c.propagate(store),
            Constraint::Conjunction(c) => c.propagate(store),
        }
    }

    /// Every variable the constraint reads, sorted and without duplicates
    pub fn scope(&self) -> Vec<VariableId> {
        let mut scope = Vec::new();
        self.collect_scope(&mut scope);
        scope.sort();
        scope.dedup();
        scope
    }

    fn collect_scope(&self, scope: &mut Vec<VariableId>) {
        match self {
            Constraint::LinearSum(c) => scope.extend_from_slice(&c.variables),
            Constraint::Arithmetic(c) => {
                scope.push(c.left);
                if let Operand::Variable(right) = c.right {
                    scope.push(right);
                }
            }
            Constraint::Implication(c) => {
                scope.push(c.trigger);
                for member in &c.consequence.members {
                    member.collect_scope(scope);
                }
            }
            Constraint::Conjunction(c) => {
                for member in &c.members {
                    member.collect_scope(scope);
                }
            }
        }
    }

    /// Human readable form using the variable names of `store`
    pub fn describe(&self, store: &DomainStore) -> String {
        match self {
            Constraint::LinearSum(c) => format!(
                "sum({}) {} {}",
                c.variables.iter().map(|&v| store.name(v)).join(", "),
                c.relation,
                c.bound
            ),
            Constraint::Arithmetic(c) => {
                let right = match c.right {
                    Operand::Variable(v) => store.name(v).to_string(),
                    Operand::Constant(value) => value.to_string(),
                };
                format!("{} {} {}", store.name(c.left), c.relation, right)
            }
            Constraint::Implication(c) => format!(
                "{} = {} => ({})",
                store.name(c.trigger),
                c.value,
                c.consequence.members.iter().map(|m| m.describe(store)).join(" and ")
            ),
            Constraint::Conjunction(c) => {
                c.members.iter().map(|m| m.describe(store)).join(" and ")
            }
        }
    }
}

/// Index of a constraint inside a [`ConstraintRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstraintId(usize);

impl ConstraintId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Stores posted constraints and, per variable, the constraints to wake
/// when its domain changes
#[derive(Debug, Clone, Default)]
pub struct ConstraintRegistry {
    constraints: Vec<Constraint>,
    watchers: Vec<Vec<ConstraintId>>,
}

impl ConstraintRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post a constraint whose variables all live in `store`
    pub fn post(
        &mut self,
        constraint: Constraint,
        store: &DomainStore,
    ) -> Result<ConstraintId, ModelError> {
        let scope = constraint.scope();
        if let Some(&unknown) = scope.iter().find(|&&v| !store.contains_variable(v)) {
            return Err(ModelError::UnknownVariable {
                variable: unknown,
                count: store.len(),
            });
        }

        let id = ConstraintId(self.constraints.len());
        for variable in scope {
            if self.watchers.len() <= variable.index() {
                self.watchers.resize_with(variable.index() + 1, Vec::new);
            }
            self.watchers[variable.index()].push(id);
        }
        self.constraints.push(constraint);
        Ok(id)
    }

    pub fn get(&self, id: ConstraintId) -> &Constraint {
        &self.constraints[id.index()]
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ConstraintId> {
        (0..self.constraints.len()).map(ConstraintId)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConstraintId, &Constraint)> {
        self.constraints
            .iter()
            .enumerate()
            .map(|(i, c)| (ConstraintId(i), c))
    }

    /// Constraints whose scope contains `variable`
    pub fn watchers(&self, variable: VariableId) -> &[ConstraintId] {
        self.watchers
            .get(variable.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_satisfied_by(&self, assignment: &Assignment) -> bool {
        self.constraints.iter().all(|c| c.evaluate(assignment))
    }

    /// Constraints the assignment does not satisfy
    pub fn violated_by(&self, assignment: &Assignment) -> Vec<ConstraintId> {
        self.iter()
            .filter(|(_, c)| !c.evaluate(assignment))
            .map(|(id, _)| id)
            .collect()
    }

    /// Counts of posted constraints per kind
    pub fn statistics(&self) -> RegistryStatistics {
        let mut stats = RegistryStatistics::default();
        for constraint in &self.constraints {
            match constraint {
                Constraint::LinearSum(_) => stats.linear_sums += 1,
                Constraint::Arithmetic(_) => stats.arithmetic += 1,
                Constraint::Implication(_) => stats.implications += 1,
                Constraint::Conjunction(_) => stats.conjunctions += 1,
            }
        }
        stats
    }
}

/// Statistics about posted constraints
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStatistics {
    pub linear_sums: usize,
    pub arithmetic: usize,
    pub implications: usize,
    pub conjunctions: usize,
}

impl RegistryStatistics {
    pub fn total(&self) -> usize {
        self.linear_sums + self.arithmetic + self.implications + self.conjunctions
    }
}

impl fmt::Display for RegistryStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Constraint Statistics:")?;
        writeln!(f, "  Total constraints: {}", self.total())?;
        writeln!(f, "  Linear sums: {}", self.linear_sums)?;
        writeln!(f, "  Arithmetic: {}", self.arithmetic)?;
        writeln!(f, "  Implications: {}", self.implications)?;
        writeln!(f, "  Conjunctions: {}", self.conjunctions)?;
        Ok(())
    }
}
