//! Variable domains and the trail that makes them restorable

use super::{Contradiction, ModelError};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Stable index of a variable inside a [`DomainStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariableId(usize);

impl VariableId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The ordered set of values a variable may still take.
///
/// Stored as bounds plus the values removed strictly between them, so a
/// wide range costs nothing until values are punched out of its middle.
/// Bounds are never holes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domain {
    lower: i64,
    upper: i64,
    holes: BTreeSet<i64>,
}

impl Domain {
    /// All integers in `[lower, upper]`; empty if `lower > upper`
    pub fn range(lower: i64, upper: i64) -> Self {
        Self {
            lower,
            upper,
            holes: BTreeSet::new(),
        }
    }

    pub fn singleton(value: i64) -> Self {
        Self::range(value, value)
    }

    /// Bring the bounds inward past any holes and drop holes outside them
    fn normalized(mut lower: i64, mut upper: i64, mut holes: BTreeSet<i64>) -> Option<Self> {
        while lower <= upper && holes.contains(&lower) {
            lower += 1;
        }
        while upper > lower && holes.contains(&upper) {
            upper -= 1;
        }
        if lower > upper {
            return None;
        }
        holes.retain(|&h| h > lower && h < upper);
        Some(Self {
            lower,
            upper,
            holes,
        })
    }

    /// Number of values, saturating at `u64::MAX`
    pub fn len(&self) -> u64 {
        if self.is_empty() {
            return 0;
        }
        let width = i128::from(self.upper) - i128::from(self.lower) + 1;
        u64::try_from(width - self.holes.len() as i128).unwrap_or(u64::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.lower > self.upper
    }

    pub fn is_fixed(&self) -> bool {
        self.lower == self.upper
    }

    /// The value of a fixed domain
    pub fn value(&self) -> Option<i64> {
        self.is_fixed().then_some(self.lower)
    }

    pub fn min(&self) -> Option<i64> {
        (!self.is_empty()).then_some(self.lower)
    }

    pub fn max(&self) -> Option<i64> {
        (!self.is_empty()).then_some(self.upper)
    }

    pub fn contains(&self, value: i64) -> bool {
        self.lower <= value && value <= self.upper && !self.holes.contains(&value)
    }

    /// Smallest value greater than `after`, or the minimum if `after` is `None`
    pub fn next_value(&self, after: Option<i64>) -> Option<i64> {
        let mut candidate = match after {
            Some(value) => value.checked_add(1)?.max(self.lower),
            None => self.lower,
        };
        while candidate <= self.upper {
            if !self.holes.contains(&candidate) {
                return Some(candidate);
            }
            candidate = candidate.checked_add(1)?;
        }
        None
    }

    /// Values in ascending order
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = i64> + '_ {
        (self.lower..=self.upper).filter(move |v| !self.holes.contains(v))
    }

    /// Values at or above `bound`; `None` if nothing is left
    pub fn with_lower(&self, bound: i64) -> Option<Self> {
        Self::normalized(bound.max(self.lower), self.upper, self.holes.clone())
    }

    /// Values at or below `bound`; `None` if nothing is left
    pub fn with_upper(&self, bound: i64) -> Option<Self> {
        Self::normalized(self.lower, bound.min(self.upper), self.holes.clone())
    }

    /// Every value except `value`; `None` if nothing is left
    pub fn without(&self, value: i64) -> Option<Self> {
        let mut holes = self.holes.clone();
        if self.contains(value) {
            holes.insert(value);
        }
        Self::normalized(self.lower, self.upper, holes)
    }

    /// Values present in both domains; `None` if they are disjoint
    pub fn intersect(&self, other: &Domain) -> Option<Self> {
        let lower = self.lower.max(other.lower);
        let upper = self.upper.min(other.upper);
        let holes = self.holes.union(&other.holes).copied().collect();
        Self::normalized(lower, upper, holes)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "{{}}");
        }
        if self.is_fixed() {
            return write!(f, "{{{}}}", self.lower);
        }
        if self.holes.is_empty() {
            return write!(f, "[{}..{}]", self.lower, self.upper);
        }
        if self.len() <= 8 {
            return write!(f, "{{{}}}", self.iter().join(", "));
        }
        write!(
            f,
            "[{}..{}] \\ {{{}}}",
            self.lower,
            self.upper,
            self.holes.iter().join(", ")
        )
    }
}

/// A complete assignment: one fixed value per variable, indexed by id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    values: Vec<i64>,
}

impl Assignment {
    pub fn new(values: Vec<i64>) -> Self {
        Self { values }
    }

    pub fn value(&self, variable: VariableId) -> i64 {
        self.values[variable.index()]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[i64] {
        &self.values
    }
}

#[derive(Debug, Clone)]
struct TrailEntry {
    variable: VariableId,
    previous: Domain,
}

/// Owns the domains of all decision variables.
///
/// Every mutation that shrinks a domain pushes the previous domain onto a
/// trail. The trail is split into checkpoints (one per search decision);
/// [`DomainStore::backtrack`] undoes the most recent checkpoint in reverse
/// order. A mutation that would empty a domain fails with [`Contradiction`]
/// and leaves the domain untouched.
#[derive(Debug, Clone, Default)]
pub struct DomainStore {
    domains: Vec<Domain>,
    names: Vec<String>,
    trail: Vec<TrailEntry>,
    /// At index i is the trail length when checkpoint i + 1 was opened
    trail_delimiter: Vec<usize>,
    modified: Vec<VariableId>,
}

impl DomainStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a variable with domain `[lower, upper]`
    pub fn create_variable(&mut self, lower: i64, upper: i64) -> Result<VariableId, ModelError> {
        let name = format!("x{}", self.domains.len());
        self.create_named_variable(name, lower, upper)
    }

    /// Create a variable with a display name
    pub fn create_named_variable(
        &mut self,
        name: impl Into<String>,
        lower: i64,
        upper: i64,
    ) -> Result<VariableId, ModelError> {
        if lower > upper {
            return Err(ModelError::EmptyDomain { lower, upper });
        }

        let id = VariableId(self.domains.len());
        self.domains.push(Domain::range(lower, upper));
        self.names.push(name.into());
        Ok(id)
    }

    /// Create a singleton variable
    pub fn create_constant(&mut self, name: impl Into<String>, value: i64) -> VariableId {
        let id = VariableId(self.domains.len());
        self.domains.push(Domain::singleton(value));
        self.names.push(name.into());
        id
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    pub fn contains_variable(&self, id: VariableId) -> bool {
        id.index() < self.domains.len()
    }

    /// All variable ids in ascending order
    pub fn variables(&self) -> impl Iterator<Item = VariableId> {
        (0..self.domains.len()).map(VariableId)
    }

    pub fn name(&self, id: VariableId) -> &str {
        &self.names[id.index()]
    }

    pub fn domain(&self, id: VariableId) -> &Domain {
        &self.domains[id.index()]
    }

    pub fn is_fixed(&self, id: VariableId) -> bool {
        self.domain(id).is_fixed()
    }

    pub fn value(&self, id: VariableId) -> Option<i64> {
        self.domain(id).value()
    }

    pub fn lower_bound(&self, id: VariableId) -> i64 {
        // Stored domains are never empty.
        self.domain(id).min().unwrap_or(i64::MAX)
    }

    pub fn upper_bound(&self, id: VariableId) -> i64 {
        self.domain(id).max().unwrap_or(i64::MIN)
    }

    /// Lowest-index variable whose domain holds more than one value
    pub fn first_unfixed(&self) -> Option<VariableId> {
        self.variables().find(|&id| !self.is_fixed(id))
    }

    /// Fix `id` to `value`
    pub fn restrict_to(&mut self, id: VariableId, value: i64) -> Result<bool, Contradiction> {
        if !self.domain(id).contains(value) {
            return Err(Contradiction::WipeOut { variable: id });
        }
        if self.domain(id).is_fixed() {
            return Ok(false);
        }
        self.replace(id, Domain::singleton(value));
        Ok(true)
    }

    /// Remove a single value from the domain of `id`
    pub fn remove_value(&mut self, id: VariableId, value: i64) -> Result<bool, Contradiction> {
        if !self.domain(id).contains(value) {
            return Ok(false);
        }
        let domain = self
            .domain(id)
            .without(value)
            .ok_or(Contradiction::WipeOut { variable: id })?;
        self.replace(id, domain);
        Ok(true)
    }

    /// Remove every value below `bound`
    pub fn tighten_lower(&mut self, id: VariableId, bound: i64) -> Result<bool, Contradiction> {
        if self.lower_bound(id) >= bound {
            return Ok(false);
        }
        let domain = self
            .domain(id)
            .with_lower(bound)
            .ok_or(Contradiction::WipeOut { variable: id })?;
        self.replace(id, domain);
        Ok(true)
    }

    /// Remove every value above `bound`
    pub fn tighten_upper(&mut self, id: VariableId, bound: i64) -> Result<bool, Contradiction> {
        if self.upper_bound(id) <= bound {
            return Ok(false);
        }
        let domain = self
            .domain(id)
            .with_upper(bound)
            .ok_or(Contradiction::WipeOut { variable: id })?;
        self.replace(id, domain);
        Ok(true)
    }

    /// Keep only the values also in `other`
    pub fn intersect(&mut self, id: VariableId, other: &Domain) -> Result<bool, Contradiction> {
        let domain = self
            .domain(id)
            .intersect(other)
            .ok_or(Contradiction::WipeOut { variable: id })?;
        if &domain == self.domain(id) {
            return Ok(false);
        }
        self.replace(id, domain);
        Ok(true)
    }

    /// Keep only the values for which `keep` holds.
    ///
    /// Visits every value of the domain; prefer the bound operations on
    /// wide domains.
    pub fn retain(
        &mut self,
        id: VariableId,
        keep: impl Fn(i64) -> bool,
    ) -> Result<bool, Contradiction> {
        let current = self.domain(id);
        let kept: Vec<i64> = current.iter().filter(|&v| keep(v)).collect();

        let (Some(&lower), Some(&upper)) = (kept.first(), kept.last()) else {
            return Err(Contradiction::WipeOut { variable: id });
        };
        if kept.len() as u64 == current.len() {
            return Ok(false);
        }

        let holes = current
            .iter()
            .filter(|v| kept.binary_search(v).is_err())
            .collect();
        let domain = Domain::normalized(lower, upper, holes)
            .ok_or(Contradiction::WipeOut { variable: id })?;
        self.replace(id, domain);
        Ok(true)
    }

    fn replace(&mut self, id: VariableId, domain: Domain) {
        let previous = std::mem::replace(&mut self.domains[id.index()], domain);
        self.trail.push(TrailEntry {
            variable: id,
            previous,
        });
        self.modified.push(id);
    }

    /// Open a new checkpoint; changes made from now on are undone together
    pub fn new_checkpoint(&mut self) {
        self.trail_delimiter.push(self.trail.len());
    }

    /// Number of open checkpoints (the current decision depth)
    pub fn checkpoint(&self) -> usize {
        self.trail_delimiter.len()
    }

    /// Undo every change since the most recent checkpoint and close it.
    ///
    /// Returns false if there is no open checkpoint.
    pub fn backtrack(&mut self) -> bool {
        let Some(start) = self.trail_delimiter.pop() else {
            return false;
        };

        for entry in self.trail.drain(start..).rev() {
            self.domains[entry.variable.index()] = entry.previous;
        }
        self.modified.clear();
        true
    }

    /// Backtrack until exactly `level` checkpoints remain open
    pub fn backtrack_to(&mut self, level: usize) {
        while self.checkpoint() > level {
            self.backtrack();
        }
    }

    /// Number of recorded changes currently on the trail
    pub fn trail_len(&self) -> usize {
        self.trail.len()
    }

    /// Variables changed since the last call
    pub fn take_modified(&mut self) -> Vec<VariableId> {
        std::mem::take(&mut self.modified)
    }

    pub(crate) fn clear_modified(&mut self) {
        self.modified.clear();
    }

    /// A copy of every domain, for comparing states
    pub fn snapshot(&self) -> Vec<Domain> {
        self.domains.clone()
    }

    /// The fixed values of all variables, if every variable is fixed
    pub fn assignment(&self) -> Option<Assignment> {
        self.domains
            .iter()
            .map(Domain::value)
            .collect::<Option<Vec<_>>>()
            .map(Assignment::new)
    }
}
