//! Conditions under which the search gives up

use super::SearchStatistics;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Consulted by the search engine at every new search node
pub trait Termination: Debug {
    fn should_stop(&self, statistics: &SearchStatistics) -> bool;
}

impl<T: Termination + ?Sized> Termination for Box<T> {
    fn should_stop(&self, statistics: &SearchStatistics) -> bool {
        (**self).should_stop(statistics)
    }
}

impl<T: Termination + ?Sized> Termination for &T {
    fn should_stop(&self, statistics: &SearchStatistics) -> bool {
        (**self).should_stop(statistics)
    }
}

/// Never stops; the search runs until solved or exhausted
#[derive(Debug, Clone, Copy, Default)]
pub struct Indefinite;

impl Termination for Indefinite {
    fn should_stop(&self, _statistics: &SearchStatistics) -> bool {
        false
    }
}

/// Stops once a wall-clock budget has elapsed
#[derive(Debug, Clone, Copy)]
pub struct TimeLimit {
    deadline: Instant,
}

impl TimeLimit {
    pub fn new(budget: Duration) -> Self {
        Self {
            deadline: Instant::now() + budget,
        }
    }
}

impl Termination for TimeLimit {
    fn should_stop(&self, _statistics: &SearchStatistics) -> bool {
        Instant::now() >= self.deadline
    }
}

/// Stops after a number of search nodes
#[derive(Debug, Clone, Copy)]
pub struct NodeLimit {
    max_nodes: u64,
}

impl NodeLimit {
    pub fn new(max_nodes: u64) -> Self {
        Self { max_nodes }
    }
}

impl Termination for NodeLimit {
    fn should_stop(&self, statistics: &SearchStatistics) -> bool {
        statistics.nodes >= self.max_nodes
    }
}

/// A flag that can be raised from any thread to cancel a running search
#[derive(Debug, Clone, Default)]
pub struct StopFlag {
    raised: Arc<AtomicBool>,
}

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::Relaxed);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Relaxed)
    }
}

impl Termination for StopFlag {
    fn should_stop(&self, _statistics: &SearchStatistics) -> bool {
        self.is_raised()
    }
}

/// Stops as soon as any member does
#[derive(Debug, Default)]
pub struct Combined {
    members: Vec<Box<dyn Termination + Send + Sync>>,
}

impl Combined {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, termination: impl Termination + Send + Sync + 'static) -> Self {
        self.members.push(Box::new(termination));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl Termination for Combined {
    fn should_stop(&self, statistics: &SearchStatistics) -> bool {
        self.members.iter().any(|m| m.should_stop(statistics))
    }
}
