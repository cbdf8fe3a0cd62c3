//! Billing-aware pool of idle resources.
//!
//! `take` always hands out the member with the fewest minutes left in its
//! current billing hour. That resource's paid time is about to be forfeited,
//! so reusing it first gets the most out of money already spent, while
//! resources early in their hour stay pooled for a later request.

use tracing::debug;

use crate::types::Pooled;

/// An unordered collection of idle resources, optionally filtered by class.
#[derive(Debug, Clone)]
pub struct ResourcePool<T> {
    members: Vec<T>,
}

impl<T> Default for ResourcePool<T> {
    fn default() -> Self {
        Self {
            members: Vec::new(),
        }
    }
}

impl<T: Pooled> ResourcePool<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unconditionally. Callers guarantee a resource is not already
    /// pooled.
    pub fn add(&mut self, resource: T) {
        debug!(id = resource.id(), "resource pooled");
        self.members.push(resource);
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.iter().any(|m| m.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.members.iter()
    }

    /// Remove and return the matching member closest to its billing boundary.
    ///
    /// `class = None` matches every member. Ties go to the lowest id.
    pub fn take(&mut self, class: Option<&str>, now: u64) -> Option<T> {
        let index = self
            .members
            .iter()
            .enumerate()
            .filter(|(_, m)| class.is_none() || m.class() == class)
            .min_by(|(_, a), (_, b)| {
                a.time_until_hour(now)
                    .cmp(&b.time_until_hour(now))
                    .then_with(|| a.id().cmp(b.id()))
            })
            .map(|(i, _)| i)?;

        let taken = self.members.swap_remove(index);
        debug!(
            id = taken.id(),
            minutes_left = taken.time_until_hour(now),
            remaining = self.members.len(),
            "resource taken from pool"
        );
        Some(taken)
    }

    /// Take up to `count` members in ascending time-until-hour order.
    ///
    /// Returns fewer than `count` when the pool runs dry; callers must check.
    pub fn take_many(&mut self, count: usize, class: Option<&str>, now: u64) -> Vec<T> {
        let mut taken = Vec::with_capacity(count.min(self.members.len()));
        while taken.len() < count {
            match self.take(class, now) {
                Some(resource) => taken.push(resource),
                None => break,
            }
        }
        taken
    }

    /// Remove and return every member matching `predicate`.
    pub fn drain_where(&mut self, mut predicate: impl FnMut(&T) -> bool) -> Vec<T> {
        let mut drained = Vec::new();
        let mut kept = Vec::with_capacity(self.members.len());
        for member in self.members.drain(..) {
            if predicate(&member) {
                drained.push(member);
            } else {
                kept.push(member);
            }
        }
        self.members = kept;
        drained
    }
}
