//! Exactly-once assignment of work items to workers.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// An item handed out by [`ClaimTable::claim_next`].
#[derive(Debug)]
pub struct Claim<'a, T> {
    /// Position of the item in the table.
    pub index: usize,
    pub item: &'a T,
}

/// Shared table that hands every item to exactly one caller.
///
/// The items never change after construction. Only the claimed flags are
/// mutated, and only inside [`claim_next`](Self::claim_next), which is the
/// single point of synchronisation between workers.
#[derive(Debug)]
pub struct ClaimTable<T> {
    items: Vec<T>,
    claimed: Mutex<Vec<bool>>,
}

impl<T> ClaimTable<T> {
    pub fn new(items: Vec<T>) -> Self {
        let claimed = Mutex::new(vec![false; items.len()]);
        Self { items, claimed }
    }

    /// Claim the lowest-indexed item nobody has claimed yet.
    ///
    /// Returns `None` once every item has been handed out. The lock is held
    /// only for the scan and the mark.
    pub fn claim_next(&self) -> Option<Claim<'_, T>> {
        let index = {
            let mut claimed = self.lock();
            let index = claimed.iter().position(|taken| !taken)?;
            claimed[index] = true;
            index
        };

        Some(Claim {
            index,
            item: &self.items[index],
        })
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    // Every update flips a single flag, so a guard recovered from a panicking
    // holder still describes a consistent table.
    fn lock(&self) -> MutexGuard<'_, Vec<bool>> {
        self.claimed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
