//! Pagination merge policies.
//!
//! A merge combines a freshly fetched page with the aggregate already cached
//! under the same fingerprint. Merges are pure: the previous aggregate is
//! never modified in place.

use std::collections::HashSet;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// Accumulated pages of a feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total_count: u64,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, total_count: u64) -> Self {
        Self { items, total_count }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// More items exist on the server than have been accumulated.
    pub fn has_more(&self) -> bool {
        (self.items.len() as u64) < self.total_count
    }
}

/// Combines a new page with the previously cached value.
pub trait MergePolicy<T> {
    fn merge(&self, previous: Option<&T>, next: T) -> T;
}

/// The new page replaces whatever was cached.
#[derive(Debug, Clone, Copy, Default)]
pub struct Replace;

impl<T> MergePolicy<T> for Replace {
    fn merge(&self, _previous: Option<&T>, next: T) -> T {
        next
    }
}

/// Appends items whose key is not already present, keeping the order of
/// first appearance. The total count always comes from the newest page.
#[derive(Debug, Clone, Copy)]
pub struct AppendUnique<F> {
    key: F,
}

impl<F> AppendUnique<F> {
    pub fn by(key: F) -> Self {
        Self { key }
    }
}

impl<T, K, F> MergePolicy<Paginated<T>> for AppendUnique<F>
where
    T: Clone,
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    fn merge(&self, previous: Option<&Paginated<T>>, next: Paginated<T>) -> Paginated<T> {
        let Some(previous) = previous else {
            return dedupe(next, &self.key);
        };

        let mut seen: HashSet<K> = previous.items.iter().map(&self.key).collect();
        let mut items = previous.items.clone();
        for item in next.items {
            if seen.insert((self.key)(&item)) {
                items.push(item);
            }
        }

        Paginated {
            items,
            total_count: next.total_count,
        }
    }
}

fn dedupe<T, K, F>(page: Paginated<T>, key: &F) -> Paginated<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::new();
    let items = page
        .items
        .into_iter()
        .filter(|item| seen.insert(key(item)))
        .collect();
    Paginated {
        items,
        total_count: page.total_count,
    }
}
