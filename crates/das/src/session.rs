use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::Parcel;

/// Validator quota class a work item was drawn for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Row,
    Col,
    Random,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Row => "row",
            Category::Col => "col",
            Category::Random => "random",
        };
        f.write_str(name)
    }
}

/// One parcel still to be published or fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkItem {
    pub parcel: Parcel,
    /// `None` for builder items, which carry no sampling quota
    pub category: Option<Category>,
}

impl WorkItem {
    pub fn seed(parcel: Parcel) -> Self {
        Self {
            parcel,
            category: None,
        }
    }

    pub fn sample(parcel: Parcel, category: Category) -> Self {
        Self {
            parcel,
            category: Some(category),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryProgress {
    pub required: usize,
    pub satisfied: usize,
    pub started_at: Instant,
    /// Elapsed time at which the category emptied, frozen once set
    pub latency: Option<Duration>,
}

impl CategoryProgress {
    pub fn remaining(&self) -> usize {
        self.required - self.satisfied
    }
}

/// Per-block working state of one engine
#[derive(Debug)]
pub struct SamplingSession {
    block_id: u64,
    started_at: Instant,
    /// `None` when the timeout runs past what `Instant` can represent
    deadline: Option<Instant>,
    pending: Vec<WorkItem>,
    categories: HashMap<Category, CategoryProgress>,
}

impl SamplingSession {
    pub fn new(
        block_id: u64,
        items: Vec<WorkItem>,
        started_at: Instant,
        timeout: Duration,
    ) -> Self {
        let mut categories: HashMap<Category, CategoryProgress> = HashMap::new();
        for category in items.iter().filter_map(|item| item.category) {
            categories
                .entry(category)
                .or_insert_with(|| CategoryProgress {
                    required: 0,
                    satisfied: 0,
                    started_at,
                    latency: None,
                })
                .required += 1;
        }

        Self {
            block_id,
            started_at,
            deadline: started_at.checked_add(timeout),
            pending: items,
            categories,
        }
    }

    pub fn block_id(&self) -> u64 {
        self.block_id
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline.map_or(false, |deadline| now >= deadline)
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    pub fn progress(&self, category: Category) -> Option<&CategoryProgress> {
        self.categories.get(&category)
    }

    /// Index of a uniformly chosen pending item
    pub fn pick<R: Rng>(&self, rng: &mut R) -> Option<usize> {
        if self.pending.is_empty() {
            None
        } else {
            Some(rng.gen_range(0..self.pending.len()))
        }
    }

    pub fn item(&self, index: usize) -> Option<&WorkItem> {
        self.pending.get(index)
    }

    /// Remove a successfully processed item.
    ///
    /// Returns the item's category and its latency when this completion
    /// emptied the category for the first time.
    pub fn complete(&mut self, index: usize, now: Instant) -> Option<(Category, Duration)> {
        if index >= self.pending.len() {
            return None;
        }
        let item = self.pending.swap_remove(index);

        let category = item.category?;
        let progress = self.categories.get_mut(&category)?;
        progress.satisfied += 1;

        if progress.remaining() == 0 && progress.latency.is_none() {
            let latency = now.saturating_duration_since(progress.started_at);
            progress.latency = Some(latency);
            return Some((category, latency));
        }

        None
    }
}
