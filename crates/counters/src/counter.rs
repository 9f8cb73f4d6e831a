//! Counter types
//!
//! All counters are updated through `&self` and are safe to share across
//! threads behind an `Arc`. Numeric state lives in atomics; the per-tag map of
//! [`TagSetCounter`] sits behind a mutex.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Identity shared by every counter shape
#[derive(Debug, Clone, PartialEq, Eq)]
struct CounterId {
    category: String,
    name: String,
    tags: BTreeMap<String, String>,
}

impl CounterId {
    fn new(
        category: impl Into<String>,
        name: impl Into<String>,
        tags: BTreeMap<String, String>,
    ) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
            tags,
        }
    }
}

/// Monotonically increasing count
#[derive(Debug)]
pub struct IntegerCounter {
    id: CounterId,
    value: AtomicU64,
}

impl IntegerCounter {
    /// Create a counter starting at zero
    #[must_use]
    pub fn new(
        category: impl Into<String>,
        name: impl Into<String>,
        tags: BTreeMap<String, String>,
    ) -> Self {
        Self {
            id: CounterId::new(category, name, tags),
            value: AtomicU64::new(0),
        }
    }

    /// Increment by one
    pub fn inc(&self) {
        self.add(1);
    }

    /// Increment by `delta`
    pub fn add(&self, delta: u64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    /// Current value
    #[must_use]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Aggregate of observed samples
///
/// Only the aggregate is kept: count, sum, min and max. Min and max are
/// `None` until the first sample arrives.
#[derive(Debug)]
pub struct SamplingCounter {
    id: CounterId,
    count: AtomicU64,
    sum: AtomicU64,
    min: AtomicU64,
    max: AtomicU64,
}

impl SamplingCounter {
    /// Create an empty sampling counter
    #[must_use]
    pub fn new(
        category: impl Into<String>,
        name: impl Into<String>,
        tags: BTreeMap<String, String>,
    ) -> Self {
        Self {
            id: CounterId::new(category, name, tags),
            count: AtomicU64::new(0),
            sum: AtomicU64::new(0),
            min: AtomicU64::new(u64::MAX),
            max: AtomicU64::new(0),
        }
    }

    /// Record one sample
    pub fn add_sample(&self, sample: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum.fetch_add(sample, Ordering::Relaxed);
        self.min.fetch_min(sample, Ordering::Relaxed);
        self.max.fetch_max(sample, Ordering::Relaxed);
    }

    /// Number of samples recorded
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Sum of all samples
    #[must_use]
    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    /// Smallest sample seen
    #[must_use]
    pub fn min(&self) -> Option<u64> {
        (self.count() > 0).then(|| self.min.load(Ordering::Relaxed))
    }

    /// Largest sample seen
    #[must_use]
    pub fn max(&self) -> Option<u64> {
        (self.count() > 0).then(|| self.max.load(Ordering::Relaxed))
    }

    /// Mean of all samples, zero when empty
    #[must_use]
    pub fn average(&self) -> u64 {
        let count = self.count();
        if count == 0 {
            return 0;
        }
        self.sum() / count
    }
}

/// Count per distinct tag value
#[derive(Debug)]
pub struct TagSetCounter {
    id: CounterId,
    counts: Mutex<BTreeMap<String, u64>>,
}

impl TagSetCounter {
    /// Create an empty tag set counter
    #[must_use]
    pub fn new(
        category: impl Into<String>,
        name: impl Into<String>,
        tags: BTreeMap<String, String>,
    ) -> Self {
        Self {
            id: CounterId::new(category, name, tags),
            counts: Mutex::new(BTreeMap::new()),
        }
    }

    /// Count one occurrence of `tag`
    pub fn add(&self, tag: impl Into<String>) {
        if let Ok(mut counts) = self.counts.lock() {
            *counts.entry(tag.into()).or_insert(0) += 1;
        }
    }

    /// Occurrences recorded for `tag`
    #[must_use]
    pub fn count(&self, tag: &str) -> u64 {
        self.counts
            .lock()
            .map_or(0, |counts| counts.get(tag).copied().unwrap_or(0))
    }

    /// All tags with their counts
    #[must_use]
    pub fn values(&self) -> BTreeMap<String, u64> {
        self.counts
            .lock()
            .map(|counts| counts.clone())
            .unwrap_or_default()
    }
}

/// A registered counter of any shape
#[derive(Debug, Clone)]
pub enum Counter {
    /// See [`IntegerCounter`]
    Integer(Arc<IntegerCounter>),
    /// See [`SamplingCounter`]
    Sampling(Arc<SamplingCounter>),
    /// See [`TagSetCounter`]
    TagSet(Arc<TagSetCounter>),
}

impl Counter {
    fn id(&self) -> &CounterId {
        match self {
            Self::Integer(c) => &c.id,
            Self::Sampling(c) => &c.id,
            Self::TagSet(c) => &c.id,
        }
    }

    /// Category the counter was created under
    #[must_use]
    pub fn category(&self) -> &str {
        &self.id().category
    }

    /// Counter name within its category
    #[must_use]
    pub fn name(&self) -> &str {
        &self.id().name
    }

    /// Static tags attached at creation
    #[must_use]
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.id().tags
    }

    /// Point-in-time copy of the counter's values
    ///
    /// Integer counters report a single `count` field, sampling counters
    /// report `count`/`sum`/`min`/`max` (min and max only once sampled), tag
    /// set counters report one field per tag.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        let values = match self {
            Self::Integer(c) => BTreeMap::from([("count".to_string(), c.get())]),
            Self::Sampling(c) => {
                let mut values = BTreeMap::from([
                    ("count".to_string(), c.count()),
                    ("sum".to_string(), c.sum()),
                ]);
                if let Some(min) = c.min() {
                    values.insert("min".to_string(), min);
                }
                if let Some(max) = c.max() {
                    values.insert("max".to_string(), max);
                }
                values
            }
            Self::TagSet(c) => c.values(),
        };

        CounterSnapshot {
            category: self.category().to_string(),
            name: self.name().to_string(),
            tags: self.tags().clone(),
            values,
        }
    }
}

impl From<Arc<IntegerCounter>> for Counter {
    fn from(counter: Arc<IntegerCounter>) -> Self {
        Self::Integer(counter)
    }
}

impl From<Arc<SamplingCounter>> for Counter {
    fn from(counter: Arc<SamplingCounter>) -> Self {
        Self::Sampling(counter)
    }
}

impl From<Arc<TagSetCounter>> for Counter {
    fn from(counter: Arc<TagSetCounter>) -> Self {
        Self::TagSet(counter)
    }
}

/// Values of one counter at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Counter category
    pub category: String,
    /// Counter name
    pub name: String,
    /// Static tags
    pub tags: BTreeMap<String, String>,
    /// Field name to value
    pub values: BTreeMap<String, u64>,
}
