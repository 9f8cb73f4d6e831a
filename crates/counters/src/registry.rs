//! Counter registry port and its in-process implementations

use crate::counter::{Counter, CounterSnapshot};
use std::fmt::Write as _;
use std::sync::Mutex;

/// Receives counters from the components that own them
///
/// Components register once, at construction, and keep updating their own
/// handles afterwards. Registries only ever read counter values.
pub trait CounterRegistry: Send + Sync {
    /// Register a batch of counters
    fn register_counters(&self, counters: Vec<Counter>);
}

/// Registry that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCounterRegistry;

impl CounterRegistry for NoopCounterRegistry {
    fn register_counters(&self, _counters: Vec<Counter>) {}
}

/// Registry that keeps counters in memory and renders them on demand
#[derive(Debug, Default)]
pub struct InMemoryCounterRegistry {
    counters: Mutex<Vec<Counter>>,
}

impl InMemoryCounterRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered counters
    #[must_use]
    pub fn len(&self) -> usize {
        self.counters.lock().map_or(0, |c| c.len())
    }

    /// Whether nothing has been registered yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot every registered counter, in registration order
    #[must_use]
    pub fn snapshot(&self) -> Vec<CounterSnapshot> {
        self.counters
            .lock()
            .map(|counters| counters.iter().map(Counter::snapshot).collect())
            .unwrap_or_default()
    }

    /// Snapshot of a single counter by category and name
    #[must_use]
    pub fn find(&self, category: &str, name: &str) -> Option<CounterSnapshot> {
        self.snapshot()
            .into_iter()
            .find(|s| s.category == category && s.name == name)
    }

    /// Export counters in Prometheus text format
    ///
    /// Metric names are `{category}_{name}`. Integer counters emit one
    /// sample, sampling counters emit `_count`, `_sum`, `_min` and `_max`,
    /// tag set counters emit one sample per tag with a `tag` label.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();
        let counters = match self.counters.lock() {
            Ok(counters) => counters.clone(),
            Err(_) => return output,
        };

        for counter in &counters {
            let snapshot = counter.snapshot();
            let metric = format!("{}_{}", snapshot.category, snapshot.name);
            let base_labels: Vec<String> = snapshot
                .tags
                .iter()
                .map(|(k, v)| format!("{k}=\"{v}\""))
                .collect();

            match counter {
                Counter::Integer(_) => {
                    let _ = writeln!(output, "# TYPE {metric} counter");
                    let value = snapshot.values.get("count").copied().unwrap_or(0);
                    let _ = writeln!(output, "{metric}{} {value}", labels(&base_labels));
                }
                Counter::Sampling(_) => {
                    let _ = writeln!(output, "# TYPE {metric} summary");
                    for (field, value) in &snapshot.values {
                        let _ = writeln!(output, "{metric}_{field}{} {value}", labels(&base_labels));
                    }
                }
                Counter::TagSet(_) => {
                    let _ = writeln!(output, "# TYPE {metric} counter");
                    for (tag, value) in &snapshot.values {
                        let mut tag_labels = base_labels.clone();
                        tag_labels.push(format!("tag=\"{tag}\""));
                        let _ = writeln!(output, "{metric}{} {value}", labels(&tag_labels));
                    }
                }
            }
        }

        output
    }
}

fn labels(pairs: &[String]) -> String {
    if pairs.is_empty() {
        String::new()
    } else {
        format!("{{{}}}", pairs.join(","))
    }
}

impl CounterRegistry for InMemoryCounterRegistry {
    fn register_counters(&self, counters: Vec<Counter>) {
        tracing::debug!(count = counters.len(), "Registering counters");
        if let Ok(mut registered) = self.counters.lock() {
            registered.extend(counters);
        }
    }
}
