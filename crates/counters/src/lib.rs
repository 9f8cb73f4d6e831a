//! Counters for buildcache instrumentation
//!
//! Components create their counters up front and hand them to a
//! [`CounterRegistry`] once. The registry is a port: production code renders
//! counters through whatever backend the owning process uses, tests substitute
//! an [`InMemoryCounterRegistry`] and read values back.
//!
//! Three counter shapes are provided:
//! - [`IntegerCounter`]: a monotonically increasing count
//! - [`SamplingCounter`]: count, sum, min and max of observed samples
//! - [`TagSetCounter`]: a count per distinct tag value

mod counter;
mod registry;

pub use counter::{Counter, CounterSnapshot, IntegerCounter, SamplingCounter, TagSetCounter};
pub use registry::{CounterRegistry, InMemoryCounterRegistry, NoopCounterRegistry};
