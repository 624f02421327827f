//! Value simulation: clocks, time patterns, correlations, live values

pub mod clock;
pub mod correlation;
pub mod patterns;
pub mod value;

pub use clock::{Clock, ManualClock, SystemClock};
pub use correlation::{CorrelationEngine, MetricName};
pub use value::ValueSimulator;
