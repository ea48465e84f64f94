pub mod block_detector;
pub mod fleet_counters;
pub mod outcome_classifier;
pub mod result_reporter;

pub use block_detector::{BackoffPolicy, BlockCorrelationDetector, BlockEvent};
pub use fleet_counters::{CounterSnapshot, FleetCounters};
pub use outcome_classifier::{ClassifierConfig, OutcomeClassifier};
pub use result_reporter::{ResultReporter, SubmitOutcome};
