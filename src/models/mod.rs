pub mod outcome;
pub mod task;
pub mod work_type;
pub mod worker;

pub use outcome::{ClassifiedResult, OutcomeStatus, RawOutcome, ResultMetrics, TIMEOUT_ERROR_KIND};
pub use task::{ProxyAssignment, Task, DEFAULT_TASK_DEADLINE_MS};
pub use work_type::{WorkType, WorkTypeProfile};
pub use worker::{WorkerState, WorkerStatus};
