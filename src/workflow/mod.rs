pub mod task_ctx;
pub mod task_executor;

pub use task_ctx::TaskCtx;
pub use task_executor::TaskExecutor;
