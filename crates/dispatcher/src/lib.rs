//! 调度端：把到期的任务计划转换为任务并投递，以及补偿投递。

pub mod reconciler;
pub mod scheduler;

pub use reconciler::PendingTaskReconciler;
pub use scheduler::{BatchReport, BatchScheduler, DEFAULT_BATCH_LIMIT};
