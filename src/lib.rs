//! 算术任务调度系统的进程装配：运行模式、组件循环与优雅关闭。

pub mod app;
pub mod shutdown;

pub use app::{AppMode, Application};
pub use shutdown::ShutdownManager;
