//! 领域层：实体、校验规则、到期检查链，以及存储与队列的抽象接口。

pub mod due_check;
pub mod entities;
pub mod messaging;
pub mod operation;
pub mod priority;
pub mod repositories;
pub mod services;
pub mod validation;

pub use due_check::{DueCheck, DueCheckChain, DueCheckContext};
pub use entities::{
    NewTask, NewTaskSchedule, Task, TaskDispatch, TaskOutcome, TaskSchedule,
    TaskScheduleDetail, TaskStatus,
};
pub use messaging::{Acknowledger, Delivery, DispatchConsumer, DispatchQueue};
pub use priority::{
    resolve_priority, FixedPriority, PriorityResolver, RandomPriority, SeededPriority,
};
pub use repositories::{
    CommitHook, ScheduleBatch, ScheduleBatchStore, TaskRepository, TaskScheduleRepository,
};
pub use services::{TaskScheduleService, TaskService};
pub use validation::{TaskDraft, TaskScheduleDraft};
