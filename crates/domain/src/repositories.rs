//! 领域仓储抽象
//!
//! 定义数据访问的抽象接口，遵循依赖倒置原则

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

use crate::entities::{NewTask, NewTaskSchedule, Task, TaskOutcome, TaskSchedule};
use arith_core::SchedulerResult;

/// 任务仓储抽象
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, task: &NewTask) -> SchedulerResult<Task>;

    /// 在同一事务中插入全部任务，任何一条失败则全部回滚
    async fn create_many(&self, tasks: &[NewTask]) -> SchedulerResult<Vec<Task>>;

    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<Task>>;

    /// 按创建时间升序
    async fn find_by_schedule(&self, task_schedule_id: i64) -> SchedulerResult<Vec<Task>>;

    /// 仅删除 PENDING 任务；不存在返回 `TaskNotFound`，状态不符返回 `TaskNotDeletable`
    async fn delete_pending(&self, id: i64) -> SchedulerResult<()>;

    /// PENDING → STARTED 的条件更新，返回是否抢到
    async fn mark_started(&self, id: i64) -> SchedulerResult<bool>;

    /// STARTED → SUCCESS/ERROR，返回是否写入
    async fn finish(&self, id: i64, outcome: &TaskOutcome) -> SchedulerResult<bool>;

    /// 领取 `dispatched_at <= cutoff` 的 PENDING 任务，并把 `dispatched_at` 更新为 `now`
    async fn claim_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
        limit: i64,
    ) -> SchedulerResult<Vec<Task>>;

    async fn health_check(&self) -> SchedulerResult<()>;
}

/// 任务计划仓储抽象
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskScheduleRepository: Send + Sync {
    async fn create(&self, schedule: &NewTaskSchedule) -> SchedulerResult<TaskSchedule>;

    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<TaskSchedule>>;

    /// 删除计划并把其任务的 `task_schedule_id` 置空，返回计划是否存在
    async fn delete(&self, id: i64) -> SchedulerResult<bool>;
}

/// 事务提交后执行的回调
pub type CommitHook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// 批量调度的工作单元存储
#[async_trait]
pub trait ScheduleBatchStore: Send + Sync {
    async fn begin(&self) -> SchedulerResult<Box<dyn ScheduleBatch>>;
}

/// 一个批量调度事务
///
/// 所有写入在 [`ScheduleBatch::commit`] 时一并生效；提交成功后依次执行
/// 注册的回调，回滚或丢弃时回调不会执行。
#[async_trait]
pub trait ScheduleBatch: Send {
    /// 按 `checked_scheduling_at` 升序锁定至多 `limit` 个 `schedule_x_times > 0` 的计划，
    /// 已被其他事务锁定的行直接跳过
    async fn lock_due_schedules(&mut self, limit: i64) -> SchedulerResult<Vec<TaskSchedule>>;

    /// 该计划最近创建的任务
    async fn latest_task(&mut self, task_schedule_id: i64) -> SchedulerResult<Option<Task>>;

    async fn insert_task(&mut self, task: &NewTask) -> SchedulerResult<Task>;

    /// 原子递减 `schedule_x_times` 并记录检查时间
    async fn consume_run(
        &mut self,
        task_schedule_id: i64,
        checked_at: DateTime<Utc>,
    ) -> SchedulerResult<()>;

    /// 只记录检查时间
    async fn touch(
        &mut self,
        task_schedule_id: i64,
        checked_at: DateTime<Utc>,
    ) -> SchedulerResult<()>;

    fn on_commit(&mut self, hook: CommitHook);

    async fn commit(self: Box<Self>) -> SchedulerResult<()>;

    async fn rollback(self: Box<Self>) -> SchedulerResult<()>;
}
