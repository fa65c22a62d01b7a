//! 任务与任务计划的应用服务

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::entities::{NewTask, Task, TaskDispatch, TaskSchedule, TaskScheduleDetail};
use crate::messaging::DispatchQueue;
use crate::priority::PriorityResolver;
use crate::repositories::{TaskRepository, TaskScheduleRepository};
use crate::validation::{TaskDraft, TaskScheduleDraft};
use arith_core::{SchedulerError, SchedulerResult};

pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// 任务服务：创建后入队、查询、删除
pub struct TaskService {
    tasks: Arc<dyn TaskRepository>,
    queue: Arc<dyn DispatchQueue>,
    priority: Arc<dyn PriorityResolver>,
    max_batch_size: usize,
}

impl TaskService {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        queue: Arc<dyn DispatchQueue>,
        priority: Arc<dyn PriorityResolver>,
    ) -> Self {
        Self {
            tasks,
            queue,
            priority,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// 创建任务，提交成功后入队
    #[instrument(skip(self, draft), fields(operation = %draft.operation))]
    pub async fn create_task(&self, draft: TaskDraft) -> SchedulerResult<Task> {
        let requested = draft.validate()?;
        let new_task = NewTask::new(draft.operation, self.priority.resolve(requested));

        let task = self.tasks.create(&new_task).await?;
        info!(task_id = task.task_id, priority = task.priority, "任务已创建");

        self.dispatch(vec![task.dispatch()]).await;
        Ok(task)
    }

    /// 批量创建，全部校验通过后在一个事务中插入
    #[instrument(skip(self, drafts), fields(count = drafts.len()))]
    pub async fn create_tasks(&self, drafts: Vec<TaskDraft>) -> SchedulerResult<Vec<Task>> {
        if drafts.len() > self.max_batch_size {
            return Err(SchedulerError::validation(format!(
                "单次最多创建 {} 个任务，当前为 {}",
                self.max_batch_size,
                drafts.len()
            )));
        }
        if drafts.is_empty() {
            return Ok(Vec::new());
        }

        let mut new_tasks = Vec::with_capacity(drafts.len());
        for (index, draft) in drafts.into_iter().enumerate() {
            let requested = draft.validate().map_err(|e| match e {
                SchedulerError::Validation(msg) => {
                    SchedulerError::Validation(format!("第 {} 个任务: {msg}", index + 1))
                }
                other => other,
            })?;
            new_tasks.push(NewTask::new(draft.operation, self.priority.resolve(requested)));
        }

        let tasks = self.tasks.create_many(&new_tasks).await?;
        info!(count = tasks.len(), "批量任务已创建");

        self.dispatch(tasks.iter().map(Task::dispatch).collect()).await;
        Ok(tasks)
    }

    pub async fn get_task(&self, id: i64) -> SchedulerResult<Task> {
        self.tasks
            .find_by_id(id)
            .await?
            .ok_or(SchedulerError::TaskNotFound { id })
    }

    #[instrument(skip(self))]
    pub async fn delete_task(&self, id: i64) -> SchedulerResult<()> {
        self.tasks.delete_pending(id).await?;
        info!(task_id = id, "任务已删除");
        Ok(())
    }

    pub async fn health_check(&self) -> SchedulerResult<()> {
        self.tasks.health_check().await
    }

    /// 入队失败不影响已提交的任务，由补偿投递重新入队
    async fn dispatch(&self, dispatches: Vec<TaskDispatch>) {
        if let Err(e) = self.queue.enqueue_batch(dispatches).await {
            warn!(error = %e, "任务已保存但入队失败，等待补偿投递");
        }
    }
}

/// 任务计划服务
pub struct TaskScheduleService {
    schedules: Arc<dyn TaskScheduleRepository>,
    tasks: Arc<dyn TaskRepository>,
}

impl TaskScheduleService {
    pub fn new(
        schedules: Arc<dyn TaskScheduleRepository>,
        tasks: Arc<dyn TaskRepository>,
    ) -> Self {
        Self { schedules, tasks }
    }

    #[instrument(skip(self, draft), fields(operation = %draft.operation))]
    pub async fn create_schedule(&self, draft: TaskScheduleDraft) -> SchedulerResult<TaskSchedule> {
        let new_schedule = draft.into_new_schedule(Utc::now())?;
        let schedule = self.schedules.create(&new_schedule).await?;
        info!(
            task_schedule_id = schedule.task_schedule_id,
            every_x_days = ?schedule.every_x_days,
            every_x_hours = ?schedule.every_x_hours,
            schedule_x_times = schedule.schedule_x_times,
            "任务计划已创建"
        );
        Ok(schedule)
    }

    pub async fn get_schedule(&self, id: i64) -> SchedulerResult<TaskScheduleDetail> {
        let schedule = self
            .schedules
            .find_by_id(id)
            .await?
            .ok_or(SchedulerError::TaskScheduleNotFound { id })?;
        let tasks = self.tasks.find_by_schedule(id).await?;
        Ok(TaskScheduleDetail { schedule, tasks })
    }

    #[instrument(skip(self))]
    pub async fn delete_schedule(&self, id: i64) -> SchedulerResult<()> {
        if !self.schedules.delete(id).await? {
            return Err(SchedulerError::TaskScheduleNotFound { id });
        }
        info!(task_schedule_id = id, "任务计划已删除");
        Ok(())
    }
}
