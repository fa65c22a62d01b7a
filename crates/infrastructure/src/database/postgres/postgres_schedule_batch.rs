//! PostgreSQL 批量调度事务
//!
//! 计划行通过 `FOR UPDATE SKIP LOCKED` 加锁，多个调度实例各自处理互不重叠的计划子集。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

use super::{row_to_task, row_to_task_schedule, PostgresTaskRepository};
use crate::database::mapping::{TASK_COLUMNS, TASK_SCHEDULE_COLUMNS};
use arith_core::{SchedulerError, SchedulerResult};
use arith_domain::{CommitHook, NewTask, ScheduleBatch, ScheduleBatchStore, Task, TaskSchedule};

pub struct PostgresScheduleBatchStore {
    pool: PgPool,
}

impl PostgresScheduleBatchStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScheduleBatchStore for PostgresScheduleBatchStore {
    async fn begin(&self) -> SchedulerResult<Box<dyn ScheduleBatch>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresScheduleBatch {
            tx,
            hooks: Vec::new(),
        }))
    }
}

pub struct PostgresScheduleBatch {
    tx: Transaction<'static, Postgres>,
    hooks: Vec<CommitHook>,
}

#[async_trait]
impl ScheduleBatch for PostgresScheduleBatch {
    async fn lock_due_schedules(&mut self, limit: i64) -> SchedulerResult<Vec<TaskSchedule>> {
        let sql = format!(
            "SELECT {TASK_SCHEDULE_COLUMNS} FROM task_schedules
             WHERE schedule_x_times > 0
             ORDER BY checked_scheduling_at, task_schedule_id
             LIMIT $1
             FOR UPDATE SKIP LOCKED"
        );
        let rows = sqlx::query(&sql)
            .bind(limit)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(row_to_task_schedule).collect()
    }

    async fn latest_task(&mut self, task_schedule_id: i64) -> SchedulerResult<Option<Task>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE task_schedule_id = $1
             ORDER BY created_at DESC, task_id DESC LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(task_schedule_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn insert_task(&mut self, task: &NewTask) -> SchedulerResult<Task> {
        PostgresTaskRepository::insert(&mut *self.tx, task).await
    }

    async fn consume_run(
        &mut self,
        task_schedule_id: i64,
        checked_at: DateTime<Utc>,
    ) -> SchedulerResult<()> {
        let updated = sqlx::query(
            "UPDATE task_schedules
             SET schedule_x_times = schedule_x_times - 1, checked_scheduling_at = $1
             WHERE task_schedule_id = $2 AND schedule_x_times > 0",
        )
        .bind(checked_at)
        .bind(task_schedule_id)
        .execute(&mut *self.tx)
        .await?
        .rows_affected();

        if updated != 1 {
            return Err(SchedulerError::DatabaseOperation(format!(
                "任务计划 {task_schedule_id} 剩余次数已耗尽"
            )));
        }
        Ok(())
    }

    async fn touch(
        &mut self,
        task_schedule_id: i64,
        checked_at: DateTime<Utc>,
    ) -> SchedulerResult<()> {
        sqlx::query("UPDATE task_schedules SET checked_scheduling_at = $1 WHERE task_schedule_id = $2")
            .bind(checked_at)
            .bind(task_schedule_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    fn on_commit(&mut self, hook: CommitHook) {
        self.hooks.push(hook);
    }

    async fn commit(self: Box<Self>) -> SchedulerResult<()> {
        let PostgresScheduleBatch { tx, hooks } = *self;
        tx.commit().await?;
        debug!(hooks = hooks.len(), "PostgreSQL批量调度事务已提交");

        for hook in hooks {
            hook().await;
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> SchedulerResult<()> {
        let PostgresScheduleBatch { tx, .. } = *self;
        tx.rollback().await?;
        Ok(())
    }
}
