use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

use super::row_to_task;
use crate::database::mapping::{status_from_db, TASK_COLUMNS};
use arith_core::{SchedulerError, SchedulerResult};
use arith_domain::{NewTask, Task, TaskOutcome, TaskRepository, TaskStatus};

pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub(crate) async fn insert<'c, E>(executor: E, task: &NewTask) -> SchedulerResult<Task>
    where
        E: sqlx::Executor<'c, Database = sqlx::Sqlite>,
    {
        let sql = format!(
            "INSERT INTO tasks (operation, priority, status, task_schedule_id, created_at, updated_at, dispatched_at)
             VALUES (?, ?, 'PENDING', ?, ?, ?, ?)
             RETURNING {TASK_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&task.operation)
            .bind(i64::from(task.priority))
            .bind(task.task_schedule_id)
            .bind(task.created_at)
            .bind(task.created_at)
            .bind(task.created_at)
            .fetch_one(executor)
            .await?;
        row_to_task(&row)
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    #[instrument(skip(self, task), fields(operation = %task.operation))]
    async fn create(&self, task: &NewTask) -> SchedulerResult<Task> {
        let created = Self::insert(&self.pool, task).await?;
        debug!(task_id = created.task_id, "任务行已写入");
        Ok(created)
    }

    async fn create_many(&self, tasks: &[NewTask]) -> SchedulerResult<Vec<Task>> {
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(tasks.len());
        for task in tasks {
            created.push(Self::insert(&mut *tx, task).await?);
        }
        tx.commit().await?;
        debug!(count = created.len(), "批量任务行已写入");
        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE task_id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn find_by_schedule(&self, task_schedule_id: i64) -> SchedulerResult<Vec<Task>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE task_schedule_id = ? ORDER BY created_at, task_id"
        );
        let rows = sqlx::query(&sql)
            .bind(task_schedule_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_task).collect()
    }

    #[instrument(skip(self))]
    async fn delete_pending(&self, id: i64) -> SchedulerResult<()> {
        let deleted = sqlx::query("DELETE FROM tasks WHERE task_id = ? AND status = 'PENDING'")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if deleted > 0 {
            return Ok(());
        }

        let status: Option<String> = sqlx::query("SELECT status FROM tasks WHERE task_id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row.try_get("status"))
            .transpose()?;

        match status {
            None => Err(SchedulerError::TaskNotFound { id }),
            Some(status) => Err(SchedulerError::TaskNotDeletable {
                id,
                status: status_from_db(&status)?.to_string(),
            }),
        }
    }

    async fn mark_started(&self, id: i64) -> SchedulerResult<bool> {
        let updated = sqlx::query(
            "UPDATE tasks SET status = 'STARTED', updated_at = ? WHERE task_id = ? AND status = 'PENDING'",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated == 1)
    }

    async fn finish(&self, id: i64, outcome: &TaskOutcome) -> SchedulerResult<bool> {
        let updated = sqlx::query(
            "UPDATE tasks SET status = ?, result = ?, error_message = ?, updated_at = ?
             WHERE task_id = ? AND status = ?",
        )
        .bind(outcome.status().as_str())
        .bind(outcome.result())
        .bind(outcome.error_message())
        .bind(Utc::now())
        .bind(id)
        .bind(TaskStatus::Started.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated == 1)
    }

    async fn claim_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
        limit: i64,
    ) -> SchedulerResult<Vec<Task>> {
        let sql = format!(
            "UPDATE tasks SET dispatched_at = ?
             WHERE task_id IN (
                 SELECT task_id FROM tasks
                 WHERE status = 'PENDING' AND dispatched_at <= ?
                 ORDER BY dispatched_at, task_id
                 LIMIT ?
             )
             RETURNING {TASK_COLUMNS}"
        );
        let rows = sqlx::query(&sql)
            .bind(now)
            .bind(cutoff)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        let mut tasks = rows.iter().map(row_to_task).collect::<SchedulerResult<Vec<_>>>()?;
        tasks.sort_by_key(|t| t.task_id);
        Ok(tasks)
    }

    async fn health_check(&self) -> SchedulerResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
