//! SQLite 批量调度事务
//!
//! SQLite 没有行级锁，事务以 `BEGIN IMMEDIATE` 开始，先拿到数据库写锁再选择计划；
//! 并发批次因此串行执行，而不会重复处理同一计划。被选中的计划在事务内打上
//! 本批次的 claim_token，后续的递减和时间戳更新都以该令牌为条件。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{row_to_task, row_to_task_schedule, SqliteTaskRepository};
use crate::database::mapping::{TASK_COLUMNS, TASK_SCHEDULE_COLUMNS};
use arith_core::{SchedulerError, SchedulerResult};
use arith_domain::{CommitHook, NewTask, ScheduleBatch, ScheduleBatchStore, Task, TaskSchedule};

pub struct SqliteScheduleBatchStore {
    pool: SqlitePool,
}

impl SqliteScheduleBatchStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScheduleBatchStore for SqliteScheduleBatchStore {
    async fn begin(&self) -> SchedulerResult<Box<dyn ScheduleBatch>> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let claim_token = Uuid::new_v4().to_string();
        debug!(claim_token = %claim_token, "SQLite批量调度事务已开始");

        Ok(Box::new(SqliteScheduleBatch {
            conn: Some(conn),
            claim_token,
            hooks: Vec::new(),
        }))
    }
}

pub struct SqliteScheduleBatch {
    conn: Option<PoolConnection<Sqlite>>,
    claim_token: String,
    hooks: Vec<CommitHook>,
}

impl SqliteScheduleBatch {
    fn conn(&mut self) -> SchedulerResult<&mut SqliteConnection> {
        self.conn
            .as_deref_mut()
            .ok_or_else(|| SchedulerError::Internal("批量调度事务已结束".to_string()))
    }

    fn expect_claimed(&self, task_schedule_id: i64, updated: u64) -> SchedulerResult<()> {
        if updated == 1 {
            Ok(())
        } else {
            Err(SchedulerError::DatabaseOperation(format!(
                "任务计划 {task_schedule_id} 不属于当前批次 {}",
                self.claim_token
            )))
        }
    }

    /// 结束事务并归还连接；语句失败时丢弃连接，由SQLite回滚未完成的事务
    async fn finish(&mut self, statement: &str) -> SchedulerResult<()> {
        let Some(mut conn) = self.conn.take() else {
            return Err(SchedulerError::Internal("批量调度事务已结束".to_string()));
        };
        match sqlx::query(statement).execute(&mut *conn).await {
            Ok(_) => Ok(()),
            Err(e) => {
                drop(conn.detach());
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl ScheduleBatch for SqliteScheduleBatch {
    async fn lock_due_schedules(&mut self, limit: i64) -> SchedulerResult<Vec<TaskSchedule>> {
        let sql = format!(
            "UPDATE task_schedules SET claim_token = ?
             WHERE task_schedule_id IN (
                 SELECT task_schedule_id FROM task_schedules
                 WHERE schedule_x_times > 0
                 ORDER BY checked_scheduling_at, task_schedule_id
                 LIMIT ?
             )
             RETURNING {TASK_SCHEDULE_COLUMNS}"
        );
        let token = self.claim_token.clone();
        let rows = sqlx::query(&sql)
            .bind(token)
            .bind(limit)
            .fetch_all(self.conn()?)
            .await?;

        let mut schedules = rows
            .iter()
            .map(row_to_task_schedule)
            .collect::<SchedulerResult<Vec<_>>>()?;
        schedules.sort_by_key(|s| (s.checked_scheduling_at, s.task_schedule_id));
        Ok(schedules)
    }

    async fn latest_task(&mut self, task_schedule_id: i64) -> SchedulerResult<Option<Task>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE task_schedule_id = ?
             ORDER BY created_at DESC, task_id DESC LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(task_schedule_id)
            .fetch_optional(self.conn()?)
            .await?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn insert_task(&mut self, task: &NewTask) -> SchedulerResult<Task> {
        SqliteTaskRepository::insert(self.conn()?, task).await
    }

    async fn consume_run(
        &mut self,
        task_schedule_id: i64,
        checked_at: DateTime<Utc>,
    ) -> SchedulerResult<()> {
        let token = self.claim_token.clone();
        let updated = sqlx::query(
            "UPDATE task_schedules
             SET schedule_x_times = schedule_x_times - 1, checked_scheduling_at = ?, claim_token = NULL
             WHERE task_schedule_id = ? AND claim_token = ? AND schedule_x_times > 0",
        )
        .bind(checked_at)
        .bind(task_schedule_id)
        .bind(token)
        .execute(self.conn()?)
        .await?
        .rows_affected();
        self.expect_claimed(task_schedule_id, updated)
    }

    async fn touch(
        &mut self,
        task_schedule_id: i64,
        checked_at: DateTime<Utc>,
    ) -> SchedulerResult<()> {
        let token = self.claim_token.clone();
        let updated = sqlx::query(
            "UPDATE task_schedules SET checked_scheduling_at = ?, claim_token = NULL
             WHERE task_schedule_id = ? AND claim_token = ?",
        )
        .bind(checked_at)
        .bind(task_schedule_id)
        .bind(token)
        .execute(self.conn()?)
        .await?
        .rows_affected();
        self.expect_claimed(task_schedule_id, updated)
    }

    fn on_commit(&mut self, hook: CommitHook) {
        self.hooks.push(hook);
    }

    async fn commit(self: Box<Self>) -> SchedulerResult<()> {
        let mut batch = self;
        let token = batch.claim_token.clone();
        let released = sqlx::query("UPDATE task_schedules SET claim_token = NULL WHERE claim_token = ?")
            .bind(token)
            .execute(batch.conn()?)
            .await;
        if let Err(e) = released {
            if let Err(rollback_err) = batch.finish("ROLLBACK").await {
                warn!(error = %rollback_err, "回滚SQLite批量调度事务失败");
            }
            return Err(e.into());
        }

        batch.finish("COMMIT").await?;
        debug!(hooks = batch.hooks.len(), "SQLite批量调度事务已提交");

        for hook in std::mem::take(&mut batch.hooks) {
            hook().await;
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> SchedulerResult<()> {
        let mut batch = self;
        batch.hooks.clear();
        batch.finish("ROLLBACK").await
    }
}

impl Drop for SqliteScheduleBatch {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            warn!(claim_token = %self.claim_token, "批量调度事务未结束即被丢弃，关闭连接以回滚");
            drop(conn.detach());
        }
    }
}
