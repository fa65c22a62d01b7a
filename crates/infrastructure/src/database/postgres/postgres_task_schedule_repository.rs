use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tracing::{debug, instrument};

use super::row_to_task_schedule;
use crate::database::mapping::{int4, optional_int4, TASK_SCHEDULE_COLUMNS};
use arith_core::SchedulerResult;
use arith_domain::{NewTaskSchedule, TaskSchedule, TaskScheduleRepository};

pub struct PostgresTaskScheduleRepository {
    pool: PgPool,
}

impl PostgresTaskScheduleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskScheduleRepository for PostgresTaskScheduleRepository {
    #[instrument(skip(self, schedule), fields(operation = %schedule.operation))]
    async fn create(&self, schedule: &NewTaskSchedule) -> SchedulerResult<TaskSchedule> {
        let sql = format!(
            "INSERT INTO task_schedules
                 (operation, priority, every_x_days, every_x_hours, schedule_x_times, checked_scheduling_at, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {TASK_SCHEDULE_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&schedule.operation)
            .bind(schedule.priority.map(i32::from))
            .bind(optional_int4("every_x_days", schedule.every_x_days)?)
            .bind(optional_int4("every_x_hours", schedule.every_x_hours)?)
            .bind(int4("schedule_x_times", schedule.schedule_x_times)?)
            .bind(schedule.checked_scheduling_at)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await?;

        let created = row_to_task_schedule(&row)?;
        debug!(task_schedule_id = created.task_schedule_id, "任务计划行已写入");
        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<TaskSchedule>> {
        let sql = format!("SELECT {TASK_SCHEDULE_COLUMNS} FROM task_schedules WHERE task_schedule_id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_task_schedule).transpose()
    }

    /// 正在被批量调度锁定的计划会等待该批次提交后再删除
    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> SchedulerResult<bool> {
        let mut tx = self.pool.begin().await?;

        let detached = sqlx::query("UPDATE tasks SET task_schedule_id = NULL WHERE task_schedule_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let deleted = sqlx::query("DELETE FROM task_schedules WHERE task_schedule_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        debug!(task_schedule_id = id, detached, "任务计划删除完成");
        Ok(deleted > 0)
    }
}
