pub mod postgres_schedule_batch;
pub mod postgres_task_repository;
pub mod postgres_task_schedule_repository;

pub use postgres_schedule_batch::{PostgresScheduleBatch, PostgresScheduleBatchStore};
pub use postgres_task_repository::PostgresTaskRepository;
pub use postgres_task_schedule_repository::PostgresTaskScheduleRepository;

use std::time::Duration;

use arith_core::{DatabaseConfig, SchedulerResult};
use arith_domain::{Task, TaskSchedule};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::database::mapping::{
    count_from_db, optional_count_from_db, optional_priority_from_db, priority_from_db,
    status_from_db,
};

pub async fn connect(config: &DatabaseConfig) -> SchedulerResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
        .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.url)
        .await?;

    Ok(pool)
}

/// 运行数据库迁移
pub async fn run_migrations(pool: &PgPool) -> SchedulerResult<()> {
    debug!("Running PostgreSQL database migrations");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_schedules (
            task_schedule_id BIGSERIAL PRIMARY KEY,
            operation TEXT NOT NULL,
            priority INTEGER CHECK (priority BETWEEN 0 AND 9),
            every_x_days INTEGER CHECK (every_x_days >= 1),
            every_x_hours INTEGER CHECK (every_x_hours >= 1),
            schedule_x_times INTEGER NOT NULL DEFAULT 1 CHECK (schedule_x_times >= 0),
            checked_scheduling_at TIMESTAMPTZ NOT NULL,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            task_id BIGSERIAL PRIMARY KEY,
            operation TEXT NOT NULL,
            priority INTEGER NOT NULL CHECK (priority BETWEEN 0 AND 9),
            status TEXT NOT NULL DEFAULT 'PENDING'
                CHECK (status IN ('PENDING', 'STARTED', 'SUCCESS', 'ERROR')),
            result DOUBLE PRECISION,
            error_message TEXT,
            task_schedule_id BIGINT
                REFERENCES task_schedules(task_schedule_id) ON DELETE SET NULL,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            dispatched_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_task_schedules_checked_scheduling_at ON task_schedules(checked_scheduling_at)",
        "CREATE INDEX IF NOT EXISTS idx_tasks_schedule_created_at ON tasks(task_schedule_id, created_at)",
        "CREATE INDEX IF NOT EXISTS idx_tasks_status_dispatched_at ON tasks(status, dispatched_at)",
    ];

    for index_sql in indexes {
        sqlx::query(index_sql).execute(pool).await?;
    }

    debug!("Successfully completed PostgreSQL database migrations");
    Ok(())
}

pub(crate) fn row_to_task(row: &PgRow) -> SchedulerResult<Task> {
    let status: String = row.try_get("status")?;
    let priority: i32 = row.try_get("priority")?;

    Ok(Task {
        task_id: row.try_get("task_id")?,
        operation: row.try_get("operation")?,
        priority: priority_from_db("priority", i64::from(priority))?,
        status: status_from_db(&status)?,
        result: row.try_get("result")?,
        error_message: row.try_get("error_message")?,
        task_schedule_id: row.try_get("task_schedule_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        dispatched_at: row.try_get("dispatched_at")?,
    })
}

pub(crate) fn row_to_task_schedule(row: &PgRow) -> SchedulerResult<TaskSchedule> {
    let priority: Option<i32> = row.try_get("priority")?;
    let every_x_days: Option<i32> = row.try_get("every_x_days")?;
    let every_x_hours: Option<i32> = row.try_get("every_x_hours")?;
    let schedule_x_times: i32 = row.try_get("schedule_x_times")?;

    Ok(TaskSchedule {
        task_schedule_id: row.try_get("task_schedule_id")?,
        operation: row.try_get("operation")?,
        priority: optional_priority_from_db("priority", priority.map(i64::from))?,
        every_x_days: optional_count_from_db("every_x_days", every_x_days.map(i64::from))?,
        every_x_hours: optional_count_from_db("every_x_hours", every_x_hours.map(i64::from))?,
        schedule_x_times: count_from_db("schedule_x_times", i64::from(schedule_x_times))?,
        checked_scheduling_at: row.try_get("checked_scheduling_at")?,
        created_at: row.try_get("created_at")?,
    })
}
