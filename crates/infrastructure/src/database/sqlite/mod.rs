pub mod sqlite_schedule_batch;
pub mod sqlite_task_repository;
pub mod sqlite_task_schedule_repository;

pub use sqlite_schedule_batch::{SqliteScheduleBatch, SqliteScheduleBatchStore};
pub use sqlite_task_repository::SqliteTaskRepository;
pub use sqlite_task_schedule_repository::SqliteTaskScheduleRepository;

use std::str::FromStr;
use std::time::Duration;

use arith_core::{DatabaseConfig, SchedulerResult};
use arith_domain::{Task, TaskSchedule};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::database::mapping::{
    count_from_db, optional_count_from_db, optional_priority_from_db, priority_from_db,
    status_from_db,
};

/// 建立SQLite连接池：启用外键与WAL，写锁等待最长30秒
pub async fn connect(config: &DatabaseConfig) -> SchedulerResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
        .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// 运行数据库迁移
pub async fn run_migrations(pool: &SqlitePool) -> SchedulerResult<()> {
    debug!("Running SQLite database migrations");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_schedules (
            task_schedule_id INTEGER PRIMARY KEY AUTOINCREMENT,
            operation TEXT NOT NULL,
            priority INTEGER CHECK (priority BETWEEN 0 AND 9),
            every_x_days INTEGER CHECK (every_x_days >= 1),
            every_x_hours INTEGER CHECK (every_x_hours >= 1),
            schedule_x_times INTEGER NOT NULL DEFAULT 1 CHECK (schedule_x_times >= 0),
            checked_scheduling_at DATETIME NOT NULL,
            claim_token TEXT,
            created_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            task_id INTEGER PRIMARY KEY AUTOINCREMENT,
            operation TEXT NOT NULL,
            priority INTEGER NOT NULL CHECK (priority BETWEEN 0 AND 9),
            status TEXT NOT NULL DEFAULT 'PENDING'
                CHECK (status IN ('PENDING', 'STARTED', 'SUCCESS', 'ERROR')),
            result REAL,
            error_message TEXT,
            task_schedule_id INTEGER
                REFERENCES task_schedules(task_schedule_id) ON DELETE SET NULL,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            dispatched_at DATETIME NOT NULL
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

    debug!("Successfully completed SQLite database migrations");
    Ok(())
}

pub(crate) fn row_to_task(row: &SqliteRow) -> SchedulerResult<Task> {
    let status: String = row.try_get("status")?;

    Ok(Task {
        task_id: row.try_get("task_id")?,
        operation: row.try_get("operation")?,
        priority: priority_from_db("priority", row.try_get("priority")?)?,
        status: status_from_db(&status)?,
        result: row.try_get("result")?,
        error_message: row.try_get("error_message")?,
        task_schedule_id: row.try_get("task_schedule_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        dispatched_at: row.try_get("dispatched_at")?,
    })
}

pub(crate) fn row_to_task_schedule(row: &SqliteRow) -> SchedulerResult<TaskSchedule> {
    Ok(TaskSchedule {
        task_schedule_id: row.try_get("task_schedule_id")?,
        operation: row.try_get("operation")?,
        priority: optional_priority_from_db("priority", row.try_get("priority")?)?,
        every_x_days: optional_count_from_db("every_x_days", row.try_get("every_x_days")?)?,
        every_x_hours: optional_count_from_db("every_x_hours", row.try_get("every_x_hours")?)?,
        schedule_x_times: count_from_db("schedule_x_times", row.try_get("schedule_x_times")?)?,
        checked_scheduling_at: row.try_get("checked_scheduling_at")?,
        created_at: row.try_get("created_at")?,
    })
}
