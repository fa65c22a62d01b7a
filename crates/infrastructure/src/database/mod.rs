pub mod manager;
pub(crate) mod mapping;
pub mod postgres;
pub mod sqlite;

pub use manager::{DatabaseManager, DatabasePool, DatabaseType};
pub use postgres::{
    PostgresScheduleBatchStore, PostgresTaskRepository, PostgresTaskScheduleRepository,
};
pub use sqlite::{SqliteScheduleBatchStore, SqliteTaskRepository, SqliteTaskScheduleRepository};
