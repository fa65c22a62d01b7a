//! 数据库行与领域类型之间的转换

use arith_core::{SchedulerError, SchedulerResult};
use arith_domain::TaskStatus;

pub(crate) const TASK_COLUMNS: &str = "task_id, operation, priority, status, result, \
     error_message, task_schedule_id, created_at, updated_at, dispatched_at";

pub(crate) const TASK_SCHEDULE_COLUMNS: &str = "task_schedule_id, operation, priority, \
     every_x_days, every_x_hours, schedule_x_times, checked_scheduling_at, created_at";

pub(crate) fn status_from_db(value: &str) -> SchedulerResult<TaskStatus> {
    value
        .parse()
        .map_err(|e: String| SchedulerError::DatabaseOperation(e))
}

pub(crate) fn priority_from_db(column: &str, value: i64) -> SchedulerResult<u8> {
    u8::try_from(value)
        .ok()
        .filter(|p| *p <= 9)
        .ok_or_else(|| SchedulerError::DatabaseOperation(format!("{column} 超出范围: {value}")))
}

pub(crate) fn optional_priority_from_db(column: &str, value: Option<i64>) -> SchedulerResult<Option<u8>> {
    value.map(|v| priority_from_db(column, v)).transpose()
}

pub(crate) fn count_from_db(column: &str, value: i64) -> SchedulerResult<u32> {
    u32::try_from(value)
        .map_err(|_| SchedulerError::DatabaseOperation(format!("{column} 超出范围: {value}")))
}

pub(crate) fn optional_count_from_db(column: &str, value: Option<i64>) -> SchedulerResult<Option<u32>> {
    value.map(|v| count_from_db(column, v)).transpose()
}

/// INTEGER 列的绑定值，超出范围时拒绝写入
pub(crate) fn int4(column: &str, value: u32) -> SchedulerResult<i32> {
    i32::try_from(value).map_err(|_| {
        SchedulerError::validation(format!("{column} 超出 INTEGER 范围: {value}"))
    })
}

pub(crate) fn optional_int4(column: &str, value: Option<u32>) -> SchedulerResult<Option<i32>> {
    value.map(|v| int4(column, v)).transpose()
}
