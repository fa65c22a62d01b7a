//! 入口参数校验

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::entities::NewTaskSchedule;
use crate::operation::is_valid_operation;
use crate::priority::{MAX_PRIORITY, MIN_PRIORITY};
use arith_core::{SchedulerError, SchedulerResult};

/// 周期间隔上限，约一百年
pub const MAX_EVERY_X_DAYS: u32 = 36_500;
pub const MAX_EVERY_X_HOURS: u32 = MAX_EVERY_X_DAYS * 24;
/// 与存储层 INTEGER 列的范围一致
pub const MAX_SCHEDULE_X_TIMES: u32 = i32::MAX as u32;

/// 创建任务的请求
#[derive(Debug, Clone, Deserialize)]
pub struct TaskDraft {
    pub operation: String,
    #[serde(default)]
    pub priority: Option<i64>,
}

impl TaskDraft {
    pub fn new(operation: impl Into<String>, priority: Option<i64>) -> Self {
        Self {
            operation: operation.into(),
            priority,
        }
    }

    /// 校验通过后返回规范化的优先级
    pub fn validate(&self) -> SchedulerResult<Option<u8>> {
        validate_operation(&self.operation)?;
        validate_priority(self.priority)
    }
}

/// 创建任务计划的请求
#[derive(Debug, Clone, Deserialize)]
pub struct TaskScheduleDraft {
    pub operation: String,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub every_x_days: Option<i64>,
    #[serde(default)]
    pub every_x_hours: Option<i64>,
    #[serde(default)]
    pub schedule_x_times: Option<i64>,
}

impl TaskScheduleDraft {
    pub fn into_new_schedule(self, now: DateTime<Utc>) -> SchedulerResult<NewTaskSchedule> {
        validate_operation(&self.operation)?;
        let priority = validate_priority(self.priority)?;

        if self.every_x_days.is_none() && self.every_x_hours.is_none() {
            return Err(SchedulerError::validation(
                "every_x_days 和 every_x_hours 至少需要设置一个",
            ));
        }
        let every_x_days = bounded("every_x_days", self.every_x_days, MAX_EVERY_X_DAYS)?;
        let every_x_hours = bounded("every_x_hours", self.every_x_hours, MAX_EVERY_X_HOURS)?;
        let schedule_x_times =
            bounded("schedule_x_times", self.schedule_x_times, MAX_SCHEDULE_X_TIMES)?.unwrap_or(1);

        Ok(NewTaskSchedule {
            operation: self.operation,
            priority,
            every_x_days,
            every_x_hours,
            schedule_x_times,
            checked_scheduling_at: now,
        })
    }
}

pub fn validate_operation(operation: &str) -> SchedulerResult<()> {
    if is_valid_operation(operation) {
        Ok(())
    } else {
        Err(SchedulerError::validation(format!(
            "operation 格式无效: {operation:?}，应为 number+number，例如 1.5+2"
        )))
    }
}

pub fn validate_priority(priority: Option<i64>) -> SchedulerResult<Option<u8>> {
    match priority {
        None => Ok(None),
        Some(p) if (i64::from(MIN_PRIORITY)..=i64::from(MAX_PRIORITY)).contains(&p) => {
            Ok(u8::try_from(p).ok())
        }
        Some(p) => Err(SchedulerError::validation(format!(
            "priority 必须在 {MIN_PRIORITY} 到 {MAX_PRIORITY} 之间，当前为 {p}"
        ))),
    }
}

/// 1 到 `max` 之间的整数
fn bounded(field: &str, value: Option<i64>, max: u32) -> SchedulerResult<Option<u32>> {
    match value {
        None => Ok(None),
        Some(v) => match u32::try_from(v) {
            Ok(v) if (1..=max).contains(&v) => Ok(Some(v)),
            _ => Err(SchedulerError::validation(format!(
                "{field} 必须在 1 到 {max} 之间，当前为 {v}"
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_draft_validation() {
        assert_eq!(TaskDraft::new("1+1", None).validate().unwrap(), None);
        assert_eq!(TaskDraft::new("1.5+2", Some(9)).validate().unwrap(), Some(9));
        assert_eq!(TaskDraft::new("1+1", Some(0)).validate().unwrap(), Some(0));

        assert!(TaskDraft::new("1+1", Some(10)).validate().is_err());
        assert!(TaskDraft::new("1+1", Some(-1)).validate().is_err());
        assert!(TaskDraft::new("1-1", None).validate().is_err());
    }

    #[test]
    fn test_schedule_requires_cadence() {
        let draft = TaskScheduleDraft {
            operation: "1+1".to_string(),
            priority: None,
            every_x_days: None,
            every_x_hours: None,
            schedule_x_times: Some(2),
        };
        let err = draft.into_new_schedule(Utc::now()).unwrap_err();
        assert!(matches!(err, SchedulerError::Validation(_)));
    }

    #[test]
    fn test_schedule_defaults_and_bounds() {
        let now = Utc::now();
        let draft = TaskScheduleDraft {
            operation: "1+1".to_string(),
            priority: Some(3),
            every_x_days: None,
            every_x_hours: Some(6),
            schedule_x_times: None,
        };
        let schedule = draft.into_new_schedule(now).unwrap();
        assert_eq!(schedule.schedule_x_times, 1);
        assert_eq!(schedule.every_x_hours, Some(6));
        assert_eq!(schedule.priority, Some(3));
        assert_eq!(schedule.checked_scheduling_at, now);

        for (days, hours, times) in [
            (Some(0), None, None),
            (None, Some(-2), None),
            (Some(1), None, Some(0)),
            (Some(100_000_000), None, None),
            (None, Some(4_000_000_000), None),
            (Some(1), None, Some(3_000_000_000)),
        ] {
            let draft = TaskScheduleDraft {
                operation: "1+1".to_string(),
                priority: None,
                every_x_days: days,
                every_x_hours: hours,
                schedule_x_times: times,
            };
            assert!(draft.into_new_schedule(now).is_err());
        }
    }

    #[test]
    fn test_schedule_bounds_are_inclusive() {
        let draft = TaskScheduleDraft {
            operation: "1+1".to_string(),
            priority: None,
            every_x_days: Some(i64::from(MAX_EVERY_X_DAYS)),
            every_x_hours: Some(i64::from(MAX_EVERY_X_HOURS)),
            schedule_x_times: Some(i64::from(MAX_SCHEDULE_X_TIMES)),
        };
        let schedule = draft.into_new_schedule(Utc::now()).unwrap();
        assert_eq!(schedule.every_x_days, Some(MAX_EVERY_X_DAYS));
        assert_eq!(schedule.schedule_x_times, MAX_SCHEDULE_X_TIMES);
    }
}
