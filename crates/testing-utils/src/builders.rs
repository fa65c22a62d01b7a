//! Test data builders with sensible defaults

use chrono::{DateTime, Utc};

use arith_domain::{NewTask, NewTaskSchedule};

/// Builder for [`NewTaskSchedule`]; defaults to an hourly `1+1` run once
pub struct TaskScheduleBuilder {
    schedule: NewTaskSchedule,
}

impl Default for TaskScheduleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskScheduleBuilder {
    pub fn new() -> Self {
        Self {
            schedule: NewTaskSchedule {
                operation: "1+1".to_string(),
                priority: None,
                every_x_days: None,
                every_x_hours: Some(1),
                schedule_x_times: 1,
                checked_scheduling_at: Utc::now(),
            },
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.schedule.operation = operation.to_string();
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.schedule.priority = Some(priority);
        self
    }

    pub fn every_x_hours(mut self, hours: u32) -> Self {
        self.schedule.every_x_hours = Some(hours);
        self
    }

    pub fn every_x_days(mut self, days: u32) -> Self {
        self.schedule.every_x_days = Some(days);
        self
    }

    /// Days only, no hourly cadence
    pub fn daily(mut self, days: u32) -> Self {
        self.schedule.every_x_hours = None;
        self.schedule.every_x_days = Some(days);
        self
    }

    pub fn times(mut self, times: u32) -> Self {
        self.schedule.schedule_x_times = times;
        self
    }

    pub fn checked_at(mut self, checked_at: DateTime<Utc>) -> Self {
        self.schedule.checked_scheduling_at = checked_at;
        self
    }

    pub fn build(self) -> NewTaskSchedule {
        self.schedule
    }
}

/// Builder for [`NewTask`]
pub struct TaskBuilder {
    task: NewTask,
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskBuilder {
    pub fn new() -> Self {
        Self {
            task: NewTask::new("1+1", 5),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.task.operation = operation.to_string();
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn for_schedule(mut self, task_schedule_id: i64) -> Self {
        self.task.task_schedule_id = Some(task_schedule_id);
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.task.created_at = created_at;
        self
    }

    pub fn build(self) -> NewTask {
        self.task
    }
}
