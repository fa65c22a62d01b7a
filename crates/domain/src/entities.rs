//! 领域实体

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 任务状态：PENDING → STARTED → {SUCCESS, ERROR}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Started,
    Success,
    Error,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Started => "STARTED",
            TaskStatus::Success => "SUCCESS",
            TaskStatus::Error => "ERROR",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Error)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TaskStatus::Pending),
            "STARTED" => Ok(TaskStatus::Started),
            "SUCCESS" => Ok(TaskStatus::Success),
            "ERROR" => Ok(TaskStatus::Error),
            other => Err(format!("未知的任务状态: {other}")),
        }
    }
}

/// 一次具体的算术任务
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: i64,
    pub operation: String,
    pub priority: u8,
    pub status: TaskStatus,
    /// 仅在 SUCCESS 时存在
    pub result: Option<f64>,
    /// 仅在 ERROR 时存在
    pub error_message: Option<String>,
    pub task_schedule_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub dispatched_at: DateTime<Utc>,
}

impl Task {
    pub fn dispatch(&self) -> TaskDispatch {
        TaskDispatch::new(self.task_id, self.priority)
    }
}

/// 待插入的任务行
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub operation: String,
    pub priority: u8,
    pub task_schedule_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl NewTask {
    pub fn new(operation: impl Into<String>, priority: u8) -> Self {
        Self {
            operation: operation.into(),
            priority,
            task_schedule_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn for_schedule(mut self, task_schedule_id: i64) -> Self {
        self.task_schedule_id = Some(task_schedule_id);
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// 执行器写入的终态
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Success(f64),
    Error(String),
}

impl TaskOutcome {
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskOutcome::Success(_) => TaskStatus::Success,
            TaskOutcome::Error(_) => TaskStatus::Error,
        }
    }

    pub fn result(&self) -> Option<f64> {
        match self {
            TaskOutcome::Success(value) => Some(*value),
            TaskOutcome::Error(_) => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            TaskOutcome::Success(_) => None,
            TaskOutcome::Error(message) => Some(message),
        }
    }
}

/// 周期性任务计划
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSchedule {
    pub task_schedule_id: i64,
    pub operation: String,
    /// 为空时在生成任务时随机决定
    pub priority: Option<u8>,
    pub every_x_days: Option<u32>,
    pub every_x_hours: Option<u32>,
    /// 剩余可生成的任务次数
    pub schedule_x_times: u32,
    pub checked_scheduling_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTaskSchedule {
    pub operation: String,
    pub priority: Option<u8>,
    pub every_x_days: Option<u32>,
    pub every_x_hours: Option<u32>,
    pub schedule_x_times: u32,
    pub checked_scheduling_at: DateTime<Utc>,
}

/// 计划详情，附带其生成的任务
#[derive(Debug, Clone, Serialize)]
pub struct TaskScheduleDetail {
    #[serde(flatten)]
    pub schedule: TaskSchedule,
    pub tasks: Vec<Task>,
}

/// 投递到执行队列的消息体
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDispatch {
    pub task_id: i64,
    pub priority: u8,
    /// 基础设施错误导致的重投次数
    #[serde(default)]
    pub attempt: u32,
}

impl TaskDispatch {
    pub fn new(task_id: i64, priority: u8) -> Self {
        Self {
            task_id,
            priority,
            attempt: 0,
        }
    }

    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..*self
        }
    }
}
