//! 计划到期检查链
//!
//! 每条规则是一个独立的谓词，全部通过时计划才会生成新任务。
//! 规则只读取传入的上下文，不产生副作用，因此可以单独测试，
//! 新的周期规则通过 [`DueCheckChain::with_check`] 追加即可。

use chrono::{DateTime, Duration, Utc};
use tracing::trace;

use crate::entities::{Task, TaskSchedule};

/// 一次检查所需的全部输入
#[derive(Debug, Clone, Copy)]
pub struct DueCheckContext<'a> {
    pub schedule: &'a TaskSchedule,
    /// 该计划最近创建的任务
    pub last_task: Option<&'a Task>,
    pub now: DateTime<Utc>,
}

pub type DueCheck = fn(&DueCheckContext<'_>) -> bool;

/// 有序的检查规则列表，逻辑与
#[derive(Clone)]
pub struct DueCheckChain {
    checks: Vec<(&'static str, DueCheck)>,
}

impl Default for DueCheckChain {
    fn default() -> Self {
        Self::standard()
    }
}

impl DueCheckChain {
    /// 空链，任何计划都视为到期
    pub fn empty() -> Self {
        Self { checks: Vec::new() }
    }

    /// 次数检查 → 小时间隔 → 天数间隔
    pub fn standard() -> Self {
        Self::empty()
            .with_check("remaining_runs", remaining_runs_check)
            .with_check("every_x_hours", hours_elapsed_check)
            .with_check("every_x_days", days_elapsed_check)
    }

    pub fn with_check(mut self, name: &'static str, check: DueCheck) -> Self {
        self.checks.push((name, check));
        self
    }

    pub fn check_names(&self) -> Vec<&'static str> {
        self.checks.iter().map(|(name, _)| *name).collect()
    }

    pub fn is_due(&self, schedule: &TaskSchedule, last_task: Option<&Task>) -> bool {
        self.is_due_at(schedule, last_task, Utc::now())
    }

    pub fn is_due_at(
        &self,
        schedule: &TaskSchedule,
        last_task: Option<&Task>,
        now: DateTime<Utc>,
    ) -> bool {
        let context = DueCheckContext {
            schedule,
            last_task,
            now,
        };
        self.evaluate(&context)
    }

    pub fn evaluate(&self, context: &DueCheckContext<'_>) -> bool {
        for (name, check) in &self.checks {
            if !check(context) {
                trace!(
                    task_schedule_id = context.schedule.task_schedule_id,
                    check = name,
                    "计划未到期"
                );
                return false;
            }
        }
        true
    }
}

/// 剩余次数必须为正
pub fn remaining_runs_check(context: &DueCheckContext<'_>) -> bool {
    context.schedule.schedule_x_times > 0
}

pub fn hours_elapsed_check(context: &DueCheckContext<'_>) -> bool {
    interval_elapsed(
        context,
        context.schedule.every_x_hours.map(|h| Duration::hours(i64::from(h))),
    )
}

pub fn days_elapsed_check(context: &DueCheckContext<'_>) -> bool {
    interval_elapsed(
        context,
        context.schedule.every_x_days.map(|d| Duration::days(i64::from(d))),
    )
}

/// 未设置间隔或没有历史任务时通过；恰好到达间隔时视为到期
///
/// 间隔超出可表示的时间范围时视为未到期。
fn interval_elapsed(context: &DueCheckContext<'_>, interval: Option<Duration>) -> bool {
    match (interval, context.last_task) {
        (Some(interval), Some(last_task)) => context
            .now
            .checked_sub_signed(interval)
            .is_some_and(|threshold| last_task.created_at <= threshold),
        _ => true,
    }
}
