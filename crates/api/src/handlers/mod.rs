pub mod health;
pub mod task_schedules;
pub mod tasks;
