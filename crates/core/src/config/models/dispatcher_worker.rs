use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub enabled: bool,
    pub schedule_interval_seconds: u64,
    /// 单次批处理最多锁定的计划数
    pub batch_limit: i64,
    pub reconcile_interval_seconds: u64,
    /// PENDING 任务超过该时长仍未执行时重新投递
    pub pending_grace_period_seconds: u64,
    pub reconcile_batch_limit: i64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            schedule_interval_seconds: 60,
            batch_limit: 100,
            reconcile_interval_seconds: 60,
            pending_grace_period_seconds: 300,
            reconcile_batch_limit: 500,
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.schedule_interval_seconds == 0 {
            return Err(anyhow::anyhow!("调度间隔必须大于0"));
        }

        if self.batch_limit <= 0 {
            return Err(anyhow::anyhow!("批处理计划数上限必须大于0"));
        }

        if self.reconcile_interval_seconds == 0 {
            return Err(anyhow::anyhow!("补偿投递间隔必须大于0"));
        }

        if self.reconcile_batch_limit <= 0 {
            return Err(anyhow::anyhow!("补偿投递数量上限必须大于0"));
        }

        Ok(())
    }

    pub fn schedule_interval(&self) -> Duration {
        Duration::from_secs(self.schedule_interval_seconds)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_seconds)
    }

    pub fn pending_grace_period(&self) -> Duration {
        Duration::from_secs(self.pending_grace_period_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub enabled: bool,
    pub worker_id: String,
    pub max_concurrent_tasks: usize,
    /// 基础设施错误的最大重试次数
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub retry_jitter: bool,
    pub execution_timeout_seconds: u64,
    /// 模拟计算耗时
    pub processing_delay_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            worker_id: "worker-001".to_string(),
            max_concurrent_tasks: 4,
            max_retries: 5,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 600_000,
            retry_jitter: true,
            execution_timeout_seconds: 30,
            processing_delay_ms: 0,
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_id.is_empty() {
            return Err(anyhow::anyhow!("Worker ID不能为空"));
        }

        if self.max_concurrent_tasks == 0 {
            return Err(anyhow::anyhow!("最大并发任务数必须大于0"));
        }

        if self.retry_base_delay_ms == 0 {
            return Err(anyhow::anyhow!("重试基础延迟必须大于0"));
        }

        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return Err(anyhow::anyhow!("最大重试延迟不能小于基础延迟"));
        }

        if self.execution_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("任务执行超时时间必须大于0"));
        }

        Ok(())
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_seconds)
    }

    pub fn processing_delay(&self) -> Duration {
        Duration::from_millis(self.processing_delay_ms)
    }
}
