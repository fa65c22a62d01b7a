//! 任务优先级解析：未指定时在 0-9 之间均匀随机

use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Mutex;

pub const MIN_PRIORITY: u8 = 0;
pub const MAX_PRIORITY: u8 = 9;

/// 纯函数：显式优先级原样返回，否则从熵源取 0-9
pub fn resolve_priority<R: Rng + ?Sized>(requested: Option<u8>, rng: &mut R) -> u8 {
    match requested {
        Some(priority) => priority,
        None => rng.random_range(MIN_PRIORITY..=MAX_PRIORITY),
    }
}

/// 可注入的优先级来源
pub trait PriorityResolver: Send + Sync {
    fn resolve(&self, requested: Option<u8>) -> u8;
}

/// 使用线程本地随机数
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomPriority;

impl PriorityResolver for RandomPriority {
    fn resolve(&self, requested: Option<u8>) -> u8 {
        resolve_priority(requested, &mut rand::rng())
    }
}

/// 固定种子，结果可复现
#[derive(Debug)]
pub struct SeededPriority {
    rng: Mutex<StdRng>,
}

impl SeededPriority {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl PriorityResolver for SeededPriority {
    fn resolve(&self, requested: Option<u8>) -> u8 {
        match self.rng.lock() {
            Ok(mut rng) => resolve_priority(requested, &mut *rng),
            Err(poisoned) => resolve_priority(requested, &mut *poisoned.into_inner()),
        }
    }
}

/// 未指定时总是返回同一个值
#[derive(Debug, Clone, Copy)]
pub struct FixedPriority(pub u8);

impl PriorityResolver for FixedPriority {
    fn resolve(&self, requested: Option<u8>) -> u8 {
        requested.unwrap_or(self.0)
    }
}
