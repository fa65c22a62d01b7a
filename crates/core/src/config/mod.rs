//! 应用配置：TOML文件 + 环境变量覆盖。

pub mod models;
