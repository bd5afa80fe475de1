//! 可观测性：tracing 订阅器初始化
//!
//! 日志级别由 RUST_LOG 控制，未设置时为 info；工具审计日志在 target `bee_engine::tools::executor` 下。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 安装全局订阅器；已安装过则返回 false
pub fn init() -> bool {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .try_init()
        .is_ok()
}

/// 测试用：输出到测试捕获的 writer
pub fn init_for_tests() -> bool {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with(fmt::layer().with_test_writer())
        .try_init()
        .is_ok()
}
