//! 日志初始化
//!
//! 宿主进程调用一次即可；`RUST_LOG` 优先于传入的默认级别。
//!
use tracing_subscriber::EnvFilter;

/// 安装 fmt 订阅器；已有全局订阅器时返回 `false`
pub fn init_tracing(default_level: &str) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
