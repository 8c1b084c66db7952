//! 可观测性：tracing 订阅器初始化

use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

/// 默认 info，可通过 RUST_LOG 覆盖。重复调用只告警
pub fn init() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    if tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init()
        .is_err()
    {
        tracing::warn!("Tracing subscriber already initialized");
    }
}
