//! 可观测性：tracing 订阅器初始化（仅二进制入口调用，库本身不安装订阅器）

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 默认 info 级别，RUST_LOG 可覆盖
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}
