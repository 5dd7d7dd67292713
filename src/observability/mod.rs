//! 可观测性：控制台 + 日志文件双输出
//!
//! 默认 info，可通过 RUST_LOG 覆盖；日志文件以追加方式写入 `{log_dir}/{log_file}`。

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::AppSection;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// 初始化全局日志，返回日志文件路径；重复调用时保持首次的订阅者不变
pub fn init(app: &AppSection) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(&app.log_dir)?;
    let path = app.log_dir.join(&app.log_file);
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    let installed = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(path = %path.display(), "logging configured");
    }
    Ok(path)
}

/// 仅控制台输出（Web 服务或日志目录不可写时使用）
pub fn init_console() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer())
        .try_init();
}
