//! SAM - 无头命令行入口
//!
//! 用法：`sam [--config <path>] <session-id> <message…>`
//! 消息为 `/clear` 时清空会话，为 `/compact` 时压缩会话，否则跑一轮并打印回复。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use tokio_util::sync::CancellationToken;
use sam_agent::agent::create_agent_components;
use sam_agent::config::load_config;
use sam_agent::observability;
use sam_agent::tools::ToolRegistry;

/// `/compact` 默认保留的最近消息数
const COMPACT_KEEP_RECENT: usize = 4;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let mut config_path = None;
    if args.first().map(String::as_str) == Some("--config") {
        if args.len() < 2 {
            bail!("--config requires a path");
        }
        config_path = Some(PathBuf::from(args.remove(1)));
        args.remove(0);
    }
    if args.len() < 2 {
        bail!("usage: sam [--config <path>] <session-id> <message...>");
    }
    let session_id = args.remove(0);
    let message = args.join(" ");

    let cfg = load_config(config_path).context("Failed to load config")?;
    // 具体工具由外部提供；这里只装配一个空注册表
    let components = create_agent_components(&cfg, Arc::new(ToolRegistry::new()), None)
        .context("Failed to create agent")?;
    let orchestrator = &components.orchestrator;

    let reply = match message.trim() {
        "/clear" => orchestrator.clear_context(&session_id).await?,
        "/compact" => orchestrator
            .compact_conversation(&session_id, COMPACT_KEEP_RECENT)
            .await?,
        _ => {
            // Ctrl-C 在下一次迭代开始时取消本轮
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_signal.cancel();
                }
            });
            let report = orchestrator.run_turn(&session_id, &message, &cancel).await;
            if !report.is_finished() {
                tracing::warn!(outcome = ?report.outcome, iterations = report.iterations, "turn did not finish");
            }
            report.reply
        }
    };
    println!("{reply}");
    Ok(())
}
