//! Jarvis - 命令行 REPL
//!
//! 入口：初始化日志、加载配置、构建会话管理器，逐行读取 stdin 并打印回复。
//! 命令：/reset 清空对话，/history 打印线程，/quit 退出。
//! 用法：jarvis [config.toml]

use std::path::PathBuf;

use anyhow::Context;
use jarvis::{agent, config::load_config, memory::Role, observability, providers::Providers};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    let providers = Providers::from_config(&cfg);
    let manager =
        agent::create_session_manager(&cfg, providers).context("Failed to create session")?;

    let name = cfg.app.name.clone().unwrap_or_else(|| "Jarvis".to_string());
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        match input {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                manager.reset().await;
                println!("(conversation cleared)");
            }
            "/history" => {
                for msg in manager.history().await {
                    let who = match msg.role {
                        Role::User => "user",
                        Role::Assistant => "assistant",
                        Role::ToolCall => "tool_call",
                        Role::ToolResult => "tool_result",
                    };
                    println!("[{}] {}: {}", msg.agent, who, msg.content);
                }
            }
            text => {
                let reply = agent::process_message(&manager, text).await;
                println!("{}: {}", name, reply);
            }
        }
    }

    Ok(())
}
