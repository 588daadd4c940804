use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

use crate::cli::SyncCmd;
use crate::db::DB;
use crate::ports::Connectivity;
use crate::remote::{ConfigConnectivity, SqliteRemote};
use crate::sync::SyncQueue;
use crate::types::{Config, OutputFmt, emit};

#[derive(Serialize)]
struct StatusJson {
    connected: bool,
    pending: usize,
    remote_db: Option<String>,
}

pub async fn handle(cmd: SyncCmd, pool: &DB, config: &Config, fmt: OutputFmt) -> Result<()> {
    let queue = SyncQueue::new(pool.clone());
    let connectivity = ConfigConnectivity::from_config(config);

    match cmd {
        SyncCmd::Status => {
            let pending = queue.pending().await?;
            let status = StatusJson {
                connected: connectivity.is_connected(),
                pending: pending.len(),
                remote_db: config.remote_db().map(str::to_string),
            };
            emit(fmt, &status, || {
                let state = if status.connected {
                    "online".green().bold()
                } else {
                    "offline".yellow().bold()
                };
                println!("{} {}", "Sync:".cyan().bold(), state);
                match &status.remote_db {
                    Some(path) => println!("  remote: {}", path),
                    None => println!("  remote: {}", "(not configured)".dimmed()),
                }
                println!("  pending: {} mutation(s)", status.pending);
            });
            Ok(())
        }

        SyncCmd::Queue => {
            let pending = queue.pending().await?;
            emit(fmt, &pending, || {
                if pending.is_empty() {
                    println!("{}", "(queue empty)".dimmed());
                    return;
                }
                println!("{}", "Pending mutations:".cyan().bold());
                for m in &pending {
                    let retries = if m.retries > 0 {
                        format!(" · {} failed attempt(s)", m.retries)
                            .yellow()
                            .to_string()
                    } else {
                        String::new()
                    };
                    println!(
                        " {} • {} {}{}",
                        format!("{}", m.seq).yellow(),
                        m.kind.as_str().bold(),
                        m.created_at.format("%d/%m %H:%M"),
                        retries
                    );
                }
            });
            Ok(())
        }

        SyncCmd::Drain => {
            let Some(remote_path) = config.remote_db() else {
                println!(
                    "{} no remote configured; set one with `config set remote_db <path>`",
                    "warning:".yellow().bold()
                );
                return Ok(());
            };

            let remote = SqliteRemote::connect(Path::new(remote_path)).await?;
            let report = queue.drain(&remote, &connectivity).await?;
            if !report.connected {
                println!(
                    "{} offline; nothing drained (unset `offline` to sync)",
                    "warning:".yellow().bold()
                );
                return Ok(());
            }
            println!(
                "{} {} synced, {} failed, {} dropped",
                "ok:".green().bold(),
                report.synced,
                report.failed,
                report.dropped
            );
            Ok(())
        }
    }
}
