pub mod config;
pub mod session;
pub mod set;
pub mod sync;
pub mod template;

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use colored::Colorize;

use crate::db::DB;
use crate::remote::TracingNotifier;
use crate::session::{EngineError, EngineEvent, SessionEngine};
use crate::storage::SessionStore;
use crate::sync::SyncQueue;
use crate::utils::format_countdown;

/// Engine over the local database, resumed from the stored session. Timer
/// transitions that came due while no process was running are applied here;
/// the returned events describe them.
pub(crate) async fn resume_engine(pool: &DB) -> Result<(SessionEngine, Vec<EngineEvent>)> {
    let mut engine = SessionEngine::new(
        SessionStore::new(pool.clone()),
        SyncQueue::new(pool.clone()),
        Arc::new(TracingNotifier),
    );
    engine.resume().await?;
    let settled = engine.tick(Utc::now()).await?;
    Ok((engine, settled))
}

/// Prints what the engine did, one line per event.
pub(crate) fn narrate(events: &[EngineEvent]) {
    for event in events {
        match event {
            EngineEvent::SetCompleted {
                exercise,
                set_number,
                breakdown,
            } => println!(
                "{} {} set {}: {}",
                "ok:".green().bold(),
                exercise.bold(),
                set_number,
                breakdown
            ),
            EngineEvent::RestStarted { secs } => println!(
                "{} resting {}",
                "info:".blue().bold(),
                format_countdown(*secs)
            ),
            EngineEvent::ExerciseTimerStarted { secs } => println!(
                "{} go! {} on the clock",
                "info:".blue().bold(),
                format_countdown(*secs)
            ),
            EngineEvent::RestFinished => {
                println!("{} rest over", "info:".blue().bold())
            }
            EngineEvent::ExerciseTimerFinished => {
                println!("{} time!", "info:".blue().bold())
            }
            EngineEvent::SessionFinished {
                name,
                total_load,
                series_completed,
            } => println!(
                "{} session `{}` finished: {} sets, {:.1}kg total",
                "ok:".green().bold(),
                name,
                series_completed,
                total_load
            ),
        }
    }
}

/// Engine errors are user mistakes: print them and carry on. Anything else
/// propagates.
pub(crate) fn user_error(e: anyhow::Error) -> Result<()> {
    match e.downcast_ref::<EngineError>() {
        Some(err) => {
            println!("{} {}", "error:".red().bold(), err);
            Ok(())
        }
        None => Err(e),
    }
}

/// CLI indexes are 1-based, the engine's are 0-based.
pub(crate) fn one_based(n: usize) -> Option<usize> {
    let idx = n.checked_sub(1);
    if idx.is_none() {
        println!("{} indexes are 1-based", "error:".red().bold());
    }
    idx
}
