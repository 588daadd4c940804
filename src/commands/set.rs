use anyhow::Result;
use colored::Colorize;

use crate::cli::SetCmd;
use crate::db::DB;
use crate::session::DEFAULT_DURATION;

use super::{narrate, one_based, resume_engine, user_error};

pub async fn handle(cmd: SetCmd, pool: &DB) -> Result<()> {
    let (mut engine, settled) = resume_engine(pool).await?;
    narrate(&settled);

    if engine.session().is_none() {
        println!("{} no active session", "error:".red().bold());
        return Ok(());
    }

    let (exercise, set) = match cmd {
        SetCmd::Drop { exercise, set }
        | SetCmd::Copy { exercise, set }
        | SetCmd::Rm { exercise, set }
        | SetCmd::Time { exercise, set }
        | SetCmd::Warmup { exercise, set }
        | SetCmd::Reopen { exercise, set } => (exercise, set),
    };
    let Some(ex) = one_based(exercise) else {
        return Ok(());
    };
    let Some(st) = one_based(set) else {
        return Ok(());
    };

    match cmd {
        SetCmd::Drop { .. } => {
            if let Err(e) = engine.add_dropset(ex, st).await {
                return user_error(e);
            }
            println!("{} dropset added after set {}", "ok:".green().bold(), set);
        }

        SetCmd::Copy { .. } => {
            if let Err(e) = engine.copy_set(ex, st).await {
                return user_error(e);
            }
            println!("{} set {} duplicated", "ok:".green().bold(), set);
        }

        SetCmd::Rm { .. } => match engine.remove_set(ex, st).await {
            Ok(true) => println!(
                "{} set {} removed; exercise {} had no sets left and was removed too",
                "ok:".green().bold(),
                set,
                exercise
            ),
            Ok(false) => println!("{} set {} removed", "ok:".green().bold(), set),
            Err(e) => return user_error(e),
        },

        SetCmd::Time { .. } => match engine.toggle_time_based(ex, st).await {
            Ok(true) => println!(
                "{} set {} is now time-based ({}s)",
                "ok:".green().bold(),
                set,
                DEFAULT_DURATION
            ),
            Ok(false) => println!("{} set {} is back to reps", "ok:".green().bold(), set),
            Err(e) => return user_error(e),
        },

        SetCmd::Warmup { .. } => match engine.toggle_warmup(ex, st).await {
            Ok(true) => println!("{} set {} marked as warmup", "ok:".green().bold(), set),
            Ok(false) => println!(
                "{} warmup flag removed from set {}",
                "ok:".green().bold(),
                set
            ),
            Err(e) => return user_error(e),
        },

        SetCmd::Reopen { .. } => {
            if let Err(e) = engine.reopen_set(ex, st).await {
                return user_error(e);
            }
            println!(
                "{} set {} reopened; its load left the total",
                "ok:".green().bold(),
                set
            );
        }
    }
    Ok(())
}
