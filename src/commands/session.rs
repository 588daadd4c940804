use std::io::{self, Write};

use anyhow::Result;
use chrono::{Local, Utc};
use colored::Colorize;

use crate::cli::SessionCmd;
use crate::db::DB;
use crate::models::{Modality, Serie, SetKind, WorkoutLog};
use crate::remote::{ConfigProfile, SqliteTemplates};
use crate::session::{DEFAULT_REPS, StartSource, current_pointer};
use crate::timer::{Pulse, TimerKind, pulse_at};
use crate::types::{Config, OutputFmt, closest_match, emit};
use crate::utils::{format_countdown, format_duration};

use super::{narrate, one_based, resume_engine, user_error};

pub async fn handle(cmd: SessionCmd, pool: &DB, config: &Config, fmt: OutputFmt) -> Result<()> {
    let (mut engine, settled) = resume_engine(pool).await?;
    narrate(&settled);

    match cmd {
        SessionCmd::Start { template } => {
            let templates = SqliteTemplates::new(pool.clone());

            // Resolve the template name to its id first.
            let template_id = match &template {
                Some(name) => match templates.by_name(name).await? {
                    Some(treino) => Some(treino.id),
                    None => {
                        let names = templates.names().await?;
                        match closest_match(name, names.iter().map(String::as_str)) {
                            Some(sug) => println!(
                                "{} no template named `{}` -- did you mean: `{}`?",
                                "error:".red().bold(),
                                name,
                                sug.green()
                            ),
                            None => println!(
                                "{} no template named `{}`",
                                "error:".red().bold(),
                                name
                            ),
                        }
                        return Ok(());
                    }
                },
                None => None,
            };
            let source = match template_id.as_deref() {
                Some(id) => StartSource::Template(id),
                None => StartSource::Freeform,
            };

            let profiles = ConfigProfile::from_config(config);
            if let Err(e) = engine
                .start(source, &templates, &profiles, &config.user_id(), Utc::now())
                .await
            {
                return user_error(e);
            }

            if let Some(log) = engine.session() {
                println!(
                    "{} session started: {}",
                    "ok:".green().bold(),
                    log.name.bold()
                );
                if log.entries.is_empty() {
                    println!(
                        "{} add exercises with `session add-ex`",
                        "info:".blue().bold()
                    );
                } else {
                    print_entries(log);
                }
            }
            Ok(())
        }

        SessionCmd::Show => {
            let Some(log) = engine.session() else {
                println!("{} no active session", "error:".red().bold());
                return Ok(());
            };
            emit(fmt, log, || print_session(log));
            Ok(())
        }

        SessionCmd::Done => {
            if engine.session().is_none() {
                println!("{} no active session", "error:".red().bold());
                return Ok(());
            }
            let events = engine.complete_current_set(Utc::now()).await?;
            if events.is_empty() {
                println!(
                    "{} nothing to complete -- add exercises first",
                    "info:".blue().bold()
                );
            }
            narrate(&events);
            Ok(())
        }

        SessionCmd::Begin => {
            if engine.session().is_none() {
                println!("{} no active session", "error:".red().bold());
                return Ok(());
            }
            match engine.begin_timed_set(Utc::now()).await {
                Ok(events) => {
                    if events.is_empty() {
                        println!(
                            "{} nothing to start -- add exercises first",
                            "info:".blue().bold()
                        );
                    }
                    narrate(&events);
                    Ok(())
                }
                Err(e) => user_error(e),
            }
        }

        SessionCmd::Skip => {
            if engine.skip_timer().await? {
                println!("{} timer skipped", "ok:".green().bold());
            } else {
                println!("{} no timer running", "info:".blue().bold());
            }
            Ok(())
        }

        SessionCmd::Watch => {
            {
                let Some(log) = engine.session() else {
                    println!("{} no active session", "error:".red().bold());
                    return Ok(());
                };
                if log.timer.is_none() {
                    println!("{} no timer running", "info:".blue().bold());
                    return Ok(());
                }
            }
            // The countdown is on screen, so no notification should fire.
            engine.set_foreground(true).await?;

            loop {
                let now = Utc::now();
                let events = engine.tick(now).await?;
                if !events.is_empty() {
                    println!();
                    print!("\x07");
                    narrate(&events);
                }

                let Some((remaining, kind, progress)) = engine
                    .session()
                    .and_then(|log| log.timer.as_ref())
                    .map(|t| (t.remaining(now), t.kind, t.progress(now)))
                else {
                    break;
                };
                let what = match kind {
                    TimerKind::Rest => "rest",
                    TimerKind::Exercise => "exercise",
                };
                print!(
                    "\r{} {} {} {}   ",
                    "watch:".cyan().bold(),
                    what,
                    progress_bar(progress),
                    format_countdown(remaining)
                );
                match pulse_at(remaining) {
                    Some(Pulse::Strong) => print!("\x07\x07"),
                    Some(Pulse::Light) => print!("\x07"),
                    None => {}
                }
                io::stdout().flush()?;
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
            Ok(())
        }

        SessionCmd::Edit {
            exercise,
            set,
            weight,
            reps,
        } => {
            if engine.session().is_none() {
                println!("{} no active session", "error:".red().bold());
                return Ok(());
            }
            let Some(ex) = one_based(exercise) else {
                return Ok(());
            };
            let Some(st) = one_based(set) else {
                return Ok(());
            };
            if weight.is_none() && reps.is_none() {
                println!(
                    "{} nothing to change; pass --weight or --reps",
                    "info:".blue().bold()
                );
                return Ok(());
            }
            if let Err(e) = engine.update_set(ex, st, weight, reps.as_deref()).await {
                return user_error(e);
            }
            println!("{} set {} updated", "ok:".green().bold(), set);
            Ok(())
        }

        SessionCmd::Sets { exercise, count } => {
            if engine.session().is_none() {
                println!("{} no active session", "error:".red().bold());
                return Ok(());
            }
            let Some(ex) = one_based(exercise) else {
                return Ok(());
            };
            if count == 0 {
                println!(
                    "{} an exercise needs at least one set; use `set rm` to remove it",
                    "error:".red().bold()
                );
                return Ok(());
            }

            let Some(series) = engine
                .session()
                .and_then(|log| log.entries.get(ex))
                .map(|entry| resized(&entry.series, count as usize))
            else {
                println!("{} no such exercise", "error:".red().bold());
                return Ok(());
            };
            if let Err(e) = engine.edit_series(ex, series).await {
                return user_error(e);
            }

            let len = engine
                .session()
                .and_then(|log| log.entries.get(ex))
                .map(|entry| entry.series.len())
                .unwrap_or(0);
            println!(
                "{} exercise {} now has {} sets",
                "ok:".green().bold(),
                exercise,
                len
            );
            Ok(())
        }

        SessionCmd::Biset { exercise } => {
            if engine.session().is_none() {
                println!("{} no active session", "error:".red().bold());
                return Ok(());
            }
            let Some(ex) = one_based(exercise) else {
                return Ok(());
            };
            match engine.toggle_biset(ex).await {
                Ok(true) => println!(
                    "{} exercise {} now pairs with the previous one",
                    "ok:".green().bold(),
                    exercise
                ),
                Ok(false) => println!("{} exercise {} unpaired", "ok:".green().bold(), exercise),
                Err(e) => return user_error(e),
            }
            Ok(())
        }

        SessionCmd::Name { name } => {
            if engine.session().is_none() {
                println!("{} no active session", "error:".red().bold());
                return Ok(());
            }
            engine.rename(&name).await?;
            println!("{} session renamed to `{}`", "ok:".green().bold(), name);
            Ok(())
        }

        SessionCmd::Note { exercise, note } => {
            if engine.session().is_none() {
                println!("{} no active session", "error:".red().bold());
                return Ok(());
            }
            let Some(ex) = one_based(exercise) else {
                return Ok(());
            };
            let cleared = note.is_none();
            if let Err(e) = engine.set_note(ex, note).await {
                return user_error(e);
            }
            if cleared {
                println!("{} note cleared", "ok:".green().bold());
            } else {
                println!("{} note saved", "ok:".green().bold());
            }
            Ok(())
        }

        SessionCmd::AddEx {
            name,
            muscle,
            sets,
            reps,
            rest,
            barbell,
            dumbbell,
            unilateral,
        } => {
            if engine.session().is_none() {
                println!("{} no active session", "error:".red().bold());
                return Ok(());
            }
            if sets == 0 {
                println!("{} an exercise needs at least one set", "error:".red().bold());
                return Ok(());
            }
            let modality = if let Some(bar_weight) = barbell {
                Modality::Barbell { bar_weight }
            } else if dumbbell {
                Modality::BilateralDumbbell
            } else if unilateral {
                Modality::Unilateral
            } else {
                Modality::Bodyweight
            };
            engine
                .add_exercise(&name, muscle, modality, sets, &reps, rest)
                .await?;
            println!("{} `{}` added: {} x {}", "ok:".green().bold(), name, sets, reps);
            Ok(())
        }

        SessionCmd::Finish => {
            let events = engine.finish(Utc::now()).await?;
            if events.is_empty() {
                println!("{} no active session", "error:".red().bold());
            } else {
                narrate(&events);
            }
            Ok(())
        }

        SessionCmd::Cancel => {
            if engine.abandon().await? {
                println!(
                    "{} session cancelled, nothing queued for sync",
                    "ok:".green().bold()
                );
            } else {
                println!("{} no active session to cancel", "error:".red().bold());
            }
            Ok(())
        }
    }
}

fn progress_bar(progress: f32) -> String {
    const WIDTH: usize = 20;
    let filled = ((progress * WIDTH as f32).round() as usize).min(WIDTH);
    format!("[{}{}]", "#".repeat(filled), "-".repeat(WIDTH - filled))
}

/// Copy of `series` grown (duplicating the last set) or shrunk to `count`.
fn resized(series: &[Serie], count: usize) -> Vec<Serie> {
    let mut out = series.to_vec();
    out.truncate(count);
    while out.len() < count {
        let next = match out.last() {
            Some(last) => last.duplicate(),
            None => Serie::new(DEFAULT_REPS, None),
        };
        out.push(next);
    }
    out
}

fn print_session(log: &WorkoutLog) {
    println!("{} {}", "Session:".cyan().bold(), log.name.bold());
    let elapsed = Utc::now().signed_duration_since(log.started_at);
    println!(
        "  started {} · {} elapsed · {:.1}kg total",
        log.started_at.with_timezone(&Local).format("%H:%M"),
        format_duration(elapsed),
        log.total_load
    );
    println!();

    if log.entries.is_empty() {
        println!("{}", "(no exercises yet)".dimmed());
    } else {
        print_entries(log);
    }

    if let Some(timer) = &log.timer {
        let what = match timer.kind {
            TimerKind::Rest => "rest",
            TimerKind::Exercise => "exercise",
        };
        println!(
            "\n{} {} · {} left",
            "Timer:".cyan().bold(),
            what,
            format_countdown(timer.remaining(Utc::now()))
        );
    }
}

fn print_entries(log: &WorkoutLog) {
    let pointer = current_pointer(log);
    for (i, entry) in log.entries.iter().enumerate() {
        let idx = format!("{}", i + 1).yellow();
        let muscle = entry.muscle.map(|m| format!(" ({m})")).unwrap_or_default();
        let linked = if entry.follows_previous {
            " · paired with previous".dimmed().to_string()
        } else {
            String::new()
        };
        println!(
            " {} • {}{} [{}]{}",
            idx,
            entry.name.bold(),
            muscle,
            entry.modality,
            linked
        );

        for (j, serie) in entry.series.iter().enumerate() {
            let current = pointer.is_some_and(|p| p.exercise == i && p.set == j);
            let marker = if serie.completed {
                "[x]".green().to_string()
            } else if current {
                "[>]".cyan().bold().to_string()
            } else {
                "[ ]".to_string()
            };
            let target = if serie.time_based {
                format!("{}s", serie.reps)
            } else {
                serie.reps.clone()
            };
            let weight = serie
                .weight
                .map(|w| format!(" @ {}kg", w))
                .unwrap_or_default();
            let mut tags = String::new();
            if serie.kind == SetKind::Dropset {
                tags.push_str(&format!(" {}", "drop".magenta()));
            }
            if serie.warmup {
                tags.push_str(&format!(" {}", "warmup".yellow()));
            }
            println!("     {} {}. {}{}{}", marker, j + 1, target, weight, tags);
        }

        if let Some(note) = &entry.notes {
            println!("     {} {}", "note:".blue().bold(), note);
        }
    }
}
