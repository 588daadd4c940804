use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Deserialize;
use uuid::Uuid;

use crate::cli::TemplateCmd;
use crate::db::DB;
use crate::models::{Modality, Treino, TreinoExercise};
use crate::remote::SqliteTemplates;
use crate::session::DEFAULT_REPS;
use crate::types::{OutputFmt, best_muscle_suggestion, canonical_muscle, closest_match, emit};
use crate::utils::format_countdown;

/// On-disk template shape: top-level `name`/`rest_secs` plus `[[exercise]]`
/// tables.
#[derive(Deserialize)]
struct TemplateImport {
    name: String,

    #[serde(default = "default_rest")]
    rest_secs: u32,

    #[serde(default)]
    exercise: Vec<ExerciseImport>,
}

#[derive(Deserialize)]
struct ExerciseImport {
    name: String,
    muscle: Option<String>,

    /// One of bodyweight (default), barbell, dumbbell, unilateral.
    modality: Option<String>,

    /// Barbell only.
    bar_weight: Option<f32>,

    #[serde(default = "default_sets")]
    sets: u32,

    #[serde(default = "default_reps")]
    reps: String,

    #[serde(default)]
    follows_previous: bool,
}

fn default_rest() -> u32 {
    90
}

fn default_sets() -> u32 {
    3
}

fn default_reps() -> String {
    DEFAULT_REPS.to_string()
}

pub async fn handle(cmd: TemplateCmd, pool: &DB, fmt: OutputFmt) -> Result<()> {
    let templates = SqliteTemplates::new(pool.clone());

    match cmd {
        TemplateCmd::Import { file } => {
            let path = Path::new(&file);
            let toml_str = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Could not read file: `{}`", file))?;
            let import: TemplateImport = toml::from_str(&toml_str)
                .context("Failed to parse TOML: expected `name` and `[[exercise]]` entries")?;

            if import.name.trim().is_empty() {
                println!("{} template name must not be empty", "error:".red().bold());
                return Ok(());
            }
            if import.exercise.is_empty() {
                println!(
                    "{}",
                    "warning: no [[exercise]] entries found".yellow().bold()
                );
                return Ok(());
            }

            let mut exercises: Vec<TreinoExercise> = Vec::with_capacity(import.exercise.len());
            for (i, ex) in import.exercise.into_iter().enumerate() {
                if ex.name.trim().is_empty() {
                    println!(
                        "{} exercise {} has no name, skipped",
                        "warning:".yellow().bold(),
                        i + 1
                    );
                    continue;
                }

                let muscle = match &ex.muscle {
                    Some(raw) => match canonical_muscle(raw) {
                        Some(m) => Some(m),
                        None => {
                            match best_muscle_suggestion(raw) {
                                Some(sug) => println!(
                                    "{} `{}`: unknown muscle `{}`, leaving unset -- did you mean: `{}`?",
                                    "warning:".yellow().bold(),
                                    ex.name,
                                    raw,
                                    sug.green()
                                ),
                                None => println!(
                                    "{} `{}`: unknown muscle `{}`, leaving unset",
                                    "warning:".yellow().bold(),
                                    ex.name,
                                    raw
                                ),
                            }
                            None
                        }
                    },
                    None => None,
                };

                let modality = match ex.modality.as_deref() {
                    None | Some("bodyweight") => Modality::Bodyweight,
                    Some("barbell") => Modality::Barbell {
                        bar_weight: ex.bar_weight.unwrap_or(20.0),
                    },
                    Some("dumbbell") => Modality::BilateralDumbbell,
                    Some("unilateral") => Modality::Unilateral,
                    Some(other) => {
                        println!(
                            "{} `{}`: unknown modality `{}` (allowed: bodyweight, barbell, dumbbell, unilateral)",
                            "error:".red().bold(),
                            ex.name,
                            other
                        );
                        return Ok(());
                    }
                };

                let mut follows_previous = ex.follows_previous;
                if follows_previous && exercises.is_empty() {
                    println!(
                        "{} `{}`: the first exercise has nothing to follow; flag ignored",
                        "warning:".yellow().bold(),
                        ex.name
                    );
                    follows_previous = false;
                }
                if follows_previous && exercises.last().is_some_and(|p| p.follows_previous) {
                    println!(
                        "{} `{}`: chains are not allowed, pairs only; flag ignored",
                        "warning:".yellow().bold(),
                        ex.name
                    );
                    follows_previous = false;
                }

                exercises.push(TreinoExercise {
                    name: ex.name,
                    muscle,
                    modality,
                    sets: ex.sets.max(1),
                    reps: ex.reps,
                    follows_previous,
                });
            }

            if exercises.is_empty() {
                println!(
                    "{} nothing to import, every exercise was skipped",
                    "warning:".yellow().bold()
                );
                return Ok(());
            }

            let treino = Treino {
                id: Uuid::new_v4().to_string(),
                name: import.name,
                rest_secs: import.rest_secs,
                exercises,
            };

            match templates.import(&treino).await {
                Ok(()) => println!(
                    "{} template `{}` imported ({} exercises)",
                    "ok:".green().bold(),
                    treino.name,
                    treino.exercises.len()
                ),
                Err(e) => {
                    let duplicate = e
                        .downcast_ref::<sqlx::Error>()
                        .and_then(|err| err.as_database_error())
                        .is_some_and(|db| db.code().as_deref() == Some("2067"));
                    if duplicate {
                        // 2067 = SQLITE_CONSTRAINT_UNIQUE
                        println!(
                            "{} template `{}` already exists — use `t list` to view all templates",
                            "warning:".yellow().bold(),
                            treino.name
                        );
                        return Ok(());
                    }
                    return Err(e);
                }
            }
            Ok(())
        }

        TemplateCmd::List => {
            let treinos = templates.all().await?;
            emit(fmt, &treinos, || {
                if treinos.is_empty() {
                    println!("{}", "(no templates)".dimmed());
                    return;
                }
                println!("{}", "Templates:".cyan().bold());
                for (i, t) in treinos.iter().enumerate() {
                    let idx = format!("{}", i + 1).yellow();
                    println!(
                        " {} • {} — {} exercises, rest {}",
                        idx,
                        t.name.bold(),
                        t.exercises.len(),
                        format_countdown(t.rest_secs)
                    );
                }
            });
            Ok(())
        }

        TemplateCmd::Show { name } => {
            let Some(treino) = templates.by_name(&name).await? else {
                return report_missing(&templates, &name).await;
            };
            emit(fmt, &treino, || {
                println!(
                    "{} {} (rest {})",
                    "Template:".cyan().bold(),
                    treino.name.bold(),
                    format_countdown(treino.rest_secs)
                );
                for (i, ex) in treino.exercises.iter().enumerate() {
                    let idx = format!("{}", i + 1).yellow();
                    let muscle = ex.muscle.map(|m| format!(" ({m})")).unwrap_or_default();
                    let paired = if ex.follows_previous {
                        " · paired with previous".dimmed().to_string()
                    } else {
                        String::new()
                    };
                    println!(
                        " {} • {}{} [{}] — {} x {}{}",
                        idx,
                        ex.name.bold(),
                        muscle,
                        ex.modality,
                        ex.sets,
                        ex.reps,
                        paired
                    );
                }
            });
            Ok(())
        }

        TemplateCmd::Delete { name } => {
            if templates.delete(&name).await? {
                println!("{} template `{}` deleted", "ok:".green().bold(), name);
                Ok(())
            } else {
                report_missing(&templates, &name).await
            }
        }
    }
}

async fn report_missing(templates: &SqliteTemplates, name: &str) -> Result<()> {
    let names = templates.names().await?;
    match closest_match(name, names.iter().map(String::as_str)) {
        Some(sug) => println!(
            "{} no template named `{}` -- did you mean: `{}`?",
            "error:".red().bold(),
            name,
            sug.green()
        ),
        None => println!("{} no template named `{}`", "error:".red().bold(), name),
    }
    Ok(())
}
