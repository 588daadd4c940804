use std::{
    collections::{BTreeMap, HashSet},
    fmt::Display,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::ValueEnum;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use sqlx::prelude::Type;
use strsim::jaro_winkler;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Muscle {
    Biceps,
    Triceps,
    Forearms,
    Chest,
    Shoulders,
    Back,
    Quads,
    Hamstrings,
    Glutes,
    Calves,
    Abs,
}

impl Display for Muscle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Biceps => "biceps",
            Self::Triceps => "triceps",
            Self::Forearms => "forearms",
            Self::Chest => "chest",
            Self::Shoulders => "shoulders",
            Self::Back => "back",
            Self::Quads => "quads",
            Self::Hamstrings => "hamstrings",
            Self::Glutes => "glutes",
            Self::Calves => "calves",
            Self::Abs => "abs",
        };

        write!(f, "{}", s)
    }
}

impl Muscle {
    /// Title-case label used when composing suggested workout names.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Biceps => "Biceps",
            Self::Triceps => "Triceps",
            Self::Forearms => "Forearms",
            Self::Chest => "Chest",
            Self::Shoulders => "Shoulders",
            Self::Back => "Back",
            Self::Quads => "Quads",
            Self::Hamstrings => "Hamstrings",
            Self::Glutes => "Glutes",
            Self::Calves => "Calves",
            Self::Abs => "Abs",
        }
    }
}

pub static ALLOWED_MUSCLES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "biceps",
        "triceps",
        "forearms",
        "chest",
        "shoulders",
        "back",
        "quads",
        "hamstrings",
        "glutes",
        "calves",
        "abs",
    ])
});

/// Returns the parsed muscle for a case-insensitive name, or `None` if the
/// name is not in the allowed set.
pub fn canonical_muscle<S: AsRef<str>>(m: S) -> Option<Muscle> {
    let lowered = m.as_ref().to_ascii_lowercase();
    match lowered.as_str() {
        "biceps" => Some(Muscle::Biceps),
        "triceps" => Some(Muscle::Triceps),
        "forearms" => Some(Muscle::Forearms),
        "chest" => Some(Muscle::Chest),
        "shoulders" => Some(Muscle::Shoulders),
        "back" => Some(Muscle::Back),
        "quads" => Some(Muscle::Quads),
        "hamstrings" => Some(Muscle::Hamstrings),
        "glutes" => Some(Muscle::Glutes),
        "calves" => Some(Muscle::Calves),
        "abs" => Some(Muscle::Abs),
        _ => None,
    }
}

/// Return the candidate closest to `input` if the similarity is ≥ 0.80
/// *and* clearly better than the runner-up. Otherwise `None` (no
/// suggestion shown).
pub fn closest_match<'a, I>(input: &str, candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let inp = input.to_ascii_lowercase();

    let mut scores: Vec<(&'a str, f64)> = candidates
        .into_iter()
        .map(|c| (c, jaro_winkler(&inp, &c.to_ascii_lowercase())))
        .collect();

    if scores.is_empty() {
        return None;
    }

    // Highest score first.
    scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let (best, best_score) = scores[0];
    let second_score = scores.get(1).map(|(_, s)| *s).unwrap_or(0.0);

    const MIN_SCORE: f64 = 0.80;
    const GAP: f64 = 0.02;

    if best_score >= MIN_SCORE && best_score - second_score >= GAP {
        Some(best)
    } else {
        None
    }
}

pub fn best_muscle_suggestion(input: &str) -> Option<&'static str> {
    closest_match(input, ALLOWED_MUSCLES.iter().copied())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFmt {
    Pretty,
    Json,
}

/// Emit either machine-readable JSON or the pretty rendering, depending on
/// the global `--json` flag.
pub fn emit<T: Serialize>(fmt: OutputFmt, data: &T, pretty: impl FnOnce()) {
    match fmt {
        OutputFmt::Json => {
            let body = serde_json::to_string_pretty(data).unwrap_or_else(|_| "null".to_string());
            println!("{}", body);
        }
        OutputFmt::Pretty => pretty(),
    }
}

//
// Config
//

pub const CFG_USER_ID: &str = "user_id";
pub const CFG_BODY_WEIGHT: &str = "body_weight";
pub const CFG_REMOTE_DB: &str = "remote_db";
pub const CFG_OFFLINE: &str = "offline";

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub map: BTreeMap<String, String>,
}

impl Config {
    pub fn path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|d| d.join("ferro").join("config.toml"))
            .context("Could not determine config directory")
    }

    /// Loads the config file, treating a missing file as an empty config.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                toml::from_str(&content).with_context(|| format!("parsing `{}`", path.display()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("reading `{}`", path.display())),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating `{}`", parent.display()))?;
        }
        let content = toml::to_string(self).context("serializing config")?;
        std::fs::write(path, content).with_context(|| format!("writing `{}`", path.display()))
    }

    pub fn user_id(&self) -> String {
        self.map
            .get(CFG_USER_ID)
            .cloned()
            .unwrap_or_else(|| "local-user".to_string())
    }

    pub fn body_weight(&self) -> Option<f32> {
        self.map.get(CFG_BODY_WEIGHT).and_then(|v| v.parse().ok())
    }

    pub fn remote_db(&self) -> Option<&str> {
        self.map.get(CFG_REMOTE_DB).map(String::as_str)
    }

    pub fn offline(&self) -> bool {
        self.map
            .get(CFG_OFFLINE)
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false)
    }
}
