use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{timer::ActiveTimer, types::Muscle};

/// Prefix of identifiers minted on this device. A log keeps its `local-` id
/// until the remote store assigns the definitive one during sync.
pub const LOCAL_ID_PREFIX: &str = "local-";

pub fn local_id() -> String {
    format!("{}{}", LOCAL_ID_PREFIX, Uuid::new_v4())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetKind {
    Normal,
    Dropset,
}

/// How an exercise is loaded. Resolved once when the entry is created so the
/// load calculator never has to re-derive it from optional fields.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Modality {
    /// Load comes from the lifter's own body weight.
    Bodyweight,
    /// Fixed bar plus plates; recorded set weight is per side.
    Barbell { bar_weight: f32 },
    /// One dumbbell per hand, recorded weight is per dumbbell.
    BilateralDumbbell,
    /// Single implement or cable; recorded weight is the whole load.
    Unilateral,
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bodyweight => write!(f, "bodyweight"),
            Self::Barbell { bar_weight } => write!(f, "barbell, {}kg bar", bar_weight),
            Self::BilateralDumbbell => write!(f, "dumbbell"),
            Self::Unilateral => write!(f, "unilateral"),
        }
    }
}

/// One unit of work within an exercise entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Serie {
    pub id: String,
    /// Target reps as entered: "12", "8-12", or a duration in seconds when
    /// `time_based` is set.
    pub reps: String,
    /// Omitted for bodyweight movements; per side for barbell work.
    pub weight: Option<f32>,
    pub kind: SetKind,
    pub time_based: bool,
    pub warmup: bool,
    pub completed: bool,
}

impl Serie {
    pub fn new(reps: &str, weight: Option<f32>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            reps: reps.to_string(),
            weight,
            kind: SetKind::Normal,
            time_based: false,
            warmup: false,
            completed: false,
        }
    }

    /// A dropset seeded from its parent: same rep target, 70% of the weight.
    pub fn dropset_from(parent: &Serie) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            reps: parent.reps.clone(),
            weight: parent.weight.map(|w| (w * 0.7 * 10.0).round() / 10.0),
            kind: SetKind::Dropset,
            time_based: parent.time_based,
            warmup: false,
            completed: false,
        }
    }

    /// In-place duplicate with a fresh identifier.
    pub fn duplicate(&self) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            completed: false,
            ..self.clone()
        }
    }
}

/// An exercise inside a live session: a template reference plus its ordered
/// sets, notes, and the rest configured between its sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseEntry {
    pub id: String,
    pub name: String,
    pub muscle: Option<Muscle>,
    pub modality: Modality,
    pub series: Vec<Serie>,
    pub notes: Option<String>,
    pub rest_secs: u32,
    /// Marks this entry as the follower half of a bi-set with the entry
    /// before it. Linked neighbours keep equal series counts.
    pub follows_previous: bool,
}

impl ExerciseEntry {
    pub fn new(name: &str, modality: Modality, rest_secs: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            muscle: None,
            modality,
            series: Vec::new(),
            notes: None,
            rest_secs,
            follows_previous: false,
        }
    }

    pub fn has_completed_set(&self) -> bool {
        self.series.iter().any(|s| s.completed)
    }

    pub fn completed_sets(&self) -> usize {
        self.series.iter().filter(|s| s.completed).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
}

/// The aggregate root of a live workout. Serialized whole into the local
/// store slot on every mutation; the sync queue only ever sees snapshots
/// hydrated from it at finalize time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutLog {
    pub id: String,
    pub user_id: String,
    pub name: String,
    /// Once the user renames the session, auto-suggestion stops touching it.
    pub name_edited: bool,
    /// Template this session was started from; `None` for freeform sessions.
    pub template_id: Option<String>,
    pub entries: Vec<ExerciseEntry>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    /// Body weight captured once at session start. Load stays reproducible
    /// from the entries plus this one number, no matter when it is recomputed.
    pub body_weight: f32,
    /// Running sum of load over completed series. Always reconstructable
    /// from the entries alone; edits recompute it from scratch.
    pub total_load: f64,
    pub timer: Option<ActiveTimer>,
    /// Identifier of a scheduled rest-end notification awaiting its paired
    /// cancel, if any.
    pub pending_notification: Option<String>,
    /// Set when the structure of a template-sourced session diverges from
    /// the template (sets added or removed, links toggled).
    pub structure_edited: bool,
}

impl WorkoutLog {
    pub fn series_completed(&self) -> usize {
        self.entries.iter().map(ExerciseEntry::completed_sets).sum()
    }
}

//
// Templates (the structured source a session can start from)
//

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Treino {
    pub id: String,
    pub name: String,
    pub rest_secs: u32,
    pub exercises: Vec<TreinoExercise>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreinoExercise {
    pub name: String,
    pub muscle: Option<Muscle>,
    pub modality: Modality,
    pub sets: u32,
    pub reps: String,
    pub follows_previous: bool,
}

//
// Sync queue records
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MutationKind {
    CreateLog,
    CreateWorkout,
    UpdateWorkout,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateLog => "create-log",
            Self::CreateWorkout => "create-workout",
            Self::UpdateWorkout => "update-workout",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create-log" => Some(Self::CreateLog),
            "create-workout" => Some(Self::CreateWorkout),
            "update-workout" => Some(Self::UpdateWorkout),
            _ => None,
        }
    }
}

/// One remote write that must eventually succeed. Rows live in the
/// `sync_queue` table and drain strictly in `seq` order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMutation {
    pub seq: i64,
    pub kind: MutationKind,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub retries: u32,
}

//
// Finalize payloads (what the queue carries to the remote)
//

/// Snapshot of a finished session, reduced to the exercises that had at
/// least one completed set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogPayload {
    pub log_id: String,
    pub user_id: String,
    pub name: String,
    pub workout_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_load: f64,
    pub series_completed: usize,
    pub exercises: Vec<LogExercise>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogExercise {
    pub name: String,
    pub muscle: Option<Muscle>,
    pub modality: Modality,
    pub notes: Option<String>,
    pub series: Vec<Serie>,
}

/// Structure of a workout record materialized from a session (freeform
/// finalize) or pushed back over an edited template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkoutPayload {
    pub workout_id: String,
    pub user_id: String,
    pub name: String,
    pub rest_secs: u32,
    pub exercises: Vec<WorkoutPayloadExercise>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkoutPayloadExercise {
    pub name: String,
    pub muscle: Option<Muscle>,
    pub modality: Modality,
    pub sets: usize,
    pub reps: String,
    pub follows_previous: bool,
}
