use clap::{Parser, Subcommand};

use crate::types::Muscle;

#[derive(Parser)]
#[command(name = "ferro", version, about = "Workout session engine")]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Emit machine-readable JSON instead of colorful text.
    #[arg(global = true, long)]
    pub json: bool,

    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Live session commands
    #[command(subcommand, visible_alias = "s")]
    Session(SessionCmd),

    /// Set-level tweaks on the live session
    #[command(subcommand)]
    Set(SetCmd),

    /// Workout template management
    #[command(subcommand, visible_alias = "t")]
    Template(TemplateCmd),

    /// Sync queue operations
    #[command(subcommand)]
    Sync(SyncCmd),

    /// View or edit ferro config
    #[command(subcommand)]
    Config(ConfigCmd),
}

//
// Commands
//

#[derive(Subcommand)]
pub enum SessionCmd {
    /// Start a session, freeform or from a template
    #[command(visible_alias = "s")]
    Start {
        /// Template name (omit for a freeform session)
        template: Option<String>,
    },

    /// Show current session details
    #[command(visible_alias = "i")]
    Show,

    /// Complete the current set
    #[command(visible_alias = "d")]
    Done,

    /// Start the countdown of the current time-based set
    #[command(visible_alias = "b")]
    Begin,

    /// Skip the running timer
    Skip,

    /// Live countdown until the running timer ends
    #[command(visible_alias = "w")]
    Watch,

    /// Edit the targets of a set - Usage: session edit EXERCISE SET
    #[command(visible_alias = "e")]
    #[command(override_usage = "session edit <EXERCISE> <SET> [--weight <KG>] [--reps <REPS>]")]
    Edit {
        /// 1-based index of the exercise (same order shown in `session show`)
        #[arg(value_name = "EXERCISE")]
        exercise: usize,

        /// 1-based set index
        #[arg(value_name = "SET")]
        set: usize,

        /// Weight in kg
        #[arg(short, long)]
        weight: Option<f32>,

        /// Target reps, e.g. "8-12"
        #[arg(short, long)]
        reps: Option<String>,
    },

    /// Set how many sets an exercise has
    Sets {
        /// 1-based index of the exercise
        #[arg(value_name = "EXERCISE")]
        exercise: usize,

        /// New set count
        #[arg(value_name = "COUNT")]
        count: u32,
    },

    /// Pair an exercise with the previous one (run again to unpair)
    #[command(visible_alias = "bi")]
    Biset {
        /// 1-based index of the follower exercise
        #[arg(value_name = "EXERCISE")]
        exercise: usize,
    },

    /// Rename the session (stops automatic naming)
    Name { name: String },

    /// Attach a note to an exercise
    #[command(visible_alias = "n")]
    #[command(override_usage = "session note <EXERCISE> [NOTE]")]
    Note {
        /// 1-based index of the exercise
        #[arg(value_name = "EXERCISE")]
        exercise: usize,

        /// Free-form text; omit to clear
        #[arg(value_name = "NOTE")]
        note: Option<String>,
    },

    /// Add an exercise to the current session
    AddEx {
        /// Exercise name
        name: String,

        /// Primary muscle group
        #[arg(short, long)]
        muscle: Option<Muscle>,

        /// Number of sets
        #[arg(long, default_value = "3")]
        sets: u32,

        /// Target reps per set
        #[arg(long, default_value = "8-12")]
        reps: String,

        /// Rest between sets, in seconds
        #[arg(long, default_value = "90")]
        rest: u32,

        /// Barbell work; the value is the bar weight in kg
        #[arg(long, value_name = "BAR_KG")]
        barbell: Option<f32>,

        /// One dumbbell per hand
        #[arg(long, conflicts_with = "barbell")]
        dumbbell: bool,

        /// Single implement or cable
        #[arg(long, conflicts_with_all = ["barbell", "dumbbell"])]
        unilateral: bool,
    },

    /// End the current session and queue it for sync
    #[command(visible_alias = "end")]
    Finish,

    /// Abandon the current session without syncing
    #[command(visible_alias = "c")]
    Cancel,
}

#[derive(Subcommand)]
pub enum SetCmd {
    /// Add a dropset after a set - Usage: set drop EXERCISE SET
    #[command(override_usage = "set drop <EXERCISE> <SET>")]
    Drop {
        /// 1-based index of the exercise
        #[arg(value_name = "EXERCISE")]
        exercise: usize,

        /// 1-based set index
        #[arg(value_name = "SET")]
        set: usize,
    },

    /// Duplicate a set
    Copy {
        #[arg(value_name = "EXERCISE")]
        exercise: usize,

        #[arg(value_name = "SET")]
        set: usize,
    },

    /// Remove a set (removing the last one removes the exercise)
    Rm {
        #[arg(value_name = "EXERCISE")]
        exercise: usize,

        #[arg(value_name = "SET")]
        set: usize,
    },

    /// Toggle time-based mode on a set
    Time {
        #[arg(value_name = "EXERCISE")]
        exercise: usize,

        #[arg(value_name = "SET")]
        set: usize,
    },

    /// Toggle the warmup flag on a set
    #[command(visible_alias = "w")]
    Warmup {
        #[arg(value_name = "EXERCISE")]
        exercise: usize,

        #[arg(value_name = "SET")]
        set: usize,
    },

    /// Reopen a completed set for correction
    Reopen {
        #[arg(value_name = "EXERCISE")]
        exercise: usize,

        #[arg(value_name = "SET")]
        set: usize,
    },
}

#[derive(Subcommand)]
pub enum TemplateCmd {
    /// Import a template from a TOML file
    #[command(visible_alias = "i")]
    Import {
        /// Path to TOML file
        file: String,
    },

    /// List templates
    #[command(visible_alias = "l")]
    List,

    /// Show a single template in detail
    #[command(visible_alias = "s")]
    Show {
        /// Template name
        name: String,
    },

    /// Delete a template
    #[command(visible_alias = "d")]
    Delete {
        /// Template name
        name: String,
    },
}

#[derive(Subcommand)]
pub enum SyncCmd {
    /// Connectivity and queue summary
    Status,

    /// Push pending mutations to the remote, in order
    Drain,

    /// List pending mutations
    #[command(visible_alias = "q")]
    Queue,
}

#[derive(Subcommand)]
pub enum ConfigCmd {
    /// Show all config keys
    List,

    /// Get the value of a key
    Get { key: String },

    /// Set or override a key
    Set { key: String, val: String },

    /// Remove a key
    Unset { key: String },
}
