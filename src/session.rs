use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use itertools::Itertools;

use crate::load::{recompute_total, serie_load};
use crate::models::{
    ExerciseEntry, LogExercise, LogPayload, Modality, MutationKind, Serie, SessionStatus, SetKind,
    WorkoutLog, WorkoutPayload, WorkoutPayloadExercise, local_id,
};
use crate::ports::{DEFAULT_BODY_WEIGHT_KG, NotificationScheduler, ProfileSource, TemplateSource};
use crate::storage::SessionStore;
use crate::sync::SyncQueue;
use crate::timer::{ActiveTimer, TimerKind};
use crate::types::Muscle;
use crate::utils::parse_first_int;

/// Rep target a set falls back to when nothing better is known.
pub const DEFAULT_REPS: &str = "8-12";
/// Duration (seconds, as a reps string) a set gets when switched to time-based.
pub const DEFAULT_DURATION: &str = "30";
/// Rest between sets when an exercise does not configure one.
pub const DEFAULT_REST_SECS: u32 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartSource<'a> {
    Template(&'a str),
    Freeform,
}

/// What an operation did, for the caller to narrate. The engine itself never
/// prints.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    SetCompleted {
        exercise: String,
        set_number: usize,
        breakdown: String,
    },
    RestStarted {
        secs: u32,
    },
    ExerciseTimerStarted {
        secs: u32,
    },
    RestFinished,
    ExerciseTimerFinished,
    SessionFinished {
        name: String,
        total_load: f64,
        series_completed: usize,
    },
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("a session is already in progress")]
    AlreadyActive,
    #[error("template `{0}` not found")]
    TemplateNotFound(String),
    #[error("no such exercise")]
    NoSuchExercise,
    #[error("no such set")]
    NoSuchSet,
    #[error("set already completed; reopen it first")]
    SetLocked,
    #[error("linked exercises keep the leader's set count; edit the leader instead")]
    FollowerLocked,
    #[error("the first exercise has nothing to follow")]
    FirstExercise,
    #[error("the neighbouring exercise is already part of a pair")]
    PairTaken,
    #[error("current set is not time-based")]
    NotTimeBased,
    #[error("time-based set has no duration")]
    NoDuration,
}

/// Where the session goes next: first not-completed set in entry order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetPointer {
    pub exercise: usize,
    pub set: usize,
}

/// Recomputed from scratch on demand, never cached. This is what lands a
/// relaunched process exactly where the user left off.
pub fn current_pointer(log: &WorkoutLog) -> Option<SetPointer> {
    log.entries.iter().enumerate().find_map(|(exercise, entry)| {
        entry
            .series
            .iter()
            .position(|s| !s.completed)
            .map(|set| SetPointer { exercise, set })
    })
}

/// Drives one live workout. Every mutating operation flushes the session to
/// the store before returning; operations on an absent session are silent
/// no-ops, since events can arrive after the session is already gone.
pub struct SessionEngine {
    store: SessionStore,
    queue: SyncQueue,
    notifier: Arc<dyn NotificationScheduler>,
    foreground: bool,
    session: Option<WorkoutLog>,
}

impl SessionEngine {
    pub fn new(
        store: SessionStore,
        queue: SyncQueue,
        notifier: Arc<dyn NotificationScheduler>,
    ) -> Self {
        Self {
            store,
            queue,
            notifier,
            foreground: false,
            session: None,
        }
    }

    pub fn session(&self) -> Option<&WorkoutLog> {
        self.session.as_ref()
    }

    /// Loads whatever the store holds; `true` when a session came back.
    pub async fn resume(&mut self) -> Result<bool> {
        self.session = self.store.load().await?;
        Ok(self.session.is_some())
    }

    /// Marks the app as watched/unwatched. Entering the foreground cancels
    /// the pending rest notification, since the user now sees the countdown.
    pub async fn set_foreground(&mut self, foreground: bool) -> Result<()> {
        self.foreground = foreground;
        let cancelled = {
            let Some(log) = self.session.as_mut() else {
                return Ok(());
            };
            match log.pending_notification.take() {
                Some(id) if foreground => {
                    self.notifier.cancel(&id);
                    true
                }
                Some(id) => {
                    log.pending_notification = Some(id);
                    false
                }
                None => false,
            }
        };
        if cancelled {
            self.persist().await?;
        }
        Ok(())
    }

    pub async fn start(
        &mut self,
        source: StartSource<'_>,
        templates: &dyn TemplateSource,
        profiles: &dyn ProfileSource,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if self.session.is_some() {
            return Err(EngineError::AlreadyActive.into());
        }

        let body_weight = match profiles.profile(user_id).await {
            Ok(profile) => profile.weight,
            Err(e) => {
                tracing::debug!(error = %e, "profile unavailable, using default body weight");
                DEFAULT_BODY_WEIGHT_KG
            }
        };

        let (name, template_id, entries) = match source {
            StartSource::Template(id) => {
                let treino = templates
                    .workout_by_id(id)
                    .await?
                    .ok_or_else(|| EngineError::TemplateNotFound(id.to_string()))?;
                let mut entries: Vec<ExerciseEntry> = treino
                    .exercises
                    .iter()
                    .map(|ex| {
                        let mut entry = ExerciseEntry::new(&ex.name, ex.modality, treino.rest_secs);
                        entry.muscle = ex.muscle;
                        entry.follows_previous = ex.follows_previous;
                        entry.series = (0..ex.sets).map(|_| Serie::new(&ex.reps, None)).collect();
                        entry
                    })
                    .collect();
                // Pairs keep equal counts from the first set on, whatever the
                // template said. The first entry can never be a follower, and
                // a follower cannot itself be followed.
                if let Some(first) = entries.first_mut() {
                    first.follows_previous = false;
                }
                for i in 1..entries.len() {
                    if entries[i].follows_previous {
                        if entries[i - 1].follows_previous {
                            entries[i].follows_previous = false;
                            continue;
                        }
                        let target = entries[i - 1].series.len();
                        sync_len(&mut entries[i], target);
                    }
                }
                (treino.name.clone(), Some(treino.id.clone()), entries)
            }
            StartSource::Freeform => ("Treino livre".to_string(), None, Vec::new()),
        };

        self.session = Some(WorkoutLog {
            id: local_id(),
            user_id: user_id.to_string(),
            name,
            name_edited: false,
            template_id,
            entries,
            started_at: now,
            finished_at: None,
            status: SessionStatus::InProgress,
            body_weight,
            total_load: 0.0,
            timer: None,
            pending_notification: None,
            structure_edited: false,
        });
        self.persist().await
    }

    /// Completes the pointed set, accrues its load, clears the lockstep
    /// follower set, and decides what comes next: a rest timer, an immediate
    /// dropset, or session finalization.
    pub async fn complete_current_set(&mut self, now: DateTime<Utc>) -> Result<Vec<EngineEvent>> {
        let mut events = Vec::new();
        let exhausted = {
            let Some(log) = self.session.as_mut() else {
                return Ok(events);
            };
            let Some(ptr) = current_pointer(log) else {
                return Ok(events);
            };

            // A manual done retires whatever countdown was running; rest
            // re-arms it below only when it applies.
            log.timer = None;
            if let Some(id) = log.pending_notification.take() {
                self.notifier.cancel(&id);
            }

            let rest = complete_at(log, ptr, &mut events);
            refresh_suggested_name(log);

            if current_pointer(log).is_none() {
                true
            } else {
                if let Some(secs) = rest {
                    start_rest(
                        self.notifier.as_ref(),
                        self.foreground,
                        log,
                        secs,
                        now,
                        &mut events,
                    );
                }
                false
            }
        };

        if exhausted {
            events.extend(self.finalize(now).await?);
            return Ok(events);
        }
        self.persist().await?;
        Ok(events)
    }

    /// Starts the exercise countdown for the current time-based set. Replaces
    /// any running rest timer, cancelling its notification.
    pub async fn begin_timed_set(&mut self, now: DateTime<Utc>) -> Result<Vec<EngineEvent>> {
        let mut events = Vec::new();
        {
            let Some(log) = self.session.as_mut() else {
                return Ok(events);
            };
            let Some(ptr) = current_pointer(log) else {
                return Ok(events);
            };
            let (time_based, secs) = {
                let serie = &log.entries[ptr.exercise].series[ptr.set];
                (serie.time_based, parse_first_int(&serie.reps))
            };
            if !time_based {
                return Err(EngineError::NotTimeBased.into());
            }
            if secs == 0 {
                return Err(EngineError::NoDuration.into());
            }
            if let Some(id) = log.pending_notification.take() {
                self.notifier.cancel(&id);
            }
            log.timer = Some(ActiveTimer::start(TimerKind::Exercise, secs, now));
            events.push(EngineEvent::ExerciseTimerStarted { secs });
        }
        self.persist().await?;
        Ok(events)
    }

    /// Applies the timer transition due at `now`, if any. Rest expiry goes
    /// idle; exercise expiry completes the current set and then rests for the
    /// entry's configured duration, unless an incomplete dropset continues
    /// the chain.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<Vec<EngineEvent>> {
        let mut events = Vec::new();
        let exhausted = {
            let Some(log) = self.session.as_mut() else {
                return Ok(events);
            };
            let Some(timer) = log.timer.as_ref() else {
                return Ok(events);
            };
            if !timer.is_expired(now) {
                return Ok(events);
            }
            let kind = timer.kind;
            log.timer = None;

            match kind {
                TimerKind::Rest => {
                    // The scheduled notification fires at expiry; nothing to
                    // cancel any more.
                    log.pending_notification = None;
                    events.push(EngineEvent::RestFinished);
                    false
                }
                TimerKind::Exercise => {
                    events.push(EngineEvent::ExerciseTimerFinished);
                    match current_pointer(log) {
                        Some(ptr) => {
                            let rest = complete_at(log, ptr, &mut events);
                            refresh_suggested_name(log);
                            if current_pointer(log).is_none() {
                                true
                            } else {
                                if let Some(secs) = rest {
                                    start_rest(
                                        self.notifier.as_ref(),
                                        self.foreground,
                                        log,
                                        secs,
                                        now,
                                        &mut events,
                                    );
                                }
                                false
                            }
                        }
                        None => false,
                    }
                }
            }
        };

        if exhausted {
            events.extend(self.finalize(now).await?);
            return Ok(events);
        }
        self.persist().await?;
        Ok(events)
    }

    /// Forces the running timer idle. Never completes a set.
    pub async fn skip_timer(&mut self) -> Result<bool> {
        let skipped = {
            let Some(log) = self.session.as_mut() else {
                return Ok(false);
            };
            if log.timer.is_none() {
                false
            } else {
                log.timer = None;
                if let Some(id) = log.pending_notification.take() {
                    self.notifier.cancel(&id);
                }
                true
            }
        };
        if skipped {
            self.persist().await?;
        }
        Ok(skipped)
    }

    /// Replaces an entry's series wholesale. A leader drags its follower's
    /// count along; a follower only accepts a same-count replacement, its
    /// leader owns the shape. A dropset left heading the series becomes a
    /// normal set.
    pub async fn edit_series(&mut self, exercise: usize, series: Vec<Serie>) -> Result<()> {
        {
            let Some(log) = self.session.as_mut() else {
                return Ok(());
            };
            let current_len = log
                .entries
                .get(exercise)
                .ok_or(EngineError::NoSuchExercise)?
                .series
                .len();
            if is_follower(log, exercise) && series.len() != current_len {
                return Err(EngineError::FollowerLocked.into());
            }
            {
                let entry = &mut log.entries[exercise];
                entry.series = series;
                normalize_dropset_head(&mut entry.series);
            }
            sync_follower_len(&mut log.entries, exercise);
            mark_structure_edited(log);
            log.total_load = recompute_total(&log.entries, log.body_weight);
        }
        self.persist().await
    }

    /// Flips the bi-set link on `exercise` (which must not be first). Newly
    /// linked entries are padded or truncated to the leader's count.
    pub async fn toggle_biset(&mut self, exercise: usize) -> Result<bool> {
        let linked = {
            let Some(log) = self.session.as_mut() else {
                return Ok(false);
            };
            if exercise == 0 {
                return Err(EngineError::FirstExercise.into());
            }
            if log.entries.get(exercise).is_none() {
                return Err(EngineError::NoSuchExercise.into());
            }
            let linking = !log.entries[exercise].follows_previous;
            // Pairs only: no chains through an entry already linked on the
            // other side.
            if linking && (log.entries[exercise - 1].follows_previous || is_leader(log, exercise)) {
                return Err(EngineError::PairTaken.into());
            }

            log.entries[exercise].follows_previous = linking;
            if linking {
                let target = log.entries[exercise - 1].series.len();
                sync_len(&mut log.entries[exercise], target);
            }
            mark_structure_edited(log);
            log.total_load = recompute_total(&log.entries, log.body_weight);
            linking
        };
        self.persist().await?;
        Ok(linked)
    }

    /// Inserts a dropset right after set `set`, pre-filled with the parent's
    /// reps and 70% of its weight.
    pub async fn add_dropset(&mut self, exercise: usize, set: usize) -> Result<()> {
        {
            let Some(log) = self.session.as_mut() else {
                return Ok(());
            };
            if is_follower(log, exercise) {
                return Err(EngineError::FollowerLocked.into());
            }
            {
                let entry = log
                    .entries
                    .get_mut(exercise)
                    .ok_or(EngineError::NoSuchExercise)?;
                let parent = entry.series.get(set).ok_or(EngineError::NoSuchSet)?;
                let drop = Serie::dropset_from(parent);
                entry.series.insert(set + 1, drop);
            }
            sync_follower_len(&mut log.entries, exercise);
            mark_structure_edited(log);
        }
        self.persist().await
    }

    /// Duplicates set `set` in place, fresh identifier, not completed.
    pub async fn copy_set(&mut self, exercise: usize, set: usize) -> Result<()> {
        {
            let Some(log) = self.session.as_mut() else {
                return Ok(());
            };
            if is_follower(log, exercise) {
                return Err(EngineError::FollowerLocked.into());
            }
            {
                let entry = log
                    .entries
                    .get_mut(exercise)
                    .ok_or(EngineError::NoSuchExercise)?;
                let copy = entry
                    .series
                    .get(set)
                    .ok_or(EngineError::NoSuchSet)?
                    .duplicate();
                entry.series.insert(set + 1, copy);
            }
            sync_follower_len(&mut log.entries, exercise);
            mark_structure_edited(log);
        }
        self.persist().await
    }

    /// Flips time-based mode, resetting reps to a duration (on) or a rep
    /// range (off) and dropping the weight when turning on.
    pub async fn toggle_time_based(&mut self, exercise: usize, set: usize) -> Result<bool> {
        let on = {
            let Some(log) = self.session.as_mut() else {
                return Ok(false);
            };
            let entry = log
                .entries
                .get_mut(exercise)
                .ok_or(EngineError::NoSuchExercise)?;
            let serie = entry.series.get_mut(set).ok_or(EngineError::NoSuchSet)?;
            if serie.completed {
                return Err(EngineError::SetLocked.into());
            }
            serie.time_based = !serie.time_based;
            if serie.time_based {
                serie.reps = DEFAULT_DURATION.to_string();
                serie.weight = None;
            } else {
                serie.reps = DEFAULT_REPS.to_string();
            }
            let on = serie.time_based;
            mark_structure_edited(log);
            on
        };
        self.persist().await?;
        Ok(on)
    }

    pub async fn toggle_warmup(&mut self, exercise: usize, set: usize) -> Result<bool> {
        let warmup = {
            let Some(log) = self.session.as_mut() else {
                return Ok(false);
            };
            let entry = log
                .entries
                .get_mut(exercise)
                .ok_or(EngineError::NoSuchExercise)?;
            let serie = entry.series.get_mut(set).ok_or(EngineError::NoSuchSet)?;
            serie.warmup = !serie.warmup;
            serie.warmup
        };
        self.persist().await?;
        Ok(warmup)
    }

    /// Removes a set. Removing the last set removes the whole entry; an
    /// emptied leader releases its follower, and a dropset orphaned at the
    /// head of the series becomes a normal set. Returns whether the entry
    /// went.
    pub async fn remove_set(&mut self, exercise: usize, set: usize) -> Result<bool> {
        let entry_removed = {
            let Some(log) = self.session.as_mut() else {
                return Ok(false);
            };
            if is_follower(log, exercise) {
                return Err(EngineError::FollowerLocked.into());
            }
            {
                let entry = log
                    .entries
                    .get_mut(exercise)
                    .ok_or(EngineError::NoSuchExercise)?;
                let serie = entry.series.get(set).ok_or(EngineError::NoSuchSet)?;
                if serie.completed {
                    return Err(EngineError::SetLocked.into());
                }
                entry.series.remove(set);
            }
            let entry_removed = if log.entries[exercise].series.is_empty() {
                log.entries.remove(exercise);
                if let Some(next) = log.entries.get_mut(exercise) {
                    next.follows_previous = false;
                }
                true
            } else {
                normalize_dropset_head(&mut log.entries[exercise].series);
                sync_follower_len(&mut log.entries, exercise);
                false
            };
            mark_structure_edited(log);
            log.total_load = recompute_total(&log.entries, log.body_weight);
            entry_removed
        };
        self.persist().await?;
        Ok(entry_removed)
    }

    /// Re-opens a completed set for correction, taking its load back out.
    pub async fn reopen_set(&mut self, exercise: usize, set: usize) -> Result<()> {
        {
            let Some(log) = self.session.as_mut() else {
                return Ok(());
            };
            {
                let entry = log
                    .entries
                    .get_mut(exercise)
                    .ok_or(EngineError::NoSuchExercise)?;
                let serie = entry.series.get_mut(set).ok_or(EngineError::NoSuchSet)?;
                if !serie.completed {
                    return Ok(());
                }
                serie.completed = false;
            }
            log.total_load = recompute_total(&log.entries, log.body_weight);
        }
        self.persist().await
    }

    /// Updates a set's target weight and/or reps. Completed sets are
    /// immutable until re-opened.
    pub async fn update_set(
        &mut self,
        exercise: usize,
        set: usize,
        weight: Option<f32>,
        reps: Option<&str>,
    ) -> Result<()> {
        {
            let Some(log) = self.session.as_mut() else {
                return Ok(());
            };
            {
                let entry = log
                    .entries
                    .get_mut(exercise)
                    .ok_or(EngineError::NoSuchExercise)?;
                let serie = entry.series.get_mut(set).ok_or(EngineError::NoSuchSet)?;
                if serie.completed {
                    return Err(EngineError::SetLocked.into());
                }
                if let Some(w) = weight {
                    serie.weight = Some(w);
                }
                if let Some(r) = reps {
                    serie.reps = r.to_string();
                }
            }
            if reps.is_some() {
                mark_structure_edited(log);
            }
        }
        self.persist().await
    }

    pub async fn add_exercise(
        &mut self,
        name: &str,
        muscle: Option<Muscle>,
        modality: Modality,
        sets: u32,
        reps: &str,
        rest_secs: u32,
    ) -> Result<()> {
        {
            let Some(log) = self.session.as_mut() else {
                return Ok(());
            };
            let mut entry = ExerciseEntry::new(name, modality, rest_secs);
            entry.muscle = muscle;
            entry.series = (0..sets).map(|_| Serie::new(reps, None)).collect();
            log.entries.push(entry);
            mark_structure_edited(log);
        }
        self.persist().await
    }

    /// User rename pins the name; auto-suggestion stops touching it.
    pub async fn rename(&mut self, name: &str) -> Result<()> {
        {
            let Some(log) = self.session.as_mut() else {
                return Ok(());
            };
            log.name = name.to_string();
            log.name_edited = true;
        }
        self.persist().await
    }

    pub async fn set_note(&mut self, exercise: usize, note: Option<String>) -> Result<()> {
        {
            let Some(log) = self.session.as_mut() else {
                return Ok(());
            };
            let entry = log
                .entries
                .get_mut(exercise)
                .ok_or(EngineError::NoSuchExercise)?;
            entry.notes = note;
        }
        self.persist().await
    }

    /// Ends the session now, syncing whatever was completed.
    pub async fn finish(&mut self, now: DateTime<Utc>) -> Result<Vec<EngineEvent>> {
        if self.session.is_none() {
            return Ok(Vec::new());
        }
        self.finalize(now).await
    }

    /// Walks away: clears the slot and syncs nothing. Partial completions
    /// never reach the remote.
    pub async fn abandon(&mut self) -> Result<bool> {
        let had_session = match self.session.as_mut() {
            None => false,
            Some(log) => {
                if let Some(id) = log.pending_notification.take() {
                    self.notifier.cancel(&id);
                }
                true
            }
        };
        self.session = None;
        self.store.save(None).await?;
        Ok(had_session)
    }

    /// Terminal transition: settle the log, enqueue the finalize mutations,
    /// clear the store. On failure the store still holds the live session, so
    /// finishing can simply be retried.
    async fn finalize(&mut self, now: DateTime<Utc>) -> Result<Vec<EngineEvent>> {
        if let Some(log) = self.session.as_mut() {
            log.status = SessionStatus::Completed;
            log.finished_at = Some(now);
            log.timer = None;
            if let Some(id) = log.pending_notification.take() {
                self.notifier.cancel(&id);
            }
        }
        let Some(log) = self.session.take() else {
            return Ok(Vec::new());
        };

        if log.series_completed() == 0 {
            tracing::info!("session finished with no completed sets, nothing to sync");
        } else {
            match &log.template_id {
                Some(template_id) => {
                    self.queue
                        .enqueue(
                            MutationKind::CreateLog,
                            serde_json::to_value(log_payload(&log))?,
                        )
                        .await?;
                    if log.structure_edited {
                        self.queue
                            .enqueue(
                                MutationKind::UpdateWorkout,
                                serde_json::to_value(workout_payload(&log, template_id))?,
                            )
                            .await?;
                    }
                }
                None => {
                    // Freeform sessions materialize a first-class workout;
                    // the log references it by the same local id so drain can
                    // reconcile both once the server assigns the real one.
                    let workout_id = local_id();
                    self.queue
                        .enqueue(
                            MutationKind::CreateWorkout,
                            serde_json::to_value(workout_payload(&log, &workout_id))?,
                        )
                        .await?;
                    let mut payload = log_payload(&log);
                    payload.workout_id = Some(workout_id);
                    self.queue
                        .enqueue(MutationKind::CreateLog, serde_json::to_value(payload)?)
                        .await?;
                }
            }
        }

        self.store.save(None).await?;
        Ok(vec![EngineEvent::SessionFinished {
            name: log.name.clone(),
            total_load: log.total_load,
            series_completed: log.series_completed(),
        }])
    }

    async fn persist(&self) -> Result<()> {
        self.store.save(self.session.as_ref()).await
    }
}

/// Marks the pointed set done, accrues its load, and clears the lockstep
/// follower set at the same index. Returns the rest to start afterwards, or
/// `None` when an incomplete dropset continues the chain.
fn complete_at(log: &mut WorkoutLog, ptr: SetPointer, events: &mut Vec<EngineEvent>) -> Option<u32> {
    let (set_load, name) = {
        let entry = &log.entries[ptr.exercise];
        (
            serie_load(&entry.series[ptr.set], &entry.modality, log.body_weight),
            entry.name.clone(),
        )
    };
    log.entries[ptr.exercise].series[ptr.set].completed = true;
    log.total_load += set_load.total;
    events.push(EngineEvent::SetCompleted {
        exercise: name,
        set_number: ptr.set + 1,
        breakdown: set_load.breakdown,
    });

    let follower = ptr.exercise + 1;
    if log.entries.get(follower).is_some_and(|e| e.follows_previous)
        && log.entries[follower]
            .series
            .get(ptr.set)
            .is_some_and(|s| !s.completed)
    {
        let (f_load, f_name) = {
            let entry = &log.entries[follower];
            (
                serie_load(&entry.series[ptr.set], &entry.modality, log.body_weight),
                entry.name.clone(),
            )
        };
        log.entries[follower].series[ptr.set].completed = true;
        log.total_load += f_load.total;
        events.push(EngineEvent::SetCompleted {
            exercise: f_name,
            set_number: ptr.set + 1,
            breakdown: f_load.breakdown,
        });
    }

    let entry = &log.entries[ptr.exercise];
    let chain_continues = entry
        .series
        .get(ptr.set + 1)
        .is_some_and(|s| s.kind == SetKind::Dropset && !s.completed);
    if chain_continues {
        None
    } else {
        Some(entry.rest_secs)
    }
}

fn start_rest(
    notifier: &dyn NotificationScheduler,
    foreground: bool,
    log: &mut WorkoutLog,
    rest_secs: u32,
    now: DateTime<Utc>,
    events: &mut Vec<EngineEvent>,
) {
    if rest_secs == 0 {
        return;
    }
    log.timer = Some(ActiveTimer::start(TimerKind::Rest, rest_secs, now));
    events.push(EngineEvent::RestStarted { secs: rest_secs });
    if !foreground {
        let id = notification_id(log);
        notifier.schedule(&id, "Rest over", "Time for the next set", rest_secs);
        log.pending_notification = Some(id);
    }
}

fn notification_id(log: &WorkoutLog) -> String {
    format!("rest-{}", log.id)
}

/// Freeform sessions take their name from the muscles trained so far, until
/// the user renames them.
fn refresh_suggested_name(log: &mut WorkoutLog) {
    if log.template_id.is_some() || log.name_edited {
        return;
    }
    let muscles: Vec<&'static str> = log
        .entries
        .iter()
        .filter(|e| e.has_completed_set())
        .filter_map(|e| e.muscle)
        .map(|m| m.label())
        .unique()
        .collect();
    if !muscles.is_empty() {
        log.name = muscles.join(" · ");
    }
}

fn is_follower(log: &WorkoutLog, idx: usize) -> bool {
    log.entries.get(idx).is_some_and(|e| e.follows_previous)
}

fn is_leader(log: &WorkoutLog, idx: usize) -> bool {
    log.entries.get(idx + 1).is_some_and(|e| e.follows_previous)
}

/// Pads (by duplicating the entry's own last set) or truncates to `target`.
fn sync_len(entry: &mut ExerciseEntry, target: usize) {
    entry.series.truncate(target);
    while entry.series.len() < target {
        let next = match entry.series.last() {
            Some(last) => last.duplicate(),
            None => Serie::new(DEFAULT_REPS, None),
        };
        entry.series.push(next);
    }
}

/// Leader count changes drag the follower along, never the reverse.
fn sync_follower_len(entries: &mut [ExerciseEntry], leader: usize) {
    let target = entries[leader].series.len();
    if entries.get(leader + 1).is_some_and(|e| e.follows_previous) {
        sync_len(&mut entries[leader + 1], target);
    }
}

/// A dropset drops from the set right before it. A structural edit that
/// leaves one first in the series re-kinds it to a normal set; the rest of
/// its chain then hangs off the re-kinded head.
fn normalize_dropset_head(series: &mut [Serie]) {
    if let Some(first) = series.first_mut() {
        if first.kind == SetKind::Dropset {
            first.kind = SetKind::Normal;
        }
    }
}

fn mark_structure_edited(log: &mut WorkoutLog) {
    if log.template_id.is_some() {
        log.structure_edited = true;
    }
}

fn log_payload(log: &WorkoutLog) -> LogPayload {
    LogPayload {
        log_id: log.id.clone(),
        user_id: log.user_id.clone(),
        name: log.name.clone(),
        workout_id: log.template_id.clone(),
        started_at: log.started_at,
        finished_at: log.finished_at.unwrap_or(log.started_at),
        total_load: log.total_load,
        series_completed: log.series_completed(),
        exercises: log
            .entries
            .iter()
            .filter(|e| e.has_completed_set())
            .map(|e| LogExercise {
                name: e.name.clone(),
                muscle: e.muscle,
                modality: e.modality,
                notes: e.notes.clone(),
                series: e.series.clone(),
            })
            .collect(),
    }
}

fn workout_payload(log: &WorkoutLog, workout_id: &str) -> WorkoutPayload {
    WorkoutPayload {
        workout_id: workout_id.to_string(),
        user_id: log.user_id.clone(),
        name: log.name.clone(),
        rest_secs: log
            .entries
            .first()
            .map(|e| e.rest_secs)
            .unwrap_or(DEFAULT_REST_SECS),
        exercises: log
            .entries
            .iter()
            .map(|e| WorkoutPayloadExercise {
                name: e.name.clone(),
                muscle: e.muscle,
                modality: e.modality,
                sets: e.series.len(),
                reps: e
                    .series
                    .first()
                    .map(|s| s.reps.clone())
                    .unwrap_or_else(|| DEFAULT_REPS.to_string()),
                follows_previous: e.follows_previous,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Treino, TreinoExercise};
    use crate::ports::{PortError, PortResult, UserProfile};
    use async_trait::async_trait;
    use sqlx::SqlitePool;
    use std::sync::Mutex;

    struct FakeTemplates(Option<Treino>);

    #[async_trait]
    impl TemplateSource for FakeTemplates {
        async fn workout_by_id(&self, id: &str) -> PortResult<Option<Treino>> {
            Ok(self.0.clone().filter(|t| t.id == id))
        }
    }

    struct FakeProfile(Option<f32>);

    #[async_trait]
    impl ProfileSource for FakeProfile {
        async fn profile(&self, _user_id: &str) -> PortResult<UserProfile> {
            match self.0 {
                Some(weight) => Ok(UserProfile {
                    weight,
                    historical_weights: Vec::new(),
                }),
                None => Err(PortError::NotFound("no profile".into())),
            }
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        calls: Mutex<Vec<String>>,
    }

    impl NotificationScheduler for RecordingNotifier {
        fn schedule(&self, id: &str, _title: &str, _body: &str, seconds_from_now: u32) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("schedule:{id}:{seconds_from_now}"));
        }

        fn cancel(&self, id: &str) {
            self.calls.lock().unwrap().push(format!("cancel:{id}"));
        }
    }

    struct Harness {
        engine: SessionEngine,
        notifier: Arc<RecordingNotifier>,
        pool: SqlitePool,
    }

    async fn harness() -> Harness {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        crate::db::init_schema(&pool).await.unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = SessionEngine::new(
            SessionStore::new(pool.clone()),
            SyncQueue::new(pool.clone()),
            notifier.clone(),
        );
        Harness {
            engine,
            notifier,
            pool,
        }
    }

    fn grid_template(exercises: usize, sets: u32) -> Treino {
        Treino {
            id: "tpl-1".into(),
            name: "Upper A".into(),
            rest_secs: 90,
            exercises: (0..exercises)
                .map(|i| TreinoExercise {
                    name: format!("Exercise {}", i + 1),
                    muscle: None,
                    modality: Modality::Bodyweight,
                    sets,
                    reps: "10".into(),
                    follows_previous: false,
                })
                .collect(),
        }
    }

    async fn start_template(h: &mut Harness, treino: Treino) {
        h.engine
            .start(
                StartSource::Template("tpl-1"),
                &FakeTemplates(Some(treino)),
                &FakeProfile(Some(80.0)),
                "user-1",
                Utc::now(),
            )
            .await
            .unwrap();
    }

    async fn start_freeform(h: &mut Harness) {
        h.engine
            .start(
                StartSource::Freeform,
                &FakeTemplates(None),
                &FakeProfile(Some(80.0)),
                "user-1",
                Utc::now(),
            )
            .await
            .unwrap();
    }

    fn fresh_engine(h: &Harness) -> SessionEngine {
        SessionEngine::new(
            SessionStore::new(h.pool.clone()),
            SyncQueue::new(h.pool.clone()),
            h.notifier.clone(),
        )
    }

    #[tokio::test]
    async fn resume_lands_on_the_first_incomplete_set() {
        let mut h = harness().await;
        start_template(&mut h, grid_template(2, 3)).await;
        for _ in 0..4 {
            h.engine.complete_current_set(Utc::now()).await.unwrap();
        }

        // Process restart: a fresh engine over the same database.
        let mut engine = fresh_engine(&h);
        assert!(engine.resume().await.unwrap());
        let log = engine.session().unwrap();
        assert_eq!(
            current_pointer(log),
            Some(SetPointer {
                exercise: 1,
                set: 1
            })
        );
    }

    #[tokio::test]
    async fn completing_with_no_session_is_a_noop() {
        let mut h = harness().await;
        start_template(&mut h, grid_template(1, 2)).await;
        h.engine.complete_current_set(Utc::now()).await.unwrap();
        let events = h.engine.complete_current_set(Utc::now()).await.unwrap();
        assert!(
            events
                .iter()
                .any(|e| matches!(e, EngineEvent::SessionFinished { .. }))
        );

        // Late event after the session is gone changes nothing.
        assert!(
            h.engine
                .complete_current_set(Utc::now())
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn leader_completion_clears_the_follower_in_lockstep() {
        let mut h = harness().await;
        let mut treino = grid_template(2, 2);
        treino.exercises[1].follows_previous = true;
        start_template(&mut h, treino).await;

        let events = h.engine.complete_current_set(Utc::now()).await.unwrap();
        let completed = events
            .iter()
            .filter(|e| matches!(e, EngineEvent::SetCompleted { .. }))
            .count();
        assert_eq!(completed, 2);

        let log = h.engine.session().unwrap();
        assert!(log.entries[0].series[0].completed);
        assert!(log.entries[1].series[0].completed);
        // Bodyweight 80kg x 10 reps, twice.
        assert_eq!(log.total_load, 1600.0);
        assert_eq!(
            current_pointer(log),
            Some(SetPointer {
                exercise: 0,
                set: 1
            })
        );
    }

    #[tokio::test]
    async fn linking_pads_the_follower_with_its_own_last_set() {
        let mut h = harness().await;
        start_freeform(&mut h).await;
        h.engine
            .add_exercise(
                "Supino reto",
                Some(Muscle::Chest),
                Modality::Barbell { bar_weight: 20.0 },
                3,
                "8-12",
                90,
            )
            .await
            .unwrap();
        h.engine
            .add_exercise(
                "Crucifixo",
                Some(Muscle::Chest),
                Modality::BilateralDumbbell,
                1,
                "15",
                60,
            )
            .await
            .unwrap();
        h.engine
            .update_set(1, 0, Some(12.0), None)
            .await
            .unwrap();

        assert!(h.engine.toggle_biset(1).await.unwrap());

        let log = h.engine.session().unwrap();
        let follower = &log.entries[1];
        assert!(follower.follows_previous);
        assert_eq!(follower.series.len(), 3);
        for serie in &follower.series {
            assert_eq!(serie.reps, "15");
            assert_eq!(serie.weight, Some(12.0));
            assert!(!serie.completed);
        }
        let ids: Vec<_> = follower.series.iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids.iter().unique().count(), 3);
    }

    #[tokio::test]
    async fn leader_series_edits_propagate_length_to_the_follower() {
        let mut h = harness().await;
        let mut treino = grid_template(2, 3);
        treino.exercises[1].follows_previous = true;
        treino.exercises[1].reps = "15".into();
        start_template(&mut h, treino).await;

        let five = (0..5).map(|_| Serie::new("5", Some(60.0))).collect();
        h.engine.edit_series(0, five).await.unwrap();
        {
            let log = h.engine.session().unwrap();
            assert_eq!(log.entries[1].series.len(), 5);
            // Padded sets duplicate the follower's own targets.
            assert_eq!(log.entries[1].series[4].reps, "15");
        }

        let two = (0..2).map(|_| Serie::new("5", Some(60.0))).collect();
        h.engine.edit_series(0, two).await.unwrap();
        assert_eq!(h.engine.session().unwrap().entries[1].series.len(), 2);
    }

    #[tokio::test]
    async fn follower_series_resize_is_rejected() {
        let mut h = harness().await;
        let mut treino = grid_template(2, 3);
        treino.exercises[1].follows_previous = true;
        start_template(&mut h, treino).await;

        let err = h
            .engine
            .edit_series(1, vec![Serie::new("20", Some(5.0))])
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<EngineError>(),
            Some(&EngineError::FollowerLocked)
        );

        // Same-count value edits stay open on a follower.
        let same: Vec<Serie> = (0..3).map(|_| Serie::new("20", Some(5.0))).collect();
        h.engine.edit_series(1, same).await.unwrap();
        let log = h.engine.session().unwrap();
        assert_eq!(log.entries[1].series.len(), 3);
        assert_eq!(log.entries[1].series[0].reps, "20");
    }

    #[tokio::test]
    async fn template_links_are_normalized_to_pairs_on_start() {
        let mut h = harness().await;
        let mut treino = grid_template(3, 2);
        treino.exercises[0].follows_previous = true;
        treino.exercises[1].follows_previous = true;
        treino.exercises[1].sets = 5;
        treino.exercises[2].follows_previous = true;
        start_template(&mut h, treino).await;

        let log = h.engine.session().unwrap();
        assert!(!log.entries[0].follows_previous);
        assert!(log.entries[1].follows_previous);
        // Chained link dropped, pair widths equalized.
        assert!(!log.entries[2].follows_previous);
        assert_eq!(log.entries[1].series.len(), 2);
    }

    #[tokio::test]
    async fn dropset_suppresses_rest_until_the_chain_ends() {
        let mut h = harness().await;
        start_template(&mut h, grid_template(1, 2)).await;
        h.engine.add_dropset(0, 0).await.unwrap();

        let events = h.engine.complete_current_set(Utc::now()).await.unwrap();
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, EngineEvent::RestStarted { .. }))
        );
        assert!(h.engine.session().unwrap().timer.is_none());

        // Completing the dropset ends the chain; the next set is normal.
        let events = h.engine.complete_current_set(Utc::now()).await.unwrap();
        assert!(
            events
                .iter()
                .any(|e| matches!(e, EngineEvent::RestStarted { secs: 90 }))
        );
        let timer = h.engine.session().unwrap().timer.clone().unwrap();
        assert_eq!(timer.kind, TimerKind::Rest);
    }

    #[tokio::test]
    async fn finishing_the_last_set_skips_the_rest_timer() {
        let mut h = harness().await;
        start_template(&mut h, grid_template(1, 1)).await;
        let events = h.engine.complete_current_set(Utc::now()).await.unwrap();
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, EngineEvent::RestStarted { .. }))
        );
        assert!(
            events
                .iter()
                .any(|e| matches!(e, EngineEvent::SessionFinished { .. }))
        );
    }

    #[tokio::test]
    async fn background_rest_schedules_and_skip_cancels() {
        let mut h = harness().await;
        start_template(&mut h, grid_template(1, 2)).await;

        h.engine.complete_current_set(Utc::now()).await.unwrap();
        let id = {
            let log = h.engine.session().unwrap();
            log.pending_notification.clone().unwrap()
        };
        assert_eq!(
            h.notifier.calls.lock().unwrap()[0],
            format!("schedule:{id}:90")
        );

        assert!(h.engine.skip_timer().await.unwrap());
        let log = h.engine.session().unwrap();
        assert!(log.timer.is_none());
        assert!(log.pending_notification.is_none());
        // Skipping rest never completes work.
        assert!(!log.entries[0].series[1].completed);
        assert_eq!(h.notifier.calls.lock().unwrap()[1], format!("cancel:{id}"));
    }

    #[tokio::test]
    async fn foreground_rest_schedules_no_notification() {
        let mut h = harness().await;
        start_template(&mut h, grid_template(1, 2)).await;
        h.engine.set_foreground(true).await.unwrap();

        let events = h.engine.complete_current_set(Utc::now()).await.unwrap();
        assert!(
            events
                .iter()
                .any(|e| matches!(e, EngineEvent::RestStarted { .. }))
        );
        assert!(h.notifier.calls.lock().unwrap().is_empty());
        assert!(h.engine.session().unwrap().pending_notification.is_none());
    }

    #[tokio::test]
    async fn entering_foreground_cancels_the_pending_notification() {
        let mut h = harness().await;
        start_template(&mut h, grid_template(1, 2)).await;
        h.engine.complete_current_set(Utc::now()).await.unwrap();
        assert!(h.engine.session().unwrap().pending_notification.is_some());

        h.engine.set_foreground(true).await.unwrap();
        assert!(h.engine.session().unwrap().pending_notification.is_none());
        assert!(
            h.notifier
                .calls
                .lock()
                .unwrap()
                .iter()
                .any(|c| c.starts_with("cancel:"))
        );
    }

    #[tokio::test]
    async fn freeform_name_follows_completed_muscles_until_renamed() {
        let mut h = harness().await;
        start_freeform(&mut h).await;
        h.engine
            .add_exercise("Supino", Some(Muscle::Chest), Modality::Bodyweight, 2, "10", 0)
            .await
            .unwrap();
        h.engine
            .add_exercise("Remada", Some(Muscle::Back), Modality::Bodyweight, 1, "10", 0)
            .await
            .unwrap();

        h.engine.complete_current_set(Utc::now()).await.unwrap();
        assert_eq!(h.engine.session().unwrap().name, "Chest");

        h.engine.complete_current_set(Utc::now()).await.unwrap();
        assert_eq!(h.engine.session().unwrap().name, "Chest");

        h.engine.rename("Push A").await.unwrap();
        let events = h.engine.complete_current_set(Utc::now()).await.unwrap();
        match events.last() {
            Some(EngineEvent::SessionFinished { name, .. }) => assert_eq!(name, "Push A"),
            other => panic!("expected SessionFinished, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn repeated_muscles_collapse_in_the_suggested_name() {
        let mut h = harness().await;
        start_freeform(&mut h).await;
        h.engine
            .add_exercise("Supino", Some(Muscle::Chest), Modality::Bodyweight, 1, "10", 0)
            .await
            .unwrap();
        h.engine
            .add_exercise(
                "Crucifixo",
                Some(Muscle::Chest),
                Modality::BilateralDumbbell,
                1,
                "12",
                0,
            )
            .await
            .unwrap();
        h.engine
            .add_exercise("Remada", Some(Muscle::Back), Modality::Bodyweight, 2, "10", 0)
            .await
            .unwrap();

        for _ in 0..3 {
            h.engine.complete_current_set(Utc::now()).await.unwrap();
        }
        assert_eq!(h.engine.session().unwrap().name, "Chest · Back");
    }

    #[tokio::test]
    async fn freeform_finalize_enqueues_workout_then_log() {
        let mut h = harness().await;
        start_freeform(&mut h).await;
        h.engine
            .add_exercise("Supino", Some(Muscle::Chest), Modality::Bodyweight, 1, "10", 0)
            .await
            .unwrap();
        h.engine.complete_current_set(Utc::now()).await.unwrap();

        let queue = SyncQueue::new(h.pool.clone());
        let pending = queue.pending().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].kind, MutationKind::CreateWorkout);
        assert_eq!(pending[1].kind, MutationKind::CreateLog);

        let workout_id = pending[0].payload["workout_id"].as_str().unwrap();
        assert!(workout_id.starts_with("local-"));
        assert_eq!(pending[1].payload["workout_id"], workout_id);

        // Store slot is gone.
        let mut engine = fresh_engine(&h);
        assert!(!engine.resume().await.unwrap());
    }

    #[tokio::test]
    async fn template_finalize_enqueues_log_only() {
        let mut h = harness().await;
        start_template(&mut h, grid_template(1, 1)).await;
        h.engine.complete_current_set(Utc::now()).await.unwrap();

        let pending = SyncQueue::new(h.pool.clone()).pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, MutationKind::CreateLog);
        assert_eq!(pending[0].payload["workout_id"], "tpl-1");
    }

    #[tokio::test]
    async fn edited_template_structure_is_pushed_back_on_finalize() {
        let mut h = harness().await;
        start_template(&mut h, grid_template(1, 1)).await;
        h.engine.copy_set(0, 0).await.unwrap();
        h.engine.complete_current_set(Utc::now()).await.unwrap();
        h.engine.complete_current_set(Utc::now()).await.unwrap();

        let pending = SyncQueue::new(h.pool.clone()).pending().await.unwrap();
        let kinds: Vec<_> = pending.iter().map(|m| m.kind).collect();
        assert_eq!(
            kinds,
            vec![MutationKind::CreateLog, MutationKind::UpdateWorkout]
        );
        assert_eq!(pending[1].payload["exercises"][0]["sets"], 2);
    }

    #[tokio::test]
    async fn finishing_with_nothing_completed_syncs_nothing() {
        let mut h = harness().await;
        start_template(&mut h, grid_template(2, 3)).await;
        let events = h.engine.finish(Utc::now()).await.unwrap();
        assert!(
            events
                .iter()
                .any(|e| matches!(e, EngineEvent::SessionFinished { .. }))
        );
        assert!(SyncQueue::new(h.pool.clone()).pending().await.unwrap().is_empty());
        let mut engine = fresh_engine(&h);
        assert!(!engine.resume().await.unwrap());
    }

    #[tokio::test]
    async fn exercise_timer_expiry_completes_the_set_and_starts_rest() {
        let mut h = harness().await;
        start_template(&mut h, grid_template(1, 2)).await;
        h.engine.toggle_time_based(0, 0).await.unwrap();

        let t0 = Utc::now();
        let events = h.engine.begin_timed_set(t0).await.unwrap();
        assert!(
            events
                .iter()
                .any(|e| matches!(e, EngineEvent::ExerciseTimerStarted { secs: 30 }))
        );

        // Not due yet.
        assert!(h.engine.tick(t0 + chrono::Duration::seconds(10)).await.unwrap().is_empty());

        let events = h
            .engine
            .tick(t0 + chrono::Duration::seconds(31))
            .await
            .unwrap();
        assert!(
            events
                .iter()
                .any(|e| matches!(e, EngineEvent::ExerciseTimerFinished))
        );
        assert!(
            events
                .iter()
                .any(|e| matches!(e, EngineEvent::SetCompleted { .. }))
        );
        assert!(
            events
                .iter()
                .any(|e| matches!(e, EngineEvent::RestStarted { secs: 90 }))
        );

        let log = h.engine.session().unwrap();
        assert!(log.entries[0].series[0].completed);
        assert_eq!(log.timer.as_ref().unwrap().kind, TimerKind::Rest);
    }

    #[tokio::test]
    async fn manual_done_retires_the_exercise_timer() {
        let mut h = harness().await;
        start_template(&mut h, grid_template(1, 2)).await;
        h.engine.add_dropset(0, 0).await.unwrap();
        h.engine.toggle_time_based(0, 0).await.unwrap();

        let t0 = Utc::now();
        h.engine.begin_timed_set(t0).await.unwrap();

        // Done well before the countdown runs out; the next set is the drop,
        // so no rest replaces it either.
        let events = h
            .engine
            .complete_current_set(t0 + chrono::Duration::seconds(5))
            .await
            .unwrap();
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, EngineEvent::RestStarted { .. }))
        );
        assert!(h.engine.session().unwrap().timer.is_none());

        // The old expiry instant passes with nothing left to fire.
        let events = h
            .engine
            .tick(t0 + chrono::Duration::seconds(31))
            .await
            .unwrap();
        assert!(events.is_empty());
        let log = h.engine.session().unwrap();
        assert!(log.entries[0].series[0].completed);
        assert!(!log.entries[0].series[1].completed);
    }

    #[tokio::test]
    async fn timed_expiry_flows_into_the_dropset_without_rest() {
        let mut h = harness().await;
        start_template(&mut h, grid_template(1, 2)).await;
        h.engine.add_dropset(0, 0).await.unwrap();
        h.engine.toggle_time_based(0, 0).await.unwrap();

        let t0 = Utc::now();
        h.engine.begin_timed_set(t0).await.unwrap();
        let events = h
            .engine
            .tick(t0 + chrono::Duration::seconds(31))
            .await
            .unwrap();

        assert!(
            events
                .iter()
                .any(|e| matches!(e, EngineEvent::ExerciseTimerFinished))
        );
        assert!(
            events
                .iter()
                .any(|e| matches!(e, EngineEvent::SetCompleted { .. }))
        );
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, EngineEvent::RestStarted { .. }))
        );

        let log = h.engine.session().unwrap();
        assert!(log.timer.is_none());
        assert!(!log.entries[0].series[1].completed);
        assert_eq!(
            current_pointer(log),
            Some(SetPointer {
                exercise: 0,
                set: 1
            })
        );
    }

    #[tokio::test]
    async fn a_second_session_cannot_start() {
        let mut h = harness().await;
        start_template(&mut h, grid_template(1, 1)).await;
        let err = h
            .engine
            .start(
                StartSource::Freeform,
                &FakeTemplates(None),
                &FakeProfile(Some(80.0)),
                "user-1",
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<EngineError>(),
            Some(&EngineError::AlreadyActive)
        );
    }

    #[tokio::test]
    async fn start_falls_back_to_default_body_weight_offline() {
        let mut h = harness().await;
        h.engine
            .start(
                StartSource::Freeform,
                &FakeTemplates(None),
                &FakeProfile(None),
                "user-1",
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(
            h.engine.session().unwrap().body_weight,
            DEFAULT_BODY_WEIGHT_KG
        );
    }

    #[tokio::test]
    async fn completed_sets_reject_edits_until_reopened() {
        let mut h = harness().await;
        start_template(&mut h, grid_template(1, 2)).await;
        h.engine.complete_current_set(Utc::now()).await.unwrap();
        assert_eq!(h.engine.session().unwrap().total_load, 800.0);

        let err = h
            .engine
            .update_set(0, 0, Some(40.0), None)
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<EngineError>(),
            Some(&EngineError::SetLocked)
        );

        h.engine.reopen_set(0, 0).await.unwrap();
        assert_eq!(h.engine.session().unwrap().total_load, 0.0);
        h.engine.update_set(0, 0, Some(40.0), None).await.unwrap();
    }

    #[tokio::test]
    async fn removing_the_last_set_cascades_and_releases_the_follower() {
        let mut h = harness().await;
        let mut treino = grid_template(2, 1);
        treino.exercises[1].follows_previous = true;
        start_template(&mut h, treino).await;

        let entry_removed = h.engine.remove_set(0, 0).await.unwrap();
        assert!(entry_removed);

        let log = h.engine.session().unwrap();
        assert_eq!(log.entries.len(), 1);
        assert!(!log.entries[0].follows_previous);
        assert!(log.structure_edited);
    }

    #[tokio::test]
    async fn removing_a_dropset_parent_rekinds_the_orphan() {
        let mut h = harness().await;
        start_template(&mut h, grid_template(1, 2)).await;
        h.engine.add_dropset(0, 0).await.unwrap();

        h.engine.remove_set(0, 0).await.unwrap();

        let log = h.engine.session().unwrap();
        assert_eq!(log.entries[0].series.len(), 2);
        assert_eq!(log.entries[0].series[0].kind, SetKind::Normal);

        // The re-kinded head behaves like any plain set: rest follows it.
        let events = h.engine.complete_current_set(Utc::now()).await.unwrap();
        assert!(
            events
                .iter()
                .any(|e| matches!(e, EngineEvent::RestStarted { secs: 90 }))
        );
    }

    #[tokio::test]
    async fn series_edits_cannot_leave_a_dropset_first() {
        let mut h = harness().await;
        start_template(&mut h, grid_template(1, 2)).await;

        let parent = Serie::new("10", Some(20.0));
        let layout = vec![Serie::dropset_from(&parent), parent];
        h.engine.edit_series(0, layout).await.unwrap();

        let log = h.engine.session().unwrap();
        assert_eq!(log.entries[0].series[0].kind, SetKind::Normal);
        assert_eq!(log.entries[0].series[1].kind, SetKind::Normal);
    }

    #[tokio::test]
    async fn abandonment_clears_without_syncing() {
        let mut h = harness().await;
        start_template(&mut h, grid_template(1, 2)).await;
        h.engine.complete_current_set(Utc::now()).await.unwrap();

        assert!(h.engine.abandon().await.unwrap());
        assert!(
            SyncQueue::new(h.pool.clone())
                .pending()
                .await
                .unwrap()
                .is_empty()
        );
        let mut engine = fresh_engine(&h);
        assert!(!engine.resume().await.unwrap());
        assert!(
            h.notifier
                .calls
                .lock()
                .unwrap()
                .iter()
                .any(|c| c.starts_with("cancel:"))
        );
    }
}
