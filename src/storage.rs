use anyhow::{Context, Result};
use chrono::Utc;

use crate::db::DB;
use crate::models::WorkoutLog;

/// Durable slot for the one in-progress session. The session is stored whole
/// as a JSON blob; nothing else reads inside it.
pub struct SessionStore {
    pool: DB,
}

impl SessionStore {
    pub fn new(pool: DB) -> Self {
        Self { pool }
    }

    /// Writes the session into the slot, or clears the slot for `None`.
    pub async fn save(&self, session: Option<&WorkoutLog>) -> Result<()> {
        match session {
            Some(log) => {
                let body =
                    serde_json::to_string(log).context("could not serialize session")?;
                sqlx::query(
                    r#"
                    INSERT INTO active_session (slot, body, updated_at)
                    VALUES (1, ?, ?)
                    ON CONFLICT(slot) DO UPDATE SET
                        body = excluded.body,
                        updated_at = excluded.updated_at
                    "#,
                )
                .bind(body)
                .bind(Utc::now().to_rfc3339())
                .execute(&self.pool)
                .await
                .context("could not persist session")?;
            }
            None => {
                sqlx::query("DELETE FROM active_session WHERE slot = 1")
                    .execute(&self.pool)
                    .await
                    .context("could not clear session slot")?;
            }
        }
        Ok(())
    }

    /// Reads the slot back. A blob that no longer parses is discarded with a
    /// warning instead of locking the user out of starting a fresh session.
    pub async fn load(&self) -> Result<Option<WorkoutLog>> {
        let body: Option<String> =
            sqlx::query_scalar("SELECT body FROM active_session WHERE slot = 1")
                .fetch_optional(&self.pool)
                .await
                .context("could not read session slot")?;

        let Some(body) = body else {
            return Ok(None);
        };

        match serde_json::from_str(&body) {
            Ok(log) => Ok(Some(log)),
            Err(e) => {
                tracing::warn!(error = %e, "discarding unreadable session blob");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ExerciseEntry, Modality, Serie, SessionStatus, SetKind, local_id,
    };
    use crate::timer::{ActiveTimer, TimerKind};
    use sqlx::SqlitePool;

    async fn store() -> SessionStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        crate::db::init_schema(&pool).await.unwrap();
        SessionStore::new(pool)
    }

    fn sample_session() -> WorkoutLog {
        let mut supino =
            ExerciseEntry::new("Supino reto", Modality::Barbell { bar_weight: 20.0 }, 90);
        supino.series = vec![Serie::new("8-12", Some(10.0)), Serie::new("8-12", Some(10.0))];
        supino.series[0].completed = true;
        let drop = Serie::dropset_from(&supino.series[1]);
        supino.series.push(drop);

        let mut remada = ExerciseEntry::new("Remada curvada", Modality::Unilateral, 90);
        remada.series = vec![Serie::new("10", Some(30.0)), Serie::new("10", Some(30.0))];
        remada.follows_previous = true;

        WorkoutLog {
            id: local_id(),
            user_id: "local-user".into(),
            name: "Peito · Costas".into(),
            name_edited: false,
            template_id: None,
            entries: vec![supino, remada],
            started_at: Utc::now(),
            finished_at: None,
            status: SessionStatus::InProgress,
            body_weight: 80.0,
            total_load: 320.0,
            timer: Some(ActiveTimer::start(TimerKind::Rest, 90, Utc::now())),
            pending_notification: Some("rest-end".into()),
            structure_edited: false,
        }
    }

    #[tokio::test]
    async fn round_trip_preserves_nested_structure() {
        let store = store().await;
        let session = sample_session();

        store.save(Some(&session)).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();

        assert_eq!(loaded, session);
        assert!(loaded.entries[1].follows_previous);
        assert_eq!(loaded.entries[0].series[2].kind, SetKind::Dropset);
    }

    #[tokio::test]
    async fn saving_twice_overwrites_the_slot() {
        let store = store().await;
        let first = sample_session();
        let mut second = sample_session();
        second.name = "Renamed".into();

        store.save(Some(&first)).await.unwrap();
        store.save(Some(&second)).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.name, "Renamed");
    }

    #[tokio::test]
    async fn saving_none_clears_the_slot() {
        let store = store().await;
        store.save(Some(&sample_session())).await.unwrap();
        store.save(None).await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_slot_loads_as_none() {
        let store = store().await;
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_blob_degrades_to_none() {
        let store = store().await;
        sqlx::query("INSERT INTO active_session (slot, body, updated_at) VALUES (1, ?, ?)")
            .bind("{not json")
            .bind(Utc::now().to_rfc3339())
            .execute(&store.pool)
            .await
            .unwrap();

        assert!(store.load().await.unwrap().is_none());
    }
}
