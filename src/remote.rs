//! Concrete adapters behind the engine's ports.
//!
//! The remote sink is a second sqlite file standing in for the backend API.
//! Pointing `remote_db` at a shared path exercises the whole queue-and-drain
//! path end to end without a server in the picture.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::db::{self, DB};
use crate::models::{Modality, Treino, TreinoExercise};
use crate::ports::{
    Connectivity, NotificationScheduler, PortError, PortResult, ProfileSource, RemoteSink,
    TemplateSource, UserProfile,
};
use crate::types::{Config, Muscle};

/// Backend stand-in: logs and workouts land as opaque JSON rows in their own
/// sqlite file.
pub struct SqliteRemote {
    pool: DB,
}

impl SqliteRemote {
    pub fn new(pool: DB) -> Self {
        Self { pool }
    }

    pub async fn connect(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        init_remote_schema(&pool).await?;
        Ok(Self::new(pool))
    }
}

/// Receiving side of the sync protocol. Same bootstrap discipline as the
/// local schema.
pub async fn init_remote_schema(pool: &DB) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS logs (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL,
            body        TEXT NOT NULL,
            received_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workouts (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL,
            body        TEXT NOT NULL,
            received_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[async_trait]
impl RemoteSink for SqliteRemote {
    async fn submit_log(&self, payload: &Value, existing_id: Option<&str>) -> PortResult<String> {
        let id = match existing_id {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };
        upsert(&self.pool, "logs", &id, payload).await?;
        Ok(id)
    }

    async fn create_workout(&self, payload: &Value) -> PortResult<String> {
        let id = Uuid::new_v4().to_string();
        upsert(&self.pool, "workouts", &id, payload).await?;
        Ok(id)
    }

    async fn update_workout(&self, id: &str, payload: &Value) -> PortResult<()> {
        upsert(&self.pool, "workouts", id, payload).await?;
        Ok(())
    }
}

/// Create-or-merge keyed on id, so a retried mutation lands exactly once.
async fn upsert(pool: &DB, table: &str, id: &str, payload: &Value) -> PortResult<()> {
    let sql = format!(
        "INSERT INTO {table} (id, user_id, body, received_at) VALUES (?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET body = excluded.body, received_at = excluded.received_at"
    );
    sqlx::query(&sql)
        .bind(id)
        .bind(payload["user_id"].as_str().unwrap_or(""))
        .bind(payload.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await?;
    Ok(())
}

/// Template CRUD over the local database. Doubles as the engine's
/// `TemplateSource`.
#[derive(Clone)]
pub struct SqliteTemplates {
    pool: DB,
}

impl SqliteTemplates {
    pub fn new(pool: DB) -> Self {
        Self { pool }
    }

    /// Inserts the template and its exercises in one transaction. Fails on a
    /// duplicate name (`UNIQUE` on `templates.name`).
    pub async fn import(&self, treino: &Treino) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO templates (id, name, rest_secs, created_at) VALUES (?, ?, ?, ?)")
            .bind(&treino.id)
            .bind(&treino.name)
            .bind(treino.rest_secs as i64)
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?;

        for (position, ex) in treino.exercises.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO template_exercises
                    (template_id, position, name, muscle, modality, sets, reps, follows_previous)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&treino.id)
            .bind(position as i64)
            .bind(&ex.name)
            .bind(ex.muscle)
            .bind(serde_json::to_string(&ex.modality)?)
            .bind(ex.sets as i64)
            .bind(&ex.reps)
            .bind(ex.follows_previous)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn by_name(&self, name: &str) -> Result<Option<Treino>> {
        let header: Option<(String, String, i64)> =
            sqlx::query_as("SELECT id, name, rest_secs FROM templates WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        match header {
            Some(header) => Ok(Some(self.hydrate(header).await?)),
            None => Ok(None),
        }
    }

    pub async fn all(&self) -> Result<Vec<Treino>> {
        let headers: Vec<(String, String, i64)> =
            sqlx::query_as("SELECT id, name, rest_secs FROM templates ORDER BY name")
                .fetch_all(&self.pool)
                .await?;
        let mut out = Vec::with_capacity(headers.len());
        for header in headers {
            out.push(self.hydrate(header).await?);
        }
        Ok(out)
    }

    pub async fn names(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM templates ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Removes the template and its exercises; `false` when the name is
    /// unknown.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        let row: Option<(String,)> = sqlx::query_as("SELECT id FROM templates WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        let Some((id,)) = row else {
            return Ok(false);
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM template_exercises WHERE template_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM templates WHERE id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn hydrate(&self, (id, name, rest_secs): (String, String, i64)) -> Result<Treino> {
        let rows: Vec<(String, Option<Muscle>, String, i64, String, bool)> = sqlx::query_as(
            r#"
            SELECT name, muscle, modality, sets, reps, follows_previous
            FROM template_exercises
            WHERE template_id = ?
            ORDER BY position
            "#,
        )
        .bind(&id)
        .fetch_all(&self.pool)
        .await?;

        let mut exercises = Vec::with_capacity(rows.len());
        for (name, muscle, modality, sets, reps, follows_previous) in rows {
            let modality: Modality = serde_json::from_str(&modality)
                .with_context(|| format!("modality of `{name}` is unreadable"))?;
            exercises.push(TreinoExercise {
                name,
                muscle,
                modality,
                sets: sets as u32,
                reps,
                follows_previous,
            });
        }

        Ok(Treino {
            id,
            name,
            rest_secs: rest_secs as u32,
            exercises,
        })
    }
}

#[async_trait]
impl TemplateSource for SqliteTemplates {
    async fn workout_by_id(&self, id: &str) -> PortResult<Option<Treino>> {
        let header: Option<(String, String, i64)> =
            sqlx::query_as("SELECT id, name, rest_secs FROM templates WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        match header {
            Some(header) => {
                let treino = self
                    .hydrate(header)
                    .await
                    .map_err(|e| PortError::Unexpected(e.to_string()))?;
                Ok(Some(treino))
            }
            None => Ok(None),
        }
    }
}

/// Profile backed by the local config file. The `body_weight` key stands in
/// for the per-user profile the backend would serve.
pub struct ConfigProfile {
    weight: Option<f32>,
}

impl ConfigProfile {
    pub fn from_config(config: &Config) -> Self {
        Self {
            weight: config.body_weight(),
        }
    }
}

#[async_trait]
impl ProfileSource for ConfigProfile {
    async fn profile(&self, _user_id: &str) -> PortResult<UserProfile> {
        match self.weight {
            Some(weight) => Ok(UserProfile {
                weight,
                historical_weights: Vec::new(),
            }),
            None => Err(PortError::NotFound("body_weight is not configured".into())),
        }
    }
}

/// Connected when a remote database is configured and `offline` is unset.
pub struct ConfigConnectivity {
    connected: bool,
}

impl ConfigConnectivity {
    pub fn from_config(config: &Config) -> Self {
        Self {
            connected: config.remote_db().is_some() && !config.offline(),
        }
    }
}

impl Connectivity for ConfigConnectivity {
    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// The CLI has no OS notification surface; scheduled alerts go to the log
/// stream so the schedule/cancel pairing stays observable. The live countdown
/// in `session watch` rings the terminal bell instead.
pub struct TracingNotifier;

impl NotificationScheduler for TracingNotifier {
    fn schedule(&self, id: &str, title: &str, body: &str, seconds_from_now: u32) {
        tracing::info!(id, title, body, seconds_from_now, "notification scheduled");
    }

    fn cancel(&self, id: &str) {
        tracing::info!(id, "notification cancelled");
    }
}
