//! Boundary contracts the session engine consumes. Implementations live in
//! `remote.rs`; tests swap in hand-rolled fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::Treino;

/// Body weight used to seed the load calculator when the profile fetch fails
/// offline. Keeps session start non-blocking at the cost of approximate
/// bodyweight totals until the profile syncs.
pub const DEFAULT_BODY_WEIGHT_KG: f32 = 70.0;

#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Unexpected(String),
}

pub type PortResult<T> = Result<T, PortError>;

impl From<sqlx::Error> for PortError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => PortError::NotFound("row not found".into()),
            other => PortError::Unexpected(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub weight: f32,
    #[serde(default)]
    pub historical_weights: Vec<f32>,
}

/// Structured templates a session can be started from.
#[async_trait]
pub trait TemplateSource: Send + Sync {
    async fn workout_by_id(&self, id: &str) -> PortResult<Option<Treino>>;
}

/// Remote store the sync queue drains into.
#[async_trait]
pub trait RemoteSink: Send + Sync {
    /// Create-or-merge a workout log. When `existing_id` is given the remote
    /// record with that id is overwritten; otherwise the sink assigns an id
    /// and returns it.
    async fn submit_log(
        &self,
        payload: &serde_json::Value,
        existing_id: Option<&str>,
    ) -> PortResult<String>;

    /// Materializes a first-class workout record, returning its server id.
    async fn create_workout(&self, payload: &serde_json::Value) -> PortResult<String>;

    async fn update_workout(&self, id: &str, payload: &serde_json::Value) -> PortResult<()>;
}

#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn profile(&self, user_id: &str) -> PortResult<UserProfile>;
}

/// Local notification slots for rest timers that outlive the foreground app.
/// Every `schedule` is paired with a `cancel` once the countdown is visible
/// again, so a stale alert never fires after the user watched it finish.
pub trait NotificationScheduler: Send + Sync {
    fn schedule(&self, id: &str, title: &str, body: &str, seconds_from_now: u32);
    fn cancel(&self, id: &str);
}

/// Gate for everything that talks to the remote store.
pub trait Connectivity: Send + Sync {
    fn is_connected(&self) -> bool;
}
