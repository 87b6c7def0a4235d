use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub candidate_id: Uuid,
    pub job_id: Uuid,
    pub match_percentage: f64,
    pub top_skills: Vec<String>,
    pub missing_skills: Vec<String>,
    pub reasoning: Option<String>,
    pub generated_message: String,
    pub message_template: String,
    pub created_at: DateTime<Utc>,
}
