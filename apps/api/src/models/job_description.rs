use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct JobDescriptionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub company: Option<String>,
    pub experience_level: Option<String>,
    pub file_url: String,
    pub parsed_text: String,
    pub skills: Value,
    pub created_at: DateTime<Utc>,
}

/// Shape of the `skills` JSON column.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSkills {
    pub required: Vec<String>,
    #[serde(default)]
    pub nice_to_have: Vec<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct JobListItem {
    pub id: Uuid,
    pub title: String,
    pub company: Option<String>,
    pub skills: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct JobSummary {
    pub id: Uuid,
    pub title: String,
    pub company: Option<String>,
}
