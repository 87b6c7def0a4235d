use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub location: Option<String>,
    pub seniority: Option<String>,
    pub tech_stack: Vec<String>,
    pub file_url: String,
    pub parsed_text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CandidateListItem {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub location: Option<String>,
    pub seniority: Option<String>,
    pub tech_stack: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CandidateSummary {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
}
