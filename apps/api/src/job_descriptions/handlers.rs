use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::analyzer::JobAnalysis;
use crate::auth::AuthUser;
use crate::documents::{receive_document, StoredUpload};
use crate::errors::AppError;
use crate::extract::AppPath;
use crate::models::job_description::{JobDescriptionRow, JobListItem, JobSkills};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobUploadResponse {
    pub id: Uuid,
    pub title: String,
    pub company: Option<String>,
    pub skills: Value,
    pub experience_level: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct JobAnalysisCandidate {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct JobAnalysisEntry {
    pub id: Uuid,
    pub candidate_id: Uuid,
    pub match_percentage: f64,
    pub top_skills: Vec<String>,
    pub missing_skills: Vec<String>,
    pub generated_message: String,
    pub message_template: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(skip)]
    pub candidate_name: String,
    #[serde(skip)]
    pub candidate_email: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAnalysisView {
    #[serde(flatten)]
    pub entry: JobAnalysisEntry,
    pub candidate: JobAnalysisCandidate,
}

#[derive(Debug, Serialize)]
pub struct JobDetailResponse {
    #[serde(flatten)]
    pub job: JobDescriptionRow,
    pub analyses: Vec<JobAnalysisView>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// POST /api/job-descriptions
///
/// Multipart upload → text extraction → LLM extraction → insert.
pub async fn handle_upload_job(
    State(state): State<AppState>,
    auth: AuthUser,
    mut multipart: Multipart,
) -> Result<Json<JobUploadResponse>, AppError> {
    let upload = receive_document(&mut multipart, &state.config.upload_dir).await?;
    let outcome = ingest_job(&state, &auth, &upload).await;
    upload.finish(state.config.production).await;
    outcome.map(Json)
}

async fn ingest_job(
    state: &AppState,
    auth: &AuthUser,
    upload: &StoredUpload,
) -> Result<JobUploadResponse, AppError> {
    let text = upload.cleaned_text().await?;
    let analysis: JobAnalysis = state.analyzer.analyze_job_description(&text).await?;

    let skills = JobSkills {
        required: analysis.required_skills,
        nice_to_have: analysis.nice_to_have_skills.unwrap_or_default(),
    };
    let skills = serde_json::to_value(&skills).map_err(anyhow::Error::from)?;

    let row = sqlx::query_as::<_, JobDescriptionRow>(
        r#"
        INSERT INTO job_descriptions
            (user_id, title, company, experience_level, file_url, parsed_text, skills)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(auth.user_id)
    .bind(&analysis.title)
    .bind(&analysis.company)
    .bind(&analysis.experience_level)
    .bind(upload.file_url())
    .bind(&text)
    .bind(&skills)
    .fetch_one(&state.db)
    .await?;

    info!(
        user_id = %auth.user_id,
        job_id = %row.id,
        file = upload.original_name.as_deref().unwrap_or("<unnamed>"),
        "Job description stored: {}",
        row.title
    );

    Ok(JobUploadResponse {
        id: row.id,
        title: row.title,
        company: row.company,
        skills: row.skills,
        experience_level: row.experience_level,
    })
}

/// GET /api/job-descriptions
pub async fn handle_list_jobs(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<JobListItem>>, AppError> {
    let jobs = sqlx::query_as::<_, JobListItem>(
        r#"
        SELECT id, title, company, skills, created_at
        FROM job_descriptions
        WHERE user_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(auth.user_id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(jobs))
}

/// GET /api/job-descriptions/:id
pub async fn handle_get_job(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(job_id): AppPath<Uuid>,
) -> Result<Json<JobDetailResponse>, AppError> {
    let job = sqlx::query_as::<_, JobDescriptionRow>(
        "SELECT * FROM job_descriptions WHERE id = $1 AND user_id = $2",
    )
    .bind(job_id)
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound("Job description not found".to_string()))?;

    let entries = sqlx::query_as::<_, JobAnalysisEntry>(
        r#"
        SELECT a.id, a.candidate_id, a.match_percentage, a.top_skills, a.missing_skills,
               a.generated_message, a.message_template, a.created_at,
               c.name AS candidate_name, c.email AS candidate_email
        FROM analyses a
        JOIN candidates c ON c.id = a.candidate_id
        WHERE a.job_id = $1 AND a.user_id = $2
        ORDER BY a.match_percentage DESC
        "#,
    )
    .bind(job_id)
    .bind(auth.user_id)
    .fetch_all(&state.db)
    .await?;

    let analyses = entries
        .into_iter()
        .map(|entry| JobAnalysisView {
            candidate: JobAnalysisCandidate {
                id: entry.candidate_id,
                name: entry.candidate_name.clone(),
                email: entry.candidate_email.clone(),
            },
            entry,
        })
        .collect();

    Ok(Json(JobDetailResponse { job, analyses }))
}

/// DELETE /api/job-descriptions/:id
pub async fn handle_delete_job(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(job_id): AppPath<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    let result = sqlx::query("DELETE FROM job_descriptions WHERE id = $1 AND user_id = $2")
        .bind(job_id)
        .bind(auth.user_id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Job description not found".to_string()));
    }

    info!(user_id = %auth.user_id, job_id = %job_id, "Job description deleted");
    Ok(Json(MessageResponse {
        message: "Job description deleted successfully".to_string(),
    }))
}
