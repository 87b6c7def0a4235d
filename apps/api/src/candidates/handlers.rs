use axum::{
    extract::{Multipart, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::documents::{receive_document, StoredUpload};
use crate::errors::AppError;
use crate::extract::AppPath;
use crate::job_descriptions::handlers::MessageResponse;
use crate::models::analysis::AnalysisRow;
use crate::models::candidate::{CandidateListItem, CandidateRow};
use crate::models::job_description::JobSummary;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CandidateTags {
    pub location: Option<String>,
    pub seniority: Option<String>,
    pub tech: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CandidateUploadResponse {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub tags: CandidateTags,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
struct CandidateAnalysisRow {
    id: Uuid,
    job_id: Uuid,
    match_percentage: f64,
    top_skills: Vec<String>,
    missing_skills: Vec<String>,
    generated_message: String,
    message_template: String,
    created_at: DateTime<Utc>,
    job_title: String,
    job_company: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateAnalysisView {
    pub id: Uuid,
    pub job_id: Uuid,
    pub match_percentage: f64,
    pub top_skills: Vec<String>,
    pub missing_skills: Vec<String>,
    pub generated_message: String,
    pub message_template: String,
    pub created_at: DateTime<Utc>,
    pub job: JobSummary,
}

impl From<CandidateAnalysisRow> for CandidateAnalysisView {
    fn from(row: CandidateAnalysisRow) -> Self {
        Self {
            id: row.id,
            job_id: row.job_id,
            match_percentage: row.match_percentage,
            top_skills: row.top_skills,
            missing_skills: row.missing_skills,
            generated_message: row.generated_message,
            message_template: row.message_template,
            created_at: row.created_at,
            job: JobSummary {
                id: row.job_id,
                title: row.job_title,
                company: row.job_company,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CandidateDetailResponse {
    #[serde(flatten)]
    pub candidate: CandidateRow,
    pub analyses: Vec<CandidateAnalysisView>,
}

#[derive(Debug, Serialize)]
pub struct CandidateForJob {
    #[serde(flatten)]
    pub candidate: CandidateRow,
    pub analyses: Vec<AnalysisRow>,
}

/// POST /api/candidates
///
/// Multipart resume upload → text extraction → LLM extraction → insert.
pub async fn handle_upload_candidate(
    State(state): State<AppState>,
    auth: AuthUser,
    mut multipart: Multipart,
) -> Result<Json<CandidateUploadResponse>, AppError> {
    let upload = receive_document(&mut multipart, &state.config.upload_dir).await?;
    let outcome = ingest_candidate(&state, &auth, &upload).await;
    upload.finish(state.config.production).await;
    outcome.map(Json)
}

async fn ingest_candidate(
    state: &AppState,
    auth: &AuthUser,
    upload: &StoredUpload,
) -> Result<CandidateUploadResponse, AppError> {
    let text = upload.cleaned_text().await?;
    let analysis = state.analyzer.analyze_resume(&text).await?;

    let row = sqlx::query_as::<_, CandidateRow>(
        r#"
        INSERT INTO candidates
            (user_id, name, email, location, seniority, tech_stack, file_url, parsed_text)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(auth.user_id)
    .bind(&analysis.name)
    .bind(&analysis.email)
    .bind(&analysis.location)
    .bind(analysis.seniority.as_ref().map(|s| s.as_str()))
    .bind(&analysis.skills)
    .bind(upload.file_url())
    .bind(&text)
    .fetch_one(&state.db)
    .await?;

    info!(
        user_id = %auth.user_id,
        candidate_id = %row.id,
        file = upload.original_name.as_deref().unwrap_or("<unnamed>"),
        "Candidate stored"
    );

    Ok(CandidateUploadResponse {
        id: row.id,
        name: row.name,
        email: row.email,
        tags: CandidateTags {
            location: row.location,
            seniority: row.seniority,
            tech: row.tech_stack,
        },
    })
}

/// GET /api/candidates
pub async fn handle_list_candidates(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<CandidateListItem>>, AppError> {
    let candidates = sqlx::query_as::<_, CandidateListItem>(
        r#"
        SELECT id, name, email, location, seniority, tech_stack, created_at
        FROM candidates
        WHERE user_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(auth.user_id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(candidates))
}

/// GET /api/candidates/:id
pub async fn handle_get_candidate(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(candidate_id): AppPath<Uuid>,
) -> Result<Json<CandidateDetailResponse>, AppError> {
    let candidate = sqlx::query_as::<_, CandidateRow>(
        "SELECT * FROM candidates WHERE id = $1 AND user_id = $2",
    )
    .bind(candidate_id)
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound("Candidate not found".to_string()))?;

    let analyses = sqlx::query_as::<_, CandidateAnalysisRow>(
        r#"
        SELECT a.id, a.job_id, a.match_percentage, a.top_skills, a.missing_skills,
               a.generated_message, a.message_template, a.created_at,
               j.title AS job_title, j.company AS job_company
        FROM analyses a
        JOIN job_descriptions j ON j.id = a.job_id
        WHERE a.candidate_id = $1 AND a.user_id = $2
        ORDER BY a.created_at DESC
        "#,
    )
    .bind(candidate_id)
    .bind(auth.user_id)
    .fetch_all(&state.db)
    .await?
    .into_iter()
    .map(CandidateAnalysisView::from)
    .collect();

    Ok(Json(CandidateDetailResponse {
        candidate,
        analyses,
    }))
}

/// GET /api/candidates/for-job/:job_id
///
/// Candidates already analysed against the job, each with those analyses.
pub async fn handle_candidates_for_job(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(job_id): AppPath<Uuid>,
) -> Result<Json<Vec<CandidateForJob>>, AppError> {
    let candidates = sqlx::query_as::<_, CandidateRow>(
        r#"
        SELECT c.*
        FROM candidates c
        WHERE c.user_id = $2
          AND EXISTS (SELECT 1 FROM analyses a WHERE a.candidate_id = c.id AND a.job_id = $1)
        ORDER BY c.created_at DESC
        "#,
    )
    .bind(job_id)
    .bind(auth.user_id)
    .fetch_all(&state.db)
    .await?;

    let ids: Vec<Uuid> = candidates.iter().map(|c| c.id).collect();
    let mut analyses = sqlx::query_as::<_, AnalysisRow>(
        "SELECT * FROM analyses WHERE job_id = $1 AND candidate_id = ANY($2)",
    )
    .bind(job_id)
    .bind(&ids)
    .fetch_all(&state.db)
    .await?;

    let result = candidates
        .into_iter()
        .map(|candidate| {
            let (mine, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut analyses)
                .into_iter()
                .partition(|a| a.candidate_id == candidate.id);
            analyses = rest;
            CandidateForJob {
                candidate,
                analyses: mine,
            }
        })
        .collect();

    Ok(Json(result))
}

/// DELETE /api/candidates/:id
pub async fn handle_delete_candidate(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(candidate_id): AppPath<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    let result = sqlx::query("DELETE FROM candidates WHERE id = $1 AND user_id = $2")
        .bind(candidate_id)
        .bind(auth.user_id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Candidate not found".to_string()));
    }

    info!(user_id = %auth.user_id, candidate_id = %candidate_id, "Candidate deleted");
    Ok(Json(MessageResponse {
        message: "Candidate deleted successfully".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use sqlx::PgPool;

    use super::*;
    use crate::analyzer::FixedAnalyzer;
    use crate::db::fixtures;

    #[sqlx::test(migrations = "./migrations")]
    async fn test_foreign_candidate_is_hidden_and_kept(pool: PgPool) {
        let state = fixtures::state(pool.clone(), Arc::new(FixedAnalyzer::default()));
        let owner = fixtures::user(&pool, "owner@example.com").await;
        let other = fixtures::user(&pool, "other@example.com").await;
        let candidate_id = fixtures::candidate(&pool, owner.user_id, "Ada Lovelace").await;

        let err = handle_get_candidate(State(state.clone()), other.clone(), AppPath(candidate_id))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(msg) if msg == "Candidate not found"));

        let err = handle_delete_candidate(State(state.clone()), other, AppPath(candidate_id))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let Json(detail) = handle_get_candidate(State(state), owner, AppPath(candidate_id))
            .await
            .unwrap();
        assert_eq!(detail.candidate.name, "Ada Lovelace");
        assert!(detail.analyses.is_empty());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_owner_can_delete_candidate(pool: PgPool) {
        let state = fixtures::state(pool.clone(), Arc::new(FixedAnalyzer::default()));
        let owner = fixtures::user(&pool, "owner@example.com").await;
        let candidate_id = fixtures::candidate(&pool, owner.user_id, "Grace Hopper").await;

        let Json(done) = handle_delete_candidate(State(state.clone()), owner.clone(), AppPath(candidate_id))
            .await
            .unwrap();
        assert_eq!(done.message, "Candidate deleted successfully");

        let Json(list) = handle_list_candidates(State(state), owner).await.unwrap();
        assert!(list.is_empty());
    }
}
