use axum::{
    extract::State,
    Json,
};
use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::is_unique_violation;
use crate::errors::AppError;
use crate::extract::AppPath;
use crate::messages::{generate_follow_up_message, MessageTemplate};
use crate::models::analysis::AnalysisRow;
use crate::models::candidate::{CandidateRow, CandidateSummary};
use crate::models::job_description::{JobDescriptionRow, JobSummary};
use crate::state::AppState;
use crate::subscriptions::ensure_analysis_allowed;

/// Analyses joined with the summaries of their candidate and job.
const ANALYSIS_WITH_SUMMARIES: &str = r#"
    SELECT a.*,
           c.name AS candidate_name, c.email AS candidate_email,
           j.title AS job_title, j.company AS job_company
    FROM analyses a
    JOIN candidates c ON c.id = a.candidate_id
    JOIN job_descriptions j ON j.id = a.job_id
"#;

#[derive(Debug, sqlx::FromRow)]
struct JoinedAnalysisRow {
    #[sqlx(flatten)]
    analysis: AnalysisRow,
    candidate_name: String,
    candidate_email: Option<String>,
    job_title: String,
    job_company: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AnalysisView {
    #[serde(flatten)]
    pub analysis: AnalysisRow,
    pub candidate: CandidateSummary,
    pub job: JobSummary,
}

impl From<JoinedAnalysisRow> for AnalysisView {
    fn from(row: JoinedAnalysisRow) -> Self {
        Self {
            candidate: CandidateSummary {
                id: row.analysis.candidate_id,
                name: row.candidate_name,
                email: row.candidate_email,
            },
            job: JobSummary {
                id: row.analysis.job_id,
                title: row.job_title,
                company: row.job_company,
            },
            analysis: row.analysis,
        }
    }
}

impl AnalysisView {
    fn assemble(analysis: AnalysisRow, candidate: &CandidateRow, job: &JobDescriptionRow) -> Self {
        Self {
            analysis,
            candidate: CandidateSummary {
                id: candidate.id,
                name: candidate.name.clone(),
                email: candidate.email.clone(),
            },
            job: JobSummary {
                id: job.id,
                title: job.title.clone(),
                company: job.company.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RegeneratedMessage {
    pub message: String,
}

async fn find_pair(
    pool: &PgPool,
    user_id: Uuid,
    candidate_id: Uuid,
    job_id: Uuid,
) -> Result<Option<AnalysisView>, sqlx::Error> {
    let sql = format!(
        "{ANALYSIS_WITH_SUMMARIES} WHERE a.candidate_id = $1 AND a.job_id = $2 AND a.user_id = $3"
    );
    let row = sqlx::query_as::<_, JoinedAnalysisRow>(&sql)
        .bind(candidate_id)
        .bind(job_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(AnalysisView::from))
}

/// POST /api/analysis/:candidate_id/:job_id
///
/// Returns the stored analysis for the pair when one exists; otherwise runs
/// the match, renders the follow-up message and stores the result.
pub async fn handle_create_analysis(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath((candidate_id, job_id)): AppPath<(Uuid, Uuid)>,
) -> Result<Json<AnalysisView>, AppError> {
    if let Some(existing) = find_pair(&state.db, auth.user_id, candidate_id, job_id).await? {
        info!(user_id = %auth.user_id, analysis_id = %existing.analysis.id, "Returning cached analysis");
        return Ok(Json(existing));
    }

    let not_found = || AppError::NotFound("Candidate or job not found".to_string());
    let candidate = sqlx::query_as::<_, CandidateRow>(
        "SELECT * FROM candidates WHERE id = $1 AND user_id = $2",
    )
    .bind(candidate_id)
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(not_found)?;
    let job = sqlx::query_as::<_, JobDescriptionRow>(
        "SELECT * FROM job_descriptions WHERE id = $1 AND user_id = $2",
    )
    .bind(job_id)
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(not_found)?;

    ensure_analysis_allowed(&state.db, auth.user_id, state.config.free_daily_analyses).await?;

    let matched = state
        .analyzer
        .analyze_match(&job.parsed_text, &candidate.parsed_text)
        .await?;
    let template = MessageTemplate::for_score(matched.match_percentage);
    let message = generate_follow_up_message(
        matched.match_percentage,
        &candidate.name,
        matched.top_skills.first().map(String::as_str),
        matched.missing_skills.first().map(String::as_str),
    );

    let inserted = sqlx::query_as::<_, AnalysisRow>(
        r#"
        INSERT INTO analyses
            (user_id, candidate_id, job_id, match_percentage, top_skills, missing_skills,
             reasoning, generated_message, message_template)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(auth.user_id)
    .bind(candidate_id)
    .bind(job_id)
    .bind(matched.match_percentage)
    .bind(&matched.top_skills)
    .bind(&matched.missing_skills)
    .bind(&matched.reasoning)
    .bind(&message)
    .bind(template.as_str())
    .fetch_one(&state.db)
    .await;

    match inserted {
        Ok(row) => {
            info!(
                user_id = %auth.user_id,
                analysis_id = %row.id,
                score = row.match_percentage,
                "Analysis stored"
            );
            Ok(Json(AnalysisView::assemble(row, &candidate, &job)))
        }
        Err(e) if is_unique_violation(&e) => {
            warn!(%candidate_id, %job_id, "Concurrent analysis for the same pair; returning stored row");
            find_pair(&state.db, auth.user_id, candidate_id, job_id)
                .await?
                .map(Json)
                .ok_or_else(|| AppError::Conflict("Analysis for this pair changed concurrently".to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /api/analysis/:candidate_id/:job_id
pub async fn handle_get_analysis(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath((candidate_id, job_id)): AppPath<(Uuid, Uuid)>,
) -> Result<Json<AnalysisView>, AppError> {
    find_pair(&state.db, auth.user_id, candidate_id, job_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Analysis not found".to_string()))
}

/// POST /api/analysis/:analysis_id/regenerate-message
pub async fn handle_regenerate_message(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(analysis_id): AppPath<Uuid>,
) -> Result<Json<RegeneratedMessage>, AppError> {
    let sql = format!("{ANALYSIS_WITH_SUMMARIES} WHERE a.id = $1 AND a.user_id = $2");
    let row = sqlx::query_as::<_, JoinedAnalysisRow>(&sql)
        .bind(analysis_id)
        .bind(auth.user_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Analysis not found".to_string()))?;

    let score = row.analysis.match_percentage;
    let message = generate_follow_up_message(
        score,
        &row.candidate_name,
        row.analysis.top_skills.first().map(String::as_str),
        row.analysis.missing_skills.first().map(String::as_str),
    );

    sqlx::query(
        "UPDATE analyses SET generated_message = $2, message_template = $3 WHERE id = $1",
    )
    .bind(analysis_id)
    .bind(&message)
    .bind(MessageTemplate::for_score(score).as_str())
    .execute(&state.db)
    .await?;

    Ok(Json(RegeneratedMessage { message }))
}

/// GET /api/analysis
pub async fn handle_list_analyses(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<AnalysisView>>, AppError> {
    let sql = format!("{ANALYSIS_WITH_SUMMARIES} WHERE a.user_id = $1 ORDER BY a.created_at DESC");
    let analyses = sqlx::query_as::<_, JoinedAnalysisRow>(&sql)
        .bind(auth.user_id)
        .fetch_all(&state.db)
        .await?
        .into_iter()
        .map(AnalysisView::from)
        .collect();
    Ok(Json(analyses))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use sqlx::PgPool;

    use super::*;
    use crate::analyzer::CountingAnalyzer;
    use crate::db::fixtures;

    #[sqlx::test(migrations = "./migrations")]
    async fn test_repeat_analysis_is_served_from_storage(pool: PgPool) {
        let analyzer = Arc::new(CountingAnalyzer::default());
        let state = fixtures::state(pool.clone(), analyzer.clone());
        let owner = fixtures::user(&pool, "recruiter@example.com").await;
        let job_id = fixtures::job(&pool, owner.user_id, "Backend Engineer").await;
        let candidate_id = fixtures::candidate(&pool, owner.user_id, "Ada Lovelace").await;

        let Json(first) = handle_create_analysis(
            State(state.clone()),
            owner.clone(),
            AppPath((candidate_id, job_id)),
        )
        .await
        .unwrap();
        let Json(second) = handle_create_analysis(
            State(state.clone()),
            owner.clone(),
            AppPath((candidate_id, job_id)),
        )
        .await
        .unwrap();

        assert_eq!(first.analysis.id, second.analysis.id);
        assert_eq!(second.analysis.message_template, "high_match");
        assert_eq!(second.candidate.name, "Ada Lovelace");
        assert_eq!(second.job.title, "Backend Engineer");
        assert_eq!(analyzer.match_calls(), 1);

        let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM analyses")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(stored, 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_analysis_of_foreign_candidate_is_not_found(pool: PgPool) {
        let analyzer = Arc::new(CountingAnalyzer::default());
        let state = fixtures::state(pool.clone(), analyzer.clone());
        let owner = fixtures::user(&pool, "owner@example.com").await;
        let intruder = fixtures::user(&pool, "intruder@example.com").await;
        let job_id = fixtures::job(&pool, intruder.user_id, "Data Engineer").await;
        let candidate_id = fixtures::candidate(&pool, owner.user_id, "Grace Hopper").await;

        let err = handle_create_analysis(
            State(state.clone()),
            intruder.clone(),
            AppPath((candidate_id, job_id)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(analyzer.match_calls(), 0);

        let err = handle_get_analysis(State(state), intruder, AppPath((candidate_id, job_id)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_free_quota_blocks_new_pairs_but_not_cached_ones(pool: PgPool) {
        let analyzer = Arc::new(CountingAnalyzer::default());
        let state = fixtures::state(pool.clone(), analyzer.clone());
        let owner = fixtures::user(&pool, "free@example.com").await;
        let job_id = fixtures::job(&pool, owner.user_id, "Backend Engineer").await;

        let mut candidates = Vec::new();
        for name in ["Ada", "Grace", "Barbara"] {
            candidates.push(fixtures::candidate(&pool, owner.user_id, name).await);
        }

        for &candidate_id in &candidates[..2] {
            handle_create_analysis(State(state.clone()), owner.clone(), AppPath((candidate_id, job_id)))
                .await
                .unwrap();
        }

        let err = handle_create_analysis(
            State(state.clone()),
            owner.clone(),
            AppPath((candidates[2], job_id)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::UsageLimit { limit: 2 }));

        handle_create_analysis(State(state), owner, AppPath((candidates[0], job_id)))
            .await
            .unwrap();
        assert_eq!(analyzer.match_calls(), 2);
    }
}
