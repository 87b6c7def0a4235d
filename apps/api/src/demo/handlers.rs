use axum::{
    extract::{ConnectInfo, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::analyzer::{JobAnalysis, ResumeAnalysis};
use crate::demo::middleware::{forwarded_for, session_id};
use crate::demo::rate_limit::DemoQuota;
use crate::documents::clean_text;
use crate::errors::AppError;
use crate::extract::AppJson;
use crate::messages::{generate_follow_up_message, MessageTemplate};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoAnalysisRequest {
    pub job_text: String,
    pub resume_text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoMatch {
    pub match_percentage: f64,
    pub top_skills: Vec<String>,
    pub missing_skills: Vec<String>,
    pub reasoning: Option<String>,
    pub generated_message: String,
    pub message_template: MessageTemplate,
}

#[derive(Debug, Serialize)]
pub struct DemoAnalysisResponse {
    pub job: JobAnalysis,
    pub candidate: ResumeAnalysis,
    pub analysis: DemoMatch,
}

/// POST /api/demo/analysis
///
/// Runs the full extraction + match pipeline on pasted text. Nothing is stored.
pub async fn handle_demo_analysis(
    State(state): State<AppState>,
    AppJson(req): AppJson<DemoAnalysisRequest>,
) -> Result<Json<DemoAnalysisResponse>, AppError> {
    let job_text = clean_text(&req.job_text);
    let resume_text = clean_text(&req.resume_text);
    if job_text.is_empty() || resume_text.is_empty() {
        return Err(AppError::Validation(
            "jobText and resumeText cannot be empty".to_string(),
        ));
    }

    let (job, candidate, matched) = tokio::try_join!(
        state.analyzer.analyze_job_description(&job_text),
        state.analyzer.analyze_resume(&resume_text),
        state.analyzer.analyze_match(&job_text, &resume_text),
    )?;

    let template = MessageTemplate::for_score(matched.match_percentage);
    let generated_message = generate_follow_up_message(
        matched.match_percentage,
        &candidate.name,
        matched.top_skills.first().map(String::as_str),
        matched.missing_skills.first().map(String::as_str),
    );

    Ok(Json(DemoAnalysisResponse {
        job,
        candidate,
        analysis: DemoMatch {
            match_percentage: matched.match_percentage,
            top_skills: matched.top_skills,
            missing_skills: matched.missing_skills,
            reasoning: matched.reasoning,
            generated_message,
            message_template: template,
        },
    }))
}

/// GET /api/demo/limits
pub async fn handle_demo_limits(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Result<Json<DemoQuota>, AppError> {
    let session = session_id(&headers).ok_or(AppError::SessionRequired)?;
    let ip = forwarded_for(&headers)
        .map(str::to_string)
        .or_else(|| connect_info.map(|ConnectInfo(addr)| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string());

    Ok(Json(state.demo_limiter.peek(session, &ip, Utc::now())))
}
