//! Analyzer: pluggable, trait-based extraction and matching.
//!
//! `LlmAnalyzer` is the production backend. `AppState` holds an
//! `Arc<dyn Analyzer>` so handlers never know which provider answered.

use async_trait::async_trait;
use axum::http::StatusCode;
use serde::de::DeserializeOwned;
use tracing::warn;
use validator::Validate;

use crate::errors::AppError;
use crate::llm_client::{prompts, LlmClient, LlmError, ModelTier};

pub mod schema;

pub use schema::{JobAnalysis, MatchAnalysis, ResumeAnalysis};

#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze_job_description(&self, text: &str) -> Result<JobAnalysis, AppError>;

    async fn analyze_resume(&self, text: &str) -> Result<ResumeAnalysis, AppError>;

    async fn analyze_match(
        &self,
        job_text: &str,
        resume_text: &str,
    ) -> Result<MatchAnalysis, AppError>;
}

/// What was being analyzed; shapes the user-facing wording of failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject {
    JobDescription,
    Resume,
    Match,
}

impl Subject {
    fn noun(&self) -> &'static str {
        match self {
            Subject::JobDescription => "job description",
            Subject::Resume => "resume",
            Subject::Match => "inputs",
        }
    }
}

pub struct LlmAnalyzer {
    llm: LlmClient,
}

impl LlmAnalyzer {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    async fn run<T>(
        &self,
        prompt: String,
        tier: ModelTier,
        subject: Subject,
        fallback: fn() -> T,
    ) -> Result<T, AppError>
    where
        T: DeserializeOwned + Validate + Send,
    {
        let result = self.llm.call_json::<T>(&prompt, tier).await;
        resolve(result, subject, fallback)
    }
}

#[async_trait]
impl Analyzer for LlmAnalyzer {
    async fn analyze_job_description(&self, text: &str) -> Result<JobAnalysis, AppError> {
        self.run(
            prompts::job_analysis(text),
            ModelTier::Fast,
            Subject::JobDescription,
            JobAnalysis::fallback,
        )
        .await
    }

    async fn analyze_resume(&self, text: &str) -> Result<ResumeAnalysis, AppError> {
        self.run(
            prompts::resume_analysis(text),
            ModelTier::Fast,
            Subject::Resume,
            ResumeAnalysis::fallback,
        )
        .await
    }

    async fn analyze_match(
        &self,
        job_text: &str,
        resume_text: &str,
    ) -> Result<MatchAnalysis, AppError> {
        self.run(
            prompts::match_analysis(job_text, resume_text),
            ModelTier::Accurate,
            Subject::Match,
            MatchAnalysis::fallback,
        )
        .await
    }
}

/// Turns a model result into either a validated value, a user-facing error
/// for the failure kinds a user can act on, or the fallback for everything else.
fn resolve<T: Validate>(
    result: Result<T, LlmError>,
    subject: Subject,
    fallback: fn() -> T,
) -> Result<T, AppError> {
    match result {
        Ok(value) => match value.validate() {
            Ok(()) => Ok(value),
            Err(e) => {
                warn!(?subject, "Model output failed validation, using fallback: {e}");
                Ok(fallback())
            }
        },
        Err(e) => match user_facing(&e, subject) {
            Some(app_err) => Err(app_err),
            None => {
                warn!(?subject, "Model call failed, using fallback: {e}");
                Ok(fallback())
            }
        },
    }
}

fn user_facing(err: &LlmError, subject: Subject) -> Option<AppError> {
    let (status, code, message) = match err {
        LlmError::RateLimited => (
            StatusCode::TOO_MANY_REQUESTS,
            "AI_RATE_LIMITED",
            "Rate limit exceeded. Please try again in a few minutes.".to_string(),
        ),
        LlmError::QuotaExceeded => (
            StatusCode::TOO_MANY_REQUESTS,
            "AI_QUOTA_EXCEEDED",
            "Daily API quota exceeded. Please try again tomorrow or upgrade your plan.".to_string(),
        ),
        LlmError::InvalidApiKey => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "AI_CONFIG_ERROR",
            "API configuration error. Please contact support.".to_string(),
        ),
        LlmError::Network(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "AI_NETWORK_ERROR",
            "Network error. Please check your connection and try again.".to_string(),
        ),
        LlmError::ContentBlocked => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "AI_CONTENT_BLOCKED",
            format!(
                "Content was blocked by safety filters. Please review your {}.",
                subject.noun()
            ),
        ),
        LlmError::Http(_) | LlmError::Api { .. } | LlmError::Parse(_) | LlmError::EmptyContent => {
            return None
        }
    };
    Some(AppError::Ai {
        status,
        code,
        message,
    })
}

/// Deterministic analyzer for handler tests.
#[cfg(test)]
pub struct FixedAnalyzer {
    pub job: JobAnalysis,
    pub resume: ResumeAnalysis,
    pub matched: MatchAnalysis,
}

#[cfg(test)]
impl Default for FixedAnalyzer {
    fn default() -> Self {
        Self {
            job: JobAnalysis {
                title: "Backend Engineer".into(),
                company: Some("Acme".into()),
                required_skills: vec!["Rust".into(), "PostgreSQL".into()],
                nice_to_have_skills: Some(vec!["Kubernetes".into()]),
                experience_level: Some("Senior".into()),
            },
            resume: ResumeAnalysis {
                name: "Ada Lovelace".into(),
                email: Some("ada@example.com".into()),
                location: Some("London".into()),
                seniority: Some(schema::Seniority::Senior),
                skills: vec!["Rust".into(), "Tokio".into()],
                experience: None,
            },
            matched: MatchAnalysis {
                match_percentage: 85.0,
                top_skills: vec!["Rust".into()],
                missing_skills: vec!["Kubernetes".into()],
                reasoning: Some("Strong Rust background".into()),
            },
        }
    }
}

#[cfg(test)]
#[async_trait]
impl Analyzer for FixedAnalyzer {
    async fn analyze_job_description(&self, _text: &str) -> Result<JobAnalysis, AppError> {
        Ok(self.job.clone())
    }

    async fn analyze_resume(&self, _text: &str) -> Result<ResumeAnalysis, AppError> {
        Ok(self.resume.clone())
    }

    async fn analyze_match(&self, _job: &str, _resume: &str) -> Result<MatchAnalysis, AppError> {
        Ok(self.matched.clone())
    }
}

/// Wraps [`FixedAnalyzer`] and counts how often a match is requested.
#[cfg(test)]
#[derive(Default)]
pub struct CountingAnalyzer {
    pub inner: FixedAnalyzer,
    pub match_calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl CountingAnalyzer {
    pub fn match_calls(&self) -> usize {
        self.match_calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl Analyzer for CountingAnalyzer {
    async fn analyze_job_description(&self, text: &str) -> Result<JobAnalysis, AppError> {
        self.inner.analyze_job_description(text).await
    }

    async fn analyze_resume(&self, text: &str) -> Result<ResumeAnalysis, AppError> {
        self.inner.analyze_resume(text).await
    }

    async fn analyze_match(&self, job: &str, resume: &str) -> Result<MatchAnalysis, AppError> {
        self.match_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.inner.analyze_match(job, resume).await
    }
}
