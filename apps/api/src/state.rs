use std::sync::Arc;

use sqlx::PgPool;

use crate::analytics::AnalyticsRecorder;
use crate::analyzer::Analyzer;
use crate::auth::JwtKeys;
use crate::config::Config;
use crate::demo::DemoRateLimiter;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// Pluggable analyzer. Production: `LlmAnalyzer` over the configured provider.
    pub analyzer: Arc<dyn Analyzer>,
    pub jwt: Arc<JwtKeys>,
    pub config: Config,
    /// Process-local demo throttle; swept hourly by a background task.
    pub demo_limiter: Arc<DemoRateLimiter>,
    pub analytics: Arc<AnalyticsRecorder>,
}

impl AppState {
    pub fn new(db: PgPool, analyzer: Arc<dyn Analyzer>, config: Config) -> Self {
        Self {
            db,
            analyzer,
            jwt: Arc::new(JwtKeys::new(&config.jwt_secret)),
            demo_limiter: Arc::new(DemoRateLimiter::new(config.demo)),
            analytics: Arc::new(AnalyticsRecorder::default()),
            config,
        }
    }
}

#[cfg(test)]
impl AppState {
    /// State over a lazy pool that is never dialled, with the fixed analyzer.
    pub fn for_tests(config: Config) -> Self {
        let db = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .expect("test database url parses");
        Self::new(db, Arc::new(crate::analyzer::FixedAnalyzer::default()), config)
    }
}
