pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};

use crate::demo::middleware::demo_rate_limit;
use crate::documents::MAX_UPLOAD_BYTES;
use crate::state::AppState;
use crate::{analysis, analytics, auth, candidates, demo, job_descriptions, subscriptions};

pub fn build_router(state: AppState) -> Router {
    // Multipart uploads; everything else keeps axum's default body limit.
    let uploads = Router::new()
        .route(
            "/api/job-descriptions",
            get(job_descriptions::handlers::handle_list_jobs)
                .post(job_descriptions::handlers::handle_upload_job),
        )
        .route(
            "/api/candidates",
            get(candidates::handlers::handle_list_candidates)
                .post(candidates::handlers::handle_upload_candidate),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES));

    let demo_analysis = Router::new()
        .route(
            "/api/demo/analysis",
            post(demo::handlers::handle_demo_analysis),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), demo_rate_limit));

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/health", get(health::health_handler))
        // Auth
        .route("/api/auth/signup", post(auth::handlers::handle_signup))
        .route("/api/auth/login", post(auth::handlers::handle_login))
        .route("/api/auth/me", get(auth::handlers::handle_me))
        // Job descriptions
        .route(
            "/api/job-descriptions/:id",
            get(job_descriptions::handlers::handle_get_job)
                .delete(job_descriptions::handlers::handle_delete_job),
        )
        // Candidates
        .route(
            "/api/candidates/for-job/:job_id",
            get(candidates::handlers::handle_candidates_for_job),
        )
        .route(
            "/api/candidates/:id",
            get(candidates::handlers::handle_get_candidate)
                .delete(candidates::handlers::handle_delete_candidate),
        )
        // Analysis
        .route("/api/analysis", get(analysis::handlers::handle_list_analyses))
        .route(
            "/api/analysis/:id/regenerate-message",
            post(analysis::handlers::handle_regenerate_message),
        )
        .route(
            "/api/analysis/:id/:job_id",
            get(analysis::handlers::handle_get_analysis)
                .post(analysis::handlers::handle_create_analysis),
        )
        // Demo
        .route("/api/demo/limits", get(demo::handlers::handle_demo_limits))
        // Analytics
        .route("/api/analytics", post(analytics::handlers::handle_track_event))
        .route(
            "/api/analytics/conversion",
            post(analytics::handlers::handle_track_conversion),
        )
        .route(
            "/api/analytics/feature",
            post(analytics::handlers::handle_track_feature),
        )
        .route(
            "/api/analytics/dashboard",
            get(analytics::handlers::handle_dashboard),
        )
        .route(
            "/api/analytics/features/popular",
            get(analytics::handlers::handle_popular_features),
        )
        // Subscriptions
        .route(
            "/api/subscriptions/activate",
            post(subscriptions::handlers::handle_activate),
        )
        .route(
            "/api/subscriptions/status",
            get(subscriptions::handlers::handle_status),
        )
        .route(
            "/api/subscriptions/cancel",
            post(subscriptions::handlers::handle_cancel),
        )
        .route(
            "/api/subscriptions/usage",
            get(subscriptions::handlers::handle_usage),
        )
        .merge(uploads)
        .merge(demo_analysis)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::config::Config;

    fn test_state(config: Config) -> AppState {
        // Never connected: every request below is answered before touching the pool.
        AppState::for_tests(config)
    }

    fn demo_request(session: Option<&str>, ip: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/demo/analysis")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", ip);
        if let Some(session) = session {
            builder = builder.header("x-session-id", session);
        }
        let body = json!({
            "jobText": "Senior Rust engineer, PostgreSQL, Kubernetes",
            "resumeText": "Ada Lovelace. Rust, Tokio, distributed systems.",
        });
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn header_str<'a>(response: &'a Response, name: &str) -> &'a str {
        response.headers()[name].to_str().unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = build_router(test_state(Config::for_tests()));
        for uri in ["/health", "/api/health"] {
            let response = app
                .clone()
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(json_body(response).await["status"], "ok");
        }
    }

    #[tokio::test]
    async fn test_user_scoped_routes_require_token() {
        let app = build_router(test_state(Config::for_tests()));
        let id = Uuid::new_v4();
        let cases = [
            ("GET", "/api/auth/me".to_string()),
            ("GET", "/api/job-descriptions".to_string()),
            ("POST", "/api/job-descriptions".to_string()),
            ("GET", format!("/api/job-descriptions/{id}")),
            ("DELETE", format!("/api/candidates/{id}")),
            ("GET", format!("/api/candidates/for-job/{id}")),
            ("GET", "/api/analysis".to_string()),
            ("POST", format!("/api/analysis/{id}/{id}")),
            ("POST", format!("/api/analysis/{id}/regenerate-message")),
            ("GET", "/api/subscriptions/usage".to_string()),
            ("POST", "/api/subscriptions/cancel".to_string()),
        ];

        for (method, uri) in cases {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method(method)
                        .uri(&uri)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{method} {uri}");
            assert_eq!(json_body(response).await["code"], "UNAUTHORIZED");
        }
    }

    #[tokio::test]
    async fn test_invalid_token_rejected() {
        let app = build_router(test_state(Config::for_tests()));
        let response = app
            .oneshot(
                Request::get("/api/candidates")
                    .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_demo_requires_session() {
        let app = build_router(test_state(Config::for_tests()));
        let response = app.oneshot(demo_request(None, "10.0.0.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "SESSION_REQUIRED");
    }

    #[tokio::test]
    async fn test_demo_analysis_end_to_end() {
        let app = build_router(test_state(Config::for_tests()));
        let response = app
            .oneshot(demo_request(Some("sess-1"), "10.0.0.2"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, "x-ratelimit-session-limit"), "2");
        assert_eq!(header_str(&response, "x-ratelimit-session-remaining"), "1");
        assert_eq!(header_str(&response, "x-ratelimit-ip-limit"), "5");
        assert_eq!(header_str(&response, "x-ratelimit-ip-remaining"), "4");

        let body = json_body(response).await;
        assert_eq!(body["job"]["title"], "Backend Engineer");
        assert_eq!(body["candidate"]["name"], "Ada Lovelace");
        assert_eq!(body["analysis"]["matchPercentage"], 85.0);
        assert_eq!(body["analysis"]["messageTemplate"], "high_match");
        assert!(body["analysis"]["generatedMessage"]
            .as_str()
            .unwrap()
            .contains("Ada Lovelace"));
    }

    #[tokio::test]
    async fn test_demo_second_request_inside_cooldown() {
        let app = build_router(test_state(Config::for_tests()));
        let first = app
            .clone()
            .oneshot(demo_request(Some("sess-2"), "10.0.0.3"))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(demo_request(Some("sess-2"), "10.0.0.3"))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = json_body(second).await;
        assert_eq!(body["code"], "COOLDOWN_ACTIVE");
        assert!(body["error"]
            .as_str()
            .unwrap()
            .ends_with("seconds between analyses"));
        assert_eq!(body["message"], "Sign up for instant analyses without delays!");
        assert!(body["waitTime"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_demo_session_limit() {
        let mut config = Config::for_tests();
        config.demo.cooldown = Duration::ZERO;
        let app = build_router(test_state(config));

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(demo_request(Some("sess-3"), "10.0.0.4"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let blocked = app
            .oneshot(demo_request(Some("sess-3"), "10.0.0.4"))
            .await
            .unwrap();
        assert_eq!(blocked.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = json_body(blocked).await;
        assert_eq!(body["code"], "SESSION_LIMIT_EXCEEDED");
        assert_eq!(body["limit"], 2);
    }

    #[tokio::test]
    async fn test_demo_bypassed_for_signed_in_user() {
        let state = test_state(Config::for_tests());
        let token = state.jwt.issue(Uuid::new_v4(), "ada@example.com").unwrap();
        let app = build_router(state);

        let mut request = demo_request(None, "10.0.0.5");
        request.headers_mut().insert(
            header::AUTHORIZATION,
            format!("Bearer {token}").parse().unwrap(),
        );
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("x-ratelimit-session-limit").is_none());
    }

    #[tokio::test]
    async fn test_demo_rejects_blank_text() {
        let app = build_router(test_state(Config::for_tests()));
        let request = Request::post("/api/demo/analysis")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-session-id", "sess-4")
            .body(Body::from(json!({"jobText": "  ", "resumeText": "Rust"}).to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_demo_limits_do_not_consume() {
        let app = build_router(test_state(Config::for_tests()));
        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(
                    Request::get("/api/demo/limits")
                        .header("x-session-id", "sess-5")
                        .header("x-forwarded-for", "10.0.0.6")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = json_body(response).await;
            assert_eq!(body["sessionRemaining"], 2);
            assert_eq!(body["ipRemaining"], 5);
        }
    }

    #[tokio::test]
    async fn test_analytics_never_fails() {
        let app = build_router(test_state(Config::for_tests()));

        let malformed = app
            .clone()
            .oneshot(
                Request::post("/api/analytics")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(malformed.status(), StatusCode::OK);
        assert_eq!(json_body(malformed).await, json!({"success": false}));

        let event = json!({
            "name": "demo_start",
            "timestamp": 1_700_000_000_000_i64,
            "sessionId": "sess-6",
        });
        let accepted = app
            .oneshot(
                Request::post("/api/analytics")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(event.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = json_body(accepted).await;
        assert_eq!(body["success"], true);
        assert!(body["eventId"].as_str().unwrap().starts_with("event_"));
    }

    #[tokio::test]
    async fn test_popular_features_reflect_tracking() {
        let app = build_router(test_state(Config::for_tests()));
        for feature in ["file_upload", "demo_mode", "file_upload"] {
            let response = app
                .clone()
                .oneshot(
                    Request::post("/api/analytics/feature")
                        .header(header::CONTENT_TYPE, "application/json")
                        .body(Body::from(json!({ "feature": feature }).to_string()))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(json_body(response).await, json!({"success": true}));
        }

        let response = app
            .oneshot(
                Request::get("/api/analytics/features/popular")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            json_body(response).await,
            json!([
                {"feature": "file_upload", "usage": 2},
                {"feature": "demo_mode", "usage": 1},
            ])
        );
    }

    #[tokio::test]
    async fn test_incomplete_signup_body_is_a_validation_error() {
        let app = build_router(test_state(Config::for_tests()));
        let response = app
            .oneshot(
                Request::post("/api/auth/signup")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json!({"email": "a@b.co"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert!(body["error"].as_str().unwrap().starts_with("Invalid input"));
    }

    #[tokio::test]
    async fn test_malformed_id_is_not_found() {
        let state = test_state(Config::for_tests());
        let token = state.jwt.issue(Uuid::new_v4(), "ada@example.com").unwrap();
        let app = build_router(state);
        for uri in [
            "/api/candidates/not-a-uuid",
            "/api/job-descriptions/42",
            "/api/analysis/not-a-uuid/also-not",
        ] {
            let response = app
                .clone()
                .oneshot(
                    Request::get(uri)
                        .header(header::AUTHORIZATION, format!("Bearer {token}"))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(json_body(response).await["code"], "NOT_FOUND");
        }
    }

    #[tokio::test]
    async fn test_conversion_and_feature_events_with_payloads() {
        let app = build_router(test_state(Config::for_tests()));
        let cases = [
            (
                "/api/analytics",
                json!({"name": "upload", "properties": {"kind": "pdf"}}),
            ),
            (
                "/api/analytics/conversion",
                json!({"type": "signup", "properties": {"source": "demo"}}),
            ),
            ("/api/analytics/conversion", json!({"type": "upgrade"})),
            (
                "/api/analytics/feature",
                json!({"feature": "regenerate", "details": {"count": 2}}),
            ),
        ];
        for (uri, event) in cases {
            let response = app
                .clone()
                .oneshot(
                    Request::post(uri)
                        .header(header::CONTENT_TYPE, "application/json")
                        .body(Body::from(event.to_string()))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(json_body(response).await["success"], true, "{uri}");
        }
    }
}
