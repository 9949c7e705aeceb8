pub mod health;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::reporting::ReportingState;

#[derive(Clone)]
pub struct AppState {
    pub reporting: ReportingState,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/status", get(health::reporting_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::reporting::{ChannelTarget, ReportInterval, ReportingConfig};

    fn state() -> ReportingState {
        ReportingState::new(ReportingConfig {
            target: ChannelTarget::new(42),
            interval: ReportInterval::from_secs(120).unwrap(),
        })
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (status, body) = get_json(router(AppState { reporting: state() }), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn status_reflects_live_configuration() {
        let reporting = state();
        let app = router(AppState { reporting: reporting.clone() });

        reporting.set_interval(ReportInterval::from_secs(300).unwrap());
        let (status, body) = get_json(app, "/status").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["target_channel"], "42");
        assert_eq!(body["interval_secs"], 300);
        assert!(body["last_tick"].is_null());
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let resp = router(AppState { reporting: state() })
            .oneshot(Request::builder().uri("/setchannel").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn serves_over_tcp() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, router(AppState { reporting: state() }).into_make_service())
                .await
                .unwrap();
        });

        let body: Value = reqwest::get(format!("http://{}/status", addr))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["interval_secs"], 120);

        server.abort();
    }
}
