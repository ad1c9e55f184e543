use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use expense_ai::workflows::expense::{
    expense_router, ComplianceEvaluator, ExpensePipeline, ExtractionGateway, Notifier,
    ReceiptRoot, ReportBuilder,
};
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_expense_routes<E, C, R, N>(
    pipeline: Arc<ExpensePipeline<E, C, R, N>>,
    receipts: ReceiptRoot,
) -> axum::Router
where
    E: ExtractionGateway + 'static,
    C: ComplianceEvaluator + 'static,
    R: ReportBuilder + 'static,
    N: Notifier + 'static,
{
    expense_router(pipeline, receipts)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use expense_ai::workflows::expense::{
        ArtifactLocation, Category, ExtractionFailure, NotificationStatus, Receipt,
        ReceiptSource, ReportArtifacts, ReportError, RuleBasedEvaluator, SubmissionMetadata,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    struct FixedGateway;

    impl ExtractionGateway for FixedGateway {
        async fn extract(&self, source: &ReceiptSource) -> Result<Receipt, ExtractionFailure> {
            if source.receipt_id().0.starts_with("blurry") {
                return Err(ExtractionFailure::Schema("unreadable".to_string()));
            }
            Ok(Receipt {
                receipt_id: source.receipt_id(),
                merchant: "Noodle Bar".to_string(),
                date: "2025-09-01".to_string(),
                category: Category::Meals,
                items: Vec::new(),
                total: 18.0,
                alcohol_total: None,
                tip_amount: None,
                is_compliant: None,
                violations: Vec::new(),
            })
        }
    }

    struct StubReports;

    impl ReportBuilder for StubReports {
        async fn build(
            &self,
            _compliant: &[Receipt],
            _non_compliant: &[Receipt],
            _metadata: &SubmissionMetadata,
        ) -> Result<ReportArtifacts, ReportError> {
            Ok(ReportArtifacts {
                tabular: ArtifactLocation("out/report.csv".into()),
                narrative: ArtifactLocation("out/report.pdf".into()),
            })
        }
    }

    struct StubNotifier;

    impl Notifier for StubNotifier {
        async fn notify(&self, _artifacts: &[ArtifactLocation]) -> NotificationStatus {
            NotificationStatus::delivered("Email Sent.")
        }
    }

    /// Receipts directory with two images and a stray text file.
    fn receipts_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("temp dir");
        for name in ["lunch.jpg", "blurry.jpg", "notes.txt", "a/lunch.jpg", "b/lunch.jpg"] {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).expect("fixture dir");
            }
            std::fs::write(path, b"img").expect("fixture file");
        }
        dir
    }

    fn router(dir: &tempfile::TempDir) -> axum::Router {
        let pipeline = Arc::new(ExpensePipeline::new(
            FixedGateway,
            RuleBasedEvaluator::new(),
            StubReports,
            StubNotifier,
        ));
        let receipts = ReceiptRoot::new(dir.path()).expect("receipts root");
        with_expense_routes(pipeline, receipts)
    }

    async fn post_run(router: axum::Router, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/expenses/runs")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).expect("serialize request")))
            .expect("request");
        let response = router.oneshot(request).await.expect("router dispatch");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("body");
        (status, serde_json::from_slice(&bytes).expect("json"))
    }

    #[tokio::test]
    async fn healthcheck_reports_ok() {
        let dir = receipts_dir();
        let response = router(&dir)
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router dispatch");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn run_endpoint_returns_final_state_and_counts() {
        let dir = receipts_dir();
        let (status, payload) = post_run(
            router(&dir),
            json!({
                "receipt_paths": ["lunch.jpg", "blurry.jpg"],
                "metadata": { "requester": "Sam Ortiz" }
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["state"]["extracted_receipts"].as_array().map(Vec::len), Some(1));
        assert_eq!(payload["state"]["notification_sent"], json!(true));
        assert_eq!(payload["updates"]["Extraction"], json!(2));
        assert_eq!(payload["updates"]["Compliance"], json!(1));
        assert!(payload.get("error").is_none());
    }

    #[tokio::test]
    async fn duplicate_receipts_are_rejected() {
        let dir = receipts_dir();
        let (status, payload) = post_run(
            router(&dir),
            json!({ "receipt_paths": ["a/lunch.jpg", "b/lunch.jpg"] }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(payload["error"].as_str().unwrap_or_default().contains("lunch.jpg"));
    }

    #[tokio::test]
    async fn invalid_rules_are_rejected() {
        let dir = receipts_dir();
        let (status, _) = post_run(
            router(&dir),
            json!({
                "receipt_paths": ["lunch.jpg"],
                "rules": [
                    { "rule_name": "Tip Limit", "value": 20, "type": "Percentage" },
                    { "rule_name": "tip limit", "value": 15, "type": "Percentage" }
                ]
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn paths_outside_the_receipts_dir_are_rejected() {
        let dir = receipts_dir();
        let outside = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .expect("outside file");

        for path in [
            "../../etc/passwd".to_string(),
            outside.path().display().to_string(),
            "notes.txt".to_string(),
        ] {
            let (status, payload) = post_run(
                router(&dir),
                json!({ "receipt_paths": ["lunch.jpg", path] }),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "path {path} accepted");
            assert!(payload.get("state").is_none());
        }
    }
}
