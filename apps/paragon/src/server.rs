//! # HTTP Server
//!
//! Upload endpoint plus the small administration API over the household
//! directory and payment labels.
//!
//! ## Routes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  GET  /health                    liveness + database check              │
//! │  POST /upload                    multipart, one receipt JSON per file   │
//! │  GET  /api/users                 household members, "Other" last        │
//! │  POST /api/users                 { "name": "Ania" }                     │
//! │  GET  /api/unassigned-payments   labels with no member                  │
//! │  POST /api/assign-payment        { "payment_name", "user_id" }          │
//! │  GET  /api/ignored-payments      ignore list                            │
//! │  POST /api/ignored-payments      { "payment_name" }                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Uploads are never interactive: unknown labels are stored as unassigned
//! and show up in `/api/unassigned-payments`.

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use paragon_core::{UnassignedPayment, User};
use paragon_ingest::config::ServerSettings;
use paragon_ingest::{BatchSummary, IngestError, Ingestor};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::error::{ApiError, ErrorCode};

/// Request body limit for `/upload`. Receipt exports are a few KB each.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

// =============================================================================
// State
// =============================================================================

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub ingestor: Ingestor,
    pub max_upload_files: usize,
}

/// Builds the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/upload",
            post(upload_handler).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/users", get(list_users_handler).post(add_user_handler))
        .route("/api/unassigned-payments", get(unassigned_handler))
        .route("/api/assign-payment", post(assign_payment_handler))
        .route(
            "/api/ignored-payments",
            get(list_ignored_handler).post(ignore_payment_handler),
        )
        .with_state(state)
}

/// Binds and serves until Ctrl+C / SIGTERM.
pub async fn serve(ingestor: Ingestor, settings: &ServerSettings) -> anyhow::Result<()> {
    let app = router(AppState {
        ingestor,
        max_upload_files: settings.max_upload_files,
    });

    let bind_addr = settings.bind_address();
    let listener = TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "HTTP server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}

// =============================================================================
// Request / Response Bodies
// =============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    database: bool,
}

#[derive(Debug, Deserialize)]
struct NewUserRequest {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AssignPaymentRequest {
    payment_name: String,
    user_id: i64,
}

#[derive(Debug, Serialize)]
struct AssignPaymentResponse {
    payment_name: String,
    user_id: i64,
    receipts_updated: u64,
}

#[derive(Debug, Deserialize)]
struct IgnorePaymentRequest {
    payment_name: String,
}

#[derive(Debug, Serialize)]
struct IgnorePaymentResponse {
    payment_name: String,
    added: bool,
}

fn required(value: &str, field: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::validation(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

// =============================================================================
// Handlers
// =============================================================================

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let database = state.ingestor.database().health_check().await;
    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(HealthResponse {
            status: if database { "ok" } else { "degraded" },
            database,
        }),
    )
}

/// Ingests every file part of a multipart body, in order.
///
/// A file that fails does not fail the request; it shows up as `"failed"`
/// in the per-file list.
async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<BatchSummary>, ApiError> {
    // Read every part first so an over-limit upload stores nothing.
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        let Some(file_name) = field.file_name().map(str::to_owned) else {
            debug!(field = ?field.name(), "Ignoring non-file form field");
            continue;
        };

        if files.len() == state.max_upload_files {
            return Err(ApiError::new(
                ErrorCode::TooManyFiles,
                format!("At most {} files per upload", state.max_upload_files),
            ));
        }
        files.push((file_name, field.bytes().await?));
    }

    if files.is_empty() {
        return Err(ApiError::validation("No files in upload"));
    }

    let mut summary = BatchSummary::new();
    for (file_name, bytes) in files {
        let result = match serde_json::from_slice(&bytes) {
            Ok(value) => state.ingestor.process_named(&value, &file_name).await,
            Err(e) => Err(IngestError::Json(e)),
        };
        if let Err(e) = &result {
            warn!(file = %file_name, error = %e, "Uploaded receipt rejected");
        }
        summary.record(file_name, &result);
    }

    let summary = summary.finish();
    info!(
        stored = summary.stored,
        skipped = summary.skipped,
        failed = summary.failed,
        "Upload processed"
    );
    Ok(Json(summary))
}

async fn list_users_handler(State(state): State<AppState>) -> Result<Json<Vec<User>>, ApiError> {
    Ok(Json(state.ingestor.database().users().list_users().await?))
}

async fn add_user_handler(
    State(state): State<AppState>,
    Json(req): Json<NewUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let name = required(&req.name, "name")?;
    let user = state.ingestor.database().users().add_user(&name).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn unassigned_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<UnassignedPayment>>, ApiError> {
    Ok(Json(
        state
            .ingestor
            .database()
            .payments()
            .unassigned_payment_names()
            .await?,
    ))
}

async fn assign_payment_handler(
    State(state): State<AppState>,
    Json(req): Json<AssignPaymentRequest>,
) -> Result<Json<AssignPaymentResponse>, ApiError> {
    let payment_name = required(&req.payment_name, "payment_name")?;
    let receipts_updated = state
        .ingestor
        .database()
        .payments()
        .assign_payment(&payment_name, req.user_id)
        .await?;

    Ok(Json(AssignPaymentResponse {
        payment_name,
        user_id: req.user_id,
        receipts_updated,
    }))
}

async fn list_ignored_handler(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.ingestor.database().payments().list_ignored().await?))
}

async fn ignore_payment_handler(
    State(state): State<AppState>,
    Json(req): Json<IgnorePaymentRequest>,
) -> Result<Json<IgnorePaymentResponse>, ApiError> {
    let payment_name = required(&req.payment_name, "payment_name")?;
    let added = state
        .ingestor
        .database()
        .payments()
        .add_ignored(&payment_name)
        .await?;
    Ok(Json(IgnorePaymentResponse {
        payment_name,
        added,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use paragon_db::{Database, DbConfig};
    use paragon_ingest::FileLifecycle;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const BOUNDARY: &str = "paragon-test-boundary";

    async fn app(max_upload_files: usize) -> (Router, Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.users().add_user("Ania").await.unwrap();
        db.users().ensure_other_user().await.unwrap();

        let files = FileLifecycle::new(
            dir.path().join("to_check"),
            dir.path().join("parsed"),
            dir.path().join("rejected"),
        );
        let state = AppState {
            ingestor: Ingestor::new(db.clone(), files),
            max_upload_files,
        };
        (router(state), db, dir)
    }

    fn receipt(bill: &str, total: i64) -> String {
        json!({
            "header": [{"headerText": {"headerTextLines":
                "<div class=\"align-center \">LIDL SP. Z O.O. 12</div>\
                 <div class=\"align-center \">61-001 POZNAŃ UL. GŁOGOWSKA 1</div>"}}],
            "body": [
                {"sellLine": {"name": "Jabłka C", "price": 499, "quantity": "1.5"}},
                {"payment": {"name": "Karta MC"}},
                {"sumInCurrency": {"fiscalTotal": total, "currency": "PLN"}},
                {"fiscalFooter": {"billNumber": bill, "date": "2024-06-01T08:30:00Z"}}
            ]
        })
        .to_string()
    }

    fn multipart_body(files: &[(&str, &str)]) -> String {
        let mut body = String::new();
        for (name, contents) in files {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\n\
                 Content-Type: application/json\r\n\r\n{contents}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        body
    }

    fn upload_request(files: &[(&str, &str)]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(files)))
            .unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _, _dir) = app(10).await;
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"status": "ok", "database": true})
        );
    }

    #[tokio::test]
    async fn test_upload_reports_each_file() {
        let (app, db, _dir) = app(10).await;
        let first = receipt("11", 749);
        let response = app
            .oneshot(upload_request(&[
                ("a.json", &first),
                ("b.json", &first),
                ("c.json", "not json"),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["stored"], 1);
        assert_eq!(body["skipped"], 1);
        assert_eq!(body["failed"], 1);
        assert_eq!(body["files"][0]["file"], "a.json");
        assert_eq!(body["files"][0]["status"], "stored");
        assert_eq!(body["files"][1]["status"], "skipped");
        assert_eq!(body["files"][1]["reason"], "duplicate");
        assert_eq!(body["files"][2]["status"], "failed");

        assert_eq!(db.receipts().count().await.unwrap(), 1);
        let unassigned = db.payments().unassigned_payment_names().await.unwrap();
        assert_eq!(unassigned[0].payment_name, "Karta MC");
    }

    #[tokio::test]
    async fn test_upload_file_limit() {
        let (app, db, _dir) = app(1).await;
        let response = app
            .oneshot(upload_request(&[
                ("a.json", &receipt("1", 100)),
                ("b.json", &receipt("2", 200)),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body_json(response).await["code"], "TOO_MANY_FILES");
        // Nothing from a rejected upload is stored.
        assert_eq!(db.receipts().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upload_without_files() {
        let (app, _, _dir) = app(10).await;
        let response = app.oneshot(upload_request(&[])).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_users_api() {
        let (app, _, _dir) = app(10).await;

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/users", json!({"name": " Tomek "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await["name"], "Tomek");

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/users", json!({"name": "Tomek"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .oneshot(Request::get("/api/users").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let users = body_json(response).await;
        let names: Vec<_> = users
            .as_array()
            .unwrap()
            .iter()
            .map(|u| u["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["Ania", "Tomek", "Other"]);
    }

    #[tokio::test]
    async fn test_assign_and_ignore_payments() {
        let (app, db, _dir) = app(10).await;
        let other = db.users().get_other().await.unwrap().unwrap();

        app.clone()
            .oneshot(upload_request(&[("a.json", &receipt("5", 300))]))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(Request::get("/api/unassigned-payments").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(
            body_json(response).await,
            json!([{"payment_name": "Karta MC", "receipt_count": 1}])
        );

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/assign-payment",
                json!({"payment_name": "Karta MC", "user_id": other.user_id}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["receipts_updated"], 1);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/assign-payment",
                json!({"payment_name": "Karta MC", "user_id": 999}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/ignored-payments",
                json!({"payment_name": "Bon"}),
            ))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["added"], true);

        let response = app
            .oneshot(Request::get("/api/ignored-payments").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(response).await, json!(["Bon"]));
    }
}
