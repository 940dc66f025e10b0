//! Integration test: Server API endpoints

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use mlworkbench::records::RecordStore;
use mlworkbench::server::{create_router, AppState, ServerConfig};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "workbench-test-boundary";

fn test_config(dir: &TempDir) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        media_root: dir.path().to_path_buf(),
        records_path: dir.path().join("records.json"),
        max_upload_size: 10 * 1024 * 1024,
        max_concurrent_jobs: 2,
        job_timeout_secs: 0,
    }
}

fn test_app(dir: &TempDir) -> Router {
    let config = test_config(dir);
    let state = Arc::new(AppState::with_store(config.clone(), RecordStore::in_memory()).unwrap());
    create_router(state, &config)
}

fn sales_csv(rows: usize, offset: usize) -> String {
    let regions = ["north", "south", "east", "west"];
    let mut csv = String::from("region,units,revenue\n");
    for i in offset..offset + rows {
        let units = (i * 7) % 20 + 1;
        let revenue = units as f64 * 10.0 + (i % 4) as f64 * 5.0 + (i % 3) as f64 * 0.5;
        csv.push_str(&format!("{},{},{}\n", regions[i % 4], units, revenue));
    }
    csv
}

async fn send_raw(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, bytes) = send_raw(app, request).await;
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

async fn upload(app: &Router, name: &str, csv: &str) -> Value {
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"name\"\r\n\r\n{name}\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}.csv\"\r\n\
         Content-Type: text/csv\r\n\r\n{csv}\r\n--{b}--\r\n",
        b = BOUNDARY,
        name = name,
        csv = csv,
    );
    let request = Request::builder()
        .method("POST")
        .uri("/api/datasets")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(Body::from(body))
        .unwrap();
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    body["dataset"].clone()
}

/// Poll until the record reaches a terminal status.
async fn poll(app: &Router, uri: &str) -> Value {
    for _ in 0..200 {
        let (status, body) = get(app, uri).await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] == "COMPLETED" || body["status"] == "FAILED" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("{} never reached a terminal status", uri);
}

async fn trained_model(app: &Router) -> Value {
    let dataset = upload(app, "sales", &sales_csv(40, 0)).await;
    let (status, body) = post_json(
        app,
        "/api/models/train",
        json!({
            "name": "Sales model",
            "dataset": dataset["id"],
            "target": "revenue",
            "features": ["region", "units"],
            "preset": "medium_quality",
            "time_limit": 0,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["model"]["status"], "RUNNING");
    poll(app, &format!("/api/models/{}", body["model"]["id"])).await
}

#[tokio::test]
async fn test_health_endpoint() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);
    let (status, body) = get(&app, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_list_models_empty() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);
    let (status, body) = get(&app, "/api/models").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["models"], json!([]));
}

#[tokio::test]
async fn test_unknown_routes_and_records() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);

    let (status, _) = get(&app, "/api/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = get(&app, "/api/models/42").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "record_not_found");

    let request = Request::builder().method("DELETE").uri("/api/health").body(Body::empty()).unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_dataset_upload_and_columns() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);
    let dataset = upload(&app, "sales", &sales_csv(8, 0)).await;
    assert_eq!(dataset["n_rows"], 8);

    let (_, body) = get(&app, &format!("/api/datasets/{}/columns", dataset["id"])).await;
    assert_eq!(body["columns"], json!(["region", "units", "revenue"]));

    let (_, body) = get(&app, "/api/datasets").await;
    assert_eq!(body["datasets"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_dataset_preview_is_cached_until_invalidated() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);
    let dataset = upload(&app, "sales", &sales_csv(8, 0)).await;
    let uri = format!("/api/datasets/{}/preview", dataset["id"]);

    let (status, first) = get(&app, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["cached"], false);
    let (_, second) = get(&app, &uri).await;
    assert_eq!(second["cached"], true);
    assert_eq!(first["stats"], second["stats"]);

    let request = Request::builder()
        .method("POST")
        .uri(format!("/api/datasets/{}/invalidate-cache", dataset["id"]))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let (_, third) = get(&app, &uri).await;
    assert_eq!(third["cached"], false);
}

#[tokio::test]
async fn test_handler_writes_reach_the_snapshot() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let app = create_router(Arc::new(AppState::new(config.clone()).unwrap()), &config);
    let kept = upload(&app, "kept", &sales_csv(8, 0)).await;
    let other = upload(&app, "other", &sales_csv(8, 50)).await;
    let (status, _) = get(&app, &format!("/api/datasets/{}/preview", kept["id"])).await;
    assert_eq!(status, StatusCode::OK);
    let request = Request::builder()
        .method("POST")
        .uri(format!("/api/datasets/{}/invalidate-cache", other["id"]))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);

    let reopened = RecordStore::open(&config.records_path).unwrap();
    let id = kept["id"].as_u64().unwrap();
    assert!(reopened.dataset(id).unwrap().visualization.valid);
    assert!(!reopened.dataset(other["id"].as_u64().unwrap()).unwrap().visualization.valid);
}

#[tokio::test]
async fn test_train_rejects_unknown_target() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);
    let dataset = upload(&app, "sales", &sales_csv(8, 0)).await;

    let (status, body) = post_json(
        &app,
        "/api/models/train",
        json!({"name": "bad", "dataset": dataset["id"], "target": "profit"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "schema_error");

    let (_, models) = get(&app, "/api/models").await;
    assert_eq!(models["models"], json!([]));
}

#[tokio::test]
async fn test_train_evaluate_and_read_details() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);
    let model = trained_model(&app).await;
    assert_eq!(model["status"], "COMPLETED");
    assert!(!model["leaderboard"]["rows"].as_array().unwrap().is_empty());

    let holdout = upload(&app, "holdout", &sales_csv(12, 100)).await;
    let (status, body) =
        post_json(&app, "/api/tests", json!({"model": model["id"], "dataset": holdout["id"]})).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let test_id = body["test"]["id"].clone();

    let test = poll(&app, &format!("/api/tests/{}", test_id)).await;
    assert_eq!(test["status"], "COMPLETED");

    let details_uri = format!("/api/tests/{}/details", test_id);
    let (_, details) = get(&app, &details_uri).await;
    assert_eq!(details["model_name"], "Sales model");
    assert_eq!(details["dataset_name"], "holdout");
    assert!(details["plot"].is_string());
    assert_eq!(details["predictions"].as_array().unwrap().len(), 12);
    let (_, again) = get(&app, &details_uri).await;
    assert_eq!(details, again);

    let request = Request::builder()
        .uri(format!("/api/tests/{}/download", test_id))
        .body(Body::empty())
        .unwrap();
    let (status, bytes) = send_raw(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let csv = String::from_utf8(bytes).unwrap();
    // same column name as prediction outputs
    assert_eq!(csv.lines().next().unwrap(), "region,units,revenue,predicted_revenue");
}

#[tokio::test]
async fn test_manual_prediction_roundtrip() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);
    let model = trained_model(&app).await;

    let form = format!(
        "model={}&region%5B0%5D=north&units%5B0%5D=5&region%5B1%5D=south&units%5B1%5D=12",
        model["id"]
    );
    let request = Request::builder()
        .method("POST")
        .uri("/api/predictions/manual")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let result = poll(&app, &format!("/api/predictions/{}", body["prediction"]["id"])).await;
    assert_eq!(result["status"], "COMPLETED");

    let request = Request::builder()
        .uri(format!("/api/predictions/{}/download", result["id"]))
        .body(Body::empty())
        .unwrap();
    let (status, bytes) = send_raw(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let csv = String::from_utf8(bytes).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].contains("predicted_revenue"));

    // the manual placeholder stays out of the dataset listing
    let (_, datasets) = get(&app, "/api/datasets").await;
    assert!(datasets["datasets"].as_array().unwrap().iter().all(|d| d["name"] != "--manual-data--"));
}

#[tokio::test]
async fn test_manual_prediction_without_rows_is_rejected() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);
    let model = trained_model(&app).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/predictions/manual")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("model={}", model["id"])))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation_error");
}

#[tokio::test]
async fn test_delete_model_cascades() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);
    let model = trained_model(&app).await;
    let fresh = upload(&app, "fresh", &sales_csv(5, 300)).await;

    let (status, body) = post_json(
        &app,
        "/api/predictions",
        json!({"model": model["id"], "dataset": fresh["id"], "sync": true}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["prediction"]["status"], "COMPLETED");

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/models/{}", model["id"]))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted_predictions"], 1);

    let (_, predictions) = get(&app, "/api/predictions").await;
    assert_eq!(predictions["predictions"], json!([]));
    assert_eq!(std::fs::read_dir(dir.path().join("MLmodels")).unwrap().count(), 0);
    assert_eq!(std::fs::read_dir(dir.path().join("predictions")).unwrap().count(), 0);
}
