mod common;

use common::Harness;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;
use zotero_rag::models::LibraryType;
use zotero_rag::server::{router, CancelResponse, ResetResponse, StartIndexResponse};

const LIB: &str = "1";

async fn serve(h: &Harness) -> String {
    let app = router(h.ctx.clone(), Arc::new(h.query_engine()));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn seed(h: &Harness) {
    h.zotero.add_library(LIB, "My Library", LibraryType::User);
    h.zotero.put_item(LIB, "A", "Light Harvesting");
    h.zotero
        .put_pdf(LIB, "A", "PA", "Photosynthesis needs chlorophyll.");
    h.zotero.put_item(LIB, "B", "Deep Sky Survey");
    h.zotero
        .put_pdf(LIB, "B", "PB", "A galaxy far away hosts a bright quasar.");
}

#[tokio::test]
async fn test_health() {
    let h = Harness::new().await;
    let base = serve(&h).await;

    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_status_of_unindexed_library_is_404() {
    let h = Harness::new().await;
    let base = serve(&h).await;

    let resp = reqwest::get(format!("{}/libraries/{}/status", base, LIB))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_indexed");
}

#[tokio::test]
async fn test_start_index_then_conflict() {
    let h = Harness::new().await;
    seed(&h);
    h.zotero.set_download_delay_ms(100);
    let base = serve(&h).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/index/library/{}", base, LIB))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let started: StartIndexResponse = resp.json().await.unwrap();
    assert_eq!(started.library_id, LIB);
    assert_eq!(started.status, "started");

    let resp = client
        .post(format!("{}/index/library/{}", base, LIB))
        .json(&json!({ "mode": "full" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let cancel: CancelResponse = client
        .post(format!("{}/index/library/{}/cancel", base, LIB))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(cancel.cancelled);
}

#[tokio::test]
async fn test_progress_stream_ends_with_completed() {
    let h = Harness::new().await;
    seed(&h);
    let base = serve(&h).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/index/library/{}/progress", base, LIB))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = client
        .post(format!("{}/index/library/{}", base, LIB))
        .json(&json!({ "library_type": "user", "library_name": "My Library" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let body = client
        .get(format!("{}/index/library/{}/progress", base, LIB))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("event: completed"), "{body}");
    assert!(body.contains("\"items_processed\":2"), "{body}");

    let status: Value = client
        .get(format!("{}/libraries/{}/status", base, LIB))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["metadata"]["total_items_indexed"], 2);
}

#[tokio::test]
async fn test_progress_stream_reports_cancellation() {
    let h = Harness::new().await;
    seed(&h);
    h.zotero.set_download_delay_ms(200);
    let base = serve(&h).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/index/library/{}", base, LIB))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let resp = client
        .post(format!("{}/index/library/{}/cancel", base, LIB))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = client
        .get(format!("{}/index/library/{}/progress", base, LIB))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("event: cancelled"), "{body}");
    assert!(!body.contains("event: completed"), "{body}");
}

#[tokio::test]
async fn test_reset_and_query() {
    let h = Harness::new().await;
    seed(&h);
    let base = serve(&h).await;
    let client = reqwest::Client::new();

    let reset: ResetResponse = client
        .post(format!("{}/libraries/{}/reset", base, LIB))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(!reset.reset);

    let resp = client
        .post(format!("{}/query", base))
        .json(&json!({ "question": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let result: Value = client
        .post(format!("{}/query", base))
        .json(&json!({ "question": "Where is the quasar?", "library_ids": [LIB] }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(result["found"], false);
    assert_eq!(h.generator.calls(), 0);
}
