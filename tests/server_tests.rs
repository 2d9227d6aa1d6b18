use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::Value;
use spectral::prelude::*;
use tower::ServiceExt;
use url::Url;
use wikipoi::server::{AppState, router};
use wikipoi::wiki::WikiClient;

/// Nothing listens on the discard port, so every wiki call fails.
const UNREACHABLE_API: &str = "http://127.0.0.1:9/w/api.php";

fn app() -> Router {
    let wiki = WikiClient::new(Url::parse(UNREACHABLE_API).expect("url")).expect("client");
    router(Arc::new(AppState {
        index_url: wiki.index_url().expect("index url"),
        wiki,
        list_page: "Sharing/GiveBoxen".to_owned(),
        vision: None,
    }))
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn health_reports_service() {
    let response = app()
        .oneshot(Request::get("/api/health").body(Body::empty()).expect("request"))
        .await
        .expect("response");

    assert_that(&response.status()).is_equal_to(StatusCode::OK);
    let body = json_body(response).await;
    assert_that(&body.get("status").and_then(Value::as_str)).is_equal_to(Some("healthy"));
    assert_that(&body.get("service").and_then(Value::as_str)).is_equal_to(Some("wikipoi"));
}

#[tokio::test]
async fn unreachable_wiki_is_bad_gateway() {
    for uri in ["/api/get", "/api/get?poi=Josefskirchplatz", "/api/export"] {
        let response = app()
            .oneshot(Request::get(uri).body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_that(&response.status()).is_equal_to(StatusCode::BAD_GATEWAY);
        let body = json_body(response).await;
        assert_that(&body.get("error").and_then(Value::as_str).is_some()).is_true();
    }
}

#[tokio::test]
async fn search_requires_query() {
    let response = app()
        .oneshot(Request::get("/api/search").body(Body::empty()).expect("request"))
        .await
        .expect("response");

    assert_that(&response.status()).is_equal_to(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn set_items_without_model_is_unavailable() {
    let boundary = "wikipoi-boundary";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"locationId\"\r\n\r\nJosefskirchplatz\r\n--{boundary}--\r\n"
    );
    let request = Request::post("/api/set_items")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .expect("request");

    let response = app().oneshot(request).await.expect("response");

    assert_that(&response.status()).is_equal_to(StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_that(&body.get("error").and_then(Value::as_str))
        .is_equal_to(Some("image classification is not configured"));
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let response = app()
        .oneshot(Request::get("/api/nope").body(Body::empty()).expect("request"))
        .await
        .expect("response");

    assert_that(&response.status()).is_equal_to(StatusCode::NOT_FOUND);
}
