use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use voltio_api::build_app;

const API_KEY: &str = "dev-voltio-key";

async fn app() -> Router {
    build_app().await.expect("app should build")
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-api-key", API_KEY)
        .body(Body::from(body.to_string()))
        .expect("request");

    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let parsed = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, parsed)
}

async fn chat(app: &Router, session_id: Option<&str>, text: &str) -> Value {
    let (status, body) = post_json(
        app,
        "/v1/chat",
        json!({ "session_id": session_id, "text": text }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "chat failed: {body}");
    body
}

#[tokio::test]
async fn health_is_public() {
    let app = app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let parsed: Value = serde_json::from_slice(&bytes).expect("json");
    assert_eq!(parsed["status"], "ok");
    assert_eq!(parsed["capabilities"]["risk_levels"], 4);
}

#[tokio::test]
async fn chat_requires_api_key() {
    let app = app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "text": "hola" }).to_string()))
        .expect("request");

    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn chat_walks_certificate_intake_to_a_quote() {
    let app = app().await;

    let opening = chat(&app, None, "necesito el certificado itse").await;
    let session_id = opening["session_id"].as_str().expect("session id").to_string();
    assert_eq!(opening["stage"], "category");

    chat(&app, Some(&session_id), "comercio").await;
    chat(&app, Some(&session_id), "bodega").await;
    chat(&app, Some(&session_id), "120").await;

    let quoted = chat(&app, Some(&session_id), "2").await;
    assert_eq!(quoted["stage"], "scheduling");
    let quote = &quoted["quote"];
    assert_eq!(quote["risk"], "medium");
    assert_eq!(quote["municipal_fee"], 20860);
    assert_eq!(quote["total"]["min"], 65860);
    assert_eq!(quote["total"]["max"], 85860);
    assert_eq!(quote["statutory_days"], 9);

    chat(&app, Some(&session_id), "lunes 10am").await;
    chat(&app, Some(&session_id), "Ana Torres, 987654321").await;

    let confirmed = chat(&app, Some(&session_id), "sí").await;
    assert_eq!(confirmed["stage"], "done");
    let url = confirmed["whatsapp_url"].as_str().expect("deep link");
    assert!(url.starts_with("https://wa.me/"));
    assert!(url.contains("text="));
}

#[tokio::test]
async fn chat_reprompts_on_invalid_area_without_advancing() {
    let app = app().await;

    let opening = chat(&app, None, "itse").await;
    let session_id = opening["session_id"].as_str().expect("session id").to_string();

    chat(&app, Some(&session_id), "oficina").await;
    chat(&app, Some(&session_id), "estudio contable").await;

    let rejected = chat(&app, Some(&session_id), "bastante amplio").await;
    assert_eq!(rejected["stage"], "area");
    assert_eq!(rejected["json_payload"]["rejected_input"], true);

    let accepted = chat(&app, Some(&session_id), "300").await;
    assert_eq!(accepted["stage"], "floors");
}

#[tokio::test]
async fn quote_endpoint_prices_per_unit_services() {
    let app = app().await;

    let (status, body) = post_json(
        &app,
        "/v1/quote",
        json!({ "service": "luces_emergencia", "quantity": 5 }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"]["min"], 75000);
    assert_eq!(body["total"]["max"], 75000);
    assert_eq!(body["municipal_fee"], Value::Null);
}

#[tokio::test]
async fn quote_endpoint_rejects_non_positive_quantity() {
    let app = app().await;

    for quantity in [0.0, -2.0] {
        let (status, body) = post_json(
            &app,
            "/v1/quote",
            json!({ "service": "luces_emergencia", "quantity": quantity }),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "invalid_input");
        assert_eq!(body["field"], "quantity");
    }
}

#[tokio::test]
async fn quote_endpoint_classifies_certificate_requests() {
    let app = app().await;

    let (status, body) = post_json(
        &app,
        "/v1/quote",
        json!({
            "service": "certificado_itse",
            "category": "restaurante",
            "subtype": "pollería",
            "area_m2": 200,
            "floors": 1
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["risk"], "high");
    assert_eq!(body["municipal_fee"], 124330);
    assert_eq!(body["statutory_days"], 12);
}

#[tokio::test]
async fn catalog_and_tariffs_disclose_static_tables() {
    let app = app().await;

    let request = Request::builder()
        .uri("/v1/catalog")
        .header("x-api-key", API_KEY)
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let catalog: Value = serde_json::from_slice(&bytes).expect("json");
    assert_eq!(catalog.as_array().expect("array").len(), 7);

    let request = Request::builder()
        .uri("/v1/tariffs")
        .header("x-api-key", API_KEY)
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let tariffs: Value = serde_json::from_slice(&bytes).expect("json");
    let rows = tariffs.as_array().expect("array");
    assert_eq!(rows.len(), 4);
    assert!(rows.iter().any(|row| row["risk"] == "medium" && row["fee"] == 20860));
}
