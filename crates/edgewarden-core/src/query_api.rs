// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Historical query HTTP endpoint.
//!
//! `POST /v2/messages/query` with an `application/json` body:
//!
//! ```json
//! {
//!   "id": "receiver-id",
//!   "timeframestart": 1700000000000,
//!   "timeframeend": 1700000060000,
//!   "publishers": ["pub-a", "pub-b"]
//! }
//! ```
//!
//! Validation short-circuits on the first failure, in a fixed order:
//! content type, `id` present, timeframe fields present, `publishers`
//! present, both timeframe fields integers, `id` non-blank. Failures are
//! 400 with a plain-text explanation; a non-POST method is 405 via
//! routing. Nothing raises past the handler.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use serde_json::{Value, json};
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::bus::MessageBus;
use crate::error::Result;

/// Build the query API router.
pub fn router(bus: Arc<MessageBus>) -> Router {
    Router::new()
        .route("/v2/messages/query", post(query_messages))
        .with_state(bus)
}

/// Run the historical query HTTP server until shutdown is signalled.
pub async fn run_query_server(
    bind_addr: SocketAddr,
    bus: Arc<MessageBus>,
    shutdown: Arc<Notify>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = %bind_addr, "Historical query server starting");

    axum::serve(listener, router(bus))
        .with_graceful_shutdown(async move {
            shutdown.notified().await;
            info!("Historical query server received shutdown signal");
        })
        .await?;

    Ok(())
}

async fn query_messages(
    State(bus): State<Arc<MessageBus>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if content_type != "application/json" {
        return bad_request("Incorrect content/data format");
    }

    let request: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(_) => return bad_request("Incorrect content/data format"),
    };

    if let Some(error) = validate_query_input(&request) {
        return bad_request(error);
    }
    debug!("Query input validated");

    let receiver_id = request["id"].as_str().unwrap_or_default();
    let timeframe_start = request["timeframestart"].as_i64().unwrap_or_default();
    let timeframe_end = request["timeframeend"].as_i64().unwrap_or_default();

    let mut messages: Vec<Value> = Vec::new();
    for publisher in request["publishers"].as_array().into_iter().flatten() {
        let Some(publisher_id) = publisher.as_str() else {
            continue;
        };
        for message in bus.query(publisher_id, receiver_id, timeframe_start, timeframe_end) {
            match serde_json::to_value(&message) {
                Ok(value) => messages.push(value),
                Err(_) => continue,
            }
        }
    }

    let count = messages.len();
    (
        StatusCode::OK,
        Json(json!({
            "status": "okay",
            "count": count,
            "messages": messages,
        })),
    )
        .into_response()
}

/// First validation failure, or `None` when the input is acceptable.
fn validate_query_input(request: &Value) -> Option<&'static str> {
    let Some(fields) = request.as_object() else {
        return Some("Error: Missing input field id");
    };

    if !fields.contains_key("id") {
        return Some("Error: Missing input field id");
    }
    if !(fields.contains_key("timeframestart") && fields.contains_key("timeframeend")) {
        return Some("Error: Missing input field timeframe start or end");
    }
    if !fields.contains_key("publishers") {
        return Some("Error: Missing input field publishers");
    }
    if fields["timeframestart"].as_i64().is_none() {
        return Some("Error: Invalid value of timeframestart");
    }
    if fields["timeframeend"].as_i64().is_none() {
        return Some("Error: Invalid value of timeframeend");
    }
    if fields["id"].as_str().map(str::trim).unwrap_or("").is_empty() {
        return Some("Error: Missing input field value id");
    }

    None
}

fn bad_request(explanation: &'static str) -> Response {
    (StatusCode::BAD_REQUEST, explanation).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::SubscriberTable;
    use axum::body::Body;
    use axum::http::Request;
    use edgewarden_protocol::message::RawMessage;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn bus() -> Arc<MessageBus> {
        Arc::new(MessageBus::new(Arc::new(SubscriberTable::default()), 1024))
    }

    async fn post_json(bus: Arc<MessageBus>, body: &str) -> (StatusCode, String) {
        let response = router(bus)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v2/messages/query")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8_lossy(&bytes).to_string())
    }

    #[tokio::test]
    async fn test_non_post_is_method_not_allowed() {
        let response = router(bus())
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/v2/messages/query")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_wrong_content_type() {
        let response = router(bus())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v2/messages/query")
                    .header(header::CONTENT_TYPE, "text/plain")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(&bytes[..], b"Incorrect content/data format");
    }

    #[tokio::test]
    async fn test_missing_id() {
        let (status, body) = post_json(
            bus(),
            r#"{"timeframestart": 0, "timeframeend": 1, "publishers": []}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Error: Missing input field id");
    }

    #[tokio::test]
    async fn test_missing_timeframe() {
        let (status, body) =
            post_json(bus(), r#"{"id": "b", "timeframestart": 0, "publishers": []}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Error: Missing input field timeframe start or end");
    }

    #[tokio::test]
    async fn test_missing_publishers() {
        let (status, body) = post_json(
            bus(),
            r#"{"id": "b", "timeframestart": 0, "timeframeend": 1}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Error: Missing input field publishers");
    }

    #[tokio::test]
    async fn test_invalid_timeframestart() {
        let (status, body) = post_json(
            bus(),
            r#"{"id": "b", "timeframestart": "abc", "timeframeend": 1, "publishers": []}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Error: Invalid value of timeframestart");
    }

    #[tokio::test]
    async fn test_invalid_timeframeend() {
        let (status, body) = post_json(
            bus(),
            r#"{"id": "b", "timeframestart": 0, "timeframeend": [], "publishers": []}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Error: Invalid value of timeframeend");
    }

    #[tokio::test]
    async fn test_blank_id() {
        let (status, body) = post_json(
            bus(),
            r#"{"id": "  ", "timeframestart": 0, "timeframeend": 1, "publishers": []}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Error: Missing input field value id");
    }

    #[tokio::test]
    async fn test_validation_order_first_failure_wins() {
        // Both id and publishers are missing; id is reported.
        let (status, body) =
            post_json(bus(), r#"{"timeframestart": 0, "timeframeend": 1}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Error: Missing input field id");
    }

    #[tokio::test]
    async fn test_query_returns_matching_messages() {
        let bus = bus();
        bus.publish(RawMessage {
            publisher: "A".to_string(),
            receiver: "B".to_string(),
            payload: b"one".to_vec(),
        });
        bus.publish(RawMessage {
            publisher: "X".to_string(),
            receiver: "B".to_string(),
            payload: b"two".to_vec(),
        });
        bus.publish(RawMessage {
            publisher: "A".to_string(),
            receiver: "other".to_string(),
            payload: b"three".to_vec(),
        });

        let (status, body) = post_json(
            bus.clone(),
            &format!(
                r#"{{"id": "B", "timeframestart": 0, "timeframeend": {}, "publishers": ["A", "X"]}}"#,
                i64::MAX
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let parsed: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["status"], "okay");
        assert_eq!(parsed["count"], 2);
        assert_eq!(parsed["messages"].as_array().unwrap().len(), 2);
        assert_eq!(parsed["messages"][0]["publisher"], "A");
        assert_eq!(parsed["messages"][1]["publisher"], "X");
    }

    #[tokio::test]
    async fn test_empty_result_is_okay() {
        let (status, body) = post_json(
            bus(),
            r#"{"id": "B", "timeframestart": 0, "timeframeend": 1, "publishers": ["A"]}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let parsed: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["status"], "okay");
        assert_eq!(parsed["count"], 0);
    }

    #[tokio::test]
    async fn test_reversed_range_is_empty_not_error() {
        let bus = bus();
        bus.publish(RawMessage {
            publisher: "A".to_string(),
            receiver: "B".to_string(),
            payload: b"one".to_vec(),
        });

        let (status, body) = post_json(
            bus,
            &format!(
                r#"{{"id": "B", "timeframestart": {}, "timeframeend": 0, "publishers": ["A"]}}"#,
                i64::MAX
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let parsed: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["count"], 0);
    }
}
