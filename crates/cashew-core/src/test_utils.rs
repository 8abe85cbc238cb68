//! Test utilities for cashew-core
//!
//! This module provides a mock OpenAI-compatible server that can be used for
//! development and integration tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tokio::sync::oneshot;

#[derive(Default)]
struct MockState {
    requests: AtomicUsize,
    failing: bool,
}

/// Mock OpenAI-compatible server for testing and development
///
/// Answers `/v1/chat/completions` with a keyword lookup over the request's
/// transactions: descriptions containing SUPERMARKET become "Groceries",
/// COFFEE becomes "Dining", everything else "unknown".
pub struct MockOpenAIServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockOpenAIServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        Self::start_with(false).await
    }

    /// Start a server whose completions endpoint always answers 500
    pub async fn start_failing() -> Self {
        Self::start_with(true).await
    }

    async fn start_with(failing: bool) -> Self {
        let state = Arc::new(MockState {
            requests: AtomicUsize::new(0),
            failing,
        });
        let app = Router::new()
            .route("/v1/models", get(handle_models))
            .route("/v1/chat/completions", post(handle_chat_completions))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Completion requests received so far
    pub fn request_count(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockOpenAIServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Model listing (health check)
async fn handle_models() -> Json<Value> {
    Json(json!({
        "object": "list",
        "data": [{"id": "mock-model", "object": "model", "owned_by": "cashew"}]
    }))
}

async fn handle_chat_completions(
    State(state): State<Arc<MockState>>,
    Json(request): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    state.requests.fetch_add(1, Ordering::SeqCst);
    if state.failing {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    let user_message = request["messages"]
        .as_array()
        .and_then(|messages| messages.iter().rev().find(|m| m["role"] == "user"))
        .and_then(|m| m["content"].as_str())
        .unwrap_or_default();

    let assignments: Vec<Value> = transactions_in(user_message)
        .iter()
        .map(|item| {
            json!({
                "id": item["id"],
                "category": classify_mock(item["description"].as_str().unwrap_or_default()),
            })
        })
        .collect();

    let content = json!({ "categorized_transactions": assignments }).to_string();
    Ok(Json(json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "model": request["model"],
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })))
}

/// The JSON array embedded in the user prompt
fn transactions_in(prompt: &str) -> Vec<Value> {
    let (Some(start), Some(end)) = (prompt.find('['), prompt.rfind(']')) else {
        return Vec::new();
    };
    if end < start {
        return Vec::new();
    }
    serde_json::from_str(&prompt[start..=end]).unwrap_or_default()
}

fn classify_mock(description: &str) -> &'static str {
    let d = description.to_uppercase();
    if d.contains("SUPERMARKET") {
        "Groceries"
    } else if d.contains("COFFEE") {
        "Dining"
    } else {
        "unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transactions_in_prompt() {
        let prompt = "Please categorize these transactions:\n[{\"id\":0,\"description\":\"SUPERMARKET\"}]";
        let items = transactions_in(prompt);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["id"], 0);
        assert!(transactions_in("no array here").is_empty());
    }

    #[test]
    fn test_classify_mock() {
        assert_eq!(classify_mock("Supermarket XYZ"), "Groceries");
        assert_eq!(classify_mock("coffee bar"), "Dining");
        assert_eq!(classify_mock("Mystery"), "unknown");
    }

    #[tokio::test]
    async fn test_server_counts_requests() {
        let server = MockOpenAIServer::start().await;
        let client = reqwest::Client::new();
        let response: Value = client
            .post(format!("{}/v1/chat/completions", server.url()))
            .json(&json!({
                "model": "m",
                "messages": [{"role": "user", "content": "[{\"id\":3,\"description\":\"COFFEE\"}]"}]
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        let content = response["choices"][0]["message"]["content"].as_str().unwrap();
        let parsed: Value = serde_json::from_str(content).unwrap();
        assert_eq!(parsed["categorized_transactions"][0]["id"], 3);
        assert_eq!(parsed["categorized_transactions"][0]["category"], "Dining");
        assert_eq!(server.request_count(), 1);
    }
}
