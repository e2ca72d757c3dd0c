//! HTTP API tests against a server bound to an ephemeral port.

mod common;

use serde_json::{json, Value};
use std::sync::Arc;

use common::TestEnv;
use faq_harness::server::build_router;
use faq_harness_core::router::NO_FAQ_PROMPT;

struct TestServer {
    base: String,
    client: reqwest::Client,
    env: TestEnv,
}

impl TestServer {
    async fn start() -> Self {
        let env = TestEnv::new();
        let app = Arc::new(env.app().await);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(app)).await.unwrap();
        });
        Self {
            base: format!("http://{}", addr),
            client: reqwest::Client::new(),
            env,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn fixture(&self, name: &str) -> String {
        self.env.file(name).display().to_string()
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let resp = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let resp = self.client.get(self.url(path)).send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }
}

#[tokio::test]
async fn test_health() {
    let server = TestServer::start().await;
    let (status, body) = server.get("/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_chat_rejects_empty_input() {
    let server = TestServer::start().await;
    let (status, body) = server.post("/chat", json!({ "user_input": "   " })).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_chat_starts_conversation_and_keeps_history() {
    let server = TestServer::start().await;

    let (status, first) = server
        .post("/chat", json!({ "user_input": "What is the weather like?" }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(first["response"], NO_FAQ_PROMPT);
    assert_eq!(first["state"]["state"], "awaiting_generation_consent");
    let conversation_id = first["conversation_id"].as_str().unwrap().to_string();
    assert!(!conversation_id.is_empty());

    let (_, second) = server
        .post(
            "/chat",
            json!({ "conversation_id": conversation_id, "user_input": "yes" }),
        )
        .await;
    assert_eq!(second["conversation_id"], conversation_id.as_str());
    assert!(second["response"]
        .as_str()
        .unwrap()
        .starts_with("Generated: What is the weather like?"));
    assert_eq!(second["chat_history"].as_array().unwrap().len(), 2);

    let (status, history) = server.get(&format!("/chat/{}", conversation_id)).await;
    assert_eq!(status, 200);
    assert_eq!(history["chat_history"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_document_lifecycle() {
    let server = TestServer::start().await;

    let (status, created) = server
        .post(
            "/admin/documents",
            json!({ "path": server.fixture("refunds.md") }),
        )
        .await;
    assert_eq!(status, 201);
    assert_eq!(created["document"]["active"], false);
    assert_eq!(created["index"]["status"], "no_active_documents");
    let id = created["document"]["id"].as_i64().unwrap();

    let (status, toggled) = server
        .post(
            &format!("/admin/documents/{}/toggle", id),
            json!({ "active": true }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(toggled["document"]["active"], true);
    assert_eq!(toggled["index"]["status"], "ready");
    assert_eq!(toggled["index"]["meta"]["chunk_count"], 1);

    let (_, reply) = server
        .post("/chat", json!({ "user_input": "How do refunds work?" }))
        .await;
    assert!(reply["response"]
        .as_str()
        .unwrap()
        .starts_with("From refunds.md:"));
    assert_eq!(reply["attributed_document_ids"], json!([id]));

    let (_, usage) = server.get("/admin/analytics/documents").await;
    assert_eq!(usage["documents"][0]["uses"], 1);
    let (_, activity) = server.get("/admin/analytics/conversations").await;
    assert_eq!(activity["conversations"].as_array().unwrap().len(), 1);

    let resp = server
        .client
        .delete(server.url(&format!("/admin/documents/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let deleted: Value = resp.json().await.unwrap();
    assert_eq!(deleted["deleted"]["id"], id);

    let (_, listed) = server.get("/admin/documents").await;
    assert_eq!(listed["documents"], json!([]));
}

#[tokio::test]
async fn test_admin_error_codes() {
    let server = TestServer::start().await;

    let (status, body) = server
        .post(
            "/admin/documents/99/toggle",
            json!({ "active": true }),
        )
        .await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "not_found");

    let upload = json!({ "path": server.fixture("shipping.txt") });
    let (status, _) = server.post("/admin/documents", upload.clone()).await;
    assert_eq!(status, 201);
    let (status, body) = server.post("/admin/documents", upload).await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "conflict");

    let (status, body) = server
        .post("/admin/documents", json!({ "path": "/tmp/notes.docx" }))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_rebuild_endpoint() {
    let server = TestServer::start().await;
    let (status, body) = server.post("/admin/index/rebuild", json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "no_active_documents");
}
