//! Integration test: start the gateway on a free port with a recording pipeline trigger,
//! then exercise GET / and POST / over HTTP. Does not require OpenAI, Notion or Slack.
//! The server task is left running when a test ends.

use async_trait::async_trait;
use relay::config::{Config, Settings};
use relay::gateway;
use relay::pipeline::{PipelineError, PipelineOutcome, PipelineTrigger};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const CHANNEL_ID: &str = "C0TEST";

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

struct ChannelTrigger {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl PipelineTrigger for ChannelTrigger {
    async fn trigger(&self, topic: &str) -> Result<PipelineOutcome, PipelineError> {
        let _ = self.tx.send(topic.to_string());
        Ok(PipelineOutcome::default())
    }
}

fn settings(port: u16) -> Settings {
    let mut config = Config::default();
    config.gateway.port = port;
    config.gateway.bind = "127.0.0.1".to_string();
    let env = |key: &str| match key {
        "TRIGGER_ID" => Some("trg-test".to_string()),
        "CHANNEL_ID" => Some(CHANNEL_ID.to_string()),
        "OPENAI_API_KEY" => Some("sk-test".to_string()),
        _ => None,
    };
    Settings::resolve_with(&config, env).expect("settings")
}

/// Start the gateway and wait until GET / answers. Returns the base URL and the topic receiver.
async fn start_gateway() -> (String, mpsc::UnboundedReceiver<String>) {
    let port = free_port();
    let (tx, rx) = mpsc::unbounded_channel();
    let trigger = Arc::new(ChannelTrigger { tx });
    let settings = settings(port);
    tokio::spawn(async move {
        let _ = gateway::run_gateway_with(settings, trigger).await;
    });

    let url = format!("http://127.0.0.1:{}/", port);
    let client = reqwest::Client::new();
    for _ in 0..100 {
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return (url, rx);
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("GET {} did not return 200 within 5s", url);
}

#[tokio::test]
async fn health_reports_running_without_ids() {
    let (url, _rx) = start_gateway().await;
    let json: serde_json::Value = reqwest::get(&url)
        .await
        .expect("GET /")
        .json()
        .await
        .expect("parse JSON");
    assert_eq!(json.get("runtime").and_then(|v| v.as_str()), Some("running"));
    assert!(json.get("port").and_then(|v| v.as_u64()).is_some());
    assert!(json.get("channelId").is_none());
    assert!(json.get("triggerId").is_none());
}

#[tokio::test]
async fn matching_channel_starts_run_with_topic() {
    let (url, mut rx) = start_gateway().await;
    let client = reqwest::Client::new();
    let resp = client
        .post(&url)
        .json(&serde_json::json!({
            "payload": { "channel": CHANNEL_ID, "text": "quantum computing", "user": "u1" }
        }))
        .send()
        .await
        .expect("POST /");
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(resp.text().await.expect("body"), gateway::ACK_MESSAGE);

    let topic = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("run started within 5s")
        .expect("trigger channel open");
    assert_eq!(topic, "quantum computing");
    assert!(
        tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .is_err(),
        "trigger ran more than once"
    );
}

#[tokio::test]
async fn other_channel_gets_identical_response_and_no_run() {
    let (url, mut rx) = start_gateway().await;
    let client = reqwest::Client::new();
    let resp = client
        .post(&url)
        .json(&serde_json::json!({
            "payload": { "channel": "C0OTHER", "text": "quantum computing", "user": "u1" }
        }))
        .send()
        .await
        .expect("POST /");
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(resp.text().await.expect("body"), gateway::ACK_MESSAGE);
    assert!(
        tokio::time::timeout(Duration::from_millis(300), rx.recv())
            .await
            .is_err(),
        "trigger must not run for another channel"
    );
}

#[tokio::test]
async fn non_json_body_is_rejected() {
    let (url, mut rx) = start_gateway().await;
    let client = reqwest::Client::new();
    let resp = client
        .post(&url)
        .header("content-type", "text/plain")
        .body("channel=C0TEST&text=hello")
        .send()
        .await
        .expect("POST /");
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    assert!(resp
        .text()
        .await
        .expect("body")
        .contains(gateway::INVALID_PAYLOAD_MESSAGE));
    assert!(
        tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .is_err()
    );
}
