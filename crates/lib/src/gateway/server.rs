//! Gateway HTTP server: webhook intake and health probe on a single port.

use crate::config::Settings;
use crate::gateway::payload::WebhookEnvelope;
use crate::pipeline::{PipelineTrigger, ResearchPipeline};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Body returned for every well-formed webhook request, whether or not a run started.
pub const ACK_MESSAGE: &str = "Lyzr run initiated";
/// Body returned with 400 when the request body is not a JSON envelope.
pub const INVALID_PAYLOAD_MESSAGE: &str = "Invalid payload format";

/// Shared state for the gateway (settings, pipeline entry point, in-flight runs).
#[derive(Clone)]
pub struct GatewayState {
    pub settings: Arc<Settings>,
    pub trigger: Arc<dyn PipelineTrigger>,
    /// Spawned pipeline runs; awaited during graceful shutdown.
    pub runs: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl GatewayState {
    pub fn new(settings: Settings, trigger: Arc<dyn PipelineTrigger>) -> Self {
        Self {
            settings: Arc::new(settings),
            trigger,
            runs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Start a pipeline run for `topic` on its own task. Failures are logged, never returned.
    pub async fn start_run(&self, topic: String) {
        let trigger = self.trigger.clone();
        let handle = tokio::spawn(async move {
            log::info!("pipeline run started for topic {:?}", topic);
            match trigger.trigger(&topic).await {
                Ok(outcome) => {
                    log::info!(
                        "pipeline run finished for topic {:?} ({} task output(s))",
                        topic,
                        outcome.outputs.len()
                    );
                }
                Err(e) => {
                    log::error!("pipeline run failed for topic {:?}: {}", topic, e);
                }
            }
        });
        let mut runs = self.runs.lock().await;
        runs.retain(|h| !h.is_finished());
        runs.push(handle);
    }

    /// Await tracked runs until none are left, including runs started while waiting.
    pub async fn wait_for_runs(&self) {
        loop {
            let handles = {
                let mut g = self.runs.lock().await;
                std::mem::take(&mut *g)
            };
            if handles.is_empty() {
                return;
            }
            for h in handles {
                if let Err(e) = h.await {
                    log::warn!("pipeline run task ended abnormally: {}", e);
                }
            }
        }
    }
}

/// Build the router: `GET /` health, `POST /` webhook.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http).post(webhook))
        .with_state(state)
}

/// Run the gateway with the research pipeline built from `settings`.
/// Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(settings: Settings) -> Result<()> {
    let trigger = Arc::new(ResearchPipeline::from_settings(&settings.services));
    run_gateway_with(settings, trigger).await
}

/// Run the gateway with an explicit pipeline entry point; binds to `settings.bind:settings.port`.
pub async fn run_gateway_with(settings: Settings, trigger: Arc<dyn PipelineTrigger>) -> Result<()> {
    let bind_addr = settings.bind_addr();
    log::info!(
        "trigger {} listening for messages in channel {}",
        settings.trigger_id,
        settings.channel_id
    );
    let state = GatewayState::new(settings, trigger);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("listener closed, waiting for in-flight pipeline runs");
    state.wait_for_runs().await;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received");
}

/// POST /: parse the envelope; start a run when the message came from the configured channel.
/// The response does not depend on whether a run started.
async fn webhook(State(state): State<GatewayState>, body: Bytes) -> (StatusCode, &'static str) {
    let envelope = match WebhookEnvelope::from_slice(&body) {
        Ok(e) => e,
        Err(e) => {
            log::warn!("webhook: invalid payload: {}", e);
            return (StatusCode::BAD_REQUEST, INVALID_PAYLOAD_MESSAGE);
        }
    };
    let msg = envelope.payload;
    log::info!(
        "payload received: channel={} user={} text={:?}",
        msg.channel,
        msg.user,
        msg.text
    );
    if msg.channel == state.settings.channel_id {
        state.start_run(msg.text).await;
    } else {
        log::debug!("webhook: channel {} is not {}, ignoring", msg.channel, state.settings.channel_id);
    }
    (StatusCode::OK, ACK_MESSAGE)
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.settings.port,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::llm::LlmError;
    use crate::pipeline::{PipelineError, PipelineOutcome};
    use async_trait::async_trait;

    #[derive(Default)]
    struct RecordingTrigger {
        topics: std::sync::Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl PipelineTrigger for RecordingTrigger {
        async fn trigger(&self, topic: &str) -> Result<PipelineOutcome, PipelineError> {
            self.topics.lock().unwrap().push(topic.to_string());
            if self.fail {
                return Err(PipelineError::Task {
                    task: "Research task".to_string(),
                    source: LlmError::Api("500 upstream".to_string()),
                });
            }
            Ok(PipelineOutcome::default())
        }
    }

    fn settings() -> Settings {
        let env = |key: &str| match key {
            "TRIGGER_ID" => Some("trg-1".to_string()),
            "CHANNEL_ID" => Some("C123".to_string()),
            "OPENAI_API_KEY" => Some("sk-test".to_string()),
            _ => None,
        };
        Settings::resolve_with(&Config::default(), env).unwrap()
    }

    fn state_with(trigger: Arc<RecordingTrigger>) -> GatewayState {
        GatewayState::new(settings(), trigger)
    }

    async fn post(state: &GatewayState, body: &'static [u8]) -> (StatusCode, &'static str) {
        let res = webhook(State(state.clone()), Bytes::from_static(body)).await;
        state.wait_for_runs().await;
        res
    }

    #[tokio::test]
    async fn matching_channel_triggers_once_with_text() {
        let trigger = Arc::new(RecordingTrigger::default());
        let state = state_with(trigger.clone());
        let res = post(
            &state,
            br#"{"payload":{"channel":"C123","text":"quantum computing","user":"u1"}}"#,
        )
        .await;
        assert_eq!(res, (StatusCode::OK, ACK_MESSAGE));
        assert_eq!(
            trigger.topics.lock().unwrap().as_slice(),
            &["quantum computing".to_string()]
        );
    }

    #[tokio::test]
    async fn other_channel_is_dropped_with_same_response() {
        let trigger = Arc::new(RecordingTrigger::default());
        let state = state_with(trigger.clone());
        let res = post(
            &state,
            br#"{"payload":{"channel":"C999","text":"quantum computing","user":"u1"}}"#,
        )
        .await;
        assert_eq!(res, (StatusCode::OK, ACK_MESSAGE));
        assert!(trigger.topics.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_payload_is_acknowledged_without_run() {
        let trigger = Arc::new(RecordingTrigger::default());
        let state = state_with(trigger.clone());
        let res = post(&state, br#"{}"#).await;
        assert_eq!(res, (StatusCode::OK, ACK_MESSAGE));
        assert!(trigger.topics.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_json_body_is_bad_request() {
        let trigger = Arc::new(RecordingTrigger::default());
        let state = state_with(trigger.clone());
        let res = post(&state, b"not json").await;
        assert_eq!(res, (StatusCode::BAD_REQUEST, INVALID_PAYLOAD_MESSAGE));
        assert!(trigger.topics.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_run_does_not_change_response() {
        let trigger = Arc::new(RecordingTrigger {
            fail: true,
            ..Default::default()
        });
        let state = state_with(trigger.clone());
        let res = post(&state, br#"{"payload":{"channel":"C123","text":"t"}}"#).await;
        assert_eq!(res, (StatusCode::OK, ACK_MESSAGE));
        assert_eq!(trigger.topics.lock().unwrap().len(), 1);
    }

    /// Records a topic only after the gate hands out a permit.
    struct GatedTrigger {
        gate: tokio::sync::Semaphore,
        finished: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PipelineTrigger for GatedTrigger {
        async fn trigger(&self, topic: &str) -> Result<PipelineOutcome, PipelineError> {
            self.gate.acquire().await.unwrap().forget();
            self.finished.lock().unwrap().push(topic.to_string());
            Ok(PipelineOutcome::default())
        }
    }

    #[tokio::test]
    async fn run_started_while_waiting_is_awaited_too() {
        let trigger = Arc::new(GatedTrigger {
            gate: tokio::sync::Semaphore::new(0),
            finished: std::sync::Mutex::new(Vec::new()),
        });
        let state = GatewayState::new(settings(), trigger.clone());
        let first = webhook(
            State(state.clone()),
            Bytes::from_static(br#"{"payload":{"channel":"C123","text":"A"}}"#),
        )
        .await;
        assert_eq!(first, (StatusCode::OK, ACK_MESSAGE));

        let draining = state.clone();
        let drain = tokio::spawn(async move { draining.wait_for_runs().await });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!drain.is_finished());

        webhook(
            State(state.clone()),
            Bytes::from_static(br#"{"payload":{"channel":"C123","text":"B"}}"#),
        )
        .await;
        trigger.gate.add_permits(2);

        tokio::time::timeout(std::time::Duration::from_secs(5), drain)
            .await
            .expect("drain finished")
            .unwrap();
        let mut finished = trigger.finished.lock().unwrap().clone();
        finished.sort();
        assert_eq!(finished, vec!["A".to_string(), "B".to_string()]);
        assert!(state.runs.lock().await.is_empty());
    }

    #[tokio::test]
    async fn health_reports_runtime_and_port_only() {
        let state = state_with(Arc::new(RecordingTrigger::default()));
        let Json(body) = health_http(State(state)).await;
        assert_eq!(body, json!({ "runtime": "running", "port": 2000 }));
    }

    #[tokio::test]
    async fn each_request_starts_its_own_run() {
        let trigger = Arc::new(RecordingTrigger::default());
        let state = state_with(trigger.clone());
        let body: &'static [u8] = br#"{"payload":{"channel":"C123","text":"same"}}"#;
        post(&state, body).await;
        post(&state, body).await;
        assert_eq!(trigger.topics.lock().unwrap().len(), 2);
        assert!(state.runs.lock().await.is_empty());
    }
}
