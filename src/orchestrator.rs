use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use sqlx::SqlitePool;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::ApiError;
use crate::realtime::{RealtimeConnector, RealtimeSession, SessionEvent};
use crate::sessions;

/// Inbound message shapes accepted on the interview channel.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Audio { data: Vec<i16> },
    Text { content: String },
}

struct ActiveSession {
    cancel: CancellationToken,
    /// Taken by the first disconnect; an entry with no handle is tearing down.
    relay: Option<JoinHandle<()>>,
    inbound_tx: mpsc::Sender<ClientFrame>,
}

/// Tracks live interview channels. Each entry owns its relay task and the
/// cancellation token that tears it down; tool handling inside the relay is
/// bound to that connection's session id, never to shared mutable state.
#[derive(Default)]
pub struct SessionRegistry {
    active: Mutex<HashMap<String, ActiveSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn active_count(&self) -> usize {
        self.active.lock().await.len()
    }

    /// Binds a client channel to its durable session record and a fresh
    /// external realtime session. Serialized event frames are pushed into
    /// `outbound`; the returned sender carries client frames in.
    pub async fn connect(
        &self,
        pool: &SqlitePool,
        connector: &dyn RealtimeConnector,
        session_id: &str,
        outbound: mpsc::Sender<String>,
    ) -> Result<mpsc::Sender<ClientFrame>, ApiError> {
        let record = sessions::get_session(pool, session_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Session {session_id} not found")))?;
        if record.status != sessions::STATUS_ACTIVE {
            return Err(ApiError::Validation(format!(
                "Session {session_id} is not active"
            )));
        }

        let mut active = self.active.lock().await;
        if active.contains_key(session_id) {
            return Err(ApiError::Validation(format!(
                "Session {session_id} already has a live channel"
            )));
        }

        let agent_session = connector.open(session_id).await.map_err(|e| {
            log::error!("Failed to open realtime session for {session_id}: {e:#}");
            ApiError::ExternalService("Failed to create realtime session".to_string())
        })?;

        let cancel = CancellationToken::new();
        let (inbound_tx, inbound_rx) = mpsc::channel(64);

        let relay = tokio::spawn(relay_events(
            session_id.to_string(),
            pool.clone(),
            agent_session,
            inbound_rx,
            outbound,
            cancel.clone(),
        ));

        active.insert(
            session_id.to_string(),
            ActiveSession {
                cancel,
                relay: Some(relay),
                inbound_tx: inbound_tx.clone(),
            },
        );
        log::info!("Interview channel connected for session {session_id}");

        Ok(inbound_tx)
    }

    /// Tears the channel down: cancel the relay task, await it (the task
    /// closes the external session before it exits), then drop the entry.
    /// The first caller claims the relay handle, so teardown runs exactly
    /// once; the entry stays in the map until the join completes, so a
    /// reconnect cannot race a still-closing agent session.
    pub async fn disconnect(&self, session_id: &str) {
        let claimed = {
            let mut active = self.active.lock().await;
            active.get_mut(session_id).and_then(|entry| {
                entry.relay.take().map(|relay| (entry.cancel.clone(), relay))
            })
        };
        let Some((cancel, relay)) = claimed else {
            return;
        };

        cancel.cancel();
        if let Err(e) = relay.await {
            log::error!("Relay task for {session_id} ended abnormally: {e}");
        }

        self.active.lock().await.remove(session_id);
        log::info!("Interview channel for session {session_id} torn down");
    }

    /// Drains every live channel; used on server shutdown.
    pub async fn shutdown_all(&self) {
        let ids: Vec<String> = self.active.lock().await.keys().cloned().collect();
        for id in ids {
            self.disconnect(&id).await;
        }
    }
}

/// Long-lived per-connection task: forwards client frames to the agent and
/// agent events to the client, executing tool-calls against this session's
/// durable record on the way through.
async fn relay_events(
    session_id: String,
    pool: SqlitePool,
    mut agent: Box<dyn RealtimeSession>,
    mut inbound_rx: mpsc::Receiver<ClientFrame>,
    outbound: mpsc::Sender<String>,
    cancel: CancellationToken,
) {
    log::debug!("Relay task started for session {session_id}");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                log::debug!("Relay task for {session_id} cancelled");
                break;
            }

            frame = inbound_rx.recv() => {
                let Some(frame) = frame else { break };
                let sent = match frame {
                    ClientFrame::Audio { data } => {
                        let mut bytes = Vec::with_capacity(data.len() * 2);
                        for sample in data {
                            bytes.extend_from_slice(&sample.to_le_bytes());
                        }
                        agent.send_audio(&BASE64.encode(bytes)).await
                    }
                    ClientFrame::Text { content } => agent.send_text(&content).await,
                };
                if let Err(e) = sent {
                    log::warn!("Failed to forward client frame for {session_id}: {e}");
                }
            }

            event = agent.next_event() => {
                let Some(event) = event else {
                    log::info!("Agent closed event stream for session {session_id}");
                    break;
                };
                if !forward_event(&session_id, &pool, &outbound, event).await {
                    break;
                }
            }
        }
    }

    if let Err(e) = agent.close().await {
        log::warn!("Error closing realtime session for {session_id}: {e}");
    }
    log::debug!("Relay task ended for session {session_id}");
}

/// Returns false when the client channel is gone and the relay should stop.
async fn forward_event(
    session_id: &str,
    pool: &SqlitePool,
    outbound: &mpsc::Sender<String>,
    event: SessionEvent,
) -> bool {
    match event {
        SessionEvent::ToolCall { tool, arguments } => {
            if outbound
                .send(frame("tool_start", [("tool", json!(tool))]))
                .await
                .is_err()
            {
                return false;
            }
            let output = run_tool(pool, session_id, &tool, &arguments).await;
            outbound
                .send(frame(
                    "tool_end",
                    [("tool", json!(tool)), ("output", json!(output))],
                ))
                .await
                .is_ok()
        }
        other => outbound.send(serialize_event(other)).await.is_ok(),
    }
}

/// Executes one agent tool-call bound to this connection's session id.
/// Failures degrade to a reported output string; they never tear the relay
/// down.
async fn run_tool(pool: &SqlitePool, session_id: &str, tool: &str, arguments: &Value) -> String {
    let result = match tool {
        "log_question" => {
            sessions::log_question(
                pool,
                session_id,
                arguments["question"].as_str().unwrap_or(""),
                arguments["category"].as_str().unwrap_or(""),
                arguments["difficulty"].as_str().unwrap_or(""),
            )
            .await
        }
        "log_evaluation" => {
            sessions::log_evaluation(
                pool,
                session_id,
                arguments["response"].as_str().unwrap_or(""),
                arguments["score"].as_f64().unwrap_or(0.0),
                arguments["feedback"].as_str().unwrap_or(""),
            )
            .await
        }
        "generate_report" => {
            let narrative = serde_json::from_value(arguments.clone()).unwrap_or_default();
            sessions::generate_report(pool, session_id, &narrative).await
        }
        unknown => {
            log::warn!("Agent called unknown tool {unknown} in session {session_id}");
            return format!("Unknown tool: {unknown}");
        }
    };

    let output = match result {
        Ok(output) => output,
        Err(e) => {
            log::error!("Tool {tool} failed for session {session_id}: {e}");
            "Tool execution failed".to_string()
        }
    };

    let activity = json!({ "tool": tool, "arguments": arguments, "output": output });
    if let Err(e) = sessions::record_activity(pool, session_id, "tool_call", &activity).await {
        log::error!("Failed to record tool activity for {session_id}: {e}");
    }

    output
}

fn frame<const N: usize>(kind: &str, fields: [(&str, Value); N]) -> String {
    let mut body = Map::new();
    body.insert("type".to_string(), json!(kind));
    body.insert(
        "timestamp".to_string(),
        json!(chrono::Utc::now().timestamp_millis()),
    );
    for (key, value) in fields {
        body.insert(key.to_string(), value);
    }
    Value::Object(body).to_string()
}

fn serialize_event(event: SessionEvent) -> String {
    match event {
        SessionEvent::AgentStart { agent } => frame("agent_start", [("agent", json!(agent))]),
        SessionEvent::AgentEnd { agent } => frame("agent_end", [("agent", json!(agent))]),
        SessionEvent::Audio { data } => frame("audio", [("audio", json!(data))]),
        SessionEvent::AudioInterrupted => frame("audio_interrupted", []),
        SessionEvent::AudioEnd => frame("audio_end", []),
        SessionEvent::HistoryUpdated { history } => {
            frame("history_updated", [("history", history)])
        }
        SessionEvent::GuardrailTripped { guardrail } => frame(
            "guardrail_tripped",
            [("guardrail_results", json!([{ "name": guardrail }]))],
        ),
        SessionEvent::Error { message } => frame("error", [("error", json!(message))]),
        // Tool calls are intercepted in forward_event
        SessionEvent::ToolCall { tool, .. } => frame("tool_start", [("tool", json!(tool))]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_frame_parsing() {
        let audio: ClientFrame =
            serde_json::from_str(r#"{"type":"audio","data":[0,-32768,32767]}"#).unwrap();
        match audio {
            ClientFrame::Audio { data } => assert_eq!(data, vec![0, -32768, 32767]),
            other => panic!("unexpected frame: {other:?}"),
        }

        let text: ClientFrame =
            serde_json::from_str(r#"{"type":"text","content":"hello"}"#).unwrap();
        match text {
            ClientFrame::Text { content } => assert_eq!(content, "hello"),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_serialized_frames_carry_type_and_timestamp() {
        let raw = serialize_event(SessionEvent::AgentStart {
            agent: "Interviewer".to_string(),
        });
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["type"], "agent_start");
        assert_eq!(value["agent"], "Interviewer");
        assert!(value["timestamp"].is_i64());
    }
}
