use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::config::RealtimeConfig;

/// Event taxonomy of the external realtime agent session. Audio payloads stay
/// base64-encoded PCM16 end to end.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    AgentStart {
        agent: String,
    },
    AgentEnd {
        agent: String,
    },
    /// A structured side-effecting invocation issued by the agent. The
    /// orchestrator executes it against the session's own durable record.
    ToolCall {
        tool: String,
        #[serde(default)]
        arguments: serde_json::Value,
    },
    Audio {
        #[serde(default)]
        data: String,
    },
    AudioInterrupted,
    AudioEnd,
    HistoryUpdated {
        #[serde(default)]
        history: serde_json::Value,
    },
    GuardrailTripped {
        #[serde(default)]
        guardrail: String,
    },
    Error {
        #[serde(default)]
        message: String,
    },
}

/// One live (or inert) agent conversation bound to a single interview.
#[async_trait]
pub trait RealtimeSession: Send {
    async fn send_audio(&mut self, pcm_base64: &str) -> anyhow::Result<()>;
    async fn send_text(&mut self, text: &str) -> anyhow::Result<()>;
    /// Next event from the agent; `None` means the agent closed the stream.
    async fn next_event(&mut self) -> Option<SessionEvent>;
    async fn close(&mut self) -> anyhow::Result<()>;
}

/// Factory selected by configuration at construction time.
#[async_trait]
pub trait RealtimeConnector: Send + Sync {
    async fn open(&self, session_id: &str) -> anyhow::Result<Box<dyn RealtimeSession>>;
}

pub fn build_connector(config: &RealtimeConfig) -> Arc<dyn RealtimeConnector> {
    match (&config.enabled, &config.endpoint) {
        (true, Some(endpoint)) => {
            log::info!("Realtime agent enabled, endpoint {endpoint}");
            Arc::new(LiveConnector {
                endpoint: endpoint.clone(),
                model: config
                    .model
                    .clone()
                    .unwrap_or_else(|| "gpt-4o-realtime-preview".to_string()),
            })
        }
        _ => {
            log::info!("Realtime agent disabled, interview channels run inert");
            Arc::new(NullConnector)
        }
    }
}

// ============ Live variant ============

pub struct LiveConnector {
    endpoint: String,
    model: String,
}

#[async_trait]
impl RealtimeConnector for LiveConnector {
    async fn open(&self, session_id: &str) -> anyhow::Result<Box<dyn RealtimeSession>> {
        let url = format!(
            "{}?session_id={}&model={}",
            self.endpoint, session_id, self.model
        );
        let (ws, _) = connect_async(&url).await?;
        log::info!("Realtime session opened for {session_id}");
        Ok(Box::new(LiveRealtimeSession { ws }))
    }
}

pub struct LiveRealtimeSession {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl LiveRealtimeSession {
    async fn send_frame(&mut self, frame: serde_json::Value) -> anyhow::Result<()> {
        self.ws.send(Message::Text(frame.to_string())).await?;
        Ok(())
    }
}

#[async_trait]
impl RealtimeSession for LiveRealtimeSession {
    async fn send_audio(&mut self, pcm_base64: &str) -> anyhow::Result<()> {
        self.send_frame(serde_json::json!({
            "type": "input_audio",
            "data": pcm_base64,
        }))
        .await
    }

    async fn send_text(&mut self, text: &str) -> anyhow::Result<()> {
        self.send_frame(serde_json::json!({
            "type": "input_text",
            "content": text,
        }))
        .await
    }

    async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            match self.ws.next().await? {
                Ok(Message::Text(raw)) => match serde_json::from_str(&raw) {
                    Ok(event) => return Some(event),
                    Err(e) => {
                        log::warn!("Unparseable realtime event, skipping: {e}");
                    }
                },
                Ok(Message::Close(_)) => return None,
                Ok(_) => {} // ping/pong/binary frames carry no events
                Err(e) => {
                    return Some(SessionEvent::Error {
                        message: format!("Realtime transport error: {e}"),
                    });
                }
            }
        }
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}

// ============ Null variant ============

/// Inert session for deployments without an agent backend: accepts input,
/// never produces events, closes cleanly.
pub struct NullConnector;

#[async_trait]
impl RealtimeConnector for NullConnector {
    async fn open(&self, session_id: &str) -> anyhow::Result<Box<dyn RealtimeSession>> {
        log::info!("Opened inert realtime session for {session_id}");
        Ok(Box::new(NullRealtimeSession))
    }
}

pub struct NullRealtimeSession;

#[async_trait]
impl RealtimeSession for NullRealtimeSession {
    async fn send_audio(&mut self, _pcm_base64: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn send_text(&mut self, _text: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn next_event(&mut self) -> Option<SessionEvent> {
        // Stays quiet until the relay task is cancelled from outside
        futures_util::future::pending::<()>().await;
        None
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}
