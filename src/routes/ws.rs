use actix_web::{Error, HttpRequest, HttpResponse, get, web};
use actix_ws::Message;
use sqlx::SqlitePool;
use tokio::sync::mpsc;

use crate::auth::AuthTokens;
use crate::error::ApiError;
use crate::orchestrator::{ClientFrame, SessionRegistry};
use crate::realtime::RealtimeConnector;
use crate::sessions;

/// Upgrades the request to a websocket and bridges it onto the session's
/// relay: outbound event frames are pumped to the socket as text, inbound
/// text frames are parsed and handed to the registry.
#[get("/ws/{session_id}")]
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    path: web::Path<String>,
    pool: web::Data<SqlitePool>,
    tokens: web::Data<AuthTokens>,
    registry: web::Data<SessionRegistry>,
    connector: web::Data<dyn RealtimeConnector>,
) -> Result<HttpResponse, Error> {
    let username = tokens.require(&req)?;
    let session_id = path.into_inner();

    // Foreign session ids read as absent, matching the detail endpoint
    let owned = sessions::get_session(&pool, &session_id)
        .await
        .map_err(ApiError::from)?
        .is_some_and(|s| s.username == username);
    if !owned {
        return Err(ApiError::NotFound("Session not found".to_string()).into());
    }

    let (response, mut ws_session, mut msg_stream) = actix_ws::handle(&req, stream)?;

    // Outbound frames flow through a channel so the relay task never holds
    // the websocket session directly.
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(64);

    let inbound_tx = match registry
        .connect(&pool, connector.as_ref(), &session_id, outbound_tx)
        .await
    {
        Ok(tx) => tx,
        Err(e) => {
            log::warn!("Rejected websocket for session {session_id}: {e}");
            let _ = ws_session.close(None).await;
            return Ok(response);
        }
    };

    let mut pump_session = ws_session.clone();
    let pump = actix_web::rt::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if pump_session.text(frame).await.is_err() {
                break;
            }
        }
    });

    actix_web::rt::spawn(async move {
        while let Some(Ok(msg)) = msg_stream.recv().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientFrame>(&text) {
                    Ok(frame) => {
                        if inbound_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        log::debug!("Ignoring malformed client frame for {session_id}: {e}");
                    }
                },
                Message::Ping(bytes) => {
                    if ws_session.pong(&bytes).await.is_err() {
                        break;
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }

        registry.disconnect(&session_id).await;
        pump.abort();
        let _ = ws_session.close(None).await;
        log::info!("Websocket closed for session {session_id}");
    });

    Ok(response)
}
