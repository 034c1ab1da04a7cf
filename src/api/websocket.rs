use actix_web::{web, Error, HttpRequest, Responder};
use actix_ws::{self, Message};
use futures_util::StreamExt;
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::interval;

use crate::api::handlers::DispatcherData;
use crate::dispatch::{CaptureStatus, Dispatcher};
use crate::models::detail::EngineEvent;

// How often heartbeat pings are sent
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Events buffered per websocket client before it starts lagging
pub const EVENT_BUFFER: usize = 256;

/// Fan-out of engine events to websocket clients
pub type EventFeed = broadcast::Sender<EngineEvent>;

/// WebSocket message types that can be sent to clients
#[derive(Serialize)]
#[serde(tag = "type")]
enum WsOutMessage<'a> {
    #[serde(rename = "status")]
    Status { status: CaptureStatus },

    #[serde(rename = "event")]
    Event { event: &'a EngineEvent },

    #[serde(rename = "ping")]
    Ping { timestamp: u64 },
}

/// Forward engine events to the detail registry and to websocket clients
pub async fn pump_events(
    mut events: UnboundedReceiver<EngineEvent>,
    dispatcher: Arc<Dispatcher>,
    feed: EventFeed,
) {
    while let Some(event) = events.recv().await {
        debug!("Engine event: {:?}", event);
        dispatcher.handle_event(&event);
        // No subscribers is fine
        let _ = feed.send(event);
    }
    info!("Engine event channel closed");
}

/// Handle WebSocket connections
pub async fn ws_index(
    req: HttpRequest,
    body: web::Payload,
    dispatcher: DispatcherData,
    feed: web::Data<EventFeed>,
) -> Result<impl Responder, Error> {
    let addr = req
        .peer_addr()
        .map(|peer| peer.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    info!("WebSocket connection from: {}", addr);

    let (response, session, mut msg_stream) = actix_ws::handle(&req, body)?;
    let mut event_rx = feed.subscribe();
    let dispatcher = dispatcher.into_inner();

    actix_web::rt::spawn(async move {
        let started = Instant::now();
        let last_heartbeat = Arc::new(AtomicU64::new(0));

        let mut session_for_status = session.clone();
        if let Err(e) = send_status(&mut session_for_status, &dispatcher).await {
            warn!("Failed to send initial status: {}", e);
            return;
        }

        // Client messages: pings, close and "status" requests
        let ws_msg_task = {
            let mut session = session.clone();
            let last_heartbeat = last_heartbeat.clone();
            let dispatcher = dispatcher.clone();

            async move {
                while let Some(Ok(msg)) = msg_stream.next().await {
                    match msg {
                        Message::Ping(bytes) => {
                            last_heartbeat.store(started.elapsed().as_secs(), Ordering::SeqCst);
                            if session.pong(&bytes).await.is_err() {
                                break;
                            }
                        }
                        Message::Pong(_) => {
                            last_heartbeat.store(started.elapsed().as_secs(), Ordering::SeqCst);
                        }
                        Message::Text(text) => {
                            debug!("Received text message: {}", text);
                            if text.trim() == "status" {
                                if let Err(e) = send_status(&mut session, &dispatcher).await {
                                    warn!("Failed to send status: {}", e);
                                    break;
                                }
                            }
                        }
                        Message::Close(_) => {
                            info!("Client requested close");
                            break;
                        }
                        _ => {}
                    }
                }
            }
        };

        // Engine events
        let events_task = {
            let mut session = session.clone();

            async move {
                loop {
                    match event_rx.recv().await {
                        Ok(event) => {
                            let msg = WsOutMessage::Event { event: &event };
                            if let Ok(json) = serde_json::to_string(&msg) {
                                if session.text(json).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("WebSocket client lagging, {} events dropped", skipped);
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        };

        let heartbeat_task = {
            let mut session = session.clone();

            async move {
                let mut heartbeat = interval(HEARTBEAT_INTERVAL);
                loop {
                    heartbeat.tick().await;

                    let now = started.elapsed().as_secs();
                    let last = last_heartbeat.load(Ordering::SeqCst);
                    if now.saturating_sub(last) > HEARTBEAT_INTERVAL.as_secs() * 3 {
                        warn!("WebSocket client heartbeat timed out");
                        let _ = session.close(None).await;
                        break;
                    }

                    if session.ping(b"").await.is_err() {
                        break;
                    }
                    let ping_msg = WsOutMessage::Ping {
                        timestamp: chrono::Utc::now().timestamp() as u64,
                    };
                    if let Ok(json) = serde_json::to_string(&ping_msg) {
                        if session.text(json).await.is_err() {
                            break;
                        }
                    }
                }
            }
        };

        tokio::select! {
            _ = ws_msg_task => {},
            _ = events_task => {},
            _ = heartbeat_task => {},
        }

        info!("WebSocket connection closed");
    });

    Ok(response)
}

/// Send current status to WebSocket client
async fn send_status(
    session: &mut actix_ws::Session,
    dispatcher: &Arc<Dispatcher>,
) -> Result<(), actix_ws::Closed> {
    let dispatcher = dispatcher.clone();
    let status = match web::block(move || dispatcher.status()).await {
        Ok(status) => status,
        Err(e) => {
            warn!("Failed to collect status: {}", e);
            return Ok(());
        }
    };
    let msg = WsOutMessage::Status { status };
    if let Ok(json) = serde_json::to_string(&msg) {
        session.text(json).await?;
    }
    Ok(())
}
