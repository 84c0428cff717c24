//! WebSocket Event Channel
//!
//! ## Protocol
//!
//! 1. Client connects to `GET /ws` and the connection is upgraded
//! 2. Server registers an observer and sends `connected {observer_id}`
//! 3. Client sends `{"event", "data"}` frames (`join_disaster`, ...);
//!    they are handled in arrival order by the [`InboundRouter`]
//! 4. Server streams every event addressed to the observer
//! 5. On disconnect every topic membership is dropped

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use tracing::{debug, error, info, warn};

use crate::broadcaster::{Broadcaster, InboundRouter, SharedFrame};
use crate::events::{InboundFrame, ObserverId, WsEvent};

/// Upgrade handler for `GET /ws`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(broadcaster): State<Broadcaster>,
    State(router): State<Arc<InboundRouter>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, broadcaster, router))
}

/// Runs for the lifetime of one connection.
async fn handle_socket(socket: WebSocket, broadcaster: Broadcaster, router: Arc<InboundRouter>) {
    let (mut sender, mut receiver) = socket.split();
    let mut handle = broadcaster.register();
    let observer_id = handle.id;

    broadcaster.send_to(observer_id, WsEvent::Connected { observer_id });

    let inbound_broadcaster = broadcaster.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => {
                    debug!(observer_id = %observer_id, "Client sent close frame");
                    break;
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Ok(Message::Text(text)) => {
                    handle_text(&inbound_broadcaster, &router, observer_id, &text);
                }
                Ok(Message::Binary(data)) => {
                    debug!(
                        observer_id = %observer_id,
                        len = data.len(),
                        "Received binary message (ignored)"
                    );
                }
                Err(e) => {
                    warn!(observer_id = %observer_id, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            frame = handle.events.recv() => {
                let Some(frame) = frame else {
                    break;
                };
                if let Err(e) = send_frame(&mut sender, &frame).await {
                    error!(
                        observer_id = %observer_id,
                        error = %e,
                        "Failed to send event, closing connection"
                    );
                    break;
                }
            }

            _ = &mut recv_task => {
                debug!(observer_id = %observer_id, "Receiver task finished");
                break;
            }
        }
    }

    recv_task.abort();
    broadcaster.unregister(observer_id);
    info!(observer_id = %observer_id, "WebSocket disconnected");
}

/// Parse and route one text frame. Malformed or unknown frames are logged
/// and ignored; the connection stays open.
fn handle_text(
    broadcaster: &Broadcaster,
    router: &InboundRouter,
    observer_id: ObserverId,
    text: &str,
) {
    let frame = match InboundFrame::parse(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(observer_id = %observer_id, error = %e, "Malformed inbound frame ignored");
            return;
        }
    };
    if let Err(e) = router.dispatch(broadcaster, observer_id, &frame) {
        warn!(
            observer_id = %observer_id,
            event = %frame.event,
            error = %e,
            "Inbound event ignored"
        );
    }
}

async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    frame: &SharedFrame,
) -> Result<(), axum::Error> {
    let json = frame.to_json().map_err(|e| {
        error!(error = %e, "Failed to serialize event");
        axum::Error::new(e)
    })?;

    sender.send(Message::Text(json)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BroadcastConfig;
    use relief_core::Topic;

    #[test]
    fn test_text_frames_route_and_bad_frames_are_ignored() {
        let broadcaster = Broadcaster::new(&BroadcastConfig::default());
        let router = InboundRouter::standard();
        let handle = broadcaster.register();

        handle_text(&broadcaster, &router, handle.id, "{not json");
        handle_text(&broadcaster, &router, handle.id, r#"{"event":"nope","data":1}"#);
        assert!(broadcaster.topics_of(handle.id).is_empty());

        handle_text(&broadcaster, &router, handle.id, r#"{"event":"join_disaster","data":"d7"}"#);
        handle_text(&broadcaster, &router, handle.id, r#"{"event":"subscribe_updates"}"#);
        assert_eq!(
            broadcaster.topics_of(handle.id),
            vec![Topic::disaster("d7"), Topic::general_updates()]
        );
    }
}
