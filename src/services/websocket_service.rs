use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    dto::ws::{ClientMessage, ServerMessage},
    services::session_service,
    state::{SharedState, identity::ConnectionId},
};

/// Handle the full lifecycle of a host or player WebSocket connection.
///
/// Every text frame is one client event; closing the socket is the `disconnect` event.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (connection, mut outbound_rx) = state.connections().register();
    let (control_tx, mut control_rx) = mpsc::unbounded_channel::<Message>();
    info!(%connection, "client connected");

    // Dedicated writer task keeps outbound frames flowing even while we await inbound ones.
    let writer_task = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                Some(message) = outbound_rx.recv() => match encode(&message) {
                    Some(frame) => frame,
                    None => continue,
                },
                Some(control) = control_rx.recv() => control,
                else => break,
            };
            if sender.send(frame).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                debug!(%connection, payload = %text, "received client message");
                match ClientMessage::from_json_str(&text) {
                    Ok(message) => {
                        session_service::handle_client_message(&state, connection, message).await
                    }
                    Err(err) => {
                        warn!(%connection, error = %err, "failed to parse or validate client message");
                        state
                            .connections()
                            .send(connection, ServerMessage::error(err.to_string()));
                    }
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = control_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(%connection, "client closed");
                let _ = control_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {
                state.connections().send(
                    connection,
                    ServerMessage::error("binary frames are not supported"),
                );
            }
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(%connection, error = %err, "websocket error");
                break;
            }
        }
    }

    session_service::handle_disconnect(&state, connection).await;
    info!(%connection, "client disconnected");

    finalize(writer_task, control_tx).await;
}

/// Serialize a frame. Serialization failures are permanent, so the frame is dropped.
fn encode(message: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(payload) => Some(Message::Text(payload.into())),
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{message:?}`");
            None
        }
    }
}

/// Ensure the writer task winds down before we return from the socket handler.
///
/// The outbound queue closed when the connection was unregistered; dropping the control
/// sender closes the other one.
async fn finalize(writer_task: JoinHandle<()>, control_tx: mpsc::UnboundedSender<Message>) {
    drop(control_tx);
    let _ = writer_task.await;
}
