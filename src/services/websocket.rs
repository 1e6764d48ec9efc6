use axum::extract::ws::{Message, WebSocket};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{
    error::{AppError, Result},
    models::websocket::{ClientMessage, ServerMessage},
    services::channel::ChannelHub,
};

/// WebSocket连接处理
///
/// One writer task drains the connection's queue; the reader applies
/// join/leave requests against the hub. Whichever side ends first tears the
/// connection down and removes it from every room.
#[derive(Clone)]
pub struct WebSocketService {
    hub: ChannelHub,
}

impl WebSocketService {
    pub fn new(hub: ChannelHub) -> Self {
        Self { hub }
    }

    pub fn hub(&self) -> &ChannelHub {
        &self.hub
    }

    /// 处理新的WebSocket连接
    pub async fn handle_connection(&self, websocket: WebSocket, connection_id: String) {
        info!("New WebSocket connection: {}", connection_id);

        let (mut ws_tx, mut ws_rx) = websocket.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

        if tx
            .send(ServerMessage::Connected {
                connection_id: connection_id.clone(),
            })
            .is_err()
        {
            return;
        }

        // 处理发送消息任务
        let connection_id_clone = connection_id.clone();
        let mut send_task = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match serde_json::to_string(&message) {
                    Ok(json_str) => {
                        if let Err(e) = ws_tx.send(Message::Text(json_str)).await {
                            debug!("Failed to send WebSocket message: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Failed to serialize message: {}", e);
                    }
                }
            }
            debug!("Send task ended for connection: {}", connection_id_clone);
        });

        // 处理接收消息任务
        let service = self.clone();
        let connection_id_clone = connection_id.clone();
        let mut receive_task = tokio::spawn(async move {
            while let Some(msg_result) = ws_rx.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => {
                        if let Err(e) = service.handle_incoming_message(&connection_id_clone, &tx, &text) {
                            warn!("Bad message from {}: {}", connection_id_clone, e);
                            let _ = tx.send(ServerMessage::Error {
                                message: e.to_string(),
                            });
                        }
                    }
                    Ok(Message::Close(_)) => {
                        info!("WebSocket connection closed: {}", connection_id_clone);
                        break;
                    }
                    Ok(Message::Binary(data)) => {
                        debug!("Ignoring binary message of {} bytes", data.len());
                    }
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                    Err(e) => {
                        debug!("WebSocket error for connection {}: {}", connection_id_clone, e);
                        break;
                    }
                }
            }
            debug!("Receive task ended for connection: {}", connection_id_clone);
        });

        // 任一方向结束即关闭连接
        tokio::select! {
            _ = &mut send_task => receive_task.abort(),
            _ = &mut receive_task => send_task.abort(),
        }

        self.hub.disconnect(&connection_id);
        info!("Unregistered connection: {}", connection_id);
    }

    /// 处理传入消息
    fn handle_incoming_message(
        &self,
        connection_id: &str,
        tx: &mpsc::UnboundedSender<ServerMessage>,
        text: &str,
    ) -> Result<()> {
        let message: ClientMessage = serde_json::from_str(text)
            .map_err(|e| AppError::BadRequest(format!("Invalid message: {}", e)))?;

        match message {
            ClientMessage::Join { room_key } => {
                if room_key.trim().is_empty() {
                    return Err(AppError::validation("roomKey is required"));
                }
                self.hub.join(connection_id, &room_key, tx.clone());
            }
            ClientMessage::Leave { room_key } => {
                self.hub.leave(connection_id, &room_key);
            }
            ClientMessage::Ping => {
                let _ = tx.send(ServerMessage::Pong);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incoming_join_leave_and_ping() {
        let service = WebSocketService::new(ChannelHub::new());
        let (tx, mut rx) = mpsc::unbounded_channel();

        service
            .handle_incoming_message("conn-1", &tx, r#"{"type":"join","roomKey":"b1"}"#)
            .unwrap();
        assert_eq!(service.hub().room_size("b1"), 1);

        service
            .handle_incoming_message("conn-1", &tx, r#"{"type":"ping"}"#)
            .unwrap();
        assert_eq!(rx.try_recv().unwrap(), ServerMessage::Pong);

        service
            .handle_incoming_message("conn-1", &tx, r#"{"type":"leave","roomKey":"b1"}"#)
            .unwrap();
        assert_eq!(service.hub().room_size("b1"), 0);
    }

    #[test]
    fn test_malformed_messages_are_rejected() {
        let service = WebSocketService::new(ChannelHub::new());
        let (tx, _rx) = mpsc::unbounded_channel();

        assert!(service.handle_incoming_message("c", &tx, "not json").is_err());
        assert!(service
            .handle_incoming_message("c", &tx, r#"{"type":"join","roomKey":" "}"#)
            .is_err());
    }
}
