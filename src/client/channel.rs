use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{sleep, Instant},
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::models::websocket::{ClientMessage, FanOutEvent, ServerMessage};

// Pings will be sent every PING_INTERVAL
const PING_INTERVAL: Duration = Duration::from_secs(10);
// If the interval between two pongs is more than DISCONNECT_INTERVAL, disconnect
const DISCONNECT_INTERVAL: Duration = Duration::from_secs(20);

/// What the push channel reports to a sync client.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelSignal {
    Connected,
    Disconnected,
    Event(FanOutEvent),
}

/// Outbound half of a channel. Sends never wait on the network; a message
/// queued while the transport is down is dropped on reconnect.
#[derive(Debug, Clone)]
pub struct ChannelLink {
    outbound: mpsc::UnboundedSender<ClientMessage>,
}

impl ChannelLink {
    pub fn new(outbound: mpsc::UnboundedSender<ClientMessage>) -> Self {
        Self { outbound }
    }

    pub fn join(&self, room_key: &str) {
        self.send(ClientMessage::Join {
            room_key: room_key.to_string(),
        });
    }

    pub fn leave(&self, room_key: &str) {
        self.send(ClientMessage::Leave {
            room_key: room_key.to_string(),
        });
    }

    fn send(&self, message: ClientMessage) {
        if self.outbound.send(message).is_err() {
            debug!("Channel transport is gone, dropping outbound message");
        }
    }
}

/// Websocket transport for the comment channel.
///
/// Keeps one connection open, reconnecting after `reconnect_delay` whenever
/// it drops or the server stops answering pings, and reports each
/// connected/disconnected transition once.
pub struct WsChannel;

impl WsChannel {
    pub fn spawn(
        url: impl Into<String>,
        reconnect_delay: Duration,
    ) -> (ChannelLink, mpsc::UnboundedReceiver<ChannelSignal>, JoinHandle<()>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let url = url.into();

        let task = tokio::spawn(run_feed(url, reconnect_delay, outbound_rx, signal_tx));
        (ChannelLink::new(outbound_tx), signal_rx, task)
    }
}

async fn run_feed(
    url: String,
    reconnect_delay: Duration,
    mut outbound: mpsc::UnboundedReceiver<ClientMessage>,
    signals: mpsc::UnboundedSender<ChannelSignal>,
) {
    let mut first_attempt = true;
    // Set once Disconnected is reported; a connection loss always reports it.
    let mut down_reported = false;

    'reconnect: loop {
        match first_attempt {
            true => first_attempt = false,
            false => sleep(reconnect_delay).await,
        }

        if signals.is_closed() {
            return;
        }

        let sock = match connect_async(url.as_str()).await {
            Ok((sock, _)) => sock,
            Err(e) => {
                debug!("Comment channel connect to {} failed: {}", url, e);
                // Report the first failure so a fresh client stops waiting.
                if !down_reported {
                    down_reported = true;
                    if signals.send(ChannelSignal::Disconnected).is_err() {
                        return;
                    }
                }
                continue 'reconnect;
            }
        };
        let (mut ws_tx, mut ws_rx) = sock.split();

        // Joins queued for an earlier connection are stale.
        while outbound.try_recv().is_ok() {}

        info!("Connected to comment channel at {}", url);
        if signals.send(ChannelSignal::Connected).is_err() {
            return;
        }

        let mut next_ping = Instant::now() + PING_INTERVAL;
        let mut last_pong = Instant::now();
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(last_pong + DISCONNECT_INTERVAL) => {
                    warn!("Comment channel stopped answering pings");
                    break;
                }
                _ = tokio::time::sleep_until(next_ping) => {
                    if send_message(&mut ws_tx, &ClientMessage::Ping).await.is_err() {
                        break;
                    }
                    next_ping += PING_INTERVAL;
                }
                message = outbound.recv() => {
                    let Some(message) = message else {
                        // Every link dropped: nobody will send again.
                        let _ = ws_tx.close().await;
                        return;
                    };
                    if send_message(&mut ws_tx, &message).await.is_err() {
                        break;
                    }
                }
                incoming = ws_rx.next() => {
                    let text = match incoming {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            debug!("Comment channel read failed: {}", e);
                            break;
                        }
                    };

                    match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(ServerMessage::CommentNew(event)) => {
                            if signals.send(ChannelSignal::Event(event)).is_err() {
                                let _ = ws_tx.close().await;
                                return;
                            }
                        }
                        Ok(ServerMessage::Pong) => last_pong = Instant::now(),
                        Ok(ServerMessage::Connected { connection_id }) => {
                            debug!("Comment channel assigned connection {}", connection_id);
                        }
                        Ok(ServerMessage::Error { message }) => {
                            warn!("Comment channel error: {}", message);
                        }
                        Err(e) => warn!("Unreadable comment channel message: {}", e),
                    }
                }
            }
        }

        warn!("Lost comment channel connection");
        down_reported = true;
        if signals.send(ChannelSignal::Disconnected).is_err() {
            return;
        }
    }
}

async fn send_message<S>(ws_tx: &mut S, message: &ClientMessage) -> Result<(), ()>
where
    S: futures::Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let text = serde_json::to_string(message).map_err(|e| warn!("Failed to encode {:?}: {}", message, e))?;
    ws_tx
        .send(Message::Text(text))
        .await
        .map_err(|e| debug!("Comment channel write failed: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_queues_join_and_leave() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let link = ChannelLink::new(tx);

        link.join("b1");
        link.leave("b1");

        assert_eq!(
            rx.try_recv().unwrap(),
            ClientMessage::Join {
                room_key: "b1".to_string()
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            ClientMessage::Leave {
                room_key: "b1".to_string()
            }
        );
    }

    #[test]
    fn test_link_send_after_transport_gone_is_silent() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        ChannelLink::new(tx).leave("b1");
    }

    #[tokio::test]
    async fn test_unreachable_server_reports_disconnected() {
        let (_link, mut signals, task) = WsChannel::spawn("ws://127.0.0.1:1/api/blog/channel", Duration::from_millis(50));

        assert_eq!(signals.recv().await, Some(ChannelSignal::Disconnected));

        // Further failed attempts are not reported again.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(signals.try_recv().is_err());

        drop(signals);
        task.await.unwrap();
    }
}
