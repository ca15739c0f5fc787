//! WebSocket endpoint for observers.
//!
//! Each connection is registered with the broadcast sink as a queued
//! observer channel. The connection task forwards queued frames to the
//! socket and answers `auth` messages; everything else the observer sends
//! is logged and ignored.

use crate::broadcast::BroadcastSink;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use fleetview_core::auth::handle_client_text;
use fleetview_env::{ObserverId, QueuedChannel};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Shared by every connection.
#[derive(Clone)]
pub struct ServerState {
    pub sink: Arc<BroadcastSink>,

    /// Frames buffered per observer before it is dropped as too slow
    pub queue_depth: usize,
}

/// Routes `/` and `/ws` to the observer socket handler.
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

/// Serves observers until the listener fails.
pub async fn serve(listener: TcpListener, state: ServerState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "WebSocket endpoint listening");
    }
    axum::serve(listener, router(state)).await
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: ServerState) {
    let (sender, receiver) = socket.split();
    run_connection(ObserverId::new(), sender, receiver, &state).await;
}

/// Drives one observer connection until either side goes away.
async fn run_connection<Tx, Rx, E>(id: ObserverId, mut tx: Tx, mut rx: Rx, state: &ServerState)
where
    Tx: Sink<Message> + Unpin,
    Tx::Error: Display,
    Rx: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let (channel, mut frames) = QueuedChannel::new(id, state.queue_depth);
    if let Err(e) = state.sink.register(Box::new(channel)) {
        warn!(observer = %id, error = %e, "Could not register observer");
        return;
    }

    loop {
        tokio::select! {
            biased;

            frame = frames.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = tx.send(Message::Text(frame.to_string())).await {
                        debug!(observer = %id, error = %e, "Socket write failed");
                        break;
                    }
                }
                // The sink dropped this observer
                None => break,
            },

            message = rx.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if !respond(&mut tx, id, &text).await {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(observer = %id, error = %e, "Socket read failed");
                    break;
                }
            },
        }
    }

    state.sink.unregister(id);
}

/// Answers one observer message. Returns false once the connection should close.
async fn respond<Tx>(tx: &mut Tx, id: ObserverId, text: &str) -> bool
where
    Tx: Sink<Message> + Unpin,
    Tx::Error: Display,
{
    let response = match handle_client_text(text) {
        Ok(response) => response,
        Err(e) => {
            warn!(observer = %id, error = %e, "Ignoring malformed observer message");
            return true;
        }
    };

    let reply = match response.reply.encode() {
        Ok(reply) => reply,
        Err(e) => {
            error!(observer = %id, error = %e, "Could not encode reply");
            return true;
        }
    };
    if tx.send(Message::Text(reply)).await.is_err() {
        return false;
    }

    if response.close {
        info!(observer = %id, "Rejected API key, closing connection");
        let _ = tx.send(Message::Close(None)).await;
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetview_core::protocol::{ObjectState, ServerMessage, SnapshotKind};
    use futures_util::stream;
    use std::convert::Infallible;
    use tokio::sync::mpsc;

    type Outbox = mpsc::UnboundedReceiver<Message>;

    fn state() -> ServerState {
        ServerState {
            sink: Arc::new(BroadcastSink::new()),
            queue_depth: 16,
        }
    }

    fn capture() -> (impl Sink<Message, Error = &'static str> + Unpin, Outbox) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let sink = futures_util::sink::unfold(out_tx, |out_tx, message: Message| async move {
            out_tx.send(message).map_err(|_| "outbox closed")?;
            Ok::<_, &'static str>(out_tx)
        });
        (Box::pin(sink), out_rx)
    }

    fn text(s: &str) -> Result<Message, Infallible> {
        Ok(Message::Text(s.to_string()))
    }

    fn drain(outbox: &mut Outbox) -> Vec<Message> {
        std::iter::from_fn(|| outbox.try_recv().ok()).collect()
    }

    fn decode(message: &Message) -> ServerMessage {
        match message {
            Message::Text(text) => ServerMessage::decode(text).unwrap(),
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connection_gets_init_then_auth_reply() {
        let state = state();
        let parked = ObjectState {
            id: "OBJ-0001".into(),
            lat: 50.45,
            lon: 30.52,
            heading: 0.0,
            speed: 40.0,
        };
        state.sink.set_baseline(10, vec![parked.clone()]);
        let (tx, mut outbox) = capture();
        let rx = stream::iter(vec![text(r#"{"type":"auth","apiKey":"abc"}"#)]);

        run_connection(ObserverId::from_seed(1), tx, rx, &state).await;

        let sent = drain(&mut outbox);
        assert_eq!(sent.len(), 2);
        assert_eq!(decode(&sent[0]), ServerMessage::snapshot(SnapshotKind::Init, 10, vec![parked]));
        assert_eq!(
            sent[1],
            Message::Text(r#"{"type":"auth","success":true}"#.to_string())
        );
        assert_eq!(state.sink.observer_count(), 0);
    }

    #[tokio::test]
    async fn test_rejected_key_closes_connection() {
        let state = state();
        let (tx, mut outbox) = capture();
        let rx = stream::iter(vec![text(r#"{"type":"auth","apiKey":""}"#)]).chain(stream::pending());

        run_connection(ObserverId::from_seed(2), tx, rx, &state).await;

        let sent = drain(&mut outbox);
        assert_eq!(
            sent[1],
            Message::Text(r#"{"type":"auth","success":false,"error":"Invalid API key"}"#.to_string())
        );
        assert_eq!(sent[2], Message::Close(None));
        assert_eq!(state.sink.observer_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_input_is_ignored() {
        let state = state();
        let (tx, mut outbox) = capture();
        let rx = stream::iter(vec![text("not json"), text(r#"{"type":"subscribe"}"#)]);

        run_connection(ObserverId::from_seed(3), tx, rx, &state).await;

        // Only the init frame went out
        assert_eq!(drain(&mut outbox).len(), 1);
    }

    #[tokio::test]
    async fn test_updates_are_forwarded_until_dropped() {
        let state = state();
        let (tx, mut outbox) = capture();
        let id = ObserverId::from_seed(4);

        let task_state = state.clone();
        let connection = tokio::spawn(async move {
            run_connection(id, tx, stream::pending::<Result<Message, Infallible>>(), &task_state).await;
        });

        let init = outbox.recv().await.unwrap();
        assert!(matches!(decode(&init), ServerMessage::Init(_)));

        let object = ObjectState {
            id: "OBJ-0001".into(),
            lat: 50.45,
            lon: 30.52,
            heading: 12.0,
            speed: 55.0,
        };
        state.sink.broadcast(77, vec![object.clone()]).unwrap();
        let update = outbox.recv().await.unwrap();
        assert_eq!(decode(&update), ServerMessage::snapshot(SnapshotKind::Update, 77, vec![object]));

        // Unregistering drops the queue, which ends the connection task
        assert!(state.sink.unregister(id));
        connection.await.unwrap();
    }
}
