//! # WebSocket Bridge Client
//!
//! Owns the single WebSocket connection to the counterpart process and drives
//! the protocol dispatcher from it.
//!
//! ## Connection Lifecycle:
//! ```text
//! Idle ──start()──▶ Connecting ──open──▶ Connected ──stop()──▶ Closing ──▶ Closed
//!                        │  │                 │                    ▲
//!                        │  └──stop()─────────┼────────────────────┘
//!                        └──connect error─────┴──transport error / server close──▶ Closed
//! ```
//! The task publishes `Closed` on every exit path, a panicking observer included.
//! A closed connection stays closed. The owner calls `start()` again to reconnect.
//!
//! ## Event Loop:
//! One tokio task per connection owns both socket halves and the dispatcher.
//! It waits on inbound frames and host commands at the same time, and finishes
//! each inbound frame (dispatch + acks flushed) before reading the next one.
//!
//! ## WebSocket Protocol:
//! 1. **Registration**: `{"name":"<client_name>"}` right after the socket opens
//! 2. **Streaming**: the counterpart sends `audio`, `audio_end`, `response_end`, `animation`
//! 3. **Acknowledgements**: sent back after each `audio_end`, `response_end`, `animation`
//! 4. **Animation end**: sent on host request via `send_animation_end()`

use crate::error::{BridgeError, BridgeResult};
use crate::protocol::dispatcher::ProtocolDispatcher;
use crate::protocol::messages::{Ack, Registration};
use crate::protocol::response::{Response, ResponseObservers, RetainedResponse};
use crate::state::BridgeState;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::{Arc, PoisonError};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Lifecycle state of the bridge connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection has been started
    Idle,
    /// Connection task spawned, handshake in flight
    Connecting,
    /// Socket open and registered; frames are being dispatched
    Connected,
    /// Shutdown requested, close frame being sent
    Closing,
    /// Connection is gone (shutdown, error, or server close)
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        }
    }
}

/// Requests from the host to the connection task.
#[derive(Debug)]
enum ControlCommand {
    /// Send `animation_end_ack`
    AnimationEnd,
    /// Close the connection
    Shutdown,
}

/// Host-facing handle to the bridge connection.
///
/// ## Usage:
/// ```rust,ignore
/// let mut client = BridgeClient::new(state);
/// client.on_response_ready(|response| println!("{:?}", response.text));
/// client.start()?;
/// // ...
/// client.stop().await;
/// ```
pub struct BridgeClient {
    /// Configuration and counters shared with the connection task
    state: BridgeState,

    /// Callbacks handed to each new connection's dispatcher
    observers: ResponseObservers,

    /// Last finalized response, kept across connections for late queries
    last_response: RetainedResponse,

    /// Current lifecycle state, observable from the host
    connection_state: Arc<watch::Sender<ConnectionState>>,

    /// Command channel into the live connection task
    control_tx: Option<mpsc::UnboundedSender<ControlCommand>>,

    /// The live connection task
    connection_handle: Option<JoinHandle<()>>,
}

impl BridgeClient {
    pub fn new(state: BridgeState) -> Self {
        let (connection_state, _) = watch::channel(ConnectionState::Idle);
        Self {
            state,
            observers: ResponseObservers::new(),
            last_response: RetainedResponse::default(),
            connection_state: Arc::new(connection_state),
            control_tx: None,
            connection_handle: None,
        }
    }

    /// Register a callback for finished responses.
    ///
    /// Takes effect for connections started after the call.
    pub fn on_response_ready<F>(&mut self, callback: F)
    where
        F: Fn(&Response) + Send + Sync + 'static,
    {
        self.observers.subscribe(callback);
    }

    /// Open the connection to the configured endpoint.
    ///
    /// ## State Transition:
    /// Idle/Closed → Connecting. The rest of the lifecycle runs on a spawned task.
    ///
    /// ## Errors:
    /// Fails if a connection is already connecting, connected or closing.
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> BridgeResult<()> {
        let current = self.state();
        if !matches!(current, ConnectionState::Idle | ConnectionState::Closed) {
            return Err(BridgeError::Transport(format!(
                "connection is already {}",
                current.as_str()
            )));
        }

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        self.connection_state.send_replace(ConnectionState::Connecting);

        let task = ConnectionTask {
            connection_id: Uuid::new_v4(),
            state: self.state.clone(),
            observers: self.observers.clone(),
            last_response: self.last_response.clone(),
            connection_state: self.connection_state.clone(),
            control_rx,
        };

        info!("Starting WebSocket...");
        self.control_tx = Some(control_tx);
        self.connection_handle = Some(tokio::spawn(task.run()));
        Ok(())
    }

    /// Close the connection and wait for the connection task to finish.
    ///
    /// Any response that has not been finalized by `response_end` is discarded.
    pub async fn stop(&mut self) {
        if let Some(control_tx) = self.control_tx.take() {
            let _ = control_tx.send(ControlCommand::Shutdown);
        }

        if let Some(handle) = self.connection_handle.take() {
            if let Err(err) = handle.await {
                error!("Connection task failed: {}", err);
                self.connection_state.send_replace(ConnectionState::Closed);
            }
        }
    }

    /// Tell the counterpart that an animation finished playing.
    pub fn send_animation_end(&self) -> BridgeResult<()> {
        let current = self.state();
        if current != ConnectionState::Connected {
            return Err(BridgeError::Transport(format!(
                "cannot send animation end while {}",
                current.as_str()
            )));
        }

        self.control_tx
            .as_ref()
            .ok_or_else(|| BridgeError::Transport("connection task is not running".to_string()))?
            .send(ControlCommand::AnimationEnd)
            .map_err(|_| BridgeError::Transport("connection task has exited".to_string()))
    }

    pub fn state(&self) -> ConnectionState {
        *self.connection_state.borrow()
    }

    /// Resolve once the connection reaches `Closed`.
    ///
    /// Never resolves for a client that was never started.
    pub async fn wait_closed(&self) {
        let mut rx = self.connection_state.subscribe();
        let _ = rx.wait_for(|s| *s == ConnectionState::Closed).await;
    }

    /// The most recently finalized response, if any.
    pub fn last_response(&self) -> Option<Response> {
        self.last_response
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Everything the spawned connection task owns.
struct ConnectionTask {
    connection_id: Uuid,
    state: BridgeState,
    observers: ResponseObservers,
    last_response: RetainedResponse,
    connection_state: Arc<watch::Sender<ConnectionState>>,
    control_rx: mpsc::UnboundedReceiver<ControlCommand>,
}

impl ConnectionTask {
    async fn run(mut self) {
        let _closed = ClosedOnExit {
            connection_id: self.connection_id,
            connection_state: self.connection_state.clone(),
        };

        let endpoint = self.state.config.bridge.endpoint.clone();
        info!(connection_id = %self.connection_id, "Connecting to {}", endpoint);

        let connect = connect_async(endpoint.as_str());
        tokio::pin!(connect);
        let ws_stream = loop {
            tokio::select! {
                result = &mut connect => match result {
                    Ok((ws_stream, _response)) => break ws_stream,
                    Err(err) => {
                        let err = BridgeError::from(err);
                        error!(connection_id = %self.connection_id, "WebSocket connection error: {}", err);
                        return;
                    }
                },
                command = self.control_rx.recv() => {
                    if self.shutdown_requested(command) {
                        info!(connection_id = %self.connection_id, "Shutdown requested during handshake");
                        return;
                    }
                }
            }
        };

        let (mut sink, source) = ws_stream.split();
        {
            let client_name = self.state.config.bridge.client_name.clone();
            let registration = register(&mut sink, client_name);
            tokio::pin!(registration);
            loop {
                tokio::select! {
                    result = &mut registration => match result {
                        Ok(()) => break,
                        Err(err) => {
                            error!(connection_id = %self.connection_id, "Registration failed: {}", err);
                            return;
                        }
                    },
                    command = self.control_rx.recv() => {
                        if self.shutdown_requested(command) {
                            info!(connection_id = %self.connection_id, "Shutdown requested during registration");
                            return;
                        }
                    }
                }
            }
        }

        self.set_state(ConnectionState::Connected);
        info!(connection_id = %self.connection_id, "WebSocket connected");

        self.event_loop(sink, source).await;
        info!(connection_id = %self.connection_id, "WebSocket closed");
    }

    /// Handle a host command that arrived before the socket is usable.
    ///
    /// Returns true when the task should give up on the connection.
    fn shutdown_requested(&self, command: Option<ControlCommand>) -> bool {
        match command {
            Some(ControlCommand::AnimationEnd) => {
                debug!(connection_id = %self.connection_id, "Ignoring animation end before connect");
                false
            }
            Some(ControlCommand::Shutdown) | None => {
                self.set_state(ConnectionState::Closing);
                true
            }
        }
    }

    async fn event_loop(&mut self, mut sink: WsSink, mut source: WsSource) {
        let (ack_tx, mut ack_rx) = mpsc::unbounded_channel();
        let mut dispatcher = ProtocolDispatcher::new(
            ack_tx,
            self.observers.clone(),
            self.last_response.clone(),
            self.state.clone(),
        );

        loop {
            tokio::select! {
                command = self.control_rx.recv() => {
                    match command {
                        Some(ControlCommand::AnimationEnd) => {
                            if let Ok(frame) = Ack::AnimationEnd.to_frame() {
                                send_frame(&mut sink, frame).await;
                            }
                        }
                        Some(ControlCommand::Shutdown) | None => {
                            self.set_state(ConnectionState::Closing);
                            info!(connection_id = %self.connection_id, "Closing WebSocket...");
                            dispatcher.discard_in_progress();
                            if let Err(err) = sink.send(Message::Close(None)).await {
                                warn!("Failed to send close frame: {}", err);
                            }
                            break;
                        }
                    }
                }

                message = source.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            dispatcher.handle_message(&text);
                            while let Ok(frame) = ack_rx.try_recv() {
                                send_frame(&mut sink, frame).await;
                            }
                        }
                        Some(Ok(Message::Binary(data))) => {
                            warn!("Ignoring {} byte binary frame", data.len());
                        }
                        Some(Ok(Message::Close(reason))) => {
                            info!("WebSocket closed by counterpart: {:?}", reason);
                            break;
                        }
                        Some(Ok(other)) => {
                            debug!("Ignoring control frame: {:?}", other);
                        }
                        Some(Err(err)) => {
                            let err = BridgeError::from(err);
                            error!(connection_id = %self.connection_id, "WebSocket connection error: {}", err);
                            break;
                        }
                        None => {
                            info!("WebSocket stream ended");
                            break;
                        }
                    }
                }
            }
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.connection_state.send_replace(next);
        debug!(
            connection_id = %self.connection_id,
            "Connection state {} -> {}",
            previous.as_str(),
            next.as_str()
        );
    }
}

/// Publishes `Closed` when the connection task ends, however it ends.
///
/// A panicking response observer unwinds through the task; the guard still runs.
struct ClosedOnExit {
    connection_id: Uuid,
    connection_state: Arc<watch::Sender<ConnectionState>>,
}

impl Drop for ClosedOnExit {
    fn drop(&mut self) {
        let previous = self.connection_state.send_replace(ConnectionState::Closed);
        if std::thread::panicking() {
            error!(
                connection_id = %self.connection_id,
                "Connection task panicked while {}",
                previous.as_str()
            );
        } else {
            debug!(
                connection_id = %self.connection_id,
                "Connection state {} -> closed",
                previous.as_str()
            );
        }
    }
}

/// Send the registration frame identifying this client.
async fn register(sink: &mut WsSink, client_name: String) -> BridgeResult<()> {
    let registration = Registration::new(client_name);
    let frame = serde_json::to_string(&registration)
        .map_err(|e| BridgeError::Transport(format!("cannot encode registration: {}", e)))?;
    sink.send(Message::Text(frame)).await?;
    Ok(())
}

/// Send one text frame. Fire-and-forget: failures are logged, not returned.
async fn send_frame(sink: &mut WsSink, frame: String) {
    if let Err(err) = sink.send(Message::Text(frame)).await {
        warn!("Failed to send frame: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::wave::tests::build_wav;
    use crate::config::AppConfig;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    fn client_for(endpoint: String) -> BridgeClient {
        let mut config = AppConfig::default();
        config.bridge.endpoint = endpoint;
        config.bridge.client_name = "TestClient".to_string();
        BridgeClient::new(BridgeState::new(config))
    }

    async fn next_text<S>(ws: &mut S) -> String
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return text,
                Some(Ok(_)) => continue,
                other => panic!("expected a text frame, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_end_to_end_exchange() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let wav = build_wav(1, 16000, &[0u8; 320], false);
        let (first, second) = wav.split_at(20);
        let chunks = vec![BASE64.encode(first), BASE64.encode(second)];

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

            assert_eq!(next_text(&mut ws).await, r#"{"name":"TestClient"}"#);

            for chunk in &chunks {
                let frame = format!(r#"{{"type":"audio","data":"{}"}}"#, chunk);
                ws.send(Message::Text(frame)).await.unwrap();
            }
            ws.send(Message::Text(r#"{"type":"audio_end","duration":"0.01"}"#.to_string()))
                .await
                .unwrap();
            assert!(next_text(&mut ws).await.contains("audio_end_ack"));

            ws.send(Message::Text(
                r#"{"type":"animation","facial_expression":"True","data":"smile"}"#.to_string(),
            ))
            .await
            .unwrap();
            assert!(next_text(&mut ws).await.contains("\"animation_ack\""));

            ws.send(Message::Text(
                r#"{"type":"animation","facial_expression":"False","data":"Hi!"}"#.to_string(),
            ))
            .await
            .unwrap();
            assert!(next_text(&mut ws).await.contains("\"animation_ack\""));

            ws.send(Message::Text(r#"{"type":"response_end"}"#.to_string()))
                .await
                .unwrap();
            assert!(next_text(&mut ws).await.contains("response_end_ack"));

            assert!(next_text(&mut ws).await.contains("animation_end_ack"));

            // Wait for the client's close frame
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_close() {
                    break;
                }
            }
        });

        let (response_tx, mut response_rx) = mpsc::unbounded_channel();
        let mut client = client_for(format!("ws://{}", addr));
        client.on_response_ready(move |response| {
            let _ = response_tx.send(response.clone());
        });
        client.start().unwrap();

        let text = timeout(Duration::from_secs(5), response_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(text.text.as_deref(), Some("Hi!"));

        let full = timeout(Duration::from_secs(5), response_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(full.audio_units.len(), 1);
        assert_eq!(full.audio_units[0].pcm().len(), 320);
        assert_eq!(full.durations, vec!["0.01".to_string()]);
        assert_eq!(full.animation_tags, vec!["smile".to_string()]);
        assert_eq!(client.last_response(), Some(full));
        assert_eq!(client.state(), ConnectionState::Connected);

        client.send_animation_end().unwrap();
        client.stop().await;
        assert_eq!(client.state(), ConnectionState::Closed);

        timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
        assert!(client.send_animation_end().is_err());
    }

    #[tokio::test]
    async fn test_connect_failure_closes_without_retry() {
        // Reserve a port, then free it so nothing is listening
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut client = client_for(format!("ws://{}", addr));
        assert_eq!(client.state(), ConnectionState::Idle);
        client.start().unwrap();
        assert!(client.start().is_err());

        timeout(Duration::from_secs(5), client.wait_closed())
            .await
            .unwrap();
        assert_eq!(client.state(), ConnectionState::Closed);
        assert!(client.send_animation_end().is_err());

        client.stop().await;
        assert_eq!(client.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_server_close_moves_to_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let _registration = next_text(&mut ws).await;
            ws.close(None).await.unwrap();
        });

        let mut client = client_for(format!("ws://{}", addr));
        client.start().unwrap();

        timeout(Duration::from_secs(5), client.wait_closed())
            .await
            .unwrap();
        assert_eq!(client.state(), ConnectionState::Closed);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_during_stalled_handshake() {
        // Accepts TCP but never answers the upgrade request
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (_tcp, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let mut client = client_for(format!("ws://{}", addr));
        client.start().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(client.state(), ConnectionState::Connecting);

        timeout(Duration::from_secs(3), client.stop())
            .await
            .expect("stop() should not wait for the handshake");
        assert_eq!(client.state(), ConnectionState::Closed);

        // A fresh connection can be started after the aborted one
        assert!(client.start().is_ok());
        client.stop().await;
        assert_eq!(client.state(), ConnectionState::Closed);

        server.abort();
    }

    #[tokio::test]
    async fn test_panicking_observer_still_publishes_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let _registration = next_text(&mut ws).await;
            ws.send(Message::Text(
                r#"{"type":"animation","facial_expression":"False","data":"boom"}"#.to_string(),
            ))
            .await
            .unwrap();
            // Drain until the client side goes away
            while let Some(Ok(_)) = ws.next().await {}
        });

        let mut client = client_for(format!("ws://{}", addr));
        client.on_response_ready(|response| {
            if response.text.as_deref() == Some("boom") {
                panic!("observer failed");
            }
        });
        client.start().unwrap();

        timeout(Duration::from_secs(5), client.wait_closed())
            .await
            .expect("wait_closed() should resolve after the task panics");
        assert_eq!(client.state(), ConnectionState::Closed);

        client.stop().await;
        assert_eq!(client.state(), ConnectionState::Closed);
        timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
    }
}
