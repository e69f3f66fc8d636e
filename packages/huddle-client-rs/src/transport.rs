//! Signaling transport — the persistent WebSocket connection and its
//! reconnection policy.
//!
//! The transport owns its own lifecycle, independent of any room or peer:
//!
//! ```text
//! DISCONNECTED → CONNECTING → CONNECTED
//!                                │ unexpected drop
//!                                ▼
//!                           RECONNECTING (exponential backoff)
//!                                │ attempts exhausted
//!                                ▼
//!                              ERROR (terminal, manual reset required)
//! ```
//!
//! An explicit `disconnect()` suppresses auto-retry and moves straight back
//! to `DISCONNECTED`. `reset()` recovers from `ERROR`.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use huddle_common::event::SignalEvent;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};

/// Transport-connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Reconnection attempts exhausted. Terminal until [`SignalTransport::reset`].
    Error,
}

/// Retry policy for unexpected connection drops.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// First retry delay; doubled on each subsequent attempt.
    pub base_delay: Duration,
    /// Backoff ceiling.
    pub max_delay: Duration,
    /// Attempts before entering the terminal error state.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(10_000),
            max_attempts: 5,
        }
    }
}

impl From<&huddle_common::config::ReconnectConfig> for ReconnectPolicy {
    fn from(config: &huddle_common::config::ReconnectConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            max_attempts: config.max_attempts,
        }
    }
}

/// Delay before reconnect attempt `attempt` (1-based): base × 2^(attempt−1),
/// capped at the policy maximum.
pub fn backoff_delay(attempt: u32, policy: &ReconnectPolicy) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    policy
        .base_delay
        .saturating_mul(2u32.saturating_pow(exponent))
        .min(policy.max_delay)
}

enum SessionEnd {
    /// Caller-initiated shutdown; no retry.
    Shutdown,
    /// The server went away after a successful connect.
    Dropped,
}

/// Async signaling transport with auto-reconnect.
///
/// Inbound events fan out through [`subscribe`](Self::subscribe); outbound
/// events queue through [`send`](Self::send) onto a single ordered channel,
/// so envelopes reach the wire in the order they were issued.
pub struct SignalTransport {
    url: String,
    policy: ReconnectPolicy,
    events: broadcast::Sender<SignalEvent>,
    outgoing_tx: mpsc::UnboundedSender<SignalEvent>,
    outgoing_rx: Arc<Mutex<mpsc::UnboundedReceiver<SignalEvent>>>,
    state_tx: watch::Sender<TransportState>,
    shutdown_tx: watch::Sender<bool>,
}

impl SignalTransport {
    pub fn new(url: impl Into<String>, policy: ReconnectPolicy) -> Self {
        let (events, _) = broadcast::channel(256);
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(TransportState::Disconnected);
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            url: url.into(),
            policy,
            events,
            outgoing_tx,
            outgoing_rx: Arc::new(Mutex::new(outgoing_rx)),
            state_tx,
            shutdown_tx,
        }
    }

    /// Subscribe to inbound signaling events.
    pub fn subscribe(&self) -> broadcast::Receiver<SignalEvent> {
        self.events.subscribe()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TransportState {
        *self.state_tx.borrow()
    }

    /// Observe lifecycle state changes.
    pub fn state_changes(&self) -> watch::Receiver<TransportState> {
        self.state_tx.subscribe()
    }

    /// Queue an event for delivery. Fails once the transport has gone to
    /// `Disconnected` or `Error`; while reconnecting, events queue and flush
    /// in order when the connection returns.
    pub fn send(&self, event: SignalEvent) -> Result<()> {
        match self.state() {
            TransportState::Disconnected => Err(ClientError::NotConnected),
            TransportState::Error => Err(ClientError::ReconnectExhausted {
                attempts: self.policy.max_attempts,
            }),
            _ => self
                .outgoing_tx
                .send(event)
                .map_err(|_| ClientError::NotConnected),
        }
    }

    /// Spawn the background task that maintains the connection. Returns
    /// immediately; use [`subscribe`](Self::subscribe) and
    /// [`state_changes`](Self::state_changes) to observe progress.
    pub fn connect(&self) -> Result<()> {
        if self.state() != TransportState::Disconnected {
            return Err(ClientError::Other(format!(
                "connect() requires the disconnected state, currently {:?}",
                self.state()
            )));
        }
        self.shutdown_tx.send_replace(false);
        self.state_tx.send_replace(TransportState::Connecting);

        let url = self.url.clone();
        let policy = self.policy.clone();
        let events = self.events.clone();
        let outgoing_rx = Arc::clone(&self.outgoing_rx);
        let state_tx = self.state_tx.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut attempts = 0u32;
            loop {
                match run_once(&url, &events, &outgoing_rx, &state_tx, &mut shutdown_rx).await {
                    Ok(SessionEnd::Shutdown) => {
                        info!("Transport: disconnected by caller");
                        state_tx.send_replace(TransportState::Disconnected);
                        return;
                    }
                    Ok(SessionEnd::Dropped) => {
                        // The connection had been established, so the retry
                        // budget starts over.
                        attempts = 1;
                    }
                    Err(e) => {
                        attempts += 1;
                        debug!("Transport: connection attempt failed: {e}");
                    }
                }

                if *shutdown_rx.borrow() {
                    state_tx.send_replace(TransportState::Disconnected);
                    return;
                }
                if attempts > policy.max_attempts {
                    warn!(
                        attempts = policy.max_attempts,
                        "Transport: reconnection attempts exhausted"
                    );
                    state_tx.send_replace(TransportState::Error);
                    return;
                }

                let delay = backoff_delay(attempts, &policy);
                warn!(
                    attempt = attempts,
                    ?delay,
                    "Transport: disconnected, retrying"
                );
                state_tx.send_replace(TransportState::Reconnecting);

                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            state_tx.send_replace(TransportState::Disconnected);
                            return;
                        }
                    }
                }
            }
        });

        Ok(())
    }

    /// Caller-initiated disconnect: suppresses auto-retry and moves to
    /// `Disconnected`.
    pub fn disconnect(&self) {
        self.shutdown_tx.send_replace(true);
        // If no background task is running (already terminal), settle the
        // state directly.
        if matches!(
            self.state(),
            TransportState::Disconnected | TransportState::Error
        ) {
            self.state_tx.send_replace(TransportState::Disconnected);
        }
    }

    /// Recover from the terminal `Error` state. Clears the retry budget and
    /// returns the transport to `Disconnected`, ready to connect again.
    pub fn reset(&self) -> Result<()> {
        if self.state() != TransportState::Error {
            return Err(ClientError::Other(
                "reset() is only valid from the error state".into(),
            ));
        }
        self.state_tx.send_replace(TransportState::Disconnected);
        Ok(())
    }
}

/// Run one connection until it ends. `Err` means the connect itself failed;
/// `Ok(Dropped)` means an established connection went away.
async fn run_once(
    url: &str,
    events: &broadcast::Sender<SignalEvent>,
    outgoing_rx: &Mutex<mpsc::UnboundedReceiver<SignalEvent>>,
    state_tx: &watch::Sender<TransportState>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Result<SessionEnd> {
    let (ws, _) = connect_async(url).await?;
    state_tx.send_replace(TransportState::Connected);
    info!(%url, "Transport: connected");

    let (mut sink, mut stream) = ws.split();
    let mut outgoing = outgoing_rx.lock().await;

    loop {
        tokio::select! {
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<SignalEvent>(&text) {
                        Ok(event) => {
                            let _ = events.send(event);
                        }
                        Err(e) => debug!("Transport: unparseable event: {e}"),
                    }
                }
                Some(Ok(Message::Close(_))) | None => return Ok(SessionEnd::Dropped),
                Some(Ok(_)) => {}
                Some(Err(_)) => return Ok(SessionEnd::Dropped),
            },
            queued = outgoing.recv() => {
                if let Some(event) = queued {
                    let text = serde_json::to_string(&event)?;
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        return Ok(SessionEnd::Dropped);
                    }
                }
            },
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Shutdown);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio::time::timeout;
    use uuid::Uuid;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn test_backoff_sequence_doubles_until_capped() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (1..=5)
            .map(|attempt| backoff_delay(attempt, &policy).as_millis() as u64)
            .collect();
        assert_eq!(delays, [1_000, 2_000, 4_000, 8_000, 10_000]);
        // Further attempts stay at the ceiling.
        assert_eq!(backoff_delay(6, &policy), Duration::from_millis(10_000));
        assert_eq!(backoff_delay(31, &policy), Duration::from_millis(10_000));
    }

    async fn wait_for_state(
        rx: &mut watch::Receiver<TransportState>,
        wanted: TransportState,
    ) -> bool {
        timeout(Duration::from_secs(5), async {
            loop {
                if *rx.borrow() == wanted {
                    return;
                }
                if rx.changed().await.is_err() {
                    return;
                }
            }
        })
        .await
        .is_ok()
    }

    #[tokio::test]
    async fn test_exhausted_retries_end_in_terminal_error() {
        // Grab a port with no listener behind it.
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let transport = SignalTransport::new(
            format!("ws://127.0.0.1:{port}"),
            ReconnectPolicy {
                base_delay: 2 * MS,
                max_delay: 8 * MS,
                max_attempts: 3,
            },
        );
        let mut states = transport.state_changes();
        transport.connect().expect("connect");

        assert!(wait_for_state(&mut states, TransportState::Error).await);
        // Terminal: sending surfaces the exhaustion, connecting again fails,
        // until reset.
        assert!(matches!(
            transport.send(SignalEvent::RoomEnded { room_id: Uuid::new_v4() }),
            Err(ClientError::ReconnectExhausted { attempts: 3 })
        ));
        assert!(transport.connect().is_err());

        transport.reset().expect("reset");
        assert_eq!(transport.state(), TransportState::Disconnected);
    }

    #[tokio::test]
    async fn test_reset_requires_error_state() {
        let transport = SignalTransport::new("ws://127.0.0.1:1", ReconnectPolicy::default());
        assert!(transport.reset().is_err());
    }

    #[tokio::test]
    async fn test_connect_send_receive_and_explicit_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();

        // Echo server: accepts one socket and mirrors text frames back.
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let ws = tokio_tungstenite::accept_async(stream).await.expect("ws");
            let (mut sink, mut stream) = ws.split();
            while let Some(Ok(msg)) = stream.next().await {
                if let Message::Text(text) = msg {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            }
        });

        let transport = SignalTransport::new(
            format!("ws://127.0.0.1:{port}"),
            ReconnectPolicy::default(),
        );
        let mut events = transport.subscribe();
        let mut states = transport.state_changes();
        transport.connect().expect("connect");
        assert!(wait_for_state(&mut states, TransportState::Connected).await);

        let room_id = Uuid::new_v4();
        transport
            .send(SignalEvent::ScreenShareStart {
                room_id,
                participant_id: Uuid::new_v4(),
            })
            .expect("send");

        let echoed = timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("echo in time")
            .expect("event");
        assert!(matches!(
            echoed,
            SignalEvent::ScreenShareStart { room_id: r, .. } if r == room_id
        ));

        // Explicit disconnect: no retry, straight to Disconnected.
        transport.disconnect();
        assert!(wait_for_state(&mut states, TransportState::Disconnected).await);
        assert!(matches!(
            transport.send(SignalEvent::RoomEnded { room_id }),
            Err(ClientError::NotConnected)
        ));
    }
}
