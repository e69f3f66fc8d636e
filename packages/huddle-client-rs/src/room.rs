//! Room session orchestration.
//!
//! A [`RoomSession`] ties the pieces together for one joined room: it
//! listens to the signaling transport, maintains one [`PeerSession`] per
//! remote participant, routes negotiation traffic to the right peer, and
//! runs the connection-quality sampler. Non-negotiation events (roster
//! changes, chat, media toggles) are re-published to the application.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use huddle_common::event::SignalEvent;
use huddle_common::models::{ParticipantSummary, ParticipantType};
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ClientError, Result};
use crate::peer::{MediaSession, NegotiationAction, PeerSession};
use crate::stats::{QualityBand, QualityMonitor, SessionStats, StatsSource};
use crate::transport::SignalTransport;

const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(2_000);

/// Creates one media session per remote peer.
pub trait MediaFactory: Send + Sync {
    fn create(&self, remote_id: Uuid) -> Result<Arc<dyn MediaSession>>;
}

/// Events surfaced to the application (everything except the negotiation
/// traffic the session consumes itself).
#[derive(Debug, Clone)]
pub enum RoomUpdate {
    Joined,
    ParticipantJoined(ParticipantSummary),
    ParticipantLeft(Uuid),
    Chat(SignalEvent),
    Control(SignalEvent),
    RoomEnded,
    ServerError { code: u32, message: String },
}

type PeerMap = Arc<Mutex<HashMap<Uuid, PeerSession>>>;

/// One joined room: peer lifecycle, negotiation routing, quality sampling.
pub struct RoomSession {
    room_id: Uuid,
    local_id: Uuid,
    transport: Arc<SignalTransport>,
    factory: Arc<dyn MediaFactory>,
    peers: PeerMap,
    updates: broadcast::Sender<RoomUpdate>,
    joined_rx: watch::Receiver<bool>,
    monitor: QualityMonitor,
    event_loop: JoinHandle<()>,
}

impl RoomSession {
    /// Attach to an already-connected transport and announce the join.
    /// `local_id` is the participant record obtained from the snapshot API.
    pub fn join(
        transport: Arc<SignalTransport>,
        factory: Arc<dyn MediaFactory>,
        room_id: Uuid,
        local_id: Uuid,
        display_name: Option<String>,
        participant_type: ParticipantType,
    ) -> Result<Self> {
        let peers: PeerMap = Arc::new(Mutex::new(HashMap::new()));
        let (updates, _) = broadcast::channel(256);
        let (joined_tx, joined_rx) = watch::channel(false);

        let monitor = QualityMonitor::spawn(
            Arc::new(PeerStats {
                peers: Arc::clone(&peers),
            }),
            DEFAULT_SAMPLE_INTERVAL,
        );

        let event_loop = tokio::spawn(run_event_loop(
            transport.subscribe(),
            Arc::clone(&transport),
            Arc::clone(&factory),
            Arc::clone(&peers),
            updates.clone(),
            joined_tx,
            room_id,
            local_id,
        ));

        transport.send(SignalEvent::JoinRoom {
            room_id,
            participant_id: local_id,
            display_name,
            participant_type,
        })?;

        Ok(Self {
            room_id,
            local_id,
            transport,
            factory,
            peers,
            updates,
            joined_rx,
            monitor,
            event_loop,
        })
    }

    pub fn room_id(&self) -> Uuid {
        self.room_id
    }

    /// Subscribe to application-facing room updates.
    pub fn updates(&self) -> broadcast::Receiver<RoomUpdate> {
        self.updates.subscribe()
    }

    /// True once the server acknowledged the join.
    pub fn is_joined(&self) -> bool {
        *self.joined_rx.borrow()
    }

    /// Latest connection-quality band across all peer sessions.
    pub fn quality(&self) -> QualityBand {
        self.monitor.band()
    }

    pub fn quality_watch(&self) -> watch::Receiver<QualityBand> {
        self.monitor.watch()
    }

    /// Initiate negotiation with participants already in the room, as listed
    /// by the join-time snapshot. Existing members also offer on seeing our
    /// arrival; glare resolution keeps exactly one negotiation per pair.
    pub async fn offer_to_existing(&self, participants: &[Uuid]) -> Result<()> {
        for &remote in participants {
            if remote == self.local_id {
                continue;
            }
            start_peer(
                &self.transport,
                &self.factory,
                &self.peers,
                self.room_id,
                self.local_id,
                remote,
            )
            .await?;
        }
        Ok(())
    }

    pub fn send_chat(&self, content: impl Into<String>) -> Result<()> {
        self.transport.send(SignalEvent::ChatMessage {
            room_id: self.room_id,
            participant_id: self.local_id,
            content: content.into(),
            sender_name: None,
            sent_at: None,
        })
    }

    pub fn set_video(&self, enabled: bool) -> Result<()> {
        self.transport.send(SignalEvent::ToggleVideo {
            room_id: self.room_id,
            participant_id: self.local_id,
            video_enabled: enabled,
        })
    }

    pub fn set_audio(&self, enabled: bool) -> Result<()> {
        self.transport.send(SignalEvent::ToggleAudio {
            room_id: self.room_id,
            participant_id: self.local_id,
            audio_enabled: enabled,
        })
    }

    pub fn set_screen_share(&self, sharing: bool) -> Result<()> {
        let event = if sharing {
            SignalEvent::ScreenShareStart {
                room_id: self.room_id,
                participant_id: self.local_id,
            }
        } else {
            SignalEvent::ScreenShareStop {
                room_id: self.room_id,
                participant_id: self.local_id,
            }
        };
        self.transport.send(event)
    }

    /// Leave the room: announce the departure, then tear down every peer
    /// session and stop sampling. The transport stays connected for reuse.
    pub async fn leave(&self) {
        if let Err(e) = self.transport.send(SignalEvent::LeaveRoom {
            room_id: self.room_id,
            participant_id: self.local_id,
        }) {
            debug!("Room: leave not announced, transport down: {e}");
        }
        self.shutdown().await;
    }

    async fn shutdown(&self) {
        self.event_loop.abort();
        self.monitor.stop();
        let mut peers = self.peers.lock().await;
        for (_, mut peer) in peers.drain() {
            peer.close().await;
        }
        info!(room = %self.room_id, "Room: session closed");
    }
}

impl Drop for RoomSession {
    fn drop(&mut self) {
        self.event_loop.abort();
    }
}

/// Stats source over the live peer map.
struct PeerStats {
    peers: PeerMap,
}

#[async_trait]
impl StatsSource for PeerStats {
    async fn sample(&self) -> Vec<SessionStats> {
        let media: Vec<_> = {
            let peers = self.peers.lock().await;
            peers.values().map(|peer| peer.media()).collect()
        };
        let mut samples = Vec::with_capacity(media.len());
        for session in media {
            samples.push(session.stats().await);
        }
        samples
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_event_loop(
    mut events: broadcast::Receiver<SignalEvent>,
    transport: Arc<SignalTransport>,
    factory: Arc<dyn MediaFactory>,
    peers: PeerMap,
    updates: broadcast::Sender<RoomUpdate>,
    joined_tx: watch::Sender<bool>,
    room_id: Uuid,
    local_id: Uuid,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(missed = n, "Room: event stream lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return,
        };

        // Events for other rooms on a shared transport are not ours.
        if event_room(&event).is_some_and(|r| r != room_id) {
            continue;
        }

        match event {
            SignalEvent::Joined { .. } => {
                info!(room = %room_id, "Room: join acknowledged");
                joined_tx.send_replace(true);
                let _ = updates.send(RoomUpdate::Joined);
            }
            SignalEvent::ParticipantJoined { participant, .. } => {
                let remote_id = participant.id;
                let _ = updates.send(RoomUpdate::ParticipantJoined(participant));
                if let Err(e) =
                    start_peer(&transport, &factory, &peers, room_id, local_id, remote_id).await
                {
                    warn!(remote = %remote_id, "Room: failed to start peer: {e}");
                }
            }
            SignalEvent::ParticipantLeft { participant_id, .. } => {
                if let Some(mut peer) = peers.lock().await.remove(&participant_id) {
                    peer.close().await;
                }
                let _ = updates.send(RoomUpdate::ParticipantLeft(participant_id));
            }
            SignalEvent::Offer {
                participant_id: sender,
                sdp,
                ..
            } => {
                if let Err(e) =
                    route_offer(&transport, &factory, &peers, room_id, local_id, sender, sdp).await
                {
                    warn!(remote = %sender, "Room: offer handling failed: {e}");
                }
            }
            SignalEvent::Answer {
                participant_id: sender,
                sdp,
                ..
            } => {
                let mut peers = peers.lock().await;
                match peers.get_mut(&sender) {
                    Some(peer) => {
                        if let Err(e) = peer.handle_answer(sdp).await {
                            warn!(remote = %sender, "Room: answer handling failed: {e}");
                        }
                    }
                    None => debug!(remote = %sender, "Room: answer for unknown peer"),
                }
            }
            SignalEvent::IceCandidate {
                participant_id: sender,
                candidate,
                ..
            } => {
                let mut peers = peers.lock().await;
                match peers.get_mut(&sender) {
                    Some(peer) => {
                        if let Err(e) = peer.handle_candidate(candidate).await {
                            warn!(remote = %sender, "Room: candidate rejected: {e}");
                        }
                    }
                    None => debug!(remote = %sender, "Room: candidate for unknown peer"),
                }
            }
            event @ SignalEvent::ChatMessage { .. } => {
                let _ = updates.send(RoomUpdate::Chat(event));
            }
            event @ (SignalEvent::ToggleVideo { .. }
            | SignalEvent::ToggleAudio { .. }
            | SignalEvent::ScreenShareStart { .. }
            | SignalEvent::ScreenShareStop { .. }) => {
                let _ = updates.send(RoomUpdate::Control(event));
            }
            SignalEvent::RoomEnded { .. } => {
                info!(room = %room_id, "Room: ended by server");
                let mut peers = peers.lock().await;
                for (_, mut peer) in peers.drain() {
                    peer.close().await;
                }
                let _ = updates.send(RoomUpdate::RoomEnded);
                return;
            }
            SignalEvent::Error { code, message } => {
                warn!(code, %message, "Room: server error");
                let _ = updates.send(RoomUpdate::ServerError { code, message });
            }
            // Client → server kinds never arrive inbound.
            SignalEvent::JoinRoom { .. } | SignalEvent::LeaveRoom { .. } => {}
        }
    }
}

/// New remote participant: create a media session and send our offer.
async fn start_peer(
    transport: &SignalTransport,
    factory: &Arc<dyn MediaFactory>,
    peers: &PeerMap,
    room_id: Uuid,
    local_id: Uuid,
    remote_id: Uuid,
) -> Result<()> {
    let mut peers = peers.lock().await;
    if peers.contains_key(&remote_id) {
        debug!(remote = %remote_id, "Room: peer already exists");
        return Ok(());
    }
    let media = factory.create(remote_id)?;
    let mut peer = PeerSession::new(local_id, remote_id, media);
    let action = peer.initiate().await?;
    peers.insert(remote_id, peer);
    drop(peers);

    if let NegotiationAction::SendOffer(sdp) = action {
        transport.send(SignalEvent::Offer {
            room_id,
            participant_id: local_id,
            target_participant_id: Some(remote_id),
            sdp,
        })?;
    }
    Ok(())
}

/// Incoming offer: route to the existing peer (glare resolves inside it) or
/// create one for a remote we have not offered to yet.
async fn route_offer(
    transport: &SignalTransport,
    factory: &Arc<dyn MediaFactory>,
    peers: &PeerMap,
    room_id: Uuid,
    local_id: Uuid,
    sender: Uuid,
    sdp: serde_json::Value,
) -> Result<()> {
    let mut peers = peers.lock().await;
    if !peers.contains_key(&sender) {
        let media = factory.create(sender)?;
        peers.insert(sender, PeerSession::new(local_id, sender, media));
    }
    let peer = peers
        .get_mut(&sender)
        .ok_or_else(|| ClientError::Other("peer session vanished".into()))?;
    let action = peer.handle_offer(sdp).await?;
    drop(peers);

    if let NegotiationAction::SendAnswer(sdp) = action {
        transport.send(SignalEvent::Answer {
            room_id,
            participant_id: local_id,
            target_participant_id: Some(sender),
            sdp,
        })?;
    }
    Ok(())
}

fn event_room(event: &SignalEvent) -> Option<Uuid> {
    match event {
        SignalEvent::JoinRoom { room_id, .. }
        | SignalEvent::Joined { room_id, .. }
        | SignalEvent::LeaveRoom { room_id, .. }
        | SignalEvent::ParticipantJoined { room_id, .. }
        | SignalEvent::ParticipantLeft { room_id, .. }
        | SignalEvent::Offer { room_id, .. }
        | SignalEvent::Answer { room_id, .. }
        | SignalEvent::IceCandidate { room_id, .. }
        | SignalEvent::ToggleVideo { room_id, .. }
        | SignalEvent::ToggleAudio { room_id, .. }
        | SignalEvent::ScreenShareStart { room_id, .. }
        | SignalEvent::ScreenShareStop { room_id, .. }
        | SignalEvent::ChatMessage { room_id, .. }
        | SignalEvent::RoomEnded { room_id } => Some(*room_id),
        SignalEvent::Error { .. } => None,
    }
}
