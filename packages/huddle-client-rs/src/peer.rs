//! Per-remote negotiation state machine.
//!
//! One [`PeerSession`] exists per remote participant. It drives a
//! [`MediaSession`] (the actual media stack, injected as a trait object)
//! through offer/answer negotiation and queues ICE candidates that arrive
//! before the remote description is applied.
//!
//! Glare (both sides offering at once) is resolved deterministically: the
//! side with the lower participant id keeps its offer, the higher side
//! abandons its own and answers instead.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ClientError, Result};
use crate::stats::SessionStats;

/// Lifecycle of a single peer negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    /// No negotiation in flight.
    Idle,
    /// We sent an offer and are waiting for the answer.
    Offering,
    /// We received an offer and are producing the answer.
    Answering,
    /// Offer/answer completed; media is (or is becoming) live.
    Connected,
    /// The remote went away; the session is being torn down.
    Disconnected,
    /// Negotiation failed. Terminal: recovery is a fresh session, never
    /// renegotiation on this one.
    Failed,
    /// Torn down.
    Closed,
}

/// The media stack a peer session drives. Implemented over the real media
/// engine in production; tests substitute a scripted mock.
#[async_trait]
pub trait MediaSession: Send + Sync {
    /// Produce a local offer description.
    async fn create_offer(&self) -> Result<Value>;
    /// Produce a local answer description (remote offer already applied).
    async fn create_answer(&self) -> Result<Value>;
    /// Apply the remote description (offer or answer).
    async fn set_remote_description(&self, description: Value) -> Result<()>;
    /// Feed one remote ICE candidate.
    async fn add_ice_candidate(&self, candidate: Value) -> Result<()>;
    /// Release all resources for this session.
    async fn close(&self) -> Result<()>;
    /// Current transport stats for this session. Engines without stats
    /// support report nothing, which leaves the quality band unconstrained.
    async fn stats(&self) -> SessionStats {
        SessionStats::default()
    }
}

/// What the session wants sent to the remote as a result of a step.
#[derive(Debug, Clone, PartialEq)]
pub enum NegotiationAction {
    /// Send this offer description to the remote.
    SendOffer(Value),
    /// Send this answer description to the remote.
    SendAnswer(Value),
    /// Nothing to send.
    None,
}

/// Negotiation driver for one remote participant.
pub struct PeerSession {
    local_id: Uuid,
    remote_id: Uuid,
    media: Arc<dyn MediaSession>,
    state: NegotiationState,
    /// True once the remote description has been applied; gates candidate
    /// delivery.
    remote_description_set: bool,
    /// Candidates that arrived before the remote description, in arrival
    /// order.
    pending_candidates: VecDeque<Value>,
}

impl PeerSession {
    pub fn new(local_id: Uuid, remote_id: Uuid, media: Arc<dyn MediaSession>) -> Self {
        Self {
            local_id,
            remote_id,
            media,
            state: NegotiationState::Idle,
            remote_description_set: false,
            pending_candidates: VecDeque::new(),
        }
    }

    pub fn remote_id(&self) -> Uuid {
        self.remote_id
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn media(&self) -> Arc<dyn MediaSession> {
        Arc::clone(&self.media)
    }

    /// Start negotiation from our side. Valid only from `Idle`.
    pub async fn initiate(&mut self) -> Result<NegotiationAction> {
        if self.state != NegotiationState::Idle {
            return Err(ClientError::InvalidState(format!(
                "cannot initiate from {:?}",
                self.state
            )));
        }
        let offer = self.step(|media| async move { media.create_offer().await }).await?;
        self.state = NegotiationState::Offering;
        debug!(remote = %self.remote_id, "Peer: sent offer");
        Ok(NegotiationAction::SendOffer(offer))
    }

    /// Handle an incoming offer from the remote.
    ///
    /// From `Idle` this is the normal callee path. From `Offering` it is
    /// glare: the lower participant id wins, so if our id is lower we ignore
    /// the remote offer and keep waiting for their answer; if theirs is
    /// lower we abandon our offer and answer theirs.
    pub async fn handle_offer(&mut self, sdp: Value) -> Result<NegotiationAction> {
        match self.state {
            NegotiationState::Idle => {}
            NegotiationState::Offering => {
                if self.local_id < self.remote_id {
                    debug!(remote = %self.remote_id, "Peer: glare, our offer wins");
                    return Ok(NegotiationAction::None);
                }
                debug!(remote = %self.remote_id, "Peer: glare, yielding to remote offer");
            }
            other => {
                return Err(ClientError::InvalidState(format!(
                    "offer received in {other:?}"
                )));
            }
        }

        self.state = NegotiationState::Answering;
        self.apply_remote_description(sdp).await?;
        let answer = self
            .step(|media| async move { media.create_answer().await })
            .await?;
        self.state = NegotiationState::Connected;
        debug!(remote = %self.remote_id, "Peer: answered offer");
        Ok(NegotiationAction::SendAnswer(answer))
    }

    /// Handle the remote's answer to our offer. Valid only from `Offering`.
    pub async fn handle_answer(&mut self, sdp: Value) -> Result<NegotiationAction> {
        if self.state != NegotiationState::Offering {
            return Err(ClientError::InvalidState(format!(
                "answer received in {:?}",
                self.state
            )));
        }
        self.apply_remote_description(sdp).await?;
        self.state = NegotiationState::Connected;
        debug!(remote = %self.remote_id, "Peer: negotiation complete");
        Ok(NegotiationAction::None)
    }

    /// Feed a remote ICE candidate. Before the remote description is applied
    /// the candidate is queued; afterwards it goes straight to the media
    /// session. Queued candidates drain in arrival order.
    pub async fn handle_candidate(&mut self, candidate: Value) -> Result<()> {
        if matches!(
            self.state,
            NegotiationState::Failed | NegotiationState::Closed
        ) {
            debug!(remote = %self.remote_id, "Peer: dropping candidate for dead session");
            return Ok(());
        }
        if !self.remote_description_set {
            self.pending_candidates.push_back(candidate);
            return Ok(());
        }
        if let Err(e) = self.media.add_ice_candidate(candidate).await {
            self.fail().await;
            return Err(e);
        }
        Ok(())
    }

    /// Tear the session down (remote left, room ended, or caller leaving).
    pub async fn close(&mut self) {
        if self.state == NegotiationState::Closed {
            return;
        }
        self.state = NegotiationState::Disconnected;
        if let Err(e) = self.media.close().await {
            warn!(remote = %self.remote_id, "Peer: close reported error: {e}");
        }
        self.pending_candidates.clear();
        self.state = NegotiationState::Closed;
    }

    async fn apply_remote_description(&mut self, sdp: Value) -> Result<()> {
        if let Err(e) = self.media.set_remote_description(sdp).await {
            self.fail().await;
            return Err(e);
        }
        self.remote_description_set = true;
        while let Some(candidate) = self.pending_candidates.pop_front() {
            if let Err(e) = self.media.add_ice_candidate(candidate).await {
                self.fail().await;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Run one media operation, moving to `Failed` (with teardown) on error.
    async fn step<F, Fut>(&mut self, op: F) -> Result<Value>
    where
        F: FnOnce(Arc<dyn MediaSession>) -> Fut,
        Fut: std::future::Future<Output = Result<Value>>,
    {
        match op(Arc::clone(&self.media)).await {
            Ok(value) => Ok(value),
            Err(e) => {
                self.fail().await;
                Err(e)
            }
        }
    }

    async fn fail(&mut self) {
        warn!(remote = %self.remote_id, "Peer: negotiation failed, tearing down");
        self.state = NegotiationState::Failed;
        if let Err(e) = self.media.close().await {
            warn!(remote = %self.remote_id, "Peer: teardown reported error: {e}");
        }
        self.pending_candidates.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Scripted media session recording every call in order.
    #[derive(Default)]
    struct MockMedia {
        calls: Mutex<Vec<String>>,
        fail_on: Mutex<Option<String>>,
    }

    impl MockMedia {
        fn arc() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn failing_on(op: &str) -> Arc<Self> {
            let media = Self::default();
            *media.fail_on.lock().unwrap() = Some(op.to_string());
            Arc::new(media)
        }

        fn record(&self, call: String, op: &str) -> Result<()> {
            self.calls.lock().unwrap().push(call);
            if self.fail_on.lock().unwrap().as_deref() == Some(op) {
                return Err(ClientError::Media(format!("scripted failure in {op}")));
            }
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MediaSession for MockMedia {
        async fn create_offer(&self) -> Result<Value> {
            self.record("create_offer".into(), "create_offer")?;
            Ok(serde_json::json!({"type": "offer", "sdp": "mock-offer"}))
        }

        async fn create_answer(&self) -> Result<Value> {
            self.record("create_answer".into(), "create_answer")?;
            Ok(serde_json::json!({"type": "answer", "sdp": "mock-answer"}))
        }

        async fn set_remote_description(&self, description: Value) -> Result<()> {
            self.record(
                format!("set_remote({})", description["type"].as_str().unwrap_or("?")),
                "set_remote_description",
            )
        }

        async fn add_ice_candidate(&self, candidate: Value) -> Result<()> {
            self.record(
                format!("candidate({})", candidate["n"].as_i64().unwrap_or(-1)),
                "add_ice_candidate",
            )
        }

        async fn close(&self) -> Result<()> {
            self.record("close".into(), "close")
        }
    }

    fn low_high() -> (Uuid, Uuid) {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        if a < b { (a, b) } else { (b, a) }
    }

    #[tokio::test]
    async fn test_caller_path_offer_then_answer() {
        let media = MockMedia::arc();
        let (local, remote) = low_high();
        let mut peer = PeerSession::new(local, remote, media.clone());

        let action = peer.initiate().await.expect("initiate");
        assert!(matches!(action, NegotiationAction::SendOffer(_)));
        assert_eq!(peer.state(), NegotiationState::Offering);

        peer.handle_answer(serde_json::json!({"type": "answer", "sdp": "x"}))
            .await
            .expect("answer");
        assert_eq!(peer.state(), NegotiationState::Connected);
        assert_eq!(media.calls(), ["create_offer", "set_remote(answer)"]);
    }

    #[tokio::test]
    async fn test_callee_path_answers_incoming_offer() {
        let media = MockMedia::arc();
        let (local, remote) = low_high();
        let mut peer = PeerSession::new(local, remote, media.clone());

        let action = peer
            .handle_offer(serde_json::json!({"type": "offer", "sdp": "x"}))
            .await
            .expect("offer");
        assert!(matches!(action, NegotiationAction::SendAnswer(_)));
        assert_eq!(peer.state(), NegotiationState::Connected);
        assert_eq!(media.calls(), ["set_remote(offer)", "create_answer"]);
    }

    #[tokio::test]
    async fn test_early_candidates_queue_and_drain_in_order() {
        let media = MockMedia::arc();
        let (local, remote) = low_high();
        let mut peer = PeerSession::new(local, remote, media.clone());

        for n in 0..3 {
            peer.handle_candidate(serde_json::json!({"n": n}))
                .await
                .expect("queue");
        }
        // Nothing reached the media session yet.
        assert!(media.calls().is_empty());

        peer.handle_offer(serde_json::json!({"type": "offer", "sdp": "x"}))
            .await
            .expect("offer");
        // Queue drained in arrival order, before the answer was produced.
        assert_eq!(
            media.calls(),
            [
                "set_remote(offer)",
                "candidate(0)",
                "candidate(1)",
                "candidate(2)",
                "create_answer",
            ]
        );

        // Later candidates are applied immediately.
        peer.handle_candidate(serde_json::json!({"n": 3}))
            .await
            .expect("direct");
        assert_eq!(media.calls().last().map(String::as_str), Some("candidate(3)"));
    }

    #[tokio::test]
    async fn test_glare_lower_id_keeps_its_offer() {
        let media = MockMedia::arc();
        let (local, remote) = low_high();
        let mut peer = PeerSession::new(local, remote, media.clone());

        peer.initiate().await.expect("initiate");
        let action = peer
            .handle_offer(serde_json::json!({"type": "offer", "sdp": "theirs"}))
            .await
            .expect("glare");
        // Our id is lower: the remote offer is ignored, we still await their
        // answer.
        assert_eq!(action, NegotiationAction::None);
        assert_eq!(peer.state(), NegotiationState::Offering);

        peer.handle_answer(serde_json::json!({"type": "answer", "sdp": "x"}))
            .await
            .expect("answer");
        assert_eq!(peer.state(), NegotiationState::Connected);
    }

    #[tokio::test]
    async fn test_glare_higher_id_abandons_and_answers() {
        let media = MockMedia::arc();
        let (low, high) = low_high();
        let mut peer = PeerSession::new(high, low, media.clone());

        peer.initiate().await.expect("initiate");
        let action = peer
            .handle_offer(serde_json::json!({"type": "offer", "sdp": "theirs"}))
            .await
            .expect("glare");
        assert!(matches!(action, NegotiationAction::SendAnswer(_)));
        assert_eq!(peer.state(), NegotiationState::Connected);
    }

    #[tokio::test]
    async fn test_media_failure_tears_down_not_renegotiates() {
        let media = MockMedia::failing_on("set_remote_description");
        let (local, remote) = low_high();
        let mut peer = PeerSession::new(local, remote, media.clone());

        peer.initiate().await.expect("initiate");
        let err = peer
            .handle_answer(serde_json::json!({"type": "answer", "sdp": "x"}))
            .await
            .expect_err("must fail");
        assert!(matches!(err, ClientError::Media(_)));
        assert_eq!(peer.state(), NegotiationState::Failed);
        // Teardown released the media session.
        assert_eq!(media.calls().last().map(String::as_str), Some("close"));

        // Failed is terminal for negotiation traffic.
        assert!(peer
            .handle_answer(serde_json::json!({"type": "answer"}))
            .await
            .is_err());
        // Candidates for a dead session are dropped silently.
        peer.handle_candidate(serde_json::json!({"n": 9}))
            .await
            .expect("silent drop");
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let media = MockMedia::arc();
        let (local, remote) = low_high();
        let mut peer = PeerSession::new(local, remote, media.clone());

        peer.close().await;
        peer.close().await;
        assert_eq!(peer.state(), NegotiationState::Closed);
        assert_eq!(media.calls(), ["close"]);
    }
}
