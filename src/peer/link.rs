//! Машина состояний переговоров с одним пиром.
//!
//! Каждый линк это задача, которая владеет своим [`PeerLink`] и разбирает одну
//! упорядоченную очередь команд, поэтому offer/answer/кандидаты одного пира
//! никогда не перемешиваются. События транспорта (локальные кандидаты, удалённый
//! поток, состояние соединения) приходят в тот же цикл.

use crate::error::{LinkError, TransportError};
use crate::events::{EventSink, LinkEvent};
use crate::media::SharedMedia;
use crate::peer::fingerprint::link_fingerprint;
use crate::peer::ice::{analyze_candidates, apply_pending_candidates};
use crate::peer::state::{LinkSnapshot, PeerLink};
use crate::peer::transport::{PeerTransport, TransportEvent, TransportEvents, TransportFactory, TransportState};
use crate::peer::types::{IceCandidate, LinkState};
use crate::signaling::{OutboundSignal, SignalingChannel};
use crate::utils::random_id;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// Общие зависимости всех линков
pub struct LinkContext {
    pub transports: Arc<dyn TransportFactory>,
    pub media: Arc<SharedMedia>,
    pub signaling: Arc<dyn SignalingChannel>,
    pub events: EventSink,
    pub candidate_limit: usize,
}

pub(crate) enum LinkCommand {
    Originate,
    RemoteOffer(RTCSessionDescription),
    RemoteAnswer(RTCSessionDescription),
    RemoteCandidate(IceCandidate),
    Snapshot(oneshot::Sender<LinkSnapshot>),
}

/// Дешёвый клонируемый адрес работающего линка
#[derive(Clone)]
pub struct LinkHandle {
    peer: String,
    link_id: String,
    tx: mpsc::UnboundedSender<LinkCommand>,
    state: watch::Receiver<LinkState>,
}

impl fmt::Debug for LinkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkHandle")
            .field("peer", &self.peer)
            .field("link_id", &self.link_id)
            .field("state", &self.state())
            .finish()
    }
}

impl LinkHandle {
    pub(crate) fn spawn(peer: &str, ctx: Arc<LinkContext>) -> Self {
        let link_id = random_id();
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(LinkState::Idle);

        let actor = LinkActor {
            link: PeerLink::new(peer.to_string(), link_id.clone(), ctx.candidate_limit),
            ctx,
            state_tx,
            transport_events: None,
        };
        debug!(event = "link_spawned", peer, link_id = %link_id, "Spawned voice link");
        tokio::spawn(actor.run(rx));

        Self {
            peer: peer.to_string(),
            link_id,
            tx,
            state: state_rx,
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn link_id(&self) -> &str {
        &self.link_id
    }

    /// Последнее опубликованное состояние
    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    pub fn same_link(&self, other: &LinkHandle) -> bool {
        self.tx.same_channel(&other.tx)
    }

    /// Начать переговоры. На линке, который уже не `Idle`, ничего не делает
    pub fn originate(&self) -> bool {
        self.send(LinkCommand::Originate)
    }

    pub(crate) fn deliver_offer(&self, offer: RTCSessionDescription) -> bool {
        self.send(LinkCommand::RemoteOffer(offer))
    }

    pub(crate) fn deliver_answer(&self, answer: RTCSessionDescription) -> bool {
        self.send(LinkCommand::RemoteAnswer(answer))
    }

    pub(crate) fn deliver_candidate(&self, candidate: IceCandidate) -> bool {
        self.send(LinkCommand::RemoteCandidate(candidate))
    }

    /// Снимок после обработки всех ранее отправленных команд
    pub async fn snapshot(&self) -> Option<LinkSnapshot> {
        let (reply, rx) = oneshot::channel();
        if !self.send(LinkCommand::Snapshot(reply)) {
            return None;
        }
        rx.await.ok()
    }

    /// Ждёт `target` или `Failed`, что наступит раньше
    pub async fn wait_for(&self, target: LinkState) -> LinkState {
        let mut rx = self.state.clone();
        loop {
            let current = *rx.borrow_and_update();
            if current == target || current == LinkState::Failed {
                return current;
            }
            if rx.changed().await.is_err() {
                return *rx.borrow();
            }
        }
    }

    fn send(&self, cmd: LinkCommand) -> bool {
        if self.tx.send(cmd).is_err() {
            warn!(event = "link_gone", peer = %self.peer, "Voice link task has stopped");
            return false;
        }
        true
    }
}

struct LinkActor {
    link: PeerLink,
    ctx: Arc<LinkContext>,
    state_tx: watch::Sender<LinkState>,
    transport_events: Option<TransportEvents>,
}

async fn next_event(events: &mut Option<TransportEvents>) -> Option<TransportEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl LinkActor {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<LinkCommand>) {
        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => break,
                },
                event = next_event(&mut self.transport_events) => match event {
                    Some(event) => self.handle_transport_event(event).await,
                    None => self.transport_events = None,
                },
            }
        }
        self.shutdown().await;
    }

    async fn handle_command(&mut self, cmd: LinkCommand) {
        match cmd {
            LinkCommand::Originate => self.originate().await,
            LinkCommand::RemoteOffer(offer) => self.accept_offer(offer).await,
            LinkCommand::RemoteAnswer(answer) => self.accept_answer(answer).await,
            LinkCommand::RemoteCandidate(candidate) => self.add_remote_candidate(candidate).await,
            LinkCommand::Snapshot(reply) => {
                let _ = reply.send(self.link.snapshot());
            }
        }
    }

    // ========== OFFER SIDE ==========

    async fn originate(&mut self) {
        if self.link.state != LinkState::Idle {
            debug!(
                event = "originate_ignored",
                peer = %self.link.peer,
                state = %self.link.state,
                "Link already negotiating, originate ignored"
            );
            return;
        }

        // кандидаты, пришедшие до нашего offer, к этим переговорам не относятся
        let stale = self.link.pending_remote_candidates.drain();
        if !stale.is_empty() {
            debug!(
                event = "stale_candidates_dropped",
                peer = %self.link.peer,
                count = stale.len(),
                "Dropping candidates received before our offer"
            );
        }

        self.transition(LinkState::Offering);
        let transport = match self.open_transport().await {
            Ok(transport) => transport,
            Err(e) => return self.fail(e).await,
        };

        let offer = async {
            let offer = transport.create_offer().await?;
            transport.set_local_description(offer.clone()).await?;
            Ok::<_, TransportError>(offer)
        }
        .await;
        let offer = match offer {
            Ok(offer) => offer,
            Err(e) => {
                let err = self.negotiation_error("local offer", e);
                return self.fail(err).await;
            }
        };
        self.link.local_description = Some(offer.clone());

        let signal = OutboundSignal::Offer {
            to: self.link.peer.clone(),
            offer,
        };
        if let Err(e) = self.ctx.signaling.send(signal).await {
            let err = LinkError::Signaling {
                peer: self.link.peer.clone(),
                reason: e.to_string(),
            };
            return self.fail(err).await;
        }

        info!(event = "offer_sent", peer = %self.link.peer, "Sent WebRTC offer");
        self.transition(LinkState::OfferSent);
    }

    async fn accept_answer(&mut self, answer: RTCSessionDescription) {
        if self.link.state != LinkState::OfferSent {
            self.drop_unexpected("answer");
            return;
        }
        let Some(transport) = self.link.transport.clone() else {
            let err = LinkError::TransportUnavailable {
                peer: self.link.peer.clone(),
                reason: "offer sent without a transport".into(),
            };
            return self.fail(err).await;
        };

        if let Err(e) = transport.set_remote_description(answer.clone()).await {
            let err = self.negotiation_error("remote answer", e);
            return self.fail(err).await;
        }
        self.link.remote_description = Some(answer);
        self.flush_pending(transport.as_ref()).await;

        info!(event = "answer_applied", peer = %self.link.peer, "Received WebRTC answer");
        self.connected();
    }

    // ========== ANSWER SIDE ==========

    async fn accept_offer(&mut self, offer: RTCSessionDescription) {
        if self.link.state != LinkState::Idle {
            self.drop_unexpected("offer");
            return;
        }

        self.transition(LinkState::AnsweringOffer);
        let transport = match self.open_transport().await {
            Ok(transport) => transport,
            Err(e) => return self.fail(e).await,
        };

        if let Err(e) = transport.set_remote_description(offer.clone()).await {
            let err = self.negotiation_error("remote offer", e);
            return self.fail(err).await;
        }
        self.link.remote_description = Some(offer);

        // Применяем отложенные кандидаты
        self.flush_pending(transport.as_ref()).await;

        let answer = async {
            let answer = transport.create_answer().await?;
            transport.set_local_description(answer.clone()).await?;
            Ok::<_, TransportError>(answer)
        }
        .await;
        let answer = match answer {
            Ok(answer) => answer,
            Err(e) => {
                let err = self.negotiation_error("local answer", e);
                return self.fail(err).await;
            }
        };
        self.link.local_description = Some(answer.clone());

        let signal = OutboundSignal::Answer {
            to: self.link.peer.clone(),
            answer,
        };
        if let Err(e) = self.ctx.signaling.send(signal).await {
            let err = LinkError::Signaling {
                peer: self.link.peer.clone(),
                reason: e.to_string(),
            };
            return self.fail(err).await;
        }

        info!(event = "answer_sent", peer = %self.link.peer, "Answered WebRTC offer");
        self.transition(LinkState::AnswerSent);
    }

    // ========== CANDIDATES ==========

    async fn add_remote_candidate(&mut self, candidate: IceCandidate) {
        if self.link.state == LinkState::Failed {
            debug!(event = "candidate_ignored", peer = %self.link.peer, "Link failed, candidate ignored");
            return;
        }

        // Если remote description уже установлен, применяем кандидат сразу
        if self.link.remote_description.is_some() {
            if let Some(transport) = self.link.transport.clone() {
                self.apply_candidate(transport.as_ref(), candidate).await;
                return;
            }
        }

        if self.link.pending_remote_candidates.push(candidate) {
            debug!(
                event = "candidate_queued",
                peer = %self.link.peer,
                pending = self.link.pending_remote_candidates.len(),
                "Remote description not set yet, queuing candidate"
            );
        } else {
            let err = LinkError::CandidateBufferFull {
                peer: self.link.peer.clone(),
                limit: self.link.pending_remote_candidates.limit(),
            };
            warn!(event = "candidate_buffer_full", peer = %self.link.peer, error = %err, "Dropping remote candidate");
            self.ctx.events.emit_dropped(err);
        }
    }

    async fn apply_candidate(&mut self, transport: &dyn PeerTransport, candidate: IceCandidate) {
        match transport.add_ice_candidate(candidate).await {
            Ok(()) => {
                self.link.applied_candidates += 1;
                debug!(event = "candidate_applied", peer = %self.link.peer, "Added remote ICE candidate");
            }
            Err(e) => self.reject_candidate(e.to_string()),
        }
    }

    async fn flush_pending(&mut self, transport: &dyn PeerTransport) {
        let outcome = apply_pending_candidates(
            &self.link.peer,
            transport,
            &mut self.link.pending_remote_candidates,
        )
        .await;
        self.link.applied_candidates += outcome.applied;
        for (_, reason) in outcome.rejected {
            self.reject_candidate(reason);
        }
    }

    fn reject_candidate(&self, reason: String) {
        let err = LinkError::CandidateApplicationFailed {
            peer: self.link.peer.clone(),
            reason,
        };
        warn!(event = "candidate_rejected", peer = %self.link.peer, error = %err, "Failed to add ICE candidate");
        self.ctx.events.emit(LinkEvent::CandidateRejected(err));
    }

    // ========== TRANSPORT ==========

    /// Берём микрофон (или работаем только на приём) и создаём транспорт
    async fn open_transport(&mut self) -> Result<Arc<dyn PeerTransport>, LinkError> {
        if let Some(transport) = &self.link.transport {
            return Ok(transport.clone());
        }

        let tracks = match self.ctx.media.tracks().await {
            Ok(tracks) => tracks,
            Err(e) => {
                warn!(event = "receive_only", peer = %self.link.peer, error = %e, "Continuing without local audio");
                self.ctx.events.emit(LinkEvent::MediaDenied {
                    peer: self.link.peer.clone(),
                    reason: e.to_string(),
                });
                Vec::new()
            }
        };

        let (transport, events) = self
            .ctx
            .transports
            .create(&self.link.peer)
            .await
            .map_err(|e| LinkError::TransportUnavailable {
                peer: self.link.peer.clone(),
                reason: e.to_string(),
            })?;
        self.link.transport = Some(transport.clone());
        self.transport_events = Some(events);

        let mut attached = 0;
        for track in tracks {
            match transport.add_track(track).await {
                Ok(()) => attached += 1,
                Err(e) => {
                    warn!(event = "track_not_attached", peer = %self.link.peer, error = %e, "Failed to attach local track")
                }
            }
        }
        self.link.receive_only = attached == 0;
        Ok(transport)
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::LocalCandidate(candidate) => {
                if self.link.state == LinkState::Failed {
                    return;
                }
                self.link.local_candidates.push(candidate.clone());
                let signal = OutboundSignal::IceCandidate {
                    to: self.link.peer.clone(),
                    candidate,
                };
                if let Err(e) = self.ctx.signaling.send(signal).await {
                    warn!(event = "candidate_not_sent", peer = %self.link.peer, error = %e, "Failed to send local candidate");
                }
            }
            TransportEvent::RemoteStream { stream_id, track_id } => {
                if self.link.remote_stream.is_some() {
                    debug!(event = "extra_remote_track", peer = %self.link.peer, track_id = %track_id, "Ignoring additional remote track");
                    return;
                }
                info!(event = "remote_stream", peer = %self.link.peer, stream_id = %stream_id, "Remote audio attached");
                self.link.remote_stream = Some(stream_id.clone());
                self.ctx.events.emit(LinkEvent::RemoteStream {
                    peer: self.link.peer.clone(),
                    stream_id,
                    track_id,
                });
            }
            TransportEvent::StateChanged(TransportState::Connected) => {
                if self.link.state == LinkState::AnswerSent {
                    self.connected();
                }
            }
            TransportEvent::StateChanged(TransportState::Failed) => {
                if self.link.state != LinkState::Failed {
                    let err = LinkError::TransportUnavailable {
                        peer: self.link.peer.clone(),
                        reason: "ICE connectivity failed".into(),
                    };
                    self.fail(err).await;
                }
            }
            TransportEvent::StateChanged(other) => {
                debug!(event = "transport_state", peer = %self.link.peer, state = ?other, "Transport state changed");
            }
        }
    }

    // ========== STATE ==========

    fn connected(&mut self) {
        let local = self.link.local_description.as_ref().map(|d| d.sdp.as_str());
        let remote = self.link.remote_description.as_ref().map(|d| d.sdp.as_str());
        self.link.fingerprint = match (local, remote) {
            (Some(local), Some(remote)) => link_fingerprint(local, remote),
            _ => None,
        };
        self.link.connected_at = Some(chrono::Utc::now());
        analyze_candidates(&self.link.peer, &self.link.local_candidates);
        self.transition(LinkState::Connected);
    }

    fn transition(&mut self, state: LinkState) {
        let from = self.link.state;
        self.link.state = state;
        self.state_tx.send_replace(state);
        info!(event = "link_state", peer = %self.link.peer, from = %from, to = %state, "Link state changed");
        self.ctx.events.emit_state(&self.link.peer, state);
    }

    fn negotiation_error(&self, stage: &'static str, e: TransportError) -> LinkError {
        LinkError::NegotiationDescriptionError {
            peer: self.link.peer.clone(),
            stage,
            reason: e.to_string(),
        }
    }

    fn drop_unexpected(&self, kind: &'static str) {
        let err = LinkError::UnexpectedMessage {
            peer: self.link.peer.clone(),
            kind,
            state: self.link.state.to_string(),
        };
        warn!(event = "signal_dropped", peer = %self.link.peer, error = %err, "Dropping signaling message");
        self.ctx.events.emit_dropped(err);
    }

    async fn fail(&mut self, error: LinkError) {
        debug_assert!(error.is_fatal(), "non-fatal error escalated: {error}");
        error!(event = "link_failed", peer = %self.link.peer, error = %error, "Voice link failed");
        self.transition(LinkState::Failed);
        self.ctx.events.emit_failed(&self.link.peer, error);

        self.link.pending_remote_candidates.drain();
        self.transport_events = None;
        if let Some(transport) = self.link.transport.take() {
            if let Err(e) = transport.close().await {
                debug!(event = "transport_close_failed", peer = %self.link.peer, error = %e, "Failed to close transport");
            }
        }
    }

    async fn shutdown(&mut self) {
        debug!(event = "link_stopped", peer = %self.link.peer, link_id = %self.link.link_id, "Voice link stopped");
        if let Some(transport) = self.link.transport.take() {
            if let Err(e) = transport.close().await {
                debug!(event = "transport_close_failed", peer = %self.link.peer, error = %e, "Failed to close transport");
            }
        }
    }
}
