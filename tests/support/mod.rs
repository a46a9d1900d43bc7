#![allow(dead_code)]

use async_trait::async_trait;
use lobby_voice_lib::peer::{PeerTransport, TransportEvent, TransportEvents, TransportFactory, TransportState};
use lobby_voice_lib::{
    AudioConfig, IceCandidate, InboundSignal, LinkEvent, LinkHandle, LinkState, LobbyChannel, LocalTrack,
    MediaError, MediaSource, MicrophoneSource, OutboundSignal, SessionCoordinator, SignalingChannel,
    SignalingError, TransportError, VoiceConfig,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

pub const WAIT: Duration = Duration::from_secs(2);

pub fn sdp(kind: &str, body: &str) -> RTCSessionDescription {
    serde_json::from_value(json!({ "type": kind, "sdp": body })).unwrap()
}

pub fn host_candidate(n: usize) -> IceCandidate {
    IceCandidate::new(format!("candidate:{n} 1 udp 2122260223 10.0.0.{n} 900{n} typ host"))
}

// ========== TRANSPORT ==========

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    AddTrack,
    CreateOffer,
    CreateAnswer,
    SetLocal(String),
    SetRemote(String),
    AddCandidate(String),
    Close,
}

/// Записывает вызовы. Отклоняет описания с `malformed` и кандидаты с `bad`
pub struct FakeTransport {
    owner: String,
    ops: Mutex<Vec<Op>>,
    events: mpsc::UnboundedSender<TransportEvent>,
    gathered: AtomicUsize,
}

impl FakeTransport {
    fn record(&self, op: Op) {
        self.ops.lock().unwrap().push(op);
    }

    pub fn ops(&self) -> Vec<Op> {
        self.ops.lock().unwrap().clone()
    }

    pub fn applied_candidates(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::AddCandidate(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    pub fn report(&self, state: TransportState) {
        let _ = self.events.send(TransportEvent::StateChanged(state));
    }

    fn description(&self, kind: &str) -> RTCSessionDescription {
        sdp(
            kind,
            &format!("v=0\r\no={} 1 1 IN IP4 0.0.0.0\r\na=fingerprint:sha-256 {}\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\n", self.owner, self.owner),
        )
    }
}

#[async_trait]
impl PeerTransport for FakeTransport {
    async fn add_track(&self, _track: LocalTrack) -> Result<(), TransportError> {
        self.record(Op::AddTrack);
        Ok(())
    }

    async fn create_offer(&self) -> Result<RTCSessionDescription, TransportError> {
        self.record(Op::CreateOffer);
        Ok(self.description("offer"))
    }

    async fn create_answer(&self) -> Result<RTCSessionDescription, TransportError> {
        self.record(Op::CreateAnswer);
        Ok(self.description("answer"))
    }

    async fn set_local_description(&self, desc: RTCSessionDescription) -> Result<(), TransportError> {
        self.record(Op::SetLocal(desc.sdp_type.to_string()));
        let n = self.gathered.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.events.send(TransportEvent::LocalCandidate(host_candidate(n)));
        Ok(())
    }

    async fn set_remote_description(&self, desc: RTCSessionDescription) -> Result<(), TransportError> {
        if desc.sdp.contains("malformed") {
            return Err(TransportError::Rejected("unparseable session description".into()));
        }
        self.record(Op::SetRemote(desc.sdp_type.to_string()));
        let _ = self.events.send(TransportEvent::RemoteStream {
            stream_id: "remote-audio".into(),
            track_id: "audio".into(),
        });
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError> {
        if candidate.candidate.contains("bad") {
            return Err(TransportError::Rejected("invalid candidate".into()));
        }
        self.record(Op::AddCandidate(candidate.candidate));
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.record(Op::Close);
        Ok(())
    }
}

pub struct FakeFactory {
    owner: String,
    created: Mutex<Vec<(String, Arc<FakeTransport>)>>,
}

impl FakeFactory {
    pub fn new(owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
            created: Mutex::new(Vec::new()),
        }
    }

    pub fn count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    /// Последний транспорт, созданный для `peer`
    pub fn transport(&self, peer: &str) -> Option<Arc<FakeTransport>> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(p, _)| p == peer)
            .map(|(_, t)| t.clone())
    }
}

#[async_trait]
impl TransportFactory for FakeFactory {
    async fn create(&self, peer: &str) -> Result<(Arc<dyn PeerTransport>, TransportEvents), TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(FakeTransport {
            owner: self.owner.clone(),
            ops: Mutex::new(Vec::new()),
            events: tx,
            gathered: AtomicUsize::new(0),
        });
        self.created
            .lock()
            .unwrap()
            .push((peer.to_string(), transport.clone()));
        Ok((transport, rx))
    }
}

// ========== MEDIA ==========

pub struct FakeMedia {
    grant: bool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl MediaSource for FakeMedia {
    async fn acquire(&self) -> Result<Vec<LocalTrack>, MediaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.grant {
            MicrophoneSource::new(AudioConfig::default()).acquire().await
        } else {
            Err(MediaError::Denied("Permission denied".into()))
        }
    }
}

// ========== CHANNELS ==========

pub struct Outbox {
    tx: mpsc::UnboundedSender<OutboundSignal>,
}

#[async_trait]
impl SignalingChannel for Outbox {
    async fn send(&self, signal: OutboundSignal) -> Result<(), SignalingError> {
        self.tx.send(signal).map_err(|_| SignalingError::Closed)
    }
}

#[derive(Default)]
pub struct RecordingLobby {
    frames: Mutex<Vec<String>>,
}

impl RecordingLobby {
    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().unwrap().clone()
    }
}

#[async_trait]
impl LobbyChannel for RecordingLobby {
    async fn register(&self, username: &str) -> Result<(), SignalingError> {
        self.frames.lock().unwrap().push(format!("register:{username}"));
        Ok(())
    }

    async fn invite_friend(&self, to: &str, room_id: &str) -> Result<(), SignalingError> {
        self.frames.lock().unwrap().push(format!("invite:{to}:{room_id}"));
        Ok(())
    }

    async fn join_room(&self, room_id: &str) -> Result<(), SignalingError> {
        self.frames.lock().unwrap().push(format!("join:{room_id}"));
        Ok(())
    }

    async fn update_hero(&self, hero: &str) -> Result<(), SignalingError> {
        self.frames.lock().unwrap().push(format!("hero:{hero}"));
        Ok(())
    }
}

// ========== CLIENT ==========

pub struct Client {
    pub name: String,
    pub coordinator: SessionCoordinator,
    pub events: mpsc::UnboundedReceiver<LinkEvent>,
    pub outbox: mpsc::UnboundedReceiver<OutboundSignal>,
    pub factory: Arc<FakeFactory>,
    pub media: Arc<FakeMedia>,
    pub lobby: Arc<RecordingLobby>,
}

impl Client {
    pub async fn new(name: &str) -> Self {
        Self::with_media(name, true).await
    }

    pub async fn with_media(name: &str, grant: bool) -> Self {
        let factory = Arc::new(FakeFactory::new(name));
        let media = Arc::new(FakeMedia {
            grant,
            calls: AtomicUsize::new(0),
        });
        let lobby = Arc::new(RecordingLobby::default());
        let (tx, outbox) = mpsc::unbounded_channel();

        let (coordinator, events) = SessionCoordinator::build(
            &VoiceConfig::default(),
            factory.clone(),
            media.clone(),
            Arc::new(Outbox { tx }),
            lobby.clone(),
        );
        coordinator.register(name).await.unwrap();

        Self {
            name: name.to_string(),
            coordinator,
            events,
            outbox,
            factory,
            media,
            lobby,
        }
    }

    pub fn link(&self, peer: &str) -> LinkHandle {
        self.coordinator.link(peer).expect("no link for peer")
    }

    pub async fn next_signal(&mut self) -> OutboundSignal {
        timeout(WAIT, self.outbox.recv())
            .await
            .expect("timed out waiting for a signal")
            .expect("outbox closed")
    }

    pub fn drain_signals(&mut self) -> Vec<OutboundSignal> {
        let mut out = Vec::new();
        while let Ok(signal) = self.outbox.try_recv() {
            out.push(signal);
        }
        out
    }

    pub fn drain_events(&mut self) -> Vec<LinkEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    /// Доставляет сообщение так, как это сделал бы relay
    pub fn receive(&self, from: &str, signal: OutboundSignal) {
        let (to, inbound) = signal.deliver_from(from);
        assert_eq!(to, self.name, "signal addressed to someone else");
        self.coordinator.handle_signal(inbound);
    }

    pub fn receive_inbound(&self, signal: InboundSignal) {
        self.coordinator.handle_signal(signal);
    }
}

pub async fn wait(link: &LinkHandle, state: LinkState) -> LinkState {
    timeout(WAIT, link.wait_for(state))
        .await
        .expect("timed out waiting for link state")
}

pub fn states_for(events: &[LinkEvent], peer: &str) -> Vec<LinkState> {
    events
        .iter()
        .filter_map(|e| match e {
            LinkEvent::StateChanged { peer: p, state } if p == peer => Some(*state),
            _ => None,
        })
        .collect()
}
