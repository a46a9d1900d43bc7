//! Формат кадров relay и каналы, через которые ядро с ним говорит.
//!
//! Каждый кадр это `{"event": <name>, "data": {...}}`. Исходящий сигналинг
//! адресуется полем `to`; relay меняет его на `from` и пересылает payload как есть.

use crate::error::SignalingError;
use crate::peer::types::IceCandidate;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::trace;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

// ========== SIGNALING ==========

/// Сообщение сигналинга в том виде, в каком его отправляет клиент
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum OutboundSignal {
    Offer {
        to: String,
        offer: RTCSessionDescription,
    },
    Answer {
        to: String,
        answer: RTCSessionDescription,
    },
    IceCandidate {
        to: String,
        candidate: IceCandidate,
    },
}

/// Сообщение сигналинга в том виде, в каком его доставляет relay
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum InboundSignal {
    Offer {
        from: String,
        offer: RTCSessionDescription,
    },
    Answer {
        from: String,
        answer: RTCSessionDescription,
    },
    IceCandidate {
        from: String,
        candidate: IceCandidate,
    },
}

impl OutboundSignal {
    pub fn to(&self) -> &str {
        match self {
            OutboundSignal::Offer { to, .. }
            | OutboundSignal::Answer { to, .. }
            | OutboundSignal::IceCandidate { to, .. } => to,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OutboundSignal::Offer { .. } => "offer",
            OutboundSignal::Answer { .. } => "answer",
            OutboundSignal::IceCandidate { .. } => "ice-candidate",
        }
    }

    /// То же, что делает relay: меняем адрес, payload не трогаем.
    /// Возвращает получателя и сообщение, которое он увидит.
    pub fn deliver_from(self, from: &str) -> (String, InboundSignal) {
        let from = from.to_string();
        match self {
            OutboundSignal::Offer { to, offer } => (to, InboundSignal::Offer { from, offer }),
            OutboundSignal::Answer { to, answer } => (to, InboundSignal::Answer { from, answer }),
            OutboundSignal::IceCandidate { to, candidate } => {
                (to, InboundSignal::IceCandidate { from, candidate })
            }
        }
    }
}

impl InboundSignal {
    pub fn from(&self) -> &str {
        match self {
            InboundSignal::Offer { from, .. }
            | InboundSignal::Answer { from, .. }
            | InboundSignal::IceCandidate { from, .. } => from,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            InboundSignal::Offer { .. } => "offer",
            InboundSignal::Answer { .. } => "answer",
            InboundSignal::IceCandidate { .. } => "ice-candidate",
        }
    }
}

// ========== WIRE FRAMES ==========

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "event", content = "data")]
pub enum ClientFrame {
    #[serde(rename = "registerSocket")]
    RegisterSocket { username: String },
    #[serde(rename = "inviteFriend")]
    InviteFriend {
        #[serde(rename = "toUsername")]
        to_username: String,
        #[serde(rename = "roomId")]
        room_id: String,
    },
    #[serde(rename = "joinRoom")]
    JoinRoom { room: String },
    #[serde(rename = "updateHero")]
    UpdateHero { hero: String },
    #[serde(rename = "webrtc-offer")]
    Offer {
        to: String,
        offer: RTCSessionDescription,
    },
    #[serde(rename = "webrtc-answer")]
    Answer {
        to: String,
        answer: RTCSessionDescription,
    },
    #[serde(rename = "webrtc-ice")]
    IceCandidate { to: String, candidate: IceCandidate },
}

impl From<OutboundSignal> for ClientFrame {
    fn from(signal: OutboundSignal) -> Self {
        match signal {
            OutboundSignal::Offer { to, offer } => ClientFrame::Offer { to, offer },
            OutboundSignal::Answer { to, answer } => ClientFrame::Answer { to, answer },
            OutboundSignal::IceCandidate { to, candidate } => {
                ClientFrame::IceCandidate { to, candidate }
            }
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LobbyPlayer {
    pub username: String,
}

/// Время начала матча: сервер шлёт либо миллисекунды эпохи, либо RFC 3339
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(untagged)]
pub enum MatchTime {
    Millis(i64),
    Rfc3339(DateTime<Utc>),
}

impl MatchTime {
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        match self {
            MatchTime::Millis(ms) => DateTime::from_timestamp_millis(ms),
            MatchTime::Rfc3339(at) => Some(at),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "webrtc-offer")]
    Offer {
        from: String,
        offer: RTCSessionDescription,
    },
    #[serde(rename = "webrtc-answer")]
    Answer {
        from: String,
        answer: RTCSessionDescription,
    },
    #[serde(rename = "webrtc-ice")]
    IceCandidate {
        from: String,
        candidate: IceCandidate,
    },
    #[serde(rename = "friendInvite")]
    FriendInvite {
        from: String,
        #[serde(rename = "roomId")]
        room_id: String,
    },
    #[serde(rename = "info")]
    Info { msg: String },
    #[serde(rename = "lobbyUpdate")]
    LobbyUpdate {
        count: usize,
        #[serde(default)]
        players: Vec<LobbyPlayer>,
    },
    #[serde(rename = "matchCountdown")]
    MatchCountdown {
        #[serde(rename = "waitSec")]
        wait_sec: u64,
    },
    #[serde(rename = "matchStarted")]
    MatchStarted {
        #[serde(rename = "startedAt")]
        started_at: MatchTime,
    },
    #[serde(rename = "friendRequest")]
    FriendRequest { requester: String },
}

impl ServerEvent {
    pub fn decode(frame: &str) -> Result<Self, SignalingError> {
        Ok(serde_json::from_str(frame)?)
    }

    /// Сигналинговая часть события, либо само событие, если оно относится к лобби
    pub fn into_signal(self) -> Result<InboundSignal, ServerEvent> {
        match self {
            ServerEvent::Offer { from, offer } => Ok(InboundSignal::Offer { from, offer }),
            ServerEvent::Answer { from, answer } => Ok(InboundSignal::Answer { from, answer }),
            ServerEvent::IceCandidate { from, candidate } => {
                Ok(InboundSignal::IceCandidate { from, candidate })
            }
            other => Err(other),
        }
    }
}

// ========== CHANNELS ==========

#[async_trait]
pub trait SignalingChannel: Send + Sync {
    async fn send(&self, signal: OutboundSignal) -> Result<(), SignalingError>;
}

/// Лобби-часть сокета relay
#[async_trait]
pub trait LobbyChannel: Send + Sync {
    async fn register(&self, username: &str) -> Result<(), SignalingError>;
    async fn invite_friend(&self, to: &str, room_id: &str) -> Result<(), SignalingError>;
    async fn join_room(&self, room_id: &str) -> Result<(), SignalingError>;
    async fn update_hero(&self, hero: &str) -> Result<(), SignalingError>;
}

/// Кодирует кадры в JSON и передаёт их задаче, которая пишет в сокет
#[derive(Debug, Clone)]
pub struct RelaySender {
    tx: mpsc::UnboundedSender<String>,
}

impl RelaySender {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn send_frame(&self, frame: ClientFrame) -> Result<(), SignalingError> {
        let text = serde_json::to_string(&frame)?;
        trace!(event = "relay_frame_out", len = text.len(), "Queued relay frame");
        self.tx.send(text).map_err(|_| SignalingError::Closed)
    }
}

#[async_trait]
impl SignalingChannel for RelaySender {
    async fn send(&self, signal: OutboundSignal) -> Result<(), SignalingError> {
        trace!(event = "signal_out", kind = signal.kind(), to = signal.to(), "Relaying signaling message");
        self.send_frame(signal.into())
    }
}

#[async_trait]
impl LobbyChannel for RelaySender {
    async fn register(&self, username: &str) -> Result<(), SignalingError> {
        self.send_frame(ClientFrame::RegisterSocket {
            username: username.to_string(),
        })
    }

    async fn invite_friend(&self, to: &str, room_id: &str) -> Result<(), SignalingError> {
        self.send_frame(ClientFrame::InviteFriend {
            to_username: to.to_string(),
            room_id: room_id.to_string(),
        })
    }

    async fn join_room(&self, room_id: &str) -> Result<(), SignalingError> {
        self.send_frame(ClientFrame::JoinRoom {
            room: room_id.to_string(),
        })
    }

    async fn update_hero(&self, hero: &str) -> Result<(), SignalingError> {
        self.send_frame(ClientFrame::UpdateHero {
            hero: hero.to_string(),
        })
    }
}
