//! Граница между машиной состояний линка и WebRTC-стеком.

use crate::error::TransportError;
use crate::media::LocalTrack;
use crate::peer::types::IceCandidate;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// Состояние соединения, как его видит транспорт
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Что транспорт сообщает линку сам по себе
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    LocalCandidate(IceCandidate),
    RemoteStream { stream_id: String, track_id: String },
    StateChanged(TransportState),
}

pub type TransportEvents = mpsc::UnboundedReceiver<TransportEvent>;

#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn add_track(&self, track: LocalTrack) -> Result<(), TransportError>;
    async fn create_offer(&self) -> Result<RTCSessionDescription, TransportError>;
    async fn create_answer(&self) -> Result<RTCSessionDescription, TransportError>;
    async fn set_local_description(&self, desc: RTCSessionDescription) -> Result<(), TransportError>;
    async fn set_remote_description(&self, desc: RTCSessionDescription) -> Result<(), TransportError>;
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError>;
    async fn close(&self) -> Result<(), TransportError>;
}

/// Создаёт по транспорту на линк вместе с потоком его событий
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(&self, peer: &str) -> Result<(Arc<dyn PeerTransport>, TransportEvents), TransportError>;
}
