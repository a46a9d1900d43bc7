use crate::peer::ice::CandidateBuffer;
use crate::peer::transport::PeerTransport;
use crate::peer::types::{IceCandidate, LinkState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// ========== PER-PEER STATE ==========
/// Всё, что раньше жило в глобальных переменных, теперь принадлежит одному линку
/// и меняется только из его задачи.
pub struct PeerLink {
    pub peer: String,
    pub link_id: String,
    pub state: LinkState,
    pub local_description: Option<RTCSessionDescription>,
    pub remote_description: Option<RTCSessionDescription>,
    pub pending_remote_candidates: CandidateBuffer,
    pub transport: Option<Arc<dyn PeerTransport>>,
    /// Локальные кандидаты, отправленные собеседнику
    pub local_candidates: Vec<IceCandidate>,
    pub applied_candidates: usize,
    pub remote_stream: Option<String>,
    pub receive_only: bool,
    pub fingerprint: Option<String>,
    pub connected_at: Option<DateTime<Utc>>,
}

impl PeerLink {
    pub fn new(peer: String, link_id: String, candidate_limit: usize) -> Self {
        Self {
            peer,
            link_id,
            state: LinkState::Idle,
            local_description: None,
            remote_description: None,
            pending_remote_candidates: CandidateBuffer::new(candidate_limit),
            transport: None,
            local_candidates: Vec::new(),
            applied_candidates: 0,
            remote_stream: None,
            receive_only: false,
            fingerprint: None,
            connected_at: None,
        }
    }

    pub fn snapshot(&self) -> LinkSnapshot {
        LinkSnapshot {
            peer: self.peer.clone(),
            link_id: self.link_id.clone(),
            state: self.state,
            has_local_description: self.local_description.is_some(),
            has_remote_description: self.remote_description.is_some(),
            has_transport: self.transport.is_some(),
            pending_candidates: self.pending_remote_candidates.len(),
            applied_candidates: self.applied_candidates,
            local_candidates: self.local_candidates.len(),
            remote_stream: self.remote_stream.clone(),
            receive_only: self.receive_only,
            fingerprint: self.fingerprint.clone(),
            connected_at: self.connected_at,
        }
    }
}

/// Снимок линка для UI и диагностики
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct LinkSnapshot {
    pub peer: String,
    pub link_id: String,
    pub state: LinkState,
    pub has_local_description: bool,
    pub has_remote_description: bool,
    pub has_transport: bool,
    pub pending_candidates: usize,
    pub applied_candidates: usize,
    pub local_candidates: usize,
    pub remote_stream: Option<String>,
    pub receive_only: bool,
    pub fingerprint: Option<String>,
    pub connected_at: Option<DateTime<Utc>>,
}
