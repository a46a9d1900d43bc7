use thiserror::Error;

/// Ошибки захвата звука. Не фатальны: линк продолжает работать только на приём
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MediaError {
    #[error("media acquisition denied: {0}")]
    Denied(String),
    #[error("failed to write audio frame: {0}")]
    Write(String),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Rtc(#[from] webrtc::Error),
    #[error("transport rejected the request: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("signaling channel is closed")]
    Closed,
    #[error("malformed signaling frame: {0}")]
    Codec(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum LobbyError {
    #[error("register a username before inviting")]
    NotRegistered,
    #[error("cannot invite yourself")]
    SelfInvite,
    #[error(transparent)]
    Channel(#[from] SignalingError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("ICE server `{0}` has an empty url")]
    EmptyUrl(String),
    #[error("TURN server `{0}` requires username and credential")]
    MissingTurnCredentials(String),
    #[error("ICE server `{id}` has unknown type `{kind}`")]
    UnknownServerType { id: String, kind: String },
    #[error("max_pending_candidates must be positive")]
    ZeroCandidateLimit,
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Ошибки одного линка. Никогда не выходят за пределы своего пира
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("{kind} from `{peer}` dropped: no voice link for this peer")]
    UnknownPeerMessage { peer: String, kind: &'static str },
    #[error("{kind} from `{peer}` dropped: link is {state}")]
    UnexpectedMessage {
        peer: String,
        kind: &'static str,
        state: String,
    },
    #[error("candidate from `{peer}` rejected: {reason}")]
    CandidateApplicationFailed { peer: String, reason: String },
    #[error("candidate from `{peer}` dropped: {limit} candidates already pending")]
    CandidateBufferFull { peer: String, limit: usize },
    #[error("negotiation with `{peer}` failed at {stage}: {reason}")]
    NegotiationDescriptionError {
        peer: String,
        stage: &'static str,
        reason: String,
    },
    #[error("no media transport for `{peer}`: {reason}")]
    TransportUnavailable { peer: String, reason: String },
    #[error("signaling to `{peer}` failed: {reason}")]
    Signaling { peer: String, reason: String },
}

impl LinkError {
    /// Ошибка переводит линк в `Failed`
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LinkError::NegotiationDescriptionError { .. }
                | LinkError::TransportUnavailable { .. }
                | LinkError::Signaling { .. }
        )
    }
}
