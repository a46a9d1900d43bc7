//! P2P голосовые линки для клиента лобби.
//!
//! Принятое приглашение превращается в обмен offer/answer через relay лобби;
//! после переговоров звук идёт напрямую между двумя клиентами.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod logger;
pub mod media;
pub mod peer;
pub mod registry;
pub mod session;
pub mod signaling;
pub mod utils;

pub use config::{AudioConfig, VoiceConfig};
pub use coordinator::SessionCoordinator;
pub use error::{ConfigError, LinkError, LobbyError, MediaError, SignalingError, TransportError};
pub use events::{EventSink, LinkEvent};
pub use media::{push_frame, LocalTrack, MediaSource, MicrophoneSource, SharedMedia};
pub use peer::{IceCandidate, LinkHandle, LinkSnapshot, LinkState};
pub use registry::PeerLinkRegistry;
pub use session::InviteSession;
pub use signaling::{InboundSignal, LobbyChannel, OutboundSignal, RelaySender, ServerEvent, SignalingChannel};
