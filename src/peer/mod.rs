pub mod connection;
pub mod fingerprint;
pub mod ice;
pub mod link;
pub mod state;
pub mod transport;
pub mod types;

pub use connection::{WebRtcTransport, WebRtcTransportFactory};
pub use link::{LinkContext, LinkHandle};
pub use state::LinkSnapshot;
pub use transport::{PeerTransport, TransportEvent, TransportEvents, TransportFactory, TransportState};
pub use types::{IceCandidate, LinkState, ServerConfig};
