use crate::config::VoiceConfig;
use crate::error::TransportError;
use crate::logger::dump_candidate;
use crate::media::LocalTrack;
use crate::peer::transport::{PeerTransport, TransportEvent, TransportEvents, TransportFactory, TransportState};
use crate::peer::types::IceCandidate;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// Фабрика peer connection поверх webrtc-rs
pub struct WebRtcTransportFactory {
    api: API,
    ice_servers: Vec<RTCIceServer>,
}

impl WebRtcTransportFactory {
    pub fn new(config: &VoiceConfig) -> Result<Self, TransportError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self {
            api,
            ice_servers: config.rtc_ice_servers(),
        })
    }

    /// Создает конфигурацию для peer connection
    fn rtc_config(&self) -> RTCConfiguration {
        RTCConfiguration {
            ice_servers: self.ice_servers.clone(),
            bundle_policy: RTCBundlePolicy::MaxBundle,
            rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
            ..Default::default()
        }
    }
}

#[async_trait]
impl TransportFactory for WebRtcTransportFactory {
    async fn create(&self, peer: &str) -> Result<(Arc<dyn PeerTransport>, TransportEvents), TransportError> {
        let pc = Arc::new(self.api.new_peer_connection(self.rtc_config()).await?);
        let (tx, rx) = mpsc::unbounded_channel();

        // Обработчик для сбора локальных кандидатов
        let cand_tx = tx.clone();
        let cand_peer = peer.to_string();
        pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
            let tx = cand_tx.clone();
            let peer = cand_peer.clone();
            Box::pin(async move {
                match cand.map(|c| c.to_json()) {
                    Some(Ok(init)) => {
                        let candidate = IceCandidate::from(init);
                        dump_candidate("LOCAL", &peer, &candidate);
                        let _ = tx.send(TransportEvent::LocalCandidate(candidate));
                    }
                    Some(Err(e)) => {
                        warn!(event = "local_candidate_unserializable", peer = %peer, error = %e, "Failed to serialize local candidate");
                    }
                    // cand == None означает конец сбора
                    None => debug!(event = "ice_gathering_complete", peer = %peer, "ICE candidate gathering completed"),
                }
            })
        }));

        let track_tx = tx.clone();
        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>, _receiver: Arc<RTCRtpReceiver>, _transceiver: Arc<RTCRtpTransceiver>| {
                let _ = track_tx.send(TransportEvent::RemoteStream {
                    stream_id: track.stream_id(),
                    track_id: track.id(),
                });
                Box::pin(async {})
            },
        ));

        let state_tx = tx;
        let state_peer = peer.to_string();
        pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
            debug!(event = "peer_connection_state", peer = %state_peer, state = %st, "Peer connection state changed");
            let state = match st {
                RTCPeerConnectionState::Connecting => TransportState::Connecting,
                RTCPeerConnectionState::Connected => TransportState::Connected,
                RTCPeerConnectionState::Disconnected => TransportState::Disconnected,
                RTCPeerConnectionState::Failed => TransportState::Failed,
                RTCPeerConnectionState::Closed => TransportState::Closed,
                _ => TransportState::New,
            };
            let _ = state_tx.send(TransportEvent::StateChanged(state));
            Box::pin(async {})
        }));

        info!(event = "transport_created", peer = %peer, "Created peer connection");
        let transport = WebRtcTransport {
            pc,
            has_local_audio: AtomicBool::new(false),
        };
        Ok((Arc::new(transport), rx))
    }
}

pub struct WebRtcTransport {
    pc: Arc<RTCPeerConnection>,
    has_local_audio: AtomicBool,
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    async fn add_track(&self, track: LocalTrack) -> Result<(), TransportError> {
        let sender = self
            .pc
            .add_track(track as Arc<dyn TrackLocal + Send + Sync>)
            .await?;
        self.has_local_audio.store(true, Ordering::Release);

        // RTCP нужно вычитывать, иначе interceptors не работают
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while sender.read(&mut buf).await.is_ok() {}
        });
        Ok(())
    }

    async fn create_offer(&self) -> Result<RTCSessionDescription, TransportError> {
        // без микрофона всё равно просим аудио от собеседника
        if !self.has_local_audio.swap(true, Ordering::AcqRel) {
            self.pc
                .add_transceiver_from_kind(
                    RTPCodecType::Audio,
                    Some(RTCRtpTransceiverInit {
                        direction: RTCRtpTransceiverDirection::Recvonly,
                        send_encodings: vec![],
                    }),
                )
                .await?;
        }
        Ok(self.pc.create_offer(None).await?)
    }

    async fn create_answer(&self) -> Result<RTCSessionDescription, TransportError> {
        Ok(self.pc.create_answer(None).await?)
    }

    async fn set_local_description(&self, desc: RTCSessionDescription) -> Result<(), TransportError> {
        Ok(self.pc.set_local_description(desc).await?)
    }

    async fn set_remote_description(&self, desc: RTCSessionDescription) -> Result<(), TransportError> {
        Ok(self.pc.set_remote_description(desc).await?)
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError> {
        Ok(self.pc.add_ice_candidate(candidate.into()).await?)
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(self.pc.close().await?)
    }
}
