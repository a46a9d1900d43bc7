//! Локальный захват звука: один на процесс, общий для всех линков.

use crate::config::AudioConfig;
use crate::error::MediaError;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};
use webrtc::api::media_engine::MIME_TYPE_OPUS;
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

pub type LocalTrack = Arc<TrackLocalStaticSample>;

/// Источник локальных дорожек (микрофон). `acquire` может ждать разрешения пользователя
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn acquire(&self) -> Result<Vec<LocalTrack>, MediaError>;
}

/// Opus-дорожка, в которую приложение пишет закодированные кадры через [`push_frame`]
#[derive(Debug, Clone)]
pub struct MicrophoneSource {
    config: AudioConfig,
}

impl MicrophoneSource {
    pub fn new(config: AudioConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl MediaSource for MicrophoneSource {
    async fn acquire(&self) -> Result<Vec<LocalTrack>, MediaError> {
        if !self.config.capture_enabled {
            return Err(MediaError::Denied("capture disabled by configuration".into()));
        }

        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: self.config.clock_rate,
                channels: self.config.channels,
                sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
                rtcp_feedback: vec![],
            },
            "audio".to_owned(),
            self.config.stream_id.clone(),
        ));
        Ok(vec![track])
    }
}

/// Отправка одного закодированного кадра во все линки, к которым прикреплена дорожка
pub async fn push_frame(track: &LocalTrack, frame: Bytes, duration: Duration) -> Result<(), MediaError> {
    track
        .write_sample(&Sample {
            data: frame,
            duration,
            ..Default::default()
        })
        .await
        .map_err(|e| MediaError::Write(e.to_string()))
}

#[derive(Default)]
struct Slot {
    tracks: Option<Vec<LocalTrack>>,
    last_error: Option<MediaError>,
}

/// Ленивый single-flight доступ к [`MediaSource`].
///
/// Параллельные первые запросы сводятся к одному `acquire`: остальные ждут на
/// мьютексе и получают его результат, включая отказ. Следующий запрос, который
/// начался уже после отказа, спросит источник заново.
pub struct SharedMedia {
    source: Arc<dyn MediaSource>,
    slot: Mutex<Slot>,
    failures: AtomicU64,
}

impl SharedMedia {
    pub fn new(source: Arc<dyn MediaSource>) -> Self {
        Self {
            source,
            slot: Mutex::new(Slot::default()),
            failures: AtomicU64::new(0),
        }
    }

    pub async fn tracks(&self) -> Result<Vec<LocalTrack>, MediaError> {
        let seen = self.failures.load(Ordering::Acquire);
        let mut slot = self.slot.lock().await;

        if let Some(tracks) = &slot.tracks {
            return Ok(tracks.clone());
        }
        // пока ждали, кто-то уже спросил и получил отказ
        if self.failures.load(Ordering::Acquire) != seen {
            if let Some(err) = &slot.last_error {
                return Err(err.clone());
            }
        }

        match self.source.acquire().await {
            Ok(tracks) => {
                info!(event = "media_acquired", tracks = tracks.len(), "Microphone access granted");
                slot.tracks = Some(tracks.clone());
                slot.last_error = None;
                Ok(tracks)
            }
            Err(e) => {
                warn!(event = "media_denied", error = %e, "Microphone access denied");
                slot.last_error = Some(e.clone());
                self.failures.fetch_add(1, Ordering::AcqRel);
                Err(e)
            }
        }
    }

    pub async fn is_acquired(&self) -> bool {
        self.slot.lock().await.tracks.is_some()
    }
}
