// Конфигурация голосового клиента.
// Константы логирования зависят от режима сборки, остальное загружается из JSON.

use crate::error::ConfigError;
use crate::peer::types::ServerConfig;
use crate::utils::add_ice_url_scheme;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use webrtc::ice_transport::ice_server::RTCIceServer;

/// Переменная окружения с фильтром логов (синтаксис `EnvFilter`)
pub const LOG_ENV: &str = "LOBBY_VOICE_LOG";

/// Формат временной метки в логах
pub const LOG_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

#[cfg(debug_assertions)]
pub const DEFAULT_LOG_FILTER: &str = "debug,webrtc=info,webrtc_ice=warn,webrtc_mdns=warn"; // В режиме отладки подробно

#[cfg(not(debug_assertions))]
pub const DEFAULT_LOG_FILTER: &str = "warn"; // В продакшене только предупреждения

/// Сколько удалённых кандидатов держим до установки remote description
pub const MAX_PENDING_REMOTE_CANDIDATES: usize = 64;

/// Префикс идентификатора комнаты и длина случайной части
pub const ROOM_ID_PREFIX: &str = "room_";
pub const ROOM_ID_LEN: usize = 6;

/// Дефолтные STUN серверы, если пользователь ничего не задал
pub static DEFAULT_ICE_SERVERS: Lazy<Vec<ServerConfig>> = Lazy::new(|| {
    vec![
        ServerConfig {
            id: "default-stun".into(),
            r#type: "stun".into(),
            url: "stun:stun.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
        ServerConfig {
            id: "default-stun-1".into(),
            r#type: "stun".into(),
            url: "stun:stun1.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
    ]
});

/// Параметры локального захвата звука
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// false = слушаем, но не захватываем микрофон
    pub capture_enabled: bool,
    pub clock_rate: u32,
    pub channels: u16,
    pub stream_id: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            capture_enabled: true,
            clock_rate: 48_000,
            channels: 2,
            stream_id: "lobby-voice".into(),
        }
    }
}

/// Полная конфигурация клиента
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct VoiceConfig {
    pub ice_servers: Vec<ServerConfig>,
    pub max_pending_candidates: usize,
    pub audio: AudioConfig,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            ice_servers: DEFAULT_ICE_SERVERS.clone(),
            max_pending_candidates: MAX_PENDING_REMOTE_CANDIDATES,
            audio: AudioConfig::default(),
        }
    }
}

impl VoiceConfig {
    /// Загружает и валидирует конфигурацию из JSON
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: VoiceConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for server in &self.ice_servers {
            if server.url.is_empty() {
                return Err(ConfigError::EmptyUrl(server.id.clone()));
            }

            match server.r#type.as_str() {
                "stun" => {}
                "turn" => {
                    if server.username.is_none() || server.credential.is_none() {
                        return Err(ConfigError::MissingTurnCredentials(server.id.clone()));
                    }
                }
                other => {
                    return Err(ConfigError::UnknownServerType {
                        id: server.id.clone(),
                        kind: other.to_string(),
                    })
                }
            }
        }

        if self.max_pending_candidates == 0 {
            return Err(ConfigError::ZeroCandidateLimit);
        }
        Ok(())
    }

    /// Серверы в формате webrtc, со схемой в каждом URL
    pub fn rtc_ice_servers(&self) -> Vec<RTCIceServer> {
        self.ice_servers
            .iter()
            .map(|config| RTCIceServer {
                urls: vec![add_ice_url_scheme(config)],
                username: config.username.clone().unwrap_or_default(),
                credential: config.credential.clone().unwrap_or_default(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(username: Option<&str>) -> ServerConfig {
        ServerConfig {
            id: "relay".into(),
            r#type: "turn".into(),
            url: "turn.example.org:3478".into(),
            username: username.map(Into::into),
            credential: username.map(|_| "secret".into()),
        }
    }

    #[test]
    fn defaults_are_valid() {
        let config = VoiceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_pending_candidates, MAX_PENDING_REMOTE_CANDIDATES);
        assert!(config.audio.capture_enabled);
    }

    #[test]
    fn turn_requires_credentials() {
        let mut config = VoiceConfig::default();
        config.ice_servers.push(turn(None));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingTurnCredentials(id)) if id == "relay"
        ));

        config.ice_servers.pop();
        config.ice_servers.push(turn(Some("alice")));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config = VoiceConfig::from_json(r#"{ "max_pending_candidates": 8 }"#).unwrap();
        assert_eq!(config.max_pending_candidates, 8);
        assert_eq!(config.ice_servers, *DEFAULT_ICE_SERVERS);
        assert_eq!(config.audio.clock_rate, 48_000);
    }

    #[test]
    fn rejects_unknown_server_type_and_zero_limit() {
        let raw = r#"{ "ice_servers": [ { "id": "x", "type": "quic", "url": "example.org" } ] }"#;
        assert!(matches!(
            VoiceConfig::from_json(raw),
            Err(ConfigError::UnknownServerType { kind, .. }) if kind == "quic"
        ));
        assert!(matches!(
            VoiceConfig::from_json(r#"{ "max_pending_candidates": 0 }"#),
            Err(ConfigError::ZeroCandidateLimit)
        ));
    }

    #[test]
    fn rtc_servers_get_a_scheme() {
        let mut config = VoiceConfig::default();
        config.ice_servers = vec![turn(Some("alice"))];
        let servers = config.rtc_ice_servers();
        assert_eq!(servers[0].urls, vec!["turn:turn.example.org:3478".to_string()]);
        assert_eq!(servers[0].username, "alice");
        assert_eq!(servers[0].credential, "secret");
    }
}
