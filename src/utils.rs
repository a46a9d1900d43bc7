use crate::config::{ROOM_ID_LEN, ROOM_ID_PREFIX};
use crate::peer::types::ServerConfig;
use rand::Rng;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

pub fn random_id() -> String {
    hex::encode(rand::rng().random::<[u8; 8]>())
}

/// Идентификатор комнаты для приглашения: `room_` + 6 символов base36
pub fn room_id() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..ROOM_ID_LEN)
        .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
        .collect();
    format!("{ROOM_ID_PREFIX}{suffix}")
}

// Функция для добавления схемы протокола к URL ICE сервера, если она отсутствует
pub fn add_ice_url_scheme(config: &ServerConfig) -> String {
    if config.url.starts_with("turn:")
        || config.url.starts_with("turns:")
        || config.url.starts_with("stun:")
    {
        config.url.clone()
    } else {
        let scheme = if config.r#type == "turn" {
            "turn:"
        } else {
            "stun:"
        };
        format!("{}{}", scheme, config.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_ids_look_like_the_lobby_expects() {
        let id = room_id();
        assert!(id.starts_with("room_"));
        assert_eq!(id.len(), ROOM_ID_PREFIX.len() + ROOM_ID_LEN);
        assert!(id[ROOM_ID_PREFIX.len()..]
            .bytes()
            .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase()));
    }

    #[test]
    fn random_id_is_hex() {
        let id = random_id();
        assert_eq!(id.len(), 16);
        assert!(hex::decode(&id).is_ok());
    }

    #[test]
    fn scheme_is_added_once() {
        let mut config = ServerConfig {
            id: "s".into(),
            r#type: "stun".into(),
            url: "stun.example.org:19302".into(),
            username: None,
            credential: None,
        };
        assert_eq!(add_ice_url_scheme(&config), "stun:stun.example.org:19302");

        config.url = "stun:stun.example.org:19302".into();
        assert_eq!(add_ice_url_scheme(&config), "stun:stun.example.org:19302");

        config.r#type = "turn".into();
        config.url = "turns:relay.example.org:443".into();
        assert_eq!(add_ice_url_scheme(&config), "turns:relay.example.org:443");
    }
}
