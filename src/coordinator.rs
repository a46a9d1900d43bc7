//! Связка протокола приглашений лобби и голосовых линков.

use crate::config::VoiceConfig;
use crate::error::{LinkError, LobbyError};
use crate::events::{EventSink, LinkEvent};
use crate::media::{MediaSource, SharedMedia};
use crate::peer::link::{LinkContext, LinkHandle};
use crate::peer::transport::TransportFactory;
use crate::peer::types::LinkState;
use crate::registry::PeerLinkRegistry;
use crate::session::InviteSession;
use crate::signaling::{InboundSignal, LobbyChannel, ServerEvent, SignalingChannel};
use crate::utils::room_id;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub struct SessionCoordinator {
    registry: Arc<PeerLinkRegistry>,
    lobby: Arc<dyn LobbyChannel>,
    events: EventSink,
    username: Mutex<Option<String>>,
}

impl SessionCoordinator {
    pub fn new(registry: Arc<PeerLinkRegistry>, lobby: Arc<dyn LobbyChannel>, events: EventSink) -> Self {
        Self {
            registry,
            lobby,
            events,
            username: Mutex::new(None),
        }
    }

    /// Собирает весь клиент: общий микрофон, реестр линков и координатор.
    /// Возвращает поток событий для UI.
    pub fn build(
        config: &VoiceConfig,
        transports: Arc<dyn TransportFactory>,
        media: Arc<dyn MediaSource>,
        signaling: Arc<dyn SignalingChannel>,
        lobby: Arc<dyn LobbyChannel>,
    ) -> (Self, mpsc::UnboundedReceiver<LinkEvent>) {
        let (events, rx) = EventSink::channel();
        let registry = PeerLinkRegistry::new(LinkContext {
            transports,
            media: Arc::new(SharedMedia::new(media)),
            signaling,
            events: events.clone(),
            candidate_limit: config.max_pending_candidates,
        });
        (Self::new(Arc::new(registry), lobby, events), rx)
    }

    pub fn registry(&self) -> &Arc<PeerLinkRegistry> {
        &self.registry
    }

    pub fn link(&self, peer: &str) -> Option<LinkHandle> {
        self.registry.get(peer)
    }

    pub fn username(&self) -> Option<String> {
        self.username
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // ========== LOBBY ==========

    pub async fn register(&self, username: &str) -> Result<(), LobbyError> {
        self.lobby.register(username).await?;
        *self.username.lock().unwrap_or_else(PoisonError::into_inner) = Some(username.to_string());
        info!(event = "registered", username, "Registered & joined lobby");
        Ok(())
    }

    /// Выбор героя для матча; на голосовые линки не влияет
    pub async fn update_hero(&self, hero: &str) -> Result<(), LobbyError> {
        self.username().ok_or(LobbyError::NotRegistered)?;
        self.lobby.update_hero(hero).await?;
        info!(event = "hero_set", hero, "Hero set");
        Ok(())
    }

    /// Создаёт комнату и приглашает друга. Линк поднимет принявшая сторона
    pub async fn invite(&self, to: &str) -> Result<InviteSession, LobbyError> {
        let me = self.username().ok_or(LobbyError::NotRegistered)?;
        if me == to {
            return Err(LobbyError::SelfInvite);
        }

        let invite = InviteSession::new(room_id(), me, to);
        self.lobby.invite_friend(to, &invite.room_id).await?;
        info!(event = "invite_sent", to, room_id = %invite.room_id, "Invite sent");
        Ok(invite)
    }

    /// Входим в комнату и отправляем offer пригласившему.
    /// Повторное приглашение от пира, с которым уже идут переговоры, ничего не меняет.
    pub async fn accept_invite(&self, invite: &InviteSession) -> Result<LinkHandle, LobbyError> {
        self.lobby.join_room(&invite.room_id).await?;
        info!(event = "invite_accepted", from = %invite.from, room_id = %invite.room_id, "Joined room");

        let mut link = self.registry.get_or_create(&invite.from);
        match link.state() {
            LinkState::Failed => {
                info!(event = "link_restart", peer = %invite.from, "Previous link failed, starting over");
                link = self.registry.replace(&invite.from);
            }
            state if state.is_engaged() => {
                debug!(event = "duplicate_invite", peer = %invite.from, state = %state, "Link already active");
                return Ok(link);
            }
            _ => {}
        }
        link.originate();
        Ok(link)
    }

    /// Удаляет линк и закрывает его транспорт
    pub fn hang_up(&self, peer: &str) -> bool {
        let removed = self.registry.remove(peer).is_some();
        if removed {
            info!(event = "hang_up", peer, "Voice link removed");
        }
        removed
    }

    // ========== SIGNALING ==========

    pub fn handle_signal(&self, signal: InboundSignal) {
        debug!(event = "signal_in", from = signal.from(), kind = signal.kind(), "Signaling message received");
        match signal {
            // offer сам себя авторизует: отправитель уже решил соединиться
            InboundSignal::Offer { from, offer } => {
                let mut link = self.registry.get_or_create(&from);
                if link.state() == LinkState::Failed {
                    link = self.registry.replace(&from);
                }
                link.deliver_offer(offer);
            }
            InboundSignal::Answer { from, answer } => match self.registry.get(&from) {
                Some(link) => {
                    link.deliver_answer(answer);
                }
                None => {
                    let err = LinkError::UnknownPeerMessage {
                        peer: from,
                        kind: "answer",
                    };
                    warn!(event = "unknown_peer_message", error = %err, "Dropping signaling message");
                    self.events.emit_dropped(err);
                }
            },
            // кандидаты часто обгоняют offer, поэтому линк создаём заранее и буферизуем
            InboundSignal::IceCandidate { from, candidate } => {
                self.registry.get_or_create(&from).deliver_candidate(candidate);
            }
        }
    }

    pub fn handle_server_event(&self, event: ServerEvent) {
        let event = match event.into_signal() {
            Ok(signal) => return self.handle_signal(signal),
            Err(event) => event,
        };

        match event {
            ServerEvent::FriendInvite { from, room_id } => {
                info!(event = "invite_received", from = %from, room_id = %room_id, "Invite received");
                let me = self.username().unwrap_or_default();
                self.events
                    .emit(LinkEvent::InviteReceived(InviteSession::new(room_id, from, me)));
            }
            ServerEvent::Info { msg } => info!(event = "lobby_info", msg = %msg, "Info from lobby"),
            ServerEvent::LobbyUpdate { count, players } => {
                let names: Vec<&str> = players.iter().map(|p| p.username.as_str()).collect();
                debug!(event = "lobby_update", count, players = ?names, "Lobby updated");
            }
            ServerEvent::MatchCountdown { wait_sec } => {
                info!(event = "match_countdown", wait_sec, "Waiting for match, auto-fill pending")
            }
            ServerEvent::MatchStarted { started_at } => match started_at.to_datetime() {
                Some(at) => info!(event = "match_started", started_at = %at, "Match started"),
                None => info!(event = "match_started", ?started_at, "Match started"),
            },
            ServerEvent::FriendRequest { requester } => {
                info!(event = "friend_request", requester = %requester, "Friend request received")
            }
            other => debug!(event = "server_event_ignored", ?other, "Unhandled server event"),
        }
    }

    /// Цикл разбора входящих кадров relay. Завершается, когда сокет закрыт
    pub async fn run(&self, mut frames: mpsc::UnboundedReceiver<String>) {
        while let Some(frame) = frames.recv().await {
            match ServerEvent::decode(&frame) {
                Ok(event) => self.handle_server_event(event),
                Err(e) => warn!(event = "frame_skipped", error = %e, "Skipping relay frame"),
            }
        }
        debug!(event = "relay_closed", "Relay frame stream ended");
    }
}
