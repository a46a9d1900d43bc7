//! События для встраивающего приложения (UI, воспроизведение звука).

use crate::error::LinkError;
use crate::peer::types::LinkState;
use crate::session::InviteSession;
use tokio::sync::mpsc;
use tracing::trace;

#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    StateChanged {
        peer: String,
        state: LinkState,
    },
    /// Удалённый аудиопоток готов к воспроизведению
    RemoteStream {
        peer: String,
        stream_id: String,
        track_id: String,
    },
    /// Линк перешёл в `Failed`; повторной попытки не будет
    Failed {
        peer: String,
        error: LinkError,
    },
    /// Сообщение сигналинга отброшено
    Dropped(LinkError),
    CandidateRejected(LinkError),
    /// Микрофон недоступен, линк работает только на приём
    MediaDenied {
        peer: String,
        reason: String,
    },
    InviteReceived(InviteSession),
}

/// Handle для отправки событий. Без получателя события просто теряются
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<LinkEvent>>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn emit(&self, event: LinkEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                trace!(event = "link_event_unobserved", "Event receiver dropped");
            }
        }
    }

    pub fn emit_state(&self, peer: &str, state: LinkState) {
        self.emit(LinkEvent::StateChanged {
            peer: peer.to_string(),
            state,
        });
    }

    pub fn emit_failed(&self, peer: &str, error: LinkError) {
        self.emit(LinkEvent::Failed {
            peer: peer.to_string(),
            error,
        });
    }

    pub fn emit_dropped(&self, error: LinkError) {
        self.emit(LinkEvent::Dropped(error));
    }
}
