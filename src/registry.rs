use crate::peer::link::{LinkContext, LinkHandle};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// peer username → его единственный линк
pub struct PeerLinkRegistry {
    links: Mutex<HashMap<String, LinkHandle>>,
    ctx: Arc<LinkContext>,
}

impl PeerLinkRegistry {
    pub fn new(ctx: LinkContext) -> Self {
        Self {
            links: Mutex::new(HashMap::new()),
            ctx: Arc::new(ctx),
        }
    }

    // Мьютекс держится только на время операции с картой, паника внутри невозможна
    fn links(&self) -> MutexGuard<'_, HashMap<String, LinkHandle>> {
        self.links.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Существующий линк или новый в состоянии `Idle`.
    /// Проверка и вставка идут под одним локом, поэтому дубликатов не бывает.
    pub fn get_or_create(&self, peer: &str) -> LinkHandle {
        let mut links = self.links();
        if let Some(link) = links.get(peer) {
            return link.clone();
        }
        let link = LinkHandle::spawn(peer, self.ctx.clone());
        links.insert(peer.to_string(), link.clone());
        info!(event = "link_registered", peer, total = links.len(), "Registered voice link");
        link
    }

    pub fn get(&self, peer: &str) -> Option<LinkHandle> {
        self.links().get(peer).cloned()
    }

    /// Убирает линк; его задача закроет транспорт, когда отпустят последний handle
    pub fn remove(&self, peer: &str) -> Option<LinkHandle> {
        let removed = self.links().remove(peer);
        if removed.is_some() {
            debug!(event = "link_removed", peer, "Removed voice link");
        }
        removed
    }

    /// Новый `Idle` линк вместо старого
    pub fn replace(&self, peer: &str) -> LinkHandle {
        let mut links = self.links();
        let link = LinkHandle::spawn(peer, self.ctx.clone());
        if links.insert(peer.to_string(), link.clone()).is_some() {
            info!(event = "link_replaced", peer, "Replaced voice link");
        }
        link
    }

    pub fn len(&self) -> usize {
        self.links().len()
    }

    pub fn is_empty(&self) -> bool {
        self.links().is_empty()
    }
}
