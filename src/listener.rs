//! Scoped event subscriptions.
//!
//! A [`Listener`] is acquired by subscribing and disposed of by
//! [`Listener::release`], which consumes it, so a subscription cannot be
//! released twice. Dropping an unreleased listener leaks the subscription on
//! the map and is logged.

use tracing::{debug, warn};

use crate::traits::{EventKind, ListenerId, MapAdapter};

#[derive(Debug)]
#[must_use = "a listener must be released to unsubscribe it"]
pub struct Listener {
    id: ListenerId,
    kind: EventKind,
    released: bool,
}

impl Listener {
    pub fn subscribe<M: MapAdapter + ?Sized>(map: &mut M, kind: EventKind) -> Self {
        let id = map.subscribe(kind);
        debug!(?id, ?kind, "subscribed");
        Self {
            id,
            kind,
            released: false,
        }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn matches(&self, id: ListenerId) -> bool {
        self.id == id
    }

    pub fn release<M: MapAdapter + ?Sized>(mut self, map: &mut M) {
        map.unsubscribe(self.id);
        self.released = true;
        debug!(id = ?self.id, kind = ?self.kind, "unsubscribed");
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if !self.released {
            warn!(id = ?self.id, kind = ?self.kind, "listener dropped without release");
        }
    }
}
