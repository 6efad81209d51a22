//! Owner session transitions.
//!
//! Sign-in itself happens elsewhere; this is only the surface the controller
//! subscribes to: the current owner, or none.

use tokio::sync::watch;

use crate::model::OwnerId;

/// Publishes owner-present / owner-absent transitions.
#[derive(Debug)]
pub struct Session {
    tx: watch::Sender<Option<OwnerId>>,
}

impl Session {
    /// A session with nobody signed in.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub fn sign_in(&self, owner: OwnerId) {
        tracing::info!("Session signed in as {owner}");
        self.tx.send_replace(Some(owner));
    }

    pub fn sign_out(&self) {
        if self.tx.send_replace(None).is_some() {
            tracing::info!("Session signed out");
        }
    }

    pub fn current(&self) -> Option<OwnerId> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<OwnerId>> {
        self.tx.subscribe()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
