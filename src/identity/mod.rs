//! Pool of authenticated identities.
//!
//! Each identity backs at most one browser session at a time. `acquire`
//! waits on a `Notify` instead of polling, and the returned guard puts the
//! identity back when dropped, so error paths release it too.

mod fingerprint;

pub use fingerprint::Fingerprint;

use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::models::{Identity, IdentityStats};

struct PoolInner {
    slots: Mutex<Vec<Identity>>,
    notify: Notify,
}

impl PoolInner {
    fn slots(&self) -> MutexGuard<'_, Vec<Identity>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, index: usize) {
        {
            let mut slots = self.slots();
            if let Some(slot) = slots.get_mut(index) {
                slot.in_use = false;
                debug!("Released identity {}", slot.id);
            }
        }
        self.notify.notify_one();
    }
}

/// Bounded pool of identities.
#[derive(Clone)]
pub struct IdentityPool {
    inner: Arc<PoolInner>,
}

impl IdentityPool {
    pub fn new(identities: Vec<Identity>) -> Self {
        let identities = identities
            .into_iter()
            .map(|mut i| {
                i.in_use = false;
                i
            })
            .collect();
        Self {
            inner: Arc::new(PoolInner {
                slots: Mutex::new(identities),
                notify: Notify::new(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn try_take(&self) -> Option<IdentityGuard> {
        let mut slots = self.inner.slots();
        let index = slots.iter().position(|i| !i.in_use)?;
        let slot = &mut slots[index];
        slot.in_use = true;
        slot.last_used = Some(Utc::now());
        debug!("Acquired identity {}", slot.id);
        Some(IdentityGuard {
            pool: Arc::clone(&self.inner),
            index,
            identity: slot.clone(),
            released: false,
        })
    }

    /// Wait up to `timeout` for a free identity.
    pub async fn acquire(&self, timeout: Duration) -> Option<IdentityGuard> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(guard) = self.try_take() {
                return Some(guard);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                warn!("No identity available after {:?}", timeout);
                return None;
            }
        }
    }

    pub fn stats(&self) -> IdentityStats {
        let slots = self.inner.slots();
        let in_use = slots.iter().filter(|i| i.in_use).count();
        IdentityStats {
            total: slots.len(),
            in_use,
            available: slots.len() - in_use,
            total_requests: slots.iter().map(|i| i.total_requests).sum(),
            failed_requests: slots.iter().map(|i| i.failed_requests).sum(),
        }
    }
}

/// Exclusive hold on one identity. Releases on drop.
pub struct IdentityGuard {
    pool: Arc<PoolInner>,
    index: usize,
    identity: Identity,
    released: bool,
}

impl IdentityGuard {
    /// Record the result of a request made with this identity.
    pub fn record_request(&mut self, ok: bool) {
        let mut slots = self.pool.slots();
        if let Some(slot) = slots.get_mut(self.index) {
            slot.total_requests += 1;
            if !ok {
                slot.failed_requests += 1;
            }
            slot.last_used = Some(Utc::now());
            self.identity.total_requests = slot.total_requests;
            self.identity.failed_requests = slot.failed_requests;
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::for_identity(&self.identity.id)
    }

    /// Return the identity to the pool now.
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.pool.release(self.index);
        }
    }
}

impl Deref for IdentityGuard {
    type Target = Identity;

    fn deref(&self) -> &Identity {
        &self.identity
    }
}

impl Drop for IdentityGuard {
    fn drop(&mut self) {
        self.release_once();
    }
}
