use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::error::{Error, ErrorKind, Result};
use crate::storage::volatile::VolatileStore;

/// Best-effort cross-process lock built on the volatile store's atomic add.
///
/// The lock carries no ownership token: a crashed holder's key self-expires
/// via TTL, and any caller may release a lock it does not hold. Repeated
/// acquire/release by the same instance is idempotent.
pub struct DistributedMutex {
    volatile: Arc<dyn VolatileStore>,
    key: String,
    ttl: Duration,
    poll: Duration,
    has_lock: bool,
}

impl DistributedMutex {
    pub fn new(volatile: Arc<dyn VolatileStore>, key: String, ttl: Duration, poll: Duration) -> Self {
        DistributedMutex {
            volatile,
            key,
            ttl,
            poll,
            has_lock: false,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn acquire(&mut self, wait: Duration) -> Result<()> {
        if self.has_lock {
            return Ok(());
        }
        let deadline = Instant::now() + wait;
        loop {
            if self.volatile.add(&self.key, json!(1), Some(self.ttl)) {
                self.has_lock = true;
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::new(
                    ErrorKind::LockTimeout,
                    format!("could not acquire lock {} within {:?}", self.key, wait),
                ));
            }
            std::thread::sleep(self.poll);
        }
    }

    pub fn release(&mut self) {
        self.volatile.delete(&self.key);
        self.has_lock = false;
    }
}

impl Drop for DistributedMutex {
    fn drop(&mut self) {
        if self.has_lock {
            self.release();
        }
    }
}
