//! # Lock Manager
//!
//! Store-wide FIFO mutex serializing writers.
//!
//! ```text
//! UNLOCKED ──acquire──▶ LOCKED(owner, lockId) ──release──▶ UNLOCKED
//!                          │   ▲
//!                  enqueue │   │ grant earliest live waiter
//!                          ▼   │
//!                       [ w1, w2, w3 ... ]
//! ```
//!
//! Every waiter gets its lock id when it enqueues and carries its own
//! timeout. A waiter that times out, or whose future is dropped, leaves the
//! queue without disturbing anyone else. Grants follow arrival order.

use crate::config::{StoreConfig, DEFAULT_LOCK_TIMEOUT_MS};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tessera_common::{Clock, IdGenerator, LockError, LockResult, SystemClock};
use tokio::sync::oneshot;

/// The current holder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockInfo {
    pub lock_id: String,
    pub owner_id: String,
    pub acquired_at: i64,
}

/// A waiter as seen from outside
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedLock {
    pub lock_id: String,
    pub owner_id: String,
    pub waiting_since: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockStats {
    pub total_acquired: u64,
    pub total_released: u64,
    pub timeouts: u64,
    pub mismatches: u64,
    pub max_queue_length: usize,
    /// Summed time between enqueue and grant
    pub total_wait_ms: i64,
}

impl LockStats {
    pub fn average_wait_ms(&self) -> f64 {
        if self.total_acquired == 0 {
            0.0
        } else {
            self.total_wait_ms as f64 / self.total_acquired as f64
        }
    }
}

struct Waiter {
    lock_id: String,
    owner_id: String,
    waiting_since: i64,
    grant: oneshot::Sender<()>,
}

#[derive(Default)]
struct LockState {
    current: Option<LockInfo>,
    queue: VecDeque<Waiter>,
    stats: LockStats,
}

impl LockState {
    /// Hand the lock to the earliest waiter still listening
    fn grant_next(&mut self, now: i64) {
        while let Some(waiter) = self.queue.pop_front() {
            if waiter.grant.send(()).is_err() {
                continue;
            }
            tracing::debug!(
                "[LockManager] Granted {} to {} after {}ms",
                waiter.lock_id,
                waiter.owner_id,
                now - waiter.waiting_since
            );
            self.stats.total_acquired += 1;
            self.stats.total_wait_ms += now - waiter.waiting_since;
            self.current = Some(LockInfo {
                lock_id: waiter.lock_id,
                owner_id: waiter.owner_id,
                acquired_at: now,
            });
            return;
        }
    }

    fn unlock(&mut self, now: i64) {
        self.current = None;
        self.stats.total_released += 1;
        self.grant_next(now);
    }
}

pub struct LockManager {
    state: Mutex<LockState>,
    timeout: Mutex<Duration>,
    clock: Arc<dyn Clock>,
    ids: IdGenerator,
}

impl fmt::Debug for LockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockManager")
            .field("current", &self.current_lock())
            .field("queue_length", &self.queue_length())
            .field("timeout", &self.lock_timeout())
            .finish()
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS))
    }
}

impl LockManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: Mutex::new(LockState::default()),
            timeout: Mutex::new(timeout),
            clock: Arc::new(SystemClock),
            ids: IdGenerator::from_session("lock"),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.lock_timeout())
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn lock_state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait until `owner_id` holds the lock and return its lock id.
    ///
    /// Fails with [`LockError::Timeout`] when the lock is not granted
    /// within the configured timeout.
    pub async fn acquire_lock(&self, owner_id: &str) -> LockResult<String> {
        let lock_id = self.ids.next_id();
        let timeout = self.lock_timeout();

        let receiver = {
            let mut state = self.lock_state();
            let now = self.clock.now_millis();

            if state.current.is_none() && state.queue.is_empty() {
                state.current = Some(LockInfo {
                    lock_id: lock_id.clone(),
                    owner_id: owner_id.to_string(),
                    acquired_at: now,
                });
                state.stats.total_acquired += 1;
                tracing::debug!("[LockManager] Granted {} to {}", lock_id, owner_id);
                return Ok(lock_id);
            }

            let (grant, receiver) = oneshot::channel();
            state.queue.push_back(Waiter {
                lock_id: lock_id.clone(),
                owner_id: owner_id.to_string(),
                waiting_since: now,
                grant,
            });
            state.stats.max_queue_length = state.stats.max_queue_length.max(state.queue.len());
            tracing::debug!(
                "[LockManager] {} queued as {} (position {})",
                owner_id,
                lock_id,
                state.queue.len()
            );
            receiver
        };

        let mut ticket = WaitTicket {
            manager: self,
            lock_id: &lock_id,
            armed: true,
        };
        let outcome = tokio::time::timeout(timeout, receiver).await;
        ticket.armed = false;
        drop(ticket);

        match outcome {
            Ok(Ok(())) => Ok(lock_id),
            Ok(Err(_)) => Err(LockError::Abandoned(lock_id)),
            Err(_) => self.expire(&lock_id, owner_id, timeout),
        }
    }

    /// Settle a waiter whose timer fired. A grant that raced the timer wins.
    fn expire(&self, lock_id: &str, owner_id: &str, timeout: Duration) -> LockResult<String> {
        let mut state = self.lock_state();
        if state.current.as_ref().map(|c| c.lock_id.as_str()) == Some(lock_id) {
            return Ok(lock_id.to_string());
        }
        if let Some(position) = state.queue.iter().position(|w| w.lock_id == lock_id) {
            state.queue.remove(position);
        }
        state.stats.timeouts += 1;
        tracing::warn!(
            "[LockManager] {} timed out after {}ms waiting as {}",
            owner_id,
            timeout.as_millis(),
            lock_id
        );
        Err(LockError::Timeout {
            lock_id: lock_id.to_string(),
            owner_id: owner_id.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        })
    }

    /// Release the lock.
    ///
    /// A supplied `lock_id` must match the holder. Releasing an unlocked
    /// manager without an id does nothing.
    pub fn release_lock(&self, lock_id: Option<&str>) -> LockResult<()> {
        let mut state = self.lock_state();
        let expected = state.current.as_ref().map(|c| c.lock_id.clone());

        match (expected, lock_id) {
            (None, None) => {
                tracing::debug!("[LockManager] Release on an unlocked manager ignored");
                return Ok(());
            }
            (expected, Some(provided)) if expected.as_deref() != Some(provided) => {
                state.stats.mismatches += 1;
                tracing::warn!(
                    "[LockManager] Release with {} rejected, holder is {:?}",
                    provided,
                    expected
                );
                return Err(LockError::Mismatch {
                    expected,
                    provided: provided.to_string(),
                });
            }
            _ => {}
        }

        if let Some(current) = &state.current {
            tracing::debug!("[LockManager] {} released {}", current.owner_id, current.lock_id);
        }
        state.unlock(self.clock.now_millis());
        Ok(())
    }

    /// Acquire and wrap the lock in a guard that releases on drop
    pub async fn acquire(&self, owner_id: &str) -> LockResult<LockGuard<'_>> {
        let lock_id = self.acquire_lock(owner_id).await?;
        Ok(LockGuard {
            manager: self,
            lock_id,
            released: false,
        })
    }

    pub fn is_locked(&self) -> bool {
        self.lock_state().current.is_some()
    }

    pub fn current_lock(&self) -> Option<LockInfo> {
        self.lock_state().current.clone()
    }

    /// Waiters still listening for a grant
    pub fn queue_length(&self) -> usize {
        self.lock_state()
            .queue
            .iter()
            .filter(|w| !w.grant.is_closed())
            .count()
    }

    pub fn queue_info(&self) -> Vec<QueuedLock> {
        self.lock_state()
            .queue
            .iter()
            .filter(|w| !w.grant.is_closed())
            .map(|w| QueuedLock {
                lock_id: w.lock_id.clone(),
                owner_id: w.owner_id.clone(),
                waiting_since: w.waiting_since,
            })
            .collect()
    }

    pub fn lock_stats(&self) -> LockStats {
        self.lock_state().stats.clone()
    }

    pub fn reset_lock_stats(&self) {
        self.lock_state().stats = LockStats::default();
    }

    /// Applies to waiters that enqueue from now on
    pub fn set_lock_timeout(&self, timeout: Duration) {
        *self.timeout.lock().unwrap_or_else(PoisonError::into_inner) = timeout;
    }

    pub fn lock_timeout(&self) -> Duration {
        *self.timeout.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cleans up after a waiter whose future was dropped mid-wait
struct WaitTicket<'a> {
    manager: &'a LockManager,
    lock_id: &'a str,
    armed: bool,
}

impl Drop for WaitTicket<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.manager.lock_state();
        if let Some(position) = state.queue.iter().position(|w| w.lock_id == self.lock_id) {
            state.queue.remove(position);
            tracing::debug!("[LockManager] Waiter {} cancelled", self.lock_id);
        } else if state.current.as_ref().map(|c| c.lock_id.as_str()) == Some(self.lock_id) {
            tracing::debug!("[LockManager] Waiter {} cancelled after grant", self.lock_id);
            state.unlock(self.manager.clock.now_millis());
        }
    }
}

/// Holds the lock until dropped or released
#[derive(Debug)]
pub struct LockGuard<'a> {
    manager: &'a LockManager,
    lock_id: String,
    released: bool,
}

impl LockGuard<'_> {
    pub fn lock_id(&self) -> &str {
        &self.lock_id
    }

    pub fn release(mut self) -> LockResult<()> {
        self.released = true;
        self.manager.release_lock(Some(&self.lock_id))
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(err) = self.manager.release_lock(Some(&self.lock_id)) {
            tracing::warn!("[LockManager] Guard for {} failed to release: {}", self.lock_id, err);
        }
    }
}
