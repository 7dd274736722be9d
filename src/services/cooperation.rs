//! Key-based single-flight for origin requests.
//!
//! Concurrent callers for the same [`CooperationKey`] share one unit of work.
//! The first caller becomes the leader and its work runs on a detached task.
//! Later callers follow: they wait on the leader's outcome for up to the
//! passive timeout. A follower whose passive wait runs out takes over with an
//! independent attempt (or joins another follower's takeover) bounded by the
//! active timeout.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::errors::{ProxyError, ProxyResult};
use crate::domain::models::{CooperationConfig, CooperationKey};

type Outcome<T> = Option<ProxyResult<T>>;

/// In-flight record for one key.
struct Lease<T> {
    id: Uuid,
    started: Instant,
    waiters: AtomicUsize,
    outcome: watch::Sender<Outcome<T>>,
}

impl<T> Lease<T> {
    fn new() -> Arc<Self> {
        let (outcome, _) = watch::channel(None);
        Arc::new(Self {
            id: Uuid::new_v4(),
            started: Instant::now(),
            waiters: AtomicUsize::new(0),
            outcome,
        })
    }

    /// Publish the outcome unless one was already published.
    fn publish(&self, outcome: ProxyResult<T>) -> bool {
        let mut outcome = Some(outcome);
        self.outcome.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = outcome.take();
            true
        })
    }
}

/// Counts a follower for as long as it waits on a lease.
struct WaiterGuard<T> {
    lease: Arc<Lease<T>>,
}

impl<T> WaiterGuard<T> {
    fn new(lease: &Arc<Lease<T>>) -> Self {
        lease.waiters.fetch_add(1, Ordering::AcqRel);
        Self {
            lease: Arc::clone(lease),
        }
    }
}

impl<T> Drop for WaiterGuard<T> {
    fn drop(&mut self) {
        self.lease.waiters.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Owned by the leader task. Dropping it (normally, on panic, or when the
/// runtime shuts down) wakes every waiter and releases the key.
struct LeaderGuard<T> {
    leases: Arc<DashMap<CooperationKey, Arc<Lease<T>>>>,
    key: CooperationKey,
    lease: Arc<Lease<T>>,
}

impl<T> Drop for LeaderGuard<T> {
    fn drop(&mut self) {
        if self.lease.publish(Err(ProxyError::CooperationAborted {
            key: self.key.to_string(),
        })) {
            warn!(key = %self.key, lease_id = %self.lease.id, "cooperation leader aborted");
        }

        let id = self.lease.id;
        self.leases.remove_if(&self.key, |_, lease| lease.id == id);
    }
}

enum Role<T> {
    Leader(Arc<Lease<T>>),
    Follower(Arc<Lease<T>>),
}

/// Single-flight coordinator with passive and active timeouts.
///
/// A passive timeout of zero disables cooperation entirely.
pub struct Cooperation<T> {
    passive_timeout: Duration,
    active_timeout: Duration,
    leases: Arc<DashMap<CooperationKey, Arc<Lease<T>>>>,
}

impl<T> Clone for Cooperation<T> {
    fn clone(&self) -> Self {
        Self {
            passive_timeout: self.passive_timeout,
            active_timeout: self.active_timeout,
            leases: Arc::clone(&self.leases),
        }
    }
}

impl<T> std::fmt::Debug for Cooperation<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cooperation")
            .field("passive_timeout", &self.passive_timeout)
            .field("active_timeout", &self.active_timeout)
            .field("in_flight", &self.leases.len())
            .finish()
    }
}

impl<T> Cooperation<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(passive_timeout: Duration, active_timeout: Duration) -> Self {
        Self {
            passive_timeout,
            active_timeout,
            leases: Arc::new(DashMap::new()),
        }
    }

    pub fn from_config(config: &CooperationConfig) -> Self {
        Self::new(config.passive_timeout(), config.active_timeout())
    }

    /// Same lease table, new timeouts. In-flight work is unaffected.
    pub fn with_timeouts(&self, passive_timeout: Duration, active_timeout: Duration) -> Self {
        Self {
            passive_timeout,
            active_timeout,
            leases: Arc::clone(&self.leases),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.passive_timeout.is_zero()
    }

    pub fn passive_timeout(&self) -> Duration {
        self.passive_timeout
    }

    pub fn active_timeout(&self) -> Duration {
        self.active_timeout
    }

    /// Number of keys with live work.
    pub fn in_flight(&self) -> usize {
        self.leases.len()
    }

    /// Followers currently waiting on the lease registered for `key`.
    pub fn waiters(&self, key: &CooperationKey) -> usize {
        self.leases
            .get(key)
            .map_or(0, |lease| lease.waiters.load(Ordering::Acquire))
    }

    /// How long the lease registered for `key` has been running.
    pub fn lease_age(&self, key: &CooperationKey) -> Option<Duration> {
        self.leases.get(key).map(|lease| lease.started.elapsed())
    }

    /// Run `work` for `key`, sharing the outcome with concurrent callers.
    ///
    /// `work` receives `true` when the caller took over from a timed-out
    /// leader and should re-check the cache before going to the origin.
    pub async fn cooperate<F, Fut>(&self, key: CooperationKey, work: F) -> ProxyResult<T>
    where
        F: Fn(bool) -> Fut,
        Fut: Future<Output = ProxyResult<T>> + Send + 'static,
    {
        if !self.is_enabled() {
            return work(false).await;
        }

        match self.register(&key) {
            Role::Leader(lease) => {
                debug!(key = %key, lease_id = %lease.id, "leading cooperation");
                let rx = lease.outcome.subscribe();
                self.spawn_leader(key.clone(), lease, work(false));
                wait_outcome(&key, rx).await
            }
            Role::Follower(lease) => {
                debug!(key = %key, lease_id = %lease.id, "joining cooperation");
                let mut rx = lease.outcome.subscribe();
                let waited = {
                    let _waiter = WaiterGuard::new(&lease);
                    timeout(self.passive_timeout, wait_outcome(&key, rx.clone())).await
                };
                match waited {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        // Outcome may have landed right at the deadline.
                        let landed = rx.borrow_and_update().clone();
                        if let Some(outcome) = landed {
                            return outcome;
                        }
                        self.take_over(key, &lease, work).await
                    }
                }
            }
        }
    }

    fn register(&self, key: &CooperationKey) -> Role<T> {
        match self.leases.entry(key.clone()) {
            Entry::Occupied(entry) => Role::Follower(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let lease = Lease::new();
                entry.insert(Arc::clone(&lease));
                Role::Leader(lease)
            }
        }
    }

    async fn take_over<F, Fut>(
        &self,
        key: CooperationKey,
        timed_out: &Arc<Lease<T>>,
        work: F,
    ) -> ProxyResult<T>
    where
        F: Fn(bool) -> Fut,
        Fut: Future<Output = ProxyResult<T>> + Send + 'static,
    {
        let role = match self.leases.entry(key.clone()) {
            Entry::Occupied(mut entry) if entry.get().id == timed_out.id => {
                let lease = Lease::new();
                entry.insert(Arc::clone(&lease));
                Role::Leader(lease)
            }
            Entry::Occupied(entry) => Role::Follower(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let lease = Lease::new();
                entry.insert(Arc::clone(&lease));
                Role::Leader(lease)
            }
        };

        let waited = match role {
            Role::Leader(lease) => {
                warn!(
                    key = %key,
                    timed_out_lease = %timed_out.id,
                    lease_id = %lease.id,
                    passive_timeout = ?self.passive_timeout,
                    "passive wait exhausted, taking over"
                );
                let rx = lease.outcome.subscribe();
                self.spawn_leader(key.clone(), lease, work(true));
                timeout(self.active_timeout, wait_outcome(&key, rx)).await
            }
            Role::Follower(lease) => {
                debug!(key = %key, lease_id = %lease.id, "joining takeover");
                let rx = lease.outcome.subscribe();
                let _waiter = WaiterGuard::new(&lease);
                timeout(self.active_timeout, wait_outcome(&key, rx)).await
            }
        };

        waited.unwrap_or_else(|_| {
            warn!(key = %key, active_timeout = ?self.active_timeout, "cooperation timed out");
            Err(ProxyError::CooperationTimeout {
                key: key.to_string(),
                timeout: self.active_timeout,
            })
        })
    }

    fn spawn_leader<Fut>(&self, key: CooperationKey, lease: Arc<Lease<T>>, work: Fut)
    where
        Fut: Future<Output = ProxyResult<T>> + Send + 'static,
    {
        let guard = LeaderGuard {
            leases: Arc::clone(&self.leases),
            key,
            lease,
        };
        tokio::spawn(async move {
            let outcome = work.await;
            debug!(
                key = %guard.key,
                lease_id = %guard.lease.id,
                elapsed = ?guard.lease.started.elapsed(),
                success = outcome.is_ok(),
                "cooperation work finished"
            );
            guard.lease.publish(outcome);
            drop(guard);
        });
    }
}

async fn wait_outcome<T: Clone>(
    key: &CooperationKey,
    mut rx: watch::Receiver<Outcome<T>>,
) -> ProxyResult<T> {
    let outcome = match rx.wait_for(Option::is_some).await {
        Ok(outcome) => outcome.clone(),
        Err(_) => None,
    };
    outcome.unwrap_or_else(|| {
        Err(ProxyError::CooperationAborted {
            key: key.to_string(),
        })
    })
}
