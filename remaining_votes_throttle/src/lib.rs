//! The remaining-votes throttle mechanism
//!
//! This library coordinates the request rate of every remaining-votes
//! instance running against the same storage. Each instance reserves a fixed
//! step of debt before it issues a request and releases that step after a
//! delay equal to the debt it observed. A burst starts only once the debt has
//! been waited out.
//!
//! The coordination is advisory. There is no locking between instances and
//! concurrent updates to the counter may be lost.

#![deny(clippy::all)]
#![deny(clippy::cargo)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(missing_debug_implementations)]
#![allow(clippy::multiple_crate_versions)]

use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{
    sync::watch,
    task::JoinSet,
    time::{self, Duration},
};
use tracing::{debug, warn};

pub mod store;

pub use store::{FileStorage, MemoryStorage, Storage, ThrottleStore};

fn default_step_millis() -> u64 {
    1_000
}

fn default_key() -> String {
    store::DEFAULT_KEY.to_string()
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "snake_case")]
/// Configuration of the throttle.
pub struct Config {
    /// The debt, in milliseconds, every request reserves. Zero disables
    /// throttling.
    #[serde(default = "default_step_millis")]
    pub step_millis: u64,
    /// The storage key of the shared counter.
    #[serde(default = "default_key")]
    pub key: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            step_millis: default_step_millis(),
            key: default_key(),
        }
    }
}

#[async_trait]
/// The `Clock` used by every throttle
pub trait Clock {
    /// Wait for `millis` milliseconds
    async fn wait(&self, millis: u64);
}

#[derive(Debug, Clone, Copy, Default)]
/// A clock that operates with respect to real-clock time.
pub struct RealClock {}

#[async_trait]
impl Clock for RealClock {
    async fn wait(&self, millis: u64) {
        time::sleep(Duration::from_millis(millis)).await;
    }
}

/// A slot of debt held by one request.
///
/// Obtained from [`Throttle::reserve`] and handed back through
/// [`Throttle::release_after`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    delay_millis: u64,
}

impl Reservation {
    /// The counter value observed when the reservation was made. The slot is
    /// released this long after the request.
    #[must_use]
    pub fn delay_millis(&self) -> u64 {
        self.delay_millis
    }
}

#[derive(Debug)]
struct Inner<S, C> {
    store: ThrottleStore<S>,
    clock: C,
    step_millis: u64,
    /// Reservations made by this instance and not yet released.
    outstanding: AtomicU64,
    releases: Mutex<JoinSet<()>>,
    /// Signalled on teardown. Releases still waiting give up their slot.
    cancel: watch::Sender<bool>,
}

impl<S, C> Inner<S, C>
where
    S: Storage,
{
    async fn release(&self, slots: u64) {
        if slots == 0 {
            return;
        }
        match self
            .store
            .decrease(self.step_millis.saturating_mul(slots))
            .await
        {
            Ok(debt) => debug!("released {slots} throttle slot(s), debt now {debt}ms"),
            Err(err) => warn!("failed to release throttle slot(s): {err}"),
        }
    }

    fn take_outstanding(&self, slots: u64) -> u64 {
        let previous = self
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_sub(slots))
            })
            .unwrap_or_else(|n| n);
        previous.min(slots)
    }
}

/// The throttle mechanism
///
/// Clones share the same reservations.
#[derive(Debug)]
pub struct Throttle<S, C = RealClock> {
    inner: Arc<Inner<S, C>>,
}

impl<S, C> Clone for Throttle<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> Throttle<S, RealClock>
where
    S: Storage + 'static,
{
    /// Create a new instance of `Throttle` with a real-time clock
    #[must_use]
    pub fn new(storage: S, config: &Config) -> Self {
        Self::with_clock(storage, RealClock::default(), config)
    }
}

impl<S, C> Throttle<S, C>
where
    S: Storage + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Create a new instance of `Throttle` with the given clock
    #[must_use]
    pub fn with_clock(storage: S, clock: C, config: &Config) -> Self {
        Self {
            inner: Arc::new(Inner {
                store: ThrottleStore::new(storage, config.key.clone()),
                clock,
                step_millis: config.step_millis,
                outstanding: AtomicU64::new(0),
                releases: Mutex::new(JoinSet::new()),
                cancel: watch::Sender::new(false),
            }),
        }
    }

    /// The outstanding throttle debt, in milliseconds.
    pub async fn debt(&self) -> u64 {
        self.inner.store.get().await
    }

    /// The number of reservations this instance holds.
    #[must_use]
    pub fn outstanding(&self) -> u64 {
        self.inner.outstanding.load(Ordering::Acquire)
    }

    /// Wait out any outstanding debt before starting a burst of requests.
    pub async fn settle(&self) {
        let debt = self.debt().await;
        if debt > 0 {
            debug!("throttle debt is {debt}ms, waiting before first request");
            self.inner.clock.wait(debt).await;
        }
    }

    /// Reserve one step of debt ahead of a request.
    ///
    /// A failed write is logged and the reservation proceeds with no delay.
    pub async fn reserve(&self) -> Reservation {
        self.inner.outstanding.fetch_add(1, Ordering::AcqRel);
        let delay_millis = match self.inner.store.increase(self.inner.step_millis).await {
            Ok(debt) => debt,
            Err(err) => {
                warn!("failed to reserve throttle slot: {err}");
                0
            }
        };
        Reservation { delay_millis }
    }

    /// Release `reservation` once its delay has elapsed.
    ///
    /// The release runs in the background, see [`Throttle::drain`] and
    /// [`Throttle::teardown`].
    pub fn release_after(&self, reservation: Reservation) {
        let inner = Arc::clone(&self.inner);
        let mut cancelled = self.inner.cancel.subscribe();
        let mut releases = self
            .inner
            .releases
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Reap releases that already ran.
        while releases.try_join_next().is_some() {}
        releases.spawn(async move {
            // Only the wait is cancelled. Once a slot is taken its decrease
            // always completes.
            tokio::select! {
                () = inner.clock.wait(reservation.delay_millis) => {}
                _ = cancelled.changed() => return,
            }
            let slots = inner.take_outstanding(1);
            inner.release(slots).await;
        });
    }

    /// Wait for every scheduled release to run.
    pub async fn drain(&self) {
        let mut releases = std::mem::take(
            &mut *self
                .inner
                .releases
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if !releases.is_empty() {
            debug!("waiting on {} scheduled throttle release(s)", releases.len());
        }
        while releases.join_next().await.is_some() {}
    }

    /// Give back every slot this instance holds, right away.
    ///
    /// Scheduled releases still waiting are cancelled and their slots
    /// released together with those of requests still in flight. Releases
    /// already writing the counter are waited for. Call on shutdown so an
    /// abandoned burst leaves no debt behind.
    pub async fn teardown(&self) {
        self.inner.cancel.send_replace(true);
        let mut releases = std::mem::take(
            &mut *self
                .inner
                .releases
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        while releases.join_next().await.is_some() {}
        let slots = self.inner.take_outstanding(u64::MAX);
        debug!("throttle teardown releasing {slots} slot(s)");
        self.inner.release(slots).await;
    }
}
