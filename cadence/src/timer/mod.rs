//! Timer registry for Cadence.
//!
//! [`TimerRegistry`] owns every scheduled action in the process: one-shot
//! delays and fixed-schedule repeating actions, both identified by an
//! [`ActionHandle`]. A single driver task sleeps until the earliest pending
//! deadline, runs the due callbacks inline in a deterministic order, then
//! reschedules repeating actions additively so a healthy series never drifts.
//!
//! # Design decisions
//!
//! | Topic | Choice |
//! |---|---|
//! | Execution | One driver task; callbacks run inline, so a due batch is strictly sequential and an action can never overlap itself |
//! | Fire order | Min-heap on `(due, class, seq)` — see [`queue`] for the exact tie-break rules |
//! | Repeating deadlines | Additive (`due + period`, never `now + period`); boundaries the driver missed are dropped with a `warn!`, not fired back-to-back |
//! | Cancellation | Table removal plus a per-record flag that the driver re-checks immediately before each fire, so a cancel that lands first always wins |
//! | Callback failure | The `Err` is routed to the `tracing` error sink and the driver keeps running |
//!
//! # Example
//! ```rust,ignore
//! let registry = TimerRegistry::new();
//! let blink = registry.schedule_repeating(Duration::from_secs(1), move || led.toggle())?;
//! let stop = registry.schedule_once(Duration::from_secs(10), {
//!     let registry = registry.clone();
//!     move || { registry.cancel(blink); Ok(()) }
//! });
//! registry.shutdown().await;
//! ```

pub mod queue;

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{DeviceError, ScheduleError};
use queue::{advance_past, FireClass, Pending};

// ── Public types ──────────────────────────────────────────────────────────────

/// Boxed callback invoked when an action fires.
///
/// Failures are reported, not propagated: the driver logs the error and moves
/// on to the next due action.
pub type Action = Box<dyn Fn() -> Result<(), DeviceError> + Send + Sync + 'static>;

/// Opaque identifier for a scheduled action.
///
/// Returned by [`TimerRegistry::schedule_once`] and
/// [`TimerRegistry::schedule_repeating`]; pass it to
/// [`TimerRegistry::cancel`] to revoke the action. Handles are `Copy` and
/// stay valid forever: cancelling a handle whose action already fired, was
/// already cancelled, or was swept by shutdown is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionHandle(u64);

impl ActionHandle {
    pub(crate) fn from_raw(raw: u64) -> Self {
        ActionHandle(raw)
    }
}

// ── Internal state ────────────────────────────────────────────────────────────

/// Per-registration record, shared between the table and an in-flight batch.
struct ActionRecord {
    callback: Action,
    /// `Some(period)` for repeating actions, `None` for one-shots.
    period: Option<Duration>,
    /// Set by `cancel()` under the state lock. The driver re-checks it right
    /// before invoking a collected callback, which makes "cancel returned
    /// before the fire" win every same-instant race.
    cancelled: AtomicBool,
}

/// Registry state behind the mutex.
///
/// The heap may hold entries whose registration is already gone (lazy
/// deletion); the driver discards them when they surface.
struct State {
    /// Live registrations. Absence means fired (one-shot), cancelled, or
    /// never issued.
    table: HashMap<ActionHandle, Arc<ActionRecord>>,
    /// Upcoming fires, earliest first.
    heap: BinaryHeap<Reverse<Pending>>,
    /// Registration counter. Doubles as the handle id and the `seq`
    /// tie-break key, so same-instant fires run in registration order.
    next_seq: u64,
    /// Set once by `shutdown()`. Later `schedule_*` calls return inert
    /// handles instead of queueing anything.
    shutdown: bool,
    /// Driver task, taken by the first `shutdown()` call and awaited.
    driver: Option<JoinHandle<()>>,
}

struct Inner {
    state: Mutex<State>,
    /// Rung after every registration so the driver re-reads its deadline.
    bell: Notify,
}

impl Inner {
    /// A poisoned lock means some other thread panicked; the state itself is
    /// still structurally sound, so recover the guard and continue.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── TimerRegistry ─────────────────────────────────────────────────────────────

/// The process-wide home for scheduled actions.
///
/// Cheap to clone; every clone is a handle onto the same registry. The
/// embedded driver task is spawned by [`TimerRegistry::new`] and parked by
/// [`TimerRegistry::shutdown`] — dropping the last clone without calling
/// `shutdown()` leaves the driver parked on its bell forever, so owners with
/// an orderly exit path should always shut down.
#[derive(Clone)]
pub struct TimerRegistry {
    inner: Arc<Inner>,
}

impl TimerRegistry {
    /// Create a registry and spawn its driver task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new() -> Self {
        let inner = Arc::new(Inner {
            state: Mutex::new(State {
                table: HashMap::new(),
                heap: BinaryHeap::new(),
                next_seq: 0,
                shutdown: false,
                driver: None,
            }),
            bell: Notify::new(),
        });

        let driver = tokio::spawn(Self::drive(Arc::clone(&inner)));
        inner.lock().driver = Some(driver);

        info!("timer registry started");
        TimerRegistry { inner }
    }

    // ── Scheduling ────────────────────────────────────────────────────────────

    /// Register `action` to fire once, `delay` from now.
    ///
    /// A zero delay is valid and fires on the driver's next pass. There is no
    /// failure mode: `Duration` cannot encode a negative delay, and a
    /// registry that has been shut down absorbs the call (logged `warn!`)
    /// and returns an inert handle.
    pub fn schedule_once<F>(&self, delay: Duration, action: F) -> ActionHandle
    where
        F: Fn() -> Result<(), DeviceError> + Send + Sync + 'static,
    {
        let due = Instant::now() + delay;
        let mut state = self.inner.lock();
        let handle = ActionHandle::from_raw(state.next_seq);
        state.next_seq += 1;

        if state.shutdown {
            warn!(handle = handle.0, "schedule_once after shutdown — handle is inert");
            return handle;
        }

        state.table.insert(
            handle,
            Arc::new(ActionRecord {
                callback: Box::new(action),
                period: None,
                cancelled: AtomicBool::new(false),
            }),
        );
        state.heap.push(Reverse(Pending {
            due,
            class: FireClass::OneShot,
            seq: handle.0,
            handle,
        }));
        drop(state);
        self.inner.bell.notify_one();

        debug!(
            handle = handle.0,
            delay_ms = delay.as_millis() as u64,
            "one-shot scheduled"
        );
        handle
    }

    /// Register `action` to fire every `period`, on a fixed schedule.
    ///
    /// The first fire is one full period after registration, not immediate.
    /// Subsequent deadlines advance additively from the previous deadline,
    /// so callback jitter never accumulates into drift. A driver that falls
    /// behind drops the missed boundaries (see [`queue::advance_past`]).
    ///
    /// # Errors
    /// [`ScheduleError::ZeroPeriod`] if `period` is zero — the fire series
    /// would never advance.
    pub fn schedule_repeating<F>(
        &self,
        period: Duration,
        action: F,
    ) -> Result<ActionHandle, ScheduleError>
    where
        F: Fn() -> Result<(), DeviceError> + Send + Sync + 'static,
    {
        if period.is_zero() {
            return Err(ScheduleError::ZeroPeriod);
        }

        let first = Instant::now() + period;
        let mut state = self.inner.lock();
        let handle = ActionHandle::from_raw(state.next_seq);
        state.next_seq += 1;

        if state.shutdown {
            warn!(handle = handle.0, "schedule_repeating after shutdown — handle is inert");
            return Ok(handle);
        }

        state.table.insert(
            handle,
            Arc::new(ActionRecord {
                callback: Box::new(action),
                period: Some(period),
                cancelled: AtomicBool::new(false),
            }),
        );
        state.heap.push(Reverse(Pending {
            due: first,
            class: FireClass::Repeating,
            seq: handle.0,
            handle,
        }));
        drop(state);
        self.inner.bell.notify_one();

        debug!(
            handle = handle.0,
            period_ms = period.as_millis() as u64,
            "repeating action scheduled"
        );
        Ok(handle)
    }

    // ── Cancellation and introspection ────────────────────────────────────────

    /// Revoke a scheduled action.
    ///
    /// Once `cancel` returns, the callback will not start again; a callback
    /// already past the driver's cancellation re-check completes its current
    /// invocation. Idempotent, safe for stale handles, and safe to call from
    /// inside the action's own callback (the driver holds no lock while
    /// callbacks run).
    pub fn cancel(&self, handle: ActionHandle) {
        let mut state = self.inner.lock();
        if let Some(record) = state.table.remove(&handle) {
            record.cancelled.store(true, Ordering::SeqCst);
            drop(state);
            debug!(handle = handle.0, "action cancelled");
        }
    }

    /// Whether `handle` still has a live registration.
    ///
    /// `false` once a one-shot has fired, or after a cancel or shutdown.
    pub fn is_scheduled(&self, handle: ActionHandle) -> bool {
        self.inner.lock().table.contains_key(&handle)
    }

    /// Allocate a handle that was never registered.
    ///
    /// Used by the sequencer when a routine is already stopped but its API
    /// still owes the caller a handle: the id is unique and every operation
    /// on it is a no-op.
    pub(crate) fn mint_inert(&self) -> ActionHandle {
        let mut state = self.inner.lock();
        let handle = ActionHandle::from_raw(state.next_seq);
        state.next_seq += 1;
        handle
    }

    /// Drop the handles in `handles` whose registration is gone, in one pass
    /// under the lock.
    pub(crate) fn retain_scheduled(&self, handles: &mut Vec<ActionHandle>) {
        let state = self.inner.lock();
        handles.retain(|h| state.table.contains_key(h));
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Cancel everything and park the driver.
    ///
    /// Completes once the driver task has exited; actions in flight at the
    /// moment of the call finish their current invocation first. Idempotent —
    /// later calls (and later `schedule_*` calls) are absorbed.
    pub async fn shutdown(&self) {
        let driver = {
            let mut state = self.inner.lock();
            if !state.shutdown {
                state.shutdown = true;
                for record in state.table.values() {
                    record.cancelled.store(true, Ordering::SeqCst);
                }
                let swept = state.table.len();
                state.table.clear();
                state.heap.clear();
                info!(swept, "timer registry shutting down");
            }
            state.driver.take()
        };

        self.inner.bell.notify_one();
        if let Some(driver) = driver {
            // The driver never panics; a JoinError here means it was aborted
            // externally, which is just as final.
            let _ = driver.await;
        }
    }

    // ── Driver task ───────────────────────────────────────────────────────────

    /// The registry's single event loop.
    ///
    /// Each pass: collect everything due under the lock, run the callbacks
    /// with the lock released, re-queue repeating actions, then sleep until
    /// the next deadline or the next ring of the bell. The collect and
    /// bookkeeping phases contain no await points, so a due batch is atomic
    /// with respect to the Tokio clock.
    async fn drive(inner: Arc<Inner>) {
        loop {
            // Phase 1: pull every due entry, in fire order.
            let (batch, closing) = {
                let mut state = inner.lock();
                let now = Instant::now();
                let mut batch: Vec<(Pending, Arc<ActionRecord>)> = Vec::new();
                while state.heap.peek().is_some_and(|r| r.0.due <= now) {
                    let Some(Reverse(entry)) = state.heap.pop() else {
                        break;
                    };
                    // Lazy deletion: cancelled entries have no table record.
                    if let Some(record) = state.table.get(&entry.handle) {
                        batch.push((entry, Arc::clone(record)));
                    }
                }
                (batch, state.shutdown)
            };

            if closing {
                debug!("timer driver exiting");
                break;
            }

            // Phase 2: run the batch, lock released. An earlier callback may
            // cancel a later entry in the same batch, hence the re-check.
            for (entry, record) in &batch {
                if record.cancelled.load(Ordering::SeqCst) {
                    debug!(handle = entry.handle.0, "skipping cancelled action");
                    continue;
                }
                if let Err(err) = (record.callback)() {
                    error!(handle = entry.handle.0, error = %err, "scheduled action failed");
                }
            }

            // Phase 3: retire fired one-shots, advance repeating deadlines,
            // and read the next deadline for the sleep below.
            let next_due = {
                let mut state = inner.lock();
                let now = Instant::now();
                for (entry, record) in batch {
                    match record.period {
                        None => {
                            state.table.remove(&entry.handle);
                        }
                        Some(period) => {
                            if state.table.contains_key(&entry.handle)
                                && !record.cancelled.load(Ordering::SeqCst)
                            {
                                let (next, dropped) = advance_past(entry.due + period, period, now);
                                if dropped > 0 {
                                    warn!(
                                        handle = entry.handle.0,
                                        dropped,
                                        period_ms = period.as_millis() as u64,
                                        "driver fell behind — dropped missed boundaries"
                                    );
                                }
                                state.heap.push(Reverse(Pending {
                                    due: next,
                                    class: FireClass::Repeating,
                                    seq: entry.seq,
                                    handle: entry.handle,
                                }));
                            }
                        }
                    }
                }
                state.heap.peek().map(|r| r.0.due)
            };

            // Phase 4: park. A registration between the peek above and this
            // await leaves a permit on the bell, so no deadline is missed.
            match next_due {
                Some(due) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(due) => {}
                        _ = inner.bell.notified() => {}
                    }
                }
                None => inner.bell.notified().await,
            }
        }
    }
}

impl Default for TimerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
