//! Action sequencer: routines over the timer registry.
//!
//! A [`RoutineDef`] describes a repeating actuation pattern (what to schedule
//! and when); [`Sequencer::start`] instantiates it as a running [`Routine`]
//! whose timer registrations are owned as a group. Stopping the routine —
//! from outside via [`Routine::stop`], or from inside via
//! [`RoutineCtx::stop`] when a definition gives itself a finite duration —
//! cancels every action the routine ever registered, transitively.
//!
//! ```text
//! RoutineDef ──install(ctx)──►  RoutineCtx ──schedule_*──►  TimerRegistry
//!      ↑ pattern as data             │ adopts every handle
//!                                    ▼
//!                               Routine (Running ⇄ Stopped, stop() = cancel all)
//! ```
//!
//! # Locking
//! Strict order: sequencer list → routine body → registry state. Callbacks
//! run with no lock held (the registry driver releases everything first), so
//! a callback may freely stop its own routine or schedule follow-up actions.
//!
//! Shipped definitions: [`BlinkDef`](blink::BlinkDef) for binary outputs,
//! [`SweepDef`](sweep::SweepDef) for continuous ones.

pub mod blink;
pub mod sweep;

pub use blink::BlinkDef;
pub use sweep::{SweepDef, Waypoint};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{DeviceError, ScheduleError};
use crate::timer::{ActionHandle, TimerRegistry};

// ── Definitions ───────────────────────────────────────────────────────────────

/// A routine pattern, ready to be started any number of times.
///
/// `install` registers the routine's initial actions through the context —
/// typically an immediate batch, a repeating batch-scheduler, and an optional
/// self-stop. On error the sequencer unwinds whatever was registered, so a
/// definition may simply `?` out.
pub trait RoutineDef: Send {
    fn name(&self) -> &str;
    fn install(&self, ctx: &RoutineCtx) -> Result<(), ScheduleError>;
}

/// Lifecycle of a started routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutineState {
    /// Actions are live in the registry.
    Running,
    /// Stopped (externally, or by the routine itself); every adopted action
    /// is cancelled and the state never goes back.
    Stopped,
}

// ── Shared routine state ──────────────────────────────────────────────────────

struct RoutineBody {
    /// Handles adopted by this routine and not yet known-dead. Pruned on
    /// every adoption so an endless routine does not accumulate spent
    /// one-shot handles.
    actions: Vec<ActionHandle>,
    stopped: bool,
}

struct RoutineShared {
    name: String,
    registry: TimerRegistry,
    body: Mutex<RoutineBody>,
}

impl RoutineShared {
    fn lock(&self) -> MutexGuard<'_, RoutineBody> {
        self.body.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cancel everything and mark the routine stopped. Idempotent.
    fn stop(&self) {
        let mut body = self.lock();
        if body.stopped {
            return;
        }
        body.stopped = true;
        let handles = std::mem::take(&mut body.actions);
        for handle in &handles {
            self.registry.cancel(*handle);
        }
        info!(
            routine = %self.name,
            cancelled = handles.len(),
            "routine stopped"
        );
    }
}

// ── RoutineCtx ────────────────────────────────────────────────────────────────

/// Scheduling facade handed to a routine's definition and callbacks.
///
/// Every action scheduled through the context is adopted by the routine, so
/// a later stop cancels it. Cloneable; callbacks capture their own copy.
#[derive(Clone)]
pub struct RoutineCtx {
    shared: Arc<RoutineShared>,
}

impl RoutineCtx {
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Schedule a one-shot owned by the routine.
    ///
    /// If the routine is already stopped the action is never registered and
    /// an inert handle comes back — a stop that has returned stays final even
    /// against an in-flight callback trying to schedule more work.
    pub fn schedule_once<F>(&self, delay: Duration, action: F) -> ActionHandle
    where
        F: Fn() -> Result<(), DeviceError> + Send + Sync + 'static,
    {
        let mut body = self.shared.lock();
        if body.stopped {
            debug!(routine = %self.shared.name, "schedule_once on stopped routine — inert");
            return self.shared.registry.mint_inert();
        }
        self.shared.registry.retain_scheduled(&mut body.actions);
        let handle = self.shared.registry.schedule_once(delay, action);
        body.actions.push(handle);
        handle
    }

    /// Schedule a repeating action owned by the routine.
    ///
    /// Same stopped-routine rule as [`RoutineCtx::schedule_once`]; the
    /// period check is the registry's.
    pub fn schedule_repeating<F>(
        &self,
        period: Duration,
        action: F,
    ) -> Result<ActionHandle, ScheduleError>
    where
        F: Fn() -> Result<(), DeviceError> + Send + Sync + 'static,
    {
        let mut body = self.shared.lock();
        if body.stopped {
            debug!(routine = %self.shared.name, "schedule_repeating on stopped routine — inert");
            return Ok(self.shared.registry.mint_inert());
        }
        self.shared.registry.retain_scheduled(&mut body.actions);
        let handle = self.shared.registry.schedule_repeating(period, action)?;
        body.actions.push(handle);
        Ok(handle)
    }

    /// Stop the owning routine from inside a callback.
    pub fn stop(&self) {
        self.shared.stop();
    }
}

// ── Routine ───────────────────────────────────────────────────────────────────

/// Handle onto a started routine.
///
/// Cheap to clone; all clones observe the same state. Dropping every clone
/// does not stop the routine — the sequencer keeps it alive until
/// [`Routine::stop`] or [`Sequencer::stop_all`].
#[derive(Clone)]
pub struct Routine {
    shared: Arc<RoutineShared>,
}

impl std::fmt::Debug for Routine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Routine")
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Routine {
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn state(&self) -> RoutineState {
        if self.shared.lock().stopped {
            RoutineState::Stopped
        } else {
            RoutineState::Running
        }
    }

    /// Cancel every action the routine owns. Idempotent; once this returns
    /// no adopted callback will start again.
    pub fn stop(&self) {
        self.shared.stop();
    }
}

// ── Sequencer ─────────────────────────────────────────────────────────────────

/// Owner of the started routines.
///
/// Holds a clone of the registry it schedules into plus a handle onto every
/// routine it started, so teardown is one [`Sequencer::stop_all`] away.
pub struct Sequencer {
    registry: TimerRegistry,
    routines: Mutex<Vec<Routine>>,
}

impl Sequencer {
    pub fn new(registry: TimerRegistry) -> Self {
        Sequencer {
            registry,
            routines: Mutex::new(Vec::new()),
        }
    }

    /// Instantiate `def` and set it running.
    ///
    /// On install failure every action the definition managed to register is
    /// cancelled before the error is returned — a failed start leaves no
    /// trace in the registry.
    pub fn start(&self, def: &dyn RoutineDef) -> Result<Routine, ScheduleError> {
        let shared = Arc::new(RoutineShared {
            name: def.name().to_string(),
            registry: self.registry.clone(),
            body: Mutex::new(RoutineBody {
                actions: Vec::new(),
                stopped: false,
            }),
        });
        let ctx = RoutineCtx {
            shared: Arc::clone(&shared),
        };
        let routine = Routine { shared };

        if let Err(err) = def.install(&ctx) {
            routine.stop();
            warn!(
                routine = %routine.name(),
                error = %err,
                "✗ routine failed to install — partial registrations unwound"
            );
            return Err(err);
        }

        self.lock().push(routine.clone());
        info!(routine = %routine.name(), "✓ routine started");
        Ok(routine)
    }

    /// Stop every routine this sequencer started. Already-stopped routines
    /// are skipped harmlessly.
    pub fn stop_all(&self) {
        let routines = std::mem::take(&mut *self.lock());
        let count = routines.len();
        for routine in &routines {
            routine.stop();
        }
        info!(routines = count, "sequencer drained");
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Routine>> {
        self.routines.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    /// Definition driven by a closure, for exercising the machinery without
    /// a device in the loop.
    struct ClosureDef<F>(String, F);

    impl<F> RoutineDef for ClosureDef<F>
    where
        F: Fn(&RoutineCtx) -> Result<(), ScheduleError> + Send,
    {
        fn name(&self) -> &str {
            &self.0
        }

        fn install(&self, ctx: &RoutineCtx) -> Result<(), ScheduleError> {
            (self.1)(ctx)
        }
    }

    fn def<F>(name: &str, install: F) -> ClosureDef<F>
    where
        F: Fn(&RoutineCtx) -> Result<(), ScheduleError> + Send,
    {
        ClosureDef(name.to_string(), install)
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Result<(), DeviceError> + Send + Sync + Clone)
    {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (count, move || {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[tokio::test(start_paused = true)]
    async fn started_routine_runs_and_reports_running() {
        let registry = TimerRegistry::new();
        let sequencer = Sequencer::new(registry.clone());
        let (count, bump) = counter();

        let routine = sequencer
            .start(&def("pulse", move |ctx| {
                ctx.schedule_repeating(ms(100), bump.clone())?;
                Ok(())
            }))
            .unwrap();

        assert_eq!(routine.state(), RoutineState::Running);
        assert_eq!(routine.name(), "pulse");

        sleep(ms(350)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_every_adopted_action() {
        let registry = TimerRegistry::new();
        let sequencer = Sequencer::new(registry.clone());
        let (count, bump) = counter();

        let routine = sequencer
            .start(&def("pulse", move |ctx| {
                ctx.schedule_repeating(ms(100), bump.clone())?;
                ctx.schedule_once(ms(250), bump.clone());
                Ok(())
            }))
            .unwrap();

        sleep(ms(150)).await; // one repeating fire in
        routine.stop();
        assert_eq!(routine.state(), RoutineState::Stopped);

        sleep(ms(500)).await;
        // The 100ms fire happened; the 200ms boundary and the 250ms one-shot
        // were both cancelled.
        assert_eq!(count.load(Ordering::SeqCst), 1);
        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent() {
        let registry = TimerRegistry::new();
        let sequencer = Sequencer::new(registry.clone());
        let (_, bump) = counter();

        let routine = sequencer
            .start(&def("pulse", move |ctx| {
                ctx.schedule_repeating(ms(100), bump.clone())?;
                Ok(())
            }))
            .unwrap();

        routine.stop();
        routine.stop();
        assert_eq!(routine.state(), RoutineState::Stopped);
        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn routine_can_stop_itself_from_a_callback() {
        let registry = TimerRegistry::new();
        let sequencer = Sequencer::new(registry.clone());
        let (count, bump) = counter();

        let routine = sequencer
            .start(&def("finite", move |ctx| {
                ctx.schedule_repeating(ms(100), bump.clone())?;
                let stop_ctx = ctx.clone();
                ctx.schedule_once(ms(250), move || {
                    stop_ctx.stop();
                    Ok(())
                });
                Ok(())
            }))
            .unwrap();

        sleep(ms(1_000)).await;
        assert_eq!(routine.state(), RoutineState::Stopped);
        assert_eq!(count.load(Ordering::SeqCst), 2); // 100ms and 200ms only
        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_install_unwinds_partial_registrations() {
        let registry = TimerRegistry::new();
        let sequencer = Sequencer::new(registry.clone());
        let (count, bump) = counter();
        let bump_for_def = bump.clone();

        let err = sequencer
            .start(&def("broken", move |ctx| {
                ctx.schedule_once(ms(50), bump_for_def.clone());
                // Definition bug: zero period is refused by the registry.
                ctx.schedule_repeating(Duration::ZERO, bump_for_def.clone())?;
                Ok(())
            }))
            .unwrap_err();

        assert!(matches!(err, ScheduleError::ZeroPeriod));

        sleep(ms(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0, "unwound action must not fire");
        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn scheduling_on_a_stopped_routine_is_inert() {
        let registry = TimerRegistry::new();
        let sequencer = Sequencer::new(registry.clone());
        let stash: Arc<Mutex<Option<RoutineCtx>>> = Arc::new(Mutex::new(None));

        let routine = {
            let stash = Arc::clone(&stash);
            sequencer
                .start(&def("stashing", move |ctx| {
                    *stash.lock().unwrap() = Some(ctx.clone());
                    Ok(())
                }))
                .unwrap()
        };
        routine.stop();

        let ctx = stash.lock().unwrap().clone().unwrap();
        let (count, bump) = counter();
        let handle = ctx.schedule_once(Duration::ZERO, bump);

        sleep(ms(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!registry.is_scheduled(handle));
        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_all_drains_every_routine() {
        let registry = TimerRegistry::new();
        let sequencer = Sequencer::new(registry.clone());
        let (count, bump) = counter();

        let mut routines = Vec::new();
        for name in ["a", "b", "c"] {
            let bump = bump.clone();
            routines.push(
                sequencer
                    .start(&def(name, move |ctx| {
                        ctx.schedule_repeating(ms(100), bump.clone())?;
                        Ok(())
                    }))
                    .unwrap(),
            );
        }

        sequencer.stop_all();
        sleep(ms(500)).await;

        assert_eq!(count.load(Ordering::SeqCst), 0);
        for routine in &routines {
            assert_eq!(routine.state(), RoutineState::Stopped);
        }
        registry.shutdown().await;
    }
}
