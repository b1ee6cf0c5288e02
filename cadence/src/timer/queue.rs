/*
SPDX-FileCopyrightText: Copyright 2026 Cadence Contributors
SPDX-License-Identifier: MIT
*/

//! Pure ordering and catch-up arithmetic for the pending-fire queue.
//!
//! These are free items rather than registry internals so the deterministic
//! fire order and the missed-boundary arithmetic can be tested independently
//! of the [`TimerRegistry`](super::TimerRegistry) driver task.

use std::cmp::Ordering;
use std::time::Duration;

use tokio::time::Instant;

use super::ActionHandle;

// ── Fire ordering ─────────────────────────────────────────────────────────────

/// Class of a pending fire, used as the second comparison key.
///
/// At equal deadlines one-shots fire before repeating boundaries. That makes
/// a stop action scheduled for the same instant as a routine tick win
/// deterministically: the stop runs, cancels the tick's registration, and the
/// tick callback is skipped by the driver's cancellation re-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FireClass {
    OneShot,
    Repeating,
}

/// One entry in the registry's min-heap of upcoming fires.
///
/// Total order is `(due, class, seq)`:
///
/// 1. earlier deadline first;
/// 2. at equal deadlines, [`FireClass::OneShot`] before
///    [`FireClass::Repeating`];
/// 3. remaining ties by `seq`, the registration counter, so same-instant
///    same-class fires run in the order they were scheduled.
///
/// `seq` is assigned once at registration and kept across repeating
/// reschedules, so a long-lived repeating action never migrates behind
/// later registrations in a tie.
#[derive(Debug, Clone)]
pub struct Pending {
    pub due: Instant,
    pub class: FireClass,
    pub seq: u64,
    pub handle: ActionHandle,
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due
            .cmp(&other.due)
            .then_with(|| self.class.cmp(&other.class))
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Consistent with `cmp`: `seq` is unique per registration, so two entries
// comparing equal are the same entry.
impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

// ── Missed-boundary catch-up ──────────────────────────────────────────────────

/// Advance a repeating deadline out of the past, dropping missed boundaries.
///
/// Deadlines advance additively (`due + period`, never `now + period`), so a
/// healthy series never drifts. When the driver falls behind — a callback ran
/// longer than the period — the boundaries that are already strictly in the
/// past are dropped rather than fired back-to-back.
///
/// Returns the first boundary in the series `next, next + period, …` that is
/// not in the past (`>= now`), together with how many boundaries were
/// dropped. A boundary exactly equal to `now` is due, not missed, and is
/// returned as-is.
///
/// `period` must be non-zero; the registry enforces this at registration.
pub fn advance_past(mut next: Instant, period: Duration, now: Instant) -> (Instant, u64) {
    let mut dropped = 0u64;
    while next < now {
        next += period;
        dropped += 1;
    }
    (next, dropped)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
