//! Timer records and their admission-time configuration.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::{Duration, SystemTime};

/// Sentinel counter value for timers that fire until cancelled.
pub const LOOP_FOREVER: i64 = -1;

/// A scheduled callback. Runs on the tick loop's task; see the module docs
/// for the implications of long-running jobs.
pub type Job = dyn Fn() + Send + Sync;

/// Predicate gating a condition timer. Receives the wall-clock time captured
/// at the start of the scan.
pub type Condition = dyn Fn(SystemTime) -> bool + Send + Sync;

/// Configuration captured when a timer is admitted.
///
/// The recognized options are exactly the firing counter and the condition
/// predicate; everything else about a timer is positional on
/// [`Scheduler::new_timer_with`](super::Scheduler::new_timer_with).
pub struct TimerOptions {
    counter: i64,
    condition: Option<Box<Condition>>,
}

impl TimerOptions {
    pub fn new() -> Self {
        Self {
            counter: LOOP_FOREVER,
            condition: None,
        }
    }

    /// Limits the timer to `n` firings, after which it retires itself.
    ///
    /// `0` retires the timer on the next scan without ever firing. The
    /// default is [`LOOP_FOREVER`]. Cannot be combined with a condition.
    pub fn counter(mut self, n: i64) -> Self {
        self.counter = n;
        self
    }

    /// Gates the timer on `predicate` instead of an elapsed interval.
    ///
    /// A condition timer fires on every tick for which the predicate returns
    /// true; the admission interval and the firing counter do not apply.
    pub fn condition(
        mut self,
        predicate: impl Fn(SystemTime) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.condition = Some(Box::new(predicate));
        self
    }

    pub(super) fn counter_value(&self) -> i64 {
        self.counter
    }

    pub(super) fn has_condition(&self) -> bool {
        self.condition.is_some()
    }
}

impl Default for TimerOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TimerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerOptions")
            .field("counter", &self.counter)
            .field("condition", &self.condition.is_some())
            .finish()
    }
}

/// One scheduled job, immutable after admission except for the atomics.
///
/// The tick loop owns every field; producers are limited to reading, marking
/// `closed`, and forcing `counter` to zero on the non-blocking cancellation
/// path.
pub(super) struct Timer {
    id: i64,
    /// Wall-clock nanoseconds (since `UNIX_EPOCH`) captured at admission.
    created_at: i64,
    interval: Duration,
    /// Nanosecond offset from `created_at` of the next scheduled firing.
    elapse: AtomicI64,
    closed: AtomicBool,
    counter: AtomicI64,
    job: Box<Job>,
    condition: Option<Box<Condition>>,
}

impl Timer {
    pub(super) fn new(
        id: i64,
        created_at: i64,
        interval: Duration,
        job: Box<Job>,
        options: TimerOptions,
    ) -> Self {
        Self {
            id,
            created_at,
            interval,
            // first firing happens one interval after admission
            elapse: AtomicI64::new(interval.as_nanos() as i64),
            closed: AtomicBool::new(false),
            counter: AtomicI64::new(options.counter),
            job,
            condition: options.condition,
        }
    }

    pub(super) fn id(&self) -> i64 {
        self.id
    }

    pub(super) fn job(&self) -> &Job {
        self.job.as_ref()
    }

    pub(super) fn condition(&self) -> Option<&Condition> {
        self.condition.as_deref()
    }

    pub(super) fn counter(&self) -> i64 {
        self.counter.load(Ordering::SeqCst)
    }

    /// Forces retirement at the next scan. Producer-side, never blocks.
    pub(super) fn expire(&self) {
        self.counter.store(0, Ordering::SeqCst);
    }

    /// Consumes one firing from a finite counter.
    ///
    /// A read-modify-write so a concurrent [`expire`](Self::expire) can never
    /// be overwritten back to a positive count.
    pub(super) fn consume(&self) {
        let _ = self
            .counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                if current == LOOP_FOREVER || current <= 0 {
                    None
                } else {
                    Some(current - 1)
                }
            });
    }

    /// Marks the timer cancelled. Returns false if it already was.
    pub(super) fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }

    pub(super) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Whether an interval timer's next firing is due at `now_ns`.
    pub(super) fn due(&self, now_ns: i64) -> bool {
        self.created_at + self.elapse.load(Ordering::SeqCst) <= now_ns
    }

    /// Pushes the next firing one interval further out.
    pub(super) fn advance(&self) {
        self.elapse
            .fetch_add(self.interval.as_nanos() as i64, Ordering::SeqCst);
    }
}
