//! Cooperative timer scheduler driving all periodic and deferred work.
//!
//! Every server process runs one [`Scheduler`]: a single long-lived tick
//! loop that owns the timer set, advances it on a fixed-period ticker, and
//! invokes due callbacks. Session expiry probes, heartbeat emissions, and
//! deferred game-logic callbacks all go through here so that handlers can
//! mutate shared state without any locking of their own.
//!
//! ## Concurrency model
//!
//! Parallel producers, single consumer. Any task may call
//! [`Scheduler::new_timer`] or [`Scheduler::remove_timer`]; both hand off
//! through bounded channels that the tick loop alone drains. The loop is the
//! only writer of the timer set, and all callbacks execute sequentially on
//! its task. Admissions and retirements arriving during a scan are deferred
//! to later loop iterations, so a callback always observes a consistent set.
//!
//! A timer never fires earlier than one tick after admission, and within a
//! single tick each timer fires at most once: a timer with a shorter
//! interval than the scheduler's precision lags rather than burst-fires.
//!
//! ## Backpressure
//!
//! `new_timer` blocks (awaits) when the admission channel is full; losing an
//! admission silently is never acceptable. `remove_timer` never blocks: when
//! the retirement channel is saturated it forces the timer's counter to zero
//! instead, and the next scan retires it.
//!
//! ## Callbacks
//!
//! Callbacks run synchronously on the tick loop. A long-running callback
//! delays every later firing in the same tick and pushes the next tick out
//! by its duration; offload heavy work to a worker task and keep the
//! callback to a channel send. A panicking callback is caught, logged with
//! its timer id, and the scan continues; the faulty timer stays scheduled.

mod error;
mod timer;

pub use error::TimerError;
pub use timer::{Condition, Job, TimerOptions, LOOP_FOREVER};

use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use timer::Timer;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Configuration for a [`Scheduler`], fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerOptions {
    /// Tick period: the lower bound on observable temporal resolution.
    pub precision: Duration,
    /// Capacity of the admission and retirement channels.
    pub backlog: usize,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            precision: Duration::from_millis(100),
            backlog: 128,
        }
    }
}

type TimerSet = Arc<RwLock<HashMap<i64, Arc<Timer>>>>;

/// The process-wide timer scheduler. See the [module docs](self).
pub struct Scheduler {
    options: SchedulerOptions,
    next_id: AtomicI64,
    timers: TimerSet,
    admission_tx: mpsc::Sender<Arc<Timer>>,
    admission_rx: Option<mpsc::Receiver<Arc<Timer>>>,
    retirement_tx: mpsc::Sender<i64>,
    retirement_rx: Option<mpsc::Receiver<i64>>,
    exit_tx: watch::Sender<bool>,
    exit_rx: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(options: SchedulerOptions) -> Self {
        // tokio bounded channels need nonzero capacity
        let backlog = options.backlog.max(1);
        let (admission_tx, admission_rx) = mpsc::channel(backlog);
        let (retirement_tx, retirement_rx) = mpsc::channel(backlog);
        let (exit_tx, exit_rx) = watch::channel(false);

        Self {
            options,
            next_id: AtomicI64::new(0),
            timers: Arc::new(RwLock::new(HashMap::new())),
            admission_tx,
            admission_rx: Some(admission_rx),
            retirement_tx,
            retirement_rx: Some(retirement_rx),
            exit_tx,
            exit_rx,
        }
    }

    pub fn options(&self) -> SchedulerOptions {
        self.options
    }

    /// Starts the tick loop on the current tokio runtime.
    ///
    /// Idempotent, and safe to call before any timer is admitted: timers
    /// admitted beforehand sit in the admission channel until the first
    /// loop iteration drains them.
    pub fn start(&mut self) {
        if *self.exit_rx.borrow() {
            return;
        }
        let (Some(admissions), Some(retirements)) =
            (self.admission_rx.take(), self.retirement_rx.take())
        else {
            return;
        };

        info!(
            "scheduler started: precision {:?}, backlog {}",
            self.options.precision,
            self.options.backlog.max(1)
        );
        tokio::spawn(run_loop(
            Arc::clone(&self.timers),
            admissions,
            retirements,
            self.retirement_tx.clone(),
            self.exit_rx.clone(),
            self.options.precision,
        ));
    }

    /// Fires the exit signal. Idempotent.
    ///
    /// The tick loop terminates at its next selection; admissions and
    /// retirements still in flight on the channels are dropped.
    pub fn stop(&self) {
        if self.exit_tx.send_replace(true) {
            return;
        }
        info!("scheduler stopping");
    }

    /// Admits a repeating timer firing every `interval`, forever.
    ///
    /// Returns the reserved timer id as soon as the record is enqueued; the
    /// timer becomes live on the tick that drains the admission channel.
    /// Blocks when the admission channel is full.
    pub async fn new_timer(
        &self,
        interval: Duration,
        job: impl Fn() + Send + Sync + 'static,
    ) -> Result<i64, TimerError> {
        self.new_timer_with(interval, job, TimerOptions::new()).await
    }

    /// Admits a timer with explicit [`TimerOptions`].
    pub async fn new_timer_with(
        &self,
        interval: Duration,
        job: impl Fn() + Send + Sync + 'static,
        options: TimerOptions,
    ) -> Result<i64, TimerError> {
        if interval.is_zero() {
            return Err(TimerError::InvalidArgument("interval must be positive"));
        }
        if options.has_condition() && options.counter_value() != LOOP_FOREVER {
            return Err(TimerError::InvalidArgument(
                "a condition timer cannot carry a firing counter",
            ));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let created_at = unix_nanos(SystemTime::now());
        let record = Arc::new(Timer::new(id, created_at, interval, Box::new(job), options));

        if self.admission_tx.send(record).await.is_err() {
            // loop already exited; shutdown is terminal, the admission is dropped
            warn!("timer {} admitted after shutdown, dropped", id);
        }
        Ok(id)
    }

    /// Cancels the timer with the given id. Never blocks.
    ///
    /// Cancellation is soft: a callback already being fired this tick cannot
    /// be aborted, but no firing happens on any tick strictly after the
    /// retirement is observed by the loop.
    pub async fn remove_timer(&self, id: i64) -> Result<(), TimerError> {
        let timers = self.timers.read().await;
        let timer = timers.get(&id).ok_or(TimerError::NotFound)?;
        if !timer.close() {
            return Err(TimerError::AlreadyClosed);
        }

        if self.retirement_tx.try_send(id).is_err() {
            // retirement channel saturated: the next scan retires it instead
            timer.expire();
            debug!("retirement backlog full, timer {} expires via scan", id);
        }
        Ok(())
    }

    /// Number of timers currently live in the set. Diagnostic only; the
    /// value is stale the moment it is returned.
    pub async fn timer_count(&self) -> usize {
        self.timers.read().await.len()
    }
}

impl fmt::Display for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Scheduler(precision={:?}, backlog={})",
            self.options.precision,
            self.options.backlog.max(1)
        )
    }
}

/// The tick loop: sole consumer of both channels, sole mutator of the set.
async fn run_loop(
    timers: TimerSet,
    mut admissions: mpsc::Receiver<Arc<Timer>>,
    mut retirements: mpsc::Receiver<i64>,
    retirement_tx: mpsc::Sender<i64>,
    mut exit: watch::Receiver<bool>,
    precision: Duration,
) {
    if *exit.borrow_and_update() {
        return;
    }

    let mut ticker = interval_at(Instant::now() + precision, precision);
    // lag under load instead of burst-firing catch-up ticks
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = exit.changed() => break,
            _ = ticker.tick() => {
                scan(&timers, &retirement_tx).await;
            }
            Some(record) = admissions.recv() => {
                timers.write().await.insert(record.id(), record);
            }
            Some(id) = retirements.recv() => {
                timers.write().await.remove(&id);
            }
        }
    }
    debug!("scheduler tick loop exited");
}

/// One tick: fire every due timer, at most once each.
async fn scan(timers: &TimerSet, retirement_tx: &mpsc::Sender<i64>) {
    let now = SystemTime::now();
    let now_ns = unix_nanos(now);

    let set = timers.read().await;
    for (id, timer) in set.iter() {
        // spent timer: hand it off for removal while the retirement channel
        // has room, otherwise retry on a later tick
        if timer.counter() == 0 {
            if retirement_tx.try_send(*id).is_ok() {
                timer.close();
            }
            continue;
        }

        if let Some(condition) = timer.condition() {
            if condition(now) {
                exec_guarded(*id, timer.job());
            }
            continue;
        }

        if timer.due(now_ns) {
            exec_guarded(*id, timer.job());
            timer.advance();
            timer.consume();
        }
    }
}

/// Runs a callback under panic isolation so one faulty timer cannot poison
/// the tick loop.
fn exec_guarded(id: i64, job: &Job) {
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| job()));
    if let Err(payload) = outcome {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!("timer {} callback panicked: {}", id, reason);
    }
}

fn unix_nanos(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_nanos() as i64
}
