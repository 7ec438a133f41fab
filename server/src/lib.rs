//! # Session Server Backend
//!
//! Backend core for a session-oriented realtime game/chat server. The RPC
//! dispatch, session table, and message fan-out that surround it are plain
//! request/response plumbing over the `shared` message types; the component
//! this crate is built around is the cooperative timer scheduler that drives
//! every piece of periodic and deferred work inside a server process.
//!
//! ## Architecture
//!
//! ### Single Logical Thread for Timed Work
//! All timer callbacks execute serially on one long-running tick loop.
//! Handlers that mutate shared game state from timers therefore need no
//! locking of their own, the same way a single-threaded game loop eliminates
//! race conditions by construction.
//!
//! ### Channel Hand-off Instead of Shared Mutation
//! Timer admission and cancellation from arbitrary tasks are serialized into
//! the tick loop through bounded channels. Producers feel backpressure on
//! admission and never block on cancellation; the loop remains the only
//! writer of the timer set.
//!
//! ### Fault Containment
//! A panicking timer callback is caught, logged with its timer id, and the
//! scan continues. One faulty handler cannot take down the heartbeats and
//! expiry probes the rest of the process depends on.
//!
//! ## Module Organization
//!
//! ### Scheduler Module (`scheduler`)
//! The core: tick loop, timer records and options, admission/retirement
//! channels, and the error taxonomy for both.
//!
//! ### Service Module (`service`)
//! The seams to the external collaborators: the typed hand-off for the RPC
//! surface (Call, PushToUser, SessionBindRemote, KickUser) and the
//! scheduler-driven maintenance glue for session expiry and heartbeats.
//!
//! ## Usage
//!
//! ```no_run
//! use server::scheduler::{Scheduler, SchedulerOptions, TimerOptions};
//! use std::time::Duration;
//!
//! # async fn demo() -> Result<(), server::scheduler::TimerError> {
//! let mut scheduler = Scheduler::new(SchedulerOptions::default());
//! scheduler.start();
//!
//! // repeating heartbeat
//! let heartbeat = scheduler
//!     .new_timer(Duration::from_secs(1), || println!("beat"))
//!     .await?;
//!
//! // one-shot deferred action
//! scheduler
//!     .new_timer_with(
//!         Duration::from_secs(30),
//!         || println!("grace period over"),
//!         TimerOptions::new().counter(1),
//!     )
//!     .await?;
//!
//! scheduler.remove_timer(heartbeat).await?;
//! scheduler.stop();
//! # Ok(())
//! # }
//! ```

pub mod scheduler;
pub mod service;
