//! Seams between the scheduler core and the server's external collaborators.
//!
//! The transport, codec, and session store are not implemented here; this
//! module fixes the shapes they plug into. A transport task turns wire
//! frames into [`ServiceMessage`] values and sends them down a channel to
//! the service loop; the session collaborator implements [`SessionHooks`]
//! and lets [`Maintenance`] drive its periodic work through the scheduler.

use crate::scheduler::{Scheduler, TimerError};
use log::info;
use shared::{BindMsg, KickAnswer, KickMsg, Push, Request, Response};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Messages a transport hands to the service loop.
///
/// One variant per operation of the RPC surface. Request/response operations
/// carry a `oneshot` reply channel; fire-and-forget operations do not.
#[derive(Debug)]
pub enum ServiceMessage {
    /// Invoke a routed handler and reply with its response.
    Call {
        request: Request,
        reply: oneshot::Sender<Response>,
    },
    /// Deliver a server-initiated message to a bound user.
    PushToUser { push: Push },
    /// Bind a user id to the frontend node owning their connection.
    SessionBindRemote { bind: BindMsg },
    /// Evict a bound user and report whether they were connected.
    KickUser {
        kick: KickMsg,
        reply: oneshot::Sender<KickAnswer>,
    },
}

/// Periodic work a session collaborator registers with [`Maintenance`].
///
/// Both callbacks run on the scheduler's tick loop; keep them short and
/// hand anything heavy to a worker task.
pub trait SessionHooks: Send + Sync + 'static {
    /// Drop sessions whose liveness deadline has passed.
    fn sweep_expired(&self);

    /// Emit keepalives to the sessions this node fronts.
    fn emit_heartbeats(&self);
}

/// Intervals for the two maintenance timers.
#[derive(Debug, Clone, Copy)]
pub struct MaintenanceConfig {
    pub heartbeat_interval: Duration,
    pub expiry_interval: Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(1),
            expiry_interval: Duration::from_secs(5),
        }
    }
}

/// The maintenance timers a node registers at boot.
///
/// Holds the ids of the session expiry probe and the heartbeat emitter so
/// shutdown can cancel exactly what boot created.
#[derive(Debug)]
pub struct Maintenance {
    heartbeat_timer: i64,
    expiry_timer: i64,
}

impl Maintenance {
    /// Registers the expiry probe and heartbeat timers on `scheduler`.
    pub async fn start<H: SessionHooks>(
        scheduler: &Scheduler,
        config: MaintenanceConfig,
        hooks: Arc<H>,
    ) -> Result<Self, TimerError> {
        let sweeper = Arc::clone(&hooks);
        let expiry_timer = scheduler
            .new_timer(config.expiry_interval, move || sweeper.sweep_expired())
            .await?;
        let heartbeat_timer = scheduler
            .new_timer(config.heartbeat_interval, move || hooks.emit_heartbeats())
            .await?;

        info!(
            "maintenance timers registered: heartbeat #{} every {:?}, expiry #{} every {:?}",
            heartbeat_timer, config.heartbeat_interval, expiry_timer, config.expiry_interval
        );
        Ok(Self {
            heartbeat_timer,
            expiry_timer,
        })
    }

    /// Cancels both maintenance timers.
    pub async fn stop(self, scheduler: &Scheduler) -> Result<(), TimerError> {
        scheduler.remove_timer(self.heartbeat_timer).await?;
        scheduler.remove_timer(self.expiry_timer).await?;
        Ok(())
    }
}
