use clap::Parser;
use log::info;
use server::scheduler::{Scheduler, SchedulerOptions, TimerOptions};
use server::service::{Maintenance, MaintenanceConfig, SessionHooks};
use shared::Push;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Scheduler tick period in milliseconds
    #[arg(short, long, default_value = "100")]
    precision: u64,

    /// Capacity of the timer admission/retirement channels
    #[arg(short, long, default_value = "128")]
    backlog: usize,

    /// Heartbeat emission interval in milliseconds
    #[arg(long, default_value = "1000")]
    heartbeat: u64,

    /// Session expiry probe interval in milliseconds
    #[arg(long, default_value = "5000")]
    expiry: u64,
}

/// Stand-in session collaborator that logs what a frontend node would send.
struct LoggingHooks {
    beats: AtomicU64,
}

impl SessionHooks for LoggingHooks {
    fn sweep_expired(&self) {
        info!("expiry probe: 0 sessions past deadline");
    }

    fn emit_heartbeats(&self) {
        let n = self.beats.fetch_add(1, Ordering::SeqCst) + 1;
        let frame = shared::encode(&Push {
            route: "sys.heartbeat".to_string(),
            uid: String::new(),
            data: n.to_le_bytes().to_vec(),
        })
        .map(|bytes| bytes.len())
        .unwrap_or(0);
        info!("heartbeat {} ({} byte frame)", n, frame);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Warning: RUST_LOG environment variable not set. Set it to display logs!");
        eprintln!("Recommended: RUST_LOG=info cargo run");
    }

    let args = Args::parse();
    let mut scheduler = Scheduler::new(SchedulerOptions {
        precision: Duration::from_millis(args.precision),
        backlog: args.backlog,
    });
    scheduler.start();
    let scheduler = Arc::new(scheduler);
    info!("{}", scheduler);

    let maintenance = Maintenance::start(
        &scheduler,
        MaintenanceConfig {
            heartbeat_interval: Duration::from_millis(args.heartbeat),
            expiry_interval: Duration::from_millis(args.expiry),
        },
        Arc::new(LoggingHooks {
            beats: AtomicU64::new(0),
        }),
    )
    .await?;

    // one-shot delayed action, the kind deferred game logic schedules
    scheduler
        .new_timer_with(
            Duration::from_secs(10),
            || info!("deferred action fired"),
            TimerOptions::new().counter(1),
        )
        .await?;

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    maintenance.stop(&scheduler).await?;
    scheduler.stop();
    Ok(())
}
