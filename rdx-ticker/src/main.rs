use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;
use ticker::prelude::*;
use ticker::{ENGINE_NAME, VERSION};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // 2. Load the configuration, optionally from a file given on the command line.
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config =
        TickerConfig::load(config_path.as_deref()).context("Failed to load ticker configuration")?;
    info!("{} v{} starting with {:?}", ENGINE_NAME.cyan(), VERSION, config);

    // 3. Create the service and listen to its lifecycle events.
    let service = TickerService::new(config).context("Failed to create ticker service")?;
    spawn_system_listener(&service);

    // 4. Create two timers with different periods and watch their ticks.
    let frame = service.create_timer(Duration::from_millis(10));
    let slow = service.create_timer(Duration::from_millis(25));
    spawn_tick_listener("frame", &frame, 10);
    spawn_tick_listener("slow", &slow, 4);

    frame.start().context("Failed to start frame timer")?;
    slow.start().context("Failed to start slow timer")?;

    // 5. Let them run, then retune the frame timer and run a little longer.
    if run_for(Duration::from_secs(1)).await {
        info!("Retuning the frame timer to 5ms.");
        frame.set_speed(Duration::from_millis(5));
        run_for(Duration::from_millis(500)).await;
    }

    // 6. Stop everything. Stopping the last timer joins the driver thread.
    tokio::task::block_in_place(|| {
        frame.stop();
        slow.stop();
    });
    println!(
        "{} frame: {} ticks, slow: {} ticks",
        "-->".green().bold(),
        frame.count(),
        slow.count()
    );

    tokio::task::block_in_place(|| {
        frame.destroy();
        slow.destroy();
        service.shutdown();
    });
    Ok(())
}

/// Sleeps for `duration`, returning `false` early if Ctrl+C is pressed.
async fn run_for(duration: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received.");
            false
        }
    }
}

fn spawn_system_listener(service: &TickerService) {
    let mut system_rx = service.subscribe_system_events();
    tokio::spawn(async move {
        while let Ok(event) = system_rx.recv().await {
            info!("[SYSTEM] => {:?}", event);
        }
    });
}

/// Prints every `every`-th tick of `timer`.
fn spawn_tick_listener(label: &'static str, timer: &Timer, every: i64) {
    let mut tick_rx = timer.subscribe();
    tokio::spawn(async move {
        loop {
            match tick_rx.recv().await {
                Ok(event) if event.count % every == 0 => {
                    info!(
                        "[{}] tick #{} at {:.3}s",
                        label.yellow(),
                        event.count,
                        event.timestamp.as_secs_f64()
                    );
                }
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => warn!("[{}] missed {} ticks", label, missed),
                Err(RecvError::Closed) => break,
            }
        }
    });
}
