use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use hexa_device_controller::*;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Demonstration of the device scheduler
    Demo {
        /// Duration of each demo step in seconds
        #[arg(short, long, default_value_t = 3)]
        duration: u32,
    },
    /// List the available speed levels
    Levels,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with pretty colors
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("hexa_device_controller=info,hexactl=info")),
        )
        .compact()
        .init();

    // Initialize color-eyre for pretty error reporting
    color_eyre::install()?;

    let cli = Cli::parse();
    debug!("Parsed command line arguments");

    match cli.command.unwrap_or(Commands::Demo { duration: 3 }) {
        Commands::Demo { duration } => {
            let controller = DeviceController::new();
            run_demo(&controller, duration).await?;
            controller.shutdown();
        }
        Commands::Levels => {
            for level in SpeedLevel::levels() {
                println!("{:<8} {:>5.0} deg/s", level.name(), level.multiplier());
            }
        }
    }

    Ok(())
}

/// Pause the demo between steps
async fn sleep(seconds: u32) {
    tokio::time::sleep(Duration::from_secs(seconds as u64)).await;
}

/// Log the current state of a device
fn log_snapshot(controller: &DeviceController, id: &DeviceId) -> hexa_device_controller::Result<()> {
    let state = controller.snapshot(id)?;
    info!(
        "{} ({}): speed={} remaining={}s phase={:.1}",
        id, state.name, state.speed, state.remaining_seconds, state.rotation_phase
    );
    Ok(())
}

/// Run a demonstration of the scheduler on the stock devices
async fn run_demo(controller: &DeviceController, duration: u32) -> Result<()> {
    info!("Running device scheduler demo with {}s steps", duration);

    let fan = DeviceId::from("living-room-fan");
    let light = DeviceId::from("bedroom-light");
    controller.register_named(fan.clone(), "Living Room Fan");
    controller.register_named(light.clone(), "Bedroom Light");

    info!("Starting the fan at low speed");
    controller.set_speed(&fan, SpeedLevel::Low)?;
    sleep(duration).await;
    log_snapshot(controller, &fan)?;

    info!("Raising the fan to high");
    controller.set_speed(&fan, SpeedLevel::High)?;
    sleep(duration).await;
    log_snapshot(controller, &fan)?;

    info!(
        "Starting the light at medium with a {}s countdown",
        duration
    );
    controller.set_speed(&light, SpeedLevel::Medium)?;
    controller.set_timer(&light, duration)?;

    // Watch change events until the countdown reverts the light to off
    let mut events = controller.subscribe();
    loop {
        match events.recv().await {
            Ok(event) if event.id == light && event.state.speed == SpeedLevel::Off => {
                info!("The light reverted to off");
                break;
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                debug!("Skipped {} change events", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
    log_snapshot(controller, &light)?;

    info!("Stopping the fan");
    controller.set_speed(&fan, SpeedLevel::Off)?;

    for (id, state) in controller.devices() {
        info!(
            "{} ({}): speed={} phase={:.1}",
            id, state.name, state.speed, state.rotation_phase
        );
    }

    info!("Demo completed!");
    Ok(())
}
