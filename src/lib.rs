/*!
 # Hexa Device Controller Library

 A Rust library for managing the runtime state of smart home devices
 (fans, switches, lights): discrete speed levels, countdown timers that
 revert a device to off when they elapse, and a continuously advancing
 rotation phase derived from the current speed.

 ## Features

 * Per-device speed levels with an ordered speed table
 * Countdown timers with automatic revert to off on expiry
 * Rotation phase animation driven at a configurable rate
 * Concurrent tick and motion drivers owned by the controller
 * Read-only snapshots and change subscriptions for UI layers

 ## Example

 ```rust
 use hexa_device_controller::*;

 #[tokio::main]
 async fn main() -> Result<()> {
     // Initialize tracing for logs
     tracing_subscriber::fmt::init();

     // Create the controller; this spawns the tick and motion drivers
     let controller = DeviceController::new();

     // Register a device and drive it
     let fan = DeviceId::from("living-room-fan");
     controller.register(fan.clone());
     controller.set_speed(&fan, SpeedLevel::Medium)?;
     controller.set_timer(&fan, 30)?; // revert to off after 30 seconds

     let state = controller.snapshot(&fan)?;
     println!("{} is running at {}", fan, state.speed);

     Ok(())
 }
 ```
*/

use thiserror::Error;

/// Custom error types for the device controller library
#[derive(Error, Debug)]
pub enum Error {
    /// Command referenced a device id that was never registered
    #[error("Unknown device: {0}")]
    UnknownDevice(crate::device::DeviceId),

    /// Countdown requested while the device is off
    #[error("Cannot set a timer on device {0} while it is off")]
    TimerWhileOff(crate::device::DeviceId),

    /// Speed level name did not match any known level
    #[error("Unknown speed level: {0:?}")]
    UnknownSpeedLevel(String),
}

// Import needed for Result type extension
pub type Result<T> = std::result::Result<T, Error>;

// Re-export modules
pub mod controller;
pub mod device;
pub mod motion;
pub mod scheduler;
pub mod speed;

// Re-export key types
pub use controller::{ControllerConfig, DeviceController};
pub use device::{DeviceEvent, DeviceId, DeviceState};
pub use speed::SpeedLevel;
