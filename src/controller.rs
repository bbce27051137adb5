/*!
 # Device controller facade

 The public API surface of the crate. A [`DeviceController`] owns the device
 registry and both periodic drivers; UI layers issue commands through it and
 consume state through snapshots or a change subscription. All commands are
 synchronous, validate their input, and leave state untouched on failure.
*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument};

use crate::device::{DeviceEvent, DeviceId, DeviceState, Registry};
use crate::motion::MotionDriver;
use crate::scheduler::TickScheduler;
use crate::speed::SpeedLevel;
use crate::Result;

/// Timing and buffering settings for a controller
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Countdown tick period
    pub tick_period: Duration,
    /// Rotation phase update period
    pub motion_period: Duration,
    /// Change events buffered per subscriber before the oldest are dropped
    pub event_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_secs(1),
            motion_period: Duration::from_millis(100),
            event_capacity: 256,
        }
    }
}

/// Owner of the device registry and its two drivers
///
/// Commands, ticks and motion cycles all serialize through the registry
/// lock, so the externally visible history of any single device is a clean
/// sequence of valid states. Dropping the controller stops both drivers.
pub struct DeviceController {
    /// Shared device table; the only state in the system
    registry: Arc<RwLock<Registry>>,
    /// Change notifications for push-based consumers
    events: broadcast::Sender<DeviceEvent>,
    /// Raised to stop both drivers
    stop_flag: Arc<AtomicBool>,
}

impl DeviceController {
    /// Creates a controller with default timing and spawns its drivers.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new() -> Self {
        Self::with_config(ControllerConfig::default())
    }

    /// Creates a controller with custom timing and spawns its drivers.
    pub fn with_config(config: ControllerConfig) -> Self {
        let registry = Arc::new(RwLock::new(Registry::default()));
        let (events, _) = broadcast::channel(config.event_capacity);
        let stop_flag = Arc::new(AtomicBool::new(false));

        let tick = TickScheduler::new(
            registry.clone(),
            events.clone(),
            stop_flag.clone(),
            config.tick_period,
        );
        let motion = MotionDriver::new(
            registry.clone(),
            events.clone(),
            stop_flag.clone(),
            config.motion_period,
        );
        tokio::spawn(tick.run());
        tokio::spawn(motion.run());

        debug!(
            "Controller started (tick {:?}, motion {:?})",
            config.tick_period, config.motion_period
        );

        Self {
            registry,
            events,
            stop_flag,
        }
    }

    /// Registers a device at defaults.
    ///
    /// Idempotent: registering a live id changes nothing, so screens can
    /// mount and remount without losing a running countdown.
    #[instrument(skip(self))]
    pub fn register(&self, id: DeviceId) {
        let created = { self.registry.write().register(id.clone(), None) };
        if let Some(state) = created {
            info!("Registered device {}", id);
            self.publish(id, state);
        }
    }

    /// Registers a device with a display name, or renames a live one.
    #[instrument(skip(self))]
    pub fn register_named(&self, id: DeviceId, name: &str) {
        let changed = { self.registry.write().register(id.clone(), Some(name)) };
        if let Some(state) = changed {
            info!("Registered device {} as {:?}", id, state.name);
            self.publish(id, state);
        }
    }

    /// Removes a device and cancels all scheduled work for it.
    ///
    /// Once this returns, no later tick or motion cycle can touch the id:
    /// removal happens under the same lock the drivers take. Unknown ids
    /// are ignored.
    #[instrument(skip(self))]
    pub fn deregister(&self, id: &DeviceId) {
        let removed = { self.registry.write().deregister(id) };
        if removed {
            info!("Deregistered device {}", id);
        }
    }

    /// Sets the speed of a device.
    ///
    /// Commanding off also clears any pending countdown; leaving off starts
    /// the rotation from the phase the device last held.
    #[instrument(skip(self))]
    pub fn set_speed(&self, id: &DeviceId, level: SpeedLevel) -> Result<()> {
        let changed = { self.registry.write().set_speed(id, level)? };
        if let Some(state) = changed {
            info!("Speed of {} set to {}", id, level);
            self.publish(id.clone(), state);
        }
        Ok(())
    }

    /// Starts a countdown after which the device reverts to off.
    ///
    /// Replaces any countdown already running. Fails if the device is off;
    /// zero seconds behaves exactly like [`clear_timer`](Self::clear_timer).
    #[instrument(skip(self))]
    pub fn set_timer(&self, id: &DeviceId, seconds: u32) -> Result<()> {
        let changed = { self.registry.write().set_timer(id, seconds)? };
        if let Some(state) = changed {
            info!("Timer of {} set to {}s", id, seconds);
            self.publish(id.clone(), state);
        }
        Ok(())
    }

    /// Cancels a countdown without changing the speed.
    #[instrument(skip(self))]
    pub fn clear_timer(&self, id: &DeviceId) -> Result<()> {
        let changed = { self.registry.write().clear_timer(id)? };
        if let Some(state) = changed {
            info!("Timer of {} cleared", id);
            self.publish(id.clone(), state);
        }
        Ok(())
    }

    /// Returns a read-only copy of a device's current state.
    ///
    /// The copy is detached: later scheduler activity never mutates it.
    pub fn snapshot(&self, id: &DeviceId) -> Result<DeviceState> {
        self.registry.read().snapshot(id)
    }

    /// Returns detached copies of every device, sorted by id.
    pub fn devices(&self) -> Vec<(DeviceId, DeviceState)> {
        self.registry.read().snapshots()
    }

    /// Subscribes to change events.
    ///
    /// One event is delivered per device that changed per command, tick or
    /// motion cycle; devices that did not change produce nothing. Slow
    /// subscribers lose the oldest events rather than stalling the drivers.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    /// Stops both drivers. Device state stays readable afterwards.
    pub fn shutdown(&self) {
        info!("Stopping controller drivers");
        self.stop_flag.store(true, Ordering::Relaxed);
    }

    fn publish(&self, id: DeviceId, state: DeviceState) {
        // Subscribers may come and go; a send with no receivers is fine
        let _ = self.events.send(DeviceEvent { id, state });
    }
}

impl Default for DeviceController {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DeviceController {
    fn drop(&mut self) {
        // Ensure the driver tasks exit cleanly
        self.stop_flag.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use tokio::sync::broadcast::error::TryRecvError;

    fn controller() -> DeviceController {
        DeviceController::new()
    }

    fn assert_motion_matches_speed(state: &DeviceState) {
        assert_eq!(state.motion_active, state.speed.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn register_is_idempotent() {
        let controller = controller();
        let id = DeviceId::from("d1");
        controller.register(id.clone());
        controller.set_speed(&id, SpeedLevel::Low).unwrap();
        controller.set_timer(&id, 30).unwrap();
        let before = controller.snapshot(&id).unwrap();

        controller.register(id.clone());
        assert_eq!(controller.snapshot(&id).unwrap(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn invariants_hold_after_every_command() {
        let controller = controller();
        let id = DeviceId::from("d1");
        controller.register(id.clone());
        assert_motion_matches_speed(&controller.snapshot(&id).unwrap());

        controller.set_speed(&id, SpeedLevel::Medium).unwrap();
        assert_motion_matches_speed(&controller.snapshot(&id).unwrap());

        controller.set_timer(&id, 10).unwrap();
        let state = controller.snapshot(&id).unwrap();
        assert_motion_matches_speed(&state);
        assert!(state.remaining_seconds == 0 || state.speed.is_running());

        controller.set_speed(&id, SpeedLevel::Off).unwrap();
        let state = controller.snapshot(&id).unwrap();
        assert_motion_matches_speed(&state);
        assert_eq!(state.remaining_seconds, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_command_leaves_state_unchanged() {
        let controller = controller();
        let id = DeviceId::from("d1");
        controller.register(id.clone());
        let before = controller.snapshot(&id).unwrap();

        assert!(matches!(
            controller.set_timer(&id, 5),
            Err(Error::TimerWhileOff(_))
        ));
        assert_eq!(controller.snapshot(&id).unwrap(), before);

        let ghost = DeviceId::from("ghost");
        assert!(matches!(
            controller.set_speed(&ghost, SpeedLevel::Low),
            Err(Error::UnknownDevice(_))
        ));
        assert!(matches!(
            controller.snapshot(&ghost),
            Err(Error::UnknownDevice(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_is_detached_from_live_state() {
        let controller = controller();
        let id = DeviceId::from("d1");
        controller.register(id.clone());
        controller.set_speed(&id, SpeedLevel::Low).unwrap();
        let snapshot = controller.snapshot(&id).unwrap();

        controller.set_speed(&id, SpeedLevel::High).unwrap();
        assert_eq!(snapshot.speed, SpeedLevel::Low);
    }

    #[tokio::test(start_paused = true)]
    async fn one_event_per_changed_device_per_command() {
        let controller = controller();
        let id = DeviceId::from("d1");
        controller.register(id.clone());
        let mut events = controller.subscribe();

        controller.set_speed(&id, SpeedLevel::Medium).unwrap();
        let event = events.try_recv().unwrap();
        assert_eq!(event.id, id);
        assert_eq!(event.state.speed, SpeedLevel::Medium);

        // A command that changes nothing must not fire
        controller.set_speed(&id, SpeedLevel::Medium).unwrap();
        controller.clear_timer(&id).unwrap();
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn devices_lists_the_whole_fleet() {
        let controller = controller();
        controller.register_named(DeviceId::from("fan-1"), "Living Room Fan");
        controller.register_named(DeviceId::from("light-2"), "Bedroom Light");

        let fleet = controller.devices();
        assert_eq!(fleet.len(), 2);
        assert_eq!(fleet[0].0.as_str(), "fan-1");
        assert_eq!(fleet[0].1.name, "Living Room Fan");
        assert_eq!(fleet[1].1.name, "Bedroom Light");
    }

    #[tokio::test(start_paused = true)]
    async fn deregister_is_silent_and_final() {
        let controller = controller();
        let id = DeviceId::from("d1");
        controller.register(id.clone());
        controller.set_speed(&id, SpeedLevel::Medium).unwrap();

        controller.deregister(&id);
        assert!(matches!(
            controller.snapshot(&id),
            Err(Error::UnknownDevice(_))
        ));

        // Unknown ids stay silent
        controller.deregister(&id);
    }
}
