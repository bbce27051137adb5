/*!
 # Countdown tick driver

 A single process-wide driver that fires once per tick period (one second by
 default), decrements every running countdown and reverts a device to off in
 the same step its countdown reaches zero. Devices without a countdown cost
 nothing per tick.
*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::device::{DeviceEvent, DeviceId, DeviceState, Registry};
use crate::speed::SpeedLevel;

/// Applies one tick to every device with a running countdown.
///
/// Expiry (1 -> 0) forces the speed to off and drops the device from the
/// motion active set in the same step, so no observer can see a stopped
/// device that still claims motion. Returns the devices that changed.
pub(crate) fn apply_tick(registry: &mut Registry) -> Vec<(DeviceId, DeviceState)> {
    let mut changed = Vec::new();
    let mut stopped = Vec::new();

    for (id, device) in registry.devices.iter_mut() {
        if device.remaining_seconds == 0 {
            continue;
        }

        if !device.speed.is_running() {
            // A countdown must never outlive the speed that started it.
            // Clear the stale countdown; the rest of the fleet is unaffected.
            warn!("Countdown found on stopped device {}, clearing", id);
            device.remaining_seconds = 0;
            changed.push((id.clone(), device.clone()));
            continue;
        }

        device.remaining_seconds -= 1;
        if device.remaining_seconds == 0 {
            device.speed = SpeedLevel::Off;
            device.motion_active = false;
            stopped.push(id.clone());
            debug!("Countdown elapsed on device {}, reverting to off", id);
        }
        changed.push((id.clone(), device.clone()));
    }

    for id in &stopped {
        registry.active.remove(id);
    }

    changed
}

/// Periodic driver for countdown ticks
///
/// Owned by the controller; runs until the shared stop flag is raised.
pub(crate) struct TickScheduler {
    registry: Arc<RwLock<Registry>>,
    events: broadcast::Sender<DeviceEvent>,
    stop_flag: Arc<AtomicBool>,
    period: Duration,
}

impl TickScheduler {
    pub(crate) fn new(
        registry: Arc<RwLock<Registry>>,
        events: broadcast::Sender<DeviceEvent>,
        stop_flag: Arc<AtomicBool>,
        period: Duration,
    ) -> Self {
        Self {
            registry,
            events,
            stop_flag,
            period,
        }
    }

    /// Drives countdowns until stopped.
    ///
    /// The registry lock is taken per tick and released before notifying
    /// subscribers, never held across an await.
    pub(crate) async fn run(self) {
        let mut interval = interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            if self.stop_flag.load(Ordering::Relaxed) {
                break;
            }

            let changed = {
                let mut registry = self.registry.write();
                apply_tick(&mut registry)
            };

            if !changed.is_empty() {
                trace!("Tick updated {} device(s)", changed.len());
            }
            for (id, state) in changed {
                // Subscribers may come and go; a send with no receivers is fine
                let _ = self.events.send(DeviceEvent { id, state });
            }
        }

        debug!("Tick driver stopped");
    }
}
