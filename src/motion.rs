/*!
 # Rotation phase driver

 A finer-grained driver (100ms by default) that advances the rotation phase
 of every running device by its speed multiplier. Only devices in the
 registry's active set are visited; a stopped device costs nothing until it
 is commanded back on, and its phase holds so a later start resumes from
 where the rotation left off.
*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::device::{DeviceEvent, DeviceId, DeviceState, Registry};

/// Advances the rotation phase of every active device by one cycle.
///
/// `dt_seconds` is the cycle length; each device moves by
/// `multiplier * dt_seconds` degrees, wrapped into `[0, 360)`. Returns the
/// devices that moved.
pub(crate) fn advance_phases(
    registry: &mut Registry,
    dt_seconds: f32,
) -> Vec<(DeviceId, DeviceState)> {
    let mut changed = Vec::with_capacity(registry.active.len());

    for id in &registry.active {
        let Some(device) = registry.devices.get_mut(id) else {
            // The active set and the table are updated under one lock;
            // reaching this means a bookkeeping bug, not a caller error.
            warn!("Active device {} missing from the registry", id);
            continue;
        };

        let step = device.speed.multiplier() * dt_seconds;
        if step == 0.0 {
            continue;
        }
        device.rotation_phase = (device.rotation_phase + step).rem_euclid(360.0);
        changed.push((id.clone(), device.clone()));
    }

    changed
}

/// Periodic driver for rotation phase updates
///
/// Owned by the controller; runs until the shared stop flag is raised. A
/// device commanded to off stops being advanced at the next cycle at the
/// latest, because the stop is applied to the registry before this driver
/// can take the lock again.
pub(crate) struct MotionDriver {
    registry: Arc<RwLock<Registry>>,
    events: broadcast::Sender<DeviceEvent>,
    stop_flag: Arc<AtomicBool>,
    period: Duration,
}

impl MotionDriver {
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

    /// Advances phases until stopped.
    pub(crate) async fn run(self) {
        let dt_seconds = self.period.as_secs_f32();
        let mut interval = interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            if self.stop_flag.load(Ordering::Relaxed) {
                break;
            }

            let changed = {
                let mut registry = self.registry.write();
                advance_phases(&mut registry, dt_seconds)
            };

            for (id, state) in changed {
                let _ = self.events.send(DeviceEvent { id, state });
            }
        }

        debug!("Motion driver stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speed::SpeedLevel;

    #[test]
    fn only_running_devices_move() {
        let mut registry = Registry::default();
        let running = DeviceId::from("d1");
        let idle = DeviceId::from("d2");
        registry.register(running.clone(), None);
        registry.register(idle.clone(), None);
        registry.set_speed(&running, SpeedLevel::Low).unwrap();

        for _ in 0..5 {
            advance_phases(&mut registry, 0.1);
        }

        let moved = registry.snapshot(&running).unwrap();
        let still = registry.snapshot(&idle).unwrap();
        assert!(moved.rotation_phase > 0.0);
        assert_eq!(still.rotation_phase, 0.0);
    }

    #[test]
    fn phase_tracks_the_speed_multiplier() {
        let mut registry = Registry::default();
        let id = DeviceId::from("d1");
        registry.register(id.clone(), None);
        registry.set_speed(&id, SpeedLevel::Medium).unwrap();

        advance_phases(&mut registry, 0.1);
        let state = registry.snapshot(&id).unwrap();
        let expected = SpeedLevel::Medium.multiplier() * 0.1;
        assert!((state.rotation_phase - expected).abs() < 1e-4);
    }

    #[test]
    fn phase_wraps_into_the_circle() {
        let mut registry = Registry::default();
        let id = DeviceId::from("d1");
        registry.register(id.clone(), None);
        registry.set_speed(&id, SpeedLevel::High).unwrap();

        // 1.5s at 360 deg/s is one and a half turns
        for _ in 0..15 {
            advance_phases(&mut registry, 0.1);
        }

        let state = registry.snapshot(&id).unwrap();
        assert!(state.rotation_phase >= 0.0);
        assert!(state.rotation_phase < 360.0);
        assert!((state.rotation_phase - 180.0).abs() < 1e-2);
    }

    #[test]
    fn phase_holds_after_stop_and_resumes() {
        let mut registry = Registry::default();
        let id = DeviceId::from("d1");
        registry.register(id.clone(), None);
        registry.set_speed(&id, SpeedLevel::Low).unwrap();

        advance_phases(&mut registry, 0.5);
        let at_stop = registry.snapshot(&id).unwrap().rotation_phase;
        assert!(at_stop > 0.0);

        registry.set_speed(&id, SpeedLevel::Off).unwrap();
        for _ in 0..10 {
            let changed = advance_phases(&mut registry, 0.1);
            assert!(changed.is_empty());
        }
        assert_eq!(registry.snapshot(&id).unwrap().rotation_phase, at_stop);

        registry.set_speed(&id, SpeedLevel::Low).unwrap();
        advance_phases(&mut registry, 0.1);
        assert!(registry.snapshot(&id).unwrap().rotation_phase > at_stop);
    }

    #[test]
    fn speed_change_applies_immediately() {
        let mut registry = Registry::default();
        let id = DeviceId::from("d1");
        registry.register(id.clone(), None);
        registry.set_speed(&id, SpeedLevel::Low).unwrap();
        advance_phases(&mut registry, 0.1);
        let slow = registry.snapshot(&id).unwrap().rotation_phase;

        registry.set_speed(&id, SpeedLevel::High).unwrap();
        advance_phases(&mut registry, 0.1);
        let fast_step = registry.snapshot(&id).unwrap().rotation_phase - slow;

        assert!(fast_step > slow);
    }
}
