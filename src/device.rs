/*!
 # Device identity and state

 The per-device record the controller and drivers mutate, plus the registry
 that owns every record. The registry is reachable only through the
 controller's lock; callers observe devices through detached [`DeviceState`]
 copies and [`DeviceEvent`] notifications.
*/

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::speed::SpeedLevel;
use crate::{Error, Result};

/// Stable identifier of a managed device, assigned by the caller
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(String);

impl DeviceId {
    /// The identifier as text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        DeviceId(id.to_string())
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        DeviceId(id)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Point-in-time state of a single device
///
/// Snapshots are detached copies; mutating the live device after taking one
/// never changes a snapshot already handed out.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeviceState {
    /// Human-readable display name
    pub name: String,
    /// Current commanded speed
    pub speed: SpeedLevel,
    /// Seconds until the device reverts to off; 0 means no countdown
    pub remaining_seconds: u32,
    /// Rotation angle in degrees, always within `[0, 360)`
    pub rotation_phase: f32,
    /// Whether the motion driver currently advances this device
    pub motion_active: bool,
}

/// Change notification delivered to subscribers
#[derive(Debug, Clone)]
pub struct DeviceEvent {
    /// Device the change applies to
    pub id: DeviceId,
    /// State after the change
    pub state: DeviceState,
}

/// Table of every registered device plus the set the motion driver advances
///
/// Owned by the controller behind a single lock; commands and both drivers
/// serialize through that lock, so per-device updates are never torn.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    pub(crate) devices: HashMap<DeviceId, DeviceState>,
    /// Ids with a running speed; kept in sync with `DeviceState::speed`
    pub(crate) active: HashSet<DeviceId>,
}

impl Registry {
    /// Creates a device at defaults, or leaves an existing one untouched.
    ///
    /// Re-registering must not reset live state: screens mount and remount
    /// without wanting to lose a running countdown. A new display name on a
    /// live device is applied, nothing else changes.
    pub(crate) fn register(&mut self, id: DeviceId, name: Option<&str>) -> Option<DeviceState> {
        match self.devices.entry(id) {
            Entry::Occupied(mut occupied) => {
                if let Some(name) = name {
                    if occupied.get().name != name {
                        occupied.get_mut().name = name.to_string();
                        return Some(occupied.get().clone());
                    }
                }
                None
            }
            Entry::Vacant(vacant) => {
                let name = name
                    .map(str::to_string)
                    .unwrap_or_else(|| vacant.key().to_string());
                let state = DeviceState {
                    name,
                    ..DeviceState::default()
                };
                Some(vacant.insert(state).clone())
            }
        }
    }

    /// Removes a device and any scheduled work for it.
    ///
    /// Returns false if the id was unknown.
    pub(crate) fn deregister(&mut self, id: &DeviceId) -> bool {
        self.active.remove(id);
        self.devices.remove(id).is_some()
    }

    /// Applies a speed command.
    ///
    /// Commanding `Off` also cancels any pending countdown: turning a device
    /// off by hand clears its schedule instead of leaving a stale countdown.
    /// Returns the new state if anything changed.
    pub(crate) fn set_speed(
        &mut self,
        id: &DeviceId,
        level: SpeedLevel,
    ) -> Result<Option<DeviceState>> {
        let device = self
            .devices
            .get_mut(id)
            .ok_or_else(|| Error::UnknownDevice(id.clone()))?;

        let before = device.clone();
        device.speed = level;
        if level.is_running() {
            device.motion_active = true;
            self.active.insert(id.clone());
        } else {
            device.remaining_seconds = 0;
            device.motion_active = false;
            self.active.remove(id);
        }

        Ok((*device != before).then(|| device.clone()))
    }

    /// Starts or replaces a countdown.
    ///
    /// Rejected while the device is off; a countdown on a stopped device
    /// would appear to do nothing. `seconds == 0` clears the countdown.
    pub(crate) fn set_timer(&mut self, id: &DeviceId, seconds: u32) -> Result<Option<DeviceState>> {
        let device = self
            .devices
            .get_mut(id)
            .ok_or_else(|| Error::UnknownDevice(id.clone()))?;

        if !device.speed.is_running() {
            return Err(Error::TimerWhileOff(id.clone()));
        }
        if device.remaining_seconds == seconds {
            return Ok(None);
        }
        device.remaining_seconds = seconds;
        Ok(Some(device.clone()))
    }

    /// Drops a countdown without touching the speed.
    pub(crate) fn clear_timer(&mut self, id: &DeviceId) -> Result<Option<DeviceState>> {
        let device = self
            .devices
            .get_mut(id)
            .ok_or_else(|| Error::UnknownDevice(id.clone()))?;

        if device.remaining_seconds == 0 {
            return Ok(None);
        }
        device.remaining_seconds = 0;
        Ok(Some(device.clone()))
    }

    /// Detached copy of a single device's state.
    pub(crate) fn snapshot(&self, id: &DeviceId) -> Result<DeviceState> {
        self.devices
            .get(id)
            .cloned()
            .ok_or_else(|| Error::UnknownDevice(id.clone()))
    }

    /// Detached copies of every device, sorted by id.
    pub(crate) fn snapshots(&self) -> Vec<(DeviceId, DeviceState)> {
        let mut all: Vec<_> = self
            .devices
            .iter()
            .map(|(id, state)| (id.clone(), state.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}
