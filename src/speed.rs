/*!
 # Speed levels for managed devices

 This module defines the ordered set of speed levels a device can run at
 and the rotation velocity each level drives. `Off` is always the lowest
 level and the only one with zero velocity.
*/

use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Discrete speed setting of a managed device
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum SpeedLevel {
    /// Device is stopped; the only level with zero rotation velocity
    #[default]
    Off,
    /// Lowest running speed
    Low,
    /// Intermediate running speed
    Medium,
    /// Highest running speed
    High,
}

/// All levels in ascending order
pub const SPEED_LEVELS: [SpeedLevel; 4] = [
    SpeedLevel::Off,
    SpeedLevel::Low,
    SpeedLevel::Medium,
    SpeedLevel::High,
];

impl SpeedLevel {
    /// Rotation velocity for this level, in degrees per second
    pub fn multiplier(self) -> f32 {
        match self {
            SpeedLevel::Off => 0.0,
            SpeedLevel::Low => 90.0,
            SpeedLevel::Medium => 180.0,
            SpeedLevel::High => 360.0,
        }
    }

    /// The ordered enumeration of levels, for building selection UIs
    pub fn levels() -> impl Iterator<Item = SpeedLevel> {
        SPEED_LEVELS.into_iter()
    }

    /// Whether a device rotates at this level
    pub fn is_running(self) -> bool {
        self != SpeedLevel::Off
    }

    /// Level name as shown in device pickers
    pub fn name(self) -> &'static str {
        match self {
            SpeedLevel::Off => "off",
            SpeedLevel::Low => "low",
            SpeedLevel::Medium => "medium",
            SpeedLevel::High => "high",
        }
    }
}

impl fmt::Display for SpeedLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SpeedLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "off" => Ok(SpeedLevel::Off),
            "low" => Ok(SpeedLevel::Low),
            "medium" | "mid" => Ok(SpeedLevel::Medium),
            "high" => Ok(SpeedLevel::High),
            other => Err(Error::UnknownSpeedLevel(other.to_string())),
        }
    }
}
