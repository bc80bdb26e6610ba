//! SYSTEM scope provider
//!
//! SYSTEM variables are read-only and computed each time they are read.

use crate::value::Value;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Source of read-only SYSTEM variables
pub trait SystemVariables: Send + Sync {
    /// Compute the current value of `name`, `None` if it is not a system variable
    fn get(&self, name: &str) -> Option<Value>;

    /// Names this provider answers for
    fn names(&self) -> Vec<&'static str>;
}

/// System variables fed by the host server
///
/// The host pushes world state in through the setters; reads compute the
/// derived values on the spot.
pub struct HostSystemVariables {
    weather: RwLock<String>,
    world_time: AtomicU64,
    online_players: AtomicUsize,
    started: Instant,
}

impl HostSystemVariables {
    pub fn new() -> Self {
        Self {
            weather: RwLock::new("clear".to_string()),
            world_time: AtomicU64::new(0),
            online_players: AtomicUsize::new(0),
            started: Instant::now(),
        }
    }

    pub fn set_weather(&self, weather: impl Into<String>) {
        *self.weather.write() = weather.into();
    }

    /// World time in ticks (0..24000)
    pub fn set_world_time(&self, ticks: u64) {
        self.world_time.store(ticks % 24_000, Ordering::Relaxed);
    }

    pub fn set_online_players(&self, count: usize) {
        self.online_players.store(count, Ordering::Relaxed);
    }
}

impl Default for HostSystemVariables {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemVariables for HostSystemVariables {
    fn get(&self, name: &str) -> Option<Value> {
        match name {
            "time" => Some(Value::Number(self.world_time.load(Ordering::Relaxed) as f64)),
            "weather" => Some(Value::Text(self.weather.read().clone())),
            "online_players" => Some(Value::Number(self.online_players.load(Ordering::Relaxed) as f64)),
            "timestamp" => {
                let secs = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                Some(Value::Number(secs as f64))
            }
            "uptime" => Some(Value::Number(self.started.elapsed().as_secs() as f64)),
            _ => None,
        }
    }

    fn names(&self) -> Vec<&'static str> {
        vec!["time", "weather", "online_players", "timestamp", "uptime"]
    }
}
