//! Time utilities for the session simulation

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Longest step the simulation will integrate in one go.
/// A stalled runtime must not teleport tanks across the arena.
pub const MAX_TICK_DELTA: f32 = 0.25;

/// Nominal delta time for a tick rate (in seconds)
pub fn tick_delta(tick_rate: u32) -> f32 {
    1.0 / tick_rate.max(1) as f32
}

/// Measures the real duration between ticks.
///
/// Timers in the simulation are scaled by whatever this returns, so a late
/// tick simply integrates a longer step instead of being lost.
#[derive(Debug, Clone)]
pub struct TickClock {
    last: Instant,
    nominal: f32,
}

impl TickClock {
    pub fn new(tick_rate: u32) -> Self {
        Self {
            last: Instant::now(),
            nominal: tick_delta(tick_rate),
        }
    }

    /// Seconds since the previous lap, clamped to `(0, MAX_TICK_DELTA]`
    pub fn lap(&mut self) -> f32 {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last).as_secs_f32();
        self.last = now;
        if elapsed <= 0.0 {
            self.nominal
        } else {
            elapsed.min(MAX_TICK_DELTA)
        }
    }
}
