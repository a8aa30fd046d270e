//! Global review cooldown.
//!
//! While a cooldown is active the scheduler hands back `Continue` for every
//! step, letting the ordinary queue run without incremental items.

use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct CooldownState {
    /// When incremental items may be shown again (None = no cooldown)
    pub cooldown_until: Option<Instant>,
    /// Cooldowns started since the last clear
    pub started: u32,
}

impl CooldownState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or extend) a cooldown. A shorter request never cuts a running one short.
    pub fn start(&mut self, duration: Duration) {
        let until = Instant::now() + duration;
        self.cooldown_until = Some(match self.cooldown_until {
            Some(current) if current > until => current,
            _ => until,
        });
        self.started += 1;

        tracing::info!(secs = duration.as_secs(), started = self.started, "review cooldown started");
    }

    pub fn is_active(&self) -> bool {
        self.cooldown_until.map(|until| Instant::now() < until).unwrap_or(false)
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.cooldown_until.and_then(|until| {
            let now = Instant::now();
            if now < until { Some(until - now) } else { None }
        })
    }

    pub fn clear(&mut self) {
        self.cooldown_until = None;
        self.started = 0;
    }
}
