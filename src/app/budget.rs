//! Publish budget: keeps the agent inside the broker's per-minute quota.
//!
//! Free broker tiers throttle (or ban) clients that exceed N publishes per
//! minute.  The budget is a `burster` token bucket holding one minute of
//! quota; a cycle that finds the bucket empty skips its publish instead of
//! tripping the broker's limiter.
//!
//! `burster` refills in tokens per second, so the bucket is fed a clock
//! running at 1/60 speed: one of its "seconds" is one real minute.

use burster::Limiter;
use core::time::Duration;

pub struct PublishBudget {
    bucket: Option<burster::TokenBucket<fn() -> Duration>>,
}

impl PublishBudget {
    /// Budget of `limit` publishes per minute; `0` means unlimited.
    pub fn per_minute(limit: u32) -> Self {
        let bucket = (limit > 0).then(|| {
            burster::TokenBucket::new_with_time_provider(
                u64::from(limit),
                u64::from(limit), // a full minute of quota may be spent at once
                minute_clock as fn() -> Duration,
            )
        });
        Self { bucket }
    }

    /// Take one publish slot.  `false` means the quota is spent for now.
    pub fn try_acquire(&mut self) -> bool {
        match &mut self.bucket {
            Some(bucket) => bucket.try_consume(1).is_ok(),
            None => true,
        }
    }
}

/// Monotonic time slowed down 60×.
fn minute_clock() -> Duration {
    platform_now() / 60
}

#[cfg(target_os = "espidf")]
fn platform_now() -> Duration {
    // SAFETY: esp_timer_get_time has no preconditions once the timer
    // service is running, which ESP-IDF guarantees before app_main.
    let us = unsafe { esp_idf_svc::sys::esp_timer_get_time() };
    Duration::from_micros(us as u64)
}

#[cfg(not(target_os = "espidf"))]
fn platform_now() -> Duration {
    use std::time::Instant;
    static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    START.get_or_init(Instant::now).elapsed()
}
