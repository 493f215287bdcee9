//! Pipeline configuration.

use std::time::Duration;

use lens_vision::BackoffPolicy;

/// Capture loop configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Capture cadence; missed ticks are skipped
    pub target_fps: u32,
    /// Max wait for one frame
    pub acquire_timeout: Duration,
    /// Reconnect schedule after a device failure
    pub backoff: BackoffPolicy,
    /// Per-subscriber bus queue depth
    pub queue_depth: usize,
    /// How long `stop` waits for the in-flight frame
    pub stop_grace: Duration,
    /// Capture is reported dead when the last frame is older than this
    pub stale_after: Duration,
    /// Health gauge refresh interval
    pub health_poll_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_fps: 30,
            acquire_timeout: Duration::from_secs(1),
            backoff: BackoffPolicy::default(),
            queue_depth: 4,
            stop_grace: Duration::from_secs(2),
            stale_after: Duration::from_secs(5),
            health_poll_interval: Duration::from_secs(5),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            target_fps: std::env::var("LENS_TARGET_FPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|fps: &u32| *fps > 0)
                .unwrap_or(30),
            acquire_timeout: Duration::from_millis(
                std::env::var("LENS_ACQUIRE_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
            backoff: BackoffPolicy {
                base: Duration::from_millis(
                    std::env::var("LENS_RECONNECT_BASE_MS")
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(100),
                ),
                cap: Duration::from_millis(
                    std::env::var("LENS_RECONNECT_CAP_MS")
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(5000),
                ),
                max_attempts: std::env::var("LENS_RECONNECT_ATTEMPTS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            },
            queue_depth: std::env::var("LENS_BUS_QUEUE_DEPTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(4),
            stop_grace: Duration::from_millis(
                std::env::var("LENS_STOP_GRACE_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2000),
            ),
            stale_after: Duration::from_secs(
                std::env::var("LENS_HEALTH_STALE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            health_poll_interval: Duration::from_secs(
                std::env::var("LENS_HEALTH_POLL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|secs: &u64| *secs > 0)
                    .unwrap_or(5),
            ),
        }
    }

    /// Interval between capture ticks.
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps.max(1) as f64)
    }
}

/// Result cache configuration.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 128 }
    }
}

impl CacheConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            capacity: std::env::var("LENS_CACHE_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(128),
        }
    }
}
