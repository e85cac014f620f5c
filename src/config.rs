//! Agent configuration parameters
//!
//! Everything the agent needs to know before the control loop starts:
//! tank geometry, broker endpoint and credentials, topic names, sensor
//! timing, and the publish cadence/retry policy.  Loaded once at boot
//! (NVS blob, or the bundled `config/agent.json`) and never changed at
//! runtime.

use serde::{Deserialize, Serialize};

use crate::app::inbox::MAX_TOPIC_LEN;
use crate::app::ports::ConfigError;
use crate::tank::TankGeometry;

/// Core agent configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    // --- Tank ---
    pub tank: TankGeometry,

    // --- Network ---
    /// Station credentials, only used by the firmware's link bring-up.
    pub wifi: WifiConfig,
    pub broker: BrokerConfig,
    pub topics: TopicConfig,

    // --- Sensor ---
    pub sensor: SensorTiming,

    // --- Timing ---
    /// Sleep between measurement cycles (milliseconds).
    pub sample_interval_ms: u32,
    /// Broker publish quota per minute (0 = unlimited).
    pub publish_limit_per_minute: u32,

    // --- Resilience ---
    pub connect_retry: RetryPolicy,
    pub publish_retry: RetryPolicy,
    /// Consecutive cycles whose publish retries were exhausted before the
    /// loop gives up.
    pub max_failed_cycles: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WifiConfig {
    pub ssid: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Opaque broker key / password.
    pub key: String,
    /// Overrides the MAC-derived client identifier.
    pub client_id: Option<String>,
    pub keep_alive_secs: u16,
}

impl BrokerConfig {
    /// `mqtt://host:port` URL as expected by the MQTT client.
    pub fn url(&self) -> String {
        format!("mqtt://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicConfig {
    /// Inbound command feed (subscribed).
    pub control: String,
    /// Outbound tank-level feed (published).
    pub level: String,
}

/// Trigger/echo protocol timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorTiming {
    /// Trigger held low before the pulse (µs).
    pub settle_us: u32,
    /// Trigger pulse width: 10 µs for HC-SR04, 20 µs for JSN-SR04T v3.
    pub trigger_pulse_us: u32,
    /// Upper bound on each echo edge wait (µs).
    pub echo_timeout_us: u32,
    /// Quiet period after a measurement (ms).
    pub dead_time_ms: u32,
}

impl Default for SensorTiming {
    fn default() -> Self {
        Self {
            settle_us: 2,
            trigger_pulse_us: 20,
            // HC-SR04 holds echo ~38 ms when nothing reflects.
            echo_timeout_us: 40_000,
            dead_time_ms: 20,
        }
    }
}

/// Bounded exponential backoff policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_backoff_ms: u32,
    pub max_backoff_ms: u32,
}

impl AgentConfig {
    /// Parse a JSON document (the bundled defaults file or a provisioning blob).
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(json).map_err(|_| ConfigError::Corrupted)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Range-check every field.  Invalid values are rejected, never clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tank.validate().is_err() {
            return Err(ConfigError::ValidationFailed(
                "tank diameter and height must be positive",
            ));
        }
        if self.broker.host.is_empty() {
            return Err(ConfigError::ValidationFailed("broker host must not be empty"));
        }
        if self.broker.port == 0 {
            return Err(ConfigError::ValidationFailed("broker port must be non-zero"));
        }
        if self.topics.control.is_empty() || self.topics.level.is_empty() {
            return Err(ConfigError::ValidationFailed("topic names must not be empty"));
        }
        if self.topics.control.len() > MAX_TOPIC_LEN {
            return Err(ConfigError::ValidationFailed(
                "topics.control longer than the inbox topic buffer",
            ));
        }
        if self.topics.control == self.topics.level {
            return Err(ConfigError::ValidationFailed(
                "control and level topics must differ",
            ));
        }
        if self.sensor.settle_us < 2 {
            return Err(ConfigError::ValidationFailed("sensor.settle_us must be >= 2"));
        }
        if !(10..=100).contains(&self.sensor.trigger_pulse_us) {
            return Err(ConfigError::ValidationFailed(
                "sensor.trigger_pulse_us must be 10–100",
            ));
        }
        if !(1_000..=1_000_000).contains(&self.sensor.echo_timeout_us) {
            return Err(ConfigError::ValidationFailed(
                "sensor.echo_timeout_us must be 1000–1000000",
            ));
        }
        if self.sample_interval_ms < 100 {
            return Err(ConfigError::ValidationFailed(
                "sample_interval_ms must be >= 100",
            ));
        }
        for policy in [&self.connect_retry, &self.publish_retry] {
            if policy.max_attempts == 0 {
                return Err(ConfigError::ValidationFailed("retry max_attempts must be >= 1"));
            }
            if policy.initial_backoff_ms > policy.max_backoff_ms {
                return Err(ConfigError::ValidationFailed(
                    "retry initial_backoff_ms must be <= max_backoff_ms",
                ));
            }
        }
        if self.max_failed_cycles == 0 {
            return Err(ConfigError::ValidationFailed("max_failed_cycles must be >= 1"));
        }
        Ok(())
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            tank: TankGeometry::default(),

            wifi: WifiConfig {
                ssid: "SSID_NAME".into(),
                password: "WLANPASSWORD".into(),
            },
            broker: BrokerConfig {
                host: "io.adafruit.com".into(),
                port: 1883,
                username: "UseYourAdafruitUsername".into(),
                key: "GetYourOwnAdaFruitKey".into(),
                client_id: None,
                keep_alive_secs: 30,
            },
            topics: TopicConfig {
                control: "vanjones/feeds/valvecontrol".into(),
                level: "vanjones/feeds/housewatertank".into(),
            },

            sensor: SensorTiming::default(),

            // 5 s suits bench testing; the free broker tier allows
            // 30 publishes/min, so deployments sample every few minutes.
            sample_interval_ms: 5_000,
            publish_limit_per_minute: 30,

            connect_retry: RetryPolicy {
                max_attempts: 5,
                initial_backoff_ms: 1_000,
                max_backoff_ms: 30_000,
            },
            publish_retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff_ms: 500,
                max_backoff_ms: 5_000,
            },
            max_failed_cycles: 3,
        }
    }
}
