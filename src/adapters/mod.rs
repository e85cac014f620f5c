//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter      | Implements         | Connects to                   |
//! |--------------|--------------------|-------------------------------|
//! | `device_id`  | -                  | eFuse factory MAC             |
//! | `log_sink`   | EventSink          | Serial log output             |
//! | `mqtt`       | TelemetryTransport | ESP-IDF MQTT / loopback broker|
//! | `nvs`        | ConfigPort         | NVS / in-memory store         |
//! | `time`       | MonotonicClock     | ESP32 system timer            |

pub mod device_id;
pub mod log_sink;
pub mod mqtt;
pub mod nvs;
pub mod time;
