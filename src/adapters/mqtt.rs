//! MQTT telemetry transport.
//!
//! Implements [`TelemetryTransport`], the hexagonal boundary to the
//! message broker.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: [`EspMqttTransport`] over the ESP-IDF MQTT
//!   client.  The client runs its own task; its event callback keeps the
//!   connection flag current and pushes received messages into the inbox
//!   registered for the topic.
//! - **all other targets**: [`LoopbackTransport`], an in-memory broker for
//!   host-side simulation and tests.

#[cfg(not(target_os = "espidf"))]
pub use sim::LoopbackTransport;

#[cfg(target_os = "espidf")]
pub use esp::EspMqttTransport;

/// A subscribed topic and the inbox its messages go to.
struct Route {
    topic: String,
    inbox: crate::app::inbox::InboxHandle,
}

fn route_message(routes: &[Route], topic: &str, payload: &[u8]) {
    match routes.iter().find(|r| r.topic == topic) {
        Some(route) => {
            route.inbox.deliver(topic, payload);
        }
        None => log::debug!("mqtt: no route for '{}'", topic),
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF client
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod esp {
    use core::sync::atomic::{AtomicBool, Ordering};
    use core::time::Duration;
    use std::sync::{Arc, Mutex};

    use esp_idf_hal::delay::FreeRtos;
    use esp_idf_svc::mqtt::client::{EspMqttClient, EventPayload, MqttClientConfiguration, QoS};
    use log::{error, info, warn};

    use super::{route_message, Route};
    use crate::app::inbox::InboxHandle;
    use crate::app::ports::TelemetryTransport;
    use crate::config::BrokerConfig;
    use crate::error::{ConnectError, PublishError, SubscribeError};

    /// Upper bound on waiting for CONNACK after the client is created.
    const CONNECT_WAIT_MS: u32 = 10_000;
    const CONNECT_POLL_MS: u32 = 100;

    pub struct EspMqttTransport {
        broker: BrokerConfig,
        client_id: String,
        client: Option<EspMqttClient<'static>>,
        connected: Arc<AtomicBool>,
        /// Set by the callback when the broker answers with a refusal.
        refused: Arc<AtomicBool>,
        routes: Arc<Mutex<Vec<Route>>>,
        /// A session was established at least once.
        was_connected: bool,
    }

    impl EspMqttTransport {
        pub fn new(broker: BrokerConfig, client_id: &str) -> Self {
            Self {
                broker,
                client_id: client_id.to_owned(),
                client: None,
                connected: Arc::new(AtomicBool::new(false)),
                refused: Arc::new(AtomicBool::new(false)),
                routes: Arc::new(Mutex::new(Vec::new())),
                was_connected: false,
            }
        }

        fn create_client(&mut self) -> Result<(), ConnectError> {
            let conf = MqttClientConfiguration {
                client_id: Some(self.client_id.as_str()),
                username: Some(self.broker.username.as_str()),
                password: Some(self.broker.key.as_str()),
                keep_alive_interval: Some(Duration::from_secs(u64::from(self.broker.keep_alive_secs))),
                ..Default::default()
            };

            let connected = Arc::clone(&self.connected);
            let refused = Arc::clone(&self.refused);
            let routes = Arc::clone(&self.routes);

            let client = EspMqttClient::new_cb(&self.broker.url(), &conf, move |event| match event.payload() {
                EventPayload::Connected(_) => {
                    connected.store(true, Ordering::Release);
                    info!("mqtt: connected");
                }
                EventPayload::Disconnected => {
                    connected.store(false, Ordering::Release);
                    warn!("mqtt: disconnected");
                }
                EventPayload::Received { topic, data, .. } => {
                    if let (Some(topic), Ok(routes)) = (topic, routes.lock()) {
                        route_message(&routes, topic, data);
                    }
                }
                EventPayload::Error(e) => {
                    refused.store(true, Ordering::Release);
                    error!("mqtt: client error {:?}", e);
                }
                _ => {}
            })
            .map_err(|e| {
                error!("mqtt: client creation failed: {:?}", e);
                ConnectError::Transport
            })?;

            self.client = Some(client);
            Ok(())
        }
    }

    impl TelemetryTransport for EspMqttTransport {
        fn connect(&mut self) -> Result<(), ConnectError> {
            if self.client.is_none() {
                self.refused.store(false, Ordering::Release);
                self.create_client()?;
            }

            let mut waited = 0;
            while !self.connected.load(Ordering::Acquire) {
                if self.refused.load(Ordering::Acquire) {
                    self.client = None;
                    return Err(ConnectError::Refused);
                }
                if waited >= CONNECT_WAIT_MS {
                    // Drop the client so the next attempt starts clean.
                    self.client = None;
                    return Err(ConnectError::Timeout);
                }
                FreeRtos::delay_ms(CONNECT_POLL_MS);
                waited += CONNECT_POLL_MS;
            }
            self.was_connected = true;
            info!("mqtt: session open to {}", self.broker.url());
            Ok(())
        }

        fn subscribe(&mut self, topic: &str, inbox: InboxHandle) -> Result<(), SubscribeError> {
            let Some(client) = self.client.as_mut() else {
                return Err(SubscribeError::NotConnected);
            };
            if !self.connected.load(Ordering::Acquire) {
                return Err(SubscribeError::NotConnected);
            }
            client.subscribe(topic, QoS::AtLeastOnce).map_err(|e| {
                warn!("mqtt: subscribe '{}' failed: {:?}", topic, e);
                SubscribeError::Rejected
            })?;
            // Routed only once the broker accepted the filter.
            if let Ok(mut routes) = self.routes.lock() {
                routes.push(Route {
                    topic: topic.to_owned(),
                    inbox,
                });
            }
            Ok(())
        }

        fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
            let Some(client) = self.client.as_mut() else {
                return Err(PublishError::NotConnected);
            };
            if !self.connected.load(Ordering::Acquire) {
                return Err(if self.was_connected {
                    PublishError::ConnectionClosed
                } else {
                    PublishError::NotConnected
                });
            }
            client
                .publish(topic, QoS::AtLeastOnce, false, payload)
                .map(|_| ())
                .map_err(|e| {
                    warn!("mqtt: publish to '{}' failed: {:?}", topic, e);
                    PublishError::Transient
                })
        }

        fn disconnect(&mut self) {
            // Dropping the client stops its task and closes the socket.
            if self.client.take().is_some() {
                info!("mqtt: session closed");
            }
            self.connected.store(false, Ordering::Release);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Host loopback broker
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
mod sim {
    use std::collections::VecDeque;

    use log::info;

    use super::{route_message, Route};
    use crate::app::inbox::InboxHandle;
    use crate::app::ports::TelemetryTransport;
    use crate::error::{ConnectError, PublishError, SubscribeError};

    /// In-memory broker.  Publishes are recorded and, when a subscription
    /// matches the topic, looped back into its inbox.
    #[derive(Default)]
    pub struct LoopbackTransport {
        connected: bool,
        routes: Vec<Route>,
        published: Vec<(String, Vec<u8>)>,
        connect_failures: VecDeque<ConnectError>,
        publish_failures: VecDeque<PublishError>,
        reject_subscribe: bool,
        connect_calls: u32,
        disconnect_calls: u32,
    }

    impl LoopbackTransport {
        pub fn new() -> Self {
            Self::default()
        }

        // ── Fault injection ───────────────────────────────────

        /// The next `connect` calls fail with these errors, in order.
        pub fn fail_connects(&mut self, errors: impl IntoIterator<Item = ConnectError>) {
            self.connect_failures.extend(errors);
        }

        /// The next `publish` calls fail with these errors, in order.
        pub fn fail_publishes(&mut self, errors: impl IntoIterator<Item = PublishError>) {
            self.publish_failures.extend(errors);
        }

        pub fn reject_subscriptions(&mut self) {
            self.reject_subscribe = true;
        }

        /// Deliver a message as if the broker pushed it.
        pub fn inject(&self, topic: &str, payload: &[u8]) {
            route_message(&self.routes, topic, payload);
        }

        // ── Inspection ────────────────────────────────────────

        pub fn published(&self) -> &[(String, Vec<u8>)] {
            &self.published
        }

        pub fn is_connected(&self) -> bool {
            self.connected
        }

        pub fn connect_calls(&self) -> u32 {
            self.connect_calls
        }

        pub fn disconnect_calls(&self) -> u32 {
            self.disconnect_calls
        }
    }

    impl TelemetryTransport for LoopbackTransport {
        fn connect(&mut self) -> Result<(), ConnectError> {
            self.connect_calls += 1;
            if let Some(e) = self.connect_failures.pop_front() {
                return Err(e);
            }
            self.connected = true;
            info!("loopback: connected");
            Ok(())
        }

        fn subscribe(&mut self, topic: &str, inbox: InboxHandle) -> Result<(), SubscribeError> {
            if !self.connected {
                return Err(SubscribeError::NotConnected);
            }
            if self.reject_subscribe {
                return Err(SubscribeError::Rejected);
            }
            self.routes.push(Route {
                topic: topic.to_owned(),
                inbox,
            });
            Ok(())
        }

        fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
            if !self.connected {
                return Err(PublishError::NotConnected);
            }
            if let Some(e) = self.publish_failures.pop_front() {
                if e.is_fatal() {
                    self.connected = false;
                }
                return Err(e);
            }
            self.published.push((topic.to_owned(), payload.to_vec()));
            route_message(&self.routes, topic, payload);
            Ok(())
        }

        fn disconnect(&mut self) {
            self.disconnect_calls += 1;
            self.connected = false;
            self.routes.clear();
        }
    }

}
