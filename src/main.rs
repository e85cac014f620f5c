//! Tank-level telemetry firmware entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  UltrasonicSensor   StatusLed      EspMqttTransport            │
//! │  (DistanceSource)   (Indicator)    (TelemetryTransport)        │
//! │  NvsConfigStore     LogEventSink   Esp32TimeAdapter            │
//! │  (ConfigPort)       (EventSink)    (MonotonicClock)            │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │            ControlLoop (pure logic)                    │    │
//! │  │  FSM · TankModel · PublishBudget · Backoff             │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Wiring:
//!
//! | Signal          | GPIO |
//! |-----------------|------|
//! | Sensor trigger  | 5    |
//! | Sensor echo     | 18   |
//! | LED red (LEDC0) | 25   |
//! | LED green (LEDC1)| 26  |
//! | LED blue (LEDC2)| 27   |
#![deny(unused_must_use)]

use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};

use esp_idf_hal::delay::{Ets, FreeRtos};
use esp_idf_hal::gpio::PinDriver;
use esp_idf_hal::ledc::config::TimerConfig;
use esp_idf_hal::ledc::{LedcDriver, LedcTimerDriver, Resolution};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::units::Hertz;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};

use tanklevel::adapters::device_id;
use tanklevel::adapters::log_sink::LogEventSink;
use tanklevel::adapters::mqtt::EspMqttTransport;
use tanklevel::adapters::nvs::NvsConfigStore;
use tanklevel::adapters::time::Esp32TimeAdapter;
use tanklevel::app::ports::{ConfigError, ConfigPort};
use tanklevel::app::service::ControlLoop;
use tanklevel::config::{AgentConfig, WifiConfig};
use tanklevel::drivers::status_led::StatusLed;
use tanklevel::sensors::ultrasonic::UltrasonicSensor;

const BUNDLED_CONFIG: &str = include_str!("../config/agent.json");

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  tanklevel v{}                    ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    // ── 2. Indicator first, so boot progress is visible ───────
    let ledc_timer = LedcTimerDriver::new(
        peripherals.ledc.timer0,
        &TimerConfig::new()
            .frequency(Hertz(5_000))
            .resolution(Resolution::Bits8),
    )?;
    let led = StatusLed::new(
        LedcDriver::new(peripherals.ledc.channel0, &ledc_timer, peripherals.pins.gpio25)?,
        LedcDriver::new(peripherals.ledc.channel1, &ledc_timer, peripherals.pins.gpio26)?,
        LedcDriver::new(peripherals.ledc.channel2, &ledc_timer, peripherals.pins.gpio27)?,
    );

    // ── 3. Config: NVS blob, else bundled defaults ────────────
    let config = load_config()?;

    // ── 4. Sensor ─────────────────────────────────────────────
    let sensor = UltrasonicSensor::new(
        PinDriver::output(peripherals.pins.gpio5)?,
        PinDriver::input(peripherals.pins.gpio18)?,
        Ets,
        Esp32TimeAdapter::new(),
        config.sensor,
    );

    // ── 5. Broker transport ───────────────────────────────────
    let client_id = match &config.broker.client_id {
        Some(id) => id.clone(),
        None => device_id::client_id(&device_id::read_mac()).as_str().to_owned(),
    };
    info!("Broker client id: {}", client_id);
    let transport = EspMqttTransport::new(config.broker.clone(), &client_id);

    let wifi_config = config.wifi.clone();
    let mut control = ControlLoop::new(config, sensor, transport, led)?;
    let mut sink = LogEventSink::new();
    let mut delay = FreeRtos;

    control.start(&mut sink);

    // ── 6. Network link (precondition for the loop) ───────────
    let _wifi = bring_up_wifi(&wifi_config, peripherals.modem, sysloop, nvs_partition)?;
    control.network_ready(&mut sink);

    // ── 7. Broker session + streaming ─────────────────────────
    control.connect(&mut delay, &mut sink)?;
    match control.run(&mut delay, &mut sink) {
        Ok(()) => {
            info!("Control loop stopped");
            Ok(())
        }
        Err(e) => {
            error!("Control loop failed: {}", e);
            Err(e.into())
        }
    }
}

fn load_config() -> Result<AgentConfig> {
    let store = NvsConfigStore::new().map_err(|e| anyhow!("NVS init failed: {}", e))?;
    match store.load() {
        Ok(cfg) => {
            info!("Config loaded from NVS");
            return Ok(cfg);
        }
        Err(ConfigError::NotFound) => info!("No stored config, using bundled defaults"),
        Err(e) => warn!("NVS config unusable ({}), using bundled defaults", e),
    }

    let cfg = AgentConfig::from_json(BUNDLED_CONFIG)
        .map_err(|e| anyhow!("bundled config invalid: {}", e))?;
    if let Err(e) = store.save(&cfg) {
        warn!("Could not persist bundled config: {}", e);
    }
    Ok(cfg)
}

fn bring_up_wifi(
    cfg: &WifiConfig,
    modem: esp_idf_hal::modem::Modem,
    sysloop: EspSystemEventLoop,
    nvs: EspDefaultNvsPartition,
) -> Result<BlockingWifi<EspWifi<'static>>> {
    let mut wifi = BlockingWifi::wrap(EspWifi::new(modem, sysloop.clone(), Some(nvs))?, sysloop)?;

    let auth_method = if cfg.password.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPA2Personal
    };
    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: cfg
            .ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("SSID longer than 32 bytes"))?,
        password: cfg
            .password
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("password longer than 64 bytes"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("WiFi: connecting to '{}'", cfg.ssid);
    wifi.connect().context("WiFi association failed")?;
    wifi.wait_netif_up().context("WiFi DHCP failed")?;
    info!("WiFi: link up");
    Ok(wifi)
}
