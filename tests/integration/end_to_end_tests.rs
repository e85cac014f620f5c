//! End-to-end: the real ultrasonic driver, status LED driver and loopback
//! broker wired into a ControlLoop, on a simulated bench.
//!
//! The bench is one fake microsecond clock shared by the pins and the
//! delays; the echo line answers each trigger after a scripted time of
//! flight.

use std::cell::Cell;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType as PinErrorType, InputPin, OutputPin};
use embedded_hal::pwm::{ErrorType as PwmErrorType, SetDutyCycle};

use tanklevel::adapters::log_sink::LogEventSink;
use tanklevel::adapters::mqtt::LoopbackTransport;
use tanklevel::app::ports::MonotonicClock;
use tanklevel::app::service::{ControlLoop, CycleOutcome};
use tanklevel::config::AgentConfig;
use tanklevel::drivers::status_led::{StatusLed, DIM_BLUE, GREEN, WHITE};
use tanklevel::error::{EchoEdge, SensorError};
use tanklevel::fsm::OperationalState;
use tanklevel::sensors::ultrasonic::UltrasonicSensor;

const CONTROL: &str = "vanjones/feeds/valvecontrol";
const LEVEL: &str = "vanjones/feeds/housewatertank";

/// Echo starts this long after the trigger pulse ends.
const ECHO_LATENCY_US: u64 = 50;

#[derive(Default)]
struct Bench {
    now_us: Cell<u64>,
    armed: Cell<bool>,
    fired_at: Cell<Option<u64>>,
    /// `None` simulates a disconnected sensor.
    round_trip_us: Cell<Option<u64>>,
}

impl Bench {
    fn advance(&self, us: u64) {
        self.now_us.set(self.now_us.get() + us);
    }

    /// Round trip for a target `cm` away.
    fn set_distance_cm(&self, cm: f32) {
        self.round_trip_us.set(Some((cm * 2.0 / 0.034).round() as u64));
    }
}

struct BenchClock(Rc<Bench>);

impl MonotonicClock for BenchClock {
    fn now_us(&self) -> u64 {
        self.0.advance(1);
        self.0.now_us.get()
    }
}

struct BenchDelay(Rc<Bench>);

impl DelayNs for BenchDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.0.advance(u64::from(ns.div_ceil(1_000)));
    }
}

struct Trigger(Rc<Bench>);

impl PinErrorType for Trigger {
    type Error = core::convert::Infallible;
}

impl OutputPin for Trigger {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        if self.0.armed.replace(false) {
            self.0.fired_at.set(Some(self.0.now_us.get()));
        }
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.armed.set(true);
        Ok(())
    }
}

struct Echo(Rc<Bench>);

impl PinErrorType for Echo {
    type Error = core::convert::Infallible;
}

impl InputPin for Echo {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        let (Some(fired), Some(rtt)) = (self.0.fired_at.get(), self.0.round_trip_us.get()) else {
            return Ok(false);
        };
        let t = self.0.now_us.get();
        let rise = fired + ECHO_LATENCY_US;
        Ok(t >= rise && t < rise + rtt)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|h| !h)
    }
}

#[derive(Clone, Default)]
struct Channel(Rc<Cell<u16>>);

impl PwmErrorType for Channel {
    type Error = core::convert::Infallible;
}

impl SetDutyCycle for Channel {
    fn max_duty_cycle(&self) -> u16 {
        255
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
        self.0.set(duty);
        Ok(())
    }
}

type BenchLoop = ControlLoop<
    UltrasonicSensor<Trigger, Echo, BenchDelay, BenchClock>,
    LoopbackTransport,
    StatusLed<Channel, Channel, Channel>,
>;

fn rig() -> (BenchLoop, Rc<Bench>, BenchDelay) {
    let bench = Rc::new(Bench::default());
    let config = AgentConfig::default();
    let sensor = UltrasonicSensor::new(
        Trigger(Rc::clone(&bench)),
        Echo(Rc::clone(&bench)),
        BenchDelay(Rc::clone(&bench)),
        BenchClock(Rc::clone(&bench)),
        config.sensor,
    );
    let led = StatusLed::new(Channel::default(), Channel::default(), Channel::default());
    let control = ControlLoop::new(config, sensor, LoopbackTransport::new(), led).unwrap();
    let delay = BenchDelay(Rc::clone(&bench));
    (control, bench, delay)
}

fn last_published(control: &BenchLoop) -> (String, f32) {
    let (topic, payload) = control.transport().published().last().unwrap().clone();
    let percent = String::from_utf8(payload).unwrap().parse().unwrap();
    (topic, percent)
}

#[test]
fn measure_publish_command_stop() {
    let (mut control, bench, mut delay) = rig();
    let mut sink = LogEventSink::new();

    control.start(&mut sink);
    control.network_ready(&mut sink);
    control.connect(&mut delay, &mut sink).unwrap();
    assert!(control.transport().is_connected());

    // Half-full tank: 150 cm air gap in a 300 cm tank.
    bench.set_distance_cm(150.0);
    assert!(matches!(control.cycle(&mut delay, &mut sink), CycleOutcome::Published(_)));
    let (topic, percent) = last_published(&control);
    assert_eq!(topic, LEVEL);
    assert!((percent - 50.0).abs() < 0.01, "got {}", percent);
    assert_eq!(control.indicator().current_colour(), GREEN);

    // Remote ON arrives between cycles.
    control.transport().inject(CONTROL, b"ON");
    bench.set_distance_cm(60.0);
    control.cycle(&mut delay, &mut sink);
    assert_eq!(control.indicator().current_colour(), WHITE);
    let (_, percent) = last_published(&control);
    assert!((percent - 80.0).abs() < 0.01, "got {}", percent);

    control.stop_handle().request();
    assert_eq!(control.cycle(&mut delay, &mut sink), CycleOutcome::Stopped);
    assert_eq!(control.state(), OperationalState::Stopped);
    assert_eq!(control.indicator().current_colour(), DIM_BLUE);
    assert_eq!(control.transport().disconnect_calls(), 1);
    assert!(!control.transport().is_connected());
}

#[test]
fn disconnected_sensor_skips_publish() {
    let (mut control, _bench, mut delay) = rig();
    let mut sink = LogEventSink::new();

    control.start(&mut sink);
    control.network_ready(&mut sink);
    control.connect(&mut delay, &mut sink).unwrap();

    assert_eq!(
        control.cycle(&mut delay, &mut sink),
        CycleOutcome::Skipped(SensorError::Timeout(EchoEdge::Rising))
    );
    assert!(control.transport().published().is_empty());
    assert_eq!(control.state(), OperationalState::Streaming);
}
