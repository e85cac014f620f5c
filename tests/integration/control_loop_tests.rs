//! Integration tests for the ControlLoop → FSM → ports pipeline.
//!
//! These run on the host and drive the loop through its whole lifecycle
//! with recording mocks: connect/subscribe, measure/publish cycles,
//! inbound commands, retries, and the stop paths.

use crate::mock_hw::{MockDelay, MockIndicator, MockSensor, MockTransport, RecordingSink, TransportCall};

use tanklevel::app::events::AgentEvent;
use tanklevel::app::ports::IndicatorSignal;
use tanklevel::app::service::{ControlLoop, CycleOutcome, StopSignal};
use tanklevel::config::AgentConfig;
use tanklevel::error::{ConnectError, EchoEdge, Error, PublishError, SensorError, SubscribeError};
use tanklevel::fsm::OperationalState;

type Loop = ControlLoop<MockSensor, MockTransport, MockIndicator>;

const CONTROL: &str = "vanjones/feeds/valvecontrol";
const LEVEL: &str = "vanjones/feeds/housewatertank";

fn build(sensor: MockSensor, transport: MockTransport, config: AgentConfig) -> (Loop, MockDelay, RecordingSink) {
    let mut control = ControlLoop::new(config, sensor, transport, MockIndicator::default()).unwrap();
    let mut sink = RecordingSink::new();
    control.start(&mut sink);
    (control, MockDelay::default(), sink)
}

/// Started, network up, connected and subscribed.
fn connected(sensor: MockSensor, transport: MockTransport) -> (Loop, MockDelay, RecordingSink) {
    let (mut control, mut delay, mut sink) = build(sensor, transport, AgentConfig::default());
    control.network_ready(&mut sink);
    control.connect(&mut delay, &mut sink).unwrap();
    delay.sleeps_ms.clear();
    (control, delay, sink)
}

fn published_percent(control: &Loop) -> Vec<f32> {
    control
        .transport()
        .publishes()
        .iter()
        .map(|p| p.parse::<f32>().unwrap())
        .collect()
}

// ── Lifecycle ─────────────────────────────────────────────────

#[test]
fn start_enters_initializing_and_shows_not_operational() {
    let (control, _, sink) = build(MockSensor::new(0.0), MockTransport::new(), AgentConfig::default());
    assert_eq!(control.state(), OperationalState::Initializing);
    assert_eq!(control.indicator().shown, [IndicatorSignal::NotOperational]);
    assert!(matches!(sink.events[0], AgentEvent::Started(OperationalState::Initializing)));
}

#[test]
fn happy_path_reaches_streaming() {
    let (mut control, mut delay, mut sink) =
        build(MockSensor::new(150.0), MockTransport::new(), AgentConfig::default());

    control.network_ready(&mut sink);
    assert_eq!(control.state(), OperationalState::NetworkReady);
    assert_eq!(control.indicator().last(), Some(IndicatorSignal::PartiallyOperational));

    control.connect(&mut delay, &mut sink).unwrap();
    assert_eq!(control.state(), OperationalState::BrokerSubscribed);
    assert_eq!(control.indicator().last(), Some(IndicatorSignal::Operational));
    assert_eq!(
        control.transport().calls[..2],
        [TransportCall::Connect, TransportCall::Subscribe(CONTROL.into())]
    );

    let outcome = control.cycle(&mut delay, &mut sink);
    assert_eq!(control.state(), OperationalState::Streaming);
    let CycleOutcome::Published(reading) = outcome else {
        panic!("expected Published, got {:?}", outcome);
    };
    assert!((reading.percent_full - 50.0).abs() < 1e-3);

    let last = control.transport().calls.last().unwrap().clone();
    let TransportCall::Publish { topic, .. } = last else {
        panic!("expected a publish, got {:?}", last);
    };
    assert_eq!(topic, LEVEL);
    assert!((published_percent(&control)[0] - 50.0).abs() < 1e-3);
}

#[test]
fn full_tank_publishes_100() {
    let (mut control, mut delay, mut sink) = connected(MockSensor::new(0.0), MockTransport::new());
    control.cycle(&mut delay, &mut sink);
    assert!((published_percent(&control)[0] - 100.0).abs() < 1e-3);
}

#[test]
fn new_rejects_invalid_config() {
    let mut config = AgentConfig::default();
    config.tank.diameter_cm = -1.0;
    let result = ControlLoop::new(config, MockSensor::new(0.0), MockTransport::new(), MockIndicator::default());
    assert!(matches!(result, Err(Error::Config(_))));
}

// ── Measurement failures ──────────────────────────────────────

#[test]
fn failed_measurement_never_publishes() {
    let sensor = MockSensor::scripted([
        Err(SensorError::Timeout(EchoEdge::Rising)),
        Err(SensorError::Gpio),
    ]);
    let (mut control, mut delay, mut sink) = connected(sensor, MockTransport::new());

    assert_eq!(
        control.cycle(&mut delay, &mut sink),
        CycleOutcome::Skipped(SensorError::Timeout(EchoEdge::Rising))
    );
    assert_eq!(control.cycle(&mut delay, &mut sink), CycleOutcome::Skipped(SensorError::Gpio));

    assert!(control.transport().publishes().is_empty());
    assert_eq!(control.state(), OperationalState::Streaming);
    assert_eq!(sink.count(|e| matches!(e, AgentEvent::CycleSkipped(_))), 2);

    // Recovers on the next good sample.
    assert!(matches!(control.cycle(&mut delay, &mut sink), CycleOutcome::Published(_)));
}

// ── Readiness ─────────────────────────────────────────────────

#[test]
fn cycle_before_connect_touches_nothing() {
    let (mut control, mut delay, mut sink) =
        build(MockSensor::new(150.0), MockTransport::new(), AgentConfig::default());

    assert_eq!(
        control.cycle(&mut delay, &mut sink),
        CycleOutcome::NotReady(OperationalState::Initializing)
    );

    control.network_ready(&mut sink);
    assert_eq!(
        control.cycle(&mut delay, &mut sink),
        CycleOutcome::NotReady(OperationalState::NetworkReady)
    );

    assert_eq!(control.state(), OperationalState::NetworkReady);
    assert!(control.transport().calls.is_empty());
    assert!(sink.events.iter().all(|e| !matches!(e, AgentEvent::Reading(_))));

    // Connecting afterwards streams normally.
    control.connect(&mut delay, &mut sink).unwrap();
    assert!(matches!(control.cycle(&mut delay, &mut sink), CycleOutcome::Published(_)));
    assert_eq!(control.transport().publishes().len(), 1);
}

#[test]
fn run_before_connect_waits_for_stop() {
    let stop = StopSignal::default();
    let mut control = ControlLoop::new(
        AgentConfig::default(),
        MockSensor::new(150.0),
        MockTransport::new(),
        MockIndicator::default(),
    )
    .unwrap()
    .with_stop_signal(stop.clone());
    let (mut delay, mut sink) = (MockDelay::default(), RecordingSink::new());
    control.start(&mut sink);
    control.network_ready(&mut sink);
    stop.request();

    assert_eq!(control.run(&mut delay, &mut sink), Ok(()));
    assert!(control.transport().publishes().is_empty());
    assert_eq!(control.state(), OperationalState::Stopped);
}

// ── Inbound commands ──────────────────────────────────────────

#[test]
fn on_off_commands_drive_indicator() {
    let (mut control, mut delay, mut sink) = connected(MockSensor::new(100.0), MockTransport::new());

    control.transport().inject(CONTROL, b"ON");
    control.cycle(&mut delay, &mut sink);
    assert_eq!(control.indicator().last(), Some(IndicatorSignal::CommandOn));

    control.transport().inject(CONTROL, b"OFF");
    control.cycle(&mut delay, &mut sink);
    assert_eq!(control.indicator().last(), Some(IndicatorSignal::CommandOff));
}

#[test]
fn unrecognized_command_changes_nothing() {
    let (mut control, mut delay, mut sink) = connected(MockSensor::new(100.0), MockTransport::new());
    control.cycle(&mut delay, &mut sink);
    let shown_before = control.indicator().shown.len();

    control.transport().inject(CONTROL, b"on");
    control.transport().inject(CONTROL, b"");
    let outcome = control.cycle(&mut delay, &mut sink);

    assert!(matches!(outcome, CycleOutcome::Published(_)));
    assert_eq!(control.indicator().shown.len(), shown_before);
    assert_eq!(
        sink.count(|e| matches!(e, AgentEvent::Command(tanklevel::app::commands::ControlCommand::Unrecognized(_)))),
        2
    );
}

#[test]
fn oversized_messages_are_dropped() {
    let (mut control, mut delay, mut sink) = connected(MockSensor::new(100.0), MockTransport::new());

    let mut payload = b"ON".to_vec();
    payload.resize(200, b' ');
    control.transport().inject(CONTROL, &payload);
    control.cycle(&mut delay, &mut sink);
    assert_eq!(sink.count(|e| matches!(e, AgentEvent::Command(_))), 0);

    // Later well-formed commands still get through.
    control.transport().inject(CONTROL, b"ON");
    control.cycle(&mut delay, &mut sink);
    assert_eq!(control.indicator().times_shown(IndicatorSignal::CommandOn), 1);
}

#[test]
fn overlong_control_topic_is_rejected_up_front() {
    let mut config = AgentConfig::default();
    config.topics.control = format!("feeds/{}", "c".repeat(140));
    let result = ControlLoop::new(config, MockSensor::new(0.0), MockTransport::new(), MockIndicator::default());
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn messages_on_other_topics_are_ignored() {
    let (mut control, mut delay, mut sink) = connected(MockSensor::new(100.0), MockTransport::new());
    control.transport().inject(LEVEL, b"ON");
    control.cycle(&mut delay, &mut sink);
    assert_eq!(control.indicator().times_shown(IndicatorSignal::CommandOn), 0);
    assert_eq!(sink.count(|e| matches!(e, AgentEvent::Command(_))), 0);
}

// ── Publish retries ───────────────────────────────────────────

#[test]
fn transient_publish_is_retried_with_backoff() {
    let mut transport = MockTransport::new();
    transport.publish_results = [Err(PublishError::Transient), Err(PublishError::Transient)].into();
    let (mut control, mut delay, mut sink) = connected(MockSensor::new(150.0), transport);

    assert!(matches!(control.cycle(&mut delay, &mut sink), CycleOutcome::Published(_)));
    assert_eq!(control.transport().publishes().len(), 3);
    assert_eq!(delay.sleeps_ms, [500, 1_000]);
    assert_eq!(control.failed_cycles(), 0);
}

#[test]
fn exhausted_retries_fail_the_cycle_only() {
    let mut transport = MockTransport::new();
    transport.publish_results = [Err(PublishError::Transient); 3].into();
    let (mut control, mut delay, mut sink) = connected(MockSensor::new(150.0), transport);

    assert_eq!(
        control.cycle(&mut delay, &mut sink),
        CycleOutcome::PublishFailed(PublishError::Transient)
    );
    assert_eq!(control.state(), OperationalState::Streaming);
    assert_eq!(control.failed_cycles(), 1);
    assert!(sink.events.iter().any(|e| matches!(
        e,
        AgentEvent::PublishFailed { error: PublishError::Transient, attempts: 3 }
    )));

    // A good cycle resets the streak.
    assert!(matches!(control.cycle(&mut delay, &mut sink), CycleOutcome::Published(_)));
    assert_eq!(control.failed_cycles(), 0);
}

#[test]
fn repeated_failed_cycles_escalate_to_stopped() {
    let mut transport = MockTransport::new();
    transport.publish_results = [Err(PublishError::Transient); 9].into();
    let (mut control, mut delay, mut sink) = connected(MockSensor::new(150.0), transport);

    let result = control.run(&mut delay, &mut sink);

    assert_eq!(result, Err(Error::Publish(PublishError::Transient)));
    assert_eq!(control.state(), OperationalState::Stopped);
    assert_eq!(control.transport().publishes().len(), 9);
    assert_eq!(control.transport().disconnects(), 1);
    assert_eq!(control.indicator().times_shown(IndicatorSignal::Stopped), 1);
    // Two sample sleeps between the three cycles.
    assert_eq!(delay.sleeps_ms.iter().filter(|ms| **ms == 5_000).count(), 2);
}

#[test]
fn closed_connection_is_fatal_immediately() {
    let mut transport = MockTransport::new();
    transport.publish_results = [Err(PublishError::ConnectionClosed)].into();
    let (mut control, mut delay, mut sink) = connected(MockSensor::new(150.0), transport);

    assert_eq!(control.cycle(&mut delay, &mut sink), CycleOutcome::Stopped);
    assert_eq!(control.state(), OperationalState::Stopped);
    assert_eq!(control.transport().publishes().len(), 1, "fatal errors are not retried");
    assert!(delay.sleeps_ms.is_empty());
    assert!(sink.events.iter().any(|e| matches!(
        e,
        AgentEvent::Stopped { cause: Some(Error::Publish(PublishError::ConnectionClosed)) }
    )));

    // Terminal: further cycles do nothing.
    assert_eq!(control.cycle(&mut delay, &mut sink), CycleOutcome::Stopped);
    assert_eq!(control.transport().publishes().len(), 1);
    assert_eq!(control.transport().disconnects(), 1);
    assert_eq!(control.indicator().times_shown(IndicatorSignal::Stopped), 1);
}

// ── Connect / subscribe ───────────────────────────────────────

#[test]
fn connect_retries_with_backoff() {
    let mut transport = MockTransport::new();
    transport.connect_results = [Err(ConnectError::Timeout), Err(ConnectError::Timeout)].into();
    let (mut control, mut delay, mut sink) = build(MockSensor::new(0.0), transport, AgentConfig::default());
    control.network_ready(&mut sink);

    control.connect(&mut delay, &mut sink).unwrap();

    assert_eq!(control.transport().connects(), 3);
    assert_eq!(delay.sleeps_ms, [1_000, 2_000]);
    assert_eq!(control.state(), OperationalState::BrokerSubscribed);
}

#[test]
fn exhausted_connect_is_fatal() {
    let mut transport = MockTransport::new();
    transport.connect_results = [Err(ConnectError::Refused); 5].into();
    let (mut control, mut delay, mut sink) = build(MockSensor::new(0.0), transport, AgentConfig::default());
    control.network_ready(&mut sink);

    let result = control.connect(&mut delay, &mut sink);

    assert_eq!(result, Err(Error::Connect(ConnectError::Refused)));
    assert_eq!(control.transport().connects(), 5);
    assert_eq!(delay.sleeps_ms, [1_000, 2_000, 4_000, 8_000]);
    assert_eq!(control.state(), OperationalState::Stopped);
    assert_eq!(control.transport().disconnects(), 1);
    assert_eq!(control.indicator().last(), Some(IndicatorSignal::Stopped));

    // run() on a stopped loop reports the same failure without cycling.
    assert_eq!(
        control.run(&mut delay, &mut sink),
        Err(Error::Connect(ConnectError::Refused))
    );
    assert_eq!(control.transport().publishes().len(), 0);
}

#[test]
fn rejected_subscription_is_fatal() {
    let mut transport = MockTransport::new();
    transport.subscribe_result = Some(SubscribeError::Rejected);
    let (mut control, mut delay, mut sink) = build(MockSensor::new(0.0), transport, AgentConfig::default());
    control.network_ready(&mut sink);

    assert_eq!(
        control.connect(&mut delay, &mut sink),
        Err(Error::Subscribe(SubscribeError::Rejected))
    );
    assert_eq!(control.state(), OperationalState::Stopped);
    assert_eq!(control.transport().disconnects(), 1);
}

// ── Stop signal ───────────────────────────────────────────────

#[test]
fn stop_signal_ends_run_cleanly() {
    let stop = StopSignal::default();
    let mut sensor = MockSensor::new(150.0);
    sensor.stop_after = Some((3, stop.clone()));

    let mut control = ControlLoop::new(AgentConfig::default(), sensor, MockTransport::new(), MockIndicator::default())
        .unwrap()
        .with_stop_signal(stop);
    let (mut delay, mut sink) = (MockDelay::default(), RecordingSink::new());
    control.start(&mut sink);
    control.network_ready(&mut sink);
    control.connect(&mut delay, &mut sink).unwrap();

    let result = control.run(&mut delay, &mut sink);

    assert_eq!(result, Ok(()));
    assert_eq!(control.state(), OperationalState::Stopped);
    // The cycle that saw the request still finishes; the next one stops.
    assert_eq!(control.transport().publishes().len(), 3);
    assert_eq!(delay.sleeps_ms, [5_000, 5_000, 5_000]);
    assert_eq!(control.transport().disconnects(), 1);
    assert_eq!(control.indicator().times_shown(IndicatorSignal::Stopped), 1);
    assert!(sink.events.iter().any(|e| matches!(e, AgentEvent::Stopped { cause: None })));
}

#[test]
fn stop_before_connect_skips_the_broker() {
    let (mut control, mut delay, mut sink) =
        build(MockSensor::new(0.0), MockTransport::new(), AgentConfig::default());
    control.network_ready(&mut sink);
    control.stop_handle().request();

    assert_eq!(control.connect(&mut delay, &mut sink), Ok(()));
    assert_eq!(control.state(), OperationalState::Stopped);
    assert_eq!(control.transport().connects(), 0);
    assert_eq!(control.indicator().last(), Some(IndicatorSignal::Stopped));
}

// ── Publish budget ────────────────────────────────────────────

#[test]
fn budget_throttles_past_quota() {
    let mut config = AgentConfig::default();
    config.publish_limit_per_minute = 2;
    let (mut control, mut delay, mut sink) = build(MockSensor::new(150.0), MockTransport::new(), config);
    control.network_ready(&mut sink);
    control.connect(&mut delay, &mut sink).unwrap();

    assert!(matches!(control.cycle(&mut delay, &mut sink), CycleOutcome::Published(_)));
    assert!(matches!(control.cycle(&mut delay, &mut sink), CycleOutcome::Published(_)));
    assert!(matches!(control.cycle(&mut delay, &mut sink), CycleOutcome::Throttled(_)));

    assert_eq!(control.transport().publishes().len(), 2);
    assert_eq!(sink.count(|e| matches!(e, AgentEvent::Throttled(_))), 1);
    assert_eq!(control.state(), OperationalState::Streaming);
}
