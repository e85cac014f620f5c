//! Control loop, the hexagonal core.
//!
//! [`ControlLoop`] owns the lifecycle FSM, the tank model, the command
//! inbox and the publish budget, plus the three hardware-facing ports it
//! was built with.  The delay source and the [`EventSink`] are passed at
//! call sites, so the whole loop runs against mocks on the host.
//!
//! ```text
//!  DistanceSource ──▶ ┌──────────────────────────┐ ──▶ TelemetryTransport
//!                     │       ControlLoop         │
//!   CommandInbox ───▶ │  FSM · TankModel · Budget │ ──▶ StatusIndicator
//!                     └──────────────────────────┘ ──▶ EventSink
//! ```

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use embedded_hal::delay::DelayNs;
use log::{debug, error, info, warn};

use crate::config::AgentConfig;
use crate::error::{Error, PublishError, SensorError};
use crate::fsm::context::LifecycleContext;
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, OperationalState};
use crate::tank::{CapacityReading, TankModel};

use super::backoff::Backoff;
use super::budget::PublishBudget;
use super::commands::ControlCommand;
use super::events::{AgentEvent, TelemetryData};
use super::inbox::{CommandInbox, InboxHandle};
use super::ports::{ConfigError, DistanceSource, EventSink, IndicatorSignal, StatusIndicator, TelemetryTransport};

// ───────────────────────────────────────────────────────────────
// Stop signal
// ───────────────────────────────────────────────────────────────

/// Cloneable external stop request, observed at the top of each cycle.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// ───────────────────────────────────────────────────────────────
// Cycle outcome
// ───────────────────────────────────────────────────────────────

/// What one [`ControlLoop::cycle`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    /// Reading published to the level topic.
    Published(CapacityReading),
    /// No sample this cycle; nothing was published.
    Skipped(SensorError),
    /// Broker quota spent; the reading was dropped.
    Throttled(CapacityReading),
    /// Publish retries exhausted; the loop keeps going.
    PublishFailed(PublishError),
    /// Called before the broker session was set up; nothing was touched.
    NotReady(OperationalState),
    /// The loop is in (or just entered) `Stopped`.
    Stopped,
}

// ───────────────────────────────────────────────────────────────
// ControlLoop
// ───────────────────────────────────────────────────────────────

pub struct ControlLoop<S, T, I> {
    sensor: S,
    transport: T,
    indicator: I,
    config: AgentConfig,
    model: TankModel,
    fsm: Fsm,
    ctx: LifecycleContext,
    inbox: InboxHandle,
    budget: PublishBudget,
    stop: StopSignal,
    /// Consecutive cycles whose publish retries ran out.
    failed_cycles: u32,
}

impl<S, T, I> ControlLoop<S, T, I>
where
    S: DistanceSource,
    T: TelemetryTransport,
    I: StatusIndicator,
{
    /// Build the loop from validated configuration.
    ///
    /// Does **not** start the FSM; call [`start`](Self::start) next.
    pub fn new(config: AgentConfig, sensor: S, transport: T, indicator: I) -> Result<Self, Error> {
        config.validate()?;
        let model = TankModel::new(config.tank)
            .map_err(|_| ConfigError::ValidationFailed("tank geometry"))?;
        let budget = PublishBudget::per_minute(config.publish_limit_per_minute);

        Ok(Self {
            sensor,
            transport,
            indicator,
            model,
            fsm: Fsm::new(build_state_table(), OperationalState::Initializing),
            ctx: LifecycleContext::new(),
            inbox: CommandInbox::handle(),
            budget,
            stop: StopSignal::default(),
            failed_cycles: 0,
            config,
        })
    }

    /// Share an existing stop signal instead of the loop's own.
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Enter `Initializing`; the indicator shows not-operational.
    pub fn start(&mut self, sink: &mut impl EventSink) {
        self.fsm.start(&mut self.ctx);
        self.indicator.show(self.ctx.indicator);
        sink.emit(&AgentEvent::Started(self.fsm.current_state()));
        info!(
            "ControlLoop started: tank {:.0} L, level feed '{}'",
            self.model.total_litres(),
            self.config.topics.level
        );
    }

    /// The host reports the network link is up.
    pub fn network_ready(&mut self, sink: &mut impl EventSink) {
        self.ctx.network_ready = true;
        self.step(sink);
    }

    /// Open the broker session and subscribe the control feed.
    ///
    /// Connect failures are retried under `connect_retry`; running out of
    /// attempts, or a refused subscription, stops the loop and returns
    /// the error.
    pub fn connect(&mut self, delay: &mut impl DelayNs, sink: &mut impl EventSink) -> Result<(), Error> {
        if self.state() == OperationalState::Stopped {
            return self.exit_result();
        }
        if self.state() != OperationalState::NetworkReady {
            warn!("connect requested in {:?}", self.state());
        }

        let mut backoff = Backoff::new(self.config.connect_retry);
        loop {
            if self.observe_stop(sink) {
                return self.exit_result();
            }
            match self.transport.connect() {
                Ok(()) => break,
                Err(e) => match backoff.on_failure() {
                    Some(wait_ms) => {
                        warn!(
                            "connect: attempt {} failed ({}), retrying in {} ms",
                            backoff.attempts(),
                            e,
                            wait_ms
                        );
                        delay.delay_ms(wait_ms);
                    }
                    None => {
                        error!("connect: giving up after {} attempts ({})", backoff.attempts(), e);
                        return Err(self.fail(e.into(), sink));
                    }
                },
            }
        }
        info!("connect: broker session open");

        if let Err(e) = self
            .transport
            .subscribe(&self.config.topics.control, Arc::clone(&self.inbox))
        {
            error!("subscribe: '{}' failed ({})", self.config.topics.control, e);
            return Err(self.fail(e.into(), sink));
        }
        info!("subscribe: listening on '{}'", self.config.topics.control);

        self.ctx.subscribed = true;
        self.step(sink);
        Ok(())
    }

    /// One streaming cycle: drain commands, measure, publish.
    /// The inter-cycle sleep belongs to [`run`](Self::run).
    pub fn cycle(&mut self, delay: &mut impl DelayNs, sink: &mut impl EventSink) -> CycleOutcome {
        if self.state() == OperationalState::Stopped || self.observe_stop(sink) {
            return CycleOutcome::Stopped;
        }
        // BrokerSubscribed → Streaming on the first cycle.
        self.step(sink);
        let state = self.state();
        if state != OperationalState::Streaming {
            warn!("cycle: called in {:?}, broker session not ready", state);
            return CycleOutcome::NotReady(state);
        }

        self.drain_inbox(sink);

        let sample = match self.sensor.measure() {
            Ok(sample) => sample,
            Err(e) => {
                warn!("cycle: measurement failed ({}), skipping publish", e);
                sink.emit(&AgentEvent::CycleSkipped(e));
                return CycleOutcome::Skipped(e);
            }
        };

        let reading = self.model.capacity(sample.distance_cm);
        let data = TelemetryData {
            distance_cm: sample.distance_cm,
            remaining_litres: reading.remaining_litres,
            percent_full: reading.percent_full,
            measured_at_us: sample.measured_at_us,
        };
        sink.emit(&AgentEvent::Reading(data));

        if !self.budget.try_acquire() {
            debug!("cycle: publish budget spent, dropping reading");
            sink.emit(&AgentEvent::Throttled(data));
            return CycleOutcome::Throttled(reading);
        }

        match self.publish_with_retry(reading.percent_full, delay, sink) {
            Ok(()) => {
                self.failed_cycles = 0;
                CycleOutcome::Published(reading)
            }
            Err(e) if e.is_fatal() => {
                self.fail(e.into(), sink);
                CycleOutcome::Stopped
            }
            Err(e) => {
                self.failed_cycles += 1;
                if self.failed_cycles >= self.config.max_failed_cycles {
                    error!(
                        "cycle: {} consecutive cycles failed to publish, stopping",
                        self.failed_cycles
                    );
                    self.fail(e.into(), sink);
                    return CycleOutcome::Stopped;
                }
                CycleOutcome::PublishFailed(e)
            }
        }
    }

    /// Cycle until `Stopped`, sleeping `sample_interval_ms` in between.
    /// Before [`connect`](Self::connect) every cycle is `NotReady`, so only
    /// the stop signal ends the loop.
    ///
    /// Returns `Ok` when stopped by the [`StopSignal`] and the fatal error
    /// otherwise.
    pub fn run(&mut self, delay: &mut impl DelayNs, sink: &mut impl EventSink) -> Result<(), Error> {
        loop {
            if self.cycle(delay, sink) == CycleOutcome::Stopped {
                return self.exit_result();
            }
            delay.delay_ms(self.config.sample_interval_ms);
        }
    }

    /// Handle for requesting a stop from another task.
    pub fn stop_handle(&self) -> StopSignal {
        self.stop.clone()
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> OperationalState {
        self.fsm.current_state()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn indicator(&self) -> &I {
        &self.indicator
    }

    pub fn failed_cycles(&self) -> u32 {
        self.failed_cycles
    }

    // ── Internal ──────────────────────────────────────────────

    /// Tick the FSM once and apply the consequences of any transition.
    fn step(&mut self, sink: &mut impl EventSink) {
        let Some(t) = self.fsm.tick(&mut self.ctx) else {
            return;
        };
        self.indicator.show(self.ctx.indicator);
        sink.emit(&AgentEvent::StateChanged { from: t.from, to: t.to });

        if t.to == OperationalState::Stopped {
            // Stopped is terminal, so this runs exactly once.
            self.transport.disconnect();
            sink.emit(&AgentEvent::Stopped { cause: self.ctx.fatal });
        }
    }

    /// Returns `true` (after moving to `Stopped`) if a stop was requested.
    fn observe_stop(&mut self, sink: &mut impl EventSink) -> bool {
        if !self.stop.is_requested() {
            return false;
        }
        info!("stop requested");
        self.ctx.stop_requested = true;
        self.step(sink);
        true
    }

    /// Record a fatal error and move to `Stopped`.
    fn fail(&mut self, err: Error, sink: &mut impl EventSink) -> Error {
        self.ctx.fatal.get_or_insert(err);
        self.step(sink);
        err
    }

    fn exit_result(&self) -> Result<(), Error> {
        match self.ctx.fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn drain_inbox(&mut self, sink: &mut impl EventSink) {
        while let Some(msg) = self.inbox.try_next() {
            if msg.truncated {
                warn!(
                    "inbox: dropping oversized message on '{}' ({} payload bytes kept)",
                    msg.topic,
                    msg.payload.len()
                );
                continue;
            }
            if msg.topic.as_str() != self.config.topics.control.as_str() {
                debug!("inbox: ignoring message on '{}'", msg.topic);
                continue;
            }
            let cmd = ControlCommand::parse(&msg.payload);
            match &cmd {
                ControlCommand::IndicatorOn => self.indicator.show(IndicatorSignal::CommandOn),
                ControlCommand::IndicatorOff => self.indicator.show(IndicatorSignal::CommandOff),
                ControlCommand::Unrecognized(raw) => {
                    warn!("inbox: unrecognized command {:?}", String::from_utf8_lossy(raw));
                }
            }
            sink.emit(&AgentEvent::Command(cmd));
        }
    }

    fn publish_with_retry(
        &mut self,
        percent_full: f32,
        delay: &mut impl DelayNs,
        sink: &mut impl EventSink,
    ) -> Result<(), PublishError> {
        let payload = percent_full.to_string();
        let mut backoff = Backoff::new(self.config.publish_retry);
        loop {
            let err = match self.transport.publish(&self.config.topics.level, payload.as_bytes()) {
                Ok(()) => {
                    debug!("publish: '{}' <- {}", self.config.topics.level, payload);
                    return Ok(());
                }
                Err(e) => e,
            };

            if err.is_fatal() {
                let attempts = backoff.attempts() + 1;
                error!("publish: connection lost on attempt {} ({})", attempts, err);
                sink.emit(&AgentEvent::PublishFailed { error: err, attempts });
                return Err(err);
            }
            match backoff.on_failure() {
                Some(wait_ms) => {
                    warn!(
                        "publish: attempt {} failed ({}), retrying in {} ms",
                        backoff.attempts(),
                        err,
                        wait_ms
                    );
                    delay.delay_ms(wait_ms);
                }
                None => {
                    let attempts = backoff.attempts();
                    error!("publish: failed after {} attempts ({})", attempts, err);
                    sink.emit(&AgentEvent::PublishFailed { error: err, attempts });
                    return Err(err);
                }
            }
        }
    }
}
