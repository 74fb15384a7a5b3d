//! # The supervisor loop.
//!
//! Multiplexes the three event sources and drives the payload from the
//! state triple alone:
//!
//! ```text
//!  activation file      config archive         payload child
//!        │                    │                     │
//!  ┌─────▼──────┐   ┌─────────▼─────────┐   ┌───────▼───────┐
//!  │ Activation │   │   Configuration   │   │    Process    │
//!  │  Handler   │   │     Handler       │   │    Handler    │
//!  └─────┬──────┘   └──┬─────────────┬──┘   └───┬───────┬───┘
//!     changed       changed   update result  started  ended
//!        └─────────────┴──────┬──────┴──────────┴───────┘
//!                          select
//!                             ▼
//!               apply (event table) → act (decision table)
//! ```
//!
//! Every loop iteration first updates the `(activation, configuration,
//! process)` triple from the received event, then evaluates the ordered
//! decision table against the new triple. No action is ever taken directly
//! from an event.
//!
//! [`Supervisor::run`] completes when the process receives a termination
//! signal; tear-down closes both handlers and kills the payload, and the
//! decision table deliberately never runs during tear-down.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::config::{Config, PayloadSpec};
use crate::error::{InitError, ProcessError};
use crate::events::{Bus, Event, EventKind};
use crate::fs::{FilesystemRef, RealFilesystem};
use crate::handlers::{
    ActivationEvent, ActivationHandler, ConfigChangedEvent, ConfigurationHandler, ProcessHandler,
    UpdateResult,
};
use crate::observer::Observer;
use crate::state::{decide, Action, ActivationState, ConfigState, ProcessState, State};

/// One event drawn from the handler channels.
pub(crate) enum StateEvent {
    Activation(ActivationEvent),
    ConfigChanged(ConfigChangedEvent),
    UpdateFinished(UpdateResult),
    ProcessStarted(Result<(), ProcessError>),
    ProcessEnded(Result<(), ProcessError>),
}

/// The event table: the state triple plus the two auxiliaries, advanced by
/// [`Lifecycle::apply`]. Pure state, no I/O, so the table is testable on
/// its own.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    pub(crate) state: State,
    /// Sticky: set when any update since the last payload start reported a
    /// non-empty modification set.
    pub(crate) was_config_changed: bool,
    /// Update operations requested but whose results were not yet applied.
    /// The configuration axis is not finalized while this is non-zero.
    pub(crate) config_updates_running: u32,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            state: State::initial(),
            was_config_changed: false,
            config_updates_running: 0,
        }
    }

    /// Advances the triple. An event carrying an error does not progress
    /// the state, with one exception: a `ProcessEnded` error still means
    /// the child is gone, so the process axis always advances to `Dead`.
    /// A `ProcessStarted` error conversely leaves the axis untouched: a
    /// failed spawn produces no `ended` event, and advancing here would
    /// wedge the triple in `Changing`.
    pub(crate) fn apply(&mut self, ev: &StateEvent) {
        match ev {
            StateEvent::Activation(ev) => {
                if ev.error.is_none() {
                    self.state.activation = if ev.state {
                        ActivationState::Active
                    } else {
                        ActivationState::Inactive
                    };
                }
            }
            StateEvent::ConfigChanged(outcome) => {
                if outcome.is_ok() {
                    self.state.configuration = ConfigState::Changed;
                }
            }
            StateEvent::UpdateFinished(result) => {
                if result.error.is_none() {
                    self.config_updates_running = self.config_updates_running.saturating_sub(1);
                    if !result.changed_files.is_empty() {
                        self.was_config_changed = true;
                    }
                    if self.config_updates_running == 0 {
                        self.state.configuration = if self.was_config_changed {
                            ConfigState::Updated
                        } else {
                            ConfigState::Applied
                        };
                    }
                }
            }
            StateEvent::ProcessStarted(outcome) => {
                if outcome.is_ok() {
                    self.state.process = ProcessState::Alive;
                    if self.state.configuration == ConfigState::Updated {
                        self.state.configuration = ConfigState::Applied;
                        self.was_config_changed = false;
                    }
                }
            }
            StateEvent::ProcessEnded(_) => {
                self.state.process = ProcessState::Dead;
            }
        }
    }
}

enum Step {
    Shutdown(std::io::Result<()>),
    Event(StateEvent),
    SourcesClosed,
}

/// Supervises one payload process under an activation flag and a
/// configuration archive.
pub struct Supervisor<O: Observer + Send + Sync + 'static> {
    cfg: Config,
    payload: PayloadSpec,
    obs: Arc<O>,
    bus: Bus,
    lifecycle: Lifecycle,
    activation: ActivationHandler,
    activation_rx: mpsc::Receiver<ActivationEvent>,
    configuration: ConfigurationHandler<UpdateResult>,
    changed_rx: mpsc::Receiver<ConfigChangedEvent>,
    results_rx: mpsc::Receiver<UpdateResult>,
    process: ProcessHandler,
}

impl<O: Observer + Send + Sync + 'static> Supervisor<O> {
    /// Boots a supervisor over the real filesystem.
    ///
    /// Handlers are created here; the initial triple is
    /// `(inactive, notReady, dead)` and converges from the synthesized
    /// initial handler events.
    pub fn new(cfg: Config, payload: PayloadSpec, observer: O) -> Result<Self, InitError> {
        Self::with_filesystem(cfg, payload, observer, RealFilesystem::arc())
    }

    /// Boots a supervisor with an injected filesystem implementation.
    pub fn with_filesystem(
        cfg: Config,
        payload: PayloadSpec,
        observer: O,
        fs: FilesystemRef,
    ) -> Result<Self, InitError> {
        let bus = Bus::new(cfg.bus_capacity);
        let (activation, activation_rx) =
            ActivationHandler::open(cfg.activation_path.clone(), cfg.chan_capacity, fs.clone())
                .map_err(InitError::Activation)?;
        let (configuration, changed_rx, results_rx) = ConfigurationHandler::tarred(
            cfg.archive_path.clone(),
            cfg.staging_dir.clone(),
            cfg.live_dir.clone(),
            cfg.chan_capacity,
            fs,
        )
        .map_err(InitError::Configuration)?;
        let process = ProcessHandler::new(&payload).map_err(InitError::Process)?;

        Ok(Self {
            cfg,
            payload,
            obs: Arc::new(observer),
            bus,
            lifecycle: Lifecycle::new(),
            activation,
            activation_rx,
            configuration,
            changed_rx,
            results_rx,
            process,
        })
    }

    /// Subscribes to the supervisor's event bus.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// The current state triple.
    pub fn state(&self) -> State {
        self.lifecycle.state
    }

    /// The configuration this supervisor was booted with.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Runs the supervisor loop until a termination signal arrives (or all
    /// event sources are gone), then tears down.
    pub async fn run(mut self) -> std::io::Result<()> {
        self.spawn_observer_pump();
        info!(state = %self.lifecycle.state, "entrypoint supervisor started");

        let mut shutdown = std::pin::pin!(wait_for_shutdown_signal());
        loop {
            let step = tokio::select! {
                res = &mut shutdown => Step::Shutdown(res),
                Some(ev) = self.activation_rx.recv() => Step::Event(StateEvent::Activation(ev)),
                Some(ev) = self.changed_rx.recv() => Step::Event(StateEvent::ConfigChanged(ev)),
                Some(ev) = self.results_rx.recv() => Step::Event(StateEvent::UpdateFinished(ev)),
                Some(ev) = self.process.started.recv() => Step::Event(StateEvent::ProcessStarted(ev)),
                Some(ev) = self.process.ended.recv() => Step::Event(StateEvent::ProcessEnded(ev)),
                else => Step::SourcesClosed,
            };
            match step {
                Step::Shutdown(res) => {
                    self.publish(Event::now(EventKind::ShutdownRequested));
                    self.tear_down();
                    return res;
                }
                Step::SourcesClosed => {
                    warn!("all event sources closed; tearing down");
                    self.tear_down();
                    return Ok(());
                }
                Step::Event(ev) => {
                    self.apply(ev);
                    info!(state = %self.lifecycle.state, "state was changed by an event");
                    self.act();
                    debug!(state = %self.lifecycle.state, "status change was handled");
                }
            }
        }
    }

    /// Applies the event table and mirrors the event onto the bus.
    fn apply(&mut self, ev: StateEvent) {
        if let StateEvent::UpdateFinished(result) = &ev {
            for (file, modification) in &result.changed_files {
                info!(
                    file = %file.display(),
                    modification = modification.as_str(),
                    "configuration file was changed"
                );
            }
        }
        self.lifecycle.apply(&ev);
        self.publish(event_for(&ev));
    }

    /// Evaluates the decision table against the new triple; first match
    /// wins.
    fn act(&mut self) {
        match decide(self.lifecycle.state) {
            Some(Action::Start) => self.start(),
            Some(Action::Restart) => {
                self.kill();
                // The start is chained only when the kill was accepted.
                if self.lifecycle.state.process == ProcessState::Changing {
                    self.start();
                }
            }
            Some(Action::Kill) => self.kill(),
            Some(Action::RequestUpdate) => self.request_update(),
            None => {}
        }
    }

    /// Builds a fresh process handler and issues a start. On success the
    /// process axis moves to `Changing` until the started event confirms.
    fn start(&mut self) {
        match ProcessHandler::new(&self.payload) {
            Ok(process) => {
                self.process = process;
                self.process.start();
                self.lifecycle.state.process = ProcessState::Changing;
                self.publish(Event::now(EventKind::ProcessStarting));
            }
            Err(e) => {
                error!(error = %e, "could not start the payload");
                self.publish(Event::now(EventKind::ProcessStarting).with_error(e.to_string()));
            }
        }
    }

    fn kill(&mut self) {
        match self.process.kill() {
            Ok(()) => {
                self.lifecycle.state.process = ProcessState::Changing;
                self.publish(Event::now(EventKind::ProcessKilling));
            }
            Err(e) => {
                error!(error = %e, "could not kill the payload");
                self.publish(Event::now(EventKind::ProcessKilling).with_error(e.to_string()));
            }
        }
    }

    /// Requests an update. Only an accepted request counts as in-flight;
    /// a rejected one is logged, and in both cases the configuration axis
    /// moves off `Changed` so the table cannot re-fire until the next
    /// arrival re-arms it.
    fn request_update(&mut self) {
        match self.configuration.update() {
            Ok(()) => {
                self.lifecycle.config_updates_running += 1;
                self.lifecycle.state.configuration = ConfigState::NotReady;
                self.publish(Event::now(EventKind::UpdateRequested));
            }
            Err(rejected) => {
                warn!(reason = rejected.as_label(), "configuration update was rejected");
                self.lifecycle.state.configuration = ConfigState::NotReady;
                self.publish(Event::now(EventKind::UpdateRejected).with_error(rejected.to_string()));
            }
        }
    }

    /// Closes both handlers and kills the payload; failures are logged
    /// only.
    fn tear_down(&mut self) {
        info!("tearing down entrypoint");
        self.activation.close();
        self.configuration.close();
        if let Err(e) = self.process.kill() {
            error!(error = %e, "could not kill the payload");
        }
        self.publish(Event::now(EventKind::TornDown));
    }

    fn publish(&self, ev: Event) {
        self.bus.publish(ev.with_state(self.lifecycle.state.to_string()));
    }

    /// Pumps bus events into the observer, in publish order.
    fn spawn_observer_pump(&self) {
        let mut rx = self.bus.subscribe();
        let obs = self.obs.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => obs.on_event(&ev).await,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}

/// Maps a handler event onto its bus representation.
fn event_for(ev: &StateEvent) -> Event {
    match ev {
        StateEvent::Activation(ev) => {
            let event = Event::now(EventKind::ActivationChanged)
                .with_detail(format!("active={}", ev.state));
            match &ev.error {
                Some(e) => event.with_error(e.to_string()),
                None => event,
            }
        }
        StateEvent::ConfigChanged(outcome) => {
            let event = Event::now(EventKind::ConfigChanged);
            match outcome {
                Ok(()) => event,
                Err(e) => event.with_error(e.to_string()),
            }
        }
        StateEvent::UpdateFinished(result) => {
            let event = Event::now(EventKind::ConfigUpdated)
                .with_detail(format!("changed_files={}", result.changed_files.len()));
            match &result.error {
                Some(e) => event.with_error(e.to_string()),
                None => event,
            }
        }
        StateEvent::ProcessStarted(outcome) => {
            let event = Event::now(EventKind::ProcessStarted);
            match outcome {
                Ok(()) => event,
                Err(e) => event.with_error(e.to_string()),
            }
        }
        StateEvent::ProcessEnded(outcome) => {
            let event = Event::now(EventKind::ProcessEnded);
            match outcome {
                Ok(()) => event,
                Err(e) => event.with_error(e.to_string()),
            }
        }
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
