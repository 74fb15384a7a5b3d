//! # The supervisor state triple and its decision table.
//!
//! The three axes are independent enums combined into [`State`]. The triple
//! is the *only* authority actions are derived from: events first update the
//! triple, then [`decide`], a pure function, picks at most one action.
//! Keeping `decide` free of side effects makes the whole table testable
//! without any filesystem or process.

use std::fmt;

/// Externally-driven activation axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationState {
    Inactive,
    Active,
}

/// Configuration lifecycle axis: seen-but-not-applied (`Changed`),
/// applied-with-diff (`Updated`), applied-with-no-diff (`Applied`), and the
/// initial `NotReady`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigState {
    NotReady,
    Changed,
    Updated,
    Applied,
}

/// Payload process axis. `Changing` covers the open interval between a
/// start/kill request and its confirming event, and guarantees the decision
/// table never double-fires while one is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Dead,
    Changing,
    Alive,
}

/// The current state of the supervised system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct State {
    pub activation: ActivationState,
    pub configuration: ConfigState,
    pub process: ProcessState,
}

impl State {
    /// The boot state: `(inactive, notReady, dead)`.
    pub fn initial() -> Self {
        Self {
            activation: ActivationState::Inactive,
            configuration: ConfigState::NotReady,
            process: ProcessState::Dead,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let activation = match self.activation {
            ActivationState::Inactive => "inactive",
            ActivationState::Active => "active",
        };
        let configuration = match self.configuration {
            ConfigState::NotReady => "notReady",
            ConfigState::Changed => "changed",
            ConfigState::Updated => "updated",
            ConfigState::Applied => "applied",
        };
        let process = match self.process {
            ProcessState::Dead => "dead",
            ProcessState::Changing => "changing",
            ProcessState::Alive => "alive",
        };
        write!(f, "| {activation:<8} | {configuration:<8} | {process:<8} |")
    }
}

/// Matcher over the triple, used like
/// `is(state).act(&[Active]).config(&[Applied, Updated]).proc(&[Dead]).holds()`,
/// which reads as `(activation == Active) && (configuration == Applied ||
/// configuration == Updated) && (process == Dead)`. An axis that is not
/// constrained matches anything.
pub(crate) fn is(state: State) -> InState {
    InState {
        state,
        matches: true,
    }
}

pub(crate) struct InState {
    state: State,
    matches: bool,
}

impl InState {
    pub(crate) fn act(mut self, any_of: &[ActivationState]) -> Self {
        self.matches &= any_of.contains(&self.state.activation);
        self
    }

    pub(crate) fn config(mut self, any_of: &[ConfigState]) -> Self {
        self.matches &= any_of.contains(&self.state.configuration);
        self
    }

    pub(crate) fn proc(mut self, any_of: &[ProcessState]) -> Self {
        self.matches &= any_of.contains(&self.state.process);
        self
    }

    pub(crate) fn holds(self) -> bool {
        self.matches
    }
}

/// The action the decision table selects for a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Action {
    /// Start the payload.
    Start,
    /// Kill the payload and, if the kill was accepted, start it again so it
    /// never keeps running against a superseded configuration.
    Restart,
    /// Kill the payload.
    Kill,
    /// Request a configuration update from the handler.
    RequestUpdate,
}

/// The ordered decision table; first match wins.
pub(crate) fn decide(state: State) -> Option<Action> {
    use ActivationState::*;
    use ConfigState::*;
    use ProcessState::*;

    if is(state).act(&[Active]).config(&[Applied, Updated]).proc(&[Dead]).holds() {
        Some(Action::Start)
    } else if is(state).act(&[Active]).config(&[Updated]).proc(&[Alive]).holds() {
        Some(Action::Restart)
    } else if is(state).act(&[Inactive]).proc(&[Alive]).holds() {
        Some(Action::Kill)
    } else if is(state).config(&[Changed]).proc(&[Dead, Alive]).holds() {
        Some(Action::RequestUpdate)
    } else {
        None
    }
}
