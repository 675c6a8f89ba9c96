//! Power-analyzer integration lifecycle.
//!
//! ```text
//! Idle --configure--> Configured --start--> Running --stop--> Stopped
//!  ^                     ^  |                                   |
//!  |                     +--+ (reconfigure)     configure ------+
//!  +---------------------------- reset (from anywhere) ---------+
//! ```

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegrationState {
    #[default]
    Idle,
    Configured,
    Running,
    Stopped,
}

impl fmt::Display for IntegrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IntegrationState::Idle => "idle",
            IntegrationState::Configured => "configured",
            IntegrationState::Running => "running",
            IntegrationState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrationAction {
    Configure,
    Start,
    Stop,
    Reset,
}

impl fmt::Display for IntegrationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IntegrationAction::Configure => "configure",
            IntegrationAction::Start => "start",
            IntegrationAction::Stop => "stop",
            IntegrationAction::Reset => "reset",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {action} integration while {state}: {hint}")]
pub struct TransitionRejected {
    pub action: IntegrationAction,
    pub state: IntegrationState,
    pub hint: &'static str,
}

#[derive(Debug, Default)]
pub struct IntegrationStateManager {
    state: IntegrationState,
}

impl IntegrationStateManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> IntegrationState {
        self.state
    }

    /// Target state for `action`, without applying it.
    pub fn check(&self, action: IntegrationAction) -> Result<IntegrationState, TransitionRejected> {
        use IntegrationAction as A;
        use IntegrationState as S;

        let reject = |hint| TransitionRejected {
            action,
            state: self.state,
            hint,
        };
        match (action, self.state) {
            (A::Reset, _) => Ok(S::Idle),
            (A::Configure, S::Idle | S::Configured | S::Stopped) => Ok(S::Configured),
            (A::Configure, S::Running) => Err(reject("stop the running integration first")),
            (A::Start, S::Configured) => Ok(S::Running),
            (A::Start, S::Idle) => Err(reject("configure it first")),
            (A::Start, S::Running) => Err(reject("it is already running")),
            (A::Start, S::Stopped) => Err(reject("configure or reset before restarting")),
            (A::Stop, S::Running) => Ok(S::Stopped),
            (A::Stop, _) => Err(reject("only a running integration can be stopped")),
        }
    }

    pub fn apply(&mut self, action: IntegrationAction) -> Result<IntegrationState, TransitionRejected> {
        let next = self.check(action)?;
        if next != self.state {
            tracing::debug!(from = %self.state, to = %next, %action, "integration transition");
        }
        self.state = next;
        Ok(next)
    }

    pub fn configure(&mut self) -> Result<IntegrationState, TransitionRejected> {
        self.apply(IntegrationAction::Configure)
    }

    pub fn start(&mut self) -> Result<IntegrationState, TransitionRejected> {
        self.apply(IntegrationAction::Start)
    }

    pub fn stop(&mut self) -> Result<IntegrationState, TransitionRejected> {
        self.apply(IntegrationAction::Stop)
    }

    pub fn reset(&mut self) -> IntegrationState {
        self.state = IntegrationState::Idle;
        self.state
    }
}
