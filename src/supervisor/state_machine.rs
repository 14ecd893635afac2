use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    NotStarted,
    Running,
    Stopping,
    Exited,
}

#[derive(Error, Debug)]
pub enum TransitionError {
    #[error("invalid transition: {0:?} -> {1:?}")]
    InvalidTransition(ProcessState, ProcessState),
}

#[derive(Debug)]
pub struct StateMachine {
    pub state: ProcessState,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self {
            state: ProcessState::NotStarted,
        }
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_transition(&self, to: ProcessState) -> bool {
        matches!(
            (self.state, to),
            (ProcessState::NotStarted, ProcessState::Running)
                | (ProcessState::Running, ProcessState::Stopping)
                | (ProcessState::Running, ProcessState::Exited)
                | (ProcessState::Stopping, ProcessState::Exited)
        )
    }

    pub fn transition(&mut self, to: ProcessState) -> Result<(), TransitionError> {
        if self.can_transition(to) {
            tracing::debug!("State transition: {:?} -> {:?}", self.state, to);
            self.state = to;
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition(self.state, to))
        }
    }
}
