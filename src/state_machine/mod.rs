// Copyright (c) 2025 - Cowboy AI, Inc.
//! Finite State Machine Abstractions
//!
//! Generic, reusable state machine types. Transitions are deterministic
//! functions with no side effects; the caller decides when to apply them.
//!
//! # State Machine Type
//!
//! Machines here are **Mealy machines**: output depends on both current state
//! and input:
//! ```text
//! (State, Input) → (State, Output)
//! ```
//!
//! # Example
//!
//! ```rust
//! use cim_sprawl::state_machine::{GeneratorPhase, PhaseCommand, StateMachine, Step};
//!
//! let phase = GeneratorPhase::Pending;
//! let (phase, _) = phase.transition(&PhaseCommand::Apply(Step::Servers)).unwrap();
//! assert_eq!(phase, GeneratorPhase::Applied(Step::Servers));
//!
//! // Going backwards is rejected
//! assert!(phase.transition(&PhaseCommand::Apply(Step::Networks)).is_err());
//! ```

pub mod launch_phase;

pub use launch_phase::{GeneratorPhase, PhaseCommand, Step};

/// Result of a state transition
pub type TransitionResult<S> = Result<S, TransitionError>;

/// Errors that can occur during state transitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// Transition from current state to target state is not allowed
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Precondition not met for transition
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
}

/// Trait for finite state machines
pub trait StateMachine: Sized + Clone {
    /// Input type that triggers transitions
    type Input;

    /// Output type produced by transitions (use () if none)
    type Output;

    /// Attempt to transition to a new state given an input
    ///
    /// # Returns
    /// - Ok((new_state, output)) if transition is valid
    /// - Err(TransitionError) if transition is invalid
    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)>;

    /// Check if a transition is valid without performing it
    fn can_transition(&self, input: &Self::Input) -> bool {
        self.transition(input).is_ok()
    }
}

/// Record of one applied transition
#[derive(Debug, Clone)]
pub struct Transition<S, I> {
    pub from: S,
    pub to: S,
    pub input: I,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl<S, I> Transition<S, I> {
    pub fn new(from: S, to: S, input: I, timestamp: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            from,
            to,
            input,
            timestamp,
        }
    }
}

/// State machine with history
///
/// Wraps a state machine and tracks transition history.
#[derive(Debug, Clone)]
pub struct StateMachineWithHistory<FSM: StateMachine> {
    /// Current state
    pub current: FSM,

    /// Transition history
    pub history: Vec<Transition<FSM, FSM::Input>>,
}

impl<FSM: StateMachine> StateMachineWithHistory<FSM> {
    /// Create a new state machine with history tracking
    pub fn new(initial: FSM) -> Self {
        Self {
            current: initial,
            history: Vec::new(),
        }
    }

    /// Transition with history recording. A rejected input leaves both the
    /// state and the history untouched.
    pub fn transition_with_history(
        &mut self,
        input: FSM::Input,
        timestamp: chrono::DateTime<chrono::Utc>,
    ) -> TransitionResult<FSM::Output> {
        let from = self.current.clone();
        let (to, output) = self.current.transition(&input)?;

        self.history
            .push(Transition::new(from, to.clone(), input, timestamp));

        self.current = to;
        Ok(output)
    }

    pub fn get_history(&self) -> &[Transition<FSM, FSM::Input>] {
        &self.history
    }

    pub fn current_state(&self) -> &FSM {
        &self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_history_records_only_accepted_transitions() {
        let mut fsm = StateMachineWithHistory::new(GeneratorPhase::Pending);

        fsm.transition_with_history(PhaseCommand::Apply(Step::Networks), Utc::now())
            .unwrap();
        assert_eq!(fsm.get_history().len(), 1);

        assert!(fsm
            .transition_with_history(PhaseCommand::MarkLaunched, Utc::now())
            .is_err());
        assert_eq!(fsm.get_history().len(), 1);
        assert_eq!(
            *fsm.current_state(),
            GeneratorPhase::Applied(Step::Networks)
        );
    }

    #[test]
    fn test_can_transition() {
        assert!(GeneratorPhase::Pending.can_transition(&PhaseCommand::Apply(Step::Servers)));
        assert!(!GeneratorPhase::Pending.can_transition(&PhaseCommand::Apply(Step::Relaunch)));
    }
}
