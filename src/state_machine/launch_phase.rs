// Copyright (c) 2025 - Cowboy AI, Inc.
//! Infra Generator Phase State Machine
//!
//! Tracks how far the infra generator has brought up the current generation.
//!
//! # States
//!
//! - Pending: nothing applied yet
//! - Applied(step): every step up to and including `step` has been applied
//! - Launched: the initial launch finished (terminal except for relaunches)
//!
//! # Inputs
//!
//! - Apply(step): Pending/Applied → Applied, steps never go backwards
//! - Apply(Relaunch): Launched → Launched
//! - MarkLaunched: Applied(Services) → Launched

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{StateMachine, TransitionError, TransitionResult};

/// A generator step. Reaching a step implies every earlier step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Networks,
    Servers,
    Agents,
    Services,
    Relaunch,
}

impl Step {
    /// Every step of a full first launch
    pub const ALL: Step = Step::Services;

    pub fn starts_servers(&self) -> bool {
        *self >= Step::Servers
    }

    pub fn starts_agents(&self) -> bool {
        *self >= Step::Agents
    }

    pub fn starts_services(&self) -> bool {
        *self >= Step::Services
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Networks => "networks",
            Step::Servers => "servers",
            Step::Agents => "agents",
            Step::Services => "services",
            Step::Relaunch => "relaunch",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase command (FSM input)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseCommand {
    Apply(Step),
    MarkLaunched,
}

/// Generator progress (FSM state)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GeneratorPhase {
    #[default]
    Pending,
    Applied(Step),
    Launched,
}

impl GeneratorPhase {
    pub fn is_launched(&self) -> bool {
        matches!(self, GeneratorPhase::Launched)
    }
}

impl fmt::Display for GeneratorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeneratorPhase::Pending => f.write_str("pending"),
            GeneratorPhase::Applied(step) => write!(f, "applied({step})"),
            GeneratorPhase::Launched => f.write_str("launched"),
        }
    }
}

impl StateMachine for GeneratorPhase {
    type Input = PhaseCommand;
    type Output = ();

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
        use GeneratorPhase::*;
        use PhaseCommand::*;

        match (self, input) {
            (Launched, Apply(Step::Relaunch)) => Ok((Launched, ())),
            (Launched, Apply(step)) => Err(TransitionError::PreconditionFailed(format!(
                "cannot use step {step:?} after successful launch; use Regenerate"
            ))),
            (Launched, MarkLaunched) => Err(invalid(self, "launched")),

            (_, Apply(Step::Relaunch)) => Err(TransitionError::PreconditionFailed(
                "cannot relaunch before the initial launch".to_string(),
            )),

            (Pending, Apply(step)) => Ok((Applied(*step), ())),
            (Applied(prev), Apply(step)) if step >= prev => Ok((Applied(*step), ())),
            (Applied(_), Apply(step)) => Err(invalid(self, &Applied(*step).to_string())),

            (Applied(Step::Services), MarkLaunched) => Ok((Launched, ())),
            (_, MarkLaunched) => Err(invalid(self, "launched")),
        }
    }
}

fn invalid(from: &GeneratorPhase, to: &str) -> TransitionError {
    TransitionError::InvalidTransition {
        from: from.to_string(),
        to: to.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn apply(phase: GeneratorPhase, step: Step) -> TransitionResult<GeneratorPhase> {
        phase
            .transition(&PhaseCommand::Apply(step))
            .map(|(next, _)| next)
    }

    #[test]
    fn test_full_launch_sequence() {
        let mut phase = GeneratorPhase::Pending;
        for step in [Step::Networks, Step::Servers, Step::Agents, Step::Services] {
            phase = apply(phase, step).unwrap();
        }
        let (phase, _) = phase.transition(&PhaseCommand::MarkLaunched).unwrap();
        assert!(phase.is_launched());
        assert_eq!(apply(phase, Step::Relaunch).unwrap(), GeneratorPhase::Launched);
    }

    #[test]
    fn test_steps_are_monotonic() {
        let phase = apply(GeneratorPhase::Pending, Step::Agents).unwrap();
        assert!(apply(phase, Step::Agents).is_ok());
        assert!(apply(phase, Step::Servers).is_err());
    }

    #[test_case(Step::Networks ; "networks")]
    #[test_case(Step::Servers ; "servers")]
    #[test_case(Step::Services ; "services")]
    fn test_launched_rejects_earlier_steps(step: Step) {
        let err = apply(GeneratorPhase::Launched, step).unwrap_err();
        assert!(err.to_string().contains("use Regenerate"));
    }

    #[test]
    fn test_mark_launched_requires_services() {
        let phase = apply(GeneratorPhase::Pending, Step::Agents).unwrap();
        assert!(phase.transition(&PhaseCommand::MarkLaunched).is_err());
        assert!(GeneratorPhase::Pending
            .transition(&PhaseCommand::MarkLaunched)
            .is_err());
    }

    #[test]
    fn test_step_implications() {
        assert!(!Step::Networks.starts_servers());
        assert!(Step::Servers.starts_servers() && !Step::Servers.starts_agents());
        assert!(Step::ALL.starts_services());
        assert!(Step::Relaunch.starts_services());
    }
}
