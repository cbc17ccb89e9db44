// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for the Generator Phase Machine

use cim_sprawl::state_machine::{GeneratorPhase, PhaseCommand, StateMachine, Step};
use proptest::prelude::*;

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::Networks),
        Just(Step::Servers),
        Just(Step::Agents),
        Just(Step::Services),
        Just(Step::Relaunch),
    ]
}

fn arb_command() -> impl Strategy<Value = PhaseCommand> {
    prop_oneof![
        4 => arb_step().prop_map(PhaseCommand::Apply),
        1 => Just(PhaseCommand::MarkLaunched),
    ]
}

fn rank(phase: &GeneratorPhase) -> u8 {
    match phase {
        GeneratorPhase::Pending => 0,
        GeneratorPhase::Applied(step) => 1 + *step as u8,
        GeneratorPhase::Launched => 10,
    }
}

proptest! {
    /// Accepted transitions never move the generator backwards
    #[test]
    fn prop_phase_never_regresses(commands in prop::collection::vec(arb_command(), 0..30)) {
        let mut phase = GeneratorPhase::Pending;
        for cmd in &commands {
            match phase.transition(cmd) {
                Ok((next, ())) => {
                    prop_assert!(rank(&next) >= rank(&phase), "{} -> {}", phase, next);
                    phase = next;
                }
                Err(_) => prop_assert!(!phase.can_transition(cmd)),
            }
        }
    }

    /// Relaunch is accepted exactly when the initial launch has finished
    #[test]
    fn prop_relaunch_only_after_launch(commands in prop::collection::vec(arb_command(), 0..30)) {
        let mut phase = GeneratorPhase::Pending;
        for cmd in &commands {
            if *cmd == PhaseCommand::Apply(Step::Relaunch) {
                prop_assert_eq!(phase.can_transition(cmd), phase.is_launched());
            }
            if let Ok((next, ())) = phase.transition(cmd) {
                phase = next;
            }
        }
    }

    /// Reaching Launched always passes through Applied(Services)
    #[test]
    fn prop_launch_requires_services(commands in prop::collection::vec(arb_command(), 0..30)) {
        let mut phase = GeneratorPhase::Pending;
        for cmd in &commands {
            if let Ok((next, ())) = phase.transition(cmd) {
                if next.is_launched() && !phase.is_launched() {
                    prop_assert_eq!(phase, GeneratorPhase::Applied(Step::Services));
                }
                phase = next;
            }
        }
    }
}
