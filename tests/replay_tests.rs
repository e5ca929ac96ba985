// Stepping backward, determinism and console input

use cppstep::events::{Event, UndefinedBehavior};
use cppstep::program::demos;
use cppstep::program::Program;
use cppstep::simulation::Action;
use cppstep::{Simulation, SimulationConfig};

fn start(program: Program) -> Simulation {
    Simulation::new(program, SimulationConfig::default()).expect("Simulation creation failed")
}

fn with_config(program: Program, config: SimulationConfig) -> Simulation {
    Simulation::new(program, config).expect("Simulation creation failed")
}

/// Everything a user can observe about a paused simulation
fn snapshot(sim: &Simulation) -> (usize, bool, String, String, Vec<String>, usize) {
    (
        sim.steps_taken(),
        sim.at_end(),
        sim.memory().print_objects(),
        sim.console().output().to_string(),
        sim.execution_stack().iter().map(|rt| rt.label.clone()).collect(),
        sim.total_ub(),
    )
}

#[test]
fn test_step_backward_matches_stepping_forward_less() {
    let mut direct = start(demos::arrays());
    direct.step_forward(25);

    let mut replayed = start(demos::arrays());
    replayed.step_forward(40);
    replayed.step_backward(15);

    assert_eq!(snapshot(&direct), snapshot(&replayed));
}

#[test]
fn test_step_backward_past_the_start_stops_at_zero() {
    let mut sim = start(demos::countdown());
    sim.step_forward(3);
    sim.step_backward(10);
    assert_eq!(sim.steps_taken(), 0);
    assert_eq!(snapshot(&sim), snapshot(&start(demos::countdown())));
}

#[test]
fn test_step_backward_from_the_end_undoes_the_finish() {
    let mut sim = start(demos::factorial());
    sim.step_to_end();
    let finished = snapshot(&sim);
    assert!(sim.at_end());

    sim.step_backward(1);
    assert!(!sim.at_end());
    assert_eq!(sim.steps_taken(), finished.0 - 1);

    sim.step_forward(1);
    assert_eq!(snapshot(&sim), finished);
}

#[test]
fn test_runs_are_deterministic() {
    let mut a = start(demos::leak());
    let mut b = start(demos::leak());
    a.step_to_end();
    b.step_to_end();
    assert_eq!(a.events().events(), b.events().events());
    assert_eq!(a.memory().print_objects(), b.memory().print_objects());
}

#[test]
fn test_rand_depends_only_on_the_seed() {
    let config = SimulationConfig {
        random_seed: 7,
        ..SimulationConfig::default()
    };
    let mut a = with_config(demos::random(), config.clone());
    let mut b = with_config(demos::random(), config);
    a.step_to_end();
    b.step_to_end();

    let output = a.console().output().to_string();
    assert_eq!(output, b.console().output());
    let rolls: Vec<i64> = output
        .split_whitespace()
        .map(|n| n.parse().expect("rand output is a number"))
        .collect();
    assert_eq!(rolls.len(), 3);
    assert!(rolls.iter().all(|n| (0..6).contains(n)));
}

#[test]
fn test_rand_survives_replay() {
    let mut sim = start(demos::random());
    sim.step_to_end();
    let output = sim.console().output().to_string();
    sim.step_backward(5);
    sim.step_to_end();
    assert_eq!(sim.console().output(), output);
}

#[test]
fn test_cin_blocks_until_input_arrives() {
    let mut sim = start(demos::input());
    sim.step_to_end();
    assert!(!sim.at_end());
    assert!(sim.is_blocking_until_cin());
    assert_eq!(sim.console().output(), "enter two numbers: ");

    // Stepping while blocked does nothing
    let steps = sim.steps_taken();
    sim.step_forward(5);
    assert_eq!(sim.steps_taken(), steps);

    sim.cin_input("3 4\n");
    assert!(!sim.is_blocking_until_cin());
    sim.step_to_end();
    assert!(sim.at_end());
    assert_eq!(sim.console().output(), "enter two numbers: sum: 7\n");
    assert_eq!(sim.main_return_value(), Some(0));
}

fn paused_count(sim: &Simulation) -> usize {
    sim.events()
        .events()
        .iter()
        .filter(|e| matches!(e, Event::Paused))
        .count()
}

#[test]
fn test_blocked_step_does_not_pause_again() {
    let mut sim = start(demos::input());
    sim.step_forward(1);
    assert_eq!(paused_count(&sim), 1);

    sim.step_to_end();
    assert!(sim.is_blocking_until_cin());
    let paused = paused_count(&sim);
    sim.step_forward(5);
    assert_eq!(paused_count(&sim), paused);
}

#[test]
fn test_replay_keeps_console_input() {
    let mut sim = start(demos::input());
    sim.step_to_end();
    sim.cin_input("3 4\n");
    sim.step_to_end();
    let finished = snapshot(&sim);

    sim.step_backward(1);
    assert!(sim.actions().contains(&Action::CinInput("3 4\n".to_string())));
    sim.step_forward(1);
    assert_eq!(snapshot(&sim), finished);
}

#[test]
fn test_configured_stdin_is_read_first() {
    let config = SimulationConfig {
        stdin: "10 20".to_string(),
        ..SimulationConfig::default()
    };
    let mut sim = with_config(demos::input(), config);
    sim.step_to_end();
    assert!(sim.at_end());
    assert_eq!(sim.console().output(), "enter two numbers: sum: 30\n");
}

#[test]
fn test_failed_extraction_sets_failbit() {
    let config = SimulationConfig {
        stdin: "abc".to_string(),
        ..SimulationConfig::default()
    };
    let mut sim = with_config(demos::input(), config);
    sim.step_to_end();
    assert!(sim.at_end());
    assert!(sim.cin().is_failed());
    // x was zeroed by the failed extraction, y was never written
    assert!(sim.console().output().starts_with("enter two numbers: sum: "));
    assert_eq!(sim.ub_count(UndefinedBehavior::InvalidRead), 1);
}

#[test]
fn test_reset_returns_to_the_start() {
    let fresh = snapshot(&start(demos::classes()));
    let mut sim = start(demos::classes());
    sim.step_to_end();
    sim.reset();
    assert_eq!(snapshot(&sim), fresh);
    assert!(sim.actions().is_empty());
}
