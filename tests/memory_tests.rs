// Memory model behavior observed through running programs

use cppstep::events::{Event, UndefinedBehavior};
use cppstep::program::ast::{Initializer, Statement};
use cppstep::program::builder::*;
use cppstep::program::demos;
use cppstep::program::entities::LocalEntity;
use cppstep::program::types::{ObjectType, ReturnType};
use cppstep::program::Program;
use cppstep::{Simulation, SimulationConfig};

fn start(program: Program) -> Simulation {
    Simulation::new(program, SimulationConfig::default()).expect("Simulation creation failed")
}

fn position(sim: &Simulation, pred: impl Fn(&Event) -> bool) -> Option<usize> {
    sim.events().events().iter().position(pred)
}

#[test]
fn test_overwritten_pointer_leaks_at_statement_boundary() {
    let mut sim = start(demos::leak());
    sim.step_to_end();

    let leaked = sim.leaked_objects();
    assert_eq!(leaked.len(), 1);
    assert!(sim.memory().object(leaked[0]).is_leaked());

    // Reported while main was still running, not at program exit
    let leak = position(&sim, |e| matches!(e, Event::MemoryLeaked { .. })).expect("no leak reported");
    let frame_popped = position(&sim, |e| matches!(e, Event::FramePopped { .. })).expect("main never returned");
    assert!(leak < frame_popped);
    let reports = sim
        .events()
        .events()
        .iter()
        .filter(|e| matches!(e, Event::MemoryLeaked { .. }))
        .count();
    assert_eq!(reports, 1);
}

#[test]
fn test_delete_then_dangling_read() {
    let mut sim = start(demos::dangling());
    sim.step_to_end();

    assert!(sim.memory().heap_objects().is_empty());
    assert!(sim.leaked_objects().is_empty());

    let deleted = sim
        .events()
        .events()
        .iter()
        .find_map(|e| match e {
            Event::HeapObjectDeleted { object } => Some(*object),
            _ => None,
        })
        .expect("nothing was deleted");
    assert!(!sim.memory().object(deleted).is_alive());
    assert_eq!(sim.ub_count(UndefinedBehavior::InvalidDereference), 1);
}

#[test]
fn test_pointer_kept_alive_is_not_a_leak() {
    let mut b = ProgramBuilder::new();
    let int_ptr = ObjectType::pointer_to(ObjectType::Int);
    let (p, decl_p) = var("p", int_ptr.clone(), new_object(ObjectType::Int, init(&ObjectType::Int, int(3))));
    let (q, decl_q) = var("q", int_ptr, local(&p));
    b.main(vec![
        decl_p,
        decl_q,
        expr(assign(local(&p), int(0))),
        expr(delete(local(&q))),
        ret(&ObjectType::Int, int(0)),
    ]);
    let mut sim = start(b.build());
    sim.step_to_end();
    assert!(position(&sim, |e| matches!(e, Event::MemoryLeaked { .. })).is_none());
    assert!(sim.memory().heap_objects().is_empty());
}

#[test]
fn test_leak_through_array_allocation() {
    let mut b = ProgramBuilder::new();
    let (p, decl_p) = var(
        "p",
        ObjectType::pointer_to(ObjectType::Int),
        new_array(ObjectType::Int, int(4)),
    );
    b.main(vec![
        decl_p,
        // Pointing into the middle still keeps the array reachable
        expr(assign(local(&p), add(local(&p), int(2)))),
        expr(assign(index(local(&p), int(1)), int(9))),
        expr(delete_array(sub(local(&p), int(2)))),
        ret(&ObjectType::Int, int(0)),
    ]);
    let mut sim = start(b.build());
    sim.step_to_end();
    assert!(sim.leaked_objects().is_empty());
    assert!(sim.memory().heap_objects().is_empty());
    assert_eq!(sim.total_ub(), 0);
}

#[test]
fn test_locals_destroyed_in_reverse_order() {
    let mut b = ProgramBuilder::new();
    let (_, decl_a) = var("a", ObjectType::Int, int(1));
    let (_, decl_b) = var("b", ObjectType::Int, int(2));
    let (_, decl_c) = var("c", ObjectType::Int, int(3));
    b.main(vec![decl_a, decl_b, decl_c, ret(&ObjectType::Int, int(0))]);
    let mut sim = start(b.build());
    sim.step_to_end();

    let memory = sim.memory();
    let killed: Vec<String> = sim
        .events()
        .events()
        .iter()
        .filter_map(|e| match e {
            Event::ObjectKilled { object, .. } => memory.object(*object).name.clone(),
            _ => None,
        })
        .filter(|name| ["a", "b", "c"].contains(&name.as_str()))
        .collect();
    assert_eq!(killed, vec!["c", "b", "a"]);
}

#[test]
fn test_live_objects_never_overlap() {
    let mut sim = start(demos::classes());
    while !sim.at_end() {
        let memory = sim.memory();
        let mut spans: Vec<(u64, u64)> = memory
            .live_objects()
            .into_iter()
            .map(|id| {
                let obj = memory.object(id);
                (obj.address, obj.end_address())
            })
            .collect();
        spans.sort();
        for pair in spans.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "objects overlap at step {}: {:?}", sim.steps_taken(), pair);
        }
        sim.step_forward(1);
    }
}

#[test]
fn test_string_literals_are_shared() {
    let mut b = ProgramBuilder::new();
    b.main(vec![
        expr(print(vec![string("hi")], false)),
        expr(print(vec![string("hi")], true)),
        ret(&ObjectType::Int, int(0)),
    ]);
    let program = b.build();
    assert_eq!(program.string_literals(), vec!["hi".to_string()]);

    let mut sim = start(program);
    let literal = sim.memory().string_literal("hi").expect("literal allocated at startup");
    assert_eq!(sim.memory().object(literal).ty, ObjectType::array_of(ObjectType::Char, 3));
    sim.step_to_end();
    assert_eq!(sim.console().output(), "hihi\n");
}

#[test]
fn test_null_dereference() {
    let mut b = ProgramBuilder::new();
    let (p, decl_p) = var("p", ObjectType::pointer_to(ObjectType::Int), null(ObjectType::Int));
    b.main(vec![decl_p, expr(assign(deref(local(&p)), int(1))), ret(&ObjectType::Int, int(0))]);
    let mut sim = start(b.build());
    sim.step_to_end();
    assert!(sim.at_end());
    assert_eq!(sim.ub_count(UndefinedBehavior::NullDereference), 1);
}

#[test]
fn test_out_of_bounds_index() {
    let mut b = ProgramBuilder::new();
    let arr = LocalEntity::object("a", ObjectType::array_of(ObjectType::Int, 3));
    b.main(vec![
        declare(&arr, Initializer::Value),
        expr(assign(index(local(&arr), int(5)), int(1))),
        ret(&ObjectType::Int, int(0)),
    ]);
    let mut sim = start(b.build());
    sim.step_to_end();
    assert!(sim.ub_count(UndefinedBehavior::OutOfBounds) >= 1);
}

#[test]
fn test_delete_of_stack_object() {
    let mut b = ProgramBuilder::new();
    let (x, decl_x) = var("x", ObjectType::Int, int(1));
    b.main(vec![decl_x, expr(delete(address_of(local(&x)))), ret(&ObjectType::Int, int(0))]);
    let mut sim = start(b.build());
    sim.step_to_end();
    assert!(sim.at_end());
    assert_eq!(sim.ub_count(UndefinedBehavior::InvalidDelete), 1);
    assert!(sim.memory().heap_objects().is_empty());
}

#[test]
fn test_value_initialized_array_is_zero() {
    let mut b = ProgramBuilder::new();
    let arr = LocalEntity::object("a", ObjectType::array_of(ObjectType::Int, 4));
    b.main(vec![
        declare(&arr, Initializer::List(vec![int(5), int(6)])),
        ret(&ObjectType::Int, add(index(local(&arr), int(1)), index(local(&arr), int(3)))),
    ]);
    let mut sim = start(b.build());
    sim.step_to_end();
    assert_eq!(sim.main_return_value(), Some(6));
    assert_eq!(sim.total_ub(), 0);
}

#[test]
fn test_stack_overflow_ends_the_program() {
    let mut b = ProgramBuilder::new();
    let forever = b.declare("forever", Vec::new(), ReturnType::Void);
    let pad = LocalEntity::object("pad", ObjectType::array_of(ObjectType::Int, 100));
    b.define(
        &forever,
        vec![declare(&pad, Initializer::Default), expr(call(&forever, Vec::new()))],
    );
    b.main(vec![expr(call(&forever, Vec::new())), ret(&ObjectType::Int, int(0))]);
    let mut sim = start(b.build());
    sim.step_to_end();
    assert!(sim.at_end());
    assert_eq!(sim.ub_count(UndefinedBehavior::StackOverflow), 1);
    assert!(sim.execution_stack().is_empty());
}

fn killed_names(sim: &Simulation, names: &[&str]) -> Vec<String> {
    let memory = sim.memory();
    sim.events()
        .events()
        .iter()
        .filter_map(|e| match e {
            Event::ObjectKilled { object, .. } => memory.object(*object).name.clone(),
            _ => None,
        })
        .filter(|name| names.contains(&name.as_str()))
        .collect()
}

#[test]
fn test_break_destroys_enclosing_locals_innermost_first() {
    let mut b = ProgramBuilder::new();
    let (_, decl_i) = var("i", ObjectType::Int, int(0));
    let (_, decl_y) = var("y", ObjectType::Int, int(1));
    let (_, decl_x) = var("x", ObjectType::Int, int(2));
    let body = block(vec![
        decl_y,
        block(vec![decl_x, if_else(boolean(true), Statement::Break, None)]),
    ]);
    b.main(vec![
        for_loop(Some(decl_i), None, None, body),
        ret(&ObjectType::Int, int(0)),
    ]);
    let mut sim = start(b.build());
    sim.step_to_end();

    assert!(sim.at_end());
    assert_eq!(killed_names(&sim, &["i", "x", "y"]), vec!["x", "y", "i"]);
    assert_eq!(sim.total_ub(), 0);
}

#[test]
fn test_inner_block_destroys_its_locals_on_exit() {
    let mut b = ProgramBuilder::new();
    let (_, decl_a) = var("a", ObjectType::Int, int(1));
    let (_, decl_b) = var("b", ObjectType::Int, int(2));
    let (_, decl_c) = var("c", ObjectType::Int, int(3));
    let (_, decl_after) = var("after", ObjectType::Int, int(4));
    b.main(vec![
        block(vec![decl_a, decl_b, decl_c]),
        decl_after,
        ret(&ObjectType::Int, int(0)),
    ]);
    let mut sim = start(b.build());
    sim.step_to_end();

    // The block's locals die before `after` is even created
    assert_eq!(
        killed_names(&sim, &["a", "b", "c", "after"]),
        vec!["c", "b", "a", "after"]
    );
}

#[test]
fn test_temporary_region_grows_when_full() {
    let mut config = SimulationConfig::default();
    config.memory.temporary_capacity = 16;
    let mut b = ProgramBuilder::new();
    let one = b.function("one", Vec::new(), ReturnType::Value(ObjectType::Int), vec![ret(&ObjectType::Int, int(1))]);
    let sum = (0..4).fold(call(&one, Vec::new()), |acc, _| add(acc, call(&one, Vec::new())));
    b.main(vec![ret(&ObjectType::Int, sum)]);
    let mut sim = Simulation::new(b.build(), config).expect("Simulation creation failed");
    sim.step_to_end();

    assert!(sim.at_end());
    assert_eq!(sim.main_return_value(), Some(5));
    assert_eq!(sim.total_ub(), 0);
}
