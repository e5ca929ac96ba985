// Integration tests for whole programs run to completion

use cppstep::events::{Event, UndefinedBehavior};
use cppstep::program::ast::{BinaryOp, IncrementOp, Initializer, LogicalOp, Statement};
use cppstep::program::builder::*;
use cppstep::program::demos;
use cppstep::program::entities::LocalEntity;
use cppstep::program::types::{ClassType, MemberVariable, ObjectType, ReturnType};
use cppstep::program::{FunctionKind, MemberInitializer, Program};
use cppstep::{Simulation, SimulationConfig};
use maplit::hashmap;
use std::collections::HashMap;
use std::rc::Rc;

fn run(program: Program) -> Simulation {
    let mut sim = Simulation::new(program, SimulationConfig::default()).expect("Simulation creation failed");
    sim.step_to_end();
    assert!(sim.at_end(), "program did not finish");
    sim
}

fn count_events(sim: &Simulation, pred: impl Fn(&Event) -> bool) -> usize {
    sim.events().events().iter().filter(|e| pred(e)).count()
}

#[test]
fn test_countdown_end_to_end() {
    let sim = run(demos::countdown());

    assert_eq!(count_events(&sim, |e| matches!(e, Event::FramePushed { .. })), 1);
    assert_eq!(count_events(&sim, |e| matches!(e, Event::FramePopped { .. })), 1);

    let x = sim
        .events()
        .events()
        .iter()
        .find_map(|e| match e {
            Event::ObjectAllocated { object, name: Some(name), .. } if name == "x" => Some(*object),
            _ => None,
        })
        .expect("x was never allocated");
    let memory = sim.memory();
    assert_eq!(memory.peek_value(x).as_i64(), 0);
    assert!(memory.is_valid(x));
    // The frame is gone, so x's lifetime has ended
    assert!(!memory.object(x).is_alive());

    assert!(sim.leaked_objects().is_empty());
    assert_eq!(sim.total_ub(), 0);
    assert_eq!(sim.main_return_value(), Some(0));
}

#[test]
fn test_function_call() {
    let mut b = ProgramBuilder::new();
    let a = LocalEntity::object("a", ObjectType::Int);
    let c = LocalEntity::object("b", ObjectType::Int);
    let add_fn = b.function(
        "add",
        vec![a.clone(), c.clone()],
        ReturnType::Value(ObjectType::Int),
        vec![ret(&ObjectType::Int, add(local(&a), local(&c)))],
    );
    let (result, decl) = var("result", ObjectType::Int, call(&add_fn, vec![int(3), int(4)]));
    b.main(vec![decl, ret(&ObjectType::Int, local(&result))]);

    let sim = run(b.build());
    assert_eq!(sim.main_return_value(), Some(7));
    assert_eq!(count_events(&sim, |e| matches!(e, Event::FramePushed { .. })), 2);
}

#[test]
fn test_recursion() {
    let sim = run(demos::factorial());
    assert_eq!(sim.console().output(), "5! = 120\n");
    assert_eq!(sim.main_return_value(), Some(0));
}

#[test]
fn test_reference_parameters() {
    let mut b = ProgramBuilder::new();
    let x = LocalEntity::reference("x", ObjectType::Int);
    let y = LocalEntity::reference("y", ObjectType::Int);
    let (t, decl_t) = var("t", ObjectType::Int, local(&x));
    let swap = b.function(
        "swap",
        vec![x.clone(), y.clone()],
        ReturnType::Void,
        vec![
            decl_t,
            expr(assign(local(&x), local(&y))),
            expr(assign(local(&y), local(&t))),
        ],
    );
    let (p, decl_p) = var("p", ObjectType::Int, int(1));
    let (q, decl_q) = var("q", ObjectType::Int, int(2));
    b.main(vec![
        decl_p,
        decl_q,
        expr(call(&swap, vec![local(&p), local(&q)])),
        expr(print(vec![local(&p), character(' '), local(&q)], true)),
        ret(&ObjectType::Int, int(0)),
    ]);

    let sim = run(b.build());
    assert_eq!(sim.console().output(), "2 1\n");
    assert_eq!(sim.total_ub(), 0);
}

#[test]
fn test_arrays_and_pointer_walk() {
    let sim = run(demos::arrays());
    assert_eq!(sim.console().output(), "sum = 30\n");
    assert_eq!(sim.total_ub(), 0);
}

#[test]
fn test_for_loop_with_continue() {
    let mut b = ProgramBuilder::new();
    let (sum, decl_sum) = var("sum", ObjectType::Int, int(0));
    let (i, decl_i) = var("i", ObjectType::Int, int(0));
    b.main(vec![
        decl_sum,
        for_loop(
            Some(decl_i),
            Some(lt(local(&i), int(10))),
            Some(increment(IncrementOp::PostInc, local(&i))),
            block(vec![
                if_else(eq(rem(local(&i), int(2)), int(0)), Statement::Continue, None),
                expr(compound_assign(BinaryOp::Add, local(&sum), local(&i))),
            ]),
        ),
        ret(&ObjectType::Int, local(&sum)),
    ]);

    let sim = run(b.build());
    assert_eq!(sim.main_return_value(), Some(25));
}

#[test]
fn test_break_unwinds_enclosing_blocks() {
    let mut b = ProgramBuilder::new();
    let (count, decl_count) = var("count", ObjectType::Int, int(0));
    let (inner, decl_inner) = var("inner", ObjectType::Int, local(&count));
    b.main(vec![
        decl_count,
        while_loop(
            boolean(true),
            block(vec![
                decl_inner,
                expr(assign(local(&count), add(local(&count), int(1)))),
                if_else(eq(local(&count), int(3)), block(vec![Statement::Break]), None),
            ]),
        ),
        expr(print(vec![local(&count)], true)),
        ret(&ObjectType::Int, int(0)),
    ]);

    let sim = run(b.build());
    assert_eq!(sim.console().output(), "3\n");
    let memory = sim.memory();
    let inner_kills = count_events(&sim, |e| match e {
        Event::ObjectKilled { object, .. } => memory.object(*object).name.as_deref() == Some(inner.name.as_str()),
        _ => false,
    });
    assert_eq!(inner_kills, 3);
    assert_eq!(sim.total_ub(), 0);
}

#[test]
fn test_do_while_runs_body_once() {
    let mut b = ProgramBuilder::new();
    let (n, decl_n) = var("n", ObjectType::Int, int(10));
    b.main(vec![
        decl_n,
        do_while(
            block(vec![expr(increment(IncrementOp::PreInc, local(&n)))]),
            lt(local(&n), int(5)),
        ),
        ret(&ObjectType::Int, local(&n)),
    ]);
    assert_eq!(run(b.build()).main_return_value(), Some(11));
}

#[test]
fn test_cout_formats_each_type() {
    let mut b = ProgramBuilder::new();
    b.main(vec![
        expr(print(
            vec![
                int(7),
                character(' '),
                double(2.5),
                character(' '),
                character('x'),
                character(' '),
                boolean(true),
            ],
            true,
        )),
        expr(print(vec![div(int(7), int(2)), string(" "), div(int(7), double(2.0))], true)),
        ret(&ObjectType::Int, int(0)),
    ]);
    let sim = run(b.build());
    assert_eq!(sim.console().output(), "7 2.5 x 1\n3 3.5\n");
}

#[test]
fn test_short_circuit_skips_right_operand() {
    let mut b = ProgramBuilder::new();
    let (t, decl) = var(
        "t",
        ObjectType::Bool,
        logical(LogicalOp::And, boolean(false), eq(div(int(1), int(0)), int(0))),
    );
    b.main(vec![decl, ret(&ObjectType::Int, local(&t))]);
    let sim = run(b.build());
    assert_eq!(sim.ub_count(UndefinedBehavior::DivisionByZero), 0);
    assert_eq!(sim.main_return_value(), Some(0));
}

#[test]
fn test_conditional_expression() {
    let mut b = ProgramBuilder::new();
    let (a, decl_a) = var("a", ObjectType::Int, int(3));
    let (c, decl_c) = var("c", ObjectType::Int, int(9));
    b.main(vec![
        decl_a,
        decl_c,
        ret(
            &ObjectType::Int,
            conditional(gt(local(&a), local(&c)), local(&a), local(&c)),
        ),
    ]);
    assert_eq!(run(b.build()).main_return_value(), Some(9));
}

#[test]
fn test_division_by_zero_is_reported() {
    let mut b = ProgramBuilder::new();
    let (zero, decl_zero) = var("zero", ObjectType::Int, int(0));
    let (_, decl_q) = var("q", ObjectType::Int, div(int(1), local(&zero)));
    b.main(vec![decl_zero, decl_q, ret(&ObjectType::Int, int(0))]);
    let sim = run(b.build());
    assert_eq!(sim.ub_count(UndefinedBehavior::DivisionByZero), 1);
}

#[test]
fn test_missing_return_is_reported() {
    let mut b = ProgramBuilder::new();
    let f = b.function("f", Vec::new(), ReturnType::Value(ObjectType::Int), Vec::new());
    b.main(vec![expr(call(&f, Vec::new())), ret(&ObjectType::Int, int(0))]);
    let sim = run(b.build());
    assert_eq!(sim.ub_count(UndefinedBehavior::MissingReturn), 1);
    assert_eq!(sim.main_return_value(), Some(0));
}

#[test]
fn test_globals_are_initialized_before_main() {
    let mut b = ProgramBuilder::new();
    let g = b.global("g", ObjectType::Int, init(&ObjectType::Int, int(5)));
    b.main(vec![ret(&ObjectType::Int, add(global(&g), int(1)))]);
    let sim = run(b.build());
    assert_eq!(sim.main_return_value(), Some(6));
    let g_obj = sim.find_variable("g").expect("global g");
    assert!(!sim.memory().object(g_obj).is_alive());
}

#[test]
fn test_constructors_and_destructors() {
    let sim = run(demos::classes());
    assert_eq!(
        sim.console().lines(),
        vec![
            "construct 1",
            "construct 2",
            "construct 3",
            "destroy 2",
            "destroy 3",
            "destroy 1",
        ]
    );
    assert!(sim.leaked_objects().is_empty());
    assert_eq!(sim.total_ub(), 0);
}

#[test]
fn test_member_functions() {
    let mut b = ProgramBuilder::new();
    let bump = b.declare("bump", Vec::new(), ReturnType::Void);
    let get = b.declare("get", Vec::new(), ReturnType::Value(ObjectType::Int));
    let class = Rc::new(ClassType::new(
        "Counter",
        vec![MemberVariable {
            name: "n".into(),
            ty: ObjectType::Int,
        }],
    ));
    let n = || arrow(this(&class), "n");
    b.define_member(
        &bump,
        &class,
        FunctionKind::Member,
        vec![expr(assign(n(), add(n(), int(1))))],
    );
    b.define_member(&get, &class, FunctionKind::Member, vec![ret(&ObjectType::Int, n())]);

    let counter = LocalEntity::object("c", ObjectType::Class(class.clone()));
    b.main(vec![
        declare(&counter, Initializer::Default),
        expr(assign(dot(local(&counter), "n"), int(0))),
        expr(method_call(&bump, local(&counter), Vec::new())),
        expr(method_call(&bump, local(&counter), Vec::new())),
        ret(&ObjectType::Int, method_call(&get, local(&counter), Vec::new())),
    ]);

    let sim = run(b.build());
    assert_eq!(sim.main_return_value(), Some(2));
    assert_eq!(sim.total_ub(), 0);
}

#[test]
fn test_char_arrays_and_string_literals() {
    let sim = run(demos::strings());
    assert_eq!(sim.console().output(), "hello, World\n");
}

#[test]
fn test_uninitialized_read_is_reported() {
    let mut b = ProgramBuilder::new();
    let x = LocalEntity::object("x", ObjectType::Int);
    let (_, decl_y) = var("y", ObjectType::Int, local(&x));
    b.main(vec![declare(&x, Initializer::Default), decl_y, ret(&ObjectType::Int, int(0))]);
    let sim = run(b.build());
    assert_eq!(sim.ub_count(UndefinedBehavior::InvalidRead), 1);
}

#[test]
fn test_each_undefined_behavior_is_reported_once() {
    let mut b = ProgramBuilder::new();
    let x = LocalEntity::object("x", ObjectType::Int);
    let (zero, decl_zero) = var("zero", ObjectType::Int, int(0));
    let (_, decl_y) = var("y", ObjectType::Int, add(local(&x), div(int(1), local(&zero))));
    b.main(vec![
        declare(&x, Initializer::Default),
        decl_zero,
        decl_y,
        ret(&ObjectType::Int, int(0)),
    ]);
    let sim = run(b.build());

    let mut reported = HashMap::new();
    for event in sim.events().events() {
        if let Event::UndefinedBehavior { kind, .. } = event {
            *reported.entry(*kind).or_insert(0) += 1;
        }
    }
    assert_eq!(
        reported,
        hashmap! {
            UndefinedBehavior::InvalidRead => 1,
            UndefinedBehavior::DivisionByZero => 1,
        }
    );
    assert_eq!(sim.total_ub(), 2);
}

/// `Widget` with an `id` member; the constructors and destructor report through `cout`
fn widget_class(b: &mut ProgramBuilder, with_copy: bool) -> (Rc<ClassType>, ObjectType) {
    let ctor = b.declare("Widget", Vec::new(), ReturnType::Void);
    let copy = b.declare("Widget", Vec::new(), ReturnType::Void);
    let dtor = b.declare("~Widget", Vec::new(), ReturnType::Void);
    let mut class = ClassType::new(
        "Widget",
        vec![MemberVariable {
            name: "id".into(),
            ty: ObjectType::Int,
        }],
    )
    .with_default_constructor(ctor.id)
    .with_destructor(dtor.id);
    if with_copy {
        class = class.with_copy_constructor(copy.id);
    }
    let class = Rc::new(class);
    let ty = ObjectType::Class(class.clone());
    let self_id = || arrow(this(&class), "id");

    b.define_member(
        &ctor,
        &class,
        FunctionKind::Constructor {
            member_initializers: vec![MemberInitializer {
                member: "id".into(),
                initializer: init(&ObjectType::Int, int(1)),
            }],
        },
        vec![expr(print(vec![string("make "), self_id()], true))],
    );
    let other = LocalEntity::reference("other", ty.clone());
    let copy = copy.with_params(vec![other.clone()]);
    b.define_member(
        &copy,
        &class,
        FunctionKind::Constructor {
            member_initializers: vec![MemberInitializer {
                member: "id".into(),
                initializer: init(&ObjectType::Int, add(dot(local(&other), "id"), int(1))),
            }],
        },
        vec![expr(print(vec![string("copy "), self_id()], true))],
    );
    b.define_member(
        &dtor,
        &class,
        FunctionKind::Destructor,
        vec![expr(print(vec![string("destroy "), self_id()], true))],
    );
    (class, ty)
}

#[test]
fn test_returned_class_temporary_is_destroyed() {
    let mut b = ProgramBuilder::new();
    let (_, ty) = widget_class(&mut b, false);
    let w = LocalEntity::object("w", ty.clone());
    let make = b.function(
        "make_widget",
        Vec::new(),
        ReturnType::Value(ty.clone()),
        vec![declare(&w, Initializer::Default), ret(&ty, local(&w))],
    );
    b.main(vec![
        expr(call(&make, Vec::new())),
        expr(print(vec![string("done")], true)),
        ret(&ObjectType::Int, int(0)),
    ]);

    let sim = run(b.build());
    // The local first, then the returned temporary at the end of the statement
    assert_eq!(sim.console().lines(), vec!["make 1", "destroy 1", "destroy 1", "done"]);
    assert!(sim.leaked_objects().is_empty());
    assert_eq!(sim.total_ub(), 0);
}

#[test]
fn test_copy_constructor_runs_for_by_value_copies() {
    let mut b = ProgramBuilder::new();
    let (_, ty) = widget_class(&mut b, true);
    let param = LocalEntity::object("param", ty.clone());
    let show = b.function(
        "show",
        vec![param.clone()],
        ReturnType::Void,
        vec![expr(print(vec![string("show "), dot(local(&param), "id")], true))],
    );
    let a = LocalEntity::object("a", ty.clone());
    let (_, decl_b) = var("b", ty.clone(), local(&a));
    b.main(vec![
        declare(&a, Initializer::Default),
        expr(call(&show, vec![local(&a)])),
        decl_b,
        ret(&ObjectType::Int, int(0)),
    ]);

    let sim = run(b.build());
    assert_eq!(
        sim.console().lines(),
        vec![
            "make 1",
            "copy 2",
            "show 2",
            "destroy 2",
            "copy 2",
            "destroy 2",
            "destroy 1",
        ]
    );
    assert_eq!(sim.total_ub(), 0);
}

#[test]
fn test_member_access_through_dangling_pointer() {
    let mut b = ProgramBuilder::new();
    let class = Rc::new(ClassType::new(
        "Point",
        vec![MemberVariable {
            name: "x".into(),
            ty: ObjectType::Int,
        }],
    ));
    let ty = ObjectType::Class(class);
    let (p, decl_p) = var("p", ObjectType::pointer_to(ty.clone()), new_object(ty, Initializer::Value));
    b.main(vec![
        decl_p,
        expr(delete(local(&p))),
        expr(assign(arrow(local(&p), "x"), int(1))),
        expr(print(vec![arrow(local(&p), "x")], true)),
        ret(&ObjectType::Int, int(0)),
    ]);

    let sim = run(b.build());
    // One report per dereference, none for touching the member itself
    assert_eq!(sim.ub_count(UndefinedBehavior::InvalidDereference), 2);
    assert_eq!(sim.ub_count(UndefinedBehavior::DeadObjectAccess), 0);
}

#[test]
fn test_array_of_class_constructs_each_element() {
    let mut b = ProgramBuilder::new();
    let (_, ty) = widget_class(&mut b, false);
    let arr = LocalEntity::object("arr", ObjectType::array_of(ty, 2));
    b.main(vec![declare(&arr, Initializer::Default), ret(&ObjectType::Int, int(0))]);

    let sim = run(b.build());
    assert_eq!(sim.console().lines(), vec!["make 1", "make 1", "destroy 1", "destroy 1"]);
    assert_eq!(sim.total_ub(), 0);
}
