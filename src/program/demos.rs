//! Small ready-made programs for the viewer and the command line

use super::ast::{BinaryOp, IncrementOp, Initializer};
use super::builder::*;
use super::entities::LocalEntity;
use super::types::{ClassType, MemberVariable, ObjectType, ReturnType};
use super::{FunctionKind, MemberInitializer, Program};
use crate::error::{Error, Result};
use std::rc::Rc;

/// Demo names with a one-line description
pub const DEMOS: &[(&str, &str)] = &[
    ("countdown", "a while loop counting a local down to zero"),
    ("factorial", "recursive calls and return values"),
    ("arrays", "an array filled by a for loop and summed through a pointer"),
    ("leak", "a heap object whose only pointer is overwritten"),
    ("dangling", "reading through a pointer after delete"),
    ("classes", "constructors and destructors in reverse order"),
    ("input", "reading numbers from cin"),
    ("random", "rand() from a seeded generator"),
    ("strings", "char arrays initialized from string literals"),
];

pub fn demo(name: &str) -> Result<Program> {
    let program = match name {
        "countdown" => countdown(),
        "factorial" => factorial(),
        "arrays" => arrays(),
        "leak" => leak(),
        "dangling" => dangling(),
        "classes" => classes(),
        "input" => input(),
        "random" => random(),
        "strings" => strings(),
        _ => return Err(Error::UnknownDemo(name.to_string())),
    };
    Ok(program)
}

/// `int main() { int x = 4; while (x > 0) { x = x - 1; } }`
pub fn countdown() -> Program {
    let mut b = ProgramBuilder::new();
    let (x, decl_x) = var("x", ObjectType::Int, int(4));
    b.main(vec![
        decl_x,
        while_loop(
            gt(local(&x), int(0)),
            block(vec![expr(assign(local(&x), sub(local(&x), int(1))))]),
        ),
    ]);
    b.build()
}

pub fn factorial() -> Program {
    let mut b = ProgramBuilder::new();
    let n = LocalEntity::object("n", ObjectType::Int);
    let fact = b.declare("factorial", vec![n.clone()], ReturnType::Value(ObjectType::Int));
    b.define(
        &fact,
        vec![
            if_else(le(local(&n), int(1)), ret(&ObjectType::Int, int(1)), None),
            ret(
                &ObjectType::Int,
                mul(local(&n), call(&fact, vec![sub(local(&n), int(1))])),
            ),
        ],
    );
    let (result, decl) = var("result", ObjectType::Int, call(&fact, vec![int(5)]));
    b.main(vec![
        decl,
        expr(print(vec![string("5! = "), local(&result)], true)),
        ret(&ObjectType::Int, int(0)),
    ]);
    b.build()
}

pub fn arrays() -> Program {
    let mut b = ProgramBuilder::new();
    let arr = LocalEntity::object("squares", ObjectType::array_of(ObjectType::Int, 5));
    let (i, decl_i) = var("i", ObjectType::Int, int(0));
    let (sum, decl_sum) = var("sum", ObjectType::Int, int(0));
    let (p, decl_p) = var("p", ObjectType::pointer_to(ObjectType::Int), local(&arr));
    b.main(vec![
        declare(&arr, Initializer::Default),
        for_loop(
            Some(decl_i),
            Some(lt(local(&i), int(5))),
            Some(increment(IncrementOp::PreInc, local(&i))),
            block(vec![expr(assign(index(local(&arr), local(&i)), mul(local(&i), local(&i))))]),
        ),
        decl_sum,
        decl_p,
        while_loop(
            lt(local(&p), add(local(&arr), int(5))),
            block(vec![
                expr(compound_assign(BinaryOp::Add, local(&sum), deref(local(&p)))),
                expr(increment(IncrementOp::PostInc, local(&p))),
            ]),
        ),
        expr(print(vec![string("sum = "), local(&sum)], true)),
        ret(&ObjectType::Int, int(0)),
    ]);
    b.build()
}

/// `int *p = new int(3); p = 0;`
pub fn leak() -> Program {
    let mut b = ProgramBuilder::new();
    let int_ptr = ObjectType::pointer_to(ObjectType::Int);
    let (p, decl) = var("p", int_ptr, new_object(ObjectType::Int, init(&ObjectType::Int, int(3))));
    b.main(vec![decl, expr(assign(local(&p), int(0))), ret(&ObjectType::Int, int(0))]);
    b.build()
}

/// `int *p = new int(3); int *q = p; delete p; cout << *q;`
pub fn dangling() -> Program {
    let mut b = ProgramBuilder::new();
    let int_ptr = ObjectType::pointer_to(ObjectType::Int);
    let (p, decl_p) = var("p", int_ptr.clone(), new_object(ObjectType::Int, init(&ObjectType::Int, int(3))));
    let (q, decl_q) = var("q", int_ptr, local(&p));
    b.main(vec![
        decl_p,
        decl_q,
        expr(delete(local(&p))),
        expr(print(vec![deref(local(&q))], true)),
        ret(&ObjectType::Int, int(0)),
    ]);
    b.build()
}

/// A class with a constructor and destructor that report through `cout`
pub fn classes() -> Program {
    let mut b = ProgramBuilder::new();
    let ctor = b.declare("Tracker", Vec::new(), ReturnType::Void);
    let dtor = b.declare("~Tracker", Vec::new(), ReturnType::Void);
    let class = Rc::new(
        ClassType::new(
            "Tracker",
            vec![MemberVariable {
                name: "id".into(),
                ty: ObjectType::Int,
            }],
        )
        .with_default_constructor(ctor.id)
        .with_destructor(dtor.id),
    );
    let counter = b.global("next_id", ObjectType::Int, Initializer::Value);
    let self_id = || arrow(this(&class), "id");

    b.define_member(
        &ctor,
        &class,
        FunctionKind::Constructor {
            member_initializers: vec![MemberInitializer {
                member: "id".into(),
                initializer: init(&ObjectType::Int, increment(IncrementOp::PreInc, global(&counter))),
            }],
        },
        vec![expr(print(vec![string("construct "), self_id()], true))],
    );
    b.define_member(
        &dtor,
        &class,
        FunctionKind::Destructor,
        vec![expr(print(vec![string("destroy "), self_id()], true))],
    );

    let ty = ObjectType::Class(class.clone());
    let a = LocalEntity::object("a", ty.clone());
    let c = LocalEntity::object("c", ty.clone());
    let (heap, decl_heap) = var("h", ObjectType::pointer_to(ty.clone()), new_object(ty.clone(), Initializer::Default));
    b.main(vec![
        declare(&a, Initializer::Default),
        decl_heap,
        declare(&c, Initializer::Default),
        expr(delete(local(&heap))),
        ret(&ObjectType::Int, int(0)),
    ]);
    b.build()
}

pub fn input() -> Program {
    let mut b = ProgramBuilder::new();
    let x = LocalEntity::object("x", ObjectType::Int);
    let y = LocalEntity::object("y", ObjectType::Int);
    b.main(vec![
        declare_all(vec![(x.clone(), Initializer::Default), (y.clone(), Initializer::Default)]),
        expr(print(vec![string("enter two numbers: ")], false)),
        expr(read(vec![local(&x), local(&y)])),
        expr(print(vec![string("sum: "), add(local(&x), local(&y))], true)),
        ret(&ObjectType::Int, int(0)),
    ]);
    b.build()
}

pub fn random() -> Program {
    let mut b = ProgramBuilder::new();
    let (i, decl_i) = var("i", ObjectType::Int, int(0));
    b.main(vec![
        for_loop(
            Some(decl_i),
            Some(lt(local(&i), int(3))),
            Some(increment(IncrementOp::PostInc, local(&i))),
            expr(print(vec![rem(rand(), int(6)), string(" ")], false)),
        ),
        expr(print(vec![string("")], true)),
        ret(&ObjectType::Int, int(0)),
    ]);
    b.build()
}

pub fn strings() -> Program {
    let mut b = ProgramBuilder::new();
    let name = LocalEntity::object("name", ObjectType::array_of(ObjectType::Char, 8));
    let greeting = b.global("greeting", ObjectType::pointer_to(ObjectType::Char), Initializer::Direct(rvalue(string("hello"))));
    b.main(vec![
        declare(&name, init(&name.ty, string("world"))),
        expr(assign(index(local(&name), int(0)), character('W'))),
        expr(print(vec![global(&greeting), string(", "), local(&name)], true)),
        ret(&ObjectType::Int, int(0)),
    ]);
    b.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_listed_demo_builds() {
        for (name, _) in DEMOS {
            let program = demo(name).unwrap();
            assert!(program.main().is_some(), "{} has no main", name);
        }
    }

    #[test]
    fn test_unknown_demo() {
        assert!(matches!(demo("nope"), Err(Error::UnknownDemo(_))));
    }

    #[test]
    fn test_string_literals_are_collected_once() {
        let program = strings();
        assert_eq!(program.string_literals(), vec!["hello".to_string(), "world".to_string(), ", ".to_string()]);
    }
}
