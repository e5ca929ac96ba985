//! Helpers that assemble correctly typed construct trees
//!
//! Expression helpers insert the implicit conversions a C++ front-end would:
//! lvalue-to-rvalue reads, array-to-pointer decay and arithmetic
//! conversions. Functions are declared before they are defined so that
//! recursive calls and class special members can refer to them by id.

use super::ast::{
    BinaryOp, Block, ConversionKind, DeclarationStatement, Declarator, DoWhileStatement, Expression,
    ExpressionKind, ForStatement, IfStatement, IncrementOp, Initializer, Literal, LogicalOp, OutputItem,
    ReturnStatement, Statement, UnaryOp, ValueCategory, WhileStatement,
};
use super::entities::{EntityRef, GlobalEntity, LocalEntity};
use super::types::{ClassType, ObjectType, ReturnType};
use super::{FunctionDefinition, FunctionId, FunctionKind, GlobalDefinition, Program};
use std::rc::Rc;

use ValueCategory::{Lvalue, Prvalue};

/// A declared function: enough to build calls before the body exists
#[derive(Debug, Clone)]
pub struct Signature {
    pub id: FunctionId,
    pub name: String,
    pub params: Vec<Rc<LocalEntity>>,
    pub return_type: ReturnType,
}

impl Signature {
    /// Replace the parameters, for special members whose parameter types
    /// need the class that refers back to them
    pub fn with_params(mut self, params: Vec<Rc<LocalEntity>>) -> Self {
        self.params = params;
        self
    }
}

#[derive(Debug, Default)]
pub struct ProgramBuilder {
    functions: Vec<(String, Option<Rc<FunctionDefinition>>)>,
    globals: Vec<GlobalDefinition>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve an id for a function defined later
    pub fn declare(
        &mut self,
        name: impl Into<String>,
        params: Vec<Rc<LocalEntity>>,
        return_type: ReturnType,
    ) -> Signature {
        let name = name.into();
        let id = FunctionId(self.functions.len());
        self.functions.push((name.clone(), None));
        Signature {
            id,
            name,
            params,
            return_type,
        }
    }

    pub fn define(&mut self, sig: &Signature, body: Vec<Statement>) {
        let def = FunctionDefinition::new(sig.name.clone(), sig.params.clone(), sig.return_type.clone(), Block::new(body));
        self.install(sig, def);
    }

    pub fn define_member(&mut self, sig: &Signature, class: &Rc<ClassType>, kind: FunctionKind, body: Vec<Statement>) {
        let def = FunctionDefinition::new(sig.name.clone(), sig.params.clone(), sig.return_type.clone(), Block::new(body))
            .member_of(class.clone(), kind);
        self.install(sig, def);
    }

    fn install(&mut self, sig: &Signature, def: FunctionDefinition) {
        let slot = &mut self.functions[sig.id.0].1;
        if slot.is_some() {
            panic!("function {} defined twice", sig.name);
        }
        *slot = Some(Rc::new(def));
    }

    /// Declare and define a free function in one go
    pub fn function(
        &mut self,
        name: impl Into<String>,
        params: Vec<Rc<LocalEntity>>,
        return_type: ReturnType,
        body: Vec<Statement>,
    ) -> Signature {
        let sig = self.declare(name, params, return_type);
        self.define(&sig, body);
        sig
    }

    /// `int main()`
    pub fn main(&mut self, body: Vec<Statement>) -> Signature {
        self.function("main", Vec::new(), ReturnType::Value(ObjectType::Int), body)
    }

    pub fn global(&mut self, name: impl Into<String>, ty: ObjectType, initializer: Initializer) -> Rc<GlobalEntity> {
        let entity = GlobalEntity::new(name, ty);
        self.globals.push(GlobalDefinition {
            entity: entity.clone(),
            initializer,
        });
        entity
    }

    pub fn build(self) -> Program {
        let functions = self
            .functions
            .into_iter()
            .map(|(name, def)| def.unwrap_or_else(|| panic!("function {} declared but never defined", name)))
            .collect();
        Program {
            functions,
            globals: self.globals,
        }
    }
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

fn node(ty: Option<ObjectType>, category: ValueCategory, kind: ExpressionKind) -> Rc<Expression> {
    Expression::new(ty, category, kind)
}

fn ty_of(e: &Expression) -> ObjectType {
    e.ty.clone()
        .unwrap_or_else(|| panic!("expression {} has no value", e))
}

pub fn int(n: i64) -> Rc<Expression> {
    node(Some(ObjectType::Int), Prvalue, ExpressionKind::Literal(Literal::Int(n)))
}

pub fn double(d: f64) -> Rc<Expression> {
    node(Some(ObjectType::Double), Prvalue, ExpressionKind::Literal(Literal::Double(d)))
}

pub fn boolean(b: bool) -> Rc<Expression> {
    node(Some(ObjectType::Bool), Prvalue, ExpressionKind::Literal(Literal::Bool(b)))
}

pub fn character(c: char) -> Rc<Expression> {
    node(Some(ObjectType::Char), Prvalue, ExpressionKind::Literal(Literal::Char(c as u8)))
}

/// A string literal: an lvalue `char` array including the terminator
pub fn string(text: &str) -> Rc<Expression> {
    node(
        Some(ObjectType::array_of(ObjectType::Char, text.len() + 1)),
        Lvalue,
        ExpressionKind::StringLiteral(text.to_string()),
    )
}

pub fn null(pointee: ObjectType) -> Rc<Expression> {
    node(Some(ObjectType::pointer_to(pointee)), Prvalue, ExpressionKind::NullPointer)
}

pub fn local(entity: &Rc<LocalEntity>) -> Rc<Expression> {
    node(Some(entity.ty.clone()), Lvalue, ExpressionKind::Identifier(EntityRef::Local(entity.clone())))
}

pub fn global(entity: &Rc<GlobalEntity>) -> Rc<Expression> {
    node(Some(entity.ty.clone()), Lvalue, ExpressionKind::Identifier(EntityRef::Global(entity.clone())))
}

pub fn this(class: &Rc<ClassType>) -> Rc<Expression> {
    node(
        Some(ObjectType::pointer_to(ObjectType::Class(class.clone()))),
        Prvalue,
        ExpressionKind::This,
    )
}

fn conversion(kind: ConversionKind, ty: ObjectType, operand: Rc<Expression>) -> Rc<Expression> {
    node(Some(ty), Prvalue, ExpressionKind::Conversion { kind, operand })
}

/// Read an lvalue. Arrays decay to a pointer; class lvalues stay objects.
pub fn rvalue(e: Rc<Expression>) -> Rc<Expression> {
    if !e.is_lvalue() {
        return e;
    }
    match ty_of(&e) {
        ObjectType::Array { elem, .. } => conversion(ConversionKind::ArrayToPointer, ObjectType::Pointer(elem), e),
        ObjectType::Class(_) => e,
        ty => conversion(ConversionKind::LvalueToRvalue, ty, e),
    }
}

/// Implicit conversion of `e` to `ty`
pub fn convert(e: Rc<Expression>, ty: &ObjectType) -> Rc<Expression> {
    let e = rvalue(e);
    let from = ty_of(&e);
    if &from == ty {
        return e;
    }
    let kind = match (&from, ty) {
        (_, ObjectType::Bool) if from.is_arithmetic() || from.is_pointer() => ConversionKind::ToBool,
        (ObjectType::Double, to) if to.is_integral() => ConversionKind::FloatingToIntegral,
        (from, ObjectType::Double) if from.is_integral() => ConversionKind::IntegralToFloating,
        (from, to) if from.is_integral() && to.is_integral() => ConversionKind::Integral,
        (from, ObjectType::Pointer(_)) if from.is_integral() => ConversionKind::NullPointer,
        // Pointer and class conversions keep the representation
        _ => return e,
    };
    conversion(kind, ty.clone(), e)
}

pub fn condition(e: Rc<Expression>) -> Rc<Expression> {
    convert(e, &ObjectType::Bool)
}

pub fn binary(op: BinaryOp, left: Rc<Expression>, right: Rc<Expression>) -> Rc<Expression> {
    let (left, right) = (rvalue(left), rvalue(right));
    let (lt, rt) = (ty_of(&left), ty_of(&right));
    if lt.is_pointer() && !op.is_comparison() {
        if rt.is_pointer() {
            return node(Some(ObjectType::Int), Prvalue, ExpressionKind::PointerDifference { left, right });
        }
        return node(
            Some(lt),
            Prvalue,
            ExpressionKind::PointerOffset {
                subtract: op == BinaryOp::Sub,
                pointer: left,
                offset: convert(right, &ObjectType::Int),
            },
        );
    }
    if lt.is_pointer() || rt.is_pointer() {
        let ty = if lt.is_pointer() { lt } else { rt };
        let (left, right) = (convert(left, &ty), convert(right, &ty));
        return node(Some(ObjectType::Bool), Prvalue, ExpressionKind::Binary { op, left, right });
    }
    let common = if lt == ObjectType::Double || rt == ObjectType::Double {
        ObjectType::Double
    } else {
        ObjectType::Int
    };
    let result = if op.is_comparison() { ObjectType::Bool } else { common.clone() };
    node(
        Some(result),
        Prvalue,
        ExpressionKind::Binary {
            op,
            left: convert(left, &common),
            right: convert(right, &common),
        },
    )
}

pub fn add(l: Rc<Expression>, r: Rc<Expression>) -> Rc<Expression> {
    binary(BinaryOp::Add, l, r)
}

pub fn sub(l: Rc<Expression>, r: Rc<Expression>) -> Rc<Expression> {
    binary(BinaryOp::Sub, l, r)
}

pub fn mul(l: Rc<Expression>, r: Rc<Expression>) -> Rc<Expression> {
    binary(BinaryOp::Mul, l, r)
}

pub fn div(l: Rc<Expression>, r: Rc<Expression>) -> Rc<Expression> {
    binary(BinaryOp::Div, l, r)
}

pub fn rem(l: Rc<Expression>, r: Rc<Expression>) -> Rc<Expression> {
    binary(BinaryOp::Mod, l, r)
}

pub fn lt(l: Rc<Expression>, r: Rc<Expression>) -> Rc<Expression> {
    binary(BinaryOp::Lt, l, r)
}

pub fn gt(l: Rc<Expression>, r: Rc<Expression>) -> Rc<Expression> {
    binary(BinaryOp::Gt, l, r)
}

pub fn le(l: Rc<Expression>, r: Rc<Expression>) -> Rc<Expression> {
    binary(BinaryOp::Le, l, r)
}

pub fn eq(l: Rc<Expression>, r: Rc<Expression>) -> Rc<Expression> {
    binary(BinaryOp::Eq, l, r)
}

pub fn ne(l: Rc<Expression>, r: Rc<Expression>) -> Rc<Expression> {
    binary(BinaryOp::Ne, l, r)
}

pub fn unary(op: UnaryOp, operand: Rc<Expression>) -> Rc<Expression> {
    let (operand, ty) = match op {
        UnaryOp::Not => (condition(operand), ObjectType::Bool),
        _ => {
            let operand = rvalue(operand);
            let ty = match ty_of(&operand) {
                ObjectType::Double => ObjectType::Double,
                _ => ObjectType::Int,
            };
            (convert(operand, &ty), ty)
        }
    };
    node(Some(ty), Prvalue, ExpressionKind::Unary { op, operand })
}

pub fn logical(op: LogicalOp, left: Rc<Expression>, right: Rc<Expression>) -> Rc<Expression> {
    node(
        Some(ObjectType::Bool),
        Prvalue,
        ExpressionKind::Logical {
            op,
            left: condition(left),
            right: condition(right),
        },
    )
}

pub fn assign(target: Rc<Expression>, value: Rc<Expression>) -> Rc<Expression> {
    let ty = ty_of(&target);
    let value = convert(value, &ty);
    node(Some(ty), Lvalue, ExpressionKind::Assignment { target, value })
}

pub fn compound_assign(op: BinaryOp, target: Rc<Expression>, value: Rc<Expression>) -> Rc<Expression> {
    let ty = ty_of(&target);
    let value = rvalue(value);
    let value = if ty.is_pointer() || (ty.is_integral() && ty_of(&value).is_integral()) {
        convert(value, &ObjectType::Int)
    } else {
        value
    };
    node(Some(ty), Lvalue, ExpressionKind::CompoundAssignment { op, target, value })
}

pub fn increment(op: IncrementOp, target: Rc<Expression>) -> Rc<Expression> {
    let category = match op {
        IncrementOp::PreInc | IncrementOp::PreDec => Lvalue,
        IncrementOp::PostInc | IncrementOp::PostDec => Prvalue,
    };
    node(Some(ty_of(&target)), category, ExpressionKind::Increment { op, target })
}

pub fn deref(pointer: Rc<Expression>) -> Rc<Expression> {
    let pointer = rvalue(pointer);
    let ty = pointee(&pointer);
    node(Some(ty), Lvalue, ExpressionKind::Dereference(pointer))
}

fn pointee(pointer: &Expression) -> ObjectType {
    ty_of(pointer)
        .pointee()
        .cloned()
        .unwrap_or_else(|| panic!("{} is not a pointer", pointer))
}

pub fn address_of(object: Rc<Expression>) -> Rc<Expression> {
    let ty = ObjectType::pointer_to(ty_of(&object));
    node(Some(ty), Prvalue, ExpressionKind::AddressOf(object))
}

/// `base[index]` on an array or pointer
pub fn index(base: Rc<Expression>, index: Rc<Expression>) -> Rc<Expression> {
    let pointer = rvalue(base);
    let ty = pointee(&pointer);
    node(
        Some(ty),
        Lvalue,
        ExpressionKind::Subscript {
            pointer,
            index: convert(index, &ObjectType::Int),
        },
    )
}

fn member_type(class: &ClassType, member: &str) -> ObjectType {
    if let Some(i) = class.member_index(member) {
        return class.members[i].ty.clone();
    }
    match &class.base {
        Some(base) => member_type(base, member),
        None => panic!("{} has no member {}", class.name, member),
    }
}

pub fn dot(object: Rc<Expression>, member: &str) -> Rc<Expression> {
    let ty = match ty_of(&object) {
        ObjectType::Class(class) => member_type(&class, member),
        other => panic!("member access on {}", other),
    };
    node(
        Some(ty),
        Lvalue,
        ExpressionKind::Dot {
            object,
            member: member.to_string(),
        },
    )
}

pub fn arrow(pointer: Rc<Expression>, member: &str) -> Rc<Expression> {
    let pointer = rvalue(pointer);
    let ty = match pointee(&pointer) {
        ObjectType::Class(class) => member_type(&class, member),
        other => panic!("member access on {}", other),
    };
    node(
        Some(ty),
        Lvalue,
        ExpressionKind::Arrow {
            pointer,
            member: member.to_string(),
        },
    )
}

fn arguments(sig: &Signature, args: Vec<Rc<Expression>>) -> Vec<Rc<Expression>> {
    if args.len() != sig.params.len() {
        panic!("{} takes {} arguments, got {}", sig.name, sig.params.len(), args.len());
    }
    sig.params
        .iter()
        .zip(args)
        .map(|(param, arg)| if param.is_reference { arg } else { convert(arg, &param.ty) })
        .collect()
}

fn call_node(sig: &Signature, receiver: Option<Rc<Expression>>, args: Vec<Rc<Expression>>) -> Rc<Expression> {
    let (ty, category) = match &sig.return_type {
        ReturnType::Void => (None, Prvalue),
        ReturnType::Value(ty) => (Some(ty.clone()), Prvalue),
        ReturnType::Reference(ty) => (Some(ty.clone()), Lvalue),
    };
    node(
        ty,
        category,
        ExpressionKind::Call {
            function: sig.id,
            receiver,
            args: arguments(sig, args),
        },
    )
}

pub fn call(sig: &Signature, args: Vec<Rc<Expression>>) -> Rc<Expression> {
    call_node(sig, None, args)
}

/// `receiver.f(args)` where `receiver` is a class lvalue
pub fn method_call(sig: &Signature, receiver: Rc<Expression>, args: Vec<Rc<Expression>>) -> Rc<Expression> {
    call_node(sig, Some(receiver), args)
}

pub fn new_object(ty: ObjectType, initializer: Initializer) -> Rc<Expression> {
    node(
        Some(ObjectType::pointer_to(ty.clone())),
        Prvalue,
        ExpressionKind::New {
            allocated: ty,
            initializer,
        },
    )
}

pub fn new_array(element: ObjectType, length: Rc<Expression>) -> Rc<Expression> {
    node(
        Some(ObjectType::pointer_to(element.clone())),
        Prvalue,
        ExpressionKind::NewArray {
            element,
            length: convert(length, &ObjectType::Int),
        },
    )
}

pub fn delete(pointer: Rc<Expression>) -> Rc<Expression> {
    node(None, Prvalue, ExpressionKind::Delete { pointer: rvalue(pointer), array: false })
}

pub fn delete_array(pointer: Rc<Expression>) -> Rc<Expression> {
    node(None, Prvalue, ExpressionKind::Delete { pointer: rvalue(pointer), array: true })
}

/// `cout << a << b ...`, optionally followed by `<< endl`
pub fn print(items: Vec<Rc<Expression>>, endl: bool) -> Rc<Expression> {
    let mut stream: Option<Rc<Expression>> = None;
    let items = items
        .into_iter()
        .map(|e| OutputItem::Value(rvalue(e)))
        .chain(endl.then_some(OutputItem::Endl));
    for item in items {
        stream = Some(node(None, Prvalue, ExpressionKind::Output { stream: stream.take(), item }));
    }
    stream.unwrap_or_else(|| panic!("print needs at least one item"))
}

/// `cin >> a >> b ...`
pub fn read(targets: Vec<Rc<Expression>>) -> Rc<Expression> {
    let mut stream: Option<Rc<Expression>> = None;
    for target in targets {
        stream = Some(node(None, Prvalue, ExpressionKind::Input { stream: stream.take(), target }));
    }
    stream.unwrap_or_else(|| panic!("read needs at least one target"))
}

pub fn rand() -> Rc<Expression> {
    node(Some(ObjectType::Int), Prvalue, ExpressionKind::Rand)
}

pub fn comma(left: Rc<Expression>, right: Rc<Expression>) -> Rc<Expression> {
    node(right.ty.clone(), right.category, ExpressionKind::Comma { left, right })
}

pub fn conditional(cond: Rc<Expression>, then_value: Rc<Expression>, otherwise: Rc<Expression>) -> Rc<Expression> {
    let both_lvalues = then_value.is_lvalue() && otherwise.is_lvalue() && then_value.ty == otherwise.ty;
    let (then_value, otherwise, category) = if both_lvalues {
        (then_value, otherwise, Lvalue)
    } else {
        let then_value = rvalue(then_value);
        let ty = ty_of(&then_value);
        (then_value, convert(otherwise, &ty), Prvalue)
    };
    node(
        then_value.ty.clone(),
        category,
        ExpressionKind::Conditional {
            condition: condition(cond),
            then_value,
            otherwise,
        },
    )
}

// ---------------------------------------------------------------------------
// Initializers and statements
// ---------------------------------------------------------------------------

/// Copy-initialize an object of type `ty` from `e`
pub fn init(ty: &ObjectType, e: Rc<Expression>) -> Initializer {
    match ty {
        ObjectType::Class(_) => Initializer::Direct(e),
        // char array from a string literal
        ObjectType::Array { .. } => Initializer::Direct(e),
        _ => Initializer::Direct(convert(e, ty)),
    }
}

/// Bind a reference to an lvalue
pub fn bind(e: Rc<Expression>) -> Initializer {
    if !e.is_lvalue() {
        panic!("cannot bind a reference to {}", e);
    }
    Initializer::Direct(e)
}

/// `T name = e;`, returning the new local
pub fn var(name: &str, ty: ObjectType, e: Rc<Expression>) -> (Rc<LocalEntity>, Statement) {
    let entity = LocalEntity::object(name, ty);
    let stmt = declare(&entity, init(&entity.ty, e));
    (entity, stmt)
}

pub fn declare(entity: &Rc<LocalEntity>, initializer: Initializer) -> Statement {
    declare_all(vec![(entity.clone(), initializer)])
}

pub fn declare_all(declarators: Vec<(Rc<LocalEntity>, Initializer)>) -> Statement {
    let declarators = declarators
        .into_iter()
        .map(|(entity, initializer)| Declarator { entity, initializer })
        .collect();
    Statement::Declaration(Rc::new(DeclarationStatement { declarators }))
}

pub fn expr(e: Rc<Expression>) -> Statement {
    Statement::Expression(e)
}

pub fn block(statements: Vec<Statement>) -> Statement {
    Statement::Block(Rc::new(Block::new(statements)))
}

pub fn if_else(cond: Rc<Expression>, then_branch: Statement, otherwise: Option<Statement>) -> Statement {
    Statement::If(Rc::new(IfStatement {
        condition: condition(cond),
        then_branch,
        otherwise,
    }))
}

pub fn while_loop(cond: Rc<Expression>, body: Statement) -> Statement {
    Statement::While(Rc::new(WhileStatement {
        condition: condition(cond),
        body,
    }))
}

pub fn do_while(body: Statement, cond: Rc<Expression>) -> Statement {
    Statement::DoWhile(Rc::new(DoWhileStatement {
        body,
        condition: condition(cond),
    }))
}

pub fn for_loop(
    init: Option<Statement>,
    cond: Option<Rc<Expression>>,
    post: Option<Rc<Expression>>,
    body: Statement,
) -> Statement {
    Statement::For(Rc::new(ForStatement::new(init, cond.map(condition), post, body)))
}

/// `return e;` for a function returning `ty` by value
pub fn ret(ty: &ObjectType, e: Rc<Expression>) -> Statement {
    let value = match ty {
        ObjectType::Class(_) => e,
        _ => convert(e, ty),
    };
    Statement::Return(Rc::new(ReturnStatement { value: Some(value) }))
}

/// `return e;` for a function returning a reference
pub fn ret_ref(e: Rc<Expression>) -> Statement {
    Statement::Return(Rc::new(ReturnStatement { value: Some(e) }))
}

pub fn ret_void() -> Statement {
    Statement::Return(Rc::new(ReturnStatement { value: None }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers_are_read_through_a_conversion() {
        let x = LocalEntity::object("x", ObjectType::Int);
        let e = add(local(&x), int(1));
        let ExpressionKind::Binary { left, .. } = &e.kind else {
            panic!("expected a binary expression");
        };
        assert!(matches!(
            left.kind,
            ExpressionKind::Conversion {
                kind: ConversionKind::LvalueToRvalue,
                ..
            }
        ));
        assert_eq!(e.ty, Some(ObjectType::Int));
    }

    #[test]
    fn test_mixed_arithmetic_promotes_to_double() {
        let e = mul(int(2), double(1.5));
        assert_eq!(e.ty, Some(ObjectType::Double));
        assert_eq!(lt(int(1), double(2.0)).ty, Some(ObjectType::Bool));
    }

    #[test]
    fn test_pointer_plus_int_is_an_offset() {
        let arr = LocalEntity::object("a", ObjectType::array_of(ObjectType::Int, 3));
        let e = add(local(&arr), int(1));
        assert!(matches!(e.kind, ExpressionKind::PointerOffset { subtract: false, .. }));
        assert_eq!(e.ty, Some(ObjectType::pointer_to(ObjectType::Int)));
    }

    #[test]
    fn test_print_chains_streams() {
        let e = print(vec![int(1), string("a")], true);
        assert_eq!(e.to_string(), "cout << 1 << \"a\" << endl");
    }

    #[test]
    fn test_literals_display_as_source() {
        assert_eq!(boolean(true).to_string(), "true");
        assert_eq!(character('x').to_string(), "'x'");
        assert_eq!(double(2.5).to_string(), "2.5");
        assert_eq!(add(int(1), int(2)).to_string(), "1 + 2");
    }

    #[test]
    #[should_panic(expected = "declared but never defined")]
    fn test_undefined_function_is_rejected() {
        let mut builder = ProgramBuilder::new();
        builder.declare("f", Vec::new(), ReturnType::Void);
        builder.build();
    }
}
