// Compiled construct tree: statements, expressions and initializers
//
// Every node is already type-checked and every identifier is bound to an
// entity. Children are shared through `Rc` so runtime instances can hold on
// to the construct they execute without borrowing the program.

use super::entities::{EntityRef, LocalEntity};
use super::types::ObjectType;
use super::FunctionId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

/// A compound statement together with the locals declared directly in it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub statements: Vec<Statement>,
    pub locals: Vec<Rc<LocalEntity>>,
}

impl Block {
    /// Build a block, collecting the locals its own declaration statements introduce
    pub fn new(statements: Vec<Statement>) -> Self {
        let locals = statements
            .iter()
            .filter_map(|s| match s {
                Statement::Declaration(decl) => Some(decl.entities()),
                _ => None,
            })
            .flatten()
            .collect();
        Block { statements, locals }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Declarator {
    pub entity: Rc<LocalEntity>,
    pub initializer: Initializer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclarationStatement {
    pub declarators: Vec<Declarator>,
}

impl DeclarationStatement {
    pub fn entities(&self) -> Vec<Rc<LocalEntity>> {
        self.declarators.iter().map(|d| d.entity.clone()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IfStatement {
    pub condition: Rc<Expression>,
    pub then_branch: Statement,
    pub otherwise: Option<Statement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhileStatement {
    pub condition: Rc<Expression>,
    pub body: Statement,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoWhileStatement {
    pub body: Statement,
    pub condition: Rc<Expression>,
}

/// A `for` loop. Locals declared by the init-statement belong to the loop itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForStatement {
    pub init: Option<Statement>,
    pub condition: Option<Rc<Expression>>,
    pub post: Option<Rc<Expression>>,
    pub body: Statement,
    pub locals: Vec<Rc<LocalEntity>>,
}

impl ForStatement {
    pub fn new(
        init: Option<Statement>,
        condition: Option<Rc<Expression>>,
        post: Option<Rc<Expression>>,
        body: Statement,
    ) -> Self {
        let locals = match &init {
            Some(Statement::Declaration(decl)) => decl.entities(),
            _ => Vec::new(),
        };
        ForStatement {
            init,
            condition,
            post,
            body,
            locals,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnStatement {
    pub value: Option<Rc<Expression>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Statement {
    Block(Rc<Block>),
    Declaration(Rc<DeclarationStatement>),
    Expression(Rc<Expression>),
    If(Rc<IfStatement>),
    While(Rc<WhileStatement>),
    DoWhile(Rc<DoWhileStatement>),
    For(Rc<ForStatement>),
    Break,
    Continue,
    Return(Rc<ReturnStatement>),
    Null,
}

impl Statement {
    /// Short one-line rendering used by the stack viewer
    pub fn describe(&self) -> String {
        match self {
            Statement::Block(_) => "{ ... }".to_string(),
            Statement::Declaration(decl) => {
                let names: Vec<String> = decl
                    .declarators
                    .iter()
                    .map(|d| {
                        let amp = if d.entity.is_reference { "&" } else { "" };
                        format!("{}{} {}", d.entity.ty, amp, d.entity.name)
                    })
                    .collect();
                format!("{};", names.join(", "))
            }
            Statement::Expression(e) => format!("{};", e),
            Statement::If(s) => format!("if ({})", s.condition),
            Statement::While(s) => format!("while ({})", s.condition),
            Statement::DoWhile(s) => format!("do ... while ({})", s.condition),
            Statement::For(s) => {
                let cond = s.condition.as_ref().map(|c| c.to_string()).unwrap_or_default();
                let post = s.post.as_ref().map(|c| c.to_string()).unwrap_or_default();
                format!("for (...; {}; {})", cond, post)
            }
            Statement::Break => "break;".to_string(),
            Statement::Continue => "continue;".to_string(),
            Statement::Return(r) => match &r.value {
                Some(v) => format!("return {};", v),
                None => "return;".to_string(),
            },
            Statement::Null => ";".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueCategory {
    Lvalue,
    Prvalue,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Bool(bool),
    Char(u8),
    Int(i64),
    Double(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionKind {
    LvalueToRvalue,
    ArrayToPointer,
    /// Between integral types (`char`, `bool`, `int`)
    Integral,
    IntegralToFloating,
    FloatingToIntegral,
    ToBool,
    NullPointer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Plus,
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncrementOp {
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputItem {
    Value(Rc<Expression>),
    Endl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExpressionKind {
    Literal(Literal),
    StringLiteral(String),
    NullPointer,
    Identifier(EntityRef),
    This,
    Conversion {
        kind: ConversionKind,
        operand: Rc<Expression>,
    },
    Unary {
        op: UnaryOp,
        operand: Rc<Expression>,
    },
    Binary {
        op: BinaryOp,
        left: Rc<Expression>,
        right: Rc<Expression>,
    },
    /// `pointer + offset` or `pointer - offset`, scaled by the pointee size
    PointerOffset {
        subtract: bool,
        pointer: Rc<Expression>,
        offset: Rc<Expression>,
    },
    PointerDifference {
        left: Rc<Expression>,
        right: Rc<Expression>,
    },
    Logical {
        op: LogicalOp,
        left: Rc<Expression>,
        right: Rc<Expression>,
    },
    Assignment {
        target: Rc<Expression>,
        value: Rc<Expression>,
    },
    CompoundAssignment {
        op: BinaryOp,
        target: Rc<Expression>,
        value: Rc<Expression>,
    },
    Increment {
        op: IncrementOp,
        target: Rc<Expression>,
    },
    Dereference(Rc<Expression>),
    AddressOf(Rc<Expression>),
    Subscript {
        pointer: Rc<Expression>,
        index: Rc<Expression>,
    },
    /// Member access on a class lvalue
    Dot {
        object: Rc<Expression>,
        member: String,
    },
    Arrow {
        pointer: Rc<Expression>,
        member: String,
    },
    Call {
        function: FunctionId,
        receiver: Option<Rc<Expression>>,
        args: Vec<Rc<Expression>>,
    },
    New {
        allocated: ObjectType,
        initializer: Initializer,
    },
    NewArray {
        element: ObjectType,
        length: Rc<Expression>,
    },
    Delete {
        pointer: Rc<Expression>,
        array: bool,
    },
    Output {
        stream: Option<Rc<Expression>>,
        item: OutputItem,
    },
    Input {
        stream: Option<Rc<Expression>>,
        target: Rc<Expression>,
    },
    Rand,
    Comma {
        left: Rc<Expression>,
        right: Rc<Expression>,
    },
    Conditional {
        condition: Rc<Expression>,
        then_value: Rc<Expression>,
        otherwise: Rc<Expression>,
    },
}

/// A typed expression. `ty` is `None` for `void` and stream expressions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expression {
    pub ty: Option<ObjectType>,
    pub category: ValueCategory,
    pub kind: ExpressionKind,
}

impl Expression {
    pub fn new(ty: Option<ObjectType>, category: ValueCategory, kind: ExpressionKind) -> Rc<Self> {
        Rc::new(Expression { ty, category, kind })
    }

    pub fn is_lvalue(&self) -> bool {
        self.category == ValueCategory::Lvalue
    }

    /// Subexpressions evaluated unconditionally before the expression operates, in order
    pub fn operands(&self) -> Vec<Rc<Expression>> {
        use ExpressionKind::*;
        match &self.kind {
            ExpressionKind::Literal(_) | StringLiteral(_) | NullPointer | Identifier(_) | This | Rand => Vec::new(),
            Conversion { operand, .. } | Unary { operand, .. } => vec![operand.clone()],
            Binary { left, right, .. } | PointerDifference { left, right } => {
                vec![left.clone(), right.clone()]
            }
            PointerOffset { pointer, offset, .. } => vec![pointer.clone(), offset.clone()],
            Assignment { target, value } | CompoundAssignment { target, value, .. } => {
                vec![target.clone(), value.clone()]
            }
            Increment { target, .. } => vec![target.clone()],
            Dereference(e) | AddressOf(e) => vec![e.clone()],
            Subscript { pointer, index } => vec![pointer.clone(), index.clone()],
            Dot { object, .. } => vec![object.clone()],
            Arrow { pointer, .. } => vec![pointer.clone()],
            NewArray { length, .. } => vec![length.clone()],
            Delete { pointer, .. } => vec![pointer.clone()],
            Output { stream, item } => {
                let mut ops: Vec<Rc<Expression>> = stream.iter().cloned().collect();
                if let OutputItem::Value(v) = item {
                    ops.push(v.clone());
                }
                ops
            }
            Input { stream, target } => {
                let mut ops: Vec<Rc<Expression>> = stream.iter().cloned().collect();
                ops.push(target.clone());
                ops
            }
            Call { receiver, .. } => receiver.iter().cloned().collect(),
            // Evaluated conditionally or by the runtime construct itself
            Logical { left, .. } => vec![left.clone()],
            Comma { left, .. } => vec![left.clone()],
            Conditional { condition, .. } => vec![condition.clone()],
            New { .. } => Vec::new(),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ExpressionKind::*;
        match &self.kind {
            ExpressionKind::Literal(lit) => match lit {
                self::Literal::Bool(b) => write!(f, "{}", b),
                self::Literal::Char(c) => write!(f, "'{}'", *c as char),
                self::Literal::Int(i) => write!(f, "{}", i),
                self::Literal::Double(d) => write!(f, "{}", d),
            },
            StringLiteral(s) => write!(f, "{:?}", s),
            NullPointer => write!(f, "nullptr"),
            Identifier(entity) => write!(f, "{}", entity.name()),
            This => write!(f, "this"),
            Conversion { operand, .. } => write!(f, "{}", operand),
            Unary { op, operand } => {
                let sym = match op {
                    UnaryOp::Plus => "+",
                    UnaryOp::Neg => "-",
                    UnaryOp::Not => "!",
                };
                write!(f, "{}{}", sym, operand)
            }
            Binary { op, left, right } => write!(f, "{} {} {}", left, op.symbol(), right),
            PointerOffset {
                subtract,
                pointer,
                offset,
            } => write!(f, "{} {} {}", pointer, if *subtract { "-" } else { "+" }, offset),
            PointerDifference { left, right } => write!(f, "{} - {}", left, right),
            Logical { op, left, right } => {
                let sym = if *op == LogicalOp::And { "&&" } else { "||" };
                write!(f, "{} {} {}", left, sym, right)
            }
            Assignment { target, value } => write!(f, "{} = {}", target, value),
            CompoundAssignment { op, target, value } => {
                write!(f, "{} {}= {}", target, op.symbol(), value)
            }
            Increment { op, target } => match op {
                IncrementOp::PreInc => write!(f, "++{}", target),
                IncrementOp::PreDec => write!(f, "--{}", target),
                IncrementOp::PostInc => write!(f, "{}++", target),
                IncrementOp::PostDec => write!(f, "{}--", target),
            },
            Dereference(e) => write!(f, "*{}", e),
            AddressOf(e) => write!(f, "&{}", e),
            Subscript { pointer, index } => write!(f, "{}[{}]", pointer, index),
            Dot { object, member } => write!(f, "{}.{}", object, member),
            Arrow { pointer, member } => write!(f, "{}->{}", pointer, member),
            Call {
                function,
                receiver,
                args,
            } => {
                let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                match receiver {
                    Some(r) => write!(f, "{}.fn#{}({})", r, function.0, args.join(", ")),
                    None => write!(f, "fn#{}({})", function.0, args.join(", ")),
                }
            }
            New { allocated, .. } => write!(f, "new {}", allocated),
            NewArray { element, length } => write!(f, "new {}[{}]", element, length),
            Delete { pointer, array } => {
                write!(f, "delete{} {}", if *array { "[]" } else { "" }, pointer)
            }
            Output { stream, item } => {
                match stream {
                    Some(s) => write!(f, "{}", s)?,
                    None => write!(f, "cout")?,
                }
                match item {
                    OutputItem::Value(v) => write!(f, " << {}", v),
                    OutputItem::Endl => write!(f, " << endl"),
                }
            }
            Input { stream, target } => {
                match stream {
                    Some(s) => write!(f, "{}", s)?,
                    None => write!(f, "cin")?,
                }
                write!(f, " >> {}", target)
            }
            Rand => write!(f, "rand()"),
            Comma { left, right } => write!(f, "{}, {}", left, right),
            Conditional {
                condition,
                then_value,
                otherwise,
            } => write!(f, "{} ? {} : {}", condition, then_value, otherwise),
        }
    }
}

/// How an object (or reference) gets its initial value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Initializer {
    /// Atomic objects are left indeterminate; classes use their default constructor
    Default,
    /// Zero-initialization
    Value,
    /// Copy from an expression, or bind a reference to an lvalue
    Direct(Rc<Expression>),
    Constructor {
        constructor: FunctionId,
        args: Vec<Rc<Expression>>,
    },
    /// Array aggregate; trailing elements are value-initialized
    List(Vec<Rc<Expression>>),
}
