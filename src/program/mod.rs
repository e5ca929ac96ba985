//! Compiled program representation consumed by the runtime
//!
//! The engine never parses or type-checks source text. It receives a tree in
//! which every node already knows its type and every identifier is bound to
//! an entity:
//! - [`types`]: object types, classes and return types
//! - [`entities`]: local and global variable descriptors
//! - [`ast`]: statements, expressions and initializers
//! - [`builder`]: helpers that assemble correctly typed trees
//! - [`demos`]: small ready-made programs
//!
//! Programs derive `serde` traits so a front-end can hand them over as JSON.

pub mod ast;
pub mod builder;
pub mod demos;
pub mod entities;
pub mod types;

use ast::{Block, Expression, ExpressionKind, Initializer, Statement};
use entities::{GlobalEntity, LocalEntity};
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use types::{ClassType, ReturnType};

/// Index of a function in [`Program::functions`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionId(pub usize);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberInitializer {
    pub member: String,
    pub initializer: Initializer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FunctionKind {
    Free,
    Member,
    /// Members not named in `member_initializers` are default-initialized
    Constructor {
        member_initializers: Vec<MemberInitializer>,
    },
    Destructor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub kind: FunctionKind,
    /// Class of the implicit object parameter for member functions
    pub class: Option<Rc<ClassType>>,
    pub params: Vec<Rc<LocalEntity>>,
    pub return_type: ReturnType,
    pub body: Rc<Block>,
    /// Every parameter and local of the whole function, in declaration order
    pub locals: Vec<Rc<LocalEntity>>,
}

impl FunctionDefinition {
    pub fn new(
        name: impl Into<String>,
        params: Vec<Rc<LocalEntity>>,
        return_type: ReturnType,
        body: Block,
    ) -> Self {
        let body = Rc::new(body);
        let mut locals = params.clone();
        for stmt in &body.statements {
            collect_locals(stmt, &mut locals);
        }
        FunctionDefinition {
            name: name.into(),
            kind: FunctionKind::Free,
            class: None,
            params,
            return_type,
            body,
            locals,
        }
    }

    pub fn member_of(mut self, class: Rc<ClassType>, kind: FunctionKind) -> Self {
        self.class = Some(class);
        self.kind = kind;
        self
    }

    pub fn is_destructor(&self) -> bool {
        matches!(self.kind, FunctionKind::Destructor)
    }
}

fn collect_locals(stmt: &Statement, out: &mut Vec<Rc<LocalEntity>>) {
    match stmt {
        Statement::Block(block) => block.statements.iter().for_each(|s| collect_locals(s, out)),
        Statement::Declaration(decl) => out.extend(decl.entities()),
        Statement::If(s) => {
            collect_locals(&s.then_branch, out);
            if let Some(otherwise) = &s.otherwise {
                collect_locals(otherwise, out);
            }
        }
        Statement::While(s) => collect_locals(&s.body, out),
        Statement::DoWhile(s) => collect_locals(&s.body, out),
        Statement::For(s) => {
            if let Some(init) = &s.init {
                collect_locals(init, out);
            }
            collect_locals(&s.body, out);
        }
        _ => {}
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalDefinition {
    pub entity: Rc<GlobalEntity>,
    pub initializer: Initializer,
}

/// A whole compiled program
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub functions: Vec<Rc<FunctionDefinition>>,
    pub globals: Vec<GlobalDefinition>,
}

impl Program {
    pub fn function(&self, id: FunctionId) -> &Rc<FunctionDefinition> {
        &self.functions[id.0]
    }

    pub fn main(&self) -> Option<FunctionId> {
        self.functions
            .iter()
            .position(|f| f.name == "main" && matches!(f.kind, FunctionKind::Free))
            .map(FunctionId)
    }

    /// Every distinct string literal in the program, in first-appearance order
    pub fn string_literals(&self) -> Vec<String> {
        let mut found = Vec::new();
        let mut visit = |e: &Expression| {
            if let ExpressionKind::StringLiteral(s) = &e.kind {
                if !found.contains(s) {
                    found.push(s.clone());
                }
            }
        };
        for global in &self.globals {
            visit_initializer(&global.initializer, &mut visit);
        }
        for function in &self.functions {
            if let FunctionKind::Constructor {
                member_initializers,
            } = &function.kind
            {
                for mem in member_initializers {
                    visit_initializer(&mem.initializer, &mut visit);
                }
            }
            for stmt in &function.body.statements {
                visit_statement(stmt, &mut visit);
            }
        }
        found
    }
}

fn visit_statement(stmt: &Statement, visit: &mut impl FnMut(&Expression)) {
    match stmt {
        Statement::Block(block) => block.statements.iter().for_each(|s| visit_statement(s, visit)),
        Statement::Declaration(decl) => decl
            .declarators
            .iter()
            .for_each(|d| visit_initializer(&d.initializer, visit)),
        Statement::Expression(e) => visit_expression(e, visit),
        Statement::If(s) => {
            visit_expression(&s.condition, visit);
            visit_statement(&s.then_branch, visit);
            if let Some(otherwise) = &s.otherwise {
                visit_statement(otherwise, visit);
            }
        }
        Statement::While(s) => {
            visit_expression(&s.condition, visit);
            visit_statement(&s.body, visit);
        }
        Statement::DoWhile(s) => {
            visit_statement(&s.body, visit);
            visit_expression(&s.condition, visit);
        }
        Statement::For(s) => {
            if let Some(init) = &s.init {
                visit_statement(init, visit);
            }
            if let Some(c) = &s.condition {
                visit_expression(c, visit);
            }
            if let Some(p) = &s.post {
                visit_expression(p, visit);
            }
            visit_statement(&s.body, visit);
        }
        Statement::Return(r) => {
            if let Some(v) = &r.value {
                visit_expression(v, visit);
            }
        }
        Statement::Break | Statement::Continue | Statement::Null => {}
    }
}

fn visit_initializer(init: &Initializer, visit: &mut impl FnMut(&Expression)) {
    match init {
        Initializer::Default | Initializer::Value => {}
        Initializer::Direct(e) => visit_expression(e, visit),
        Initializer::Constructor { args, .. } | Initializer::List(args) => {
            args.iter().for_each(|a| visit_expression(a, visit))
        }
    }
}

fn visit_expression(expr: &Expression, visit: &mut impl FnMut(&Expression)) {
    visit(expr);
    for operand in expr.operands() {
        visit_expression(&operand, visit);
    }
    match &expr.kind {
        ExpressionKind::Logical { right, .. } | ExpressionKind::Comma { right, .. } => {
            visit_expression(right, visit)
        }
        ExpressionKind::Conditional {
            then_value,
            otherwise,
            ..
        } => {
            visit_expression(then_value, visit);
            visit_expression(otherwise, visit);
        }
        ExpressionKind::Call { args, .. } => args.iter().for_each(|a| visit_expression(a, visit)),
        ExpressionKind::New { initializer, .. } => visit_initializer(initializer, visit),
        _ => {}
    }
}
