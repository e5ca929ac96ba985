//! Statement executors
//!
//! Each statement kind runs as a small state machine over a list of phases.
//! Loops cycle through their phases; a phase that pushes nothing leaves the
//! loop on top, so the next step forward is spent on the loop itself.

use super::{ConstructState, InstanceId, StackType};
use crate::memory::object::ObjectId;
use crate::program::ast::{
    Block, DeclarationStatement, DoWhileStatement, Expression, ForStatement, IfStatement,
    ReturnStatement, Statement, WhileStatement,
};
use crate::program::entities::LocalEntity;
use crate::program::types::ReturnType;
use crate::program::GlobalDefinition;
use crate::runtime::initializers::InitTarget;
use crate::simulation::Simulation;
use std::rc::Rc;
use tracing::trace;

#[derive(Debug)]
pub(crate) struct StaticInitializerState {
    globals: Vec<GlobalDefinition>,
    index: usize,
}

impl StaticInitializerState {
    pub(crate) fn new(globals: Vec<GlobalDefinition>) -> Self {
        StaticInitializerState { globals, index: 0 }
    }
}

#[derive(Debug)]
pub(crate) struct BlockState {
    model: Rc<Block>,
    index: usize,
}

#[derive(Debug)]
pub(crate) struct IfState {
    model: Rc<IfStatement>,
    index: usize,
    condition: Option<InstanceId>,
}

#[derive(Debug)]
pub(crate) struct WhileState {
    model: Rc<WhileStatement>,
    index: usize,
    condition: Option<InstanceId>,
}

#[derive(Debug)]
pub(crate) struct DoWhileState {
    model: Rc<DoWhileStatement>,
    index: usize,
    condition: Option<InstanceId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ForPhase {
    Init,
    Condition,
    Body,
    Post,
    /// End of an iteration; the next step forward starts the next one
    Wait,
}

#[derive(Debug)]
pub(crate) struct ForState {
    model: Rc<ForStatement>,
    phases: Vec<ForPhase>,
    index: usize,
    condition: Option<InstanceId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReturnPhase {
    PushInitializer,
    Return,
}

#[derive(Debug)]
pub(crate) struct ReturnState {
    model: Rc<ReturnStatement>,
    phase: ReturnPhase,
}

#[derive(Debug)]
pub(crate) struct ExpressionStatementState {
    expression: Rc<Expression>,
    pushed: bool,
}

#[derive(Debug)]
pub(crate) struct DeclarationState {
    model: Rc<DeclarationStatement>,
    index: usize,
}

impl Simulation {
    pub(crate) fn create_statement(&mut self, stmt: &Statement, parent: InstanceId) -> InstanceId {
        let label = stmt.describe();
        let state = match stmt {
            Statement::Block(b) => ConstructState::Block(BlockState {
                model: b.clone(),
                index: 0,
            }),
            Statement::Declaration(d) => ConstructState::Declaration(DeclarationState {
                model: d.clone(),
                index: 0,
            }),
            Statement::Expression(e) => ConstructState::ExpressionStatement(ExpressionStatementState {
                expression: e.clone(),
                pushed: false,
            }),
            Statement::If(s) => ConstructState::If(IfState {
                model: s.clone(),
                index: 0,
                condition: None,
            }),
            Statement::While(s) => ConstructState::While(WhileState {
                model: s.clone(),
                index: 0,
                condition: None,
            }),
            Statement::DoWhile(s) => ConstructState::DoWhile(DoWhileState {
                model: s.clone(),
                index: 0,
                condition: None,
            }),
            Statement::For(s) => {
                let mut phases = Vec::new();
                if s.init.is_some() {
                    phases.push(ForPhase::Init);
                }
                if s.condition.is_some() {
                    phases.push(ForPhase::Condition);
                }
                phases.push(ForPhase::Body);
                if s.post.is_some() {
                    phases.push(ForPhase::Post);
                }
                phases.push(ForPhase::Wait);
                ConstructState::For(ForState {
                    model: s.clone(),
                    phases,
                    index: 0,
                    condition: None,
                })
            }
            Statement::Break => ConstructState::Break,
            Statement::Continue => ConstructState::Continue,
            Statement::Return(r) => ConstructState::Return(ReturnState {
                model: r.clone(),
                phase: ReturnPhase::PushInitializer,
            }),
            Statement::Null => ConstructState::Null,
        };
        let id = self.create_instance(Some(parent), StackType::Statement, label, state);

        let locals = match stmt {
            Statement::Block(b) => Some(&b.locals),
            Statement::For(f) => Some(&f.locals),
            _ => None,
        };
        if let Some(locals) = locals.filter(|l| !l.is_empty()) {
            let frame = self.frame_of(id);
            let (objects, references) = self.local_targets(frame, locals);
            let cleanup = self.create_deallocator(id, objects, references, Some(frame), "locals".into());
            self.set_cleanup_construct(id, cleanup);
        }
        id
    }

    /// Objects and reference entities of `locals` in frame `frame`, in declaration order
    pub(crate) fn local_targets(
        &self,
        frame: usize,
        locals: &[Rc<LocalEntity>],
    ) -> (Vec<ObjectId>, Vec<Rc<LocalEntity>>) {
        let mut objects = Vec::new();
        let mut references = Vec::new();
        for local in locals {
            if local.is_reference {
                references.push(local.clone());
            } else if let Some(obj) = self.memory.frame(frame).local_object(local.id) {
                objects.push(obj);
            }
        }
        (objects, references)
    }

    fn push_condition(&mut self, id: InstanceId, condition: &Rc<Expression>) -> InstanceId {
        let cond = self.create_expression(condition, id);
        self.push(cond);
        cond
    }

    fn condition_holds(&self, condition: Option<InstanceId>) -> bool {
        condition.map_or(true, |c| self.expression_result(c).value().as_bool())
    }

    pub(crate) fn static_initializer_up_next(&mut self, id: InstanceId, s: &mut StaticInitializerState) {
        let Some(global) = s.globals.get(s.index).cloned() else {
            self.start_cleanup(id);
            return;
        };
        s.index += 1;
        let object = self
            .memory
            .static_object(global.entity.id)
            .unwrap_or_else(|| panic!("global {} was never allocated", global.entity.name));
        let init = self.create_initializer(
            InitTarget::Object(object),
            global.initializer.clone(),
            global.entity.name.clone(),
            id,
        );
        self.push(init);
    }

    pub(crate) fn block_up_next(&mut self, id: InstanceId, s: &mut BlockState) {
        match s.model.statements.get(s.index) {
            Some(stmt) => {
                s.index += 1;
                let child = self.create_statement(stmt, id);
                self.push(child);
            }
            None => self.start_cleanup(id),
        }
    }

    pub(crate) fn if_up_next(&mut self, id: InstanceId, s: &mut IfState) {
        let index = s.index;
        s.index += 1;
        match index {
            0 => s.condition = Some(self.push_condition(id, &s.model.condition)),
            1 => {
                let branch = if self.condition_holds(s.condition) {
                    Some(&s.model.then_branch)
                } else {
                    s.model.otherwise.as_ref()
                };
                if let Some(branch) = branch {
                    let child = self.create_statement(branch, id);
                    self.push(child);
                }
            }
            _ => self.start_cleanup(id),
        }
    }

    pub(crate) fn while_up_next(&mut self, id: InstanceId, s: &mut WhileState) {
        let index = s.index;
        s.index = (s.index + 1) % 3;
        match index {
            0 => s.condition = Some(self.push_condition(id, &s.model.condition)),
            1 => {
                if self.condition_holds(s.condition) {
                    let body = self.create_statement(&s.model.body, id);
                    self.push(body);
                } else {
                    self.start_cleanup(id);
                }
            }
            _ => {}
        }
    }

    pub(crate) fn while_step_forward(&mut self, _id: InstanceId, s: &mut WhileState) {
        s.condition = None;
    }

    pub(crate) fn do_while_up_next(&mut self, id: InstanceId, s: &mut DoWhileState) {
        let index = s.index;
        s.index = (s.index + 1) % 3;
        match index {
            0 => {
                let body = self.create_statement(&s.model.body, id);
                self.push(body);
            }
            1 => s.condition = Some(self.push_condition(id, &s.model.condition)),
            _ => {
                if !self.condition_holds(s.condition) {
                    self.start_cleanup(id);
                }
            }
        }
    }

    pub(crate) fn do_while_step_forward(&mut self, _id: InstanceId, s: &mut DoWhileState) {
        s.condition = None;
    }

    pub(crate) fn for_up_next(&mut self, id: InstanceId, s: &mut ForState) {
        let phase = s.phases[s.index];
        s.index += 1;
        if s.index == s.phases.len() {
            s.index = s.first_iteration_phase();
        }
        match phase {
            ForPhase::Init => {
                if let Some(init) = &s.model.init {
                    let child = self.create_statement(init, id);
                    self.push(child);
                }
            }
            ForPhase::Condition => {
                if let Some(condition) = &s.model.condition {
                    s.condition = Some(self.push_condition(id, condition));
                }
            }
            ForPhase::Body => {
                if self.condition_holds(s.condition) {
                    let body = self.create_statement(&s.model.body, id);
                    self.push(body);
                } else {
                    self.start_cleanup(id);
                }
            }
            ForPhase::Post => {
                if let Some(post) = &s.model.post {
                    let child = self.create_expression(post, id);
                    self.push(child);
                }
            }
            ForPhase::Wait => {}
        }
    }

    pub(crate) fn for_step_forward(&mut self, _id: InstanceId, s: &mut ForState) {
        s.condition = None;
    }

    /// Unwind every instance between the `break` and its loop, then end the loop
    pub(crate) fn break_step_forward(&mut self, id: InstanceId) {
        let mut current = id;
        loop {
            if self.rt(current).state.is_loop() {
                trace!(loop_instance = current.0, "break reached loop");
                self.start_cleanup(current);
                return;
            }
            self.start_cleanup(current);
            current = self
                .rt(current)
                .parent
                .unwrap_or_else(|| panic!("break outside of a loop"));
        }
    }

    /// Unwind up to and including the loop body; the loop then moves on to its next phase
    pub(crate) fn continue_step_forward(&mut self, id: InstanceId) {
        let mut current = id;
        loop {
            self.start_cleanup(current);
            let parent = self
                .rt(current)
                .parent
                .unwrap_or_else(|| panic!("continue outside of a loop"));
            if self.rt(parent).state.is_loop() {
                return;
            }
            current = parent;
        }
    }

    pub(crate) fn return_up_next(&mut self, id: InstanceId, s: &mut ReturnState) {
        if s.phase != ReturnPhase::PushInitializer {
            return;
        }
        s.phase = ReturnPhase::Return;
        let Some(value) = &s.model.value else {
            return;
        };
        let function = self
            .rt(id)
            .containing_function
            .unwrap_or_else(|| panic!("return outside of a function"));
        let state = self.function_state(function);
        let target = match &state.function.return_type {
            ReturnType::Reference(_) => InitTarget::ReturnReference { function },
            _ => match state.return_object {
                Some(object) => InitTarget::Object(object),
                None => InitTarget::Discard,
            },
        };
        let init = self.create_initializer(
            target,
            crate::program::ast::Initializer::Direct(value.clone()),
            "return value".into(),
            id,
        );
        self.push(init);
    }

    pub(crate) fn return_step_forward(&mut self, id: InstanceId, s: &mut ReturnState) {
        if s.phase != ReturnPhase::Return {
            return;
        }
        let function = self
            .rt(id)
            .containing_function
            .unwrap_or_else(|| panic!("return outside of a function"));
        self.function_state_mut(function).returned = true;
        self.start_cleanup_until(function);
    }

    pub(crate) fn expression_statement_up_next(&mut self, id: InstanceId, s: &mut ExpressionStatementState) {
        if s.pushed {
            self.start_cleanup(id);
        } else {
            s.pushed = true;
            let child = self.create_expression(&s.expression, id);
            self.push(child);
        }
    }

    pub(crate) fn declaration_up_next(&mut self, id: InstanceId, s: &mut DeclarationState) {
        let Some(declarator) = s.model.declarators.get(s.index) else {
            self.start_cleanup(id);
            return;
        };
        s.index += 1;
        let frame = self.frame_of(id);
        let entity = declarator.entity.clone();
        let target = if entity.is_reference {
            InitTarget::Reference { frame, entity: entity.clone() }
        } else {
            let object = self
                .memory
                .frame(frame)
                .local_object(entity.id)
                .unwrap_or_else(|| panic!("local {} has no storage in its frame", entity.name));
            InitTarget::Object(object)
        };
        let init = self.create_initializer(target, declarator.initializer.clone(), entity.name.clone(), id);
        self.push(init);
    }
}

impl ForState {
    fn first_iteration_phase(&self) -> usize {
        self.phases
            .iter()
            .position(|p| *p != ForPhase::Init)
            .unwrap_or(0)
    }
}
