//! Runtime construct protocol
//!
//! Every executing statement, expression, initializer, function activation
//! and cleanup pass is a [`RuntimeConstruct`] instance living in an arena on
//! the [`Simulation`] and referred to by [`InstanceId`]. The simulation keeps
//! an explicit stack of instance ids; nothing in here recurses on the host
//! stack to run the interpreted program.
//!
//! Two operations drive an instance:
//! - **up next**: the instance is on top and must either push a child or
//!   start its own cleanup.
//! - **step forward**: the instance does one visible unit of work.
//!
//! Starting cleanup on an instance first runs its cleanup construct (for
//! example the deallocator for a block's locals), then pops it.
//!
//! Submodules add `impl Simulation` blocks for each family of constructs:
//! - [`statements`]: blocks, conditionals, loops, jumps, declarations
//! - [`expressions`]: all expression kinds
//! - [`initializers`]: default, value, direct, constructor and list initialization
//! - [`functions`]: function calls and activations
//! - [`deallocator`]: reverse-order destruction of objects

pub mod deallocator;
pub mod expressions;
pub mod functions;
pub mod initializers;
pub mod statements;

use crate::events::{Event, UndefinedBehavior};
use crate::memory::object::ObjectId;
use crate::memory::value::Value;
use crate::simulation::Simulation;
use serde::Serialize;
use tracing::warn;

use deallocator::DeallocatorState;
use expressions::ExpressionState;
use functions::{CallState, FunctionState};
use initializers::InitializerState;
use statements::{
    BlockState, DeclarationState, DoWhileState, ExpressionStatementState, ForState, IfState,
    ReturnState, StaticInitializerState, WhileState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct InstanceId(pub usize);

/// Role of an instance on the execution stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StackType {
    Statement,
    Expression,
    Initializer,
    Call,
    Function,
    Cleanup,
    Startup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
    Created,
    /// On top of the stack, deciding what to do next
    UpNext,
    /// Paused while something it pushed runs
    Waiting,
    Done,
}

/// Result of evaluating an expression
#[derive(Debug, Clone, PartialEq)]
pub enum EvalResult {
    Object(ObjectId),
    Value(Value),
    Void,
}

impl EvalResult {
    pub fn object(&self) -> ObjectId {
        match self {
            EvalResult::Object(id) => *id,
            other => panic!("expected an lvalue result, got {:?}", other),
        }
    }

    pub fn value(&self) -> &Value {
        match self {
            EvalResult::Value(v) => v,
            other => panic!("expected a prvalue result, got {:?}", other),
        }
    }
}

/// Per-kind execution state
#[derive(Debug)]
pub(crate) enum ConstructState {
    /// Placeholder while the instance is operating on itself
    Taken,
    StaticInitializer(StaticInitializerState),
    Block(BlockState),
    If(IfState),
    While(WhileState),
    DoWhile(DoWhileState),
    For(ForState),
    Break,
    Continue,
    Return(ReturnState),
    ExpressionStatement(ExpressionStatementState),
    Declaration(DeclarationState),
    Null,
    Expression(ExpressionState),
    Initializer(InitializerState),
    Call(CallState),
    Function(FunctionState),
    Deallocator(DeallocatorState),
}

impl ConstructState {
    pub(crate) fn is_loop(&self) -> bool {
        matches!(
            self,
            ConstructState::While(_) | ConstructState::DoWhile(_) | ConstructState::For(_)
        )
    }
}

/// One execution of a construct
#[derive(Debug)]
pub struct RuntimeConstruct {
    pub id: InstanceId,
    pub parent: Option<InstanceId>,
    pub containing_function: Option<InstanceId>,
    pub stack_type: StackType,
    pub label: String,
    pub cleanup_construct: Option<InstanceId>,
    pub cleanup_started: bool,
    pub status: Status,
    /// Frame index, for function activations whose frame is on the stack
    pub frame: Option<usize>,
    /// Temporaries whose lifetime ends when this instance is popped
    pub temporaries: Vec<ObjectId>,
    /// Runs destructors of class temporaries before the instance is popped
    pub temporary_cleanup: Option<InstanceId>,
    pub(crate) state: ConstructState,
}

impl RuntimeConstruct {
    pub fn is_done(&self) -> bool {
        self.status == Status::Done
    }
}

impl Simulation {
    pub(crate) fn create_instance(
        &mut self,
        parent: Option<InstanceId>,
        stack_type: StackType,
        label: String,
        state: ConstructState,
    ) -> InstanceId {
        let id = InstanceId(self.instances.len());
        let containing_function = match stack_type {
            StackType::Function => Some(id),
            _ => parent.and_then(|p| self.rt(p).containing_function),
        };
        self.instances.push(RuntimeConstruct {
            id,
            parent,
            containing_function,
            stack_type,
            label,
            cleanup_construct: None,
            cleanup_started: false,
            status: Status::Created,
            frame: None,
            temporaries: Vec::new(),
            temporary_cleanup: None,
            state,
        });
        id
    }

    pub fn rt(&self, id: InstanceId) -> &RuntimeConstruct {
        &self.instances[id.0]
    }

    pub(crate) fn rt_mut(&mut self, id: InstanceId) -> &mut RuntimeConstruct {
        &mut self.instances[id.0]
    }

    /// Run `f` with the instance's state moved out, so `f` may freely use the simulation
    fn with_state<R>(&mut self, id: InstanceId, f: impl FnOnce(&mut Self, &mut ConstructState) -> R) -> R {
        let mut state = std::mem::replace(&mut self.instances[id.0].state, ConstructState::Taken);
        let result = f(self, &mut state);
        self.instances[id.0].state = state;
        result
    }

    pub(crate) fn instance_up_next(&mut self, id: InstanceId) {
        self.rt_mut(id).status = Status::UpNext;
        if self.rt(id).cleanup_started {
            self.continue_cleanup(id);
            return;
        }
        self.with_state(id, |sim, state| match state {
            ConstructState::Taken => panic!("instance {:?} re-entered while operating", id),
            ConstructState::StaticInitializer(s) => sim.static_initializer_up_next(id, s),
            ConstructState::Block(s) => sim.block_up_next(id, s),
            ConstructState::If(s) => sim.if_up_next(id, s),
            ConstructState::While(s) => sim.while_up_next(id, s),
            ConstructState::DoWhile(s) => sim.do_while_up_next(id, s),
            ConstructState::For(s) => sim.for_up_next(id, s),
            ConstructState::Break | ConstructState::Continue | ConstructState::Null => {}
            ConstructState::Return(s) => sim.return_up_next(id, s),
            ConstructState::ExpressionStatement(s) => sim.expression_statement_up_next(id, s),
            ConstructState::Declaration(s) => sim.declaration_up_next(id, s),
            ConstructState::Expression(s) => sim.expression_up_next(id, s),
            ConstructState::Initializer(s) => sim.initializer_up_next(id, s),
            ConstructState::Call(s) => sim.call_up_next(id, s),
            ConstructState::Function(s) => sim.function_up_next(id, s),
            ConstructState::Deallocator(s) => sim.deallocator_up_next(id, s),
        })
    }

    pub(crate) fn instance_step_forward(&mut self, id: InstanceId) {
        self.with_state(id, |sim, state| match state {
            ConstructState::Taken => panic!("instance {:?} re-entered while operating", id),
            ConstructState::StaticInitializer(_)
            | ConstructState::Block(_)
            | ConstructState::If(_)
            | ConstructState::ExpressionStatement(_)
            | ConstructState::Declaration(_) => {}
            ConstructState::While(s) => sim.while_step_forward(id, s),
            ConstructState::DoWhile(s) => sim.do_while_step_forward(id, s),
            ConstructState::For(s) => sim.for_step_forward(id, s),
            ConstructState::Break => sim.break_step_forward(id),
            ConstructState::Continue => sim.continue_step_forward(id),
            ConstructState::Null => sim.start_cleanup(id),
            ConstructState::Return(s) => sim.return_step_forward(id, s),
            ConstructState::Expression(s) => sim.expression_step_forward(id, s),
            ConstructState::Initializer(s) => sim.initializer_step_forward(id, s),
            ConstructState::Call(s) => sim.call_step_forward(id, s),
            ConstructState::Function(s) => sim.function_step_forward(id, s),
            ConstructState::Deallocator(s) => sim.deallocator_step_forward(id, s),
        })
    }

    /// Begin tearing an instance down. If it is on top, its cleanup
    /// construct is pushed (or it is popped right away when it has none).
    pub fn start_cleanup(&mut self, id: InstanceId) {
        self.rt_mut(id).cleanup_started = true;
        if self.peek() == Some(id) {
            self.continue_cleanup(id);
        }
    }

    fn continue_cleanup(&mut self, id: InstanceId) {
        if let Some(cleanup) = self.pending_temporary_cleanup(id) {
            self.push(cleanup);
            return;
        }
        match self.rt(id).cleanup_construct {
            Some(cleanup) if !self.rt(cleanup).is_done() => self.push(cleanup),
            _ => {
                let popped = self.pop();
                assert_eq!(popped, id, "only the top instance can finish its cleanup");
            }
        }
    }

    /// Deallocator for the temporaries of `id`, created on first use and
    /// only when one of them has a destructor to run
    fn pending_temporary_cleanup(&mut self, id: InstanceId) -> Option<InstanceId> {
        if let Some(cleanup) = self.rt(id).temporary_cleanup {
            return (!self.rt(cleanup).is_done()).then_some(cleanup);
        }
        let temporaries = self.rt(id).temporaries.clone();
        let needs_destruction = temporaries.iter().any(|t| {
            let obj = self.memory.object(*t);
            obj.is_alive() && obj.ty.needs_destruction()
        });
        if !needs_destruction {
            return None;
        }
        let cleanup = self.create_deallocator(id, temporaries, Vec::new(), None, "temporaries".into());
        self.rt_mut(id).temporary_cleanup = Some(cleanup);
        Some(cleanup)
    }

    pub(crate) fn set_cleanup_construct(&mut self, owner: InstanceId, cleanup: InstanceId) {
        self.rt_mut(owner).cleanup_construct = Some(cleanup);
    }

    /// Frame index of the function activation an instance runs in
    pub(crate) fn frame_of(&self, id: InstanceId) -> usize {
        let function = self
            .rt(id)
            .containing_function
            .unwrap_or_else(|| panic!("instance {:?} is not inside a function", id));
        self.rt(function)
            .frame
            .unwrap_or_else(|| panic!("function activation {:?} has no frame", function))
    }

    /// The instance whose pop ends the full-expression `id` belongs to
    pub(crate) fn full_expression_owner(&self, id: InstanceId) -> InstanceId {
        let mut owner = id;
        while let Some(parent) = self.rt(owner).parent {
            match self.rt(parent).stack_type {
                StackType::Expression | StackType::Call | StackType::Initializer => owner = parent,
                _ => break,
            }
        }
        owner
    }

    /// Allocate a temporary whose lifetime ends with the full-expression containing `id`
    pub(crate) fn allocate_temporary(
        &mut self,
        id: InstanceId,
        ty: &crate::program::types::ObjectType,
        name: Option<String>,
    ) -> ObjectId {
        let owner = self.full_expression_owner(id);
        let object = self.memory.allocate_temporary_object(ty, name);
        self.rt_mut(owner).temporaries.push(object);
        object
    }

    pub(crate) fn report_ub(&mut self, kind: UndefinedBehavior, object: Option<ObjectId>, message: String) {
        warn!(?kind, ?object, "{}", message);
        self.memory.events.emit(Event::UndefinedBehavior {
            kind,
            object,
            message,
        });
    }

    /// Read an atomic object, flagging reads of dead or uninitialized storage
    pub(crate) fn read_checked(&mut self, object: ObjectId) -> Value {
        let (alive, invalid_object, label) = {
            let obj = self.memory.object(object);
            (obj.is_alive(), self.memory.is_part_of_invalid_object(object), obj.describe())
        };
        let mut value = self.memory.read_value(object);
        if invalid_object {
            value.valid = false;
        } else if !alive {
            self.report_ub(
                UndefinedBehavior::DeadObjectAccess,
                Some(object),
                format!("read of {} after its lifetime ended", label),
            );
            value.valid = false;
        } else if !value.valid {
            self.report_ub(
                UndefinedBehavior::InvalidRead,
                Some(object),
                format!("read of uninitialized {}", label),
            );
        }
        value
    }

    /// Flag writes into storage that is not a live object
    pub(crate) fn check_writable(&mut self, object: ObjectId) {
        let obj = self.memory.object(object);
        if !obj.is_alive() && !self.memory.is_part_of_invalid_object(object) {
            let label = obj.describe();
            self.report_ub(
                UndefinedBehavior::DeadObjectAccess,
                Some(object),
                format!("write to {} after its lifetime ended", label),
            );
        }
    }
}
